#![forbid(unsafe_code)]

//! The observation capability a reactive engine lends to the combinator.
//!
//! The core never tracks dependencies itself. It asks a [`Reactor`] to run an
//! expression inside the engine's observation context and to call back with
//! the freshly evaluated value whenever anything the expression read changes.
//!
//! # Contract
//!
//! 1. `observe` may invoke `on_change` synchronously, before it returns
//!    (eager first evaluation), or only after the first change. Callers must
//!    not rely on either.
//! 2. After [`Disposable::dispose`] returns, `on_change` is never invoked
//!    again.
//! 3. `dispose` is idempotent and may be called from inside `on_change`.

use std::fmt;
use std::rc::Rc;

/// Handle that unregisters an observation.
pub trait Disposable {
    /// Stop observing. Calling this more than once is a no-op.
    fn dispose(&mut self);
}

impl Disposable for Box<dyn Disposable> {
    fn dispose(&mut self) {
        (**self).dispose();
    }
}

/// A [`Disposable`] built from a one-shot closure.
///
/// Suits engines whose registration returns a plain "disposer" function.
pub struct DisposeFn {
    dispose: Option<Box<dyn FnOnce()>>,
}

impl DisposeFn {
    /// Wrap `dispose`; it runs on the first [`Disposable::dispose`] call.
    pub fn new(dispose: impl FnOnce() + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    /// Whether the wrapped closure has already run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.dispose.is_none()
    }
}

impl Disposable for DisposeFn {
    fn dispose(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl fmt::Debug for DisposeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposeFn")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// A reactive engine able to observe an arbitrary read expression.
pub trait Reactor {
    /// Registration handle returned by [`observe`](Reactor::observe).
    type Handle: Disposable + 'static;

    /// Register `expr` for observation.
    ///
    /// `on_change` receives the value of `expr` once eagerly or on the first
    /// change (engine convention), and again after every change to a
    /// dependency read during the latest evaluation.
    fn observe<T, F, C>(&self, expr: F, on_change: C) -> Self::Handle
    where
        T: 'static,
        F: FnMut() -> T + 'static,
        C: FnMut(T) + 'static;
}

impl<R: Reactor> Reactor for &R {
    type Handle = R::Handle;

    fn observe<T, F, C>(&self, expr: F, on_change: C) -> Self::Handle
    where
        T: 'static,
        F: FnMut() -> T + 'static,
        C: FnMut(T) + 'static,
    {
        (**self).observe(expr, on_change)
    }
}

impl<R: Reactor> Reactor for Rc<R> {
    type Handle = R::Handle;

    fn observe<T, F, C>(&self, expr: F, on_change: C) -> Self::Handle
    where
        T: 'static,
        F: FnMut() -> T + 'static,
        C: FnMut(T) + 'static,
    {
        (**self).observe(expr, on_change)
    }
}
