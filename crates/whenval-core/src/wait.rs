#![forbid(unsafe_code)]

//! The reactive-wait combinator.
//!
//! [`when_value`] and [`when_value_matching`] register a watch expression with
//! a [`Reactor`] and return a [`WhenValue`]: a single-shot future that settles
//! the first time a firing satisfies the wait.
//!
//! # Invariants
//!
//! 1. Each wait makes one `observe` call and exactly one `dispose` call,
//!    whatever the exit path (resolve, reject, cancel, drop).
//! 2. The outcome is written at most once. Settlement and cancellation race
//!    for the same cell; the first writer wins and the other is a no-op.
//! 3. Firings that reach a settled wait are ignored, whether or not the
//!    engine still delivers them.
//! 4. Settling claims the outcome cell first, then disposes the subscription,
//!    then wakes the task. No `RefCell` borrow is held across `dispose`, the
//!    predicate, or the waker.
//!
//! # Example
//!
//! ```
//! use std::convert::Infallible;
//! use futures::FutureExt;
//! use whenval_core::{Rejection, when_value_matching};
//! use whenval_harness::{ManualReactor, Source};
//!
//! let reactor = ManualReactor::lazy();
//! let name = Source::new(String::new());
//! let read = name.clone();
//! let wait = when_value_matching(
//!     &reactor,
//!     move || Ok::<_, Infallible>(read.get()),
//!     |n: &String| Ok(n.contains('b')),
//! );
//! let cancel = wait.cancel_handle();
//!
//! name.set("bar".into());
//! reactor.notify();
//! cancel.cancel(); // already resolved: no effect
//! assert_eq!(wait.now_or_never(), Some(Ok::<_, Rejection<Infallible>>("bar".to_string())));
//! ```

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, Waker};

use futures::future::FusedFuture;
use tracing::{debug, trace};

use crate::error::Rejection;
use crate::options::WaitOptions;
use crate::reactor::{Disposable, Reactor};

// ─── Wait ID generation ──────────────────────────────────────────────────────

static NEXT_WAIT_ID: AtomicU64 = AtomicU64::new(1);

fn next_wait_id() -> u64 {
    NEXT_WAIT_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Metrics counters ────────────────────────────────────────────────────────

static WAITS_STARTED_TOTAL: AtomicU64 = AtomicU64::new(0);
static WAITS_SETTLED_TOTAL: AtomicU64 = AtomicU64::new(0);
static WAITS_CANCELLED_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Total number of waits started in this process.
#[must_use]
pub fn waits_started_total() -> u64 {
    WAITS_STARTED_TOTAL.load(Ordering::Relaxed)
}

/// Total number of waits that resolved or were rejected with a user error.
#[must_use]
pub fn waits_settled_total() -> u64 {
    WAITS_SETTLED_TOTAL.load(Ordering::Relaxed)
}

/// Total number of waits cancelled while pending.
#[must_use]
pub fn waits_cancelled_total() -> u64 {
    WAITS_CANCELLED_TOTAL.load(Ordering::Relaxed)
}

// ─── State ───────────────────────────────────────────────────────────────────

/// Lifecycle state of a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitState {
    Pending,
    Resolved,
    Rejected,
    Cancelled,
}

impl WaitState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    fn of<T, E>(result: &Result<T, Rejection<E>>) -> Self {
        match result {
            Ok(_) => Self::Resolved,
            Err(Rejection::Cancelled) => Self::Cancelled,
            Err(Rejection::Failed(_)) => Self::Rejected,
        }
    }
}

enum Outcome<T, E> {
    Pending,
    Settled(Result<T, Rejection<E>>),
    /// Handed out by `poll`; keeps the terminal state for inspection.
    Taken(WaitState),
}

impl<T, E> Outcome<T, E> {
    fn state(&self) -> WaitState {
        match self {
            Self::Pending => WaitState::Pending,
            Self::Settled(result) => WaitState::of(result),
            Self::Taken(state) => *state,
        }
    }

    fn take_settled(&mut self) -> Option<Result<T, Rejection<E>>> {
        let state = match self {
            Self::Settled(result) => WaitState::of(result),
            Self::Pending | Self::Taken(_) => return None,
        };
        match mem::replace(self, Self::Taken(state)) {
            Self::Settled(result) => Some(result),
            Self::Pending | Self::Taken(_) => None,
        }
    }
}

// ─── Shared wait state ───────────────────────────────────────────────────────

struct WaitInner<T, E> {
    id: u64,
    name: Cow<'static, str>,
    outcome: RefCell<Outcome<T, E>>,
    subscription: RefCell<Option<Box<dyn Disposable>>>,
    waker: RefCell<Option<Waker>>,
    firings: Cell<u64>,
}

impl<T, E> WaitInner<T, E> {
    fn new(options: WaitOptions) -> Self {
        Self {
            id: next_wait_id(),
            name: options.into_name(),
            outcome: RefCell::new(Outcome::Pending),
            subscription: RefCell::new(None),
            waker: RefCell::new(None),
            firings: Cell::new(0),
        }
    }

    fn state(&self) -> WaitState {
        self.outcome.borrow().state()
    }

    fn is_pending(&self) -> bool {
        self.state() == WaitState::Pending
    }

    /// Store the handle returned by `observe`, or dispose it right away if a
    /// synchronous firing already settled the wait during registration.
    fn attach(&self, mut subscription: Box<dyn Disposable>) {
        if self.is_pending() {
            *self.subscription.borrow_mut() = Some(subscription);
        } else {
            trace!(
                wait_id = self.id,
                name = %self.name,
                "settled during registration; disposing subscription"
            );
            subscription.dispose();
        }
    }

    fn release(&self) {
        let subscription = self.subscription.borrow_mut().take();
        if let Some(mut subscription) = subscription {
            subscription.dispose();
        }
    }

    /// Count a firing; `false` if the wait is no longer listening.
    fn accept_firing(&self) -> bool {
        if !self.is_pending() {
            trace!(wait_id = self.id, name = %self.name, "firing after settlement ignored");
            return false;
        }
        let firing = self.firings.get() + 1;
        self.firings.set(firing);
        trace!(wait_id = self.id, name = %self.name, firing, "firing");
        true
    }

    /// Write the outcome if still pending. Returns whether this call won.
    fn settle(&self, result: Result<T, Rejection<E>>) -> bool {
        let state = WaitState::of(&result);
        {
            let mut outcome = self.outcome.borrow_mut();
            if !matches!(*outcome, Outcome::Pending) {
                return false;
            }
            *outcome = Outcome::Settled(result);
        }

        self.release();

        let firings = self.firings.get();
        match state {
            WaitState::Cancelled => {
                WAITS_CANCELLED_TOTAL.fetch_add(1, Ordering::Relaxed);
                debug!(wait_id = self.id, name = %self.name, firings, "wait cancelled");
            }
            WaitState::Resolved => {
                WAITS_SETTLED_TOTAL.fetch_add(1, Ordering::Relaxed);
                debug!(wait_id = self.id, name = %self.name, firings, "wait resolved");
            }
            WaitState::Rejected => {
                WAITS_SETTLED_TOTAL.fetch_add(1, Ordering::Relaxed);
                debug!(wait_id = self.id, name = %self.name, firings, "wait rejected");
            }
            WaitState::Pending => {}
        }

        let waker = self.waker.borrow_mut().take();
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    fn register_waker(&self, waker: &Waker) {
        let mut slot = self.waker.borrow_mut();
        match slot.as_ref() {
            Some(current) if current.will_wake(waker) => {}
            _ => *slot = Some(waker.clone()),
        }
    }

    fn cancel(&self) {
        if !self.settle(Err(Rejection::Cancelled)) {
            trace!(wait_id = self.id, name = %self.name, "cancel ignored; wait already settled");
        }
    }
}

/// Type-erased view used by [`CancelHandle`].
trait Cancel {
    fn cancel(&self);
    fn state(&self) -> WaitState;
}

impl<T, E> Cancel for WaitInner<T, E> {
    fn cancel(&self) {
        WaitInner::cancel(self);
    }

    fn state(&self) -> WaitState {
        WaitInner::state(self)
    }
}

// ─── WhenValue ───────────────────────────────────────────────────────────────

/// A cancellable single-shot future over a reactive expression.
///
/// Resolves with the first accepted value, or fails with a [`Rejection`].
/// Dropping a pending `WhenValue` disposes its subscription.
#[must_use = "a pending wait keeps its subscription until it is awaited, cancelled or dropped"]
pub struct WhenValue<T, E> {
    inner: Rc<WaitInner<T, E>>,
}

impl<T, E> WhenValue<T, E> {
    /// Unique identifier of this wait (for tracing/logging).
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The name given through [`WaitOptions`].
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn state(&self) -> WaitState {
        self.inner.state()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.is_pending()
    }

    /// Number of firings evaluated while pending.
    #[must_use]
    pub fn firings(&self) -> u64 {
        self.inner.firings.get()
    }

    /// Abandon the wait.
    ///
    /// While pending, disposes the subscription and settles with
    /// [`Rejection::Cancelled`]. Once settled, does nothing.
    pub fn cancel(&self) {
        self.inner.cancel();
    }
}

impl<T: 'static, E: 'static> WhenValue<T, E> {
    /// A detachable handle that can cancel this wait without owning it.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        let weak = Rc::downgrade(&self.inner);
        let target: Weak<dyn Cancel> = weak;
        CancelHandle {
            wait_id: self.inner.id,
            target,
        }
    }
}

impl<T, E> Future for WhenValue<T, E> {
    type Output = Result<T, Rejection<E>>;

    /// # Panics
    ///
    /// Panics if polled again after returning `Poll::Ready`.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut outcome = self.inner.outcome.borrow_mut();
        if let Some(result) = outcome.take_settled() {
            return Poll::Ready(result);
        }
        assert!(
            matches!(*outcome, Outcome::Pending),
            "`WhenValue` polled after completion"
        );
        drop(outcome);

        self.inner.register_waker(cx.waker());
        Poll::Pending
    }
}

impl<T, E> FusedFuture for WhenValue<T, E> {
    fn is_terminated(&self) -> bool {
        matches!(*self.inner.outcome.borrow(), Outcome::Taken(_))
    }
}

impl<T, E> Drop for WhenValue<T, E> {
    fn drop(&mut self) {
        if self.inner.is_pending() {
            debug!(
                wait_id = self.inner.id,
                name = %self.inner.name,
                "wait dropped while pending; disposing subscription"
            );
            self.inner.release();
        }
    }
}

impl<T, E> fmt::Debug for WhenValue<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhenValue")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("firings", &self.firings())
            .finish()
    }
}

// ─── CancelHandle ────────────────────────────────────────────────────────────

/// Cancels a [`WhenValue`] from elsewhere.
///
/// Cheaply cloneable. Inert once the wait has settled or been dropped.
#[derive(Clone)]
pub struct CancelHandle {
    wait_id: u64,
    target: Weak<dyn Cancel>,
}

impl CancelHandle {
    /// Cancel the wait if it is still pending.
    pub fn cancel(&self) {
        if let Some(target) = self.target.upgrade() {
            target.cancel();
        }
    }

    /// Whether the wait still exists and is pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.target
            .upgrade()
            .is_some_and(|target| target.state() == WaitState::Pending)
    }

    #[must_use]
    pub fn wait_id(&self) -> u64 {
        self.wait_id
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("wait_id", &self.wait_id)
            .field("pending", &self.is_pending())
            .finish()
    }
}

// ─── Entry points ────────────────────────────────────────────────────────────

/// Wait for the first value `expr` produces that is not `None`.
///
/// `expr` is re-evaluated by the reactor on every change. `Ok(None)` is the
/// unset value and keeps the wait pending; `Err(e)` rejects with
/// [`Rejection::Failed`] carrying `e`.
pub fn when_value<R, T, E, F>(reactor: &R, expr: F) -> WhenValue<T, E>
where
    R: Reactor,
    T: 'static,
    E: 'static,
    F: FnMut() -> Result<Option<T>, E> + 'static,
{
    when_value_with(reactor, WaitOptions::default(), expr)
}

/// [`when_value`] with explicit [`WaitOptions`].
pub fn when_value_with<R, T, E, F>(reactor: &R, options: WaitOptions, expr: F) -> WhenValue<T, E>
where
    R: Reactor,
    T: 'static,
    E: 'static,
    F: FnMut() -> Result<Option<T>, E> + 'static,
{
    start(reactor, options, expr, |wait: &WaitInner<T, E>, evaluation: Result<Option<T>, E>| match evaluation {
        Ok(Some(value)) => {
            wait.settle(Ok(value));
        }
        Ok(None) => {
            trace!(wait_id = wait.id, name = %wait.name, "value unset; still waiting");
        }
        Err(error) => {
            wait.settle(Err(Rejection::Failed(error)));
        }
    })
}

/// Wait for the first value of `expr` for which `predicate` returns `true`.
///
/// Every value reaches the predicate; there is no unset filtering. An error
/// from either closure rejects the wait with that error.
pub fn when_value_matching<R, T, E, F, P>(reactor: &R, expr: F, predicate: P) -> WhenValue<T, E>
where
    R: Reactor,
    T: 'static,
    E: 'static,
    F: FnMut() -> Result<T, E> + 'static,
    P: FnMut(&T) -> Result<bool, E> + 'static,
{
    when_value_matching_with(reactor, WaitOptions::default(), expr, predicate)
}

/// [`when_value_matching`] with explicit [`WaitOptions`].
pub fn when_value_matching_with<R, T, E, F, P>(
    reactor: &R,
    options: WaitOptions,
    expr: F,
    mut predicate: P,
) -> WhenValue<T, E>
where
    R: Reactor,
    T: 'static,
    E: 'static,
    F: FnMut() -> Result<T, E> + 'static,
    P: FnMut(&T) -> Result<bool, E> + 'static,
{
    start(reactor, options, expr, move |wait: &WaitInner<T, E>, evaluation: Result<T, E>| {
        let value = match evaluation {
            Ok(value) => value,
            Err(error) => {
                wait.settle(Err(Rejection::Failed(error)));
                return;
            }
        };
        match predicate(&value) {
            Ok(true) => {
                wait.settle(Ok(value));
            }
            Ok(false) => {
                trace!(wait_id = wait.id, name = %wait.name, "predicate not satisfied; still waiting");
            }
            Err(error) => {
                wait.settle(Err(Rejection::Failed(error)));
            }
        }
    })
}

fn start<R, T, E, X, F, H>(
    reactor: &R,
    options: WaitOptions,
    expr: F,
    mut on_firing: H,
) -> WhenValue<T, E>
where
    R: Reactor,
    T: 'static,
    E: 'static,
    X: 'static,
    F: FnMut() -> X + 'static,
    H: FnMut(&WaitInner<T, E>, X) + 'static,
{
    let inner = Rc::new(WaitInner::new(options));
    WAITS_STARTED_TOTAL.fetch_add(1, Ordering::Relaxed);
    debug!(wait_id = inner.id, name = %inner.name, "wait started");

    let weak = Rc::downgrade(&inner);
    let subscription = reactor.observe(expr, move |evaluation| {
        let Some(wait) = weak.upgrade() else {
            return;
        };
        if wait.accept_firing() {
            on_firing(&*wait, evaluation);
        }
    });
    inner.attach(Box::new(subscription));

    WhenValue { inner }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
