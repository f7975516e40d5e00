#![forbid(unsafe_code)]

//! Dependency tracking for reactive reads.
//!
//! [`track`] opens a frame on a thread-local stack; every [`Observable`]
//! read while that frame is on top records the observable once. Frames nest,
//! and [`untracked`] pushes an opaque frame that swallows reads.
//!
//! [`Observable`]: super::observable::Observable

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashSet;

use super::observable::Subscription;

/// Something a reaction can depend on.
pub(crate) trait Dependency {
    /// Subscribe `on_change` to every future change.
    fn subscribe_change(&self, on_change: Rc<dyn Fn()>) -> Subscription;
}

#[derive(Default)]
struct Frame {
    deps: Vec<Rc<dyn Dependency>>,
    seen: AHashSet<usize>,
}

thread_local! {
    /// `None` entries are untracked frames.
    static FRAMES: RefCell<Vec<Option<Frame>>> = const { RefCell::new(Vec::new()) };
}

/// Pops the frame it pushed, also on unwind.
struct FrameGuard {
    armed: bool,
}

impl FrameGuard {
    fn push(frame: Option<Frame>) -> Self {
        FRAMES.with(|frames| frames.borrow_mut().push(frame));
        Self { armed: true }
    }

    fn finish(mut self) -> Option<Frame> {
        self.armed = false;
        FRAMES.with(|frames| frames.borrow_mut().pop().flatten())
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if self.armed {
            FRAMES.with(|frames| {
                frames.borrow_mut().pop();
            });
        }
    }
}

/// The dependencies collected by [`track`], in first-read order.
#[derive(Default)]
pub struct Dependencies {
    deps: Vec<Rc<dyn Dependency>>,
}

impl Dependencies {
    #[must_use]
    pub fn len(&self) -> usize {
        self.deps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    pub(crate) fn subscribe_all(&self, on_change: &Rc<dyn Fn()>) -> Vec<Subscription> {
        self.deps
            .iter()
            .map(|dep| dep.subscribe_change(Rc::clone(on_change)))
            .collect()
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependencies")
            .field("len", &self.deps.len())
            .finish()
    }
}

/// Run `f` and collect every observable it reads.
pub fn track<R>(f: impl FnOnce() -> R) -> (R, Dependencies) {
    let guard = FrameGuard::push(Some(Frame::default()));
    let value = f();
    let deps = guard.finish().map(|frame| frame.deps).unwrap_or_default();
    (value, Dependencies { deps })
}

/// Run `f` without recording its reads in the enclosing [`track`] frame.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let guard = FrameGuard::push(None);
    let value = f();
    drop(guard);
    value
}

/// Whether a [`track`] frame is currently collecting reads.
#[must_use]
pub fn is_tracking() -> bool {
    FRAMES.with(|frames| matches!(frames.borrow().last(), Some(Some(_))))
}

/// Record a read of the dependency identified by `key`.
///
/// `dep` is only called when a frame is collecting and `key` is new to it.
pub(crate) fn record(key: usize, dep: impl FnOnce() -> Rc<dyn Dependency>) {
    FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        if let Some(Some(frame)) = frames.last_mut() {
            if frame.seen.insert(key) {
                frame.deps.push(dep());
            }
        }
    });
}
