#![forbid(unsafe_code)]

//! Reactions: expressions re-run whenever something they read changes.
//!
//! # Design
//!
//! A reaction owns an expression and a callback. Each run evaluates the
//! expression inside [`track`], replaces its subscriptions with ones on the
//! freshly read dependencies, then hands the value to the callback. A change
//! to any dependency schedules the reaction through the batch queue, so a
//! batch of writes re-runs it once.
//!
//! # Invariants
//!
//! 1. The first run happens inside [`reaction`], before it returns. Changes
//!    the first callback makes to its own dependencies re-run it before
//!    `reaction` returns.
//! 2. After [`Reaction::dispose`] returns, the callback is never called again,
//!    even if a run was already queued.
//! 3. `dispose` is idempotent and may be called from inside the callback.
//! 4. Dependencies are re-tracked on every run; a branch no longer read no
//!    longer triggers.
//!
//! # Failure Modes
//!
//! - **Callback panics**: the panic propagates to whoever triggered the run.
//!   The body is not restored, so later triggers do nothing.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;
use whenval_core::{Disposable, Reactor};

use super::batch;
use super::observable::Subscription;
use super::tracking::track;

static NEXT_REACTION_ID: AtomicU64 = AtomicU64::new(1);

type Body = Box<dyn FnMut(&Rc<ReactionInner>)>;

struct ReactionInner {
    id: u64,
    disposed: Cell<bool>,
    body: RefCell<Option<Body>>,
    subscriptions: RefCell<Vec<Subscription>>,
    runs: Cell<u64>,
}

impl ReactionInner {
    fn run(self: &Rc<Self>) {
        if self.disposed.get() {
            return;
        }
        let body = self.body.borrow_mut().take();
        let Some(mut body) = body else {
            return;
        };
        self.runs.set(self.runs.get() + 1);
        trace!(reaction_id = self.id, run = self.runs.get(), "reaction run");
        body(self);
        if !self.disposed.get() {
            *self.body.borrow_mut() = Some(body);
        }
    }

    fn schedule(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        batch::schedule_reaction(
            self.id,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.run();
                }
            }),
        );
    }

    fn resubscribe(self: &Rc<Self>, subscriptions: Vec<Subscription>) {
        let previous = mem::replace(&mut *self.subscriptions.borrow_mut(), subscriptions);
        drop(previous);
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        trace!(reaction_id = self.id, runs = self.runs.get(), "reaction disposed");
        let subscriptions = mem::take(&mut *self.subscriptions.borrow_mut());
        drop(subscriptions);
        let body = self.body.borrow_mut().take();
        drop(body);
    }
}

/// Handle to a running reaction. Disposes it on drop.
#[must_use = "dropping a Reaction disposes it immediately"]
pub struct Reaction {
    inner: Rc<ReactionInner>,
}

impl Reaction {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Number of times the expression has been evaluated.
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.inner.runs.get()
    }

    /// Number of observables the latest run subscribed to.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.inner.subscriptions.borrow().len()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Stop reacting. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl Disposable for Reaction {
    fn dispose(&mut self) {
        self.inner.dispose();
    }
}

impl Drop for Reaction {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("id", &self.inner.id)
            .field("runs", &self.inner.runs.get())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

/// Run `expr` now and after every change to what it read, passing each value
/// to `on_change`.
pub fn reaction<T, F, C>(mut expr: F, mut on_change: C) -> Reaction
where
    T: 'static,
    F: FnMut() -> T + 'static,
    C: FnMut(T) + 'static,
{
    let inner = Rc::new(ReactionInner {
        id: NEXT_REACTION_ID.fetch_add(1, Ordering::Relaxed),
        disposed: Cell::new(false),
        body: RefCell::new(None),
        subscriptions: RefCell::new(Vec::new()),
        runs: Cell::new(0),
    });

    let body: Body = Box::new(move |this: &Rc<ReactionInner>| {
        let (value, deps) = track(&mut expr);
        if this.disposed.get() {
            return;
        }
        let weak = Rc::downgrade(this);
        let on_dependency_change: Rc<dyn Fn()> = Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.schedule();
            }
        });
        this.resubscribe(deps.subscribe_all(&on_dependency_change));
        on_change(value);
    });
    *inner.body.borrow_mut() = Some(body);

    // Writes made by the first callback queue until the body is back in place.
    batch::batch(|| inner.run());
    Reaction { inner }
}

/// The reference engine as a [`Reactor`].
///
/// `observe` is [`reaction`]: the first evaluation is delivered before
/// `observe` returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct Runtime;

impl Runtime {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Reactor for Runtime {
    type Handle = Reaction;

    fn observe<T, F, C>(&self, expr: F, on_change: C) -> Reaction
    where
        T: 'static,
        F: FnMut() -> T + 'static,
        C: FnMut(T) + 'static,
    {
        reaction(expr, on_change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Observable, batch::batch};
    use tracing_test::traced_test;

    fn recorder<T: Clone + 'static>() -> (Rc<RefCell<Vec<T>>>, impl FnMut(T) + 'static) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        (log, move |value: T| sink.borrow_mut().push(value))
    }

    #[test]
    fn runs_eagerly_then_on_change() {
        let name = Observable::new(String::new());
        let (log, sink) = recorder();
        let source = name.clone();
        let r = reaction(move || source.get(), sink);

        assert_eq!(*log.borrow(), vec![String::new()]);
        name.set("hello".into());
        name.set("bar".into());
        assert_eq!(*log.borrow(), vec!["".to_string(), "hello".into(), "bar".into()]);
        assert_eq!(r.runs(), 3);
        assert_eq!(r.dependency_count(), 1);
    }

    #[test]
    fn batch_runs_once() {
        let a = Observable::new(1);
        let b = Observable::new(2);
        let (log, sink) = recorder();
        let (ra, rb) = (a.clone(), b.clone());
        let r = reaction(move || ra.get() + rb.get(), sink);

        batch(|| {
            a.set(10);
            b.set(20);
        });
        assert_eq!(*log.borrow(), vec![3, 30]);
        assert_eq!(r.runs(), 2);
    }

    #[test]
    fn dependencies_are_retracked() {
        let use_left = Observable::new(true);
        let left = Observable::new("L");
        let right = Observable::new("R");
        let (log, sink) = recorder();
        let (u, l, rr) = (use_left.clone(), left.clone(), right.clone());
        let _r = reaction(move || if u.get() { l.get() } else { rr.get() }, sink);

        right.set("R2");
        assert_eq!(log.borrow().len(), 1);

        use_left.set(false);
        left.set("L2");
        assert_eq!(*log.borrow(), vec!["L", "R2"]);
        assert_eq!(left.subscriber_count(), 0);
    }

    #[test]
    fn dispose_stops_callbacks_and_unsubscribes() {
        let obs = Observable::new(0);
        let (log, sink) = recorder();
        let source = obs.clone();
        let r = reaction(move || source.get(), sink);
        assert_eq!(obs.subscriber_count(), 1);

        r.dispose();
        r.dispose();
        assert!(r.is_disposed());
        assert_eq!(obs.subscriber_count(), 0);
        obs.set(1);
        assert_eq!(*log.borrow(), vec![0]);
    }

    #[test]
    fn dispose_from_inside_callback() {
        let obs = Observable::new(0);
        let slot: Rc<RefCell<Option<Reaction>>> = Rc::new(RefCell::new(None));
        let calls = Rc::new(Cell::new(0));

        let (source, s, c) = (obs.clone(), Rc::clone(&slot), Rc::clone(&calls));
        let r = reaction(
            move || source.get(),
            move |v: i32| {
                c.set(c.get() + 1);
                if v == 2 {
                    if let Some(r) = s.borrow().as_ref() {
                        r.dispose();
                    }
                }
            },
        );
        *slot.borrow_mut() = Some(r);

        obs.set(1);
        obs.set(2);
        obs.set(3);
        assert_eq!(calls.get(), 3);
        assert!(slot.borrow().as_ref().is_some_and(Reaction::is_disposed));
    }

    #[test]
    fn dispose_cancels_a_queued_run() {
        let obs = Observable::new(0);
        let (log, sink) = recorder();
        let source = obs.clone();
        let r = reaction(move || source.get(), sink);

        batch(|| {
            obs.set(1);
            r.dispose();
        });
        assert_eq!(*log.borrow(), vec![0]);
    }

    #[test]
    fn drop_disposes() {
        let obs = Observable::new(0);
        let source = obs.clone();
        let r = reaction(move || source.get(), |_| {});
        drop(r);
        assert_eq!(obs.subscriber_count(), 0);
    }

    #[test]
    fn reaction_writing_another_observable() {
        let input = Observable::new(1);
        let doubled = Observable::new(0);
        let (i, d) = (input.clone(), doubled.clone());
        let _r = reaction(move || i.get(), move |v| d.set(v * 2));
        assert_eq!(doubled.get(), 2);

        input.set(4);
        assert_eq!(doubled.get(), 8);
    }

    #[test]
    fn runtime_is_a_reactor() {
        let obs = Observable::new(5);
        let (log, sink) = recorder();
        let source = obs.clone();
        let mut handle = Runtime.observe(move || source.get(), sink);
        obs.set(6);
        Disposable::dispose(&mut handle);
        obs.set(7);
        assert_eq!(*log.borrow(), vec![5, 6]);
    }

    #[traced_test]
    #[test]
    fn runs_and_disposal_are_logged() {
        let obs = Observable::new(0);
        let source = obs.clone();
        let r = reaction(move || source.get(), |_| {});
        obs.set(1);
        drop(r);
        assert!(logs_contain("reaction run"));
        assert!(logs_contain("reaction disposed"));
        assert!(logs_contain("batch flushed"));
    }

    #[test]
    fn first_callback_writing_own_dependency_reruns() {
        let obs = Observable::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (source, writer, log) = (obs.clone(), obs.clone(), Rc::clone(&seen));
        let r = reaction(
            move || source.get(),
            move |v: i32| {
                log.borrow_mut().push(v);
                if v == 0 {
                    writer.set(1);
                }
            },
        );

        assert_eq!(*seen.borrow(), vec![0, 1]);
        assert_eq!(r.runs(), 2);
        assert_eq!(obs.get(), 1);
    }
}
