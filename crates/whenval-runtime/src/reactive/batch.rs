#![forbid(unsafe_code)]

//! Deferred notification and reaction scheduling.
//!
//! Every observable write queues its notification here. Outside a
//! [`BatchScope`] the queue flushes before the write returns; inside one, the
//! flush waits until the outermost scope exits.
//!
//! A flush drains notifications first, then reactions, and repeats until both
//! queues are empty. Queued work is keyed: an observable already waiting to
//! notify, or a reaction already scheduled, is not queued twice.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::marker::PhantomData;

use ahash::AHashSet;
use tracing::trace;

type Job = Box<dyn FnOnce()>;

#[derive(Default)]
struct KeyedQueue<K> {
    jobs: VecDeque<(K, Job)>,
    queued: AHashSet<K>,
}

impl<K: Copy + Eq + std::hash::Hash> KeyedQueue<K> {
    fn push(&mut self, key: K, job: Job) {
        if self.queued.insert(key) {
            self.jobs.push_back((key, job));
        }
    }

    fn pop(&mut self) -> Option<Job> {
        let (key, job) = self.jobs.pop_front()?;
        self.queued.remove(&key);
        Some(job)
    }

    fn len(&self) -> usize {
        self.jobs.len()
    }
}

#[derive(Default)]
struct BatchState {
    depth: usize,
    flushing: bool,
    notifications: KeyedQueue<usize>,
    reactions: KeyedQueue<u64>,
}

thread_local! {
    static STATE: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// RAII guard that defers notifications until the outermost scope drops.
///
/// Values are updated immediately; only the notifications wait.
///
/// ```
/// use whenval_runtime::{BatchScope, Observable};
///
/// let count = Observable::new(0);
/// {
///     let _batch = BatchScope::new();
///     count.set(1);
///     count.set(2);
/// } // subscribers see 2, once
/// assert_eq!(count.get(), 2);
/// ```
#[must_use = "the batch ends when the scope is dropped"]
pub struct BatchScope {
    _not_send: PhantomData<*const ()>,
}

impl BatchScope {
    pub fn new() -> Self {
        STATE.with(|state| state.borrow_mut().depth += 1);
        Self {
            _not_send: PhantomData,
        }
    }

    /// Nesting depth of open scopes on this thread.
    #[must_use]
    pub fn depth() -> usize {
        STATE.with(|state| state.borrow().depth)
    }
}

impl Default for BatchScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BatchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScope")
            .field("depth", &Self::depth())
            .finish()
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        let should_flush = STATE.with(|state| {
            let mut state = state.borrow_mut();
            state.depth -= 1;
            state.depth == 0 && !state.flushing
        });
        if should_flush && !std::thread::panicking() {
            flush();
        }
    }
}

/// Clears the flushing flag even if a queued job panics.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        STATE.with(|state| state.borrow_mut().flushing = false);
    }
}

fn flush() {
    STATE.with(|state| state.borrow_mut().flushing = true);
    let _guard = FlushGuard;

    let mut notified = 0usize;
    let mut ran = 0usize;
    loop {
        let next = STATE.with(|state| {
            let mut state = state.borrow_mut();
            if let Some(job) = state.notifications.pop() {
                return Some((job, true));
            }
            state.reactions.pop().map(|job| (job, false))
        });
        let Some((job, is_notification)) = next else {
            break;
        };
        if is_notification {
            notified += 1;
        } else {
            ran += 1;
        }
        job();
    }
    if notified + ran > 0 {
        trace!(notified, reactions = ran, "batch flushed");
    }
}

/// Run `f` inside a [`BatchScope`].
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _scope = BatchScope::new();
    f()
}

/// Whether a batch scope is open on this thread.
#[must_use]
pub fn is_batching() -> bool {
    BatchScope::depth() > 0
}

/// Queue the notification of the observable identified by `key`.
pub(crate) fn defer_notification(key: usize, notify: Job) {
    let _scope = BatchScope::new();
    STATE.with(|state| state.borrow_mut().notifications.push(key, notify));
}

/// Queue a run of the reaction identified by `id`.
pub(crate) fn schedule_reaction(id: u64, run: Job) {
    let _scope = BatchScope::new();
    STATE.with(|state| state.borrow_mut().reactions.push(id, run));
}

/// Jobs waiting for the next flush, as `(notifications, reactions)`.
#[must_use]
pub fn pending() -> (usize, usize) {
    STATE.with(|state| {
        let state = state.borrow();
        (state.notifications.len(), state.reactions.len())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Observable;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn nested_scopes_flush_at_outermost() {
        let obs = Observable::new(0);
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        let _sub = obs.subscribe(move |_| c.set(c.get() + 1));

        {
            let _outer = BatchScope::new();
            {
                let _inner = BatchScope::new();
                obs.set(1);
                assert_eq!(BatchScope::depth(), 2);
            }
            assert_eq!(calls.get(), 0);
            assert_eq!(pending(), (1, 0));
            obs.set(2);
        }
        assert_eq!(calls.get(), 1);
        assert_eq!(pending(), (0, 0));
        assert!(!is_batching());
    }

    #[test]
    fn unbatched_write_flushes_immediately() {
        let obs = Observable::new(0);
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        let _sub = obs.subscribe(move |_| c.set(c.get() + 1));

        obs.set(1);
        assert_eq!(calls.get(), 1);
        obs.set(2);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn batch_returns_closure_value() {
        let value = batch(|| {
            assert!(is_batching());
            7
        });
        assert_eq!(value, 7);
        assert!(!is_batching());
    }

    #[test]
    fn duplicate_reaction_runs_once() {
        let runs = Rc::new(Cell::new(0));
        batch(|| {
            for _ in 0..3 {
                let r = Rc::clone(&runs);
                schedule_reaction(99, Box::new(move || r.set(r.get() + 1)));
            }
        });
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn notifications_drain_before_reactions() {
        let log = Rc::new(RefCell::new(Vec::new()));
        batch(|| {
            let l = Rc::clone(&log);
            schedule_reaction(1, Box::new(move || l.borrow_mut().push("reaction")));
            let l = Rc::clone(&log);
            defer_notification(1, Box::new(move || l.borrow_mut().push("notify")));
        });
        assert_eq!(*log.borrow(), vec!["notify", "reaction"]);
    }

    #[test]
    fn panicking_job_does_not_wedge_the_queue() {
        let result = std::panic::catch_unwind(|| {
            schedule_reaction(7, Box::new(|| panic!("job failed")));
        });
        assert!(result.is_err());

        let ran = Rc::new(Cell::new(false));
        let r = Rc::clone(&ran);
        schedule_reaction(8, Box::new(move || r.set(true)));
        assert!(ran.get());
    }
}
