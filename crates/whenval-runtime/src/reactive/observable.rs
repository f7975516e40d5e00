#![forbid(unsafe_code)]

//! Shared, version-tracked values with change notification.
//!
//! # Invariants
//!
//! 1. `version` increments exactly once per mutation that changes the value.
//! 2. Subscribers are notified in registration order, with the value current
//!    at notification time.
//! 3. `set` with a value equal to the current one is a no-op.
//! 4. A dropped [`Subscription`] is never called again.
//! 5. Notifications go through the batch queue, so one observable notifies at
//!    most once per flush however many times it was written.
//!
//! # Failure Modes
//!
//! - **Subscriber writes the same observable**: the value is borrowed while
//!   subscribers run, so the write panics like any `RefCell` conflict.
//!   Reactions are unaffected: they are queued and run after notification.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::batch;
use super::tracking::{self, Dependency};

type Callback<T> = dyn Fn(&T);

struct ObservableInner<T> {
    value: RefCell<T>,
    version: Cell<u64>,
    subscribers: RefCell<Vec<Weak<Callback<T>>>>,
}

impl<T: 'static> ObservableInner<T> {
    fn key(self: &Rc<Self>) -> usize {
        Rc::as_ptr(self).cast::<()>() as usize
    }

    fn subscribe(&self, callback: Rc<Callback<T>>) -> Subscription {
        self.subscribers.borrow_mut().push(Rc::downgrade(&callback));
        Subscription {
            _callback: Box::new(callback),
        }
    }

    /// Record the change and queue a notification.
    fn changed(self: &Rc<Self>) {
        self.version.set(self.version.get() + 1);
        let weak = Rc::downgrade(self);
        batch::defer_notification(
            self.key(),
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.notify();
                }
            }),
        );
    }

    fn notify(&self) {
        let live: Vec<Rc<Callback<T>>> = {
            let mut subscribers = self.subscribers.borrow_mut();
            subscribers.retain(|weak| weak.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        if live.is_empty() {
            return;
        }
        let value = self.value.borrow();
        for callback in &live {
            callback(&value);
        }
    }
}

impl<T: 'static> Dependency for ObservableInner<T> {
    fn subscribe_change(&self, on_change: Rc<dyn Fn()>) -> Subscription {
        self.subscribe(Rc::new(move |_: &T| on_change()))
    }
}

/// A shared, version-tracked value.
///
/// Cloning an `Observable` creates a new handle to the **same** value.
/// Reading it inside [`track`](super::track) records it as a dependency.
pub struct Observable<T> {
    inner: Rc<ObservableInner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

impl<T: Default + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: 'static> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(ObservableInner {
                value: RefCell::new(value),
                version: Cell::new(0),
                subscribers: RefCell::new(Vec::new()),
            }),
        }
    }

    fn track_read(&self) {
        tracking::record(self.inner.key(), || {
            Rc::clone(&self.inner) as Rc<dyn Dependency>
        });
    }

    /// Borrow the value, recording the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track_read();
        f(&self.inner.value.borrow())
    }

    /// Borrow the value without recording the read.
    pub fn peek<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Mutate in place. Always counts as a change.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.value.borrow_mut());
        self.inner.changed();
    }

    /// Number of changes so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Call `callback` with the value after every change.
    ///
    /// The callback stays registered until the returned [`Subscription`] is
    /// dropped.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.inner.subscribe(Rc::new(callback))
    }

    /// Live subscribers, including reaction subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// Clone the value, recording the read.
    #[must_use]
    pub fn get(&self) -> T {
        self.with(T::clone)
    }
}

impl<T: PartialEq + 'static> Observable<T> {
    /// Replace the value. Equal values are ignored.
    pub fn set(&self, value: T) {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return;
            }
            *current = value;
        }
        self.inner.changed();
    }
}

/// Keeps a subscriber callback registered. Unsubscribes on drop.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    _callback: Box<dyn Any>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
