#![forbid(unsafe_code)]

//! A reactor driven by hand.
//!
//! [`ManualReactor`] has no dependency tracking. Every live registration is
//! re-evaluated on [`notify`](ManualReactor::notify), which lets a test script
//! exactly when firings happen and count what the combinator registered and
//! disposed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::trace;
use whenval_core::{Disposable, Reactor};

type Fire = Box<dyn FnMut()>;

struct Slot {
    id: u64,
    live: Cell<bool>,
    fire: RefCell<Option<Fire>>,
}

#[derive(Default)]
struct Shared {
    slots: RefCell<Vec<Rc<Slot>>>,
    next_id: Cell<u64>,
    registrations: Cell<usize>,
    dispose_calls: Cell<usize>,
    firings: Cell<usize>,
}

/// A [`Reactor`] whose firings happen only when the test says so.
///
/// Clones share registrations and counters.
#[derive(Clone)]
pub struct ManualReactor {
    eager: bool,
    shared: Rc<Shared>,
}

impl ManualReactor {
    /// Fires once during `observe`, then on every [`notify`](Self::notify).
    #[must_use]
    pub fn eager() -> Self {
        Self {
            eager: true,
            shared: Rc::default(),
        }
    }

    /// Fires only on [`notify`](Self::notify).
    #[must_use]
    pub fn lazy() -> Self {
        Self {
            eager: false,
            shared: Rc::default(),
        }
    }

    #[must_use]
    pub fn is_eager(&self) -> bool {
        self.eager
    }

    /// Re-evaluate every live registration and deliver its value.
    ///
    /// Returns how many registrations fired. Registrations disposed by an
    /// earlier firing in the same pass are skipped.
    pub fn notify(&self) -> usize {
        let slots: Vec<Rc<Slot>> = self.shared.slots.borrow().clone();
        let mut fired = 0;
        for slot in slots {
            if fire(&self.shared, &slot) {
                fired += 1;
            }
        }
        trace!(fired, "manual notify");
        fired
    }

    /// Number of `observe` calls so far.
    #[must_use]
    pub fn registrations(&self) -> usize {
        self.shared.registrations.get()
    }

    /// Number of `dispose` calls so far, repeated calls included.
    #[must_use]
    pub fn dispose_calls(&self) -> usize {
        self.shared.dispose_calls.get()
    }

    /// Registrations not yet disposed.
    #[must_use]
    pub fn live(&self) -> usize {
        self.shared.slots.borrow().len()
    }

    /// Total callback deliveries, eager ones included.
    #[must_use]
    pub fn firings(&self) -> usize {
        self.shared.firings.get()
    }
}

impl fmt::Debug for ManualReactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualReactor")
            .field("eager", &self.eager)
            .field("registrations", &self.registrations())
            .field("dispose_calls", &self.dispose_calls())
            .field("live", &self.live())
            .finish()
    }
}

fn fire(shared: &Shared, slot: &Slot) -> bool {
    if !slot.live.get() {
        return false;
    }
    let callback = slot.fire.borrow_mut().take();
    let Some(mut callback) = callback else {
        return false;
    };
    shared.firings.set(shared.firings.get() + 1);
    callback();
    if slot.live.get() {
        *slot.fire.borrow_mut() = Some(callback);
    }
    true
}

impl Reactor for ManualReactor {
    type Handle = ManualHandle;

    fn observe<T, F, C>(&self, mut expr: F, mut on_change: C) -> ManualHandle
    where
        T: 'static,
        F: FnMut() -> T + 'static,
        C: FnMut(T) + 'static,
    {
        let id = self.shared.next_id.get();
        self.shared.next_id.set(id + 1);
        self.shared
            .registrations
            .set(self.shared.registrations.get() + 1);

        let callback: Fire = Box::new(move || on_change(expr()));
        let slot = Rc::new(Slot {
            id,
            live: Cell::new(true),
            fire: RefCell::new(Some(callback)),
        });
        self.shared.slots.borrow_mut().push(Rc::clone(&slot));
        trace!(registration = id, eager = self.eager, "manual observe");

        if self.eager {
            fire(&self.shared, &slot);
        }

        ManualHandle {
            slot,
            shared: Rc::clone(&self.shared),
        }
    }
}

/// Registration handle of a [`ManualReactor`].
///
/// Dropping it does **not** dispose; only an explicit
/// [`Disposable::dispose`] counts.
pub struct ManualHandle {
    slot: Rc<Slot>,
    shared: Rc<Shared>,
}

impl ManualHandle {
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        !self.slot.live.get()
    }
}

impl Disposable for ManualHandle {
    fn dispose(&mut self) {
        self.shared
            .dispose_calls
            .set(self.shared.dispose_calls.get() + 1);
        if !self.slot.live.replace(false) {
            return;
        }
        trace!(registration = self.slot.id, "manual dispose");
        let callback = self.slot.fire.borrow_mut().take();
        drop(callback);
        let id = self.slot.id;
        self.shared.slots.borrow_mut().retain(|slot| slot.id != id);
    }
}

impl fmt::Debug for ManualHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualHandle")
            .field("registration", &self.slot.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
