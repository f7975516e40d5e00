#![forbid(unsafe_code)]

//! A small single-threaded reactive engine.
//!
//! - [`Observable`]: a shared, version-tracked value wrapper with change
//!   notification via subscriber callbacks.
//! - [`ObservableMap`]: a keyed container whose absent keys read as `None`.
//! - [`Subscription`]: RAII guard that automatically unsubscribes on drop.
//! - [`BatchScope`] / [`batch`]: defer notifications until the outermost
//!   scope exits.
//! - [`track`] / [`untracked`]: collect the observables read by a closure.
//! - [`Reaction`] / [`Runtime`]: re-run an expression whenever what it read
//!   changes. `Runtime` is the engine's [`Reactor`](whenval_core::Reactor).
//!
//! # Architecture
//!
//! Observables live behind `Rc` with `RefCell` interiors. Subscribers are
//! stored as `Weak` function pointers and cleaned up lazily during
//! notification. Writes queue notifications on a thread-local batch queue;
//! notifications queue reactions on the same queue, which drains
//! notifications before reactions.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. Subscribers are notified in registration order.
//! 3. Setting a value equal to the current value is a no-op (no version bump,
//!    no notifications).
//! 4. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.
//! 5. Within a `BatchScope`, values are updated immediately but notifications
//!    are deferred until the outermost scope exits.
//! 6. A reaction runs at most once per flush round, and never after disposal.

pub mod batch;
pub mod map;
pub mod observable;
pub mod reaction;
pub mod tracking;

pub use batch::{BatchScope, batch, is_batching};
pub use map::ObservableMap;
pub use observable::{Observable, Subscription};
pub use reaction::{Reaction, Runtime, reaction};
pub use tracking::{Dependencies, is_tracking, track, untracked};
