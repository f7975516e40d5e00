#![forbid(unsafe_code)]

//! Core: the reactive-wait combinator.
//!
//! [`when_value`] turns a reactive expression into a cancellable single-shot
//! future. The reactive engine is injected through the [`Reactor`] trait; this
//! crate never tracks dependencies itself.

pub mod error;
pub mod options;
pub mod reactor;
pub mod wait;

pub use error::{CANCELLED_MARKER, Rejection};
pub use options::WaitOptions;
pub use reactor::{DisposeFn, Disposable, Reactor};
pub use wait::{
    CancelHandle, WaitState, WhenValue, waits_cancelled_total, waits_settled_total,
    waits_started_total, when_value, when_value_matching, when_value_matching_with,
    when_value_with,
};
