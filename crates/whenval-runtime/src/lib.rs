#![forbid(unsafe_code)]

//! Reference reactive engine for `whenval`.
//!
//! [`Runtime`] implements [`whenval_core::Reactor`] on top of observables,
//! batching and dependency-tracking reactions.

pub mod reactive;

pub use reactive::{
    BatchScope, Dependencies, Observable, ObservableMap, Reaction, Runtime, Subscription, batch,
    is_batching, is_tracking, reaction, track, untracked,
};
