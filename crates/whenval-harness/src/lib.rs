#![forbid(unsafe_code)]

//! Test harness for `whenval` waits.
//!
//! [`ManualReactor`] fires only when told to and counts every registration
//! and disposal, so tests can check exactly what a wait did with its
//! subscription. [`Source`] holds the values scripted expressions read.

pub mod manual;
pub mod source;

pub use manual::{ManualHandle, ManualReactor};
pub use source::Source;
