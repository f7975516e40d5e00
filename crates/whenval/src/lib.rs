#![forbid(unsafe_code)]

//! whenval public facade crate.
//!
//! Wait for a reactive expression to produce a value:
//!
//! ```
//! # #[cfg(feature = "runtime")] {
//! use std::convert::Infallible;
//! use futures::FutureExt;
//! use whenval::prelude::*;
//!
//! let name = Observable::new(String::new());
//! let source = name.clone();
//! let wait = when_value_matching(
//!     &Runtime,
//!     move || Ok::<_, Infallible>(source.get()),
//!     |n: &String| Ok(n.contains('b')),
//! );
//!
//! name.set("bar".into());
//! assert_eq!(wait.now_or_never(), Some(Ok("bar".to_string())));
//! # }
//! ```

pub use whenval_core::{
    CANCELLED_MARKER, CancelHandle, DisposeFn, Disposable, Reactor, Rejection, WaitOptions,
    WaitState, WhenValue, when_value, when_value_matching, when_value_matching_with,
    when_value_with,
};

pub mod diagnostics {
    //! Process-wide wait counters.
    pub use whenval_core::{waits_cancelled_total, waits_settled_total, waits_started_total};
}

pub mod prelude {
    pub use whenval_core as core;
    pub use whenval_core::{
        CancelHandle, Rejection, WaitOptions, WhenValue, when_value, when_value_matching,
    };

    #[cfg(feature = "runtime")]
    pub use whenval_runtime as runtime;
    #[cfg(feature = "runtime")]
    pub use whenval_runtime::{Observable, ObservableMap, Runtime, batch};
}

#[cfg(feature = "runtime")]
pub use whenval_runtime as runtime;
