//! Rejection reasons surfaced by a [`WhenValue`](crate::WhenValue).

use thiserror::Error;

/// Stable marker carried by a cancelled wait.
pub const CANCELLED_MARKER: &str = "WHEN_VALUE_CANCELLED";

/// Why a wait did not resolve.
///
/// `Failed` holds the exact error returned by the watch expression or the
/// predicate, moved in unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection<E> {
    /// The wait was cancelled while still pending.
    #[error("{}", CANCELLED_MARKER)]
    Cancelled,

    /// The watch expression or the predicate returned an error.
    #[error("{0}")]
    Failed(E),
}

impl<E> Rejection<E> {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The user error, if this is not a cancellation.
    #[must_use]
    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Cancelled => None,
            Self::Failed(error) => Some(error),
        }
    }

    #[must_use]
    pub fn into_error(self) -> Option<E> {
        match self {
            Self::Cancelled => None,
            Self::Failed(error) => Some(error),
        }
    }

    /// Map the user error, keeping cancellation as is.
    pub fn map_err<F>(self, f: impl FnOnce(E) -> F) -> Rejection<F> {
        match self {
            Self::Cancelled => Rejection::Cancelled,
            Self::Failed(error) => Rejection::Failed(f(error)),
        }
    }
}
