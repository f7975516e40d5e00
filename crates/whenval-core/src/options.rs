//! Per-wait configuration.

use std::borrow::Cow;

/// Label used in log events when a wait has no name.
pub const DEFAULT_WAIT_NAME: &str = "when_value";

/// Options for a single `when_value*` call.
///
/// ```
/// use whenval_core::WaitOptions;
///
/// let opts = WaitOptions::new().with_name("session-ready");
/// assert_eq!(opts.name(), "session-ready");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitOptions {
    name: Option<Cow<'static, str>>,
}

impl WaitOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a name to every log event of this wait.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The configured name, or [`DEFAULT_WAIT_NAME`].
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_WAIT_NAME)
    }

    pub(crate) fn into_name(self) -> Cow<'static, str> {
        self.name.unwrap_or(Cow::Borrowed(DEFAULT_WAIT_NAME))
    }
}
