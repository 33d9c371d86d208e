use std::fmt;
use thiserror::Error;

/// Boxed error raised from inside user-supplied helpers and callables.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Canonical message carried by every cancelled queue entry.
pub const CANCELLED_MESSAGE: &str = "The task was canceled.";

#[derive(Debug, Error)]
pub enum I18nError {
    #[error("Bad configuration: {0}")]
    BadConfiguration(String),

    #[error("Failed to load locale data for '{locale}': {reason}")]
    MissingLocaleData { locale: String, reason: String },

    #[error("Missing translation for key '{key}' (locale: {locale})")]
    MissingKey { key: String, locale: String },

    #[error("Unknown helper '{0}'")]
    UnknownHelper(String),

    #[error("Invalid regex '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("Unsupported value at '{key}': {reason}")]
    UnsupportedValueShape { key: String, reason: String },

    #[error("Cannot load locale '{0}' in memory while running file-backed")]
    LoadNotAllowed(String),

    #[error("Helper failed: {0}")]
    Helper(#[source] BoxError),
}

impl I18nError {
    /// Errors raised by user code; these propagate regardless of strict mode.
    pub fn is_user_error(&self) -> bool {
        matches!(self, I18nError::Helper(_))
    }
}

pub type I18nResult<T> = Result<T, I18nError>;

/// Outcome of a queued task that did not produce a value.
#[derive(Debug, Error, PartialEq)]
pub enum QueueError<E> {
    #[error("{}", CANCELLED_MESSAGE)]
    Cancelled,

    #[error("Bad argument: {0}")]
    BadArgument(String),

    #[error("Queue is full ({limit} pending entries)")]
    Full { limit: usize },

    #[error("Task was dropped before it settled")]
    Closed,

    #[error("Task failed: {0}")]
    Task(E),
}

impl<E> QueueError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueueError::Cancelled)
    }

    /// Returns the task's own error, if that is what this is.
    pub fn into_task_error(self) -> Option<E> {
        match self {
            QueueError::Task(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RateLimitError {
    #[error("Bad argument: {0}")]
    BadArgument(String),

    #[error("Rate limiter requires a running tokio runtime")]
    NoRuntime,
}

pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Wraps a plain message as a [`BoxError`] so helpers can fail with text.
#[derive(Debug)]
pub struct HelperMessage(pub String);

impl fmt::Display for HelperMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for HelperMessage {}

impl HelperMessage {
    pub fn boxed(msg: impl Into<String>) -> BoxError {
        Box::new(HelperMessage(msg.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_message_is_canonical() {
        let err: QueueError<String> = QueueError::Cancelled;
        assert_eq!(err.to_string(), CANCELLED_MESSAGE);
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_task_error_passthrough() {
        let err: QueueError<&str> = QueueError::Task("boom");
        assert!(!err.is_cancelled());
        assert_eq!(err.into_task_error(), Some("boom"));
    }

    #[test]
    fn test_helper_error_is_user_error() {
        let err = I18nError::Helper(HelperMessage::boxed("nope"));
        assert!(err.is_user_error());
        assert_eq!(err.to_string(), "Helper failed: nope");
        assert!(!I18nError::UnknownHelper("x".into()).is_user_error());
    }
}
