//! Error types for polling runs

use thiserror::Error;

/// Why a polling run stopped without completing.
///
/// `LimitReached` and `Cancelled` are designed terminations rather than
/// failures; use [`PollError::is_task_failure`] to tell them apart from a
/// task that actually failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError<E> {
    /// The polled task returned an error. Polling is not retried.
    #[error("polled task failed: {0}")]
    Task(E),

    /// The configured iteration limit was reached
    #[error("poll limit reached after {iterations} iterations")]
    LimitReached {
        /// Number of successful iterations performed
        iterations: u64,
    },

    /// `stop()` was called on the handle
    #[error("polling was cancelled after {iterations} iterations")]
    Cancelled {
        /// Number of successful iterations performed
        iterations: u64,
    },

    /// The run's tokio task panicked or the runtime shut down under it
    #[error("polling run aborted: {reason}")]
    Aborted {
        /// Panic or shutdown description
        reason: String,
    },
}

impl<E> PollError<E> {
    /// Whether the run ended because `stop()` was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Whether the run ended by hitting its iteration limit.
    #[must_use]
    pub fn is_limit_reached(&self) -> bool {
        matches!(self, Self::LimitReached { .. })
    }

    /// Whether the run ended because the polled task failed.
    #[must_use]
    pub fn is_task_failure(&self) -> bool {
        matches!(self, Self::Task(_))
    }

    /// Successful iterations performed before the run stopped, when known.
    #[must_use]
    pub fn iterations(&self) -> Option<u64> {
        match self {
            Self::LimitReached { iterations } | Self::Cancelled { iterations } => Some(*iterations),
            Self::Task(_) | Self::Aborted { .. } => None,
        }
    }

    /// Extract the task's own error, if that is what stopped the run.
    pub fn into_task_error(self) -> Option<E> {
        match self {
            Self::Task(error) => Some(error),
            _ => None,
        }
    }

    /// Map the task error type, keeping designed terminations untouched.
    pub fn map_task<F, O>(self, f: F) -> PollError<O>
    where
        F: FnOnce(E) -> O,
    {
        match self {
            Self::Task(error) => PollError::Task(f(error)),
            Self::LimitReached { iterations } => PollError::LimitReached { iterations },
            Self::Cancelled { iterations } => PollError::Cancelled { iterations },
            Self::Aborted { reason } => PollError::Aborted { reason },
        }
    }
}

/// Result of a polling run or an async task
pub type PollResult<T, E> = Result<T, PollError<E>>;

/// Invalid polling configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A field holds a value outside its accepted range
    #[error("invalid value for `{field}`: {message}")]
    InvalidValue {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        message: String,
    },
}

impl ConfigError {
    /// Create an invalid value error
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}
