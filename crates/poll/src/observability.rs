//! Observability hooks for polling runs
//!
//! Every run emits [`PollEvent`]s to the hooks attached through
//! [`Poller::hook`](crate::Poller::hook). Two hooks ship with the crate:
//! [`LoggingHook`] forwards events to `tracing`, [`MetricsHook`] counts them.
//!
//! ```rust
//! use std::sync::Arc;
//! use skyline_poll::observability::{LogLevel, LoggingHook, MetricsHook, PollHooks};
//!
//! let metrics = Arc::new(MetricsHook::new());
//! let hooks = PollHooks::new()
//!     .with_hook(Arc::new(LoggingHook::new(LogLevel::Debug)))
//!     .with_hook(metrics.clone());
//! assert_eq!(hooks.len(), 2);
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::handle::PollState;

/// Lifecycle event of one polling run
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// The run was started
    Started {
        /// Run label
        label: String,
        /// Delay schedule name
        schedule: &'static str,
        /// Iteration limit (0 = unlimited)
        limit: u64,
    },
    /// The task is about to be invoked
    Invoked {
        /// Run label
        label: String,
        /// Zero-based iteration number
        iteration: u64,
    },
    /// The next invocation was scheduled
    Scheduled {
        /// Run label
        label: String,
        /// Iteration that will run after the delay
        iteration: u64,
        /// Delay before it
        delay: Duration,
    },
    /// The run ended as `Completed`, `Cancelled` or `LimitReached`
    Finished {
        /// Run label
        label: String,
        /// Terminal state
        state: PollState,
        /// Successful iterations
        iterations: u64,
    },
    /// The task failed and the run stopped
    Failed {
        /// Run label
        label: String,
        /// Successful iterations before the failure
        iterations: u64,
        /// Rendered task error
        error: String,
    },
}

impl PollEvent {
    /// Run label the event belongs to.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Started { label, .. }
            | Self::Invoked { label, .. }
            | Self::Scheduled { label, .. }
            | Self::Finished { label, .. }
            | Self::Failed { label, .. } => label,
        }
    }

    /// Whether this event reports a failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for PollEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started {
                label,
                schedule,
                limit,
            } => {
                write!(f, "{label} started ({schedule} schedule")?;
                if *limit > 0 {
                    write!(f, ", limit {limit}")?;
                }
                write!(f, ")")
            }
            Self::Invoked { label, iteration } => {
                write!(f, "{label} invoking iteration {iteration}")
            }
            Self::Scheduled {
                label,
                iteration,
                delay,
            } => write!(f, "{label} scheduled iteration {iteration} in {delay:?}"),
            Self::Finished {
                label,
                state,
                iterations,
            } => write!(f, "{label} finished: {state} after {iterations} iterations"),
            Self::Failed {
                label,
                iterations,
                error,
            } => write!(f, "{label} failed after {iterations} iterations: {error}"),
        }
    }
}

/// Receiver of poll events.
///
/// Events come from the run loop itself. A run whose tokio task panics
/// emits nothing further; its [`PollHandle`](crate::PollHandle) reports
/// [`PollState::Aborted`] instead.
pub trait PollHook: Send + Sync {
    /// Called for every event of a run the hook is attached to
    fn on_event(&self, event: &PollEvent);
}

/// Collection of hooks attached to a run
#[derive(Clone, Default)]
pub struct PollHooks {
    hooks: Arc<Vec<Arc<dyn PollHook>>>,
}

impl PollHooks {
    /// Create an empty collection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hook to the collection
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn PollHook>) -> Self {
        Arc::make_mut(&mut self.hooks).push(hook);
        self
    }

    /// Emit an event to all hooks
    pub fn emit(&self, event: &PollEvent) {
        for hook in self.hooks.iter() {
            hook.on_event(event);
        }
    }

    /// Number of attached hooks
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no hook is attached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl fmt::Debug for PollHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollHooks")
            .field("len", &self.hooks.len())
            .finish()
    }
}

/// Log level used by [`LoggingHook`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

/// Hook that writes events to `tracing`.
///
/// Failures are always logged at warn level or above.
#[derive(Debug, Clone, Copy)]
pub struct LoggingHook {
    level: LogLevel,
}

impl LoggingHook {
    /// Create a new logging hook
    #[must_use]
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }
}

impl PollHook for LoggingHook {
    fn on_event(&self, event: &PollEvent) {
        let level = if event.is_error() && !matches!(self.level, LogLevel::Error) {
            LogLevel::Warn
        } else {
            self.level
        };
        match level {
            LogLevel::Error => tracing::error!(poller = event.label(), "{event}"),
            LogLevel::Warn => tracing::warn!(poller = event.label(), "{event}"),
            LogLevel::Info => tracing::info!(poller = event.label(), "{event}"),
            LogLevel::Debug => tracing::debug!(poller = event.label(), "{event}"),
            LogLevel::Trace => tracing::trace!(poller = event.label(), "{event}"),
        }
    }
}

/// Hook that counts events
#[derive(Debug, Default)]
pub struct MetricsHook {
    started: AtomicU64,
    invocations: AtomicU64,
    scheduled: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
    limit_reached: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`MetricsHook`] counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Runs started
    pub started: u64,
    /// Task invocations
    pub invocations: u64,
    /// Delays scheduled
    pub scheduled: u64,
    /// Runs finished because their sink completed
    pub completed: u64,
    /// Runs stopped through `stop()`
    pub cancelled: u64,
    /// Runs that hit their iteration limit
    pub limit_reached: u64,
    /// Runs whose task failed
    pub failed: u64,
}

impl MetricsHook {
    /// Create a hook with all counters at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read all counters
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            invocations: self.invocations.load(Ordering::Relaxed),
            scheduled: self.scheduled.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            limit_reached: self.limit_reached.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl PollHook for MetricsHook {
    fn on_event(&self, event: &PollEvent) {
        let counter = match event {
            PollEvent::Started { .. } => &self.started,
            PollEvent::Invoked { .. } => &self.invocations,
            PollEvent::Scheduled { .. } => &self.scheduled,
            PollEvent::Finished { state, .. } => match state {
                PollState::Completed => &self.completed,
                PollState::Cancelled => &self.cancelled,
                PollState::LimitReached => &self.limit_reached,
                // Failures arrive as `PollEvent::Failed`.
                PollState::Running | PollState::Failed | PollState::Aborted => return,
            },
            PollEvent::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn finished(state: PollState) -> PollEvent {
        PollEvent::Finished {
            label: "volume-status".to_string(),
            state,
            iterations: 4,
        }
    }

    #[test]
    fn event_display() {
        let event = PollEvent::Started {
            label: "volume-status".to_string(),
            schedule: "sigmoid",
            limit: 20,
        };
        assert_eq!(
            event.to_string(),
            "volume-status started (sigmoid schedule, limit 20)"
        );

        let event = PollEvent::Scheduled {
            label: "volume-status".to_string(),
            iteration: 2,
            delay: Duration::from_millis(10),
        };
        assert_eq!(
            event.to_string(),
            "volume-status scheduled iteration 2 in 10ms"
        );

        assert_eq!(
            finished(PollState::LimitReached).to_string(),
            "volume-status finished: limit-reached after 4 iterations"
        );
    }

    #[test]
    fn failed_events_are_errors() {
        let event = PollEvent::Failed {
            label: "x".to_string(),
            iterations: 0,
            error: "503".to_string(),
        };
        assert!(event.is_error());
        assert_eq!(event.label(), "x");
        assert!(!finished(PollState::Cancelled).is_error());
    }

    #[test]
    fn metrics_hook_counts_terminations() {
        let hook = MetricsHook::new();
        hook.on_event(&PollEvent::Invoked {
            label: "x".to_string(),
            iteration: 0,
        });
        hook.on_event(&finished(PollState::Cancelled));
        hook.on_event(&finished(PollState::LimitReached));
        hook.on_event(&finished(PollState::Completed));

        assert_eq!(
            hook.snapshot(),
            MetricsSnapshot {
                invocations: 1,
                cancelled: 1,
                limit_reached: 1,
                completed: 1,
                ..MetricsSnapshot::default()
            }
        );
    }

    #[test]
    fn failures_are_counted_once() {
        let hook = MetricsHook::new();
        hook.on_event(&PollEvent::Failed {
            label: "x".to_string(),
            iterations: 2,
            error: "503".to_string(),
        });
        hook.on_event(&finished(PollState::Failed));
        hook.on_event(&finished(PollState::Aborted));

        assert_eq!(
            hook.snapshot(),
            MetricsSnapshot {
                failed: 1,
                ..MetricsSnapshot::default()
            }
        );
    }

    #[test]
    fn hooks_fan_out() {
        let first = Arc::new(MetricsHook::new());
        let second = Arc::new(MetricsHook::new());
        let hooks = PollHooks::new()
            .with_hook(first.clone())
            .with_hook(second.clone())
            .with_hook(Arc::new(LoggingHook::new(LogLevel::Info)));

        hooks.emit(&PollEvent::Started {
            label: "x".to_string(),
            schedule: "fixed",
            limit: 0,
        });

        assert_eq!(hooks.len(), 3);
        assert_eq!(first.snapshot().started, 1);
        assert_eq!(second.snapshot().started, 1);
    }
}
