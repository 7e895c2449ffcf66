//! Handles to running polls

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{PollError, PollResult};

/// Lifecycle state of a polling run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollState {
    /// Still polling
    Running,
    /// The sink finished the run
    Completed,
    /// `stop()` was called
    Cancelled,
    /// The iteration limit was reached
    LimitReached,
    /// The task failed
    Failed,
    /// The run's tokio task panicked or was torn down
    Aborted,
}

impl PollState {
    /// Whether the run is over.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Stable name for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::LimitReached => "limit-reached",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a run that completed through its sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollStats {
    /// Successful iterations, including the final one
    pub iterations: u64,
    /// Time from start to completion
    pub elapsed: Duration,
}

/// State shared between a handle and its run loop.
#[derive(Debug)]
pub(crate) struct Shared {
    label: String,
    token: CancellationToken,
    iterations: AtomicU64,
    state: Mutex<PollState>,
}

impl Shared {
    pub(crate) fn new(label: String) -> Self {
        Self {
            label,
            token: CancellationToken::new(),
            iterations: AtomicU64::new(0),
            state: Mutex::new(PollState::Running),
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Acquire)
    }

    /// Count one applied result and return the new total.
    pub(crate) fn advance(&self) -> u64 {
        self.iterations.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn state(&self) -> PollState {
        *self.state.lock()
    }

    /// Record the terminal state. Only the first transition sticks.
    pub(crate) fn finish(&self, terminal: PollState) {
        let mut state = self.state.lock();
        if *state == PollState::Running {
            *state = terminal;
        }
    }

    pub(crate) fn stop(&self) {
        if self.state().is_terminal() || self.token.is_cancelled() {
            return;
        }
        tracing::debug!(poller = %self.label, "stop requested");
        self.token.cancel();
    }
}

/// Cloneable stop switch for a run, detached from the handle.
#[derive(Debug, Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    /// Stop the run. See [`PollHandle::stop`].
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Whether `stop()` has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.token().is_cancelled()
    }
}

/// Handle to one polling run.
///
/// Awaiting the handle yields the reason the run ended: `Ok` when the sink
/// finished it, otherwise the [`PollError`] describing the stop. Dropping the
/// handle does not stop the run; call [`stop`](Self::stop) for that.
pub struct PollHandle<E> {
    shared: Arc<Shared>,
    join: JoinHandle<PollResult<PollStats, E>>,
}

impl<E> PollHandle<E> {
    pub(crate) fn new(shared: Arc<Shared>, join: JoinHandle<PollResult<PollStats, E>>) -> Self {
        Self { shared, join }
    }

    /// Stop polling.
    ///
    /// Cancels the pending delay so no further invocation takes place. A task
    /// already in flight is not interrupted: its result is still delivered to
    /// the sink before the run settles as cancelled. Calling this more than
    /// once, or after the run has ended, does nothing.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// A cloneable switch that stops this run.
    #[must_use]
    pub fn stopper(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Successful iterations so far.
    #[must_use]
    pub fn iterations(&self) -> u64 {
        self.shared.iterations()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PollState {
        self.shared.state()
    }

    /// Whether the run has reached a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Label given to the run.
    #[must_use]
    pub fn label(&self) -> &str {
        self.shared.label()
    }
}

impl<E> fmt::Debug for PollHandle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollHandle")
            .field("label", &self.shared.label())
            .field("state", &self.state())
            .field("iterations", &self.iterations())
            .finish()
    }
}

impl<E> Future for PollHandle<E> {
    type Output = PollResult<PollStats, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let outcome = ready!(Pin::new(&mut self.join).poll(cx));
        Poll::Ready(outcome.unwrap_or_else(|join_error| {
            self.shared.finish(PollState::Aborted);
            Err(PollError::Aborted {
                reason: join_error.to_string(),
            })
        }))
    }
}

/// Stop a run. Same as [`PollHandle::stop`].
pub fn stop_polling<E>(handle: &PollHandle<E>) {
    handle.stop();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_terminal_state_sticks() {
        let shared = Shared::new("t".to_string());
        assert_eq!(shared.state(), PollState::Running);

        shared.finish(PollState::LimitReached);
        shared.finish(PollState::Cancelled);
        assert_eq!(shared.state(), PollState::LimitReached);
    }

    #[test]
    fn stop_after_finish_is_a_no_op() {
        let shared = Shared::new("t".to_string());
        shared.finish(PollState::Failed);
        shared.stop();
        assert!(!shared.token().is_cancelled());
    }

    #[test]
    fn stop_is_idempotent() {
        let shared = Shared::new("t".to_string());
        shared.stop();
        shared.stop();
        assert!(shared.token().is_cancelled());
        assert_eq!(shared.state(), PollState::Running);
    }

    #[test]
    fn advance_counts_up() {
        let shared = Shared::new("t".to_string());
        assert_eq!(shared.advance(), 1);
        assert_eq!(shared.advance(), 2);
        assert_eq!(shared.iterations(), 2);
    }

    #[test]
    fn state_names() {
        assert_eq!(PollState::LimitReached.to_string(), "limit-reached");
        assert!(PollState::Aborted.is_terminal());
        assert!(!PollState::Running.is_terminal());
    }

    #[tokio::test]
    async fn panicking_run_resolves_as_aborted() {
        let shared = Arc::new(Shared::new("t".to_string()));
        let exploded = true;
        let join = tokio::spawn(async move {
            assert!(!exploded, "task exploded");
            Ok::<_, PollError<()>>(PollStats {
                iterations: 0,
                elapsed: Duration::ZERO,
            })
        });
        let handle = PollHandle::new(Arc::clone(&shared), join);

        let err = handle.await.unwrap_err();
        assert!(matches!(err, PollError::Aborted { .. }));
        assert_eq!(shared.state(), PollState::Aborted);
    }
}
