//! Predicate-driven async retry
//!
//! [`async_task`] re-runs a task on the sigmoid schedule until its result
//! satisfies a predicate. Only successful results are inspected; a task
//! error ends the run immediately.
//!
//! ```rust,no_run
//! use skyline_poll::async_task;
//!
//! # #[derive(Clone)] struct Server { status: String }
//! # async fn show_server() -> Result<Server, std::io::Error> { unimplemented!() }
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let _server = async_task(show_server, |s: &Server| s.status == "ACTIVE", Some(30)).await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::sync::oneshot;

use crate::config::AsyncTaskConfig;
use crate::error::{ConfigError, PollError, PollResult};
use crate::handle::{PollHandle, PollState, StopHandle};
use crate::poller::Poller;
use crate::schedule::SigmoidDelay;
use crate::sink::Handler;

/// Future of the first task result accepted by the stop predicate.
///
/// Fails with [`PollError::LimitReached`] when the limit runs out first,
/// with [`PollError::Cancelled`] after [`stop`](Self::stop), or with the
/// task's own error. Dropping it stops the underlying poller.
pub struct AsyncTask<T, E> {
    handle: PollHandle<E>,
    result: oneshot::Receiver<T>,
}

impl<T, E> AsyncTask<T, E> {
    /// Cancel early, e.g. when the consumer goes away.
    pub fn stop(&self) {
        self.handle.stop();
    }

    /// A cloneable switch that stops this task.
    #[must_use]
    pub fn stopper(&self) -> StopHandle {
        self.handle.stopper()
    }

    /// Task invocations that have completed successfully so far.
    #[must_use]
    pub fn iterations(&self) -> u64 {
        self.handle.iterations()
    }

    /// Current state of the underlying poller.
    #[must_use]
    pub fn state(&self) -> PollState {
        self.handle.state()
    }
}

impl<T, E> fmt::Debug for AsyncTask<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTask")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl<T, E> Drop for AsyncTask<T, E> {
    fn drop(&mut self) {
        self.handle.stop();
    }
}

impl<T, E> Future for AsyncTask<T, E> {
    type Output = PollResult<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let outcome = ready!(Pin::new(&mut self.handle).poll(cx));
        // An accepted result wins even if the limit was hit on the same
        // iteration.
        if let Ok(value) = self.result.try_recv() {
            return Poll::Ready(Ok(value));
        }
        Poll::Ready(Err(match outcome {
            Ok(stats) => PollError::Cancelled {
                iterations: stats.iterations,
            },
            Err(error) => error,
        }))
    }
}

/// Re-run `task` until `stop_predicate` accepts its result.
///
/// Delays follow [`sigmoid_timing`](crate::sigmoid_timing). `limit` caps the
/// number of successful invocations; `None` polls until accepted, stopped or
/// failed.
pub fn async_task<F, Fut, T, E, P>(task: F, stop_predicate: P, limit: Option<u64>) -> AsyncTask<T, E>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: fmt::Display + Send + 'static,
    P: FnMut(&T) -> bool + Send + 'static,
{
    spawn(
        Poller::new()
            .named("async-task")
            .schedule(SigmoidDelay::DEFAULT)
            .limit(limit.unwrap_or(0)),
        task,
        stop_predicate,
    )
}

/// [`async_task`] driven by validated configuration.
pub fn async_task_with<F, Fut, T, E, P>(
    config: &AsyncTaskConfig,
    task: F,
    stop_predicate: P,
) -> Result<AsyncTask<T, E>, ConfigError>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: fmt::Display + Send + 'static,
    P: FnMut(&T) -> bool + Send + 'static,
{
    config.validate()?;
    let poller = Poller::new()
        .named(config.label.clone())
        .schedule(SigmoidDelay::from_config(&config.sigmoid)?)
        .limit(config.limit.unwrap_or(0));
    Ok(spawn(poller, task, stop_predicate))
}

fn spawn<F, Fut, T, E, P>(poller: Poller<SigmoidDelay>, task: F, mut stop_predicate: P) -> AsyncTask<T, E>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: fmt::Display + Send + 'static,
    P: FnMut(&T) -> bool + Send + 'static,
{
    let (sender, result) = oneshot::channel();
    let mut sender = Some(sender);
    let sink = Handler::new(move |value: T| {
        if !stop_predicate(&value) {
            return ControlFlow::Continue(());
        }
        if let Some(sender) = sender.take() {
            // The receiver only goes away with the AsyncTask, which stops
            // the run on drop.
            let _ = sender.send(value);
        }
        ControlFlow::Break(())
    });

    AsyncTask {
        handle: poller.start(task, sink),
        result,
    }
}
