//! Sequential async poller
//!
//! A run invokes its task immediately, hands every success to a
//! [`ResultSink`], then waits for the schedule's delay before the next
//! invocation. At most one invocation is ever in flight: the delay is armed
//! only after the previous task future has settled.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use skyline_poll::{Destination, Poller};
//!
//! # async fn fetch_balance() -> Result<u64, std::io::Error> { Ok(0) }
//! # async fn example() {
//! let (dest, mut balance) = Destination::new(0_u64);
//! let handle = Poller::new()
//!     .named("balance")
//!     .every(Duration::from_secs(30))
//!     .start(fetch_balance, dest);
//!
//! balance.changed().await.ok();
//! handle.stop();
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::PollConfig;
use crate::error::{ConfigError, PollError, PollResult};
use crate::handle::{PollHandle, PollState, PollStats, Shared};
use crate::observability::{PollEvent, PollHook, PollHooks};
use crate::schedule::{DEFAULT_INTERVAL, DelaySchedule};
use crate::sink::ResultSink;

/// Builder and launcher for polling runs.
#[derive(Debug, Clone)]
pub struct Poller<D = Duration> {
    schedule: D,
    limit: u64,
    label: String,
    hooks: PollHooks,
}

impl Poller<Duration> {
    /// Poll every 60 seconds with no iteration limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            schedule: DEFAULT_INTERVAL,
            limit: 0,
            label: "poll".to_string(),
            hooks: PollHooks::new(),
        }
    }

    /// Build a fixed-interval poller from validated configuration.
    pub fn from_config(config: &PollConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new()
            .every(config.interval)
            .limit(config.limit)
            .named(config.label.clone()))
    }
}

impl Default for Poller<Duration> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: DelaySchedule> Poller<D> {
    /// Use a fixed delay between iterations.
    pub fn every(self, interval: Duration) -> Poller<Duration> {
        self.schedule(interval)
    }

    /// Use an arbitrary delay schedule.
    pub fn schedule<S: DelaySchedule>(self, schedule: S) -> Poller<S> {
        Poller {
            schedule,
            limit: self.limit,
            label: self.label,
            hooks: self.hooks,
        }
    }

    /// Stop after `limit` successful iterations; 0 means unlimited.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Label used for the run's tracing span and events.
    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Attach an observability hook.
    pub fn hook(mut self, hook: Arc<dyn PollHook>) -> Self {
        self.hooks = self.hooks.with_hook(hook);
        self
    }

    /// Replace all hooks.
    pub fn hooks(mut self, hooks: PollHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Start polling `task` on the current tokio runtime.
    ///
    /// The first invocation happens right away. Must be called from within a
    /// tokio runtime.
    pub fn start<F, Fut, T, E, S>(self, task: F, sink: S) -> PollHandle<E>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
        S: ResultSink<T>,
    {
        let shared = Arc::new(Shared::new(self.label.clone()));
        let span = info_span!("poll", poller = %self.label, schedule = self.schedule.name());
        let run = Run {
            schedule: self.schedule,
            limit: self.limit,
            hooks: self.hooks,
            shared: Arc::clone(&shared),
        };
        let join = tokio::spawn(run.drive(task, sink).instrument(span));
        PollHandle::new(shared, join)
    }
}

/// Start a fixed-interval (or scheduled) poller.
///
/// `timeout` is either a [`Duration`] or any other [`DelaySchedule`];
/// `limit` of 0 means unlimited.
pub fn start_polling<F, Fut, T, E, S, D>(task: F, sink: S, timeout: D, limit: u64) -> PollHandle<E>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: fmt::Display + Send + 'static,
    S: ResultSink<T>,
    D: DelaySchedule,
{
    Poller::new().schedule(timeout).limit(limit).start(task, sink)
}

struct Run<D> {
    schedule: D,
    limit: u64,
    hooks: PollHooks,
    shared: Arc<Shared>,
}

impl<D: DelaySchedule> Run<D> {
    async fn drive<F, Fut, T, E, S>(self, mut task: F, mut sink: S) -> PollResult<PollStats, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        S: ResultSink<T>,
    {
        let started = Instant::now();
        self.emit(|label| PollEvent::Started {
            label,
            schedule: self.schedule.name(),
            limit: self.limit,
        });

        loop {
            let iteration = self.shared.iterations();
            debug!(iteration, "invoking task");
            self.emit(|label| PollEvent::Invoked { label, iteration });

            let value = match task().await {
                Ok(value) => value,
                Err(error) => {
                    warn!(iteration, error = %error, "polled task failed");
                    self.shared.finish(PollState::Failed);
                    self.emit(|label| PollEvent::Failed {
                        label,
                        iterations: iteration,
                        error: error.to_string(),
                    });
                    return Err(PollError::Task(error));
                }
            };

            // Apply before looking at the cancel flag: a result that was in
            // flight when stop() was called is still delivered.
            let flow = sink.apply(value);
            let completed = self.shared.advance();

            if self.limit != 0 && completed >= self.limit {
                return Err(self.stop_with(PollState::LimitReached, completed));
            }
            if flow.is_break() {
                self.finish(PollState::Completed, completed);
                return Ok(PollStats {
                    iterations: completed,
                    elapsed: started.elapsed(),
                });
            }
            if self.shared.token().is_cancelled() {
                return Err(self.stop_with(PollState::Cancelled, completed));
            }

            let delay = self.schedule.delay(completed);
            debug!(
                iteration = completed,
                delay_ms = delay.as_millis() as u64,
                "next poll scheduled"
            );
            self.emit(|label| PollEvent::Scheduled {
                label,
                iteration: completed,
                delay,
            });

            tokio::select! {
                biased;
                () = self.shared.token().cancelled() => {
                    return Err(self.stop_with(PollState::Cancelled, completed));
                }
                () = sleep(delay) => {}
            }
        }
    }

    fn stop_with<E>(&self, state: PollState, iterations: u64) -> PollError<E> {
        self.finish(state, iterations);
        match state {
            PollState::LimitReached => PollError::LimitReached { iterations },
            _ => PollError::Cancelled { iterations },
        }
    }

    fn finish(&self, state: PollState, iterations: u64) {
        info!(state = %state, iterations, "polling finished");
        self.shared.finish(state);
        self.emit(|label| PollEvent::Finished {
            label,
            state,
            iterations,
        });
    }

    fn emit(&self, event: impl FnOnce(String) -> PollEvent) {
        if self.hooks.is_empty() {
            return;
        }
        self.hooks.emit(&event(self.shared.label().to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MetricsHook;
    use crate::sink::{Destination, Handler, handler};
    use std::convert::Infallible;
    use std::ops::ControlFlow;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn counting_task(
        counter: Arc<AtomicU64>,
    ) -> impl FnMut() -> std::future::Ready<Result<u64, Infallible>> + Send + 'static {
        move || std::future::ready(Ok(counter.fetch_add(1, Ordering::SeqCst)))
    }

    #[tokio::test(start_paused = true)]
    async fn first_iteration_fires_immediately() {
        let calls = Arc::new(AtomicU64::new(0));
        let start = Instant::now();
        let handle = Poller::new()
            .every(Duration::from_secs(60))
            .limit(1)
            .start(counting_task(calls.clone()), handler(|_: u64| {}));

        let err = handle.await.unwrap_err();
        assert_eq!(err, PollError::LimitReached { iterations: 1 });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn default_interval_is_one_minute() {
        let calls = Arc::new(AtomicU64::new(0));
        let start = Instant::now();
        let handle = Poller::new()
            .limit(2)
            .start(counting_task(calls.clone()), handler(|_: u64| {}));

        handle.await.unwrap_err();
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn sink_break_completes_the_run() {
        let calls = Arc::new(AtomicU64::new(0));
        let sink = Handler::new(|n: u64| {
            if n == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        let handle = Poller::new()
            .every(Duration::from_millis(5))
            .start(counting_task(calls.clone()), sink);

        let stats = handle.await.unwrap();
        assert_eq!(stats.iterations, 3);
        assert_eq!(stats.elapsed, Duration::from_millis(10));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn limit_wins_over_sink_break() {
        let sink = Handler::new(|_: u64| ControlFlow::Break(()));
        let handle = Poller::new()
            .limit(1)
            .start(counting_task(Arc::new(AtomicU64::new(0))), sink);

        assert!(handle.await.unwrap_err().is_limit_reached());
    }

    #[tokio::test(start_paused = true)]
    async fn hooks_observe_the_run() {
        let metrics = Arc::new(MetricsHook::new());
        let (dest, rx) = Destination::new(u64::MAX);
        let handle = Poller::new()
            .every(Duration::from_millis(1))
            .limit(3)
            .hook(metrics.clone())
            .start(counting_task(Arc::new(AtomicU64::new(0))), dest);

        handle.await.unwrap_err();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.started, 1);
        assert_eq!(snapshot.invocations, 3);
        assert_eq!(snapshot.scheduled, 2);
        assert_eq!(snapshot.limit_reached, 1);
        assert_eq!(*rx.borrow(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_run_is_counted_once() {
        let metrics = Arc::new(MetricsHook::new());
        let handle = Poller::new()
            .hook(metrics.clone())
            .start(|| std::future::ready(Err::<u64, _>("timeout")), handler(|_: u64| {}));

        assert_eq!(handle.await.unwrap_err(), PollError::Task("timeout"));
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.invocations, 1);
        assert_eq!(snapshot.scheduled, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn from_config_applies_settings() {
        let config = PollConfig {
            interval: Duration::from_millis(250),
            limit: 2,
            label: "invoice-status".to_string(),
        };
        let start = Instant::now();
        let handle = Poller::from_config(&config)
            .unwrap()
            .start(counting_task(Arc::new(AtomicU64::new(0))), handler(|_: u64| {}));

        assert_eq!(handle.label(), "invoice-status");
        assert!(handle.await.unwrap_err().is_limit_reached());
        assert_eq!(start.elapsed(), Duration::from_millis(250));
    }

    #[test]
    fn from_config_rejects_invalid() {
        let config = PollConfig {
            interval: Duration::ZERO,
            ..PollConfig::default()
        };
        assert!(Poller::from_config(&config).is_err());
    }
}
