//! # Skyline Poll
//!
//! Sequential async polling for tokio applications: keep a view of a remote
//! resource fresh, or wait until it reaches a wanted state.
//!
//! ## Features
//!
//! - **Poller**: runs a task immediately, then again after every delay, one
//!   invocation at a time, until stopped, failed or out of iterations
//! - **Delay schedules**: fixed intervals, the sigmoid backoff curve, or any
//!   `iteration -> delay` function
//! - **Result sinks**: a deduplicating latest-value [`Destination`], a
//!   [`Handler`] callback, or an mpsc channel
//! - **Async task**: re-run a task until a predicate accepts its result
//! - **Observability**: `tracing` spans per run plus pluggable event hooks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use skyline_poll::prelude::*;
//! use std::time::Duration;
//!
//! # #[derive(Debug, Clone, PartialEq)] struct Volume { status: String }
//! # async fn show_volume() -> Result<Volume, std::io::Error> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Keep a view up to date every 10 seconds
//!     let (dest, volume) = Destination::new(show_volume().await?);
//!     let handle = start_polling(show_volume, dest, Duration::from_secs(10), 0);
//!
//!     // Wait until the volume is attached
//!     let attached = async_task(show_volume, |v: &Volume| v.status == "in-use", Some(40)).await?;
//!
//!     handle.stop();
//!     println!("{attached:?} / {:?}", *volume.borrow());
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

mod async_task;
mod config;
mod error;
mod handle;
pub mod observability;
mod poller;
pub mod schedule;
mod sink;

pub use async_task::{AsyncTask, async_task, async_task_with};
pub use config::{AsyncTaskConfig, MAX_INTERVAL, PollConfig, SigmoidConfig};
pub use error::{ConfigError, PollError, PollResult};
pub use handle::{PollHandle, PollState, PollStats, StopHandle, stop_polling};
pub use poller::{Poller, start_polling};
pub use schedule::{DEFAULT_INTERVAL, DelaySchedule, FnDelay, SigmoidDelay, sigmoid_timing};
pub use sink::{Destination, Handler, ResultSink, handler};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        AsyncTask, DelaySchedule, Destination, Handler, PollError, PollHandle, Poller,
        ResultSink, SigmoidDelay, async_task, handler, sigmoid_timing, start_polling,
        stop_polling,
    };
}
