//! Where successful poll results go
//!
//! Three sinks are provided:
//!
//! - [`Destination`]: a latest-value cell owned by the poller. Readers hold a
//!   [`watch::Receiver`] and are only notified when the value actually
//!   changes.
//! - [`Handler`]: a callback that sees every result and may finish the run.
//! - [`mpsc::UnboundedSender`]: every result is streamed to a receiver; the
//!   run finishes once the receiver is gone.

use std::fmt;
use std::ops::ControlFlow;

use tokio::sync::{mpsc, watch};

/// Consumer of successful task results.
///
/// Returning `ControlFlow::Break(())` finishes the run as completed; no
/// further task invocation takes place.
pub trait ResultSink<T>: Send + 'static {
    /// Apply one result.
    fn apply(&mut self, value: T) -> ControlFlow<()>;
}

/// Poller-owned latest-value cell.
///
/// A result replaces the current contents only when it differs from them,
/// so equal results never wake readers.
pub struct Destination<T> {
    sender: watch::Sender<T>,
}

impl<T> Destination<T> {
    /// Create a destination holding `initial` and a reader for it.
    pub fn new(initial: T) -> (Self, watch::Receiver<T>) {
        let (sender, receiver) = watch::channel(initial);
        (Self { sender }, receiver)
    }

    /// Another reader of the same value.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    /// Current contents.
    pub fn borrow(&self) -> watch::Ref<'_, T> {
        self.sender.borrow()
    }
}

impl<T: PartialEq> Destination<T> {
    /// Replace the contents with `value` unless they are already equal.
    ///
    /// Returns whether a replacement (and notification) happened.
    pub fn replace(&self, value: T) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }
}

impl<T: fmt::Debug> fmt::Debug for Destination<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("value", &*self.sender.borrow())
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

impl<T> ResultSink<T> for Destination<T>
where
    T: PartialEq + Send + Sync + 'static,
{
    fn apply(&mut self, value: T) -> ControlFlow<()> {
        if !self.replace(value) {
            tracing::trace!("result unchanged, destination left as is");
        }
        ControlFlow::Continue(())
    }
}

/// Callback sink.
pub struct Handler<F> {
    f: F,
}

impl<F> Handler<F> {
    /// Callback deciding after each result whether the run goes on.
    pub fn new<T>(f: F) -> Self
    where
        F: FnMut(T) -> ControlFlow<()>,
    {
        Self { f }
    }
}

impl<F> fmt::Debug for Handler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").finish_non_exhaustive()
    }
}

impl<T, F> ResultSink<T> for Handler<F>
where
    F: FnMut(T) -> ControlFlow<()> + Send + 'static,
{
    fn apply(&mut self, value: T) -> ControlFlow<()> {
        (self.f)(value)
    }
}

/// Callback sink that observes every result and never finishes the run.
pub fn handler<T, F>(mut f: F) -> Handler<impl FnMut(T) -> ControlFlow<()> + Send + 'static>
where
    F: FnMut(T) + Send + 'static,
{
    Handler::new(move |value: T| {
        f(value);
        ControlFlow::Continue(())
    })
}

impl<T> ResultSink<T> for mpsc::UnboundedSender<T>
where
    T: Send + 'static,
{
    fn apply(&mut self, value: T) -> ControlFlow<()> {
        match self.send(value) {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => {
                tracing::debug!("result receiver dropped, finishing run");
                ControlFlow::Break(())
            }
        }
    }
}
