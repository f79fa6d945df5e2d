//! Cancellable status polling.
//!
//! A [`StatusMonitor`] owns one background task that polls a status fetch on
//! a fixed interval and forwards *changes* through a bounded channel:
//!
//! ```text
//!   fetch() ──► same as last? ──yes──► sleep(interval) ──┐
//!      ▲             │ no                                 │
//!      │             ▼                                    │
//!      │     StatusChanged(s) ──► channel (16) ──► next_event() / Stream
//!      └──────────────────────────────────────────────────┘
//! ```
//!
//! Failed fetches are logged and delivered as [`MonitorEvent::PollError`];
//! the loop keeps going. The task ends after delivering a terminal status,
//! when the handle is cancelled, or when the handle is dropped.

use crate::error::{Error, Result};
use futures::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Capacity of the event channel between the poll task and the consumer.
pub const EVENT_BUFFER: usize = 16;

/// A lifecycle status that a monitor can track.
pub trait LifecycleStatus: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// True once no further transition can happen.
    fn is_terminal(&self) -> bool;
}

/// Something the monitor observed.
#[derive(Debug)]
pub enum MonitorEvent<S> {
    /// The status differs from the last delivered one.
    StatusChanged(S),
    /// A fetch failed. Polling continues.
    PollError(Error),
}

impl<S> MonitorEvent<S> {
    /// The new status, if this is a change event.
    #[must_use]
    pub fn status(&self) -> Option<&S> {
        match self {
            Self::StatusChanged(s) => Some(s),
            Self::PollError(_) => None,
        }
    }
}

/// Handle to a running status poll.
pub struct StatusMonitor<S> {
    events: mpsc::Receiver<MonitorEvent<S>>,
    cancel_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    cancelled: bool,
}

impl<S: LifecycleStatus> StatusMonitor<S> {
    /// Start polling `fetch` every `interval`. The first poll is immediate.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, Fut>(mut fetch: F, interval: Duration) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<S>> + Send + 'static,
    {
        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut last: Option<S> = None;
            loop {
                let polled = tokio::select! {
                    biased;
                    _ = cancel_rx.changed() => break,
                    polled = fetch() => polled,
                };

                let event = match polled {
                    Ok(status) if last.as_ref() == Some(&status) => None,
                    Ok(status) => {
                        debug!("Status changed to {status:?}");
                        last = Some(status.clone());
                        Some(MonitorEvent::StatusChanged(status))
                    }
                    Err(e) => {
                        warn!("Status poll failed: {e}");
                        Some(MonitorEvent::PollError(e))
                    }
                };

                if let Some(event) = event {
                    tokio::select! {
                        biased;
                        _ = cancel_rx.changed() => break,
                        sent = tx.send(event) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }

                if last.as_ref().is_some_and(LifecycleStatus::is_terminal) {
                    debug!("Terminal status reached, monitor stopping");
                    break;
                }

                tokio::select! {
                    biased;
                    _ = cancel_rx.changed() => break,
                    () = tokio::time::sleep(interval) => {}
                }
            }
        });

        Self {
            events,
            cancel_tx,
            task: Some(task),
            cancelled: false,
        }
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the monitor has stopped or been cancelled.
    pub async fn next_event(&mut self) -> Option<MonitorEvent<S>> {
        if self.cancelled {
            return None;
        }
        self.events.recv().await
    }

    /// Stop polling. No event is yielded after this returns.
    ///
    /// An in-flight fetch is dropped at its next suspension point; its result
    /// is never delivered.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancel_tx.send_replace(true);
        self.events.close();
        while self.events.try_recv().is_ok() {}
        self.cancelled = true;
        debug!("Status monitor cancelled");
    }

    /// True after [`cancel`](Self::cancel).
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// True once the poll task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Hand every event to `observer` on a dedicated task.
    ///
    /// The observer runs sequentially, never concurrently with itself.
    /// [`ObserverHandle::cancel`] waits for the driver task, so the observer
    /// is not called again once it returns.
    pub fn observe<F>(self, mut observer: F) -> ObserverHandle
    where
        F: FnMut(MonitorEvent<S>) + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let mut monitor = self;
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    event = monitor.next_event() => match event {
                        Some(event) => observer(event),
                        None => break,
                    },
                }
            }
            monitor.cancel();
        });
        ObserverHandle {
            stop_tx,
            task: Some(task),
        }
    }
}

impl<S> Drop for StatusMonitor<S> {
    fn drop(&mut self) {
        self.cancel_tx.send_replace(true);
    }
}

impl<S: LifecycleStatus> Stream for StatusMonitor<S> {
    type Item = MonitorEvent<S>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.cancelled {
            return Poll::Ready(None);
        }
        this.events.poll_recv(cx)
    }
}

impl<S> fmt::Debug for StatusMonitor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusMonitor")
            .field("cancelled", &self.cancelled)
            .finish_non_exhaustive()
    }
}

/// Handle to an observer driven by [`StatusMonitor::observe`].
#[derive(Debug)]
pub struct ObserverHandle {
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ObserverHandle {
    /// Stop observing and wait for the driver task to exit.
    pub async fn cancel(mut self) {
        self.stop_tx.send_replace(true);
        self.wait().await;
    }

    /// Wait until the monitor stops on its own (terminal status).
    pub async fn join(mut self) {
        self.wait().await;
    }

    /// True once the driver task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    async fn wait(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Status observer task failed: {e}");
            }
        }
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
    }
}
