//! Single-consumer notification dispatcher.
//!
//! Operations run as independent tasks. When one completes it pushes its
//! whole batch of events onto an unbounded channel; the dispatcher task is the
//! only reader of that channel and awaits the observer for each notification
//! before taking the next. This gives the host:
//!
//! - **Completion order**: batches are enqueued at the instant an operation
//!   finishes, so a later-issued operation that finishes first is delivered
//!   first
//! - **No overlap**: one observer call at a time
//! - **Atomic batches**: an error and its terminal event are enqueued
//!   together and never interleave with another operation's events
//!
//! ```text
//! task A ──┐
//! task B ──┼──► mpsc<Vec<Notification>> ──► dispatcher loop ──► observer
//! task C ──┘
//! ```

use std::sync::Arc;

use tokio::sync::{Notify, mpsc};

use crate::notification::{
    Event, Notification, NotificationContext, OperationId, SessionId, SessionObserver,
};

type Batch = Vec<Notification>;

/// Routes operation results to the host's observer, one at a time
#[derive(Debug)]
pub(crate) struct NotificationDispatcher {
    sender: mpsc::UnboundedSender<Batch>,
    shutdown: Arc<Notify>,
}

impl NotificationDispatcher {
    /// Create the dispatcher and start its delivery task.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn new(observer: Arc<dyn SessionObserver>) -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(Self {
            sender,
            shutdown: Arc::new(Notify::new()),
        });
        Self::spawn_delivery_task(receiver, observer, Arc::clone(&dispatcher.shutdown));
        dispatcher
    }

    /// Enqueue the events of one completed operation as a single batch
    pub(crate) fn publish(&self, session: SessionId, operation: OperationId, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        let context = NotificationContext { session, operation };
        let batch: Batch = events
            .into_iter()
            .map(|event| Notification { context, event })
            .collect();
        tracing::trace!(%operation, count = batch.len(), "Enqueued notification batch");
        if self.sender.send(batch).is_err() {
            tracing::debug!(%operation, "Dispatcher stopped; notification batch dropped");
        }
    }

    /// Stop the delivery task once already-queued batches are delivered
    pub(crate) fn shutdown(&self) {
        self.shutdown.notify_one();
        tracing::debug!("Notification dispatcher shutdown initiated");
    }

    fn spawn_delivery_task(
        mut receiver: mpsc::UnboundedReceiver<Batch>,
        observer: Arc<dyn SessionObserver>,
        shutdown: Arc<Notify>,
    ) {
        tokio::spawn(async move {
            tracing::debug!("Notification dispatcher started");

            loop {
                tokio::select! {
                    biased;

                    batch = receiver.recv() => match batch {
                        Some(batch) => deliver(observer.as_ref(), batch).await,
                        // Every sender gone: the session was dropped
                        None => break,
                    },

                    () = shutdown.notified() => {
                        receiver.close();
                        while let Some(batch) = receiver.recv().await {
                            deliver(observer.as_ref(), batch).await;
                        }
                        break;
                    }
                }
            }

            tracing::debug!("Notification dispatcher terminated");
        });
    }
}

async fn deliver(observer: &dyn SessionObserver, batch: Batch) {
    for notification in batch {
        observer.notify(notification).await;
    }
}
