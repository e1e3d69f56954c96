//! Ordered event queue between the execution engine and the pipeline
//!
//! One queue per task. Producers (the execution engine, potentially many
//! concurrent actors) push events through a cloneable [`QueuePublisher`];
//! the pipeline drains them through the single [`QueueListener`] with a
//! blocking pull per event. Arrival order is preserved end to end.

use crate::protocol::events::{PublishFrom, QueueEvent, QueueMessage};
use tokio::sync::mpsc;
use tracing::debug;

/// Factory for a task's event queue
pub struct TaskQueue;

impl TaskQueue {
    /// Create the queue for one task
    pub fn channel() -> (QueuePublisher, QueueListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (QueuePublisher { tx }, QueueListener { rx })
    }
}

/// Producer handle; cheap to clone across engine actors
#[derive(Debug, Clone)]
pub struct QueuePublisher {
    tx: mpsc::UnboundedSender<QueueMessage>,
}

impl QueuePublisher {
    /// Push an event onto the queue, tagged with its origin
    ///
    /// Publishing after the consumer has gone away is not an error; the
    /// event is simply dropped.
    pub fn publish(&self, event: QueueEvent, published_from: PublishFrom) {
        let message = QueueMessage {
            event,
            published_from,
        };
        if self.tx.send(message).is_err() {
            debug!("queue listener dropped; event discarded");
        }
    }

    /// Whether the consuming side is still attached
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Consumer handle, owned by the pipeline for the task's lifetime
#[derive(Debug)]
pub struct QueueListener {
    rx: mpsc::UnboundedReceiver<QueueMessage>,
}

impl QueueListener {
    /// Blocking pull of the next event; `None` once all publishers are gone
    pub async fn next(&mut self) -> Option<QueueMessage> {
        self.rx.recv().await
    }
}
