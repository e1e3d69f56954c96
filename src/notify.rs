//! Message-created notification port
//!
//! Finalization publishes one notification per persisted message. The port
//! is injected at pipeline construction so downstream listeners stay out of
//! the pipeline's dependency graph.

use crate::storage::entities::Message;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Payload published after the message record is committed
#[derive(Debug, Clone)]
pub struct MessageCreated {
    /// The message as persisted, including final answer and usage fields
    pub message: Message,
    pub conversation_id: Uuid,
    /// True when the generate request opened the conversation
    pub is_first_message: bool,
    /// Caller-supplied extras, forwarded untouched
    pub extras: Value,
}

/// Fire-and-forget notification sink
///
/// Implementations must not block the dispatcher.
pub trait MessageNotifier: Send + Sync {
    fn message_created(&self, event: MessageCreated);
}

/// Channel-backed notifier; the receiving half belongs to the listener side
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<MessageCreated>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MessageCreated>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MessageNotifier for ChannelNotifier {
    fn message_created(&self, event: MessageCreated) {
        if self.tx.send(event).is_err() {
            debug!("notification listener dropped; message_created discarded");
        }
    }
}

/// Notifier that discards everything; for callers without listeners
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl MessageNotifier for NullNotifier {
    fn message_created(&self, _event: MessageCreated) {}
}
