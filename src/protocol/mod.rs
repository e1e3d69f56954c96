//! Protocol types for the generation task pipeline
//!
//! Queue events on the producer side, response envelopes on the client
//! side, and the usage accounting both sides share.

pub mod events;
pub mod frames;
pub mod usage;

pub use events::{PublishFrom, QueueEvent, QueueMessage, RetrieverResource, StopReason};
pub use frames::{
    BlockingResponse, NodeFinishedData, NodeStartedData, StreamFrame, WorkflowFinishedData,
    WorkflowStartedData, PING_FRAME,
};
pub use usage::Usage;
