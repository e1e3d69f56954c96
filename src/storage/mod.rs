//! Storage collaborator boundary
//!
//! The pipeline reads workflow state through this trait and commits exactly
//! one message update at finalization. Implementations live outside this
//! crate; tests use the in-memory mock from [`crate::testing`].

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod entities;

pub use entities::{
    Annotation, Conversation, Message, MessageFile, NodeExecutionStatus, NodeType, WorkflowNodeExecution,
    WorkflowRun, WorkflowRunStatus,
};

/// Storage collaborator failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Read/update access to the records the pipeline touches
///
/// Read-with-invalidate contract: workflow runs and node executions are
/// mutated concurrently by the execution engine while the pipeline streams,
/// and the message row may be touched between pipeline start and
/// finalization. Every read MUST therefore return the current persisted
/// state, bypassing any session or identity-map cache the implementation
/// keeps. A stale read is a correctness bug, not a performance concern.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Fresh read of a workflow run by id
    async fn workflow_run(&self, id: Uuid) -> StorageResult<Option<WorkflowRun>>;

    /// Fresh read of a node execution by id
    async fn node_execution(&self, id: Uuid) -> StorageResult<Option<WorkflowNodeExecution>>;

    /// Fresh read of a message by id
    async fn message(&self, id: Uuid) -> StorageResult<Option<Message>>;

    /// Fresh read of a message file by id
    async fn message_file(&self, id: Uuid) -> StorageResult<Option<MessageFile>>;

    /// Fresh read of an annotation by id
    async fn annotation(&self, id: Uuid) -> StorageResult<Option<Annotation>>;

    /// Atomically commit an updated message record
    async fn update_message(&self, message: &Message) -> StorageResult<()>;
}
