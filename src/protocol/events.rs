//! Queue event types for the generation task pipeline
//!
//! These are the events an execution engine pushes onto a task's ordered
//! queue. The pipeline consumes them exactly once, in arrival order. The
//! enum is matched exhaustively by the dispatcher so that adding a variant
//! forces every consumer to decide how to handle it.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reason a task was stopped before its workflow finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// The end user cancelled the generation
    UserManual,
    /// An annotation reply replaced the generated answer
    AnnotationReply,
    /// Output moderation pre-empted the stream
    OutputModeration,
}

/// Origin of a published queue event
///
/// Producers tag every publish so consumers can tell engine-driven events
/// from events the pipeline layer injected itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishFrom {
    ApplicationManager,
    TaskPipeline,
}

/// One citation produced by a knowledge-retrieval step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverResource {
    pub position: u32,
    pub dataset_id: Uuid,
    pub dataset_name: String,
    pub document_id: Uuid,
    pub document_name: String,
    pub data_source_type: String,
    pub segment_id: Uuid,
    pub retriever_from: String,
    pub score: f64,
    pub content: String,
}

impl RetrieverResource {
    /// Reduced shape shown to unprivileged callers
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "segment_id": self.segment_id,
            "position": self.position,
            "document_name": self.document_name,
            "score": self.score,
            "content": self.content,
        })
    }
}

/// Events flowing through a task's queue
///
/// Exactly one terminal event ([`QueueEvent::Stop`] or
/// [`QueueEvent::WorkflowFinished`]) occurs per task; every event before it
/// belongs to that task. At most one [`QueueEvent::Error`] occurs, and it
/// ends the stream without finalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A workflow run began; carries the run's correlation id
    WorkflowStarted { workflow_run_id: Uuid },
    /// A workflow node began executing
    NodeStarted { node_execution_id: Uuid },
    /// A workflow node finished (succeeded or failed)
    NodeFinished { node_execution_id: Uuid },
    /// The workflow run completed; terminal on success, converted to the
    /// error path when the run reports failure
    WorkflowFinished { workflow_run_id: Uuid },
    /// Explicit early termination; terminal
    Stop { stopped_by: StopReason },
    /// Incremental answer text
    TextChunk { text: String },
    /// Replace the accumulated answer verbatim
    MessageReplace { text: String },
    /// A file was attached to the message
    MessageFile { message_file_id: Uuid },
    /// Citations collected by retrieval steps
    RetrieverResources { resources: Vec<RetrieverResource> },
    /// A curated annotation answered the query directly
    AnnotationReply { annotation_id: Uuid },
    /// The engine failed; ends the stream, skipping finalization
    Error { cause: PipelineError },
    /// Keep-alive; only meaningful on a live stream
    Ping,
}

impl QueueEvent {
    /// Whether this event ends the stream on the normal finalization path
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueEvent::Stop { .. } | QueueEvent::WorkflowFinished { .. }
        )
    }
}

/// A queue event together with its publish origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub event: QueueEvent,
    pub published_from: PublishFrom,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(QueueEvent::Stop {
            stopped_by: StopReason::UserManual
        }
        .is_terminal());
        assert!(QueueEvent::WorkflowFinished {
            workflow_run_id: Uuid::new_v4()
        }
        .is_terminal());

        assert!(!QueueEvent::Ping.is_terminal());
        assert!(!QueueEvent::TextChunk {
            text: "hi".to_string()
        }
        .is_terminal());
        assert!(!QueueEvent::Error {
            cause: PipelineError::internal("boom")
        }
        .is_terminal());
    }

    #[test]
    fn test_event_serialization_tags() {
        let event = QueueEvent::TextChunk {
            text: "Hello".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "text_chunk");
        assert_eq!(json["text"], "Hello");

        let stop = QueueEvent::Stop {
            stopped_by: StopReason::OutputModeration,
        };
        let json = serde_json::to_value(&stop).unwrap();
        assert_eq!(json["event"], "stop");
        assert_eq!(json["stopped_by"], "output-moderation");
    }

    #[test]
    fn test_retriever_resource_summary_shape() {
        let resource = RetrieverResource {
            position: 1,
            dataset_id: Uuid::new_v4(),
            dataset_name: "kb".to_string(),
            document_id: Uuid::new_v4(),
            document_name: "guide.md".to_string(),
            data_source_type: "upload_file".to_string(),
            segment_id: Uuid::new_v4(),
            retriever_from: "workflow".to_string(),
            score: 0.87,
            content: "chunk".to_string(),
        };

        let summary = resource.summary();
        let object = summary.as_object().unwrap();
        assert_eq!(object.len(), 5);
        assert!(object.contains_key("segment_id"));
        assert!(object.contains_key("position"));
        assert!(object.contains_key("document_name"));
        assert!(object.contains_key("score"));
        assert!(object.contains_key("content"));
        assert!(!object.contains_key("dataset_id"));
    }
}
