//! Mutable aggregate state for one generation task
//!
//! Owned exclusively by the dispatcher from pipeline start to
//! finalization. Streaming and blocking modes apply identical updates, so
//! both modes agree on the final answer and metadata.

use crate::pipeline::InvokeFrom;
use crate::protocol::events::RetrieverResource;
use crate::protocol::usage::Usage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The account behind an annotation reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationAccount {
    pub id: Uuid,
    pub name: String,
}

/// Metadata recorded when an annotation answered the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationReply {
    pub id: Uuid,
    pub account: AnnotationAccount,
}

/// The metadata bag carried to the terminal response
///
/// Accumulates across the event stream; keys are never removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub retriever_resources: Option<Vec<RetrieverResource>>,
    pub annotation_reply: Option<AnnotationReply>,
    pub usage: Option<Usage>,
}

impl ResponseMetadata {
    pub fn is_empty(&self) -> bool {
        self.retriever_resources.is_none()
            && self.annotation_reply.is_none()
            && self.usage.is_none()
    }

    /// Render for a caller, gated by invocation channel privilege
    ///
    /// Unprivileged channels see retriever resources projected to their
    /// public five-field shape and never see `annotation_reply` or
    /// `usage`.
    pub fn render(&self, invoke_from: InvokeFrom) -> Value {
        let privileged = invoke_from.is_privileged();
        let mut rendered = serde_json::Map::new();

        if let Some(resources) = &self.retriever_resources {
            let value = if privileged {
                serde_json::to_value(resources).unwrap_or(Value::Null)
            } else {
                Value::Array(resources.iter().map(RetrieverResource::summary).collect())
            };
            rendered.insert("retriever_resources".to_string(), value);
        }

        if privileged {
            if let Some(reply) = &self.annotation_reply {
                rendered.insert(
                    "annotation_reply".to_string(),
                    serde_json::to_value(reply).unwrap_or(Value::Null),
                );
            }
            if let Some(usage) = &self.usage {
                rendered.insert(
                    "usage".to_string(),
                    serde_json::to_value(usage).unwrap_or(Value::Null),
                );
            }
        }

        Value::Object(rendered)
    }
}

/// Running aggregate for one task
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskState {
    /// Accumulated answer text; append-only except explicit replacement
    /// and moderation redaction
    pub answer: String,
    /// Metadata carried to the terminal response
    pub metadata: ResponseMetadata,
    /// Running token/cost accounting merged from succeeded LLM nodes
    pub usage: Usage,
    /// Correlation id of the workflow run, set at most once
    pub workflow_run_id: Option<Uuid>,
}

impl TaskState {
    pub fn new() -> Self {
        Self::default()
    }
}
