//! Domain records read through the storage collaborator
//!
//! These mirror the records the execution engine and conversation layer
//! persist. The pipeline never creates them; it reads runs and node
//! executions while streaming and commits exactly one message update at
//! finalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Status of a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunStatus {
    Running,
    Succeeded,
    Failed,
    Stopped,
}

impl WorkflowRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowRunStatus::Running => "running",
            WorkflowRunStatus::Succeeded => "succeeded",
            WorkflowRunStatus::Failed => "failed",
            WorkflowRunStatus::Stopped => "stopped",
        }
    }
}

/// Status of a single node execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeExecutionStatus {
    Running,
    Succeeded,
    Failed,
}

impl NodeExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeExecutionStatus::Running => "running",
            NodeExecutionStatus::Succeeded => "succeeded",
            NodeExecutionStatus::Failed => "failed",
        }
    }
}

/// Kind of workflow node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Start,
    End,
    Answer,
    Llm,
    KnowledgeRetrieval,
    Code,
    Tool,
}

/// One workflow run, mutated concurrently by the execution engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: WorkflowRunStatus,
    pub outputs: Value,
    pub error: Option<String>,
    pub elapsed_time: f64,
    pub total_tokens: u64,
    pub total_steps: u32,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    /// The run's final answer text, empty when the run produced none
    pub fn output_text(&self) -> String {
        self.outputs
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

/// One node execution within a workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNodeExecution {
    pub id: Uuid,
    pub workflow_run_id: Uuid,
    pub node_id: String,
    pub node_type: NodeType,
    pub index: u32,
    pub predecessor_node_id: Option<String>,
    pub inputs: Value,
    pub process_data: Value,
    pub outputs: Value,
    pub status: NodeExecutionStatus,
    pub error: Option<String>,
    pub elapsed_time: f64,
    pub execution_metadata: Value,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// The message record the pipeline finalizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub answer: String,
    pub created_at: DateTime<Utc>,
    pub provider_response_latency: f64,
    pub workflow_run_id: Option<Uuid>,
    pub message_tokens: u64,
    pub message_unit_price: f64,
    pub message_price_unit: f64,
    pub answer_tokens: u64,
    pub answer_unit_price: f64,
    pub answer_price_unit: f64,
    pub total_price: f64,
    pub currency: String,
}

impl Message {
    /// A fresh, empty message row for a conversation
    pub fn new(conversation_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            answer: String::new(),
            created_at: Utc::now(),
            provider_response_latency: 0.0,
            workflow_run_id: None,
            message_tokens: 0,
            message_unit_price: 0.0,
            message_price_unit: 0.0,
            answer_tokens: 0,
            answer_unit_price: 0.0,
            answer_price_unit: 0.0,
            total_price: 0.0,
            currency: "USD".to_string(),
        }
    }

    /// Creation time as unix seconds, the shape envelopes carry
    pub fn created_at_unix(&self) -> i64 {
        self.created_at.timestamp()
    }
}

/// The conversation a message belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub mode: String,
}

/// A file attached to a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageFile {
    pub id: Uuid,
    pub message_id: Uuid,
    pub file_type: String,
    pub belongs_to: Option<String>,
    pub url: String,
}

/// A curated annotation that can answer a query directly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: Uuid,
    pub account_id: Uuid,
    pub account_name: Option<String>,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_text_extraction() {
        let mut run = WorkflowRun {
            id: Uuid::new_v4(),
            workflow_id: Uuid::new_v4(),
            status: WorkflowRunStatus::Succeeded,
            outputs: json!({"text": "Hello"}),
            error: None,
            elapsed_time: 1.2,
            total_tokens: 15,
            total_steps: 3,
            created_at: Utc::now(),
            finished_at: Some(Utc::now()),
        };
        assert_eq!(run.output_text(), "Hello");

        run.outputs = json!({});
        assert_eq!(run.output_text(), "");

        run.outputs = json!({"text": 42});
        assert_eq!(run.output_text(), "");
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(WorkflowRunStatus::Succeeded.as_str(), "succeeded");
        assert_eq!(NodeExecutionStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn test_node_type_serialization() {
        let value = serde_json::to_value(NodeType::KnowledgeRetrieval).unwrap();
        assert_eq!(value, "knowledge-retrieval");
        let value = serde_json::to_value(NodeType::Llm).unwrap();
        assert_eq!(value, "llm");
    }
}
