//! Client-facing response envelopes
//!
//! Streaming mode renders one [`StreamFrame`] per emitted unit as a
//! line-delimited server-push frame; blocking mode renders a single
//! [`BlockingResponse`] object once the terminal event is processed. Both
//! share the `event` discriminator vocabulary.

use crate::error::PublicErrorCode;
use crate::storage::entities::{WorkflowNodeExecution, WorkflowRun};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The literal keep-alive frame
pub const PING_FRAME: &str = "event: ping\n\n";

/// `workflow_started` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStartedData {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub created_at: i64,
}

impl WorkflowStartedData {
    pub fn from_run(run: &WorkflowRun) -> Self {
        Self {
            id: run.id,
            workflow_id: run.workflow_id,
            created_at: run.created_at.timestamp(),
        }
    }
}

/// `node_started` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStartedData {
    pub id: Uuid,
    pub node_id: String,
    pub index: u32,
    pub predecessor_node_id: Option<String>,
    pub inputs: Value,
    pub created_at: i64,
}

impl NodeStartedData {
    pub fn from_execution(node: &WorkflowNodeExecution) -> Self {
        Self {
            id: node.id,
            node_id: node.node_id.clone(),
            index: node.index,
            predecessor_node_id: node.predecessor_node_id.clone(),
            inputs: node.inputs.clone(),
            created_at: node.created_at.timestamp(),
        }
    }
}

/// `node_finished` payload, the full node result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFinishedData {
    pub id: Uuid,
    pub node_id: String,
    pub index: u32,
    pub predecessor_node_id: Option<String>,
    pub inputs: Value,
    pub process_data: Value,
    pub outputs: Value,
    pub status: String,
    pub error: Option<String>,
    pub elapsed_time: f64,
    pub execution_metadata: Value,
    pub created_at: i64,
    pub finished_at: i64,
}

impl NodeFinishedData {
    pub fn from_execution(node: &WorkflowNodeExecution) -> Self {
        Self {
            id: node.id,
            node_id: node.node_id.clone(),
            index: node.index,
            predecessor_node_id: node.predecessor_node_id.clone(),
            inputs: node.inputs.clone(),
            process_data: node.process_data.clone(),
            outputs: node.outputs.clone(),
            status: node.status.as_str().to_string(),
            error: node.error.clone(),
            elapsed_time: node.elapsed_time,
            execution_metadata: node.execution_metadata.clone(),
            created_at: node.created_at.timestamp(),
            finished_at: node
                .finished_at
                .map(|t| t.timestamp())
                .unwrap_or_else(|| node.created_at.timestamp()),
        }
    }
}

/// `workflow_finished` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowFinishedData {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: String,
    pub outputs: Value,
    pub error: Option<String>,
    pub elapsed_time: f64,
    pub total_tokens: u64,
    pub total_steps: u32,
    pub created_at: i64,
    pub finished_at: i64,
}

impl WorkflowFinishedData {
    pub fn from_run(run: &WorkflowRun) -> Self {
        Self {
            id: run.id,
            workflow_id: run.workflow_id,
            status: run.status.as_str().to_string(),
            outputs: run.outputs.clone(),
            error: run.error.clone(),
            elapsed_time: run.elapsed_time,
            total_tokens: run.total_tokens,
            total_steps: run.total_steps,
            created_at: run.created_at.timestamp(),
            finished_at: run
                .finished_at
                .map(|t| t.timestamp())
                .unwrap_or_else(|| run.created_at.timestamp()),
        }
    }
}

/// One streamed protocol message
///
/// Serializes with an `event` discriminator matching the wire vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamFrame {
    WorkflowStarted {
        task_id: Uuid,
        workflow_run_id: Uuid,
        data: WorkflowStartedData,
    },
    NodeStarted {
        task_id: Uuid,
        workflow_run_id: Uuid,
        data: NodeStartedData,
    },
    NodeFinished {
        task_id: Uuid,
        workflow_run_id: Uuid,
        data: NodeFinishedData,
    },
    WorkflowFinished {
        task_id: Uuid,
        workflow_run_id: Uuid,
        data: WorkflowFinishedData,
    },
    Message {
        id: Uuid,
        task_id: Uuid,
        message_id: Uuid,
        conversation_id: Uuid,
        answer: String,
        created_at: i64,
    },
    MessageEnd {
        task_id: Uuid,
        id: Uuid,
        message_id: Uuid,
        conversation_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    MessageReplace {
        task_id: Uuid,
        message_id: Uuid,
        conversation_id: Uuid,
        answer: String,
        created_at: i64,
    },
    MessageFile {
        conversation_id: Uuid,
        id: Uuid,
        #[serde(rename = "type")]
        file_type: String,
        belongs_to: String,
        url: String,
    },
    Error {
        task_id: Uuid,
        message_id: Uuid,
        code: PublicErrorCode,
        status: u16,
        message: String,
    },
    Ping,
}

impl StreamFrame {
    /// Render as a wire frame: `data: <json>\n\n`, pings as the bare
    /// keep-alive frame
    pub fn to_wire(&self) -> String {
        match self {
            StreamFrame::Ping => PING_FRAME.to_string(),
            other => {
                let json = serde_json::to_string(other).expect("stream frame serializes");
                format!("data: {json}\n\n")
            }
        }
    }

    /// The `event` discriminator this frame serializes with
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamFrame::WorkflowStarted { .. } => "workflow_started",
            StreamFrame::NodeStarted { .. } => "node_started",
            StreamFrame::NodeFinished { .. } => "node_finished",
            StreamFrame::WorkflowFinished { .. } => "workflow_finished",
            StreamFrame::Message { .. } => "message",
            StreamFrame::MessageEnd { .. } => "message_end",
            StreamFrame::MessageReplace { .. } => "message_replace",
            StreamFrame::MessageFile { .. } => "message_file",
            StreamFrame::Error { .. } => "error",
            StreamFrame::Ping => "ping",
        }
    }
}

/// The single aggregated object returned in blocking mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockingResponse {
    /// Always `"message"`
    pub event: String,
    pub task_id: Uuid,
    pub id: Uuid,
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub mode: String,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub created_at: i64,
}
