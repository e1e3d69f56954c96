//! Test helpers and utilities for integration tests

use chrono::Utc;
use genflow::config::{AppConfig, AppSection};
use genflow::moderation::OutputModeration;
use genflow::pipeline::{GenerateEntity, GenerateTaskPipeline, InvokeFrom};
use genflow::protocol::events::RetrieverResource;
use genflow::queue::{QueuePublisher, TaskQueue};
use genflow::storage::entities::{
    Conversation, Message, NodeExecutionStatus, NodeType, WorkflowNodeExecution, WorkflowRun,
    WorkflowRunStatus,
};
use genflow::testing::mocks::{CollectingNotifier, MockModerationBackend, MockStorage, StaticSigner};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Create a test app configuration without moderation
#[allow(dead_code)]
pub fn test_app_config() -> AppConfig {
    AppConfig {
        app: AppSection {
            id: "test-app".to_string(),
            tenant_id: "test-tenant".to_string(),
        },
        moderation: None,
    }
}

/// Everything a pipeline test needs in one place
#[allow(dead_code)]
pub struct TestContext {
    pub pipeline: GenerateTaskPipeline,
    pub publisher: QueuePublisher,
    pub storage: Arc<MockStorage>,
    pub notifier: CollectingNotifier,
    pub conversation: Conversation,
    pub message: Message,
    pub task_id: Uuid,
}

/// Build a pipeline wired to mock collaborators, without moderation
#[allow(dead_code)]
pub fn pipeline_context(invoke_from: InvokeFrom) -> TestContext {
    pipeline_context_inner(invoke_from, None)
}

/// Build a pipeline with a scripted moderation backend
#[allow(dead_code)]
pub fn pipeline_context_with_moderation(
    invoke_from: InvokeFrom,
    backend: Arc<MockModerationBackend>,
    scan_interval_ms: u64,
) -> TestContext {
    let moderation = OutputModeration::new(backend, Duration::from_millis(scan_interval_ms));
    pipeline_context_inner(invoke_from, Some(moderation))
}

#[allow(dead_code)]
fn pipeline_context_inner(
    invoke_from: InvokeFrom,
    moderation: Option<OutputModeration>,
) -> TestContext {
    let conversation = Conversation {
        id: Uuid::new_v4(),
        mode: "advanced-chat".to_string(),
    };
    let message = Message::new(conversation.id);

    let storage = Arc::new(MockStorage::new());
    storage.insert_message(message.clone());

    let notifier = CollectingNotifier::new();
    let (publisher, listener) = TaskQueue::channel();
    let task_id = Uuid::new_v4();

    let entity = GenerateEntity {
        task_id,
        invoke_from,
        conversation_id: Some(conversation.id),
        extras: json!({}),
        app_config: test_app_config(),
    };

    let pipeline = GenerateTaskPipeline::with_moderation(
        entity,
        conversation.clone(),
        message.clone(),
        listener,
        storage.clone(),
        Arc::new(StaticSigner::new()),
        Arc::new(notifier.clone()),
        moderation,
    );

    TestContext {
        pipeline,
        publisher,
        storage,
        notifier,
        conversation,
        message,
        task_id,
    }
}

/// A succeeded workflow run with the given outputs
#[allow(dead_code)]
pub fn succeeded_run(outputs: Value) -> WorkflowRun {
    WorkflowRun {
        id: Uuid::new_v4(),
        workflow_id: Uuid::new_v4(),
        status: WorkflowRunStatus::Succeeded,
        outputs,
        error: None,
        elapsed_time: 1.5,
        total_tokens: 15,
        total_steps: 3,
        created_at: Utc::now(),
        finished_at: Some(Utc::now()),
    }
}

/// A failed workflow run with the given failure reason
#[allow(dead_code)]
pub fn failed_run(error: &str) -> WorkflowRun {
    WorkflowRun {
        status: WorkflowRunStatus::Failed,
        error: Some(error.to_string()),
        ..succeeded_run(json!({}))
    }
}

/// A succeeded LLM node execution reporting the given usage
#[allow(dead_code)]
pub fn llm_node(workflow_run_id: Uuid, usage: Value) -> WorkflowNodeExecution {
    WorkflowNodeExecution {
        id: Uuid::new_v4(),
        workflow_run_id,
        node_id: "llm-1".to_string(),
        node_type: NodeType::Llm,
        index: 1,
        predecessor_node_id: Some("start".to_string()),
        inputs: json!({"query": "hi"}),
        process_data: json!({}),
        outputs: json!({"text": "Hello", "usage": usage}),
        status: NodeExecutionStatus::Succeeded,
        error: None,
        elapsed_time: 0.8,
        execution_metadata: json!({}),
        created_at: Utc::now(),
        finished_at: Some(Utc::now()),
    }
}

/// A node execution of arbitrary type and status
#[allow(dead_code)]
pub fn node(
    workflow_run_id: Uuid,
    node_type: NodeType,
    status: NodeExecutionStatus,
) -> WorkflowNodeExecution {
    WorkflowNodeExecution {
        node_type,
        status,
        node_id: "node-x".to_string(),
        ..llm_node(workflow_run_id, json!({}))
    }
}

/// A retriever resource with recognizable field values
#[allow(dead_code)]
pub fn retriever_resource(position: u32) -> RetrieverResource {
    RetrieverResource {
        position,
        dataset_id: Uuid::new_v4(),
        dataset_name: "kb".to_string(),
        document_id: Uuid::new_v4(),
        document_name: format!("doc-{position}.md"),
        data_source_type: "upload_file".to_string(),
        segment_id: Uuid::new_v4(),
        retriever_from: "workflow".to_string(),
        score: 0.9,
        content: format!("chunk {position}"),
    }
}

/// Drain every frame currently buffered on the stream
#[allow(dead_code)]
pub fn drain_frames(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}

/// Parse the JSON object out of a `data: ...` frame
#[allow(dead_code)]
pub fn parse_frame(frame: &str) -> Value {
    let payload = frame
        .strip_prefix("data: ")
        .unwrap_or_else(|| panic!("not a data frame: {frame:?}"))
        .trim_end();
    serde_json::from_str(payload).expect("frame payload is valid JSON")
}

/// The `event` discriminators of a frame sequence, pings included
#[allow(dead_code)]
pub fn event_names(frames: &[String]) -> Vec<String> {
    frames
        .iter()
        .map(|frame| {
            if frame == "event: ping\n\n" {
                "ping".to_string()
            } else {
                parse_frame(frame)["event"]
                    .as_str()
                    .expect("frame has event field")
                    .to_string()
            }
        })
        .collect()
}
