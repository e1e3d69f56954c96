//! Generation task pipeline
//!
//! The dispatcher that consumes a task's event queue exactly once and
//! produces either a streamed sequence of wire frames or one aggregated
//! blocking response, plus the terminal side effects: moderation
//! finalization, message persistence and the message-created notification.

use crate::config::AppConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub mod state;
pub mod task_pipeline;

pub use state::{AnnotationAccount, AnnotationReply, ResponseMetadata, TaskState};
pub use task_pipeline::GenerateTaskPipeline;

/// The invocation channel a generate request arrived through
///
/// Debugger and direct service-API calls are privileged: they see full
/// retriever resources, annotation replies and usage in response metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvokeFrom {
    Debugger,
    ServiceApi,
    WebApp,
    Explore,
}

impl InvokeFrom {
    pub fn is_privileged(&self) -> bool {
        matches!(self, InvokeFrom::Debugger | InvokeFrom::ServiceApi)
    }
}

/// Identity and context of one generation request
#[derive(Debug, Clone)]
pub struct GenerateEntity {
    pub task_id: Uuid,
    pub invoke_from: InvokeFrom,
    /// The conversation the caller addressed; `None` when this request
    /// opened a new conversation
    pub conversation_id: Option<Uuid>,
    /// Caller-supplied extras forwarded to the message-created
    /// notification
    pub extras: Value,
    pub app_config: AppConfig,
}
