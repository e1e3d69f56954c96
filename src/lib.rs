//! genflow - Streaming task pipeline for workflow-driven LLM applications
//!
//! # Overview
//!
//! This crate converts the ordered event queue an execution engine produces
//! for one generation task into client-facing output, in two forms:
//! a single aggregated blocking response, or incrementally flushed
//! server-push frames. It owns the terminal side effects of a task:
//! output moderation, message persistence and the message-created
//! notification.
//!
//! The core pieces:
//! - Queue events and response envelopes ([`protocol`])
//! - The per-task event queue ([`queue`])
//! - The dispatcher and finalization ([`pipeline`])
//! - The output moderation gate ([`moderation`])
//! - Collaborator seams for storage, URL signing and notifications
//!   ([`storage`], [`signing`], [`notify`])
//!
//! # Quick Start
//!
//! ```rust
//! use genflow::protocol::{PublishFrom, QueueEvent, StopReason, StreamFrame};
//!
//! // Events are plain tagged data the engine pushes onto a task's queue
//! let chunk = QueueEvent::TextChunk { text: "Hello".to_string() };
//! let stop = QueueEvent::Stop { stopped_by: StopReason::UserManual };
//! assert!(!chunk.is_terminal());
//! assert!(stop.is_terminal());
//!
//! // Keep-alives render as the literal server-push frame
//! assert_eq!(StreamFrame::Ping.to_wire(), "event: ping\n\n");
//!
//! // Producers tag every publish with its origin
//! let _ = PublishFrom::ApplicationManager;
//! ```

pub mod config;
pub mod error;
pub mod moderation;
pub mod notify;
pub mod observability;
pub mod pipeline;
pub mod protocol;
pub mod queue;
pub mod signing;
pub mod storage;
pub mod testing;

pub use config::{AppConfig, ConfigError, ModerationRule, ModerationSection};
pub use error::{PipelineError, PipelineResult, PublicError, PublicErrorCode};
pub use moderation::{ModerationBackend, OutputModeration};
pub use notify::{ChannelNotifier, MessageCreated, MessageNotifier, NullNotifier};
pub use pipeline::{GenerateEntity, GenerateTaskPipeline, InvokeFrom, TaskState};
pub use protocol::*;
pub use queue::{QueueListener, QueuePublisher, TaskQueue};
pub use signing::FileSigner;
pub use storage::{Storage, StorageError};
