//! Observability for the task pipeline
//!
//! Structured logging via tracing and an atomic metrics collector.

pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{metrics, MetricsCollector, MetricsSnapshot};

// Span macros for structured logging
pub use logging::{moderation_span, storage_span, task_span};
