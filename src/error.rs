//! Error taxonomy for the generation task pipeline
//!
//! Internal causes map to a small set of public error codes. Unknown causes
//! surface a generic message only; the real cause is logged server-side.

use crate::protocol::frames::StreamFrame;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// Fixed client-facing message for quota exhaustion
const QUOTA_EXCEEDED_MESSAGE: &str =
    "Your quota for the hosted model provider has been exhausted. \
     Please configure your own provider credentials to continue.";

/// Fixed client-facing message for unknown causes
const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error, please contact support.";

/// Main error type for pipeline operations
///
/// Events carry these across the queue, so the type is plain data:
/// cloneable, comparable and serializable.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PipelineError {
    #[error("authorization failed: {message}")]
    Authorization { message: String },

    #[error("{message}")]
    Invocation { message: String },

    #[error("{message}")]
    Validation { message: String },

    #[error("provider quota exceeded")]
    QuotaExceeded,

    #[error("model provider not configured")]
    ProviderNotConfigured,

    #[error("model currently not supported")]
    ModelUnsupported,

    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Public error codes surfaced to API clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicErrorCode {
    InvalidParam,
    ProviderNotInitialize,
    ProviderQuotaExceeded,
    ModelCurrentlyNotSupport,
    CompletionRequestError,
    InternalServerError,
}

impl PublicErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicErrorCode::InvalidParam => "invalid_param",
            PublicErrorCode::ProviderNotInitialize => "provider_not_initialize",
            PublicErrorCode::ProviderQuotaExceeded => "provider_quota_exceeded",
            PublicErrorCode::ModelCurrentlyNotSupport => "model_currently_not_support",
            PublicErrorCode::CompletionRequestError => "completion_request_error",
            PublicErrorCode::InternalServerError => "internal_server_error",
        }
    }
}

/// A fully rendered public error: code, HTTP-style status and message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicError {
    pub code: PublicErrorCode,
    pub status: u16,
    pub message: String,
}

impl PipelineError {
    /// Create an authorization error
    pub fn authorization<S: Into<String>>(message: S) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    /// Create an invocation error
    pub fn invocation<S: Into<String>>(message: S) -> Self {
        Self::Invocation {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Map this cause to its public code/status/message
    ///
    /// Unknown (internal) causes are logged in full here and surface only
    /// the generic message.
    pub fn to_public(&self) -> PublicError {
        match self {
            PipelineError::Authorization { .. } => PublicError {
                code: PublicErrorCode::InvalidParam,
                status: 400,
                message: "Incorrect API key provided".to_string(),
            },
            PipelineError::Validation { message } => PublicError {
                code: PublicErrorCode::InvalidParam,
                status: 400,
                message: sanitize_error_message(message),
            },
            PipelineError::ProviderNotConfigured => PublicError {
                code: PublicErrorCode::ProviderNotInitialize,
                status: 400,
                message: self.to_string(),
            },
            PipelineError::QuotaExceeded => PublicError {
                code: PublicErrorCode::ProviderQuotaExceeded,
                status: 400,
                message: QUOTA_EXCEEDED_MESSAGE.to_string(),
            },
            PipelineError::ModelUnsupported => PublicError {
                code: PublicErrorCode::ModelCurrentlyNotSupport,
                status: 400,
                message: self.to_string(),
            },
            PipelineError::Invocation { message } => PublicError {
                code: PublicErrorCode::CompletionRequestError,
                status: 400,
                message: sanitize_error_message(message),
            },
            PipelineError::Internal { message } => {
                error!(cause = %message, "internal pipeline error");
                PublicError {
                    code: PublicErrorCode::InternalServerError,
                    status: 500,
                    message: INTERNAL_ERROR_MESSAGE.to_string(),
                }
            }
        }
    }

    /// Render the streaming error envelope for this cause
    pub fn to_error_frame(&self, task_id: Uuid, message_id: Uuid) -> StreamFrame {
        let public = self.to_public();
        StreamFrame::Error {
            task_id,
            message_id,
            code: public.code,
            status: public.status,
            message: public.message,
        }
    }
}

impl From<crate::storage::StorageError> for PipelineError {
    fn from(e: crate::storage::StorageError) -> Self {
        PipelineError::internal(e.to_string())
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("secret pattern compiles")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("path pattern compiles")
});

/// Sanitize error messages before they leave the crate
fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN.replace_all(message, "${1}=***").to_string();
    sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    // Cap total length at 500 characters
    if sanitized.len() > 500 {
        let truncate_suffix = "...[truncated]";
        let max_content_len = 500 - truncate_suffix.len();
        sanitized = format!("{}{}", &sanitized[..max_content_len], truncate_suffix);
    }

    sanitized
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
