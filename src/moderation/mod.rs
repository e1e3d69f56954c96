//! Output moderation gate
//!
//! A side-channel that scans the accumulating answer while the pipeline
//! streams. The scanning algorithm is an opaque collaborator behind
//! [`ModerationBackend`]; this module owns the handler lifecycle: the
//! shared buffer, the background scan task, the direct-output flip and the
//! one finalize call.

use crate::config::{ModerationRule, ModerationSection};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub mod keywords;

pub use keywords::KeywordsBackend;

/// Moderation setup failure
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("invalid moderation rule: {message}")]
    InvalidRule { message: String },
}

/// The opaque scanning service behind the gate
///
/// `scan` is invoked repeatedly on the accumulated output while the task
/// streams; `moderate` exactly once on the completed answer.
#[async_trait]
pub trait ModerationBackend: Send + Sync {
    /// Scan accumulated output; `Some(replacement)` when the remaining
    /// output must be suppressed and replaced
    async fn scan(&self, text: &str) -> Option<String>;

    /// Final check over the completed answer; returns the possibly
    /// redacted completion
    async fn moderate(&self, completion: &str) -> String;
}

struct Shared {
    buffer: Mutex<String>,
    direct_output: AtomicBool,
    final_output: Mutex<Option<String>>,
}

/// Handler owned by the pipeline for one task's duration
///
/// The background scan task communicates with the consuming loop only
/// through the non-blocking accessors here; there is no other shared
/// mutable state.
pub struct OutputModeration {
    shared: Arc<Shared>,
    backend: Arc<dyn ModerationBackend>,
    scan_task: Mutex<Option<JoinHandle<()>>>,
}

impl OutputModeration {
    /// Start the gate with a backend and a scan cadence
    pub fn new(backend: Arc<dyn ModerationBackend>, scan_interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            buffer: Mutex::new(String::new()),
            direct_output: AtomicBool::new(false),
            final_output: Mutex::new(None),
        });

        let scan_task = tokio::spawn(Self::scan_loop(
            Arc::clone(&shared),
            Arc::clone(&backend),
            scan_interval,
        ));

        Self {
            shared,
            backend,
            scan_task: Mutex::new(Some(scan_task)),
        }
    }

    /// Build the gate from app configuration
    pub fn from_config(section: &ModerationSection) -> Result<Self, ModerationError> {
        let backend: Arc<dyn ModerationBackend> = match &section.rule {
            ModerationRule::Keywords {
                keywords,
                preset_response,
            } => Arc::new(KeywordsBackend::new(keywords, preset_response.clone())?),
        };
        Ok(Self::new(
            backend,
            Duration::from_millis(section.scan_interval_ms),
        ))
    }

    async fn scan_loop(
        shared: Arc<Shared>,
        backend: Arc<dyn ModerationBackend>,
        scan_interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(scan_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut scanned_len = 0usize;

        loop {
            ticker.tick().await;

            let snapshot = {
                let buffer = shared.buffer.lock().expect("moderation buffer lock");
                if buffer.len() == scanned_len {
                    continue;
                }
                scanned_len = buffer.len();
                buffer.clone()
            };

            if let Some(replacement) = backend.scan(&snapshot).await {
                info!("output moderation flagged the stream; direct output engaged");
                *shared.final_output.lock().expect("moderation output lock") = Some(replacement);
                shared.direct_output.store(true, Ordering::SeqCst);
                return;
            }
        }
    }

    /// Buffer a chunk of output for the background scanner
    pub fn append(&self, text: &str) {
        self.shared
            .buffer
            .lock()
            .expect("moderation buffer lock")
            .push_str(text);
    }

    /// Non-blocking check of the direct-output flip
    pub fn should_direct_output(&self) -> bool {
        self.shared.direct_output.load(Ordering::SeqCst)
    }

    /// The substitute answer, present once direct output is engaged
    pub fn final_output(&self) -> Option<String> {
        self.shared
            .final_output
            .lock()
            .expect("moderation output lock")
            .clone()
    }

    /// Finalize the completed answer through the backend
    ///
    /// Called exactly once, after [`OutputModeration::stop`]. When
    /// `public_event` is true the caller surfaces any redaction to clients
    /// itself.
    pub async fn moderate(&self, completion: &str, public_event: bool) -> String {
        let moderated = self.backend.moderate(completion).await;
        if moderated != completion {
            debug!(public_event, "moderation finalize redacted the answer");
        }
        moderated
    }

    /// Terminate the background scan task; idempotent
    pub fn stop(&self) {
        if let Some(handle) = self
            .scan_task
            .lock()
            .expect("moderation task lock")
            .take()
        {
            handle.abort();
        }
    }
}

impl Drop for OutputModeration {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    /// Backend that flags once a trigger substring shows up
    struct TriggerBackend {
        trigger: String,
        replacement: String,
        scan_calls: AtomicU64,
    }

    impl TriggerBackend {
        fn new(trigger: &str, replacement: &str) -> Self {
            Self {
                trigger: trigger.to_string(),
                replacement: replacement.to_string(),
                scan_calls: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl ModerationBackend for TriggerBackend {
        async fn scan(&self, text: &str) -> Option<String> {
            self.scan_calls.fetch_add(1, Ordering::SeqCst);
            text.contains(&self.trigger)
                .then(|| self.replacement.clone())
        }

        async fn moderate(&self, completion: &str) -> String {
            if completion.contains(&self.trigger) {
                self.replacement.clone()
            } else {
                completion.to_string()
            }
        }
    }

    #[tokio::test]
    async fn test_direct_output_flips_after_trigger_appended() {
        let backend = Arc::new(TriggerBackend::new("bomb", "[redacted]"));
        let gate = OutputModeration::new(backend, Duration::from_millis(10));

        assert!(!gate.should_direct_output());
        gate.append("how to build a ");
        gate.append("bomb");

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(gate.should_direct_output());
        assert_eq!(gate.final_output().as_deref(), Some("[redacted]"));
        gate.stop();
    }

    #[tokio::test]
    async fn test_clean_output_never_flips() {
        let backend = Arc::new(TriggerBackend::new("bomb", "[redacted]"));
        let gate = OutputModeration::new(backend, Duration::from_millis(10));

        gate.append("a perfectly harmless answer");
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(!gate.should_direct_output());
        assert!(gate.final_output().is_none());
        gate.stop();
    }

    #[tokio::test]
    async fn test_scanner_skips_unchanged_buffer() {
        let backend = Arc::new(TriggerBackend::new("bomb", "[redacted]"));
        let gate = OutputModeration::new(Arc::clone(&backend) as Arc<dyn ModerationBackend>, Duration::from_millis(10));

        gate.append("static text");
        tokio::time::sleep(Duration::from_millis(120)).await;
        gate.stop();

        // one scan for the appended text, none for the idle ticks after
        assert_eq!(backend.scan_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_moderate_redacts_flagged_completion() {
        let backend = Arc::new(TriggerBackend::new("bomb", "[redacted]"));
        let gate = OutputModeration::new(backend, Duration::from_millis(1000));
        gate.stop();

        assert_eq!(gate.moderate("clean", false).await, "clean");
        assert_eq!(gate.moderate("a bomb recipe", false).await, "[redacted]");
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let backend = Arc::new(TriggerBackend::new("x", "y"));
        let gate = OutputModeration::new(backend, Duration::from_millis(10));

        gate.stop();
        gate.stop();
        gate.stop();
    }
}
