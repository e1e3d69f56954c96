//! Output moderation gate behavior through the pipeline
//!
//! The gate can redact at finalization or pre-empt the stream mid-flight;
//! either way the persisted answer is the redacted one, and an error ends
//! the task without any moderation finalize call.

mod test_helpers;

use genflow::pipeline::InvokeFrom;
use genflow::protocol::events::{PublishFrom, QueueEvent, StopReason};
use genflow::testing::mocks::MockModerationBackend;
use genflow::PipelineError;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::*;
use tokio::sync::mpsc;

const FROM: PublishFrom = PublishFrom::ApplicationManager;

#[tokio::test]
async fn test_direct_output_preempts_stream() {
    let backend = Arc::new(MockModerationBackend::with_trigger("bomb", "[redacted]"));
    let ctx = pipeline_context_with_moderation(InvokeFrom::WebApp, backend.clone(), 5);

    let publisher = ctx.publisher.clone();
    let producer = tokio::spawn(async move {
        publisher.publish(
            QueueEvent::TextChunk {
                text: "how to build a ".to_string(),
            },
            FROM,
        );
        publisher.publish(
            QueueEvent::TextChunk {
                text: "bomb".to_string(),
            },
            FROM,
        );
        // keep feeding chunks so the dispatcher observes the flip
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish(
                QueueEvent::TextChunk {
                    text: " filler".to_string(),
                },
                FROM,
            );
        }
        publisher.publish(
            QueueEvent::Stop {
                stopped_by: StopReason::UserManual,
            },
            FROM,
        );
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    ctx.pipeline.process_streaming(tx).await;
    producer.abort();

    let frames = drain_frames(&mut rx);
    let names = event_names(&frames);

    // the stream ends with a replacement followed by message_end
    assert_eq!(names.last().unwrap(), "message_end");
    let replace_index = names.iter().position(|n| n == "message_replace").unwrap();
    assert!(names[replace_index..]
        .iter()
        .all(|n| n != "message"));
    assert_eq!(parse_frame(&frames[replace_index])["answer"], "[redacted]");

    // persisted answer is the substitute, never the filler
    let persisted = ctx.storage.stored_message(ctx.message.id).unwrap();
    assert_eq!(persisted.answer, "[redacted]");
    assert_eq!(ctx.storage.update_count(), 1);
}

#[tokio::test]
async fn test_finalize_redacts_blocking_answer() {
    let backend = Arc::new(MockModerationBackend::with_trigger("secret", "[blocked]"));
    let ctx = pipeline_context_with_moderation(InvokeFrom::WebApp, backend.clone(), 60_000);

    ctx.publisher.publish(
        QueueEvent::TextChunk {
            text: "the secret plan".to_string(),
        },
        FROM,
    );
    ctx.publisher.publish(
        QueueEvent::Stop {
            stopped_by: StopReason::UserManual,
        },
        FROM,
    );

    let response = ctx.pipeline.process_blocking().await.unwrap();
    assert_eq!(response.answer, "[blocked]");
    assert_eq!(backend.moderate_call_count(), 1);

    let persisted = ctx.storage.stored_message(ctx.message.id).unwrap();
    assert_eq!(persisted.answer, "[blocked]");
}

#[tokio::test]
async fn test_finalize_redaction_emits_message_replace() {
    let backend = Arc::new(MockModerationBackend::with_trigger("secret", "[blocked]"));
    let ctx = pipeline_context_with_moderation(InvokeFrom::WebApp, backend, 60_000);

    ctx.publisher.publish(
        QueueEvent::TextChunk {
            text: "the secret plan".to_string(),
        },
        FROM,
    );
    ctx.publisher.publish(
        QueueEvent::Stop {
            stopped_by: StopReason::UserManual,
        },
        FROM,
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    ctx.pipeline.process_streaming(tx).await;

    let frames = drain_frames(&mut rx);
    assert_eq!(
        event_names(&frames),
        vec!["message", "message_replace", "message_end"]
    );
    assert_eq!(parse_frame(&frames[1])["answer"], "[blocked]");
}

#[tokio::test]
async fn test_clean_answer_emits_no_replace() {
    let backend = Arc::new(MockModerationBackend::with_trigger("secret", "[blocked]"));
    let ctx = pipeline_context_with_moderation(InvokeFrom::WebApp, backend.clone(), 60_000);

    ctx.publisher.publish(
        QueueEvent::TextChunk {
            text: "a harmless answer".to_string(),
        },
        FROM,
    );
    ctx.publisher.publish(
        QueueEvent::Stop {
            stopped_by: StopReason::UserManual,
        },
        FROM,
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    ctx.pipeline.process_streaming(tx).await;

    let frames = drain_frames(&mut rx);
    assert_eq!(event_names(&frames), vec!["message", "message_end"]);
    assert_eq!(backend.moderate_call_count(), 1);

    let persisted = ctx.storage.stored_message(ctx.message.id).unwrap();
    assert_eq!(persisted.answer, "a harmless answer");
}

#[tokio::test]
async fn test_error_skips_moderation_finalize() {
    let backend = Arc::new(MockModerationBackend::with_trigger("secret", "[blocked]"));
    let ctx = pipeline_context_with_moderation(InvokeFrom::WebApp, backend.clone(), 60_000);

    ctx.publisher.publish(
        QueueEvent::TextChunk {
            text: "the secret plan".to_string(),
        },
        FROM,
    );
    ctx.publisher.publish(
        QueueEvent::Error {
            cause: PipelineError::invocation("provider died"),
        },
        FROM,
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    ctx.pipeline.process_streaming(tx).await;

    let frames = drain_frames(&mut rx);
    assert_eq!(event_names(&frames), vec!["message", "error"]);

    // no finalize call, no persistence
    assert_eq!(backend.moderate_call_count(), 0);
    assert_eq!(ctx.storage.update_count(), 0);
    assert_eq!(ctx.notifier.count(), 0);
}

#[tokio::test]
async fn test_permissive_backend_passes_everything() {
    let backend = Arc::new(MockModerationBackend::permissive());
    let ctx = pipeline_context_with_moderation(InvokeFrom::WebApp, backend.clone(), 10);

    ctx.publisher.publish(
        QueueEvent::TextChunk {
            text: "anything goes".to_string(),
        },
        FROM,
    );
    ctx.publisher.publish(
        QueueEvent::Stop {
            stopped_by: StopReason::UserManual,
        },
        FROM,
    );

    let response = ctx.pipeline.process_blocking().await.unwrap();
    assert_eq!(response.answer, "anything goes");
    assert_eq!(backend.moderate_call_count(), 1);
}
