//! Event dispatcher and finalization for one generation task
//!
//! Consumes the task's queue exactly once, in arrival order, with a
//! blocking pull per event. Streaming mode emits a wire frame per
//! dispatched event; blocking mode accumulates silently and returns one
//! aggregated response at the terminal event. Finalization (moderation
//! stop + finalize, message persistence, notification) runs exactly once,
//! triggered by whichever terminal event arrives first, and is skipped
//! entirely when an error ends the stream.

use crate::error::{PipelineError, PipelineResult};
use crate::moderation::OutputModeration;
use crate::notify::{MessageCreated, MessageNotifier};
use crate::observability::metrics::metrics;
use crate::pipeline::state::{AnnotationAccount, AnnotationReply, TaskState};
use crate::pipeline::GenerateEntity;
use crate::protocol::events::{QueueEvent, QueueMessage, StopReason};
use crate::protocol::frames::{
    BlockingResponse, NodeFinishedData, NodeStartedData, StreamFrame, WorkflowFinishedData,
    WorkflowStartedData,
};
use crate::queue::QueueListener;
use crate::signing::{self, FileSigner};
use crate::storage::entities::{
    Conversation, Message, NodeExecutionStatus, NodeType, WorkflowNodeExecution, WorkflowRun,
    WorkflowRunStatus,
};
use crate::storage::Storage;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a text chunk did to the task state
enum ChunkOutcome {
    /// Appended to the answer; streaming emits a `message` delta
    Delta(String),
    /// The moderation flip was just observed; the answer is now the
    /// substitute and the task must terminate
    Suppressed,
    /// Dropped (direct output already engaged earlier)
    Ignored,
}

/// Pipeline for one generation task
///
/// Owns the queue listener, the task state and the moderation handler for
/// the task's lifetime; collaborators are injected at construction.
pub struct GenerateTaskPipeline {
    entity: GenerateEntity,
    conversation: Conversation,
    message: Message,
    listener: QueueListener,
    storage: Arc<dyn Storage>,
    signer: Arc<dyn FileSigner>,
    notifier: Arc<dyn MessageNotifier>,
    moderation: Option<OutputModeration>,
    state: TaskState,
    started_at: Instant,
    suppressed: bool,
}

impl GenerateTaskPipeline {
    /// Create a pipeline, initializing moderation from the app config
    pub fn new(
        entity: GenerateEntity,
        conversation: Conversation,
        message: Message,
        listener: QueueListener,
        storage: Arc<dyn Storage>,
        signer: Arc<dyn FileSigner>,
        notifier: Arc<dyn MessageNotifier>,
    ) -> PipelineResult<Self> {
        let moderation = match &entity.app_config.moderation {
            Some(section) => Some(
                OutputModeration::from_config(section)
                    .map_err(|e| PipelineError::validation(e.to_string()))?,
            ),
            None => None,
        };

        Ok(Self::with_moderation(
            entity,
            conversation,
            message,
            listener,
            storage,
            signer,
            notifier,
            moderation,
        ))
    }

    /// Create a pipeline with an explicit moderation handler
    ///
    /// Lets callers supply a handler built around their own backend; `new`
    /// is the config-driven path.
    #[allow(clippy::too_many_arguments)]
    pub fn with_moderation(
        entity: GenerateEntity,
        conversation: Conversation,
        message: Message,
        listener: QueueListener,
        storage: Arc<dyn Storage>,
        signer: Arc<dyn FileSigner>,
        notifier: Arc<dyn MessageNotifier>,
        moderation: Option<OutputModeration>,
    ) -> Self {
        Self {
            entity,
            conversation,
            message,
            listener,
            storage,
            signer,
            notifier,
            moderation,
            state: TaskState::new(),
            started_at: Instant::now(),
            suppressed: false,
        }
    }

    /// Drain the queue in blocking mode and return the aggregated response
    #[tracing::instrument(name = "task_pipeline", skip_all, fields(task_id = %self.entity.task_id, mode = "blocking"))]
    pub async fn process_blocking(mut self) -> PipelineResult<BlockingResponse> {
        metrics().task_started();
        info!("blocking task pipeline started");

        match self.blocking_loop().await {
            Ok(response) => {
                metrics().task_completed(self.started_at.elapsed());
                info!("blocking task pipeline finished");
                Ok(response)
            }
            Err(e) => {
                self.abort_moderation();
                metrics().task_failed(self.started_at.elapsed());
                warn!(error = %e, "blocking task pipeline ended in error");
                Err(e)
            }
        }
    }

    /// Drain the queue in streaming mode, pushing wire frames to `frames`
    ///
    /// Errors are rendered onto the stream as an `error` frame before it
    /// ends; finalization is skipped on that path.
    #[tracing::instrument(name = "task_pipeline", skip_all, fields(task_id = %self.entity.task_id, mode = "streaming"))]
    pub async fn process_streaming(mut self, frames: mpsc::UnboundedSender<String>) {
        metrics().task_started();
        info!("streaming task pipeline started");

        match self.streaming_loop(&frames).await {
            Ok(()) => {
                metrics().task_completed(self.started_at.elapsed());
                info!("streaming task pipeline finished");
            }
            Err(e) => {
                self.abort_moderation();
                metrics().task_failed(self.started_at.elapsed());
                warn!(error = %e, "streaming task pipeline ended in error");
                self.emit(
                    &frames,
                    e.to_error_frame(self.entity.task_id, self.message.id),
                );
            }
        }
    }

    /// Spawn the streaming pipeline, returning the frame receiver
    pub fn stream(self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.process_streaming(tx));
        rx
    }

    async fn blocking_loop(&mut self) -> PipelineResult<BlockingResponse> {
        while let Some(QueueMessage { event, .. }) = self.listener.next().await {
            metrics().event_consumed();
            match event {
                QueueEvent::Error { cause } => return Err(cause),
                QueueEvent::WorkflowStarted { workflow_run_id } => {
                    self.state.workflow_run_id = Some(workflow_run_id);
                }
                QueueEvent::NodeStarted { .. } => {}
                QueueEvent::NodeFinished { node_execution_id } => {
                    let node = self.require_node_execution(node_execution_id).await?;
                    self.merge_node_usage(&node);
                }
                QueueEvent::WorkflowFinished { workflow_run_id } => {
                    let run = self.require_workflow_run(workflow_run_id).await?;
                    self.apply_workflow_finish(&run)?;
                    return self.finalize_blocking().await;
                }
                QueueEvent::Stop { stopped_by } => {
                    debug!(?stopped_by, "stop event received");
                    return self.finalize_blocking().await;
                }
                QueueEvent::TextChunk { text } => {
                    if let ChunkOutcome::Suppressed = self.apply_text_chunk(&text) {
                        return self.finalize_blocking().await;
                    }
                }
                QueueEvent::MessageReplace { text } => {
                    self.state.answer = text;
                }
                QueueEvent::MessageFile { .. } => {}
                QueueEvent::RetrieverResources { resources } => {
                    self.state.metadata.retriever_resources = Some(resources);
                }
                QueueEvent::AnnotationReply { annotation_id } => {
                    self.apply_annotation(annotation_id).await?;
                }
                QueueEvent::Ping => {}
            }
        }

        Err(PipelineError::internal(
            "event queue closed before a terminal event",
        ))
    }

    async fn streaming_loop(
        &mut self,
        frames: &mpsc::UnboundedSender<String>,
    ) -> PipelineResult<()> {
        while let Some(QueueMessage { event, .. }) = self.listener.next().await {
            metrics().event_consumed();
            match event {
                QueueEvent::Error { cause } => return Err(cause),
                QueueEvent::WorkflowStarted { workflow_run_id } => {
                    let run = self.require_workflow_run(workflow_run_id).await?;
                    self.state.workflow_run_id = Some(run.id);
                    self.emit(
                        frames,
                        StreamFrame::WorkflowStarted {
                            task_id: self.entity.task_id,
                            workflow_run_id: run.id,
                            data: WorkflowStartedData::from_run(&run),
                        },
                    );
                }
                QueueEvent::NodeStarted { node_execution_id } => {
                    let node = self.require_node_execution(node_execution_id).await?;
                    self.emit(
                        frames,
                        StreamFrame::NodeStarted {
                            task_id: self.entity.task_id,
                            workflow_run_id: node.workflow_run_id,
                            data: NodeStartedData::from_execution(&node),
                        },
                    );
                }
                QueueEvent::NodeFinished { node_execution_id } => {
                    let node = self.require_node_execution(node_execution_id).await?;
                    self.merge_node_usage(&node);
                    self.emit(
                        frames,
                        StreamFrame::NodeFinished {
                            task_id: self.entity.task_id,
                            workflow_run_id: node.workflow_run_id,
                            data: NodeFinishedData::from_execution(&node),
                        },
                    );
                }
                QueueEvent::WorkflowFinished { workflow_run_id } => {
                    let run = self.require_workflow_run(workflow_run_id).await?;
                    self.apply_workflow_finish(&run)?;
                    self.emit(
                        frames,
                        StreamFrame::WorkflowFinished {
                            task_id: self.entity.task_id,
                            workflow_run_id: run.id,
                            data: WorkflowFinishedData::from_run(&run),
                        },
                    );
                    return self.finalize_streaming(frames).await;
                }
                QueueEvent::Stop { stopped_by } => {
                    debug!(?stopped_by, "stop event received");
                    return self.finalize_streaming(frames).await;
                }
                QueueEvent::TextChunk { text } => match self.apply_text_chunk(&text) {
                    ChunkOutcome::Delta(delta) => {
                        self.emit(frames, self.message_frame(delta));
                    }
                    ChunkOutcome::Suppressed => {
                        self.emit(frames, self.message_replace_frame());
                        info!(
                            stopped_by = ?StopReason::OutputModeration,
                            "output moderation pre-empted the stream"
                        );
                        return self.finalize_streaming(frames).await;
                    }
                    ChunkOutcome::Ignored => {}
                },
                QueueEvent::MessageReplace { text } => {
                    self.state.answer = text;
                    self.emit(frames, self.message_replace_frame());
                }
                QueueEvent::MessageFile { message_file_id } => {
                    if let Some(frame) = self.message_file_frame(message_file_id).await? {
                        self.emit(frames, frame);
                    }
                }
                QueueEvent::RetrieverResources { resources } => {
                    self.state.metadata.retriever_resources = Some(resources);
                }
                QueueEvent::AnnotationReply { annotation_id } => {
                    self.apply_annotation(annotation_id).await?;
                }
                QueueEvent::Ping => {
                    self.emit(frames, StreamFrame::Ping);
                }
            }
        }

        Err(PipelineError::internal(
            "event queue closed before a terminal event",
        ))
    }

    /// Validate a finished run and take its answer
    ///
    /// A non-success run converts to the error path; the caller never
    /// finalizes on that branch.
    fn apply_workflow_finish(&mut self, run: &WorkflowRun) -> PipelineResult<()> {
        if run.status != WorkflowRunStatus::Succeeded {
            let reason = run.error.as_deref().unwrap_or("unknown");
            return Err(PipelineError::invocation(format!("Run failed: {reason}")));
        }
        self.state.answer = run.output_text();
        Ok(())
    }

    /// Apply a text chunk to the answer and the moderation buffer
    fn apply_text_chunk(&mut self, text: &str) -> ChunkOutcome {
        if self.suppressed {
            return ChunkOutcome::Ignored;
        }

        if let Some(moderation) = &self.moderation {
            if moderation.should_direct_output() {
                self.suppressed = true;
                self.state.answer = moderation.final_output().unwrap_or_default();
                metrics().moderation_flip();
                return ChunkOutcome::Suppressed;
            }
            moderation.append(text);
        }

        self.state.answer.push_str(text);
        ChunkOutcome::Delta(text.to_string())
    }

    async fn apply_annotation(&mut self, annotation_id: Uuid) -> PipelineResult<()> {
        let Some(annotation) = self.storage.annotation(annotation_id).await? else {
            debug!(%annotation_id, "annotation not found; event skipped");
            return Ok(());
        };

        self.state.metadata.annotation_reply = Some(AnnotationReply {
            id: annotation.id,
            account: AnnotationAccount {
                id: annotation.account_id,
                name: annotation
                    .account_name
                    .clone()
                    .unwrap_or_else(|| "user".to_string()),
            },
        });
        self.state.answer = annotation.content;
        Ok(())
    }

    /// Merge a succeeded LLM node's usage into the running accounting
    fn merge_node_usage(&mut self, node: &WorkflowNodeExecution) {
        if node.status != NodeExecutionStatus::Succeeded || node.node_type != NodeType::Llm {
            return;
        }
        if let Some(usage) = crate::protocol::usage::Usage::from_node_outputs(&node.outputs) {
            self.state.usage.merge(&usage);
            self.state.metadata.usage = Some(self.state.usage.clone());
        }
    }

    async fn message_file_frame(
        &self,
        message_file_id: Uuid,
    ) -> PipelineResult<Option<StreamFrame>> {
        let Some(file) = self.storage.message_file(message_file_id).await? else {
            debug!(%message_file_id, "message file not found; event skipped");
            return Ok(None);
        };

        let extension = signing::file_extension(&file.url);
        let url = self.signer.sign_url(file.id, &extension);

        Ok(Some(StreamFrame::MessageFile {
            conversation_id: self.conversation.id,
            id: file.id,
            file_type: file.file_type.clone(),
            belongs_to: file.belongs_to.clone().unwrap_or_else(|| "user".to_string()),
            url,
        }))
    }

    /// Finalize on the streaming path: moderation, persistence, then
    /// `message_end`
    async fn finalize_streaming(
        &mut self,
        frames: &mpsc::UnboundedSender<String>,
    ) -> PipelineResult<()> {
        if self.moderate_final_answer().await {
            self.emit(frames, self.message_replace_frame());
        }

        self.save_message().await?;

        let metadata = (!self.state.metadata.is_empty())
            .then(|| self.state.metadata.render(self.entity.invoke_from));
        self.emit(
            frames,
            StreamFrame::MessageEnd {
                task_id: self.entity.task_id,
                id: self.message.id,
                message_id: self.message.id,
                conversation_id: self.conversation.id,
                metadata,
            },
        );
        Ok(())
    }

    /// Finalize on the blocking path and build the aggregated response
    async fn finalize_blocking(&mut self) -> PipelineResult<BlockingResponse> {
        self.moderate_final_answer().await;
        self.save_message().await?;

        let metadata = (!self.state.metadata.is_empty())
            .then(|| self.state.metadata.render(self.entity.invoke_from));
        Ok(BlockingResponse {
            event: "message".to_string(),
            task_id: self.entity.task_id,
            id: self.message.id,
            message_id: self.message.id,
            conversation_id: self.conversation.id,
            mode: self.conversation.mode.clone(),
            answer: self.state.answer.clone(),
            metadata,
            created_at: self.message.created_at_unix(),
        })
    }

    /// Stop the scanner and run the one finalize call
    ///
    /// Taking the handler out of `self` makes finalization single-shot by
    /// construction. Returns true when the answer was redacted.
    async fn moderate_final_answer(&mut self) -> bool {
        let Some(moderation) = self.moderation.take() else {
            return false;
        };

        moderation.stop();
        let moderated = moderation.moderate(&self.state.answer, false).await;
        if moderated != self.state.answer {
            self.state.answer = moderated;
            return true;
        }
        false
    }

    /// Stop moderation without finalizing; the error path
    fn abort_moderation(&mut self) {
        if let Some(moderation) = self.moderation.take() {
            moderation.stop();
        }
    }

    /// Persist the final message and publish the created notification
    ///
    /// The record is re-read by id first: the producing engine may have
    /// touched it since the pipeline started, so the pre-stream copy must
    /// not be trusted.
    async fn save_message(&mut self) -> PipelineResult<()> {
        let mut message = self
            .storage
            .message(self.message.id)
            .await?
            .ok_or_else(|| {
                PipelineError::internal(format!("message {} not found at finalization", self.message.id))
            })?;

        message.answer = self.state.answer.clone();
        message.provider_response_latency = self.started_at.elapsed().as_secs_f64();
        message.workflow_run_id = self.state.workflow_run_id;

        if let Some(usage) = &self.state.metadata.usage {
            message.message_tokens = usage.prompt_tokens;
            message.message_unit_price = usage.prompt_unit_price;
            message.message_price_unit = usage.prompt_price_unit;
            message.answer_tokens = usage.completion_tokens;
            message.answer_unit_price = usage.completion_unit_price;
            message.answer_price_unit = usage.completion_price_unit;
            message.total_price = usage.total_price;
            message.currency = usage.currency.clone();
        }

        self.storage.update_message(&message).await?;
        metrics().message_persisted();

        self.notifier.message_created(MessageCreated {
            message: message.clone(),
            conversation_id: self.conversation.id,
            is_first_message: self.entity.conversation_id.is_none(),
            extras: self.entity.extras.clone(),
        });

        self.message = message;
        Ok(())
    }

    async fn require_workflow_run(&self, id: Uuid) -> PipelineResult<WorkflowRun> {
        self.storage
            .workflow_run(id)
            .await?
            .ok_or_else(|| PipelineError::internal(format!("workflow run {id} not found")))
    }

    async fn require_node_execution(&self, id: Uuid) -> PipelineResult<WorkflowNodeExecution> {
        self.storage
            .node_execution(id)
            .await?
            .ok_or_else(|| PipelineError::internal(format!("node execution {id} not found")))
    }

    fn message_frame(&self, answer: String) -> StreamFrame {
        StreamFrame::Message {
            id: self.message.id,
            task_id: self.entity.task_id,
            message_id: self.message.id,
            conversation_id: self.conversation.id,
            answer,
            created_at: self.message.created_at_unix(),
        }
    }

    fn message_replace_frame(&self) -> StreamFrame {
        StreamFrame::MessageReplace {
            task_id: self.entity.task_id,
            message_id: self.message.id,
            conversation_id: self.conversation.id,
            answer: self.state.answer.clone(),
            created_at: self.message.created_at_unix(),
        }
    }

    fn emit(&self, frames: &mpsc::UnboundedSender<String>, frame: StreamFrame) {
        metrics().frame_emitted();
        if frames.send(frame.to_wire()).is_err() {
            // client went away; keep consuming so persistence still happens
            debug!(frame = frame.event_name(), "stream receiver dropped; frame discarded");
        }
    }
}
