//! Mock implementations for testing
//!
//! Provides mock Storage, ModerationBackend, FileSigner and
//! MessageNotifier implementations to enable comprehensive testing without
//! external collaborators.

use crate::moderation::ModerationBackend;
use crate::notify::{MessageCreated, MessageNotifier};
use crate::signing::FileSigner;
use crate::storage::entities::{
    Annotation, Message, MessageFile, WorkflowNodeExecution, WorkflowRun,
};
use crate::storage::{Storage, StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// In-memory storage mock
///
/// Every read clones the current record, so the fresh-read contract holds
/// by construction; concurrent writers are visible to the next read.
#[derive(Debug, Default)]
pub struct MockStorage {
    runs: Mutex<HashMap<Uuid, WorkflowRun>>,
    nodes: Mutex<HashMap<Uuid, WorkflowNodeExecution>>,
    messages: Mutex<HashMap<Uuid, Message>>,
    files: Mutex<HashMap<Uuid, MessageFile>>,
    annotations: Mutex<HashMap<Uuid, Annotation>>,
    update_count: AtomicU64,
    fail_reads: AtomicBool,
    fail_updates: AtomicBool,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_run(&self, run: WorkflowRun) {
        self.runs.lock().unwrap().insert(run.id, run);
    }

    pub fn insert_node(&self, node: WorkflowNodeExecution) {
        self.nodes.lock().unwrap().insert(node.id, node);
    }

    pub fn insert_message(&self, message: Message) {
        self.messages.lock().unwrap().insert(message.id, message);
    }

    pub fn insert_file(&self, file: MessageFile) {
        self.files.lock().unwrap().insert(file.id, file);
    }

    pub fn insert_annotation(&self, annotation: Annotation) {
        self.annotations
            .lock()
            .unwrap()
            .insert(annotation.id, annotation);
    }

    /// Make every read fail, for error-path tests
    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    /// Make every update fail, for error-path tests
    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }

    /// Number of committed message updates
    pub fn update_count(&self) -> u64 {
        self.update_count.load(Ordering::SeqCst)
    }

    /// The current persisted state of a message
    pub fn stored_message(&self, id: Uuid) -> Option<Message> {
        self.messages.lock().unwrap().get(&id).cloned()
    }

    fn check_read(&self) -> StorageResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            Err(StorageError::Backend("mock read failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn workflow_run(&self, id: Uuid) -> StorageResult<Option<WorkflowRun>> {
        self.check_read()?;
        Ok(self.runs.lock().unwrap().get(&id).cloned())
    }

    async fn node_execution(&self, id: Uuid) -> StorageResult<Option<WorkflowNodeExecution>> {
        self.check_read()?;
        Ok(self.nodes.lock().unwrap().get(&id).cloned())
    }

    async fn message(&self, id: Uuid) -> StorageResult<Option<Message>> {
        self.check_read()?;
        Ok(self.messages.lock().unwrap().get(&id).cloned())
    }

    async fn message_file(&self, id: Uuid) -> StorageResult<Option<MessageFile>> {
        self.check_read()?;
        Ok(self.files.lock().unwrap().get(&id).cloned())
    }

    async fn annotation(&self, id: Uuid) -> StorageResult<Option<Annotation>> {
        self.check_read()?;
        Ok(self.annotations.lock().unwrap().get(&id).cloned())
    }

    async fn update_message(&self, message: &Message) -> StorageResult<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("mock update failure".to_string()));
        }
        self.update_count.fetch_add(1, Ordering::SeqCst);
        self.messages
            .lock()
            .unwrap()
            .insert(message.id, message.clone());
        Ok(())
    }
}

/// Scripted moderation backend
///
/// Flags any text containing the trigger substring and replaces flagged
/// completions with the configured replacement.
#[derive(Debug)]
pub struct MockModerationBackend {
    trigger: Option<String>,
    replacement: String,
    scan_calls: AtomicU64,
    moderate_calls: AtomicU64,
}

impl MockModerationBackend {
    /// A backend that never flags anything
    pub fn permissive() -> Self {
        Self {
            trigger: None,
            replacement: String::new(),
            scan_calls: AtomicU64::new(0),
            moderate_calls: AtomicU64::new(0),
        }
    }

    /// A backend that flags on `trigger` and substitutes `replacement`
    pub fn with_trigger(trigger: &str, replacement: &str) -> Self {
        Self {
            trigger: Some(trigger.to_string()),
            replacement: replacement.to_string(),
            scan_calls: AtomicU64::new(0),
            moderate_calls: AtomicU64::new(0),
        }
    }

    pub fn scan_call_count(&self) -> u64 {
        self.scan_calls.load(Ordering::SeqCst)
    }

    pub fn moderate_call_count(&self) -> u64 {
        self.moderate_calls.load(Ordering::SeqCst)
    }

    fn flagged(&self, text: &str) -> bool {
        self.trigger
            .as_deref()
            .map(|t| text.contains(t))
            .unwrap_or(false)
    }
}

#[async_trait]
impl ModerationBackend for MockModerationBackend {
    async fn scan(&self, text: &str) -> Option<String> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        self.flagged(text).then(|| self.replacement.clone())
    }

    async fn moderate(&self, completion: &str) -> String {
        self.moderate_calls.fetch_add(1, Ordering::SeqCst);
        if self.flagged(completion) {
            self.replacement.clone()
        } else {
            completion.to_string()
        }
    }
}

/// Deterministic signer for tests
#[derive(Debug, Clone)]
pub struct StaticSigner {
    pub base_url: String,
}

impl StaticSigner {
    pub fn new() -> Self {
        Self {
            base_url: "https://files.test".to_string(),
        }
    }
}

impl Default for StaticSigner {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSigner for StaticSigner {
    fn sign_url(&self, file_id: Uuid, extension: &str) -> String {
        format!("{}/files/{file_id}{extension}?sig=test", self.base_url)
    }
}

/// Notifier that records every published event
#[derive(Debug, Default, Clone)]
pub struct CollectingNotifier {
    events: Arc<Mutex<Vec<MessageCreated>>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MessageCreated> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl MessageNotifier for CollectingNotifier {
    fn message_created(&self, event: MessageCreated) {
        self.events.lock().unwrap().push(event);
    }
}
