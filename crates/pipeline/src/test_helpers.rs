//! Shared test doubles for pipeline tests.

use std::sync::Mutex;

use async_trait::async_trait;
use braindump_core::error::{GatewayError, StoreError};
use braindump_core::gateway::{GenerateOptions, Generation, ModelGateway, PromptSegment};
use braindump_core::message::{Conversation, ConversationId, Message};
use braindump_core::note::Note;
use braindump_core::store::{ConversationStore, TaskBatch};
use braindump_core::task::{Task, TaskDraft, TaskId, TaskKey, TaskStatus};
use braindump_store::InMemoryStore;
use serde_json::json;

/// One recorded gateway call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub segments: Vec<PromptSegment>,
    pub options: GenerateOptions,
}

/// A gateway that replays scripted responses.
///
/// Call `n` returns response `n`; once the script runs out the last response
/// repeats.
pub struct ScriptedGateway {
    responses: Vec<String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedGateway {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: responses.into_iter().map(String::from).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always(response: &str) -> Self {
        Self::new(vec![response])
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        segments: &[PromptSegment],
        options: &GenerateOptions,
    ) -> Result<Generation, GatewayError> {
        let mut calls = self.calls.lock().unwrap();
        let index = calls.len().min(self.responses.len().saturating_sub(1));
        calls.push(RecordedCall {
            segments: segments.to_vec(),
            options: options.clone(),
        });

        let content = self.responses.get(index).cloned().unwrap_or_default();
        Ok(Generation {
            raw: json!({
                "model": "scripted-model",
                "choices": [{"message": {"role": "assistant", "content": content}}]
            }),
            content,
        })
    }
}

/// A gateway whose every call fails with the given error.
pub struct FailingGateway(pub GatewayError);

#[async_trait]
impl ModelGateway for FailingGateway {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(
        &self,
        _segments: &[PromptSegment],
        _options: &GenerateOptions,
    ) -> Result<Generation, GatewayError> {
        Err(self.0.clone())
    }
}

/// In-memory store whose task batches fail on the n-th insert.
pub struct FlakyStore {
    inner: InMemoryStore,
    fail_on_insert: usize,
}

impl FlakyStore {
    /// `n` is 1-based: `failing_on_insert(2)` lets one insert through.
    pub fn failing_on_insert(n: usize) -> Self {
        Self {
            inner: InMemoryStore::new(),
            fail_on_insert: n,
        }
    }
}

#[async_trait]
impl ConversationStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn create_conversation(&self, topic: Option<String>) -> Result<Conversation, StoreError> {
        self.inner.create_conversation(topic).await
    }

    async fn get_conversation(&self, id: &ConversationId) -> Result<Option<Conversation>, StoreError> {
        self.inner.get_conversation(id).await
    }

    async fn set_running_summary(&self, id: &ConversationId, summary: &str) -> Result<(), StoreError> {
        self.inner.set_running_summary(id, summary).await
    }

    async fn append_message(&self, message: &Message) -> Result<(), StoreError> {
        self.inner.append_message(message).await
    }

    async fn recent_messages(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        self.inner.recent_messages(id, limit).await
    }

    async fn append_note(&self, note: &Note) -> Result<(), StoreError> {
        self.inner.append_note(note).await
    }

    async fn notes(&self, id: &ConversationId) -> Result<Vec<Note>, StoreError> {
        self.inner.notes(id).await
    }

    async fn recent_tasks(&self, limit: usize) -> Result<Vec<Task>, StoreError> {
        self.inner.recent_tasks(limit).await
    }

    async fn set_task_status(&self, id: TaskId, status: TaskStatus) -> Result<Task, StoreError> {
        self.inner.set_task_status(id, status).await
    }

    async fn begin_task_batch(&self) -> Result<Box<dyn TaskBatch>, StoreError> {
        Ok(Box::new(FlakyBatch {
            inner: self.inner.begin_task_batch().await?,
            inserts: 0,
            fail_on_insert: self.fail_on_insert,
        }))
    }
}

struct FlakyBatch {
    inner: Box<dyn TaskBatch>,
    inserts: usize,
    fail_on_insert: usize,
}

#[async_trait]
impl TaskBatch for FlakyBatch {
    async fn find_match(&mut self, key: &TaskKey) -> Result<Option<Task>, StoreError> {
        self.inner.find_match(key).await
    }

    async fn insert(&mut self, draft: &TaskDraft) -> Result<Task, StoreError> {
        self.inserts += 1;
        if self.inserts == self.fail_on_insert {
            return Err(StoreError::Storage("injected insert failure".into()));
        }
        self.inner.insert(draft).await
    }

    async fn update(&mut self, id: TaskId, draft: &TaskDraft) -> Result<Task, StoreError> {
        self.inner.update(id, draft).await
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.inner.commit().await
    }
}
