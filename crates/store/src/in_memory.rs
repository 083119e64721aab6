//! In-memory store: useful for testing and ephemeral sessions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use braindump_core::error::StoreError;
use braindump_core::message::{Conversation, ConversationId, Message};
use braindump_core::note::Note;
use braindump_core::store::{ConversationStore, TaskBatch};
use braindump_core::task::{Task, TaskDraft, TaskId, TaskKey, TaskStatus};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    conversations: HashMap<ConversationId, Conversation>,
    messages: Vec<Message>,
    notes: Vec<Note>,
    tasks: Vec<Task>,
    next_task_id: TaskId,
}

/// A store that keeps everything in process memory.
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                next_task_id: 1,
                ..State::default()
            })),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_conversation(&self, topic: Option<String>) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new(topic);
        self.state
            .write()
            .await
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(&self, id: &ConversationId) -> Result<Option<Conversation>, StoreError> {
        Ok(self.state.read().await.conversations.get(id).cloned())
    }

    async fn set_running_summary(&self, id: &ConversationId, summary: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let conversation = state
            .conversations
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("conversation {id}")))?;
        conversation.running_summary = summary.to_string();
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn append_message(&self, message: &Message) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.conversations.contains_key(&message.conversation_id) {
            return Err(StoreError::NotFound(format!(
                "conversation {}",
                message.conversation_id
            )));
        }
        state.messages.push(message.clone());
        Ok(())
    }

    async fn recent_messages(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .iter()
            .rev()
            .filter(|m| &m.conversation_id == id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn append_note(&self, note: &Note) -> Result<(), StoreError> {
        self.state.write().await.notes.push(note.clone());
        Ok(())
    }

    async fn notes(&self, id: &ConversationId) -> Result<Vec<Note>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .notes
            .iter()
            .filter(|n| n.conversation_id.as_ref() == Some(id))
            .cloned()
            .collect())
    }

    async fn recent_tasks(&self, limit: usize) -> Result<Vec<Task>, StoreError> {
        let state = self.state.read().await;
        let mut tasks = state.tasks.clone();
        tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        tasks.truncate(limit);
        Ok(tasks)
    }

    async fn set_task_status(&self, id: TaskId, status: TaskStatus) -> Result<Task, StoreError> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("task {id}")))?;
        task.status = status;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn begin_task_batch(&self) -> Result<Box<dyn TaskBatch>, StoreError> {
        let state = self.state.read().await;
        Ok(Box::new(InMemoryTaskBatch {
            state: Some(self.state.clone()),
            view: state.tasks.clone(),
            writes: Vec::new(),
        }))
    }
}

/// A write recorded by a batch, replayed onto the live state at commit.
enum BatchWrite {
    Insert(Task),
    Update {
        id: TaskId,
        draft: TaskDraft,
        at: DateTime<Utc>,
    },
}

/// Reads go to a private view of the task list; writes are logged and only
/// reach the shared state on commit, so tasks committed or re-statused by
/// others in the meantime are kept.
struct InMemoryTaskBatch {
    state: Option<Arc<RwLock<State>>>,
    view: Vec<Task>,
    writes: Vec<BatchWrite>,
}

impl InMemoryTaskBatch {
    fn shared(&self) -> Result<&Arc<RwLock<State>>, StoreError> {
        self.state.as_ref().ok_or(StoreError::BatchFinished)
    }
}

#[async_trait]
impl TaskBatch for InMemoryTaskBatch {
    async fn find_match(&mut self, key: &TaskKey) -> Result<Option<Task>, StoreError> {
        self.shared()?;
        Ok(self
            .view
            .iter()
            .filter(|t| key.matches(t))
            .min_by_key(|t| t.id)
            .cloned())
    }

    async fn insert(&mut self, draft: &TaskDraft) -> Result<Task, StoreError> {
        // Ids come from the live counter so concurrent batches never collide.
        // A rolled-back batch leaves a gap.
        let id = {
            let mut state = self.shared()?.write().await;
            let id = state.next_task_id;
            state.next_task_id += 1;
            id
        };

        let now = Utc::now();
        let task = Task {
            id,
            title: draft.title.clone(),
            description: draft.description.clone(),
            difficulty: draft.difficulty,
            duration_minutes: draft.duration_minutes,
            priority: draft.priority,
            due_date: draft.due_date,
            status: TaskStatus::New,
            dependencies: draft.dependencies.clone(),
            project_id: None,
            created_at: now,
            updated_at: now,
        };
        self.view.push(task.clone());
        self.writes.push(BatchWrite::Insert(task.clone()));
        Ok(task)
    }

    async fn update(&mut self, id: TaskId, draft: &TaskDraft) -> Result<Task, StoreError> {
        self.shared()?;
        let at = Utc::now();
        let task = self
            .view
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("task {id}")))?;
        task.apply(draft, at);
        let task = task.clone();
        self.writes.push(BatchWrite::Update {
            id,
            draft: draft.clone(),
            at,
        });
        Ok(task)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let shared = self.state.take().ok_or(StoreError::BatchFinished)?;
        let mut state = shared.write().await;

        // Validate before mutating so a failed commit applies nothing.
        for write in &self.writes {
            if let BatchWrite::Update { id, .. } = write {
                let known = state.tasks.iter().any(|t| t.id == *id)
                    || self
                        .writes
                        .iter()
                        .any(|w| matches!(w, BatchWrite::Insert(t) if t.id == *id));
                if !known {
                    return Err(StoreError::NotFound(format!("task {id}")));
                }
            }
        }

        for write in std::mem::take(&mut self.writes) {
            match write {
                BatchWrite::Insert(task) => state.tasks.push(task),
                BatchWrite::Update { id, draft, at } => {
                    if let Some(task) = state.tasks.iter_mut().find(|t| t.id == id) {
                        task.apply(&draft, at);
                    }
                }
            }
        }
        Ok(())
    }
}
