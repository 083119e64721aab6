//! SQLite store.
//!
//! One database file, four tables:
//! - `conversations`: id, topic, rolling summary
//! - `messages`: append-only log; `seq` gives a stable creation order
//! - `notes`: raw input audit trail
//! - `tasks`: reconciled tasks
//!
//! Task batches run inside a `sqlx::Transaction`; dropping one without
//! committing rolls it back.

use std::str::FromStr;

use async_trait::async_trait;
use braindump_core::error::StoreError;
use braindump_core::message::{Conversation, ConversationId, Message, Role};
use braindump_core::note::{Note, NoteKind};
use braindump_core::store::{ConversationStore, TaskBatch};
use braindump_core::task::{Priority, Task, TaskDraft, TaskId, TaskKey, TaskStatus};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A SQLite-backed conversation store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database; it is pinned to a
    /// single connection so every query sees the same data.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let in_memory = path.contains(":memory:");
        if !in_memory {
            let file = path.trim_start_matches("sqlite://").trim_start_matches("sqlite:");
            if let Some(parent) = std::path::Path::new(file).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::Storage(format!("Failed to create {}: {e}", parent.display()))
                    })?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements: [(&str, &str); 7] = [
            (
                "conversations table",
                r#"
                CREATE TABLE IF NOT EXISTS conversations (
                    id              TEXT PRIMARY KEY,
                    topic           TEXT,
                    running_summary TEXT NOT NULL DEFAULT '',
                    created_at      TEXT NOT NULL,
                    updated_at      TEXT NOT NULL
                )
                "#,
            ),
            (
                "messages table",
                r#"
                CREATE TABLE IF NOT EXISTS messages (
                    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                    id              TEXT UNIQUE NOT NULL,
                    conversation_id TEXT NOT NULL REFERENCES conversations(id),
                    role            TEXT NOT NULL,
                    content         TEXT NOT NULL,
                    metadata        TEXT NOT NULL DEFAULT '{}',
                    created_at      TEXT NOT NULL
                )
                "#,
            ),
            (
                "messages index",
                "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, seq DESC)",
            ),
            (
                "notes table",
                r#"
                CREATE TABLE IF NOT EXISTS notes (
                    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                    id              TEXT UNIQUE NOT NULL,
                    conversation_id TEXT REFERENCES conversations(id),
                    kind            TEXT NOT NULL,
                    content         TEXT NOT NULL,
                    created_at      TEXT NOT NULL
                )
                "#,
            ),
            (
                "tasks table",
                r#"
                CREATE TABLE IF NOT EXISTS tasks (
                    id               INTEGER PRIMARY KEY AUTOINCREMENT,
                    title            TEXT NOT NULL,
                    description      TEXT,
                    difficulty       INTEGER NOT NULL DEFAULT 2,
                    duration_minutes INTEGER NOT NULL DEFAULT 30,
                    priority         TEXT NOT NULL DEFAULT 'medium',
                    due_date         TEXT,
                    status           TEXT NOT NULL DEFAULT 'New',
                    dependencies     TEXT NOT NULL DEFAULT '[]',
                    project_id       INTEGER,
                    created_at       TEXT NOT NULL,
                    updated_at       TEXT NOT NULL
                )
                "#,
            ),
            (
                "tasks title index",
                "CREATE INDEX IF NOT EXISTS idx_tasks_title ON tasks(title, due_date)",
            ),
            (
                "tasks updated index",
                "CREATE INDEX IF NOT EXISTS idx_tasks_updated_at ON tasks(updated_at DESC)",
            ),
        ];

        for (label, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{label}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_conversation(row: &SqliteRow) -> Result<Conversation, StoreError> {
        Ok(Conversation {
            id: ConversationId(column(row, "id")?),
            topic: column(row, "topic")?,
            running_summary: column(row, "running_summary")?,
            created_at: parse_timestamp(&column::<String>(row, "created_at")?),
            updated_at: parse_timestamp(&column::<String>(row, "updated_at")?),
        })
    }

    fn row_to_message(row: &SqliteRow) -> Result<Message, StoreError> {
        let role: String = column(row, "role")?;
        let metadata: String = column(row, "metadata")?;
        Ok(Message {
            id: column(row, "id")?,
            conversation_id: ConversationId(column(row, "conversation_id")?),
            role: Role::from_str(&role)
                .map_err(|e| StoreError::QueryFailed(format!("role column: {e}")))?,
            content: column(row, "content")?,
            metadata: serde_json::from_str(&metadata).unwrap_or_default(),
            created_at: parse_timestamp(&column::<String>(row, "created_at")?),
        })
    }

    fn row_to_note(row: &SqliteRow) -> Result<Note, StoreError> {
        let conversation_id: Option<String> = column(row, "conversation_id")?;
        Ok(Note {
            id: column(row, "id")?,
            conversation_id: conversation_id.map(ConversationId),
            kind: NoteKind::BrainDump,
            content: column(row, "content")?,
            created_at: parse_timestamp(&column::<String>(row, "created_at")?),
        })
    }

    fn row_to_task(row: &SqliteRow) -> Result<Task, StoreError> {
        let priority: String = column(row, "priority")?;
        let status: String = column(row, "status")?;
        let due_date: Option<String> = column(row, "due_date")?;
        let dependencies: String = column(row, "dependencies")?;

        Ok(Task {
            id: column(row, "id")?,
            title: column(row, "title")?,
            description: column(row, "description")?,
            difficulty: column(row, "difficulty")?,
            duration_minutes: column(row, "duration_minutes")?,
            priority: Priority::from_str(&priority).unwrap_or_else(|_| {
                warn!(%priority, "Unknown stored priority, reading as default");
                Priority::default()
            }),
            due_date: due_date.and_then(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT).ok()),
            status: TaskStatus::from_str(&status).unwrap_or_else(|_| {
                warn!(%status, "Unknown stored status, reading as New");
                TaskStatus::New
            }),
            dependencies: serde_json::from_str(&dependencies).unwrap_or_default(),
            project_id: column(row, "project_id")?,
            created_at: parse_timestamp(&column::<String>(row, "created_at")?),
            updated_at: parse_timestamp(&column::<String>(row, "updated_at")?),
        })
    }
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

fn dependencies_json(draft: &TaskDraft) -> Result<String, StoreError> {
    serde_json::to_string(&draft.dependencies)
        .map_err(|e| StoreError::Storage(format!("Dependencies serialization: {e}")))
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_conversation(&self, topic: Option<String>) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new(topic);
        sqlx::query(
            "INSERT INTO conversations (id, topic, running_summary, created_at, updated_at) VALUES (?1, ?2, '', ?3, ?4)",
        )
        .bind(conversation.id.as_str())
        .bind(&conversation.topic)
        .bind(timestamp(conversation.created_at))
        .bind(timestamp(conversation.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT conversation failed: {e}")))?;

        debug!(conversation_id = %conversation.id, "Created conversation");
        Ok(conversation)
    }

    async fn get_conversation(&self, id: &ConversationId) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Get conversation: {e}")))?;

        row.as_ref().map(Self::row_to_conversation).transpose()
    }

    async fn set_running_summary(&self, id: &ConversationId, summary: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE conversations SET running_summary = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(summary)
        .bind(timestamp(Utc::now()))
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE summary failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("conversation {id}")));
        }
        Ok(())
    }

    async fn append_message(&self, message: &Message) -> Result<(), StoreError> {
        let metadata = serde_json::to_string(&message.metadata)
            .map_err(|e| StoreError::Storage(format!("Metadata serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, role, content, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&message.id)
        .bind(message.conversation_id.as_str())
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&metadata)
        .bind(timestamp(message.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT message failed: {e}")))?;

        Ok(())
    }

    async fn recent_messages(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE conversation_id = ?1 ORDER BY seq DESC LIMIT ?2",
        )
        .bind(id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Recent messages: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn append_note(&self, note: &Note) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO notes (id, conversation_id, kind, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&note.id)
        .bind(note.conversation_id.as_ref().map(|c| c.as_str()))
        .bind(note.kind.as_str())
        .bind(&note.content)
        .bind(timestamp(note.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT note failed: {e}")))?;

        Ok(())
    }

    async fn notes(&self, id: &ConversationId) -> Result<Vec<Note>, StoreError> {
        let rows = sqlx::query("SELECT * FROM notes WHERE conversation_id = ?1 ORDER BY seq")
            .bind(id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Notes: {e}")))?;

        rows.iter().map(Self::row_to_note).collect()
    }

    async fn recent_tasks(&self, limit: usize) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query("SELECT * FROM tasks ORDER BY updated_at DESC, id DESC LIMIT ?1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Recent tasks: {e}")))?;

        rows.iter().map(Self::row_to_task).collect()
    }

    async fn set_task_status(&self, id: TaskId, status: TaskStatus) -> Result<Task, StoreError> {
        let result = sqlx::query("UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(status.as_str())
            .bind(timestamp(Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE task status failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("task {id}")));
        }

        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Load task: {e}")))?;
        Self::row_to_task(&row)
    }

    async fn begin_task_batch(&self) -> Result<Box<dyn TaskBatch>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;
        Ok(Box::new(SqliteTaskBatch { tx: Some(tx) }))
    }
}

/// Task writes scoped to one transaction.
struct SqliteTaskBatch {
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteTaskBatch {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Sqlite>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::BatchFinished)
    }

    async fn load(&mut self, id: TaskId) -> Result<Task, StoreError> {
        let tx = self.tx()?;
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Load task: {e}")))?
            .ok_or_else(|| StoreError::NotFound(format!("task {id}")))?;
        SqliteStore::row_to_task(&row)
    }
}

#[async_trait]
impl TaskBatch for SqliteTaskBatch {
    async fn find_match(&mut self, key: &TaskKey) -> Result<Option<Task>, StoreError> {
        let tx = self.tx()?;
        let row = sqlx::query(
            "SELECT * FROM tasks WHERE title = ?1 AND (?2 IS NULL OR due_date = ?2) ORDER BY id LIMIT 1",
        )
        .bind(&key.title)
        .bind(format_date(key.due_date))
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Match task: {e}")))?;

        row.as_ref().map(SqliteStore::row_to_task).transpose()
    }

    async fn insert(&mut self, draft: &TaskDraft) -> Result<Task, StoreError> {
        let dependencies = dependencies_json(draft)?;
        let now = timestamp(Utc::now());
        let tx = self.tx()?;
        let result = sqlx::query(
            r#"
            INSERT INTO tasks (title, description, difficulty, duration_minutes, priority,
                               due_date, status, dependencies, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(draft.difficulty)
        .bind(draft.duration_minutes)
        .bind(draft.priority.as_str())
        .bind(format_date(draft.due_date))
        .bind(TaskStatus::New.as_str())
        .bind(&dependencies)
        .bind(&now)
        .execute(&mut **tx)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT task failed: {e}")))?;

        self.load(result.last_insert_rowid()).await
    }

    async fn update(&mut self, id: TaskId, draft: &TaskDraft) -> Result<Task, StoreError> {
        let dependencies = dependencies_json(draft)?;
        let tx = self.tx()?;
        let result = sqlx::query(
            r#"
            UPDATE tasks SET title = ?1, description = ?2, difficulty = ?3, duration_minutes = ?4,
                             priority = ?5, due_date = ?6, status = ?7, dependencies = ?8,
                             updated_at = ?9
            WHERE id = ?10
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(draft.difficulty)
        .bind(draft.duration_minutes)
        .bind(draft.priority.as_str())
        .bind(format_date(draft.due_date))
        .bind(TaskStatus::New.as_str())
        .bind(&dependencies)
        .bind(timestamp(Utc::now()))
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE task failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("task {id}")));
        }
        self.load(id).await
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::BatchFinished)?;
        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))
    }
}
