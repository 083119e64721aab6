//! Task domain types and the reconciliation match key.
//!
//! A stored [`Task`] has an integer primary key, but reconciliation never
//! looks at it: identity for merge purposes is the [`TaskKey`] derived from
//! an extracted record (title, plus due date when one was suggested).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub type TaskId = i64;

pub const DEFAULT_TITLE: &str = "Untitled";
pub const DEFAULT_DIFFICULTY: i64 = 2;
pub const DEFAULT_DURATION_MINUTES: i64 = 30;
pub const MIN_DIFFICULTY: i64 = 1;
pub const MAX_DIFFICULTY: i64 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(Error::InvalidInput(format!("unknown priority: {other}"))),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    New,
    #[serde(rename = "In Progress")]
    InProgress,
    Blocked,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::New => "New",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Blocked => "Blocked",
            TaskStatus::Done => "Done",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(TaskStatus::New),
            "In Progress" => Ok(TaskStatus::InProgress),
            "Blocked" => Ok(TaskStatus::Blocked),
            "Done" => Ok(TaskStatus::Done),
            other => Err(Error::InvalidInput(format!("unknown task status: {other}"))),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 1 (trivial) to 5 (hard)
    pub difficulty: i64,
    pub duration_minutes: i64,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub status: TaskStatus,
    /// Opaque references: task ids or free text.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// One-line projection used by the context task snapshot:
    /// `#<id> [<status>/<priority>] <title> (due:<date-or-'-'>, <duration>min)`.
    pub fn snapshot_line(&self) -> String {
        let due = self
            .due_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".into());
        format!(
            "#{} [{}/{}] {} (due:{}, {}min)",
            self.id, self.status, self.priority, self.title, due, self.duration_minutes
        )
    }

    /// Overwrite every reconciled field from a draft. Status resets to `New`.
    pub fn apply(&mut self, draft: &TaskDraft, now: DateTime<Utc>) {
        self.title = draft.title.clone();
        self.description = draft.description.clone();
        self.difficulty = draft.difficulty;
        self.duration_minutes = draft.duration_minutes;
        self.priority = draft.priority;
        self.due_date = draft.due_date;
        self.status = TaskStatus::New;
        self.dependencies = draft.dependencies.clone();
        self.updated_at = now;
    }
}

/// Fully coerced field set produced from one extracted record.
///
/// Status is not carried: every write made from a draft sets `New`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub difficulty: i64,
    pub duration_minutes: i64,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub dependencies: Vec<String>,
}

impl TaskDraft {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn key(&self) -> TaskKey {
        TaskKey {
            title: self.title.clone(),
            due_date: self.due_date,
        }
    }
}

impl Default for TaskDraft {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.into(),
            description: None,
            difficulty: DEFAULT_DIFFICULTY,
            duration_minutes: DEFAULT_DURATION_MINUTES,
            priority: Priority::default(),
            due_date: None,
            dependencies: Vec::new(),
        }
    }
}

/// Reconciliation identity.
///
/// Title must match exactly. When the extracted record suggested a due date,
/// the stored due date must match it too; without one, any due date matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub title: String,
    pub due_date: Option<NaiveDate>,
}

impl TaskKey {
    pub fn matches(&self, task: &Task) -> bool {
        if task.title != self.title {
            return false;
        }
        match self.due_date {
            Some(due) => task.due_date == Some(due),
            None => true,
        }
    }
}
