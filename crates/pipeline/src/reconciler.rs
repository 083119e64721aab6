//! Task reconciler: merges extracted task records into the store.
//!
//! Every record in a batch is coerced into a [`TaskDraft`], matched by its
//! [`TaskKey`] and then either updates the first matching task or creates a
//! new one. Records without a title have no key and always create a new
//! `"Untitled"` task. The whole batch runs inside one [`TaskBatch`]: if any write
//! fails, nothing from the batch is kept.

use braindump_core::error::StoreError;
use braindump_core::store::ConversationStore;
use braindump_core::task::{
    DEFAULT_DIFFICULTY, DEFAULT_DURATION_MINUTES, DEFAULT_TITLE, MAX_DIFFICULTY, MIN_DIFFICULTY,
    Priority, TaskDraft, TaskId,
};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// What a reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Ids of tasks created, in record order.
    pub created: Vec<TaskId>,
    /// Ids of tasks updated, in record order. May repeat.
    pub updated: Vec<TaskId>,
    /// Records that were not JSON objects.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskReconciler;

impl TaskReconciler {
    pub fn new() -> Self {
        Self
    }

    /// Coerce one extracted record. `None` if it is not a JSON object.
    ///
    /// Missing or unusable fields take their defaults: title `"Untitled"`,
    /// difficulty 2 (clamped to 1..=5), duration 30 minutes, priority
    /// `medium`, no due date, no dependencies. Any status in the record is
    /// ignored.
    pub fn draft_from_record(record: &Value) -> Option<TaskDraft> {
        let record = record.as_object()?;

        let title = extracted_title(record).unwrap_or(DEFAULT_TITLE).to_string();

        let description = record
            .get("description")
            .and_then(Value::as_str)
            .filter(|d| !d.trim().is_empty())
            .map(str::to_string);

        let difficulty = coerce_int(record.get("difficulty"))
            .map(|d| d.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY))
            .unwrap_or(DEFAULT_DIFFICULTY);

        let duration_minutes = coerce_int(record.get("ideal_duration"))
            .filter(|m| *m > 0)
            .unwrap_or(DEFAULT_DURATION_MINUTES);

        let priority = record
            .get("priority")
            .and_then(Value::as_str)
            .and_then(|p| p.parse::<Priority>().ok())
            .unwrap_or_default();

        let due_date = record
            .get("suggested_due_date")
            .and_then(Value::as_str)
            .and_then(parse_due_date);

        Some(TaskDraft {
            title,
            description,
            difficulty,
            duration_minutes,
            priority,
            due_date,
            dependencies: coerce_dependencies(record.get("dependencies")),
        })
    }

    /// Reconcile a list of extracted records in one atomic batch.
    pub async fn reconcile(
        &self,
        store: &dyn ConversationStore,
        records: &[Value],
    ) -> Result<ReconcileReport, StoreError> {
        let mut report = ReconcileReport::default();
        if records.is_empty() {
            return Ok(report);
        }

        let mut batch = store.begin_task_batch().await?;

        for (index, record) in records.iter().enumerate() {
            let Some(draft) = Self::draft_from_record(record) else {
                warn!(index, "Skipping extracted task that is not an object");
                report.skipped += 1;
                continue;
            };

            let existing = match record.as_object().and_then(extracted_title) {
                Some(_) => batch.find_match(&draft.key()).await?,
                None => None,
            };

            match existing {
                Some(existing) => {
                    let task = batch.update(existing.id, &draft).await?;
                    debug!(task_id = task.id, title = %task.title, "Task updated");
                    report.updated.push(task.id);
                }
                None => {
                    let task = batch.insert(&draft).await?;
                    debug!(task_id = task.id, title = %task.title, "Task created");
                    report.created.push(task.id);
                }
            }
        }

        batch.commit().await?;
        Ok(report)
    }
}

/// The record's own title, if it carries a usable one.
fn extracted_title(record: &Map<String, Value>) -> Option<&str> {
    record
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
}

/// Integers from JSON numbers or numeric strings. Fractions are rounded.
fn coerce_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.round() as i64)
            })
        }
        _ => None,
    }
}

/// `YYYY-MM-DD`, also accepting a longer ISO timestamp by its date part.
fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn coerce_dependencies(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}
