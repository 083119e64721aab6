//! Context assembler: decides what history fits into the prompt.
//!
//! Output is always two segments:
//!
//! 1. **Instructions**: the static extraction contract (system role)
//! 2. **CONTEXT**: rolling summary, task snapshot, semantic recall and the
//!    recent message tail, in that order (system role)
//!
//! # Determinism
//!
//! [`ContextAssembler::build`] is a pure function of its input: identical
//! store contents always produce identical prompts.

use std::sync::Arc;

use braindump_core::error::StoreError;
use braindump_core::gateway::PromptSegment;
use braindump_core::message::{Conversation, Message};
use braindump_core::store::ConversationStore;
use braindump_core::task::Task;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::budget::{CharCount, TextMeasure};
use crate::context::recall::{NoRecall, RecallSource};

/// The extraction contract sent ahead of every context block.
pub const EXTRACTION_INSTRUCTIONS: &str = r#"You turn free-form brain dumps into structured tasks.
Read the CONTEXT (rolling summary, current tasks, recall, recent messages) and the user's latest input.
Reply with a single JSON object and nothing else:
{
  "tasks": [
    {
      "title": "short imperative title",
      "description": "optional detail",
      "difficulty": 1-5,
      "ideal_duration": minutes,
      "dependencies": ["task id or free text"],
      "priority": "low|medium|high|urgent",
      "suggested_due_date": "YYYY-MM-DD",
      "status": "New"
    }
  ],
  "references": [],
  "links": [],
  "notes": []
}
Reuse the exact title of an existing task when the input refers to it."#;

// ── Types ─────────────────────────────────────────────────────────────────

/// Character budgets. Sub-budgets are enforced per section before the
/// payload is cut to `total`.
#[derive(Debug, Clone)]
pub struct ContextBudget {
    /// Whole CONTEXT payload.
    pub total: usize,
    /// Recent message tail.
    pub recent: usize,
    /// Task snapshot.
    pub tasks: usize,
    /// Semantic recall.
    pub recall: usize,
    /// Messages fetched for the tail.
    pub recent_messages: usize,
    /// Tasks fetched for the snapshot.
    pub snapshot_tasks: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            total: 12_000,
            recent: 6_000,
            tasks: 4_000,
            recall: 2_000,
            recent_messages: 30,
            snapshot_tasks: 300,
        }
    }
}

impl From<&braindump_config::ContextConfig> for ContextBudget {
    fn from(config: &braindump_config::ContextConfig) -> Self {
        Self {
            total: config.total_chars,
            recent: config.recent_chars,
            tasks: config.task_chars,
            recall: config.recall_chars,
            recent_messages: config.recent_messages,
            snapshot_tasks: config.snapshot_tasks,
        }
    }
}

/// Everything the assembler reads, already fetched.
pub struct AssemblyInput<'a> {
    /// Rolling summary, used verbatim.
    pub summary: &'a str,
    /// Recent messages, newest first (store order).
    pub recent_messages: &'a [Message],
    /// Tasks, most recently updated first.
    pub tasks: &'a [Task],
    /// Recall chunks, best first.
    pub recall: &'a [String],
}

/// The assembled prompt, ready for the gateway.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// Instructions segment followed by the CONTEXT segment.
    pub segments: Vec<PromptSegment>,
    pub metadata: AssemblyMetadata,
}

impl AssembledContext {
    /// The CONTEXT payload text.
    pub fn payload(&self) -> &str {
        self.segments
            .last()
            .map(|s| s.content.as_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    /// Size of the final CONTEXT payload.
    pub payload_chars: usize,
    /// Configured total budget.
    pub budget: usize,
    /// Whether the final cut against `budget` fired.
    pub truncated: bool,
    pub sections: Vec<SectionStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionStats {
    pub name: String,
    /// Size of the rendered section body (before the final cut).
    pub chars: usize,
    pub items_included: usize,
    pub items_total: usize,
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Stateless apart from configuration; create one and reuse it.
pub struct ContextAssembler {
    budget: ContextBudget,
    measure: Arc<dyn TextMeasure>,
    recall: Arc<dyn RecallSource>,
}

impl ContextAssembler {
    pub fn new(budget: ContextBudget) -> Self {
        Self {
            budget,
            measure: Arc::new(CharCount),
            recall: Arc::new(NoRecall),
        }
    }

    pub fn with_default_budget() -> Self {
        Self::new(ContextBudget::default())
    }

    /// Swap the length measure (e.g. for a tokenizer).
    pub fn with_measure(mut self, measure: Arc<dyn TextMeasure>) -> Self {
        self.measure = measure;
        self
    }

    pub fn with_recall(mut self, recall: Arc<dyn RecallSource>) -> Self {
        self.recall = recall;
        self
    }

    pub fn budget(&self) -> &ContextBudget {
        &self.budget
    }

    /// Fetch the sources for `conversation` and build the prompt.
    pub async fn assemble(
        &self,
        store: &dyn ConversationStore,
        conversation: &Conversation,
    ) -> Result<AssembledContext, StoreError> {
        let recent = store
            .recent_messages(&conversation.id, self.budget.recent_messages)
            .await?;
        let tasks = store.recent_tasks(self.budget.snapshot_tasks).await?;
        let recall = self.recall.recall(conversation).await?;

        let assembled = self.build(&AssemblyInput {
            summary: &conversation.running_summary,
            recent_messages: &recent,
            tasks: &tasks,
            recall: &recall,
        });

        debug!(
            conversation_id = %conversation.id,
            payload_chars = assembled.metadata.payload_chars,
            truncated = assembled.metadata.truncated,
            "Context assembled"
        );
        Ok(assembled)
    }

    /// Build the prompt from already-fetched sources.
    pub fn build(&self, input: &AssemblyInput<'_>) -> AssembledContext {
        let summary_stats = SectionStats {
            name: "rolling_summary".into(),
            chars: self.measure.measure(input.summary),
            items_included: usize::from(!input.summary.is_empty()),
            items_total: usize::from(!input.summary.is_empty()),
        };
        let (snapshot, snapshot_stats) = self.render_task_snapshot(input.tasks);
        let (recall, recall_stats) = self.render_recall(input.recall);
        let (tail, tail_stats) = self.render_recent_tail(input.recent_messages);

        let full = format!(
            "CONTEXT\n[Rolling Summary]\n{}\n\n[Task Snapshot]\n{}\n\n[Semantic Recall]\n{}\n\n[Recent Messages]\n{}",
            input.summary, snapshot, recall, tail
        );

        let payload = self.measure.truncate(&full, self.budget.total);
        let truncated = payload.len() < full.len();

        AssembledContext {
            segments: vec![
                PromptSegment::system(EXTRACTION_INSTRUCTIONS),
                PromptSegment::system(payload),
            ],
            metadata: AssemblyMetadata {
                payload_chars: self.measure.measure(payload),
                budget: self.budget.total,
                truncated,
                sections: vec![summary_stats, snapshot_stats, recall_stats, tail_stats],
            },
        }
    }

    // ── Section renderers ─────────────────────────────────────────────────

    /// `"<ROLE>: <trimmed content>\n"` per message, oldest first.
    ///
    /// Lines are accepted from the newest message backwards and acceptance
    /// stops at the first line that would overflow the sub-budget, so the
    /// tail always ends on a whole line and the oldest lines go first.
    pub fn render_recent_tail(&self, newest_first: &[Message]) -> (String, SectionStats) {
        let mut used = 0;
        let mut lines = Vec::new();

        for message in newest_first {
            let line = format!("{}: {}\n", message.role.label(), message.content.trim());
            let size = self.measure.measure(&line);
            if used + size > self.budget.recent {
                break;
            }
            used += size;
            lines.push(line);
        }

        let included = lines.len();
        lines.reverse();

        (
            lines.concat(),
            SectionStats {
                name: "recent_messages".into(),
                chars: used,
                items_included: included,
                items_total: newest_first.len(),
            },
        )
    }

    /// One line per task, cut to the sub-budget at the last full line.
    pub fn render_task_snapshot(&self, tasks: &[Task]) -> (String, SectionStats) {
        let joined = tasks
            .iter()
            .map(Task::snapshot_line)
            .collect::<Vec<_>>()
            .join("\n");
        let kept = self.measure.truncate_lines(&joined, self.budget.tasks);
        let included = if kept.is_empty() {
            0
        } else {
            kept.lines().count()
        };

        (
            kept.to_string(),
            SectionStats {
                name: "task_snapshot".into(),
                chars: self.measure.measure(kept),
                items_included: included,
                items_total: tasks.len(),
            },
        )
    }

    fn render_recall(&self, chunks: &[String]) -> (String, SectionStats) {
        let joined = chunks.join("\n");
        let kept = self.measure.truncate_lines(&joined, self.budget.recall);
        let included = if kept.is_empty() {
            0
        } else {
            kept.lines().count().min(chunks.len())
        };

        (
            kept.to_string(),
            SectionStats {
                name: "semantic_recall".into(),
                chars: self.measure.measure(kept),
                items_included: included,
                items_total: chunks.len(),
            },
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use braindump_core::message::{ConversationId, Role};
    use braindump_core::store::TaskBatch;
    use braindump_core::task::{Priority, TaskDraft, TaskStatus};
    use braindump_store::InMemoryStore;
    use chrono::Utc;

    // ── Helpers ────────────────────────────────────────────────────────

    /// Messages numbered 0..n, returned newest first like the store does.
    fn messages_newest_first(n: usize, body_len: usize) -> Vec<Message> {
        let conv = ConversationId::from("c");
        let mut out: Vec<Message> = (0..n)
            .map(|i| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                let body = format!("msg{i:02} {}", "x".repeat(body_len));
                Message::new(&conv, role, body)
            })
            .collect();
        out.reverse();
        out
    }

    fn task(id: i64, title: &str) -> Task {
        let now = Utc::now();
        Task {
            id,
            title: title.into(),
            description: None,
            difficulty: 2,
            duration_minutes: 30,
            priority: Priority::Medium,
            due_date: None,
            status: TaskStatus::New,
            dependencies: vec![],
            project_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn input<'a>(
        summary: &'a str,
        messages: &'a [Message],
        tasks: &'a [Task],
        recall: &'a [String],
    ) -> AssemblyInput<'a> {
        AssemblyInput {
            summary,
            recent_messages: messages,
            tasks,
            recall,
        }
    }

    // ── Tests ──────────────────────────────────────────────────────────

    #[test]
    fn segments_are_instructions_then_context() {
        let assembler = ContextAssembler::with_default_budget();
        let ctx = assembler.build(&input("", &[], &[], &[]));
        assert_eq!(ctx.segments.len(), 2);
        assert_eq!(ctx.segments[0].content, EXTRACTION_INSTRUCTIONS);
        assert!(ctx.segments.iter().all(|s| s.role == Role::System));
        assert!(ctx.payload().starts_with("CONTEXT\n"));
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let assembler = ContextAssembler::with_default_budget();
        let msgs = messages_newest_first(2, 5);
        let tasks = vec![task(1, "Buy milk")];
        let ctx = assembler.build(&input("earlier stuff", &msgs, &tasks, &[]));
        let payload = ctx.payload();

        let summary = payload.find("[Rolling Summary]\nearlier stuff").unwrap();
        let snapshot = payload.find("[Task Snapshot]\n#1 [New/medium] Buy milk").unwrap();
        let recall = payload.find("[Semantic Recall]").unwrap();
        let recent = payload.find("[Recent Messages]\nUSER: msg00").unwrap();
        assert!(summary < snapshot && snapshot < recall && recall < recent);
    }

    #[test]
    fn empty_recall_still_renders_header() {
        let assembler = ContextAssembler::with_default_budget();
        let ctx = assembler.build(&input("", &[], &[], &[]));
        assert!(ctx.payload().contains("[Semantic Recall]\n\n"));
        let recall = &ctx.metadata.sections[2];
        assert_eq!(recall.name, "semantic_recall");
        assert_eq!(recall.items_total, 0);
    }

    #[test]
    fn recent_tail_is_chronological_and_trimmed() {
        let assembler = ContextAssembler::with_default_budget();
        let conv = ConversationId::from("c");
        let newest_first = vec![
            Message::new(&conv, Role::Assistant, "  {\"tasks\":[]}  "),
            Message::user(&conv, "\nBuy milk tomorrow\n"),
        ];
        let (tail, stats) = assembler.render_recent_tail(&newest_first);
        assert_eq!(tail, "USER: Buy milk tomorrow\nASSISTANT: {\"tasks\":[]}\n");
        assert_eq!(stats.items_included, 2);
    }

    #[test]
    fn recent_tail_respects_budget_and_keeps_newest() {
        let assembler = ContextAssembler::with_default_budget();
        // 30 messages of ~310 chars: far more than 6000 in total.
        let msgs = messages_newest_first(30, 300);
        let (tail, stats) = assembler.render_recent_tail(&msgs);

        assert!(CharCount.measure(&tail) <= 6_000);
        assert_eq!(CharCount.measure(&tail), stats.chars);
        assert!(stats.items_included < 30);
        assert!(tail.ends_with('\n'));
        // Every line is a whole message line.
        for line in tail.lines() {
            assert!(line.starts_with("USER: msg") || line.starts_with("ASSISTANT: msg"));
            assert_eq!(line.matches('x').count(), 300);
        }
        // The newest message survives, the oldest is dropped.
        assert!(tail.contains("msg29"));
        assert!(!tail.contains("msg00"));
        let last_line = tail.lines().last().unwrap();
        assert!(last_line.contains("msg29"));
    }

    #[test]
    fn recent_tail_stops_at_first_overflowing_line() {
        let budget = ContextBudget {
            recent: 40,
            ..ContextBudget::default()
        };
        let assembler = ContextAssembler::new(budget);
        let conv = ConversationId::from("c");
        let newest_first = vec![
            Message::user(&conv, "new"),
            Message::user(&conv, "x".repeat(50)),
            // Would fit on its own, but acceptance already stopped.
            Message::user(&conv, "old"),
        ];
        let (tail, stats) = assembler.render_recent_tail(&newest_first);
        assert_eq!(tail, "USER: new\n");
        assert_eq!(stats.items_included, 1);
    }

    #[test]
    fn task_snapshot_cut_at_line_boundary() {
        let budget = ContextBudget {
            tasks: 60,
            ..ContextBudget::default()
        };
        let assembler = ContextAssembler::new(budget);
        let tasks: Vec<Task> = (1..=10).map(|i| task(i, "Water plants")).collect();
        let (snapshot, stats) = assembler.render_task_snapshot(&tasks);

        assert!(CharCount.measure(&snapshot) <= 60);
        assert_eq!(stats.items_total, 10);
        for line in snapshot.lines() {
            assert!(line.ends_with("(due:-, 30min)"));
        }
        assert_eq!(snapshot.lines().count(), stats.items_included);
    }

    #[test]
    fn payload_never_exceeds_total_budget() {
        let assembler = ContextAssembler::with_default_budget();
        let summary = "s".repeat(6_000);
        let msgs = messages_newest_first(30, 190);
        let tasks: Vec<Task> = (1..=300).map(|i| task(i, "Review quarterly numbers")).collect();
        let ctx = assembler.build(&input(&summary, &msgs, &tasks, &[]));

        assert!(ctx.metadata.truncated);
        assert_eq!(CharCount.measure(ctx.payload()), 12_000);
        assert_eq!(ctx.metadata.payload_chars, 12_000);
        // Summary and snapshot survive; the tail is what got clipped.
        assert!(ctx.payload().contains(&summary));
        assert!(ctx.payload().contains("[Task Snapshot]\n#1 "));
        assert!(!ctx.payload().contains("msg29"));
    }

    #[test]
    fn small_payload_untouched() {
        let assembler = ContextAssembler::with_default_budget();
        let msgs = messages_newest_first(3, 10);
        let ctx = assembler.build(&input("short", &msgs, &[], &[]));
        assert!(!ctx.metadata.truncated);
        assert!(ctx.payload().ends_with("msg02 xxxxxxxxxx\n"));
    }

    #[test]
    fn recall_chunks_bounded_by_sub_budget() {
        let budget = ContextBudget {
            recall: 25,
            ..ContextBudget::default()
        };
        let assembler = ContextAssembler::new(budget);
        let recall = vec!["first chunk".to_string(), "second chunk".into(), "third".into()];
        let ctx = assembler.build(&input("", &[], &[], &recall));
        assert!(ctx.payload().contains("[Semantic Recall]\nfirst chunk\nsecond chunk\n\n"));
        assert_eq!(ctx.metadata.sections[2].items_included, 2);
    }

    #[test]
    fn deterministic_build() {
        let assembler = ContextAssembler::with_default_budget();
        let msgs = messages_newest_first(12, 40);
        let tasks = vec![task(1, "a"), task(2, "b")];
        let a = assembler.build(&input("sum", &msgs, &tasks, &[]));
        let b = assembler.build(&input("sum", &msgs, &tasks, &[]));
        assert_eq!(a.segments, b.segments);
    }

    #[tokio::test]
    async fn assemble_reads_store() {
        let store = InMemoryStore::new();
        let conv = store.create_conversation(None).await.unwrap();
        store
            .set_running_summary(&conv.id, "USER: earlier")
            .await
            .unwrap();
        store
            .append_message(&Message::user(&conv.id, "Buy milk tomorrow"))
            .await
            .unwrap();
        let mut batch = store.begin_task_batch().await.unwrap();
        batch.insert(&TaskDraft::titled("Call plumber")).await.unwrap();
        batch.commit().await.unwrap();

        let conv = store.get_conversation(&conv.id).await.unwrap().unwrap();
        let ctx = ContextAssembler::with_default_budget()
            .assemble(&store, &conv)
            .await
            .unwrap();
        let payload = ctx.payload();
        assert!(payload.contains("[Rolling Summary]\nUSER: earlier"));
        assert!(payload.contains("#1 [New/medium] Call plumber (due:-, 30min)"));
        assert!(payload.ends_with("USER: Buy milk tomorrow\n"));
    }
}
