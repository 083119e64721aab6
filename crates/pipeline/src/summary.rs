//! Rolling summary compressor.
//!
//! Appends the latest message window to the stored summary and keeps the
//! newest `max_chars` characters. The window overlaps with what earlier calls
//! already folded in, so the summary is a bounded digest rather than an
//! append log.

use std::sync::Arc;

use braindump_core::error::StoreError;
use braindump_core::message::{ConversationId, Message};
use braindump_core::store::ConversationStore;
use tracing::debug;

use crate::context::{CharCount, TextMeasure};

pub struct SummaryCompressor {
    max_chars: usize,
    window: usize,
    measure: Arc<dyn TextMeasure>,
}

impl Default for SummaryCompressor {
    fn default() -> Self {
        Self::new(6_000, 20)
    }
}

impl SummaryCompressor {
    pub fn new(max_chars: usize, window: usize) -> Self {
        Self {
            max_chars,
            window,
            measure: Arc::new(CharCount),
        }
    }

    pub fn from_config(config: &braindump_config::SummaryConfig) -> Self {
        Self::new(config.max_chars, config.window_messages)
    }

    pub fn with_measure(mut self, measure: Arc<dyn TextMeasure>) -> Self {
        self.measure = measure;
        self
    }

    /// `"<ROLE>: <content>"` per message, oldest first, newline-joined.
    pub fn render_window(newest_first: &[Message]) -> String {
        newest_first
            .iter()
            .rev()
            .map(|m| format!("{}: {}", m.role.label(), m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Fold a window into an existing summary.
    pub fn fold(&self, existing: &str, newest_first: &[Message]) -> String {
        let window = Self::render_window(newest_first);
        let combined = match (existing.is_empty(), window.is_empty()) {
            (true, _) => window,
            (false, true) => existing.to_string(),
            (false, false) => format!("{existing}\n{window}"),
        };
        self.measure
            .truncate_front(&combined, self.max_chars)
            .to_string()
    }

    /// Recompute and store the summary of a conversation.
    pub async fn update(
        &self,
        store: &dyn ConversationStore,
        id: &ConversationId,
    ) -> Result<String, StoreError> {
        let conversation = store
            .get_conversation(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("conversation {id}")))?;
        let recent = store.recent_messages(id, self.window).await?;

        let summary = self.fold(&conversation.running_summary, &recent);
        store.set_running_summary(id, &summary).await?;

        debug!(
            conversation_id = %id,
            window = recent.len(),
            summary_chars = self.measure.measure(&summary),
            "Rolling summary updated"
        );
        Ok(summary)
    }
}
