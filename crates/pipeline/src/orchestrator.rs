//! Ingestion orchestrator: drives one brain dump through every stage.

use std::sync::Arc;

use braindump_config::AppConfig;
use braindump_core::error::{Error, Result, StoreError};
use braindump_core::gateway::{GenerateOptions, ModelGateway, PromptSegment};
use braindump_core::message::{Conversation, ConversationId, IngestRequest, Message};
use braindump_core::note::Note;
use braindump_core::store::ConversationStore;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::context::{AssemblyMetadata, ContextAssembler, ContextBudget};
use crate::interpreter::Interpretation;
use crate::reconciler::{ReconcileReport, TaskReconciler};
use crate::summary::SummaryCompressor;

/// Extraction call overrides.
pub const EXTRACTION_TEMPERATURE: f32 = 0.1;
pub const EXTRACTION_MAX_TOKENS: u32 = 1400;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Receive,
    RecordInput,
    AssembleContext,
    InvokeModel,
    RecordOutput,
    ReconcileTasks,
    CompressSummary,
    Respond,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Receive => "RECEIVE",
            Stage::RecordInput => "RECORD_INPUT",
            Stage::AssembleContext => "ASSEMBLE_CONTEXT",
            Stage::InvokeModel => "INVOKE_MODEL",
            Stage::RecordOutput => "RECORD_OUTPUT",
            Stage::ReconcileTasks => "RECONCILE_TASKS",
            Stage::CompressSummary => "COMPRESS_SUMMARY",
            Stage::Respond => "RESPOND",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the ingestion entry point returns.
///
/// Serializes as `{"conversation_id": ..., "result": {...}}`; the
/// reconciliation report and context diagnostics are for in-process callers.
#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub conversation_id: ConversationId,
    pub result: Interpretation,
    #[serde(skip)]
    pub tasks: ReconcileReport,
    #[serde(skip)]
    pub context: AssemblyMetadata,
}

/// Runs the ingestion pipeline against a store and a model gateway.
///
/// Holds no per-request state; share it behind an `Arc`.
pub struct Ingestor {
    store: Arc<dyn ConversationStore>,
    gateway: Arc<dyn ModelGateway>,
    assembler: ContextAssembler,
    reconciler: TaskReconciler,
    compressor: SummaryCompressor,
    options: GenerateOptions,
}

impl Ingestor {
    /// Create an ingestor with default budgets and extraction options.
    pub fn new(store: Arc<dyn ConversationStore>, gateway: Arc<dyn ModelGateway>) -> Self {
        Self {
            store,
            gateway,
            assembler: ContextAssembler::with_default_budget(),
            reconciler: TaskReconciler::new(),
            compressor: SummaryCompressor::default(),
            options: GenerateOptions::default()
                .with_temperature(EXTRACTION_TEMPERATURE)
                .with_max_tokens(EXTRACTION_MAX_TOKENS),
        }
    }

    /// Create an ingestor whose budgets and options come from configuration.
    pub fn from_config(
        store: Arc<dyn ConversationStore>,
        gateway: Arc<dyn ModelGateway>,
        config: &AppConfig,
    ) -> Self {
        Self::new(store, gateway)
            .with_assembler(ContextAssembler::new(ContextBudget::from(&config.context)))
            .with_compressor(SummaryCompressor::from_config(&config.summary))
            .with_options(
                GenerateOptions::default()
                    .with_model(&config.provider.default_model)
                    .with_temperature(config.extraction.temperature)
                    .with_max_tokens(config.extraction.max_tokens),
            )
    }

    pub fn with_assembler(mut self, assembler: ContextAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn with_compressor(mut self, compressor: SummaryCompressor) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<dyn ModelGateway> {
        &self.gateway
    }

    pub fn assembler(&self) -> &ContextAssembler {
        &self.assembler
    }

    /// Ingest one brain dump.
    ///
    /// Input is durable before the model is called, and the raw model output
    /// is durable before it is parsed. Gateway and store failures propagate;
    /// malformed model output does not.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestResponse> {
        stage(Stage::Receive, None);
        request.validate()?;
        let conversation = self.resolve_conversation(request.conversation_id.as_ref()).await?;
        let id = conversation.id.clone();

        stage(Stage::RecordInput, Some(&id));
        self.store
            .append_note(&Note::brain_dump(&id, &request.text))
            .await?;
        self.store
            .append_message(&Message::user(&id, &request.text))
            .await?;

        stage(Stage::AssembleContext, Some(&id));
        let context = self.assembler.assemble(self.store.as_ref(), &conversation).await?;
        let mut segments = context.segments;
        segments.push(PromptSegment::user(&request.text));

        stage(Stage::InvokeModel, Some(&id));
        let generation = self
            .gateway
            .generate(&segments, &self.options)
            .await
            .inspect_err(|e| {
                warn!(conversation_id = %id, gateway = self.gateway.name(), "Model call failed: {e}");
            })?;

        stage(Stage::RecordOutput, Some(&id));
        let reply = Message::assistant(&id, &generation.content)
            .with_metadata("gateway", Value::String(self.gateway.name().to_string()))
            .with_metadata("raw", generation.raw);
        self.store.append_message(&reply).await?;

        stage(Stage::ReconcileTasks, Some(&id));
        let result = Interpretation::parse(&generation.content);
        let tasks = self
            .reconciler
            .reconcile(self.store.as_ref(), result.task_records())
            .await?;

        stage(Stage::CompressSummary, Some(&id));
        self.compressor.update(self.store.as_ref(), &id).await?;

        stage(Stage::Respond, Some(&id));
        info!(
            conversation_id = %id,
            created = tasks.created.len(),
            updated = tasks.updated.len(),
            fallback = result.is_fallback(),
            "Brain dump ingested"
        );

        Ok(IngestResponse {
            conversation_id: id,
            result,
            tasks,
            context: context.metadata,
        })
    }

    /// Reuse an existing conversation or start a new one.
    async fn resolve_conversation(&self, id: Option<&ConversationId>) -> Result<Conversation> {
        match id {
            Some(id) => self
                .store
                .get_conversation(id)
                .await?
                .ok_or_else(|| Error::ConversationNotFound(id.to_string())),
            None => {
                let conversation = self.store.create_conversation(None).await?;
                info!(conversation_id = %conversation.id, "Conversation started");
                Ok(conversation)
            }
        }
    }

    /// Start a conversation with a topic ahead of its first ingestion.
    pub async fn start_conversation(
        &self,
        topic: Option<String>,
    ) -> std::result::Result<Conversation, StoreError> {
        let conversation = self.store.create_conversation(topic).await?;
        info!(conversation_id = %conversation.id, topic = ?conversation.topic, "Conversation started");
        Ok(conversation)
    }
}

fn stage(stage: Stage, conversation_id: Option<&ConversationId>) {
    match conversation_id {
        Some(id) => debug!(stage = %stage, conversation_id = %id, "Ingestion stage"),
        None => debug!(stage = %stage, "Ingestion stage"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingGateway, FlakyStore, ScriptedGateway};
    use braindump_core::error::GatewayError;
    use braindump_core::message::Role;
    use braindump_core::note::NoteKind;
    use braindump_core::task::{Priority, TaskStatus};
    use braindump_store::InMemoryStore;
    use chrono::NaiveDate;
    use serde_json::json;

    const BUY_MILK: &str = r#"{"tasks":[{"title":"Buy milk","priority":"low","suggested_due_date":"2024-01-02"}],"references":[]}"#;

    fn ingestor(
        store: Arc<dyn ConversationStore>,
        gateway: Arc<dyn ModelGateway>,
    ) -> Ingestor {
        Ingestor::new(store, gateway)
    }

    #[tokio::test]
    async fn buy_milk_end_to_end() {
        let store: Arc<dyn ConversationStore> = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(ScriptedGateway::always(BUY_MILK));
        let ingestor = ingestor(store.clone(), gateway.clone());

        let response = ingestor
            .ingest(IngestRequest::new(None, "Buy milk tomorrow"))
            .await
            .unwrap();
        assert!(!response.result.is_fallback());
        assert_eq!(response.tasks.created.len(), 1);

        let tasks = store.recent_tasks(10).await.unwrap();
        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];
        assert_eq!(task.title, "Buy milk");
        assert_eq!(task.priority, Priority::Low);
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(task.status, TaskStatus::New);
        assert_eq!(task.duration_minutes, 30);
        assert_eq!(task.difficulty, 2);

        let id = response.conversation_id.clone();
        let messages = store.recent_messages(&id, 10).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::Assistant);
        assert_eq!(messages[0].content, BUY_MILK);
        assert_eq!(messages[0].metadata["gateway"], "scripted");
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "Buy milk tomorrow");

        let conversation = store.get_conversation(&id).await.unwrap().unwrap();
        assert_eq!(
            conversation.running_summary,
            format!("USER: Buy milk tomorrow\nASSISTANT: {BUY_MILK}")
        );

        let notes = store.notes(&id).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NoteKind::BrainDump);

        // Same input again: the task is updated, not duplicated.
        let again = ingestor
            .ingest(IngestRequest::new(Some(id.clone()), "Buy milk tomorrow"))
            .await
            .unwrap();
        assert_eq!(again.conversation_id, id);
        assert!(again.tasks.created.is_empty());
        assert_eq!(again.tasks.updated, vec![task.id]);
        assert_eq!(store.recent_tasks(10).await.unwrap().len(), 1);
        assert_eq!(store.recent_messages(&id, 10).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn prompt_layout_and_extraction_options() {
        let store: Arc<dyn ConversationStore> = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(ScriptedGateway::always(BUY_MILK));
        ingestor(store, gateway.clone())
            .ingest(IngestRequest::new(None, "Buy milk tomorrow"))
            .await
            .unwrap();

        let calls = gateway.calls();
        assert_eq!(calls.len(), 1);
        let segments = &calls[0].segments;
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].role, Role::System);
        assert_eq!(segments[1].role, Role::System);
        assert!(segments[1].content.starts_with("CONTEXT\n"));
        // Input is recorded before assembly, so it is already in the tail.
        assert!(segments[1].content.ends_with("USER: Buy milk tomorrow\n"));
        assert_eq!(segments[2], PromptSegment::user("Buy milk tomorrow"));

        let options = &calls[0].options;
        assert_eq!(options.temperature, Some(EXTRACTION_TEMPERATURE));
        assert_eq!(options.max_tokens, Some(EXTRACTION_MAX_TOKENS));
    }

    #[tokio::test]
    async fn second_ingestion_sees_summary_and_tasks() {
        let store: Arc<dyn ConversationStore> = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(ScriptedGateway::always(BUY_MILK));
        let ingestor = ingestor(store, gateway.clone());

        let first = ingestor
            .ingest(IngestRequest::new(None, "Buy milk tomorrow"))
            .await
            .unwrap();
        ingestor
            .ingest(IngestRequest::new(Some(first.conversation_id), "also eggs"))
            .await
            .unwrap();

        let context = &gateway.calls()[1].segments[1].content;
        assert!(context.contains("[Rolling Summary]\nUSER: Buy milk tomorrow\n"));
        assert!(context.contains("#1 [New/low] Buy milk (due:2024-01-02, 30min)"));
        assert!(context.ends_with("USER: also eggs\n"));
    }

    #[tokio::test]
    async fn malformed_output_still_recorded_and_summarized() {
        let store: Arc<dyn ConversationStore> = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(ScriptedGateway::always("I could not find any tasks, sorry!"));
        let response = ingestor(store.clone(), gateway)
            .ingest(IngestRequest::new(None, "hmm"))
            .await
            .unwrap();

        assert!(response.result.is_fallback());
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "conversation_id": response.conversation_id.as_str(),
                "result": {"tasks": [], "references": []}
            })
        );

        let messages = store.recent_messages(&response.conversation_id, 10).await.unwrap();
        assert_eq!(messages[0].content, "I could not find any tasks, sorry!");
        let conversation = store
            .get_conversation(&response.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert!(conversation.running_summary.ends_with("ASSISTANT: I could not find any tasks, sorry!"));
        assert!(store.recent_tasks(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn gateway_failure_propagates_after_input_recorded() {
        let store = Arc::new(InMemoryStore::new());
        let conversation = store.create_conversation(None).await.unwrap();
        let gateway = Arc::new(FailingGateway(GatewayError::Timeout("120s".into())));

        let err = ingestor(store.clone(), gateway)
            .ingest(IngestRequest::new(Some(conversation.id.clone()), "Call dentist"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Gateway(GatewayError::Timeout(_))));

        let messages = store.recent_messages(&conversation.id, 10).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(store.notes(&conversation.id).await.unwrap().len(), 1);

        let conversation = store.get_conversation(&conversation.id).await.unwrap().unwrap();
        assert!(conversation.running_summary.is_empty());
    }

    #[tokio::test]
    async fn reconcile_failure_keeps_messages_but_no_tasks() {
        let store = Arc::new(FlakyStore::failing_on_insert(2));
        let gateway = Arc::new(ScriptedGateway::always(
            r#"{"tasks":[{"title":"One"},{"title":"Two"}]}"#,
        ));
        let conversation = store.create_conversation(None).await.unwrap();

        let err = ingestor(store.clone(), gateway)
            .ingest(IngestRequest::new(Some(conversation.id.clone()), "one and two"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Storage(_))));

        assert_eq!(store.recent_messages(&conversation.id, 10).await.unwrap().len(), 2);
        assert!(store.recent_tasks(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn validation_rejects_before_any_write() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(ScriptedGateway::always(BUY_MILK));
        let ingestor = ingestor(store.clone(), gateway.clone());

        let err = ingestor
            .ingest(IngestRequest::new(None, "   "))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = ingestor
            .ingest(IngestRequest::new(Some(ConversationId::from("nope")), "Buy milk"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConversationNotFound(_)));

        assert!(gateway.calls().is_empty());
        assert!(store.recent_tasks(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn from_config_applies_model_and_budgets() {
        let mut config = AppConfig::default();
        config.provider.default_model = "test-model".into();
        config.extraction.max_tokens = 900;

        let store: Arc<dyn ConversationStore> = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(ScriptedGateway::always("{}"));
        Ingestor::from_config(store, gateway.clone(), &config)
            .ingest(IngestRequest::new(None, "plan the week"))
            .await
            .unwrap();

        let options = &gateway.calls()[0].options;
        assert_eq!(options.model.as_deref(), Some("test-model"));
        assert_eq!(options.max_tokens, Some(900));
    }

    #[tokio::test]
    async fn topic_set_when_conversation_started_explicitly() {
        let store: Arc<dyn ConversationStore> = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(ScriptedGateway::always("{}"));
        let ingestor = ingestor(store.clone(), gateway);

        let conversation = ingestor
            .start_conversation(Some("groceries".into()))
            .await
            .unwrap();
        ingestor
            .ingest(IngestRequest::new(Some(conversation.id.clone()), "Buy milk"))
            .await
            .unwrap();

        let stored = store.get_conversation(&conversation.id).await.unwrap().unwrap();
        assert_eq!(stored.topic.as_deref(), Some("groceries"));
    }

    #[test]
    fn stages_serialize_in_upper_snake_case() {
        assert_eq!(
            serde_json::to_value(Stage::AssembleContext).unwrap(),
            json!("ASSEMBLE_CONTEXT")
        );
        assert_eq!(Stage::CompressSummary.to_string(), "COMPRESS_SUMMARY");
    }
}
