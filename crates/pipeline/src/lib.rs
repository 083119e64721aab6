//! The braindump ingestion pipeline.
//!
//! Each ingestion runs a fixed sequence of stages:
//!
//! 1. **Record input** as an audit note and a user message
//! 2. **Assemble context** (instructions + rolling summary + task snapshot +
//!    recall + recent tail) under a character budget
//! 3. **Invoke the model** through the configured gateway
//! 4. **Record output** verbatim, before any parsing
//! 5. **Reconcile tasks** extracted from the output against the store
//! 6. **Compress** the latest exchange into the rolling summary
//!
//! Only gateway and store failures abort an ingestion; malformed model
//! output degrades to an empty extraction.

pub mod context;
pub mod interpreter;
pub mod orchestrator;
pub mod reconciler;
pub mod summary;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{
    AssembledContext, AssemblyInput, AssemblyMetadata, CharCount, ContextAssembler, ContextBudget,
    NoRecall, RecallSource, SectionStats, TextMeasure,
};
pub use interpreter::Interpretation;
pub use orchestrator::{IngestResponse, Ingestor, Stage};
pub use reconciler::{ReconcileReport, TaskReconciler};
pub use summary::SummaryCompressor;
