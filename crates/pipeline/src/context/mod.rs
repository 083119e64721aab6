//! Bounded context assembly.
//!
//! Builds the prompt from five sources under a global character budget.
//!
//! # Sections (in payload order)
//!
//! | Section | Source | Trim Strategy |
//! |---------|--------|---------------|
//! | Instructions | Static extraction contract | Never trimmed (own segment) |
//! | Rolling summary | `Conversation::running_summary` | Only by final cut |
//! | Task snapshot | Most recently updated tasks | Last full line within sub-budget |
//! | Semantic recall | [`RecallSource`] (stub) | Last full line within sub-budget |
//! | Recent messages | Newest messages | Oldest lines dropped first |
//!
//! Sub-budgets are enforced per section, then the whole payload is cut to the
//! total budget, so the recent tail is what gets clipped first.

pub mod assembler;
pub mod budget;
pub mod recall;

pub use assembler::{
    AssembledContext, AssemblyInput, AssemblyMetadata, ContextAssembler, ContextBudget,
    EXTRACTION_INSTRUCTIONS, SectionStats,
};
pub use budget::{CharCount, TextMeasure};
pub use recall::{NoRecall, RecallSource};
