//! Conversation agent for building ad campaigns.
//!
//! The agent turns free-form user text into campaign field updates and drives
//! the draft through the core state machine:
//! 1. **Control commands** (`commands`) are intercepted before extraction
//! 2. **Field extraction** (`extractor`) maps text to a `FieldPatch`
//! 3. **Attachment resolution** (`attachment`) validates music references
//! 4. **Submission** goes through `services` with retry and abort (`retry`)
//!
//! The extractor is strictly a translator. It never decides whether a draft is
//! valid; validation and business rules stay deterministic in `adwright-core`.

pub mod attachment;
pub mod commands;
pub mod extractor;
pub mod llm;
pub mod orchestrator;
pub mod prompts;
pub mod retry;
pub mod services;

pub use orchestrator::{Orchestrator, ReplyKind, TurnReply};
