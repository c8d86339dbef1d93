use serde::{Deserialize, Serialize};

use crate::domain::campaign::DraftField;
use crate::validation::Violation;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationStage {
    Collecting(DraftField),
    ReviewingSummary,
    Submitting,
    Done,
    Cancelled,
}

impl ConversationStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }

    pub fn collecting_field(&self) -> Option<DraftField> {
        match self {
            Self::Collecting(field) => Some(*field),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationEvent {
    FieldsUpdated,
    AttachmentRequested,
    AttachmentResolved,
    AttachmentRejected,
    ReviewRequested,
    SubmitRequested,
    SubmissionSucceeded,
    SubmissionFailed,
    CancelRequested,
    RestartRequested,
}

/// Snapshot of the draft's validation state the transition function decides on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub violations: Vec<Violation>,
}

impl FlowContext {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    /// First field in priority order with a violation, or the summary once clean.
    pub fn next_stage(&self) -> ConversationStage {
        DraftField::PRIORITY
            .into_iter()
            .find(|field| self.violations.iter().any(|violation| violation.field == *field))
            .map(ConversationStage::Collecting)
            .unwrap_or(ConversationStage::ReviewingSummary)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    PromptForField(DraftField),
    PresentSummary,
    ReportViolations,
    RunAttachmentFlow,
    CallSubmissionService,
    ResetDraft,
    CloseConversation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ConversationStage,
    pub to: ConversationStage,
    pub event: ConversationEvent,
    pub actions: Vec<FlowAction>,
}
