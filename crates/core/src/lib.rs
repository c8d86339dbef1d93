pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod interpreter;
pub mod validation;

pub use domain::campaign::{
    Attachment, AttachmentMetadata, CampaignDraft, CampaignId, CampaignStatus, DraftField,
    DraftLocked, Objective,
};
pub use domain::conversation::{ConversationId, ConversationTurn, FieldPatch, PatchEntry, TurnRole};
pub use domain::submission::{AttachmentVerdict, ExternalOutcome, FailureCode, SubmissionOutcome};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{
    ApplyOutcome, ConversationEvent, ConversationStage, ConversationStateMachine, FlowAction,
    FlowTransitionError, PatchError, TransitionOutcome,
};
pub use interpreter::{ErrorInterpreter, Interpretation, Remedy};
pub use validation::{DraftValidator, ValidationEngine, Violation, ViolationKind};
