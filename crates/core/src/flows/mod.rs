pub mod engine;
pub mod states;

pub use engine::{
    transition, ApplyOutcome, ConversationStateMachine, FlowTransitionError, PatchError,
};
pub use states::{ConversationEvent, ConversationStage, FlowAction, FlowContext, TransitionOutcome};
