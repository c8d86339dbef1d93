use thiserror::Error;

use crate::domain::campaign::{
    Attachment, AttachmentMetadata, CampaignDraft, CampaignId, DraftField, DraftLocked, Objective,
};
use crate::domain::conversation::FieldPatch;
use crate::flows::states::{
    ConversationEvent, ConversationStage, FlowAction, FlowContext, TransitionOutcome,
};
use crate::validation::{DraftValidator, ValidationEngine, Violation, ViolationKind};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("submission blocked by {} outstanding violation(s)", violations.len())]
    SubmitBlocked { violations: Vec<Violation> },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: ConversationStage, event: ConversationEvent },
    #[error(transparent)]
    DraftLocked(#[from] DraftLocked),
    #[error("conversions campaigns cannot proceed without an attachment")]
    AttachmentRequired,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("field `{field}` was given two different values: `{first}` and `{second}`")]
    Conflicting { field: DraftField, first: String, second: String },
    #[error("`{value}` is not a valid value for `{field}`")]
    InvalidValue { field: DraftField, value: String },
    #[error("attachment values must go through attachment validation")]
    AttachmentRequiresValidation,
    #[error(transparent)]
    DraftLocked(#[from] DraftLocked),
    #[error(transparent)]
    Flow(#[from] FlowTransitionError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Fields whose stored value actually changed, in priority order.
    pub changed: Vec<DraftField>,
    pub transition: TransitionOutcome,
}

/// Pure transition table for the campaign conversation.
pub fn transition(
    current: &ConversationStage,
    event: &ConversationEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use ConversationEvent::{
        AttachmentRejected, AttachmentRequested, AttachmentResolved, CancelRequested, FieldsUpdated,
        RestartRequested, ReviewRequested, SubmissionFailed, SubmissionSucceeded,
        SubmitRequested,
    };
    use ConversationStage::{Cancelled, Collecting, Done, ReviewingSummary, Submitting};

    let invalid = || FlowTransitionError::InvalidTransition { state: *current, event: event.clone() };

    let (to, actions) = match (current, event) {
        (_, RestartRequested) => (
            Collecting(DraftField::Name),
            vec![FlowAction::ResetDraft, FlowAction::PromptForField(DraftField::Name)],
        ),
        (Done | Cancelled, ReviewRequested) => (*current, vec![FlowAction::PresentSummary]),
        (Done | Cancelled, _) => return Err(invalid()),
        (Collecting(_) | ReviewingSummary, FieldsUpdated) => settle(context),
        (Collecting(_) | ReviewingSummary, AttachmentRequested) => {
            (Collecting(DraftField::Attachment), vec![FlowAction::RunAttachmentFlow])
        }
        (Collecting(DraftField::Attachment), AttachmentResolved) => settle(context),
        // Music stays the question only while nothing earlier is outstanding.
        (Collecting(DraftField::Attachment), AttachmentRejected) => match context.next_stage() {
            Collecting(field) if field != DraftField::Attachment => {
                (Collecting(field), vec![FlowAction::PromptForField(field)])
            }
            _ => (Collecting(DraftField::Attachment), vec![FlowAction::RunAttachmentFlow]),
        },
        (Collecting(_) | ReviewingSummary, ReviewRequested) => {
            let to = context.next_stage();
            let mut actions = vec![FlowAction::PresentSummary];
            if let Collecting(field) = to {
                actions.push(FlowAction::ReportViolations);
                actions.push(FlowAction::PromptForField(field));
            }
            (to, actions)
        }
        (Collecting(_) | ReviewingSummary, SubmitRequested) => {
            if !context.violations.is_empty() {
                return Err(FlowTransitionError::SubmitBlocked {
                    violations: context.violations.clone(),
                });
            }
            match current {
                ReviewingSummary => (Submitting, vec![FlowAction::CallSubmissionService]),
                _ => (ReviewingSummary, vec![FlowAction::PresentSummary]),
            }
        }
        (Submitting, SubmissionSucceeded) => (Done, vec![FlowAction::CloseConversation]),
        (Submitting, SubmissionFailed) => (ReviewingSummary, vec![FlowAction::PresentSummary]),
        (_, CancelRequested) => (Cancelled, vec![FlowAction::CloseConversation]),
        _ => return Err(invalid()),
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}

fn settle(context: &FlowContext) -> (ConversationStage, Vec<FlowAction>) {
    match context.next_stage() {
        ConversationStage::Collecting(field) => {
            let mut actions = Vec::new();
            let malformed = context.violations.iter().any(|violation| {
                violation.field == field && violation.kind != ViolationKind::MissingRequired
            });
            if malformed {
                actions.push(FlowAction::ReportViolations);
            }
            actions.push(FlowAction::PromptForField(field));
            (ConversationStage::Collecting(field), actions)
        }
        stage => (stage, vec![FlowAction::PresentSummary]),
    }
}

/// Owns one conversation's draft and drives it through [`transition`].
///
/// Every mutation re-runs the validator, so the stage always reflects the
/// current draft regardless of the order in which fields arrived.
pub struct ConversationStateMachine<V = ValidationEngine> {
    validator: V,
    draft: CampaignDraft,
    stage: ConversationStage,
    violations: Vec<Violation>,
}

impl ConversationStateMachine<ValidationEngine> {
    pub fn new() -> Self {
        Self::with_validator(ValidationEngine)
    }
}

impl Default for ConversationStateMachine<ValidationEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ConversationStateMachine<V>
where
    V: DraftValidator,
{
    pub fn with_validator(validator: V) -> Self {
        let draft = CampaignDraft::default();
        let violations = validator.validate(&draft);
        let stage = FlowContext::new(violations.clone()).next_stage();
        Self { validator, draft, stage, violations }
    }

    pub fn draft(&self) -> &CampaignDraft {
        &self.draft
    }

    pub fn stage(&self) -> ConversationStage {
        self.stage
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn is_finished(&self) -> bool {
        self.stage.is_terminal()
    }

    /// The stage the conversation should prompt for given the current draft.
    pub fn next_prompt(&self) -> ConversationStage {
        self.context().next_stage()
    }

    /// Merges a patch into the draft atomically. Attachment entries are
    /// refused; they must be resolved through the attachment flow.
    pub fn apply(&mut self, patch: &FieldPatch) -> Result<ApplyOutcome, PatchError> {
        self.draft.ensure_mutable()?;

        let mut candidate = self.draft.clone();
        let mut seen: Vec<(DraftField, &str)> = Vec::new();
        for entry in patch.entries() {
            if entry.field == DraftField::Attachment {
                return Err(PatchError::AttachmentRequiresValidation);
            }
            if let Some((_, first)) = seen.iter().find(|(field, _)| *field == entry.field) {
                if *first != entry.value {
                    return Err(PatchError::Conflicting {
                        field: entry.field,
                        first: first.to_string(),
                        second: entry.value.clone(),
                    });
                }
                continue;
            }
            seen.push((entry.field, entry.value.as_str()));
            write_field(&mut candidate, entry.field, &entry.value)?;
        }

        let changed = DraftField::PRIORITY
            .into_iter()
            .filter(|field| candidate.text_value(*field) != self.draft.text_value(*field))
            .collect::<Vec<_>>();
        let violations = self.validator.validate(&candidate);
        let transition = transition(
            &self.stage,
            &ConversationEvent::FieldsUpdated,
            &FlowContext::new(violations.clone()),
        )?;

        self.draft = candidate;
        self.violations = violations;
        self.stage = transition.to;
        tracing::debug!(
            event_name = "flow.patch_applied",
            changed = ?changed,
            stage = ?self.stage,
            violations = self.violations.len(),
            "patch applied to draft"
        );
        Ok(ApplyOutcome { changed, transition })
    }

    pub fn enter_attachment_stage(&mut self) -> Result<TransitionOutcome, FlowTransitionError> {
        self.draft.ensure_mutable()?;
        self.fire(ConversationEvent::AttachmentRequested)
    }

    /// Stores an externally approved attachment and leaves the attachment stage.
    pub fn resolve_attachment(
        &mut self,
        attachment: Attachment,
        metadata: Option<AttachmentMetadata>,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.draft.ensure_mutable()?;
        let mut candidate = self.draft.clone();
        candidate.attachment = attachment;
        candidate.attachment_metadata = metadata;
        self.commit_attachment(candidate)
    }

    /// Leaves the attachment stage with no attachment. Refused under Conversions.
    pub fn decline_attachment(&mut self) -> Result<TransitionOutcome, FlowTransitionError> {
        self.draft.ensure_mutable()?;
        if self.draft.attachment_required() {
            return Err(FlowTransitionError::AttachmentRequired);
        }
        let mut candidate = self.draft.clone();
        candidate.attachment = Attachment::None;
        candidate.attachment_metadata = None;
        self.commit_attachment(candidate)
    }

    /// Leaves the attachment stage after a refused choice, keeping the draft as is.
    pub fn reject_attachment(&mut self) -> Result<TransitionOutcome, FlowTransitionError> {
        self.draft.ensure_mutable()?;
        self.fire(ConversationEvent::AttachmentRejected)
    }

    pub fn request_review(&mut self) -> Result<TransitionOutcome, FlowTransitionError> {
        self.fire(ConversationEvent::ReviewRequested)
    }

    /// Moves to `Submitting` from the summary, or to the summary for
    /// confirmation from any collecting stage. Blocked while violations remain.
    pub fn begin_submission(&mut self) -> Result<TransitionOutcome, FlowTransitionError> {
        self.draft.ensure_mutable()?;
        self.violations = self.validator.validate(&self.draft);
        self.fire(ConversationEvent::SubmitRequested)
    }

    pub fn complete_submission(
        &mut self,
        campaign_id: CampaignId,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        let outcome = transition(
            &self.stage,
            &ConversationEvent::SubmissionSucceeded,
            &self.context(),
        )?;
        self.draft.mark_submitted(campaign_id)?;
        self.stage = outcome.to;
        self.log_transition(&outcome);
        Ok(outcome)
    }

    pub fn fail_submission(&mut self) -> Result<TransitionOutcome, FlowTransitionError> {
        self.fire(ConversationEvent::SubmissionFailed)
    }

    pub fn cancel(&mut self) -> Result<TransitionOutcome, FlowTransitionError> {
        self.draft.ensure_mutable()?;
        let outcome =
            transition(&self.stage, &ConversationEvent::CancelRequested, &self.context())?;
        self.draft.mark_cancelled()?;
        self.stage = outcome.to;
        self.log_transition(&outcome);
        Ok(outcome)
    }

    /// Discards the draft, including a submitted or cancelled one, and starts over.
    pub fn restart(&mut self) -> TransitionOutcome {
        let from = self.stage;
        self.draft = CampaignDraft::default();
        self.violations = self.validator.validate(&self.draft);
        let to = self.context().next_stage();
        self.stage = to;
        let outcome = TransitionOutcome {
            from,
            to,
            event: ConversationEvent::RestartRequested,
            actions: vec![FlowAction::ResetDraft, FlowAction::PromptForField(DraftField::Name)],
        };
        self.log_transition(&outcome);
        outcome
    }

    fn commit_attachment(
        &mut self,
        candidate: CampaignDraft,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        let violations = self.validator.validate(&candidate);
        let outcome = transition(
            &self.stage,
            &ConversationEvent::AttachmentResolved,
            &FlowContext::new(violations.clone()),
        )?;
        self.draft = candidate;
        self.violations = violations;
        self.stage = outcome.to;
        self.log_transition(&outcome);
        Ok(outcome)
    }

    fn fire(&mut self, event: ConversationEvent) -> Result<TransitionOutcome, FlowTransitionError> {
        let outcome = transition(&self.stage, &event, &self.context())?;
        self.stage = outcome.to;
        self.log_transition(&outcome);
        Ok(outcome)
    }

    fn context(&self) -> FlowContext {
        FlowContext::new(self.violations.clone())
    }

    fn log_transition(&self, outcome: &TransitionOutcome) {
        tracing::debug!(
            event_name = "flow.transition_applied",
            from = ?outcome.from,
            to = ?outcome.to,
            event = ?outcome.event,
            "conversation stage changed"
        );
    }
}

fn write_field(draft: &mut CampaignDraft, field: DraftField, value: &str) -> Result<(), PatchError> {
    match field {
        DraftField::Name => draft.name = Some(value.to_string()),
        DraftField::AdText => draft.ad_text = Some(value.to_string()),
        DraftField::CallToAction => draft.call_to_action = Some(value.to_string()),
        DraftField::Objective => {
            let objective = Objective::parse(value).ok_or_else(|| PatchError::InvalidValue {
                field,
                value: value.to_string(),
            })?;
            draft.objective = Some(objective);
        }
        DraftField::Attachment => return Err(PatchError::AttachmentRequiresValidation),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{transition, ConversationStateMachine, FlowTransitionError, PatchError};
    use crate::domain::campaign::{
        Attachment, AttachmentMetadata, CampaignId, CampaignStatus, DraftField, DraftLocked,
        Objective,
    };
    use crate::domain::conversation::FieldPatch;
    use crate::flows::states::{ConversationEvent, ConversationStage, FlowAction, FlowContext};
    use crate::validation::ViolationKind;

    fn filled(objective: &str) -> ConversationStateMachine {
        let mut machine = ConversationStateMachine::new();
        machine
            .apply(
                &FieldPatch::new()
                    .with(DraftField::Name, "Summer Sale 2024")
                    .with(DraftField::Objective, objective)
                    .with(DraftField::AdText, "Get 50% off! Limited time")
                    .with(DraftField::CallToAction, "Shop Now"),
            )
            .expect("apply full patch");
        machine
    }

    fn metadata() -> AttachmentMetadata {
        AttachmentMetadata {
            title: "Trending Beat 2024".to_string(),
            artist: "DJ Fresh".to_string(),
            duration_seconds: 30,
        }
    }

    #[test]
    fn fresh_conversation_prompts_for_name() {
        let machine = ConversationStateMachine::new();
        assert_eq!(machine.stage(), ConversationStage::Collecting(DraftField::Name));
        assert_eq!(machine.next_prompt(), ConversationStage::Collecting(DraftField::Name));
    }

    #[test]
    fn fields_are_prompted_in_priority_order() {
        let mut machine = ConversationStateMachine::new();
        machine.apply(&FieldPatch::new().with(DraftField::Name, "Summer Sale 2024")).expect("name");
        assert_eq!(machine.stage(), ConversationStage::Collecting(DraftField::Objective));

        machine
            .apply(&FieldPatch::new().with(DraftField::CallToAction, "Shop Now"))
            .expect("cta out of order");
        assert_eq!(machine.stage(), ConversationStage::Collecting(DraftField::Objective));
    }

    #[test]
    fn traffic_draft_skips_attachment_stage() {
        let machine = filled("traffic");
        assert_eq!(machine.stage(), ConversationStage::ReviewingSummary);
        assert!(machine.violations().is_empty());
    }

    #[test]
    fn conversions_draft_requires_attachment_stage() {
        let machine = filled("Conversions");
        assert_eq!(machine.stage(), ConversationStage::Collecting(DraftField::Attachment));
        assert_eq!(machine.violations()[0].kind, ViolationKind::BusinessRuleViolation);
    }

    #[test]
    fn switching_objective_after_review_reopens_attachment_stage() {
        let mut machine = filled("traffic");
        machine
            .apply(&FieldPatch::new().with(DraftField::Objective, "conversions"))
            .expect("switch objective");
        assert_eq!(machine.stage(), ConversationStage::Collecting(DraftField::Attachment));
    }

    #[test]
    fn conflicting_patch_is_rejected_atomically() {
        let mut machine = ConversationStateMachine::new();
        let error = machine
            .apply(
                &FieldPatch::new()
                    .with(DraftField::Name, "Summer Sale 2024")
                    .with(DraftField::AdText, "First")
                    .with(DraftField::AdText, "Second"),
            )
            .expect_err("conflict");

        assert!(matches!(error, PatchError::Conflicting { field: DraftField::AdText, .. }));
        assert_eq!(machine.draft().name, None);
    }

    #[test]
    fn repeated_identical_value_is_not_a_conflict() {
        let mut machine = ConversationStateMachine::new();
        let outcome = machine
            .apply(
                &FieldPatch::new()
                    .with(DraftField::Name, "Summer Sale 2024")
                    .with(DraftField::Name, "Summer Sale 2024"),
            )
            .expect("duplicates agree");
        assert_eq!(outcome.changed, vec![DraftField::Name]);

        let again = machine
            .apply(&FieldPatch::new().with(DraftField::Name, "Summer Sale 2024"))
            .expect("idempotent");
        assert!(again.changed.is_empty());
    }

    #[test]
    fn unparseable_objective_is_invalid_value() {
        let mut machine = ConversationStateMachine::new();
        let error = machine
            .apply(&FieldPatch::new().with(DraftField::Objective, "awareness"))
            .expect_err("bad objective");
        assert_eq!(
            error,
            PatchError::InvalidValue {
                field: DraftField::Objective,
                value: "awareness".to_string()
            }
        );
    }

    #[test]
    fn attachment_entries_are_not_merged_by_apply() {
        let mut machine = ConversationStateMachine::new();
        let error = machine
            .apply(&FieldPatch::new().with(DraftField::Attachment, "MUS_12345"))
            .expect_err("attachment needs validation");
        assert_eq!(error, PatchError::AttachmentRequiresValidation);
        assert!(machine.draft().attachment.is_none());
    }

    #[test]
    fn resolved_attachment_unlocks_summary() {
        let mut machine = filled("conversions");
        machine.enter_attachment_stage().expect("enter");
        let outcome = machine
            .resolve_attachment(
                Attachment::ExistingRef { id: "MUS_12345".to_string() },
                Some(metadata()),
            )
            .expect("resolve");

        assert_eq!(outcome.to, ConversationStage::ReviewingSummary);
        assert!(outcome.actions.contains(&FlowAction::PresentSummary));
        assert_eq!(machine.draft().attachment_metadata, Some(metadata()));
    }

    #[test]
    fn declining_attachment_under_conversions_is_refused() {
        let mut machine = filled("conversions");
        machine.enter_attachment_stage().expect("enter");
        assert_eq!(machine.decline_attachment(), Err(FlowTransitionError::AttachmentRequired));
        assert_eq!(machine.stage(), ConversationStage::Collecting(DraftField::Attachment));
    }

    #[test]
    fn declining_attachment_under_traffic_returns_to_summary() {
        let mut machine = filled("traffic");
        machine.enter_attachment_stage().expect("enter");
        let outcome = machine.decline_attachment().expect("decline");
        assert_eq!(outcome.to, ConversationStage::ReviewingSummary);
    }

    #[test]
    fn rejected_attachment_returns_to_first_missing_field() {
        let mut machine = ConversationStateMachine::new();
        machine.enter_attachment_stage().expect("enter");
        let outcome = machine.reject_attachment().expect("reject");

        assert_eq!(outcome.to, ConversationStage::Collecting(DraftField::Name));
        assert_eq!(outcome.actions, vec![FlowAction::PromptForField(DraftField::Name)]);
        assert_eq!(machine.stage(), machine.next_prompt());
    }

    #[test]
    fn rejected_attachment_keeps_asking_when_music_is_next() {
        for objective in ["conversions", "traffic"] {
            let mut machine = filled(objective);
            machine.enter_attachment_stage().expect("enter");
            let outcome = machine.reject_attachment().expect("reject");
            assert_eq!(
                outcome.to,
                ConversationStage::Collecting(DraftField::Attachment),
                "{objective}"
            );
            assert!(machine.draft().attachment.is_none());
        }
    }

    #[test]
    fn submit_with_violations_is_blocked_locally() {
        let mut machine = filled("conversions");
        let error = machine.begin_submission().expect_err("blocked");
        match error {
            FlowTransitionError::SubmitBlocked { violations } => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].field, DraftField::Attachment);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(machine.stage(), ConversationStage::Collecting(DraftField::Attachment));
    }

    #[test]
    fn submission_success_locks_the_draft() {
        let mut machine = filled("traffic");
        let outcome = machine.begin_submission().expect("begin");
        assert_eq!(outcome.to, ConversationStage::Submitting);
        assert_eq!(outcome.actions, vec![FlowAction::CallSubmissionService]);

        machine.complete_submission(CampaignId("CAMP_123456".to_string())).expect("complete");
        assert_eq!(machine.stage(), ConversationStage::Done);
        assert_eq!(machine.draft().status, CampaignStatus::Submitted);

        let error = machine
            .apply(&FieldPatch::new().with(DraftField::Name, "Another"))
            .expect_err("locked");
        assert_eq!(error, PatchError::DraftLocked(DraftLocked { status: CampaignStatus::Submitted }));
        assert!(matches!(machine.cancel(), Err(FlowTransitionError::DraftLocked(_))));
    }

    #[test]
    fn submission_failure_returns_to_summary_with_draft_intact() {
        let mut machine = filled("traffic");
        machine.begin_submission().expect("begin");
        let outcome = machine.fail_submission().expect("fail");
        assert_eq!(outcome.to, ConversationStage::ReviewingSummary);
        assert_eq!(machine.draft().name.as_deref(), Some("Summer Sale 2024"));
        assert_eq!(machine.draft().status, CampaignStatus::InProgress);
    }

    #[test]
    fn submit_from_collecting_asks_for_confirmation_first() {
        let mut machine = filled("conversions");
        machine.enter_attachment_stage().expect("enter");
        machine
            .resolve_attachment(Attachment::ExistingRef { id: "MUS_12345".to_string() }, None)
            .expect("resolve");
        machine
            .apply(&FieldPatch::new().with(DraftField::CallToAction, "Buy Now"))
            .expect("edit");
        assert_eq!(machine.stage(), ConversationStage::ReviewingSummary);

        machine.enter_attachment_stage().expect("re-enter");
        let outcome = machine.begin_submission().expect("confirm");
        assert_eq!(outcome.to, ConversationStage::ReviewingSummary);
    }

    #[test]
    fn cancel_then_restart_starts_a_fresh_draft() {
        let mut machine = filled("traffic");
        machine.cancel().expect("cancel");
        assert!(machine.is_finished());
        assert_eq!(machine.draft().status, CampaignStatus::Cancelled);

        let outcome = machine.restart();
        assert_eq!(outcome.to, ConversationStage::Collecting(DraftField::Name));
        assert_eq!(machine.draft().objective, None::<Objective>);
        assert_eq!(machine.draft().status, CampaignStatus::InProgress);
    }

    #[test]
    fn review_with_outstanding_violations_keeps_collecting() {
        let mut machine = ConversationStateMachine::new();
        machine.apply(&FieldPatch::new().with(DraftField::Name, "Summer Sale 2024")).expect("name");
        let outcome = machine.request_review().expect("review");
        assert_eq!(outcome.to, ConversationStage::Collecting(DraftField::Objective));
        assert_eq!(outcome.actions[0], FlowAction::PresentSummary);
    }

    #[test]
    fn terminal_stages_only_accept_review_and_restart() {
        let context = FlowContext::default();
        for stage in [ConversationStage::Done, ConversationStage::Cancelled] {
            assert!(transition(&stage, &ConversationEvent::ReviewRequested, &context).is_ok());
            assert!(transition(&stage, &ConversationEvent::RestartRequested, &context).is_ok());
            assert!(matches!(
                transition(&stage, &ConversationEvent::FieldsUpdated, &context),
                Err(FlowTransitionError::InvalidTransition { .. })
            ));
        }
    }

    #[test]
    fn replay_is_deterministic_for_same_event_sequence() {
        let events = [
            ConversationEvent::FieldsUpdated,
            ConversationEvent::AttachmentRequested,
            ConversationEvent::SubmitRequested,
            ConversationEvent::SubmitRequested,
            ConversationEvent::SubmissionSucceeded,
        ];
        let run = || {
            let mut stage = ConversationStage::Collecting(DraftField::Name);
            let mut actions = Vec::new();
            for event in &events {
                let outcome =
                    transition(&stage, event, &FlowContext::default()).expect("deterministic run");
                actions.push(outcome.actions);
                stage = outcome.to;
            }
            (stage, actions)
        };

        let first = run();
        assert_eq!(first, run());
        assert_eq!(first.0, ConversationStage::Done);
    }
}
