//! Turn loop for one campaign conversation.
//!
//! Each user turn is either a control command or free text. Free text goes
//! through the [`FieldExtractor`]; the resulting patch is applied to the state
//! machine, attachment values are resolved against the attachment service, and
//! the reply is assembled from the resulting stage. Nothing here decides
//! validity: that is always the validator's answer for the current draft.

use std::sync::Arc;

use adwright_core::config::AppConfig;
use adwright_core::domain::campaign::{CampaignDraft, CampaignId, DraftField};
use adwright_core::domain::conversation::{ConversationId, ConversationTurn};
use adwright_core::domain::submission::{FailureCode, SubmissionOutcome};
use adwright_core::errors::{ApplicationError, DomainError};
use adwright_core::flows::{
    ConversationStage, ConversationStateMachine, FlowAction, FlowTransitionError, PatchError,
    TransitionOutcome,
};
use adwright_core::interpreter::ErrorInterpreter;
use adwright_core::validation::{Violation, ViolationKind};
use tracing::{debug, info, warn};

use crate::attachment::{
    AttachmentRequest, AttachmentResolution, AttachmentResolutionFlow, RejectionOrigin,
};
use crate::commands::{parse_control_command, ControlCommand};
use crate::extractor::{ExtractionRequest, FieldExtractor, DECLINE_ATTACHMENT};
use crate::prompts;
use crate::retry::{run_with_retry, AbortReason, AbortSignal, RetryOutcome, RetryPolicy};
use crate::services::{AttachmentService, SubmissionService};

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyKind {
    Prompt,
    Help,
    Summary,
    Submitted,
    Cancelled,
    /// The conversation is finished and the command was not one it still accepts.
    Closed,
    FieldValidationError,
    BusinessRuleViolation,
    ExternalServiceError { code: FailureCode, transient: bool },
    ExtractionAmbiguity,
    Exit,
}

impl ReplyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Help => "help",
            Self::Summary => "summary",
            Self::Submitted => "submitted",
            Self::Cancelled => "cancelled",
            Self::Closed => "closed",
            Self::FieldValidationError => "field_validation_error",
            Self::BusinessRuleViolation => "business_rule_violation",
            Self::ExternalServiceError { .. } => "external_service_error",
            Self::ExtractionAmbiguity => "extraction_ambiguity",
            Self::Exit => "exit",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::FieldValidationError
                | Self::BusinessRuleViolation
                | Self::ExternalServiceError { .. }
                | Self::ExtractionAmbiguity
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnReply {
    pub message: String,
    pub stage: ConversationStage,
    pub kind: ReplyKind,
}

pub struct Orchestrator {
    id: ConversationId,
    machine: ConversationStateMachine,
    extractor: Arc<dyn FieldExtractor>,
    attachments: Arc<dyn AttachmentService>,
    submissions: Arc<dyn SubmissionService>,
    policy: RetryPolicy,
    abort: AbortSignal,
    min_confidence: f64,
    interpreter: ErrorInterpreter,
    attachment_offered: bool,
    history: Vec<ConversationTurn>,
}

impl Orchestrator {
    pub fn new(
        extractor: Arc<dyn FieldExtractor>,
        attachments: Arc<dyn AttachmentService>,
        submissions: Arc<dyn SubmissionService>,
    ) -> Self {
        Self {
            id: ConversationId::generate(),
            machine: ConversationStateMachine::new(),
            extractor,
            attachments,
            submissions,
            policy: RetryPolicy::default(),
            abort: AbortSignal::new(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            interpreter: ErrorInterpreter,
            attachment_offered: false,
            history: Vec::new(),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        extractor: Arc<dyn FieldExtractor>,
        attachments: Arc<dyn AttachmentService>,
        submissions: Arc<dyn SubmissionService>,
    ) -> Self {
        Self::new(extractor, attachments, submissions)
            .with_retry_policy(RetryPolicy::from_config(config))
            .with_min_confidence(config.conversation.min_confidence)
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.id
    }

    pub fn draft(&self) -> &CampaignDraft {
        self.machine.draft()
    }

    pub fn stage(&self) -> ConversationStage {
        self.machine.stage()
    }

    pub fn violations(&self) -> &[Violation] {
        self.machine.violations()
    }

    pub fn is_finished(&self) -> bool {
        self.machine.is_finished()
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// Handle for interrupting a pending external call from another task.
    pub fn abort_handle(&self) -> AbortSignal {
        self.abort.clone()
    }

    /// Opening message; recorded as the first system turn.
    pub fn greet(&mut self) -> TurnReply {
        let reply = self.reply(prompts::greeting(), ReplyKind::Prompt);
        self.history.push(ConversationTurn::system(&reply.message));
        reply
    }

    pub async fn handle_turn(&mut self, text: &str) -> TurnReply {
        self.abort.reset();
        self.history.push(ConversationTurn::user(text));
        info!(
            event_name = "agent.turn.received",
            correlation_id = %self.id.0,
            stage = ?self.machine.stage(),
            "user turn received"
        );

        let reply = match parse_control_command(text) {
            Some(command) => self.handle_command(command).await,
            None if self.machine.is_finished() => {
                self.reply(prompts::finished_prompt(), ReplyKind::Closed)
            }
            None => self.handle_text(text).await,
        };

        info!(
            event_name = "agent.turn.replied",
            correlation_id = %self.id.0,
            kind = reply.kind.as_str(),
            stage = ?reply.stage,
            "system reply produced"
        );
        self.history.push(ConversationTurn::system(&reply.message));
        reply
    }

    async fn handle_command(&mut self, command: ControlCommand) -> TurnReply {
        debug!(
            event_name = "agent.command.parsed",
            correlation_id = %self.id.0,
            command = command.label(),
            "control command intercepted"
        );

        if self.machine.is_finished()
            && !matches!(
                command,
                ControlCommand::Restart
                    | ControlCommand::Help
                    | ControlCommand::Review
                    | ControlCommand::Exit
            )
        {
            return self.reply(prompts::finished_prompt(), ReplyKind::Closed);
        }

        match command {
            ControlCommand::Help => self.reply(prompts::help_text(), ReplyKind::Help),
            ControlCommand::Exit => self.reply(prompts::goodbye(), ReplyKind::Exit),
            ControlCommand::Review => self.review(),
            ControlCommand::Restart => self.restart(None),
            ControlCommand::Cancel => self.cancel(None),
            ControlCommand::Upload { filename: None } => {
                self.reply(prompts::upload_needs_filename(), ReplyKind::FieldValidationError)
            }
            ControlCommand::Upload { filename: Some(filename) } => {
                self.resolve_attachment(AttachmentRequest::Upload { filename }, Vec::new()).await
            }
            ControlCommand::Submit => self.submit().await,
            ControlCommand::Confirm if self.machine.stage() == ConversationStage::ReviewingSummary => {
                self.submit().await
            }
            ControlCommand::Confirm => {
                let message = format!(
                    "{} {}",
                    prompts::confirm_outside_review(),
                    prompts::stage_prompt(self.machine.stage(), self.machine.draft())
                );
                self.reply(message, ReplyKind::ExtractionAmbiguity)
            }
        }
    }

    async fn handle_text(&mut self, text: &str) -> TurnReply {
        let request = ExtractionRequest {
            draft: self.machine.draft().clone(),
            stage: self.machine.stage(),
            text: text.to_string(),
        };
        let extractor = Arc::clone(&self.extractor);
        let result = run_with_retry(&self.policy, &self.abort, "extract_fields", |_| {
            extractor.extract(&request)
        })
        .await;
        let extraction = match result {
            RetryOutcome::Finished { value, .. } => value,
            RetryOutcome::TimedOut { attempts } => {
                warn!(
                    event_name = "agent.extractor.timeout",
                    correlation_id = %self.id.0,
                    attempts,
                    "field extraction timed out"
                );
                return self.ambiguity();
            }
            RetryOutcome::Aborted { reason, .. } => return self.aborted(reason),
        };

        if extraction.patch.is_empty() || extraction.confidence < self.min_confidence {
            debug!(
                event_name = "agent.extractor.ambiguous",
                correlation_id = %self.id.0,
                confidence = extraction.confidence,
                min_confidence = self.min_confidence,
                "extraction below confidence threshold"
            );
            return self.ambiguity();
        }

        if let Some(turn) = self.history.last_mut() {
            turn.patch = Some(extraction.patch.clone());
        }

        let mut patch = extraction.patch;
        let attachment_values = patch.take_attachment_values();
        let mut notes = Vec::new();

        if !patch.is_empty() {
            match self.machine.apply(&patch) {
                Ok(outcome) => {
                    if !outcome.changed.is_empty() {
                        notes.push(format!("Updated {}.", field_list(&outcome.changed)));
                    }
                    if let Some(mut reply) =
                        self.report_malformed(&outcome.transition, &outcome.changed, &notes)
                    {
                        if let Some(value) = attachment_values.first() {
                            info!(
                                event_name = "agent.attachment.deferred",
                                correlation_id = %self.id.0,
                                value = %value,
                                "attachment held back until the draft is fixed"
                            );
                            let note = prompts::attachment_deferred(value, reply.stage);
                            reply.message = format!("{}\n\n{note}", reply.message);
                        }
                        return reply;
                    }
                }
                Err(error) => return self.patch_rejected(error),
            }
        }

        let Some(first) = attachment_values.first() else {
            return self.settled(notes);
        };
        if let Some(conflict) = attachment_values.iter().find(|value| *value != first) {
            let error = PatchError::Conflicting {
                field: DraftField::Attachment,
                first: first.clone(),
                second: conflict.clone(),
            };
            return self.patch_rejected(error);
        }

        let request = if first.eq_ignore_ascii_case(DECLINE_ATTACHMENT) {
            AttachmentRequest::Decline
        } else {
            AttachmentRequest::Reference(first.clone())
        };
        self.resolve_attachment(request, notes).await
    }

    /// Replies with the violation when the patch left the current field malformed.
    ///
    /// A missing attachment under Conversions is only reported as a rule
    /// violation when this patch changed the objective; otherwise the
    /// conversation simply reached the attachment question.
    fn report_malformed(
        &self,
        outcome: &TransitionOutcome,
        changed: &[DraftField],
        notes: &[String],
    ) -> Option<TurnReply> {
        if !outcome.actions.contains(&FlowAction::ReportViolations) {
            return None;
        }
        let field = outcome.to.collecting_field()?;
        let violation = self.machine.violations().iter().find(|violation| {
            violation.field == field && violation.kind != ViolationKind::MissingRequired
        })?;
        if violation.kind == ViolationKind::BusinessRuleViolation
            && !changed.contains(&DraftField::Objective)
        {
            return None;
        }
        let mut lines = notes.to_vec();
        lines.push(self.interpreter.interpret_violation(violation).render());
        lines.push(prompts::field_prompt(field, self.machine.draft()));
        Some(self.reply(lines.join("\n\n"), violation_kind(violation)))
    }

    fn patch_rejected(&self, error: PatchError) -> TurnReply {
        let message = match &error {
            PatchError::Conflicting { field, first, second } => format!(
                "You gave two different values for {}: `{first}` and `{second}`. Which one should I use?",
                field.label()
            ),
            PatchError::InvalidValue { field: DraftField::Objective, value } => format!(
                "`{value}` is not a campaign objective. {}",
                prompts::field_prompt(DraftField::Objective, self.machine.draft())
            ),
            PatchError::InvalidValue { field, value } => {
                format!("`{value}` is not a valid {}.", field.label())
            }
            _ => self.internal_error(DomainError::from(error.clone())),
        };
        self.reply(message, ReplyKind::FieldValidationError)
    }

    async fn resolve_attachment(
        &mut self,
        request: AttachmentRequest,
        mut notes: Vec<String>,
    ) -> TurnReply {
        if let Err(error) = self.machine.enter_attachment_stage() {
            return self.flow_error(error);
        }
        self.attachment_offered = true;

        let objective = self.machine.draft().objective;
        let resolution = {
            let flow = AttachmentResolutionFlow::new(
                self.attachments.as_ref(),
                &self.policy,
                &self.abort,
            );
            flow.resolve(request, objective).await
        };

        match resolution {
            AttachmentResolution::Approved { attachment, metadata } => {
                let description = format!(
                    "Music {} approved: {} by {} ({}s).",
                    attachment.reference_id().unwrap_or_default(),
                    metadata.title,
                    metadata.artist,
                    metadata.duration_seconds
                );
                if let Err(error) = self.machine.resolve_attachment(attachment, Some(metadata)) {
                    return self.flow_error(error);
                }
                notes.push(description);
                self.settled(notes)
            }
            AttachmentResolution::Declined => {
                if let Err(error) = self.machine.decline_attachment() {
                    return self.flow_error(error);
                }
                notes.push("Continuing without music.".to_string());
                self.settled(notes)
            }
            AttachmentResolution::Rejected(rejection) => {
                let kind = match rejection.origin {
                    RejectionOrigin::Format => ReplyKind::FieldValidationError,
                    RejectionOrigin::BusinessRule => ReplyKind::BusinessRuleViolation,
                    RejectionOrigin::Service { code, transient } => {
                        ReplyKind::ExternalServiceError { code, transient }
                    }
                };
                notes.push(rejection.interpretation.render());
                match self.machine.reject_attachment() {
                    Ok(outcome) => match outcome.to {
                        ConversationStage::Collecting(field) if field != DraftField::Attachment => {
                            notes.push(prompts::field_prompt(field, self.machine.draft()));
                        }
                        _ => {}
                    },
                    Err(error) => return self.flow_error(error),
                }
                self.reply(notes.join("\n\n"), kind)
            }
            AttachmentResolution::Aborted(reason) => self.aborted(reason),
        }
    }

    async fn submit(&mut self) -> TurnReply {
        let outcome = match self.machine.begin_submission() {
            Ok(outcome) => outcome,
            Err(FlowTransitionError::SubmitBlocked { violations }) => {
                warn!(
                    event_name = "agent.submission.blocked",
                    correlation_id = %self.id.0,
                    violations = violations.len(),
                    "submission refused locally"
                );
                let kind = if violations
                    .iter()
                    .any(|violation| violation.kind == ViolationKind::BusinessRuleViolation)
                {
                    ReplyKind::BusinessRuleViolation
                } else {
                    ReplyKind::FieldValidationError
                };
                let message = format!(
                    "{}\n\n{}",
                    prompts::submission_blocked(&violations),
                    prompts::stage_prompt(self.machine.next_prompt(), self.machine.draft())
                );
                return self.reply(message, kind);
            }
            Err(error) => return self.flow_error(error),
        };

        if outcome.to == ConversationStage::ReviewingSummary {
            let message = format!(
                "{}\n\n{}",
                prompts::render_summary(self.machine.draft()),
                prompts::confirmation_prompt()
            );
            return self.reply(message, ReplyKind::Summary);
        }

        let draft = self.machine.draft().clone();
        let submissions = Arc::clone(&self.submissions);
        let result = run_with_retry(&self.policy, &self.abort, "submit_campaign", |_| {
            submissions.submit(&draft)
        })
        .await;

        let (code, message) = match result {
            RetryOutcome::Finished { value: SubmissionOutcome::Success(campaign_id), .. }
                if CampaignId::parse(&campaign_id.0).is_none() =>
            {
                (
                    FailureCode::Unknown("malformed_campaign_id".to_string()),
                    format!("service answered with malformed campaign id `{campaign_id}`"),
                )
            }
            RetryOutcome::Finished { value: SubmissionOutcome::Success(campaign_id), attempts } => {
                if let Err(error) = self.machine.complete_submission(campaign_id.clone()) {
                    return self.flow_error(error);
                }
                info!(
                    event_name = "agent.submission.succeeded",
                    correlation_id = %self.id.0,
                    campaign_id = %campaign_id,
                    attempts,
                    "campaign submitted"
                );
                return self.reply(
                    prompts::submitted(&campaign_id, self.machine.draft()),
                    ReplyKind::Submitted,
                );
            }
            RetryOutcome::Finished {
                value: SubmissionOutcome::Failure { code, message }, ..
            } => (code, message),
            RetryOutcome::TimedOut { .. } => (FailureCode::Timeout, String::new()),
            RetryOutcome::Aborted { reason, .. } => return self.aborted(reason),
        };

        if let Err(error) = self.machine.fail_submission() {
            return self.flow_error(error);
        }
        let failure = ApplicationError::external(code.clone(), message.clone());
        warn!(
            event_name = "agent.submission.failed",
            correlation_id = %self.id.0,
            error = %failure,
            "campaign submission failed"
        );
        let transient = code.is_transient();
        let interpretation = self.interpreter.interpret_failure(&code, &message);
        let text = format!(
            "The campaign was not created. Your draft is unchanged.\n\n{}",
            interpretation.render()
        );
        self.reply(text, ReplyKind::ExternalServiceError { code, transient })
    }

    fn review(&mut self) -> TurnReply {
        if let Err(error) = self.machine.request_review() {
            return self.flow_error(error);
        }
        let mut lines = vec![prompts::render_summary(self.machine.draft())];
        match self.machine.stage() {
            ConversationStage::Collecting(field) => {
                let outstanding = self
                    .machine
                    .violations()
                    .iter()
                    .filter(|violation| violation.kind != ViolationKind::MissingRequired)
                    .cloned()
                    .collect::<Vec<_>>();
                if !outstanding.is_empty() {
                    lines.push(format!("Needs attention:\n{}", prompts::violations_list(&outstanding)));
                }
                lines.push(prompts::field_prompt(field, self.machine.draft()));
            }
            ConversationStage::ReviewingSummary => lines.push(prompts::confirmation_prompt()),
            _ => {}
        }
        self.reply(lines.join("\n\n"), ReplyKind::Summary)
    }

    fn restart(&mut self, prefix: Option<String>) -> TurnReply {
        self.machine.restart();
        self.attachment_offered = false;
        info!(
            event_name = "agent.conversation.restarted",
            correlation_id = %self.id.0,
            "draft discarded"
        );
        let mut lines = prefix.into_iter().collect::<Vec<_>>();
        lines.push("Starting over with a fresh campaign.".to_string());
        lines.push(prompts::field_prompt(DraftField::Name, self.machine.draft()));
        self.reply(lines.join("\n\n"), ReplyKind::Prompt)
    }

    fn cancel(&mut self, prefix: Option<String>) -> TurnReply {
        if let Err(error) = self.machine.cancel() {
            return self.flow_error(error);
        }
        info!(
            event_name = "agent.conversation.cancelled",
            correlation_id = %self.id.0,
            "conversation cancelled"
        );
        let mut lines = prefix.into_iter().collect::<Vec<_>>();
        lines.push(prompts::cancelled());
        self.reply(lines.join("\n\n"), ReplyKind::Cancelled)
    }

    fn aborted(&mut self, reason: AbortReason) -> TurnReply {
        info!(
            event_name = "agent.turn.aborted",
            correlation_id = %self.id.0,
            ?reason,
            "pending external call abandoned"
        );
        match reason {
            AbortReason::Cancel => self.cancel(Some(prompts::aborted())),
            AbortReason::Restart => self.restart(Some(prompts::aborted())),
        }
    }

    fn settled(&mut self, mut notes: Vec<String>) -> TurnReply {
        if self.machine.stage() == ConversationStage::ReviewingSummary
            && self.machine.draft().attachment.is_none()
            && !self.attachment_offered
        {
            self.attachment_offered = true;
            if let Err(error) = self.machine.enter_attachment_stage() {
                return self.flow_error(error);
            }
        }

        let stage = self.machine.stage();
        match stage {
            ConversationStage::ReviewingSummary => {
                notes.push(prompts::render_summary(self.machine.draft()));
                notes.push(prompts::confirmation_prompt());
                self.reply(notes.join("\n\n"), ReplyKind::Summary)
            }
            _ => {
                notes.push(prompts::stage_prompt(stage, self.machine.draft()));
                self.reply(notes.join("\n\n"), ReplyKind::Prompt)
            }
        }
    }

    fn ambiguity(&self) -> TurnReply {
        self.reply(
            prompts::ambiguity(self.machine.stage(), self.machine.draft()),
            ReplyKind::ExtractionAmbiguity,
        )
    }

    fn flow_error(&self, error: FlowTransitionError) -> TurnReply {
        if let FlowTransitionError::DraftLocked(_) = error {
            return self.reply(prompts::finished_prompt(), ReplyKind::Closed);
        }
        let message = self.internal_error(DomainError::from(error));
        self.reply(message, ReplyKind::FieldValidationError)
    }

    fn internal_error(&self, error: DomainError) -> String {
        let interface = ApplicationError::from(error).into_interface(self.id.0.clone());
        warn!(
            event_name = "agent.turn.rejected",
            correlation_id = interface.correlation_id(),
            error = %interface,
            "turn could not be applied"
        );
        format!(
            "{} {}",
            interface.user_message(),
            prompts::stage_prompt(self.machine.stage(), self.machine.draft())
        )
    }

    fn reply(&self, message: String, kind: ReplyKind) -> TurnReply {
        TurnReply { message, stage: self.machine.stage(), kind }
    }
}

fn violation_kind(violation: &Violation) -> ReplyKind {
    match violation.kind {
        ViolationKind::BusinessRuleViolation => ReplyKind::BusinessRuleViolation,
        _ => ReplyKind::FieldValidationError,
    }
}

fn field_list(fields: &[DraftField]) -> String {
    fields.iter().map(|field| field.label()).collect::<Vec<_>>().join(", ")
}
