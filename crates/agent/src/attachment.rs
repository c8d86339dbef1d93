//! Attachment resolution: local pre-checks, then the external validation call
//! with retry, then remedy selection for the current objective.

use std::path::Path;

use adwright_core::domain::campaign::{Attachment, AttachmentMetadata, Objective};
use adwright_core::domain::submission::{AttachmentVerdict, FailureCode};
use adwright_core::interpreter::{ErrorInterpreter, Interpretation, Remedy};
use adwright_core::validation::{
    check_attachment_rule, check_reference_format, Violation, ViolationKind,
};
use adwright_core::DraftField;
use tracing::info;

use crate::retry::{run_with_retry, AbortReason, AbortSignal, RetryOutcome, RetryPolicy};
use crate::services::{AttachmentService, UPLOAD_PREFIX};

pub const AUDIO_EXTENSIONS: [&str; 5] = ["mp3", "wav", "m4a", "aac", "ogg"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttachmentRequest {
    Reference(String),
    Upload { filename: String },
    Decline,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectionOrigin {
    Format,
    BusinessRule,
    Service { code: FailureCode, transient: bool },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentRejection {
    pub origin: RejectionOrigin,
    pub interpretation: Interpretation,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttachmentResolution {
    Approved { attachment: Attachment, metadata: AttachmentMetadata },
    Declined,
    Rejected(AttachmentRejection),
    Aborted(AbortReason),
}

pub struct AttachmentResolutionFlow<'a> {
    service: &'a dyn AttachmentService,
    policy: &'a RetryPolicy,
    abort: &'a AbortSignal,
    interpreter: ErrorInterpreter,
}

impl<'a> AttachmentResolutionFlow<'a> {
    pub fn new(
        service: &'a dyn AttachmentService,
        policy: &'a RetryPolicy,
        abort: &'a AbortSignal,
    ) -> Self {
        Self { service, policy, abort, interpreter: ErrorInterpreter }
    }

    pub async fn resolve(
        &self,
        request: AttachmentRequest,
        objective: Option<Objective>,
    ) -> AttachmentResolution {
        match request {
            AttachmentRequest::Decline => match check_attachment_rule(objective, true) {
                Some(violation) => self.local_rejection(RejectionOrigin::BusinessRule, &violation),
                None => AttachmentResolution::Declined,
            },
            AttachmentRequest::Reference(id) => {
                if let Some(violation) = check_reference_format(&id) {
                    return self.local_rejection(RejectionOrigin::Format, &violation);
                }
                self.validate_external(Attachment::ExistingRef { id }, objective).await
            }
            AttachmentRequest::Upload { filename } => {
                if let Some(violation) = check_upload_filename(&filename) {
                    return self.local_rejection(RejectionOrigin::Format, &violation);
                }
                let id = placeholder_id();
                info!(
                    event_name = "agent.attachment.upload_placeholder",
                    filename = %filename,
                    reference = %id,
                    "synthesised upload placeholder"
                );
                self.validate_external(Attachment::UploadedRef { filename, id }, objective).await
            }
        }
    }

    async fn validate_external(
        &self,
        attachment: Attachment,
        objective: Option<Objective>,
    ) -> AttachmentResolution {
        let Some(reference) = attachment.reference_id().map(str::to_string) else {
            return AttachmentResolution::Declined;
        };

        let outcome = run_with_retry(self.policy, self.abort, "validate_reference", |_| {
            self.service.validate_reference(&reference)
        })
        .await;

        let (code, message) = match outcome {
            RetryOutcome::Finished { value: AttachmentVerdict::Approved(metadata), .. } => {
                info!(
                    event_name = "agent.attachment.approved",
                    reference = %reference,
                    title = %metadata.title,
                    "attachment approved"
                );
                return AttachmentResolution::Approved { attachment, metadata };
            }
            RetryOutcome::Finished {
                value: AttachmentVerdict::Rejected { code, message }, ..
            } => (code, message),
            RetryOutcome::TimedOut { .. } => (FailureCode::Timeout, String::new()),
            RetryOutcome::Aborted { reason, .. } => return AttachmentResolution::Aborted(reason),
        };

        info!(
            event_name = "agent.attachment.rejected",
            reference = %reference,
            code = %code,
            "attachment rejected"
        );
        let mut interpretation = self.interpreter.interpret_failure(&code, &message);
        if !interpretation.remedies.contains(&Remedy::RetryDifferentReference) {
            interpretation.remedies.push(Remedy::RetryDifferentReference);
            interpretation.remedies.push(Remedy::UploadAttachment);
        }
        if objective.map(|objective| objective.requires_attachment()).unwrap_or(false) {
            interpretation = interpretation.without_remedy(Remedy::ProceedWithoutAttachment);
        } else if !interpretation.remedies.contains(&Remedy::ProceedWithoutAttachment) {
            interpretation.remedies.push(Remedy::ProceedWithoutAttachment);
        }

        let transient = code.is_transient();
        AttachmentResolution::Rejected(AttachmentRejection {
            origin: RejectionOrigin::Service { code, transient },
            interpretation,
        })
    }

    fn local_rejection(&self, origin: RejectionOrigin, violation: &Violation) -> AttachmentResolution {
        AttachmentResolution::Rejected(AttachmentRejection {
            origin,
            interpretation: self.interpreter.interpret_violation(violation),
        })
    }
}

pub fn check_upload_filename(filename: &str) -> Option<Violation> {
    let extension = Path::new(filename.trim())
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase);
    match extension {
        Some(extension) if AUDIO_EXTENSIONS.contains(&extension.as_str()) => None,
        _ => Some(Violation {
            kind: ViolationKind::InvalidFormat,
            field: DraftField::Attachment,
            message: format!(
                "`{filename}` is not an audio file; upload one of: {}",
                AUDIO_EXTENSIONS.join(", ")
            ),
        }),
    }
}

fn placeholder_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{UPLOAD_PREFIX}{}", &hex[..8])
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use adwright_core::domain::campaign::{Attachment, Objective};
    use adwright_core::domain::submission::FailureCode;
    use adwright_core::interpreter::Remedy;

    use super::{
        check_upload_filename, AttachmentRequest, AttachmentResolution, AttachmentResolutionFlow,
        RejectionOrigin,
    };
    use crate::retry::{AbortSignal, RetryPolicy};
    use crate::services::{Fault, FaultPolicy, MockAdsService, UPLOAD_PREFIX};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay_ms: 5,
            max_delay_ms: 20,
            call_timeout: Duration::from_millis(200),
        }
    }

    async fn resolve(
        service: &MockAdsService,
        request: AttachmentRequest,
        objective: Objective,
    ) -> AttachmentResolution {
        let policy = policy();
        let abort = AbortSignal::new();
        AttachmentResolutionFlow::new(service, &policy, &abort).resolve(request, Some(objective)).await
    }

    #[tokio::test]
    async fn known_reference_becomes_existing_ref() {
        let service = MockAdsService::default();
        let resolution = resolve(
            &service,
            AttachmentRequest::Reference("MUS_12345".to_string()),
            Objective::Conversions,
        )
        .await;

        match resolution {
            AttachmentResolution::Approved { attachment, metadata } => {
                assert_eq!(attachment, Attachment::ExistingRef { id: "MUS_12345".to_string() });
                assert_eq!(metadata.title, "Trending Beat 2024");
            }
            other => panic!("expected approval, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_reference_under_conversions_offers_no_skip() {
        let service = MockAdsService::default();
        let resolution = resolve(
            &service,
            AttachmentRequest::Reference("XYZ_999".to_string()),
            Objective::Conversions,
        )
        .await;

        let AttachmentResolution::Rejected(rejection) = resolution else {
            panic!("expected rejection");
        };
        assert_eq!(
            rejection.origin,
            RejectionOrigin::Service { code: FailureCode::InvalidReference, transient: false }
        );
        assert!(rejection.interpretation.remedies.contains(&Remedy::RetryDifferentReference));
        assert!(rejection.interpretation.remedies.contains(&Remedy::UploadAttachment));
        assert!(!rejection.interpretation.remedies.contains(&Remedy::ProceedWithoutAttachment));
    }

    #[tokio::test]
    async fn unknown_reference_under_traffic_offers_skip() {
        let service = MockAdsService::default();
        let resolution = resolve(
            &service,
            AttachmentRequest::Reference("XYZ_999".to_string()),
            Objective::Traffic,
        )
        .await;

        let AttachmentResolution::Rejected(rejection) = resolution else {
            panic!("expected rejection");
        };
        assert!(rejection.interpretation.remedies.contains(&Remedy::ProceedWithoutAttachment));
    }

    #[tokio::test]
    async fn malformed_reference_never_reaches_the_service() {
        let service = MockAdsService::default();
        let resolution = resolve(
            &service,
            AttachmentRequest::Reference("MU$".to_string()),
            Objective::Traffic,
        )
        .await;

        assert!(matches!(
            resolution,
            AttachmentResolution::Rejected(ref rejection) if rejection.origin == RejectionOrigin::Format
        ));
        assert_eq!(service.attachment_calls(), 0);
    }

    #[tokio::test]
    async fn decline_is_refused_locally_under_conversions() {
        let service = MockAdsService::default();
        let resolution = resolve(&service, AttachmentRequest::Decline, Objective::Conversions).await;
        assert!(matches!(
            resolution,
            AttachmentResolution::Rejected(ref rejection)
                if rejection.origin == RejectionOrigin::BusinessRule
        ));
        assert_eq!(service.attachment_calls(), 0);

        let traffic = resolve(&service, AttachmentRequest::Decline, Objective::Traffic).await;
        assert_eq!(traffic, AttachmentResolution::Declined);
    }

    #[tokio::test]
    async fn upload_gets_placeholder_and_is_validated() {
        let service = MockAdsService::default();
        let resolution = resolve(
            &service,
            AttachmentRequest::Upload { filename: "jingle.mp3".to_string() },
            Objective::Conversions,
        )
        .await;

        match resolution {
            AttachmentResolution::Approved {
                attachment: Attachment::UploadedRef { filename, id }, ..
            } => {
                assert_eq!(filename, "jingle.mp3");
                assert!(id.starts_with(UPLOAD_PREFIX));
                assert_eq!(id.len(), UPLOAD_PREFIX.len() + 8);
            }
            other => panic!("expected uploaded ref, got {other:?}"),
        }
        assert_eq!(service.attachment_calls(), 1);
    }

    #[tokio::test]
    async fn transient_rejection_is_retried() {
        let service = MockAdsService::new(
            FaultPolicy::none().script_attachment([Fault::Fail(FailureCode::RateLimited)]),
        );
        let resolution = resolve(
            &service,
            AttachmentRequest::Reference("MUS_67890".to_string()),
            Objective::Traffic,
        )
        .await;
        assert!(matches!(resolution, AttachmentResolution::Approved { .. }));
        assert_eq!(service.attachment_calls(), 2);
    }

    #[test]
    fn only_audio_files_can_be_uploaded() {
        assert!(check_upload_filename("track.MP3").is_none());
        assert!(check_upload_filename("mix.ogg").is_none());
        assert!(check_upload_filename("notes.txt").is_some());
        assert!(check_upload_filename("no_extension").is_some());
    }
}
