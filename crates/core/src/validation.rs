//! Draft validation: field presence, per-field format, and the conditional
//! attachment rule.
//!
//! Validation is a pure function of the draft. It is re-run after every
//! mutation, so the attachment rule is evaluated against the current
//! `objective` and `attachment` no matter in which order they were set.

use serde::{Deserialize, Serialize};

use crate::domain::campaign::{CampaignDraft, DraftField, Objective};

pub const NAME_MIN_CHARS: usize = 3;
pub const NAME_MAX_CHARS: usize = 128;
pub const AD_TEXT_MAX_CHARS: usize = 100;
pub const CTA_MAX_CHARS: usize = 40;
pub const REFERENCE_MIN_CHARS: usize = 5;
pub const REFERENCE_MAX_CHARS: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    MissingRequired,
    TooLong,
    InvalidFormat,
    BusinessRuleViolation,
}

impl ViolationKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingRequired => "missing_required",
            Self::TooLong => "too_long",
            Self::InvalidFormat => "invalid_format",
            Self::BusinessRuleViolation => "business_rule_violation",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub field: DraftField,
    pub message: String,
}

impl Violation {
    fn new(kind: ViolationKind, field: DraftField, message: impl Into<String>) -> Self {
        Self { kind, field, message: message.into() }
    }
}

pub trait DraftValidator: Send + Sync {
    fn validate(&self, draft: &CampaignDraft) -> Vec<Violation>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ValidationEngine;

impl DraftValidator for ValidationEngine {
    fn validate(&self, draft: &CampaignDraft) -> Vec<Violation> {
        validate(draft)
    }
}

/// Returns violations ordered as presence, then format, then cross-field
/// rules. An empty list means the draft is ready to submit.
pub fn validate(draft: &CampaignDraft) -> Vec<Violation> {
    let mut violations = Vec::new();

    for field in
        [DraftField::Name, DraftField::Objective, DraftField::AdText, DraftField::CallToAction]
    {
        if draft.text_value(field).is_none() {
            violations.push(Violation::new(
                ViolationKind::MissingRequired,
                field,
                format!("{} is required", field.label()),
            ));
        }
    }

    if let Some(name) = draft.name.as_deref() {
        violations.extend(check_name(name));
    }
    if let Some(ad_text) = draft.ad_text.as_deref() {
        violations.extend(check_ad_text(ad_text));
    }
    if let Some(cta) = draft.call_to_action.as_deref() {
        violations.extend(check_call_to_action(cta));
    }
    if let Some(reference) = draft.attachment.reference_id() {
        violations.extend(check_reference_format(reference));
    }

    if let Some(violation) = check_attachment_rule(draft.objective, draft.attachment.is_none()) {
        violations.push(violation);
    }

    violations
}

pub fn check_name(name: &str) -> Option<Violation> {
    let trimmed = name.trim();
    let length = trimmed.chars().count();
    if length < NAME_MIN_CHARS {
        return Some(Violation::new(
            ViolationKind::InvalidFormat,
            DraftField::Name,
            format!("Campaign name must be at least {NAME_MIN_CHARS} characters (current: {length})"),
        ));
    }
    if length > NAME_MAX_CHARS {
        return Some(Violation::new(
            ViolationKind::TooLong,
            DraftField::Name,
            format!("Campaign name must be {NAME_MAX_CHARS} characters or less (current: {length})"),
        ));
    }
    if trimmed.chars().any(char::is_control) {
        return Some(Violation::new(
            ViolationKind::InvalidFormat,
            DraftField::Name,
            "Campaign name cannot contain control characters",
        ));
    }
    None
}

pub fn check_ad_text(ad_text: &str) -> Option<Violation> {
    let length = ad_text.chars().count();
    if length > AD_TEXT_MAX_CHARS {
        return Some(Violation::new(
            ViolationKind::TooLong,
            DraftField::AdText,
            format!(
                "Ad text must be {AD_TEXT_MAX_CHARS} characters or less (current: {length}, shorten by {})",
                length - AD_TEXT_MAX_CHARS
            ),
        ));
    }
    if ad_text.chars().any(char::is_control) {
        return Some(Violation::new(
            ViolationKind::InvalidFormat,
            DraftField::AdText,
            "Ad text must be a single line without control characters",
        ));
    }
    None
}

pub fn check_call_to_action(cta: &str) -> Option<Violation> {
    let length = cta.chars().count();
    if length > CTA_MAX_CHARS {
        return Some(Violation::new(
            ViolationKind::TooLong,
            DraftField::CallToAction,
            format!("Call to action must be {CTA_MAX_CHARS} characters or less (current: {length})"),
        ));
    }
    if !cta.chars().any(char::is_alphabetic) {
        return Some(Violation::new(
            ViolationKind::InvalidFormat,
            DraftField::CallToAction,
            "Call to action must contain words, e.g. \"Shop Now\"",
        ));
    }
    None
}

/// Local pre-check applied to attachment references before any external call.
pub fn check_reference_format(reference: &str) -> Option<Violation> {
    let length = reference.chars().count();
    let allowed = reference.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-'));
    if !(REFERENCE_MIN_CHARS..=REFERENCE_MAX_CHARS).contains(&length) || !allowed {
        return Some(Violation::new(
            ViolationKind::InvalidFormat,
            DraftField::Attachment,
            format!(
                "Music reference `{reference}` must be {REFERENCE_MIN_CHARS}-{REFERENCE_MAX_CHARS} characters of letters, digits, `_` or `-` (e.g. MUS_12345)"
            ),
        ));
    }
    None
}

/// `objective == Conversions` requires an attachment; `Traffic` leaves it optional.
pub fn check_attachment_rule(
    objective: Option<Objective>,
    attachment_missing: bool,
) -> Option<Violation> {
    match objective {
        Some(Objective::Conversions) if attachment_missing => Some(Violation::new(
            ViolationKind::BusinessRuleViolation,
            DraftField::Attachment,
            "Music is required for Conversions campaigns. Provide a music ID or upload a track.",
        )),
        _ => None,
    }
}
