//! Translates violation kinds and external failure codes into user guidance.
//!
//! The mapping is a static table keyed by wire code. Codes that are not in the
//! table resolve to a generic entry so unknown service failures never crash a
//! conversation.

use serde::{Deserialize, Serialize};

use crate::domain::campaign::DraftField;
use crate::domain::submission::FailureCode;
use crate::validation::{Violation, ViolationKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remedy {
    EditField,
    ShortenAdText,
    ChooseObjective,
    RetryDifferentReference,
    UploadAttachment,
    ProceedWithoutAttachment,
    ReviseAdContent,
    ReconnectAccount,
    WaitAndRetry,
    TryAgain,
}

impl Remedy {
    pub fn label(&self) -> &'static str {
        match self {
            Self::EditField => "Provide a corrected value for the highlighted field",
            Self::ShortenAdText => "Shorten the ad text to 100 characters or less",
            Self::ChooseObjective => "Choose Traffic (music optional) or Conversions (music required)",
            Self::RetryDifferentReference => "Try a different music ID",
            Self::UploadAttachment => "Upload custom music with `upload <filename>`",
            Self::ProceedWithoutAttachment => "Proceed without music (Traffic campaigns only)",
            Self::ReviseAdContent => "Revise the ad text and call to action, then submit again",
            Self::ReconnectAccount => "Reconnect the ads account, then submit again",
            Self::WaitAndRetry => "Wait a moment and submit again",
            Self::TryAgain => "Try again",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpretation {
    pub code: String,
    pub explanation: String,
    pub remedies: Vec<Remedy>,
    pub auto_retry: bool,
}

impl Interpretation {
    pub fn without_remedy(mut self, remedy: Remedy) -> Self {
        self.remedies.retain(|candidate| *candidate != remedy);
        self
    }

    pub fn render(&self) -> String {
        let mut lines = vec![self.explanation.clone()];
        if !self.remedies.is_empty() {
            lines.push(String::new());
            lines.push("What you can do:".to_string());
            for (index, remedy) in self.remedies.iter().enumerate() {
                lines.push(format!("  {}. {}", index + 1, remedy.label()));
            }
        }
        lines.join("\n")
    }
}

struct Entry {
    code: &'static str,
    explanation: &'static str,
    remedies: &'static [Remedy],
    auto_retry: bool,
}

const FALLBACK: Entry = Entry {
    code: "unknown",
    explanation: "Something went wrong on the ads service side. Your draft is unchanged.",
    remedies: &[Remedy::TryAgain],
    auto_retry: false,
};

const ENTRIES: &[Entry] = &[
    Entry {
        code: "missing_required",
        explanation: "A required campaign field has not been provided yet.",
        remedies: &[Remedy::EditField],
        auto_retry: false,
    },
    Entry {
        code: "too_long",
        explanation: "A field is longer than the ads platform allows.",
        remedies: &[Remedy::ShortenAdText, Remedy::EditField],
        auto_retry: false,
    },
    Entry {
        code: "invalid_format",
        explanation: "A field value is not in a format the ads platform accepts.",
        remedies: &[Remedy::EditField],
        auto_retry: false,
    },
    Entry {
        code: "business_rule_violation",
        explanation: "Conversions campaigns need music to drive user action, so this campaign cannot be submitted without it.",
        remedies: &[
            Remedy::RetryDifferentReference,
            Remedy::UploadAttachment,
            Remedy::ChooseObjective,
        ],
        auto_retry: false,
    },
    Entry {
        code: "rate_limited",
        explanation: "The ads service is receiving too many requests right now. This is temporary.",
        remedies: &[Remedy::WaitAndRetry],
        auto_retry: true,
    },
    Entry {
        code: "timeout",
        explanation: "The ads service did not answer in time. This is usually temporary.",
        remedies: &[Remedy::WaitAndRetry],
        auto_retry: true,
    },
    Entry {
        code: "invalid_token",
        explanation: "The ads account authorization is no longer valid, so the service refused the request.",
        remedies: &[Remedy::ReconnectAccount],
        auto_retry: false,
    },
    Entry {
        code: "content_rejected",
        explanation: "The ad content was rejected by the platform's content review.",
        remedies: &[Remedy::ReviseAdContent],
        auto_retry: false,
    },
    Entry {
        code: "duration_invalid",
        explanation: "The music is longer than the 60 second maximum allowed in ads.",
        remedies: &[
            Remedy::RetryDifferentReference,
            Remedy::UploadAttachment,
            Remedy::ProceedWithoutAttachment,
        ],
        auto_retry: false,
    },
    Entry {
        code: "invalid_reference",
        explanation: "That music ID does not exist in the music library. It may be mistyped, removed, or from another platform.",
        remedies: &[
            Remedy::RetryDifferentReference,
            Remedy::UploadAttachment,
            Remedy::ProceedWithoutAttachment,
        ],
        auto_retry: false,
    },
    Entry {
        code: "copyright_claim",
        explanation: "This music has active copyright restrictions and cannot be used in ads.",
        remedies: &[
            Remedy::RetryDifferentReference,
            Remedy::UploadAttachment,
            Remedy::ProceedWithoutAttachment,
        ],
        auto_retry: false,
    },
    Entry {
        code: "geo_restricted",
        explanation: "This music is not licensed in every region the ad targets.",
        remedies: &[
            Remedy::RetryDifferentReference,
            Remedy::UploadAttachment,
            Remedy::ProceedWithoutAttachment,
        ],
        auto_retry: false,
    },
    FALLBACK,
];

#[derive(Clone, Copy, Debug, Default)]
pub struct ErrorInterpreter;

impl ErrorInterpreter {
    pub fn interpret(&self, code: &str) -> Interpretation {
        interpret(code)
    }

    pub fn interpret_violation(&self, violation: &Violation) -> Interpretation {
        interpret_violation(violation)
    }

    pub fn interpret_failure(&self, code: &FailureCode, message: &str) -> Interpretation {
        interpret_failure(code, message)
    }
}

pub fn interpret(code: &str) -> Interpretation {
    let normalized = code.trim().to_ascii_lowercase();
    let entry = ENTRIES.iter().find(|entry| entry.code == normalized).unwrap_or(&FALLBACK);
    Interpretation {
        code: entry.code.to_string(),
        explanation: entry.explanation.to_string(),
        remedies: entry.remedies.to_vec(),
        auto_retry: entry.auto_retry,
    }
}

/// Prefixes the table explanation with the violation's own message.
pub fn interpret_violation(violation: &Violation) -> Interpretation {
    let mut interpretation = interpret(violation.kind.code());
    interpretation.explanation = format!("{}. {}", violation.message, interpretation.explanation);
    if violation.kind == ViolationKind::TooLong && violation.field != DraftField::AdText {
        interpretation = interpretation.without_remedy(Remedy::ShortenAdText);
    }
    interpretation
}

/// Appends the service message to the explanation when it adds detail.
pub fn interpret_failure(code: &FailureCode, message: &str) -> Interpretation {
    let mut interpretation = interpret(code.as_str());
    let message = message.trim();
    if !message.is_empty() && !interpretation.explanation.contains(message) {
        interpretation.explanation = format!("{} ({message})", interpretation.explanation);
    }
    interpretation
}
