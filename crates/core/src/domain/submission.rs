use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::campaign::{AttachmentMetadata, CampaignId};

/// Failure codes emitted by the external ads services, plus `timeout` which is
/// synthesised locally when a call exceeds its deadline.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum FailureCode {
    RateLimited,
    InvalidToken,
    ContentRejected,
    DurationInvalid,
    InvalidReference,
    CopyrightClaim,
    GeoRestricted,
    Timeout,
    Unknown(String),
}

impl FailureCode {
    pub fn parse(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "rate_limited" | "rate_limit_exceeded" => Self::RateLimited,
            "invalid_token" => Self::InvalidToken,
            "content_rejected" => Self::ContentRejected,
            "duration_invalid" => Self::DurationInvalid,
            "invalid_reference" => Self::InvalidReference,
            "copyright_claim" => Self::CopyrightClaim,
            "geo_restricted" => Self::GeoRestricted,
            "timeout" => Self::Timeout,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::InvalidToken => "invalid_token",
            Self::ContentRejected => "content_rejected",
            Self::DurationInvalid => "duration_invalid",
            Self::InvalidReference => "invalid_reference",
            Self::CopyrightClaim => "copyright_claim",
            Self::GeoRestricted => "geo_restricted",
            Self::Timeout => "timeout",
            Self::Unknown(code) => code,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout)
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<FailureCode> for String {
    fn from(value: FailureCode) -> Self {
        value.as_str().to_string()
    }
}

impl From<String> for FailureCode {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionOutcome {
    Success(CampaignId),
    Failure { code: FailureCode, message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentVerdict {
    Approved(AttachmentMetadata),
    Rejected { code: FailureCode, message: String },
}

/// Lets the retry loop ask whether a completed call reported a transient failure.
pub trait ExternalOutcome {
    fn failure_code(&self) -> Option<&FailureCode>;

    fn is_transient_failure(&self) -> bool {
        self.failure_code().map(FailureCode::is_transient).unwrap_or(false)
    }
}

impl ExternalOutcome for SubmissionOutcome {
    fn failure_code(&self) -> Option<&FailureCode> {
        match self {
            Self::Success(_) => None,
            Self::Failure { code, .. } => Some(code),
        }
    }
}

impl ExternalOutcome for AttachmentVerdict {
    fn failure_code(&self) -> Option<&FailureCode> {
        match self {
            Self::Approved(_) => None,
            Self::Rejected { code, .. } => Some(code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ExternalOutcome, FailureCode, SubmissionOutcome};

    #[test]
    fn unknown_codes_are_preserved_verbatim() {
        let code = FailureCode::parse("quota_exhausted");
        assert_eq!(code, FailureCode::Unknown("quota_exhausted".to_string()));
        assert_eq!(code.as_str(), "quota_exhausted");
        assert!(!code.is_transient());
    }

    #[test]
    fn only_rate_limit_and_timeout_are_transient() {
        assert!(FailureCode::RateLimited.is_transient());
        assert!(FailureCode::Timeout.is_transient());
        assert!(!FailureCode::InvalidToken.is_transient());
        assert!(!FailureCode::ContentRejected.is_transient());
        assert!(!FailureCode::DurationInvalid.is_transient());
    }

    #[test]
    fn failure_code_serializes_as_wire_string() {
        let json = serde_json::to_string(&FailureCode::RateLimited).expect("serialize");
        assert_eq!(json, "\"rate_limited\"");
        let parsed: FailureCode = serde_json::from_str("\"content_rejected\"").expect("parse");
        assert_eq!(parsed, FailureCode::ContentRejected);
    }

    #[test]
    fn outcome_reports_transient_failures() {
        let outcome = SubmissionOutcome::Failure {
            code: FailureCode::RateLimited,
            message: "slow down".to_string(),
        };
        assert!(outcome.is_transient_failure());
    }
}
