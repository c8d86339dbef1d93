//! External ads-service contracts and the in-process mock used by the CLI and tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use adwright_core::config::FaultConfig;
use adwright_core::domain::campaign::{AttachmentMetadata, CampaignDraft, CampaignId};
use adwright_core::domain::submission::{AttachmentVerdict, FailureCode, SubmissionOutcome};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

pub const UPLOAD_PREFIX: &str = "MUS_UP_";
pub const MAX_ATTACHMENT_SECONDS: u32 = 60;

#[async_trait]
pub trait AttachmentService: Send + Sync {
    async fn validate_reference(&self, reference: &str) -> AttachmentVerdict;
}

/// Accepts only drafts that already validate with zero violations.
#[async_trait]
pub trait SubmissionService: Send + Sync {
    async fn submit(&self, draft: &CampaignDraft) -> SubmissionOutcome;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    Fail(FailureCode),
    /// Delays the answer, long enough to trip the caller's timeout in tests.
    Stall(Duration),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogTrack {
    pub id: &'static str,
    pub title: &'static str,
    pub artist: &'static str,
    pub duration_seconds: u32,
}

pub const DEFAULT_CATALOG: &[CatalogTrack] = &[
    CatalogTrack {
        id: "MUS_12345",
        title: "Trending Beat 2024",
        artist: "DJ Fresh",
        duration_seconds: 30,
    },
    CatalogTrack {
        id: "MUS_67890",
        title: "Viral Dance Track",
        artist: "Sound Wave",
        duration_seconds: 25,
    },
    CatalogTrack {
        id: "MUS_11111",
        title: "Chill Vibes",
        artist: "Ambient Artists",
        duration_seconds: 45,
    },
    CatalogTrack {
        id: "MUSIC_99999",
        title: "Popular Song",
        artist: "Top Charts",
        duration_seconds: 35,
    },
    CatalogTrack {
        id: "MUS_54321",
        title: "Extended Festival Mix",
        artist: "Night Shift",
        duration_seconds: 185,
    },
];

const BANNED_CLAIMS: &[&str] =
    &["guaranteed", "risk-free", "risk free", "miracle", "100% free", "cure", "get rich"];

/// Injectable failure source: scripted faults are consumed first, then the
/// seeded rates decide.
pub struct FaultPolicy {
    rng: Mutex<StdRng>,
    attachment_failure_rate: f64,
    submission_failure_rate: f64,
    rate_limit_rate: f64,
    attachment_script: Mutex<VecDeque<Fault>>,
    submission_script: Mutex<VecDeque<Fault>>,
}

impl Default for FaultPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl FaultPolicy {
    /// Never fails unless faults are scripted.
    pub fn none() -> Self {
        Self::seeded(0, 0.0, 0.0, 0.0)
    }

    pub fn seeded(
        seed: u64,
        attachment_failure_rate: f64,
        submission_failure_rate: f64,
        rate_limit_rate: f64,
    ) -> Self {
        Self::with_rng(
            StdRng::seed_from_u64(seed),
            attachment_failure_rate,
            submission_failure_rate,
            rate_limit_rate,
        )
    }

    pub fn from_config(config: &FaultConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(
            rng,
            config.attachment_failure_rate,
            config.submission_failure_rate,
            config.rate_limit_rate,
        )
    }

    fn with_rng(
        rng: StdRng,
        attachment_failure_rate: f64,
        submission_failure_rate: f64,
        rate_limit_rate: f64,
    ) -> Self {
        Self {
            rng: Mutex::new(rng),
            attachment_failure_rate: attachment_failure_rate.clamp(0.0, 1.0),
            submission_failure_rate: submission_failure_rate.clamp(0.0, 1.0),
            rate_limit_rate: rate_limit_rate.clamp(0.0, 1.0),
            attachment_script: Mutex::new(VecDeque::new()),
            submission_script: Mutex::new(VecDeque::new()),
        }
    }

    pub fn script_attachment(self, faults: impl IntoIterator<Item = Fault>) -> Self {
        self.attachment_script.lock().unwrap_or_else(PoisonError::into_inner).extend(faults);
        self
    }

    pub fn script_submission(self, faults: impl IntoIterator<Item = Fault>) -> Self {
        self.submission_script.lock().unwrap_or_else(PoisonError::into_inner).extend(faults);
        self
    }

    fn next_attachment_fault(&self) -> Option<Fault> {
        if let Some(fault) =
            self.attachment_script.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
        {
            return Some(fault);
        }
        self.roll(
            self.attachment_failure_rate,
            &[FailureCode::CopyrightClaim, FailureCode::GeoRestricted],
        )
    }

    fn next_submission_fault(&self) -> Option<Fault> {
        if let Some(fault) =
            self.submission_script.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
        {
            return Some(fault);
        }
        self.roll(
            self.submission_failure_rate,
            &[
                FailureCode::InvalidToken,
                FailureCode::ContentRejected,
                FailureCode::Unknown("validation_failed".to_string()),
            ],
        )
    }

    fn roll(&self, failure_rate: f64, codes: &[FailureCode]) -> Option<Fault> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        if rng.gen_bool(self.rate_limit_rate) {
            return Some(Fault::Fail(FailureCode::RateLimited));
        }
        if rng.gen_bool(failure_rate) {
            return codes.choose(&mut *rng).cloned().map(Fault::Fail);
        }
        None
    }

    fn campaign_number(&self) -> u32 {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).gen_range(100_000..=999_999)
    }
}

/// In-process stand-in for the ads platform's music library and campaign API.
pub struct MockAdsService {
    catalog: Vec<CatalogTrack>,
    faults: FaultPolicy,
    attachment_calls: AtomicUsize,
    submission_calls: AtomicUsize,
}

impl Default for MockAdsService {
    fn default() -> Self {
        Self::new(FaultPolicy::none())
    }
}

impl MockAdsService {
    pub fn new(faults: FaultPolicy) -> Self {
        Self {
            catalog: DEFAULT_CATALOG.to_vec(),
            faults,
            attachment_calls: AtomicUsize::new(0),
            submission_calls: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &FaultConfig) -> Self {
        Self::new(FaultPolicy::from_config(config))
    }

    pub fn catalog(&self) -> &[CatalogTrack] {
        &self.catalog
    }

    pub fn attachment_calls(&self) -> usize {
        self.attachment_calls.load(Ordering::SeqCst)
    }

    pub fn submission_calls(&self) -> usize {
        self.submission_calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, reference: &str) -> AttachmentVerdict {
        if reference.starts_with(UPLOAD_PREFIX) {
            return AttachmentVerdict::Approved(AttachmentMetadata {
                title: "Custom upload".to_string(),
                artist: "You".to_string(),
                duration_seconds: 30,
            });
        }

        let Some(track) = self.catalog.iter().find(|track| track.id == reference) else {
            return AttachmentVerdict::Rejected {
                code: FailureCode::InvalidReference,
                message: format!("Music ID '{reference}' does not exist in the music library"),
            };
        };

        if track.duration_seconds > MAX_ATTACHMENT_SECONDS {
            return AttachmentVerdict::Rejected {
                code: FailureCode::DurationInvalid,
                message: format!(
                    "'{}' is {} seconds long; ads allow at most {MAX_ATTACHMENT_SECONDS}",
                    track.title, track.duration_seconds
                ),
            };
        }

        AttachmentVerdict::Approved(AttachmentMetadata {
            title: track.title.to_string(),
            artist: track.artist.to_string(),
            duration_seconds: track.duration_seconds,
        })
    }
}

#[async_trait]
impl AttachmentService for MockAdsService {
    async fn validate_reference(&self, reference: &str) -> AttachmentVerdict {
        self.attachment_calls.fetch_add(1, Ordering::SeqCst);
        match self.faults.next_attachment_fault() {
            Some(Fault::Fail(code)) => {
                debug!(event_name = "mock.attachment.fault_injected", code = %code, reference);
                return AttachmentVerdict::Rejected {
                    message: fault_message(&code),
                    code,
                };
            }
            Some(Fault::Stall(delay)) => tokio::time::sleep(delay).await,
            None => {}
        }
        self.lookup(reference)
    }
}

#[async_trait]
impl SubmissionService for MockAdsService {
    async fn submit(&self, draft: &CampaignDraft) -> SubmissionOutcome {
        self.submission_calls.fetch_add(1, Ordering::SeqCst);
        match self.faults.next_submission_fault() {
            Some(Fault::Fail(code)) => {
                debug!(event_name = "mock.submission.fault_injected", code = %code);
                return SubmissionOutcome::Failure { message: fault_message(&code), code };
            }
            Some(Fault::Stall(delay)) => tokio::time::sleep(delay).await,
            None => {}
        }

        let copy = [draft.ad_text.as_deref(), draft.call_to_action.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();
        if let Some(claim) = BANNED_CLAIMS.iter().find(|claim| copy.contains(*claim)) {
            return SubmissionOutcome::Failure {
                code: FailureCode::ContentRejected,
                message: format!("Ad copy makes a prohibited claim (\"{claim}\")"),
            };
        }

        SubmissionOutcome::Success(CampaignId(format!(
            "{}{}",
            CampaignId::PREFIX,
            self.faults.campaign_number()
        )))
    }
}

fn fault_message(code: &FailureCode) -> String {
    match code {
        FailureCode::RateLimited => "Too many requests. Rate limit: 10 requests per minute",
        FailureCode::InvalidToken => "Access token is invalid or expired",
        FailureCode::ContentRejected => "Ad content did not pass review",
        FailureCode::DurationInvalid => "Music duration exceeds the allowed maximum",
        FailureCode::CopyrightClaim => "This music has copyright restrictions for ads",
        FailureCode::GeoRestricted => "This music is not available in the target region",
        FailureCode::InvalidReference => "Music reference not found",
        FailureCode::Timeout => "The request timed out",
        FailureCode::Unknown(_) => "Campaign validation failed. Please review your inputs.",
    }
    .to_string()
}
