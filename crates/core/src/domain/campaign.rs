use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CampaignId(pub String);

impl CampaignId {
    pub const PREFIX: &'static str = "CAMP_";

    /// Accepts only `CAMP_` followed by exactly six ASCII digits.
    pub fn parse(raw: &str) -> Option<Self> {
        let digits = raw.strip_prefix(Self::PREFIX)?;
        let well_formed = digits.len() == 6 && digits.chars().all(|ch| ch.is_ascii_digit());
        well_formed.then(|| Self(raw.to_string()))
    }
}

impl fmt::Display for CampaignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Objective {
    Traffic,
    Conversions,
}

impl Objective {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Traffic => "Traffic",
            Self::Conversions => "Conversions",
        }
    }

    pub fn requires_attachment(&self) -> bool {
        matches!(self, Self::Conversions)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "traffic" => Some(Self::Traffic),
            "conversion" | "conversions" => Some(Self::Conversions),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attachment {
    #[default]
    None,
    ExistingRef { id: String },
    UploadedRef { filename: String, id: String },
}

impl Attachment {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn reference_id(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::ExistingRef { id } | Self::UploadedRef { id, .. } => Some(id),
        }
    }
}

/// Details returned by the attachment validation service for an approved reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMetadata {
    pub title: String,
    pub artist: String,
    pub duration_seconds: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignStatus {
    InProgress,
    Submitted,
    Cancelled,
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("campaign draft is {status:?} and can no longer change")]
pub struct DraftLocked {
    pub status: CampaignStatus,
}

/// The fields a conversation collects, in prompting priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftField {
    Name,
    Objective,
    AdText,
    CallToAction,
    Attachment,
}

impl DraftField {
    pub const PRIORITY: [DraftField; 5] =
        [Self::Name, Self::Objective, Self::AdText, Self::CallToAction, Self::Attachment];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Objective => "objective",
            Self::AdText => "ad_text",
            Self::CallToAction => "call_to_action",
            Self::Attachment => "attachment",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Name => "Campaign name",
            Self::Objective => "Objective",
            Self::AdText => "Ad text",
            Self::CallToAction => "Call to action",
            Self::Attachment => "Music attachment",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "name" | "campaign_name" => Some(Self::Name),
            "objective" => Some(Self::Objective),
            "ad_text" | "text" => Some(Self::AdText),
            "call_to_action" | "cta" => Some(Self::CallToAction),
            "attachment" | "music" | "music_id" => Some(Self::Attachment),
            _ => None,
        }
    }
}

impl fmt::Display for DraftField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignDraft {
    pub name: Option<String>,
    pub objective: Option<Objective>,
    pub ad_text: Option<String>,
    pub call_to_action: Option<String>,
    pub attachment: Attachment,
    pub attachment_metadata: Option<AttachmentMetadata>,
    pub status: CampaignStatus,
    pub campaign_id: Option<CampaignId>,
}

impl Default for CampaignDraft {
    fn default() -> Self {
        Self {
            name: None,
            objective: None,
            ad_text: None,
            call_to_action: None,
            attachment: Attachment::None,
            attachment_metadata: None,
            status: CampaignStatus::InProgress,
            campaign_id: None,
        }
    }
}

impl CampaignDraft {
    pub fn is_mutable(&self) -> bool {
        self.status == CampaignStatus::InProgress
    }

    pub fn ensure_mutable(&self) -> Result<(), DraftLocked> {
        if self.is_mutable() {
            return Ok(());
        }
        Err(DraftLocked { status: self.status })
    }

    pub fn attachment_required(&self) -> bool {
        self.objective.map(|objective| objective.requires_attachment()).unwrap_or(false)
    }

    pub fn text_value(&self, field: DraftField) -> Option<&str> {
        match field {
            DraftField::Name => self.name.as_deref(),
            DraftField::AdText => self.ad_text.as_deref(),
            DraftField::CallToAction => self.call_to_action.as_deref(),
            DraftField::Objective => self.objective.map(|objective| objective.label()),
            DraftField::Attachment => self.attachment.reference_id(),
        }
    }

    pub fn mark_submitted(&mut self, campaign_id: CampaignId) -> Result<(), DraftLocked> {
        self.ensure_mutable()?;
        self.status = CampaignStatus::Submitted;
        self.campaign_id = Some(campaign_id);
        Ok(())
    }

    pub fn mark_cancelled(&mut self) -> Result<(), DraftLocked> {
        self.ensure_mutable()?;
        self.status = CampaignStatus::Cancelled;
        Ok(())
    }
}
