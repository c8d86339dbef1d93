use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::campaign::DraftField;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn generate() -> Self {
        Self(format!("conv-{}", uuid::Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
    pub occurred_at: DateTime<Utc>,
    pub patch: Option<FieldPatch>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: TurnRole::User, text: text.into(), occurred_at: Utc::now(), patch: None }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self { role: TurnRole::System, text: text.into(), occurred_at: Utc::now(), patch: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchEntry {
    pub field: DraftField,
    pub value: String,
}

/// Proposed field updates extracted from one user turn.
///
/// Entries keep extraction order and may name the same field more than once;
/// the state machine decides whether such duplicates conflict.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPatch {
    entries: Vec<PatchEntry>,
}

impl FieldPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: DraftField, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    /// Blank values are dropped so that they never overwrite collected data.
    pub fn insert(&mut self, field: DraftField, value: impl Into<String>) {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return;
        }
        self.entries.push(PatchEntry { field, value: trimmed.to_string() });
    }

    pub fn entries(&self) -> &[PatchEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn fields(&self) -> Vec<DraftField> {
        let mut fields = self.entries.iter().map(|entry| entry.field).collect::<Vec<_>>();
        fields.sort();
        fields.dedup();
        fields
    }

    /// Removes and returns every attachment entry, leaving plain field updates behind.
    pub fn take_attachment_values(&mut self) -> Vec<String> {
        let (attachment, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| entry.field == DraftField::Attachment);
        self.entries = rest;
        attachment.into_iter().map(|entry| entry.value).collect()
    }
}
