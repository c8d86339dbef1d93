//! User-facing text. Kept apart from the orchestrator so wording changes never
//! touch flow logic.

use adwright_core::domain::campaign::{
    Attachment, CampaignDraft, CampaignId, DraftField, Objective,
};
use adwright_core::flows::ConversationStage;
use adwright_core::validation::{Violation, AD_TEXT_MAX_CHARS, NAME_MIN_CHARS};

use crate::extractor::DECLINE_ATTACHMENT;

pub fn greeting() -> String {
    format!(
        "Welcome to the ad campaign assistant.\n\
         \n\
         I'll help you build a campaign step by step. We'll need:\n\
         \x20 - a campaign name\n\
         \x20 - an objective (Traffic or Conversions)\n\
         \x20 - ad text (max {AD_TEXT_MAX_CHARS} characters)\n\
         \x20 - a call to action\n\
         \x20 - music (required for Conversions, optional for Traffic)\n\
         \n\
         Type `help` at any time to see the available commands.\n\
         \n\
         {}",
        field_prompt(DraftField::Name, &CampaignDraft::default())
    )
}

pub fn help_text() -> String {
    "Available commands:\n\
     \x20 - type naturally to fill in campaign details (e.g. `ad text: Get 50% off!`)\n\
     \x20 - `review`            show the current campaign details\n\
     \x20 - `upload <file>`     attach custom music (mp3, wav, m4a, aac, ogg)\n\
     \x20 - `submit`            submit the campaign once everything is valid\n\
     \x20 - `cancel`            abandon this campaign\n\
     \x20 - `restart`           discard the draft and start over\n\
     \x20 - `help`              show this message\n\
     \x20 - `exit`              quit"
        .to_string()
}

pub fn field_prompt(field: DraftField, draft: &CampaignDraft) -> String {
    match field {
        DraftField::Name => format!(
            "What would you like to name your campaign? (at least {NAME_MIN_CHARS} characters)"
        ),
        DraftField::Objective => {
            "What is the campaign objective: Traffic (drive visits) or Conversions (drive actions)?"
                .to_string()
        }
        DraftField::AdText => format!(
            "What should the ad text say? Keep it to {AD_TEXT_MAX_CHARS} characters or less."
        ),
        DraftField::CallToAction => {
            "What call to action should the ad use? (e.g. Shop Now, Learn More)".to_string()
        }
        DraftField::Attachment => match draft.objective {
            Some(Objective::Conversions) => "Conversions campaigns need music. Give me a music ID \
                 (e.g. MUS_12345) or use `upload <filename>`."
                .to_string(),
            _ => "Would you like music? Give me a music ID (e.g. MUS_12345), use \
                 `upload <filename>`, or say `none` to skip."
                .to_string(),
        },
    }
}

/// Prompt for whatever the stage is waiting on.
pub fn stage_prompt(stage: ConversationStage, draft: &CampaignDraft) -> String {
    match stage {
        ConversationStage::Collecting(field) => field_prompt(field, draft),
        ConversationStage::ReviewingSummary => confirmation_prompt(),
        ConversationStage::Submitting => "Submitting your campaign...".to_string(),
        ConversationStage::Done => finished_prompt(),
        ConversationStage::Cancelled => finished_prompt(),
    }
}

pub fn render_summary(draft: &CampaignDraft) -> String {
    let value = |field: DraftField| {
        draft.text_value(field).map(str::to_string).unwrap_or_else(|| "(not set)".to_string())
    };
    let music = match &draft.attachment {
        Attachment::None if draft.attachment_required() => "(required, not set)".to_string(),
        Attachment::None => "none".to_string(),
        Attachment::ExistingRef { id } => describe_music(id, draft),
        Attachment::UploadedRef { filename, id } => {
            format!("{} from upload `{filename}`", describe_music(id, draft))
        }
    };

    let mut lines = vec![
        "Campaign summary".to_string(),
        format!("  Name:           {}", value(DraftField::Name)),
        format!("  Objective:      {}", value(DraftField::Objective)),
        format!("  Ad text:        {}", value(DraftField::AdText)),
        format!("  Call to action: {}", value(DraftField::CallToAction)),
        format!("  Music:          {music}"),
    ];
    if let Some(campaign_id) = &draft.campaign_id {
        lines.push(format!("  Campaign ID:    {campaign_id}"));
    }
    lines.join("\n")
}

fn describe_music(id: &str, draft: &CampaignDraft) -> String {
    match &draft.attachment_metadata {
        Some(metadata) => format!(
            "{id} ({} by {}, {}s)",
            metadata.title, metadata.artist, metadata.duration_seconds
        ),
        None => id.to_string(),
    }
}

pub fn confirmation_prompt() -> String {
    "Everything look good? Reply `yes` or `submit` to create the campaign, \
     give a new value to change a field, or `cancel` to abandon it."
        .to_string()
}

pub fn violations_list(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|violation| format!("  - {}: {}", violation.field.label(), violation.message))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn submission_blocked(violations: &[Violation]) -> String {
    format!(
        "The campaign can't be submitted yet:\n{}\n\nNothing was sent to the ads service.",
        violations_list(violations)
    )
}

pub fn submitted(campaign_id: &CampaignId, draft: &CampaignDraft) -> String {
    format!(
        "Campaign created. Campaign ID: {campaign_id}\n\n{}\n\n\
         Type `restart` to create another campaign or `exit` to quit.",
        render_summary(draft)
    )
}

pub fn cancelled() -> String {
    "Campaign cancelled. Type `restart` to start a new one or `exit` to quit.".to_string()
}

pub fn finished_prompt() -> String {
    "This campaign is closed. Type `review` to see it, `restart` to create another, \
     or `exit` to quit."
        .to_string()
}

pub fn ambiguity(stage: ConversationStage, draft: &CampaignDraft) -> String {
    format!(
        "Sorry, I couldn't tell which campaign detail that was. {}",
        stage_prompt(stage, draft)
    )
}

/// Music given alongside a field that still needs fixing is not checked yet.
pub fn attachment_deferred(value: &str, stage: ConversationStage) -> String {
    let choice = if value.eq_ignore_ascii_case(DECLINE_ATTACHMENT) {
        "Your choice to go without music".to_string()
    } else {
        format!("Music `{value}`")
    };
    match stage.collecting_field() {
        Some(field) => format!(
            "{choice} was not applied yet. Send it again once the {} is fixed.",
            field.label().to_ascii_lowercase()
        ),
        None => format!("{choice} was not applied yet. Send it again."),
    }
}

pub fn upload_needs_filename() -> String {
    "Please name the file to upload, e.g. `upload jingle.mp3`.".to_string()
}

pub fn confirm_outside_review() -> String {
    "There is nothing to confirm yet.".to_string()
}

pub fn aborted() -> String {
    "The pending request was stopped. Your draft is unchanged.".to_string()
}

pub fn goodbye() -> String {
    "Goodbye!".to_string()
}
