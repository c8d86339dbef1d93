//! Free-form text to [`FieldPatch`] extraction.
//!
//! Extraction never fails: any problem degrades to an empty patch, which the
//! orchestrator answers with a clarification prompt instead of mutating the draft.

use adwright_core::domain::campaign::{CampaignDraft, DraftField, Objective};
use adwright_core::domain::conversation::FieldPatch;
use adwright_core::domain::submission::{ExternalOutcome, FailureCode};
use adwright_core::flows::ConversationStage;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::llm::{strip_code_fence, LlmClient};

/// Attachment value meaning "continue without music".
pub const DECLINE_ATTACHMENT: &str = "none";

const LABELED_CONFIDENCE: f64 = 0.95;
const KEYWORD_CONFIDENCE: f64 = 0.85;
const STAGE_ANSWER_CONFIDENCE: f64 = 0.8;
const LOOSE_ANSWER_CONFIDENCE: f64 = 0.6;
const QUESTION_CONFIDENCE: f64 = 0.3;

#[derive(Clone, Debug, PartialEq)]
pub struct ExtractionRequest {
    pub draft: CampaignDraft,
    pub stage: ConversationStage,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Extraction {
    pub patch: FieldPatch,
    pub confidence: f64,
}

impl Extraction {
    pub fn empty() -> Self {
        Self { patch: FieldPatch::new(), confidence: 0.0 }
    }

    fn of(patch: FieldPatch, confidence: f64) -> Self {
        if patch.is_empty() {
            return Self::empty();
        }
        Self { patch, confidence }
    }
}

/// Extraction degrades instead of failing, so only a timeout is ever retried.
impl ExternalOutcome for Extraction {
    fn failure_code(&self) -> Option<&FailureCode> {
        None
    }
}

#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> Extraction;
}

/// Deterministic extractor: `label: value` lines first. Free-text fields take
/// any other text verbatim; elsewhere keyword phrases come before a bare answer
/// for the field being collected.
#[derive(Clone, Debug, Default)]
pub struct RuleFieldExtractor;

impl RuleFieldExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract_text(&self, stage: ConversationStage, text: &str) -> Extraction {
        let text = text.trim();
        if text.is_empty() {
            return Extraction::empty();
        }

        let labeled = labeled_entries(text);
        if !labeled.is_empty() {
            return Extraction::of(labeled, LABELED_CONFIDENCE);
        }

        let collecting = stage.collecting_field();
        if let Some(field) = collecting.filter(|field| is_free_text(*field)) {
            return stage_answer(field, text);
        }
        if is_decline(text, collecting == Some(DraftField::Attachment)) {
            return Extraction::of(
                FieldPatch::new().with(DraftField::Attachment, DECLINE_ATTACHMENT),
                KEYWORD_CONFIDENCE,
            );
        }

        let keywords = keyword_entries(text);
        if !keywords.is_empty() {
            return Extraction::of(keywords, KEYWORD_CONFIDENCE);
        }

        match collecting {
            Some(field) => stage_answer(field, text),
            None => loose_mentions(text),
        }
    }
}

#[async_trait]
impl FieldExtractor for RuleFieldExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Extraction {
        self.extract_text(request.stage, &request.text)
    }
}

fn is_free_text(field: DraftField) -> bool {
    matches!(field, DraftField::Name | DraftField::AdText | DraftField::CallToAction)
}

fn labeled_entries(text: &str) -> FieldPatch {
    let mut patch = FieldPatch::new();
    for segment in text.split(['\n', ';']) {
        let Some((key, value)) = segment.split_once([':', '=']) else {
            continue;
        };
        let Some(field) = DraftField::from_key(key) else {
            continue;
        };
        let value = unquote(value);
        if field == DraftField::Attachment && is_decline_word(value) {
            patch.insert(field, DECLINE_ATTACHMENT);
        } else {
            patch.insert(field, value);
        }
    }
    patch
}

fn keyword_entries(text: &str) -> FieldPatch {
    let lowered = text.to_ascii_lowercase();
    let mut patch = FieldPatch::new();

    if lowered.contains("objective") || lowered.contains("switch to") {
        if let Some(objective) = objective_mention(&lowered) {
            patch.insert(DraftField::Objective, objective.label());
        }
    }
    let mentions_music = ["music", "sound", "track", "song"]
        .iter()
        .any(|keyword| lowered.contains(keyword));
    if mentions_music {
        if let Some(reference) = find_reference(text) {
            patch.insert(DraftField::Attachment, reference);
        }
    }
    patch
}

fn stage_answer(field: DraftField, text: &str) -> Extraction {
    match field {
        DraftField::Objective => match objective_mention(&text.to_ascii_lowercase()) {
            Some(objective) => Extraction::of(
                FieldPatch::new().with(field, objective.label()),
                STAGE_ANSWER_CONFIDENCE,
            ),
            None if text.split_whitespace().count() == 1 => {
                Extraction::of(FieldPatch::new().with(field, unquote(text)), LOOSE_ANSWER_CONFIDENCE)
            }
            None => Extraction::empty(),
        },
        DraftField::Attachment => match find_reference(text) {
            Some(reference) => Extraction::of(
                FieldPatch::new().with(field, reference),
                STAGE_ANSWER_CONFIDENCE,
            ),
            None if text.split_whitespace().count() == 1 => {
                Extraction::of(FieldPatch::new().with(field, unquote(text)), LOOSE_ANSWER_CONFIDENCE)
            }
            None => Extraction::empty(),
        },
        DraftField::Name | DraftField::AdText | DraftField::CallToAction => {
            let value = strip_answer_prefix(unquote(text));
            let confidence =
                if value.ends_with('?') { QUESTION_CONFIDENCE } else { STAGE_ANSWER_CONFIDENCE };
            Extraction::of(FieldPatch::new().with(field, value), confidence)
        }
    }
}

fn loose_mentions(text: &str) -> Extraction {
    let mut patch = FieldPatch::new();
    if let Some(objective) = objective_mention(&text.to_ascii_lowercase()) {
        patch.insert(DraftField::Objective, objective.label());
    }
    if let Some(reference) = find_reference(text) {
        patch.insert(DraftField::Attachment, reference);
    }
    Extraction::of(patch, LOOSE_ANSWER_CONFIDENCE)
}

fn objective_mention(lowered: &str) -> Option<Objective> {
    let conversions = lowered.contains("conversion");
    let traffic = lowered.contains("traffic");
    match (conversions, traffic) {
        (true, false) => Some(Objective::Conversions),
        (false, true) => Some(Objective::Traffic),
        _ => None,
    }
}

/// First token shaped like a library reference, e.g. `MUS_12345`.
fn find_reference(text: &str) -> Option<String> {
    text.split_whitespace()
        .map(|token| token.trim_matches(|ch: char| !ch.is_ascii_alphanumeric()))
        .find(|token| {
            let length = token.len();
            (5..=64).contains(&length)
                && token.starts_with(|ch: char| ch.is_ascii_alphabetic())
                && token.contains(['_', '-'])
                && token.chars().any(|ch| ch.is_ascii_digit())
                && token.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-'))
        })
        .map(str::to_string)
}

fn is_decline(text: &str, collecting_attachment: bool) -> bool {
    let lowered = text.to_ascii_lowercase();
    let phrase = ["no music", "without music", "skip music", "proceed without", "no sound"]
        .iter()
        .any(|phrase| lowered.contains(phrase));
    phrase || (collecting_attachment && is_decline_word(&lowered))
}

fn is_decline_word(value: &str) -> bool {
    matches!(
        value.trim().trim_end_matches(['.', '!']).to_ascii_lowercase().as_str(),
        "no" | "none" | "skip" | "no thanks" | "without"
    )
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches(['"', '\'', '`']).trim()
}

fn strip_answer_prefix(value: &str) -> &str {
    let lowered = value.to_ascii_lowercase();
    for prefix in ["call it ", "name it ", "let's call it ", "it should say ", "use "] {
        if lowered.starts_with(prefix) && value.len() > prefix.len() {
            return unquote(&value[prefix.len()..]);
        }
    }
    value
}

/// Extractor backed by an [`LlmClient`]; the model is only asked to fill fields,
/// validation stays deterministic.
pub struct LlmFieldExtractor<C> {
    client: C,
}

impl<C> LlmFieldExtractor<C>
where
    C: LlmClient,
{
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C> FieldExtractor for LlmFieldExtractor<C>
where
    C: LlmClient,
{
    async fn extract(&self, request: &ExtractionRequest) -> Extraction {
        let prompt = build_extraction_prompt(request);
        let reply = match self.client.complete(&prompt).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(
                    event_name = "agent.extractor.llm_failed",
                    error = %error,
                    "llm completion failed; degrading to empty patch"
                );
                return Extraction::empty();
            }
        };

        match parse_llm_reply(&reply) {
            Ok(extraction) => extraction,
            Err(error) => {
                warn!(
                    event_name = "agent.extractor.llm_unparseable",
                    error = %error,
                    "llm reply was not valid extraction json"
                );
                Extraction::empty()
            }
        }
    }
}

pub fn build_extraction_prompt(request: &ExtractionRequest) -> String {
    let draft = &request.draft;
    let snapshot = serde_json::json!({
        "name": draft.name,
        "objective": draft.objective.map(|objective| objective.label()),
        "ad_text": draft.ad_text,
        "call_to_action": draft.call_to_action,
        "attachment": draft.attachment.reference_id(),
    });
    let stage = match request.stage {
        ConversationStage::Collecting(field) => format!("collecting {}", field.key()),
        other => format!("{other:?}"),
    };

    format!(
        "Extract ad campaign fields from the user's message.\n\
         Fields: name, objective (Traffic or Conversions), ad_text, call_to_action, attachment (music id, or \"{DECLINE_ATTACHMENT}\" to go without music).\n\
         Only include fields the user actually stated. Do not invent or validate values.\n\
         Reply with JSON only: {{\"fields\": {{\"<field>\": \"<value>\"}}, \"confidence\": <0.0-1.0>}}\n\n\
         Current draft: {snapshot}\n\
         Conversation stage: {stage}\n\
         User message: {text}\n",
        text = request.text.trim(),
    )
}

#[derive(Debug, Deserialize)]
struct LlmReply {
    #[serde(default, alias = "data")]
    fields: serde_json::Map<String, Value>,
    confidence: Option<f64>,
}

pub fn parse_llm_reply(reply: &str) -> Result<Extraction, serde_json::Error> {
    let parsed: LlmReply = serde_json::from_str(strip_code_fence(reply))?;
    let mut patch = FieldPatch::new();
    for (key, value) in &parsed.fields {
        let (Some(field), Some(value)) = (DraftField::from_key(key), value.as_str()) else {
            continue;
        };
        patch.insert(field, value);
    }
    let confidence = parsed.confidence.unwrap_or(STAGE_ANSWER_CONFIDENCE).clamp(0.0, 1.0);
    Ok(Extraction::of(patch, confidence))
}

#[cfg(test)]
mod tests {
    use adwright_core::domain::campaign::{CampaignDraft, DraftField};
    use adwright_core::flows::ConversationStage;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use super::{
        parse_llm_reply, Extraction, ExtractionRequest, FieldExtractor, LlmFieldExtractor,
        RuleFieldExtractor, DECLINE_ATTACHMENT,
    };
    use crate::llm::LlmClient;

    fn values(extraction: &Extraction) -> Vec<(DraftField, String)> {
        extraction
            .patch
            .entries()
            .iter()
            .map(|entry| (entry.field, entry.value.clone()))
            .collect()
    }

    fn collecting(field: DraftField) -> ConversationStage {
        ConversationStage::Collecting(field)
    }

    #[test]
    fn labeled_lines_fill_several_fields() {
        let extraction = RuleFieldExtractor::new().extract_text(
            collecting(DraftField::Name),
            "name: Summer Sale 2024\nobjective: conversions\ncta = Shop Now",
        );
        assert_eq!(
            values(&extraction),
            vec![
                (DraftField::Name, "Summer Sale 2024".to_string()),
                (DraftField::Objective, "conversions".to_string()),
                (DraftField::CallToAction, "Shop Now".to_string()),
            ]
        );
        assert!(extraction.confidence > 0.9);
    }

    #[test]
    fn bare_answer_fills_the_field_being_collected() {
        let extraction = RuleFieldExtractor::new()
            .extract_text(collecting(DraftField::AdText), "\"Get 50% off! Limited time\"");
        assert_eq!(
            values(&extraction),
            vec![(DraftField::AdText, "Get 50% off! Limited time".to_string())]
        );
    }

    #[test]
    fn objective_stage_understands_sentences() {
        let extraction = RuleFieldExtractor::new()
            .extract_text(collecting(DraftField::Objective), "I want more conversions please");
        assert_eq!(values(&extraction), vec![(DraftField::Objective, "Conversions".to_string())]);
    }

    #[test]
    fn attachment_stage_picks_reference_token() {
        let extraction = RuleFieldExtractor::new()
            .extract_text(collecting(DraftField::Attachment), "let's use MUS_12345.");
        assert_eq!(values(&extraction), vec![(DraftField::Attachment, "MUS_12345".to_string())]);
    }

    #[test]
    fn decline_phrases_map_to_decline_value() {
        let extractor = RuleFieldExtractor::new();
        for text in ["no", "Proceed without music", "skip"] {
            let extraction = extractor.extract_text(collecting(DraftField::Attachment), text);
            assert_eq!(
                values(&extraction),
                vec![(DraftField::Attachment, DECLINE_ATTACHMENT.to_string())],
                "{text}"
            );
        }
    }

    #[test]
    fn music_mention_is_routed_to_attachment_while_reviewing() {
        let extraction = RuleFieldExtractor::new()
            .extract_text(ConversationStage::ReviewingSummary, "use the track XYZ_999 for music");
        assert_eq!(values(&extraction), vec![(DraftField::Attachment, "XYZ_999".to_string())]);
    }

    #[test]
    fn free_text_answers_ignore_objective_and_music_keywords() {
        let extractor = RuleFieldExtractor::new();
        let text = "Stop scrolling and switch to traffic-free shopping today";
        let extraction = extractor.extract_text(collecting(DraftField::AdText), text);
        assert_eq!(values(&extraction), vec![(DraftField::AdText, text.to_string())]);

        let extraction =
            extractor.extract_text(collecting(DraftField::CallToAction), "No music, just shop");
        assert_eq!(
            values(&extraction),
            vec![(DraftField::CallToAction, "No music, just shop".to_string())]
        );
    }

    #[test]
    fn labels_still_reach_other_fields_from_free_text_stages() {
        let extraction = RuleFieldExtractor::new()
            .extract_text(collecting(DraftField::AdText), "objective: traffic");
        assert_eq!(values(&extraction), vec![(DraftField::Objective, "traffic".to_string())]);
    }

    #[test]
    fn questions_score_below_default_threshold() {
        let extraction = RuleFieldExtractor::new()
            .extract_text(collecting(DraftField::Name), "what should I call it?");
        assert!(extraction.confidence < 0.5);
    }

    #[test]
    fn unrelated_chatter_while_reviewing_is_empty() {
        let extraction = RuleFieldExtractor::new()
            .extract_text(ConversationStage::ReviewingSummary, "looks fine I guess");
        assert!(extraction.patch.is_empty());
        assert_eq!(extraction.confidence, 0.0);
    }

    #[test]
    fn llm_reply_tolerates_code_fences_and_aliases() {
        let extraction = parse_llm_reply(
            "```json\n{\"data\": {\"campaign_name\": \"Summer Sale 2024\", \"music_id\": null, \"cta\": \"Shop Now\"}, \"confidence\": 0.9}\n```",
        )
        .expect("parse");
        assert_eq!(
            values(&extraction),
            vec![
                (DraftField::Name, "Summer Sale 2024".to_string()),
                (DraftField::CallToAction, "Shop Now".to_string()),
            ]
        );
        assert!((extraction.confidence - 0.9).abs() < f64::EPSILON);
    }

    struct FixedClient(Result<String, String>);

    #[async_trait]
    impl LlmClient for FixedClient {
        async fn complete(&self, prompt: &str) -> Result<String> {
            assert!(prompt.contains("User message: make it traffic"));
            self.0.clone().map_err(|error| anyhow!(error))
        }
    }

    fn request() -> ExtractionRequest {
        ExtractionRequest {
            draft: CampaignDraft::default(),
            stage: ConversationStage::Collecting(DraftField::Objective),
            text: "make it traffic".to_string(),
        }
    }

    #[tokio::test]
    async fn llm_extractor_parses_model_output() {
        let extractor = LlmFieldExtractor::new(FixedClient(Ok(
            "{\"fields\": {\"objective\": \"Traffic\"}, \"confidence\": 0.7}".to_string(),
        )));
        let extraction = extractor.extract(&request()).await;
        assert_eq!(values(&extraction), vec![(DraftField::Objective, "Traffic".to_string())]);
    }

    #[tokio::test]
    async fn llm_extractor_degrades_to_empty_patch() {
        let failing = LlmFieldExtractor::new(FixedClient(Err("connection refused".to_string())));
        assert_eq!(failing.extract(&request()).await, Extraction::empty());

        let garbage = LlmFieldExtractor::new(FixedClient(Ok("Sure! Traffic it is.".to_string())));
        assert_eq!(garbage.extract(&request()).await, Extraction::empty());
    }
}
