use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use adwright_agent::extractor::RuleFieldExtractor;
use adwright_agent::retry::RetryPolicy;
use adwright_agent::services::MockAdsService;
use adwright_agent::{Orchestrator, ReplyKind};
use adwright_core::config::{AppConfig, LoadOptions};
use adwright_core::domain::campaign::CampaignStatus;
use adwright_core::domain::submission::FailureCode;
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

const CONVERSATION_CHECKS: [&str; 3] =
    ["happy_path_submission", "attachment_rule_guard", "reference_rejection"];

/// Runs scripted conversations against a fault-free mock so the result only
/// depends on the agent and the loaded configuration.
pub fn run(options: LoadOptions) -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config_started = Instant::now();
    let config = match AppConfig::load(options) {
        Ok(config) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms: elapsed_ms(config_started),
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err(error) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms: elapsed_ms(config_started),
                message: error.to_string(),
            });
            checks.extend(CONVERSATION_CHECKS.into_iter().map(skipped));
            return finalize_report(checks, elapsed_ms(started));
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "runtime",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.extend(CONVERSATION_CHECKS.into_iter().map(skipped));
            return finalize_report(checks, elapsed_ms(started));
        }
    };

    let policy = RetryPolicy::from_config(&config);
    let min_confidence = config.conversation.min_confidence;
    let session = |service: &Arc<MockAdsService>| {
        Orchestrator::new(Arc::new(RuleFieldExtractor::new()), service.clone(), service.clone())
            .with_retry_policy(policy.clone())
            .with_min_confidence(min_confidence)
    };

    checks.push(runtime.block_on(timed_check("happy_path_submission", async {
        let service = Arc::new(MockAdsService::default());
        let mut orchestrator = session(&service);
        let reply = play(&mut orchestrator, &CORE_FIELDS, "Conversions").await?;
        expect(reply.kind == ReplyKind::Prompt, "attachment was not requested")?;
        orchestrator.handle_turn("MUS_12345").await;
        let reply = orchestrator.handle_turn("submit").await;
        expect(reply.kind == ReplyKind::Submitted, &reply.message)?;
        let campaign_id = orchestrator.draft().campaign_id.clone();
        expect(orchestrator.draft().status == CampaignStatus::Submitted, "draft not submitted")?;
        Ok::<_, String>(format!(
            "created {}",
            campaign_id.map(|id| id.to_string()).unwrap_or_else(|| "<missing id>".into())
        ))
    })));

    checks.push(runtime.block_on(timed_check("attachment_rule_guard", async {
        let service = Arc::new(MockAdsService::default());
        let mut orchestrator = session(&service);
        play(&mut orchestrator, &CORE_FIELDS, "Conversions").await?;
        let reply = orchestrator.handle_turn("submit").await;
        expect(reply.kind == ReplyKind::BusinessRuleViolation, &reply.message)?;
        expect(service.submission_calls() == 0, "submission service was called")?;
        Ok::<_, String>("Conversions without music refused locally".to_string())
    })));

    checks.push(runtime.block_on(timed_check("reference_rejection", async {
        let service = Arc::new(MockAdsService::default());
        let mut orchestrator = session(&service);
        play(&mut orchestrator, &CORE_FIELDS, "Conversions").await?;
        let reply = orchestrator.handle_turn("XYZ_999").await;
        let expected =
            ReplyKind::ExternalServiceError { code: FailureCode::InvalidReference, transient: false };
        expect(reply.kind == expected, &reply.message)?;
        expect(orchestrator.draft().attachment.is_none(), "rejected reference was stored")?;
        Ok::<_, String>("unknown music reference rejected with remedies".to_string())
    })));

    finalize_report(checks, elapsed_ms(started))
}

const CORE_FIELDS: [&str; 3] = ["Summer Sale 2024", "Get 50% off! Limited time", "Shop Now"];

/// Fills name, objective, ad text and call to action in conversation order.
async fn play(
    orchestrator: &mut Orchestrator,
    fields: &[&str; 3],
    objective: &str,
) -> Result<adwright_agent::TurnReply, String> {
    let [name, ad_text, call_to_action] = *fields;
    let mut last = None;
    for text in [name, objective, ad_text, call_to_action] {
        let reply = orchestrator.handle_turn(text).await;
        if reply.kind.is_error() {
            return Err(format!("`{text}` was rejected: {}", reply.message));
        }
        last = Some(reply);
    }
    last.ok_or_else(|| "no turns were played".to_string())
}

fn expect(condition: bool, message: &str) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(message.to_string())
    }
}

async fn timed_check(
    name: &'static str,
    check: impl Future<Output = Result<String, String>>,
) -> SmokeCheck {
    let started = Instant::now();
    let (status, message) = match check.await {
        Ok(message) => (SmokeStatus::Pass, message),
        Err(message) => (SmokeStatus::Fail, message),
    };
    SmokeCheck { name, status, elapsed_ms: elapsed_ms(started), message }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}
