use std::sync::Arc;

use adwright_agent::extractor::RuleFieldExtractor;
use adwright_agent::retry::AbortReason;
use adwright_agent::services::MockAdsService;
use adwright_agent::{Orchestrator, ReplyKind};
use adwright_core::config::{AppConfig, LoadOptions};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::commands::{CommandResult, FailureClass};
use crate::logging::init_logging;

pub fn run(options: LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            let message = error.to_string();
            return CommandResult::failure("chat", FailureClass::ConfigValidation, message);
        }
    };
    init_logging(&config);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                FailureClass::Runtime,
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    let result = runtime.block_on(async {
        let mut orchestrator = build_orchestrator(&config);
        let abort = orchestrator.abort_handle();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                abort.trigger(AbortReason::Cancel);
            }
        });

        let input = BufReader::new(tokio::io::stdin());
        let mut output = tokio::io::stdout();
        converse(&mut orchestrator, input, &mut output).await?;
        Ok::<_, anyhow::Error>(session_summary(&orchestrator))
    });

    match result {
        Ok(summary) => CommandResult::success("chat", summary),
        Err(error) => CommandResult::failure("chat", FailureClass::TerminalIo, error.to_string()),
    }
}

pub fn build_orchestrator(config: &AppConfig) -> Orchestrator {
    let service = Arc::new(MockAdsService::from_config(&config.services.faults));
    Orchestrator::from_config(config, Arc::new(RuleFieldExtractor::new()), service.clone(), service)
}

/// Reads one turn per line until `exit` or end of input.
///
/// An abort raised while waiting for input only prints a notice; the
/// conversation keeps going until the user exits.
pub async fn converse<R, W>(
    orchestrator: &mut Orchestrator,
    input: R,
    output: &mut W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let abort = orchestrator.abort_handle();
    let greeting = orchestrator.greet();
    write_block(output, &greeting.message).await?;

    let mut lines = input.lines();
    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = abort.triggered() => {
                abort.reset();
                write_block(output, "\n(interrupted; type `exit` to quit)").await?;
                continue;
            }
        };
        let Some(line) = line else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        let reply = orchestrator.handle_turn(text).await;
        write_block(output, &reply.message).await?;
        if reply.kind == ReplyKind::Exit {
            break;
        }
    }
    Ok(())
}

fn session_summary(orchestrator: &Orchestrator) -> String {
    let draft = orchestrator.draft();
    let campaign_id =
        draft.campaign_id.as_ref().map(|id| id.to_string()).unwrap_or_else(|| "<none>".into());
    format!(
        "conversation {} ended (status: {:?}, campaign_id: {campaign_id}, turns: {})",
        orchestrator.conversation_id().0,
        draft.status,
        orchestrator.history().len()
    )
}

async fn write_block<W>(output: &mut W, message: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    output.write_all(message.as_bytes()).await?;
    output.write_all(b"\n\n").await?;
    output.flush().await
}
