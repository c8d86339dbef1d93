pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use adwright_core::config::{ConfigOverrides, LoadOptions, LogFormat};
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "adwright",
    about = "Conversational ad campaign builder",
    long_about = "Build ad campaigns through a guided conversation, inspect effective configuration, and run scripted smoke conversations.",
    after_help = "Examples:\n  adwright chat\n  adwright --fault-seed 7 chat\n  adwright config\n  adwright smoke"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    #[arg(long, global = true, value_name = "PATH", help = "Config file (default: adwright.toml or config/adwright.toml)")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Log level: trace|debug|info|warn|error")]
    log_level: Option<String>,
    #[arg(long, global = true, value_parser = parse_log_format, help = "Log format: compact|pretty|json")]
    log_format: Option<LogFormat>,
    #[arg(long, global = true, help = "Timeout for each external service call in milliseconds")]
    call_timeout_ms: Option<u64>,
    #[arg(long, global = true, help = "Seed for the mock service fault injection")]
    fault_seed: Option<u64>,
    #[arg(long, global = true, help = "Retries for transient external failures")]
    max_retries: Option<u32>,
}

impl GlobalArgs {
    fn load_options(self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config,
            overrides: ConfigOverrides {
                log_level: self.log_level,
                log_format: self.log_format,
                call_timeout_ms: self.call_timeout_ms,
                fault_seed: self.fault_seed,
                max_retries: self.max_retries,
            },
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive campaign conversation on stdin/stdout")]
    Chat,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Run scripted conversations against the mock ads service")]
    Smoke,
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse::<LogFormat>().map_err(|error| error.to_string())
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.global.load_options();

    let result = match cli.command {
        Command::Chat => commands::chat::run(options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(options) }
        }
        Command::Smoke => commands::smoke::run(options),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
