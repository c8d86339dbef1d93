use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["adwright.toml", "config/adwright.toml"];

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub services: ServicesConfig,
    pub retry: RetryConfig,
    pub conversation: ConversationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServicesConfig {
    pub call_timeout_ms: u64,
    pub faults: FaultConfig,
}

/// Fault injection for the mocked ads service. Rates are probabilities in `0.0..=1.0`.
#[derive(Clone, Debug, PartialEq)]
pub struct FaultConfig {
    pub seed: Option<u64>,
    pub attachment_failure_rate: f64,
    pub submission_failure_rate: f64,
    pub rate_limit_rate: f64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConversationConfig {
    pub min_confidence: f64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub call_timeout_ms: Option<u64>,
    pub fault_seed: Option<u64>,
    pub max_retries: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            services: ServicesConfig {
                call_timeout_ms: 5_000,
                faults: FaultConfig {
                    seed: None,
                    attachment_failure_rate: 0.0,
                    submission_failure_rate: 0.0,
                    rate_limit_rate: 0.0,
                },
            },
            retry: RetryConfig { max_retries: 3, base_delay_ms: 250, max_delay_ms: 4_000 },
            conversation: ConversationConfig { min_confidence: 0.5 },
            logging: LoggingConfig { level: "warn".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATHS[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(services) = patch.services {
            if let Some(call_timeout_ms) = services.call_timeout_ms {
                self.services.call_timeout_ms = call_timeout_ms;
            }
            if let Some(faults) = services.faults {
                if let Some(seed) = faults.seed {
                    self.services.faults.seed = Some(seed);
                }
                if let Some(rate) = faults.attachment_failure_rate {
                    self.services.faults.attachment_failure_rate = rate;
                }
                if let Some(rate) = faults.submission_failure_rate {
                    self.services.faults.submission_failure_rate = rate;
                }
                if let Some(rate) = faults.rate_limit_rate {
                    self.services.faults.rate_limit_rate = rate;
                }
            }
        }

        if let Some(retry) = patch.retry {
            if let Some(max_retries) = retry.max_retries {
                self.retry.max_retries = max_retries;
            }
            if let Some(base_delay_ms) = retry.base_delay_ms {
                self.retry.base_delay_ms = base_delay_ms;
            }
            if let Some(max_delay_ms) = retry.max_delay_ms {
                self.retry.max_delay_ms = max_delay_ms;
            }
        }

        if let Some(conversation) = patch.conversation {
            if let Some(min_confidence) = conversation.min_confidence {
                self.conversation.min_confidence = min_confidence;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ADWRIGHT_SERVICES_CALL_TIMEOUT_MS") {
            self.services.call_timeout_ms = parse_u64("ADWRIGHT_SERVICES_CALL_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("ADWRIGHT_FAULTS_SEED") {
            self.services.faults.seed = Some(parse_u64("ADWRIGHT_FAULTS_SEED", &value)?);
        }
        if let Some(value) = read_env("ADWRIGHT_FAULTS_ATTACHMENT_FAILURE_RATE") {
            self.services.faults.attachment_failure_rate =
                parse_f64("ADWRIGHT_FAULTS_ATTACHMENT_FAILURE_RATE", &value)?;
        }
        if let Some(value) = read_env("ADWRIGHT_FAULTS_SUBMISSION_FAILURE_RATE") {
            self.services.faults.submission_failure_rate =
                parse_f64("ADWRIGHT_FAULTS_SUBMISSION_FAILURE_RATE", &value)?;
        }
        if let Some(value) = read_env("ADWRIGHT_FAULTS_RATE_LIMIT_RATE") {
            self.services.faults.rate_limit_rate =
                parse_f64("ADWRIGHT_FAULTS_RATE_LIMIT_RATE", &value)?;
        }

        if let Some(value) = read_env("ADWRIGHT_RETRY_MAX_RETRIES") {
            self.retry.max_retries = parse_u32("ADWRIGHT_RETRY_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("ADWRIGHT_RETRY_BASE_DELAY_MS") {
            self.retry.base_delay_ms = parse_u64("ADWRIGHT_RETRY_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("ADWRIGHT_RETRY_MAX_DELAY_MS") {
            self.retry.max_delay_ms = parse_u64("ADWRIGHT_RETRY_MAX_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("ADWRIGHT_CONVERSATION_MIN_CONFIDENCE") {
            self.conversation.min_confidence =
                parse_f64("ADWRIGHT_CONVERSATION_MIN_CONFIDENCE", &value)?;
        }

        let log_level =
            read_env("ADWRIGHT_LOGGING_LEVEL").or_else(|| read_env("ADWRIGHT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ADWRIGHT_LOGGING_FORMAT").or_else(|| read_env("ADWRIGHT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(call_timeout_ms) = overrides.call_timeout_ms {
            self.services.call_timeout_ms = call_timeout_ms;
        }
        if let Some(seed) = overrides.fault_seed {
            self.services.faults.seed = Some(seed);
        }
        if let Some(max_retries) = overrides.max_retries {
            self.retry.max_retries = max_retries;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_services(&self.services)?;
        validate_retry(&self.retry)?;
        validate_conversation(&self.conversation)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_PATHS.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_services(services: &ServicesConfig) -> Result<(), ConfigError> {
    if services.call_timeout_ms == 0 || services.call_timeout_ms > 60_000 {
        return Err(ConfigError::Validation(
            "services.call_timeout_ms must be in range 1..=60000".to_string(),
        ));
    }

    let rates = [
        ("services.faults.attachment_failure_rate", services.faults.attachment_failure_rate),
        ("services.faults.submission_failure_rate", services.faults.submission_failure_rate),
        ("services.faults.rate_limit_rate", services.faults.rate_limit_rate),
    ];
    for (key, rate) in rates {
        if !(0.0..=1.0).contains(&rate) {
            return Err(ConfigError::Validation(format!(
                "{key} must be a probability in range 0.0..=1.0 (got {rate})"
            )));
        }
    }

    Ok(())
}

fn validate_retry(retry: &RetryConfig) -> Result<(), ConfigError> {
    if retry.max_retries > 10 {
        return Err(ConfigError::Validation("retry.max_retries must be at most 10".to_string()));
    }

    if retry.base_delay_ms == 0 {
        return Err(ConfigError::Validation(
            "retry.base_delay_ms must be greater than zero".to_string(),
        ));
    }

    if retry.max_delay_ms < retry.base_delay_ms {
        return Err(ConfigError::Validation(
            "retry.max_delay_ms must be greater than or equal to retry.base_delay_ms".to_string(),
        ));
    }

    Ok(())
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&conversation.min_confidence) {
        return Err(ConfigError::Validation(
            "conversation.min_confidence must be in range 0.0..=1.0".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    services: Option<ServicesPatch>,
    retry: Option<RetryPatch>,
    conversation: Option<ConversationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServicesPatch {
    call_timeout_ms: Option<u64>,
    faults: Option<FaultPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct FaultPatch {
    seed: Option<u64>,
    attachment_failure_rate: Option<f64>,
    submission_failure_rate: Option<f64>,
    rate_limit_rate: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RetryPatch {
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    min_confidence: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_without_any_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;
        ensure(config.retry.max_retries == 3, "default retry budget should be three")?;
        ensure(config.services.faults.seed.is_none(), "default fault seed should be unset")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_ADWRIGHT_SEED", "42");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("adwright.toml");
            fs::write(
                &path,
                r#"
[services.faults]
seed = ${TEST_ADWRIGHT_SEED}
rate_limit_rate = 0.25
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.services.faults.seed == Some(42), "seed should come from environment")?;
            ensure(
                (config.services.faults.rate_limit_rate - 0.25).abs() < f64::EPSILON,
                "rate limit rate should come from file",
            )
        })();

        clear_vars(&["TEST_ADWRIGHT_SEED"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ADWRIGHT_LOG_LEVEL", "debug");
        env::set_var("ADWRIGHT_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "debug", "debug log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )
        })();

        clear_vars(&["ADWRIGHT_LOG_LEVEL", "ADWRIGHT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ADWRIGHT_RETRY_BASE_DELAY_MS", "50");
        env::set_var("ADWRIGHT_RETRY_MAX_RETRIES", "5");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("adwright.toml");
            fs::write(
                &path,
                r#"
[retry]
max_retries = 1
base_delay_ms = 500
max_delay_ms = 2000

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    max_retries: Some(2),
                    log_level: Some("trace".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.retry.max_retries == 2, "override retry budget should win")?;
            ensure(config.logging.level == "trace", "overridden log level should be trace")?;
            ensure(config.retry.base_delay_ms == 50, "env base delay should win over file")?;
            ensure(config.retry.max_delay_ms == 2000, "file max delay should win over default")
        })();

        clear_vars(&["ADWRIGHT_RETRY_BASE_DELAY_MS", "ADWRIGHT_RETRY_MAX_RETRIES"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ADWRIGHT_FAULTS_SUBMISSION_FAILURE_RATE", "1.5");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message)
                    if message.contains("services.faults.submission_failure_rate")
            );
            ensure(has_message, "validation failure should name the offending rate")
        })();

        clear_vars(&["ADWRIGHT_FAULTS_SUBMISSION_FAILURE_RATE"]);
        result
    }

    #[test]
    fn malformed_env_number_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("ADWRIGHT_SERVICES_CALL_TIMEOUT_MS", "soon");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => ensure(
                key == "ADWRIGHT_SERVICES_CALL_TIMEOUT_MS",
                "invalid override should name the env var",
            ),
            _ => Err("expected invalid env override error".to_string()),
        };

        clear_vars(&["ADWRIGHT_SERVICES_CALL_TIMEOUT_MS"]);
        result
    }

    #[test]
    fn missing_required_file_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("absent.toml");
        let result = AppConfig::load(LoadOptions {
            config_path: Some(path),
            require_file: true,
            ..LoadOptions::default()
        });
        ensure(
            matches!(result, Err(ConfigError::MissingConfigFile(_))),
            "missing required file should fail",
        )
    }
}
