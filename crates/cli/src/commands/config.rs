use std::env;
use std::fs;
use std::path::Path;

use adwright_core::config::{resolve_config_path, AppConfig, ConfigOverrides, LoadOptions};
use toml::Value;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
    override_flag: Option<&'static str>,
}

pub fn run(options: LoadOptions) -> String {
    let config_path = resolve_config_path(options.config_path.as_deref());
    let overrides = options.overrides.clone();
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_doc = load_config_file_doc(config_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    for field in fields(&config, &overrides) {
        let source = field_source(&field, config_file_doc.as_ref(), config_path.as_deref());
        lines.push(render_line(field.key, &field.value, source));
    }
    lines.join("\n")
}

fn fields(config: &AppConfig, overrides: &ConfigOverrides) -> Vec<Field> {
    let faults = &config.services.faults;
    vec![
        Field {
            key: "services.call_timeout_ms",
            value: config.services.call_timeout_ms.to_string(),
            env_keys: &["ADWRIGHT_SERVICES_CALL_TIMEOUT_MS"],
            override_flag: overrides.call_timeout_ms.map(|_| "--call-timeout-ms"),
        },
        Field {
            key: "services.faults.seed",
            value: faults.seed.map(|seed| seed.to_string()).unwrap_or_else(|| "<entropy>".into()),
            env_keys: &["ADWRIGHT_FAULTS_SEED"],
            override_flag: overrides.fault_seed.map(|_| "--fault-seed"),
        },
        Field {
            key: "services.faults.attachment_failure_rate",
            value: faults.attachment_failure_rate.to_string(),
            env_keys: &["ADWRIGHT_FAULTS_ATTACHMENT_FAILURE_RATE"],
            override_flag: None,
        },
        Field {
            key: "services.faults.submission_failure_rate",
            value: faults.submission_failure_rate.to_string(),
            env_keys: &["ADWRIGHT_FAULTS_SUBMISSION_FAILURE_RATE"],
            override_flag: None,
        },
        Field {
            key: "services.faults.rate_limit_rate",
            value: faults.rate_limit_rate.to_string(),
            env_keys: &["ADWRIGHT_FAULTS_RATE_LIMIT_RATE"],
            override_flag: None,
        },
        Field {
            key: "retry.max_retries",
            value: config.retry.max_retries.to_string(),
            env_keys: &["ADWRIGHT_RETRY_MAX_RETRIES"],
            override_flag: overrides.max_retries.map(|_| "--max-retries"),
        },
        Field {
            key: "retry.base_delay_ms",
            value: config.retry.base_delay_ms.to_string(),
            env_keys: &["ADWRIGHT_RETRY_BASE_DELAY_MS"],
            override_flag: None,
        },
        Field {
            key: "retry.max_delay_ms",
            value: config.retry.max_delay_ms.to_string(),
            env_keys: &["ADWRIGHT_RETRY_MAX_DELAY_MS"],
            override_flag: None,
        },
        Field {
            key: "conversation.min_confidence",
            value: config.conversation.min_confidence.to_string(),
            env_keys: &["ADWRIGHT_CONVERSATION_MIN_CONFIDENCE"],
            override_flag: None,
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["ADWRIGHT_LOGGING_LEVEL", "ADWRIGHT_LOG_LEVEL"],
            override_flag: overrides.log_level.as_ref().map(|_| "--log-level"),
        },
        Field {
            key: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["ADWRIGHT_LOGGING_FORMAT", "ADWRIGHT_LOG_FORMAT"],
            override_flag: overrides.log_format.map(|_| "--log-format"),
        },
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    field: &Field,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(flag) = field.override_flag {
        return format!("flag ({flag})");
    }

    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, field.key) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::contains_path;

    #[test]
    fn nested_keys_are_found_in_file_document() {
        let doc = "[services.faults]\nseed = 7\n".parse::<Value>().expect("valid toml");
        assert!(contains_path(&doc, "services.faults.seed"));
        assert!(!contains_path(&doc, "services.call_timeout_ms"));
    }
}
