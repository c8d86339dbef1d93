pub mod chat;
pub mod config;
pub mod smoke;

use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

/// Why a command stopped before its session or report could finish.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    ConfigValidation,
    Runtime,
    TerminalIo,
}

impl FailureClass {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::ConfigValidation => 2,
            Self::Runtime | Self::TerminalIo => 1,
        }
    }
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<FailureClass>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload =
            CommandOutcome { command, status: "ok", error_class: None, message: message.into() };
        Self { exit_code: 0, output: serialize_payload(&payload) }
    }

    pub fn failure(command: &str, class: FailureClass, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command,
            status: "error",
            error_class: Some(class),
            message: message.into(),
        };
        Self { exit_code: class.exit_code(), output: serialize_payload(&payload) }
    }
}

fn serialize_payload(payload: &CommandOutcome<'_>) -> String {
    serde_json::to_string(payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"{}\",\"status\":\"error\",\"message\":\"{}\"}}",
            payload.command,
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::{CommandResult, FailureClass};

    #[test]
    fn failure_payload_names_the_class_and_sets_exit_code() {
        let result =
            CommandResult::failure("chat", FailureClass::ConfigValidation, "retry.max_retries");
        assert_eq!(result.exit_code, 2);

        let payload: Value = serde_json::from_str(&result.output).expect("json payload");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    }

    #[test]
    fn success_payload_omits_the_class() {
        let result = CommandResult::success("chat", "conversation ended");
        let payload: Value = serde_json::from_str(&result.output).expect("json payload");
        assert_eq!(result.exit_code, 0);
        assert!(payload.get("error_class").is_none());
    }
}
