//! Control tokens that bypass field extraction.

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    Help,
    Review,
    Restart,
    Cancel,
    Upload { filename: Option<String> },
    Submit,
    /// `yes` / `confirm`; only acts as a submit while reviewing the summary.
    Confirm,
    Exit,
}

impl ControlCommand {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Review => "review",
            Self::Restart => "restart",
            Self::Cancel => "cancel",
            Self::Upload { .. } => "upload",
            Self::Submit => "submit",
            Self::Confirm => "confirm",
            Self::Exit => "exit",
        }
    }
}

/// Returns `None` when the text is ordinary conversation for the extractor.
///
/// Bare verbs must be the whole message (`review`, `submit!`) so that a
/// sentence such as "restart the music at 0:10" still reaches extraction.
pub fn parse_control_command(input: &str) -> Option<ControlCommand> {
    let trimmed = input.trim();
    let mut parts = trimmed.split_whitespace();
    let verb = parts
        .next()?
        .trim_start_matches('/')
        .trim_end_matches(['!', '.', '?'])
        .to_ascii_lowercase();
    let rest = parts.collect::<Vec<_>>().join(" ");

    if verb == "upload" {
        let filename = rest.trim().trim_matches(['"', '\'']).to_string();
        return Some(ControlCommand::Upload {
            filename: (!filename.is_empty()).then_some(filename),
        });
    }

    if !rest.is_empty() {
        return None;
    }

    let command = match verb.as_str() {
        "help" => ControlCommand::Help,
        "review" | "summary" => ControlCommand::Review,
        "restart" | "reset" => ControlCommand::Restart,
        "cancel" => ControlCommand::Cancel,
        "submit" => ControlCommand::Submit,
        "yes" | "y" | "confirm" => ControlCommand::Confirm,
        "exit" | "quit" => ControlCommand::Exit,
        _ => return None,
    };
    Some(command)
}
