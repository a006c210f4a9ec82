//! Parsing of lines typed at the prompt.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Older,
    Edit { id: String, text: String },
    Delete { id: String },
    Help,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: /{0} (try /help)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &str = "\
commands:
  <text>             send a message
  /older             load older messages
  /edit <id> <text>  edit one of the visible messages
  /delete <id>       delete a message
  /help              show this help
  /quit              leave the room";

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Ok(Some(Command::Send(line.trim_end_matches(&['\r', '\n'][..]).to_string())));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    let command = match name {
        "older" => Command::Older,
        "edit" => {
            let (id, text) = args
                .split_once(char::is_whitespace)
                .map(|(id, text)| (id, text.trim()))
                .filter(|(_, text)| !text.is_empty())
                .ok_or(CommandError::Usage("/edit <id> <text>"))?;
            Command::Edit {
                id: id.to_string(),
                text: text.to_string(),
            }
        }
        "delete" => {
            if args.is_empty() || args.contains(char::is_whitespace) {
                return Err(CommandError::Usage("/delete <id>"));
            }
            Command::Delete {
                id: args.to_string(),
            }
        }
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}
