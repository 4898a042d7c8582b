// Console command parsing.
//
// A line is either a chat message (`user_id|user_name|content`) or an
// administrative command starting with `/`.

use crate::core::moderation::{RuleId, RuleSpec};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("Expected `user_id|user_name|content` or a /command")]
    MalformedMessage,

    #[error("Unknown command: /{0}")]
    UnknownCommand(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid rule JSON: {0}")]
    InvalidRuleJson(String),
}

/// Administrative commands, one per moderation-dashboard operation.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminCommand {
    Mute {
        user_id: String,
        duration: Duration,
        reason: String,
    },
    Unmute {
        user_id: String,
    },
    Violations {
        user_id: String,
    },
    State {
        user_id: String,
    },
    Muted,
    Clear {
        user_id: String,
    },
    Rules,
    AddRule(RuleSpec),
    RemoveRule(RuleId),
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Chat {
        user_id: String,
        user_name: String,
        content: String,
    },
    Admin(AdminCommand),
}

const MUTE_USAGE: &str = "/mute <user_id> <seconds> [reason]";
const DEFAULT_MANUAL_MUTE_REASON: &str = "Muted by moderator";

/// Parse one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<Result<ConsoleCommand, CommandError>> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    Some(match line.strip_prefix('/') {
        Some(command) => parse_admin(command).map(ConsoleCommand::Admin),
        None => parse_chat(line),
    })
}

fn parse_chat(line: &str) -> Result<ConsoleCommand, CommandError> {
    let mut parts = line.splitn(3, '|');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(user_id), Some(user_name), Some(content)) => Ok(ConsoleCommand::Chat {
            user_id: user_id.trim().to_string(),
            user_name: user_name.trim().to_string(),
            // Content is passed through as typed; the pipeline decides what is blank
            content: content.to_string(),
        }),
        _ => Err(CommandError::MalformedMessage),
    }
}

fn parse_admin(command: &str) -> Result<AdminCommand, CommandError> {
    let command = command.trim();
    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map(|(n, r)| (n, r.trim()))
        .unwrap_or((command, ""));

    let user_arg = |usage: &'static str| {
        let user_id = rest.split_whitespace().next().ok_or(CommandError::Usage(usage))?;
        Ok::<String, CommandError>(user_id.to_string())
    };

    match name {
        "mute" => {
            let mut parts = rest.splitn(3, char::is_whitespace);
            let user_id = parts.next().filter(|s| !s.is_empty());
            let secs = parts.next().and_then(|s| s.parse::<u64>().ok());
            match (user_id, secs) {
                (Some(user_id), Some(secs)) => {
                    let reason = parts
                        .next()
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .unwrap_or(DEFAULT_MANUAL_MUTE_REASON);
                    Ok(AdminCommand::Mute {
                        user_id: user_id.to_string(),
                        duration: Duration::from_secs(secs),
                        reason: reason.to_string(),
                    })
                }
                _ => Err(CommandError::Usage(MUTE_USAGE)),
            }
        }
        "unmute" => Ok(AdminCommand::Unmute {
            user_id: user_arg("/unmute <user_id>")?,
        }),
        "violations" => Ok(AdminCommand::Violations {
            user_id: user_arg("/violations <user_id>")?,
        }),
        "state" => Ok(AdminCommand::State {
            user_id: user_arg("/state <user_id>")?,
        }),
        "clear" => Ok(AdminCommand::Clear {
            user_id: user_arg("/clear <user_id>")?,
        }),
        "muted" => Ok(AdminCommand::Muted),
        "rules" => Ok(AdminCommand::Rules),
        "reset" => Ok(AdminCommand::Reset),
        "addrule" => {
            if rest.is_empty() {
                return Err(CommandError::Usage("/addrule <rule json>"));
            }
            serde_json::from_str(rest)
                .map(AdminCommand::AddRule)
                .map_err(|e| CommandError::InvalidRuleJson(e.to_string()))
        }
        "removerule" => rest
            .parse::<RuleId>()
            .map(AdminCommand::RemoveRule)
            .map_err(|_| CommandError::Usage("/removerule <rule_id>")),
        other => Err(CommandError::UnknownCommand(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::RuleAction;

    fn parse(line: &str) -> Result<ConsoleCommand, CommandError> {
        parse_line(line).expect("line should not be blank")
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   \n").is_none());
    }

    #[test]
    fn test_chat_line_keeps_pipes_in_content() {
        assert_eq!(
            parse("u1|Alice|a | b"),
            Ok(ConsoleCommand::Chat {
                user_id: "u1".to_string(),
                user_name: "Alice".to_string(),
                content: "a | b".to_string(),
            })
        );
        assert_eq!(parse("just text"), Err(CommandError::MalformedMessage));
    }

    #[test]
    fn test_mute_command() {
        assert_eq!(
            parse("/mute u1 60 calm down please"),
            Ok(ConsoleCommand::Admin(AdminCommand::Mute {
                user_id: "u1".to_string(),
                duration: Duration::from_secs(60),
                reason: "calm down please".to_string(),
            }))
        );
        assert_eq!(
            parse("/mute u1 60"),
            Ok(ConsoleCommand::Admin(AdminCommand::Mute {
                user_id: "u1".to_string(),
                duration: Duration::from_secs(60),
                reason: DEFAULT_MANUAL_MUTE_REASON.to_string(),
            }))
        );
        assert_eq!(parse("/mute u1 soon"), Err(CommandError::Usage(MUTE_USAGE)));
    }

    #[test]
    fn test_addrule_parses_json() {
        assert_eq!(
            parse(r#"/addrule {"type": "profanity", "action": "warn"}"#),
            Ok(ConsoleCommand::Admin(AdminCommand::AddRule(
                RuleSpec::Profanity {
                    action: RuleAction::Warn
                }
            )))
        );
        assert!(matches!(
            parse("/addrule {nope"),
            Err(CommandError::InvalidRuleJson(_))
        ));
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(
            parse("/removerule 3"),
            Ok(ConsoleCommand::Admin(AdminCommand::RemoveRule(3)))
        );
        assert_eq!(parse("/muted"), Ok(ConsoleCommand::Admin(AdminCommand::Muted)));
        assert_eq!(
            parse("/unmute"),
            Err(CommandError::Usage("/unmute <user_id>"))
        );
        assert_eq!(
            parse("/ban u1"),
            Err(CommandError::UnknownCommand("ban".to_string()))
        );
    }
}
