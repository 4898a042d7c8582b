// Console transport - translates parsed lines into pipeline calls and the
// results into JSON lines for stdout.

use super::commands::{parse_line, AdminCommand, ConsoleCommand};
use crate::core::moderation::{ChatMessage, Clock, ModerationPipeline};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct ConsoleTransport<C: Clock> {
    pipeline: Arc<ModerationPipeline<C>>,
    clock: C,
    next_message_id: AtomicU64,
}

impl<C: Clock> ConsoleTransport<C> {
    pub fn new(pipeline: Arc<ModerationPipeline<C>>, clock: C) -> Self {
        Self {
            pipeline,
            clock,
            next_message_id: AtomicU64::new(1),
        }
    }

    /// Handle one input line. Returns the JSON to print, or `None` for blank input.
    pub fn handle_line(&self, line: &str) -> Option<Value> {
        let output = match parse_line(line)? {
            Ok(ConsoleCommand::Chat {
                user_id,
                user_name,
                content,
            }) => self.handle_chat(user_id, user_name, content),
            Ok(ConsoleCommand::Admin(command)) => self.handle_admin(command),
            Err(e) => error_json(e),
        };
        Some(output)
    }

    fn handle_chat(&self, user_id: String, user_name: String, content: String) -> Value {
        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        let message = ChatMessage {
            id: id.to_string(),
            user_id,
            user_name,
            content,
            timestamp: self.clock.now(),
        };

        match self.pipeline.moderate_message(&message) {
            Ok(decision) => {
                if !decision.allowed {
                    // Only the sender would see this; viewers see nothing
                    let secs = decision
                        .action
                        .as_ref()
                        .and_then(|a| a.duration)
                        .map(|d| d.as_secs())
                        .unwrap_or(0);
                    tracing::info!(
                        user_id = %message.user_id,
                        "Private notice: you are muted for {} more seconds",
                        secs
                    );
                }
                to_json(&decision)
            }
            Err(e) => error_json(e),
        }
    }

    fn handle_admin(&self, command: AdminCommand) -> Value {
        let pipeline = &self.pipeline;
        match command {
            AdminCommand::Mute {
                user_id,
                duration,
                reason,
            } => match pipeline.mute_user(&user_id, duration, &reason) {
                Ok(record) => to_json(&record),
                Err(e) => error_json(e),
            },
            AdminCommand::Unmute { user_id } => {
                json!({ "user_id": user_id, "unmuted": pipeline.unmute_user(&user_id) })
            }
            AdminCommand::Violations { user_id } => to_json(&pipeline.get_user_violations(&user_id)),
            AdminCommand::State { user_id } => to_json(&pipeline.get_user_state(&user_id)),
            AdminCommand::Muted => to_json(&pipeline.list_muted_users()),
            AdminCommand::Clear { user_id } => {
                json!({ "user_id": user_id, "cleared": pipeline.clear_user_violations(&user_id) })
            }
            AdminCommand::Rules => {
                let rules: Vec<Value> = pipeline
                    .list_rules()
                    .into_iter()
                    .map(|(id, spec)| json!({ "id": id, "rule": spec }))
                    .collect();
                Value::Array(rules)
            }
            AdminCommand::AddRule(spec) => match pipeline.add_rule(spec) {
                Ok(id) => json!({ "rule_id": id }),
                Err(e) => error_json(e),
            },
            AdminCommand::RemoveRule(id) => match pipeline.remove_rule(id) {
                Ok(spec) => json!({ "removed": { "id": id, "rule": spec } }),
                Err(e) => error_json(e),
            },
            AdminCommand::Reset => {
                pipeline.reset();
                json!({ "reset": true })
            }
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| error_json(e))
}

fn error_json(error: impl std::fmt::Display) -> Value {
    json!({ "error": error.to_string() })
}
