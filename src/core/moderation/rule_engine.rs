// Rule engine - the ordered rule list and the per-message evaluation loop.
//
// Rules are read on every message and written only by administrators, so the
// list sits behind an `Arc` snapshot: evaluation clones the `Arc` and never
// holds the lock while it works.

use super::moderation_models::{
    ChatMessage, ModerationAction, ModerationConfig, ModerationRule, RuleAction, RuleId, RuleKind,
    RuleSpec, DEFAULT_CAPS_PATTERN, DEFAULT_LINK_PATTERN, MAX_DURATION_SECS,
};
use super::moderation_service::ModerationError;
use super::profanity_filter::ProfanityFilter;
use super::spam_detector::SpamDetector;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const LINK_REPLACEMENT: &str = "[link removed]";

impl RuleSpec {
    /// Compile patterns so evaluation never has to.
    pub fn compile(&self) -> Result<RuleKind, ModerationError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| ModerationError::InvalidRule {
                rule: self.label(),
                reason: e.to_string(),
            })
        };
        let secs = |d: &Option<u64>| match *d {
            Some(s) if s > MAX_DURATION_SECS => Err(ModerationError::InvalidRule {
                rule: self.label(),
                reason: format!("duration_secs must be at most {}", MAX_DURATION_SECS),
            }),
            other => Ok(other.map(Duration::from_secs)),
        };

        Ok(match self {
            RuleSpec::Profanity { action } => RuleKind::Profanity {
                warn: *action == RuleAction::Warn,
            },
            RuleSpec::Spam {
                action,
                duration_secs,
            } => RuleKind::Spam {
                action: *action,
                duration: secs(duration_secs)?,
            },
            // Caps always warns; the configured action does not change that
            RuleSpec::Caps { pattern, .. } => RuleKind::Caps {
                pattern: compile(pattern.as_deref().unwrap_or(DEFAULT_CAPS_PATTERN))?,
            },
            RuleSpec::Links { pattern, action } => RuleKind::Links {
                pattern: compile(pattern.as_deref().unwrap_or(DEFAULT_LINK_PATTERN))?,
                action: *action,
            },
            RuleSpec::Custom {
                name,
                pattern,
                action,
                duration_secs,
            } => {
                if name.trim().is_empty() {
                    return Err(ModerationError::InvalidRule {
                        rule: self.label(),
                        reason: "custom rules need a name".to_string(),
                    });
                }
                RuleKind::Custom {
                    name: name.clone(),
                    pattern: compile(pattern)?,
                    action: *action,
                    duration: secs(duration_secs)?,
                }
            }
        })
    }
}

/// What the rules made of one message.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEvaluation {
    /// Content after masking/stripping
    pub content: String,
    /// Sanctions in rule order
    pub actions: Vec<ModerationAction>,
}

pub struct RuleEngine {
    rules: RwLock<Arc<Vec<ModerationRule>>>,
    next_id: AtomicU64,
    profanity: ProfanityFilter,
    spam: SpamDetector,
    default_action_duration: Duration,
}

impl RuleEngine {
    /// Build the engine and install `config.rules` in order.
    pub fn new(config: &ModerationConfig) -> Result<Self, ModerationError> {
        let engine = Self {
            rules: RwLock::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
            profanity: ProfanityFilter::new(&config.profanity_words),
            spam: SpamDetector::new(config.spam.clone()),
            default_action_duration: Duration::from_secs(config.default_action_duration_secs),
        };
        for spec in &config.rules {
            engine.add_rule(spec.clone())?;
        }
        Ok(engine)
    }

    /// Append a rule to the end of the list.
    pub fn add_rule(&self, spec: RuleSpec) -> Result<RuleId, ModerationError> {
        let kind = spec.compile()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut rules = self.rules.write();
        let mut updated = Vec::with_capacity(rules.len() + 1);
        updated.extend(rules.iter().cloned());
        updated.push(ModerationRule { id, spec, kind });
        *rules = Arc::new(updated);

        Ok(id)
    }

    /// Remove a rule, keeping the order of the rest.
    pub fn remove_rule(&self, id: RuleId) -> Result<RuleSpec, ModerationError> {
        let mut rules = self.rules.write();
        let position = rules
            .iter()
            .position(|r| r.id == id)
            .ok_or(ModerationError::RuleNotFound(id))?;

        let mut updated: Vec<ModerationRule> = rules.iter().cloned().collect();
        let removed = updated.remove(position);
        *rules = Arc::new(updated);

        Ok(removed.spec)
    }

    pub fn list_rules(&self) -> Vec<(RuleId, RuleSpec)> {
        self.snapshot()
            .iter()
            .map(|r| (r.id, r.spec.clone()))
            .collect()
    }

    fn snapshot(&self) -> Arc<Vec<ModerationRule>> {
        Arc::clone(&self.rules.read())
    }

    /// Run every rule against `message` in list order.
    ///
    /// The spam rule records the message in the detector's window, so this must
    /// be called exactly once per message and under the author's lock.
    pub fn evaluate(&self, message: &ChatMessage, now: DateTime<Utc>) -> RuleEvaluation {
        let mut content = message.content.clone();
        let mut actions = Vec::new();

        for rule in self.snapshot().iter() {
            match &rule.kind {
                RuleKind::Profanity { warn } => {
                    let (matched, masked) = self.profanity.contains(&content);
                    if matched {
                        tracing::debug!(user_id = %message.user_id, rule_id = rule.id, "Profanity matched");
                        content = masked;
                        if *warn {
                            self.push_action(&mut actions, message, RuleAction::Warn, None, "Inappropriate language", now);
                        }
                    }
                }
                RuleKind::Spam { action, duration } => {
                    if self.spam.is_spam(&message.user_id, &message.content, now) {
                        tracing::debug!(user_id = %message.user_id, rule_id = rule.id, "Spam detected");
                        self.push_action(&mut actions, message, *action, *duration, "Spam detected", now);
                    }
                }
                RuleKind::Caps { pattern } => {
                    if pattern.is_match(&message.content) {
                        tracing::debug!(user_id = %message.user_id, rule_id = rule.id, "Excessive caps");
                        self.push_action(&mut actions, message, RuleAction::Warn, None, "Excessive caps", now);
                    }
                }
                RuleKind::Links { pattern, action } => {
                    if pattern.is_match(&content) {
                        tracing::debug!(user_id = %message.user_id, rule_id = rule.id, "Link found");
                        if *action == RuleAction::Filter {
                            content = pattern.replace_all(&content, LINK_REPLACEMENT).into_owned();
                        }
                        self.push_action(&mut actions, message, *action, None, "Links are not allowed", now);
                    }
                }
                RuleKind::Custom {
                    name,
                    pattern,
                    action,
                    duration,
                } => {
                    if pattern.is_match(&content) {
                        tracing::debug!(user_id = %message.user_id, rule_id = rule.id, rule = %name, "Custom rule matched");
                        if *action == RuleAction::Filter {
                            content = pattern
                                .replace_all(&content, |caps: &regex::Captures| {
                                    "*".repeat(caps[0].chars().count())
                                })
                                .into_owned();
                        }
                        let reason = format!("Matched rule '{}'", name);
                        self.push_action(&mut actions, message, *action, *duration, &reason, now);
                    }
                }
            }
        }

        RuleEvaluation { content, actions }
    }

    /// Record a sanction for a fired rule. Filter-only rules record nothing.
    fn push_action(
        &self,
        actions: &mut Vec<ModerationAction>,
        message: &ChatMessage,
        action: RuleAction,
        duration: Option<Duration>,
        reason: &str,
        now: DateTime<Utc>,
    ) {
        let Some(kind) = action.sanction() else {
            return;
        };
        let duration = match action {
            RuleAction::Mute | RuleAction::Timeout => {
                Some(duration.unwrap_or(self.default_action_duration))
            }
            _ => None,
        };
        actions.push(ModerationAction {
            user_id: message.user_id.clone(),
            user_name: message.user_name.clone(),
            action: kind,
            reason: reason.to_string(),
            duration,
            timestamp: now,
        });
    }

    pub fn clear_user(&self, user_id: &str) {
        self.spam.clear_user(user_id);
    }

    /// Forget all spam windows. Rules are left alone.
    pub fn clear_state(&self) {
        self.spam.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::moderation_models::ModerationActionKind;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn message(content: &str) -> ChatMessage {
        ChatMessage {
            id: "m1".to_string(),
            user_id: "u1".to_string(),
            user_name: "alice".to_string(),
            content: content.to_string(),
            timestamp: now(),
        }
    }

    fn engine_with(rules: Vec<RuleSpec>) -> RuleEngine {
        RuleEngine::new(&ModerationConfig {
            rules,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_bad_pattern_fails_at_add_time() {
        let engine = engine_with(vec![]);

        let err = engine
            .add_rule(RuleSpec::Custom {
                name: "broken".to_string(),
                pattern: "([a-z".to_string(),
                action: RuleAction::Warn,
                duration_secs: None,
            })
            .unwrap_err();

        assert!(matches!(err, ModerationError::InvalidRule { ref rule, .. } if rule == "custom:broken"));
        assert!(engine.list_rules().is_empty());
    }

    #[test]
    fn test_rules_keep_insertion_order() {
        let engine = engine_with(RuleSpec::default_rules());
        let extra = engine
            .add_rule(RuleSpec::Profanity {
                action: RuleAction::Warn,
            })
            .unwrap();

        let ids: Vec<RuleId> = engine.list_rules().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, extra]);

        engine.remove_rule(2).unwrap();
        let ids: Vec<RuleId> = engine.list_rules().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 3, 4, extra]);

        assert!(matches!(
            engine.remove_rule(2),
            Err(ModerationError::RuleNotFound(2))
        ));
    }

    #[test]
    fn test_link_filter_replaces_url() {
        let engine = engine_with(vec![RuleSpec::Links {
            pattern: None,
            action: RuleAction::Filter,
        }]);

        let result = engine.evaluate(&message("see https://example.com/x now"), now());

        assert_eq!(result.content, "see [link removed] now");
        assert!(result.actions.is_empty(), "filtering links is not a violation");
    }

    #[test]
    fn test_profanity_warn_masks_and_warns() {
        let engine = engine_with(vec![RuleSpec::Profanity {
            action: RuleAction::Warn,
        }]);

        let result = engine.evaluate(&message("oh damn it"), now());

        assert_eq!(result.content, "oh **** it");
        assert_eq!(result.actions.len(), 1);
        assert_eq!(result.actions[0].action, ModerationActionKind::Warn);
        assert_eq!(result.actions[0].reason, "Inappropriate language");
    }

    #[test]
    fn test_caps_checks_original_content() {
        let engine = engine_with(vec![RuleSpec::Caps {
            pattern: None,
            action: RuleAction::Warn,
        }]);

        assert_eq!(engine.evaluate(&message("HELLO EVERYONE!"), now()).actions.len(), 1);
        assert!(engine.evaluate(&message("Hello everyone"), now()).actions.is_empty());
        assert!(engine.evaluate(&message("HI"), now()).actions.is_empty());
    }

    #[test]
    fn test_custom_timeout_carries_duration() {
        let engine = engine_with(vec![
            RuleSpec::Custom {
                name: "ads".to_string(),
                pattern: "(?i)free crypto".to_string(),
                action: RuleAction::Timeout,
                duration_secs: Some(60),
            },
            RuleSpec::Custom {
                name: "slur".to_string(),
                pattern: "(?i)badword".to_string(),
                action: RuleAction::Mute,
                duration_secs: None,
            },
        ]);

        let result = engine.evaluate(&message("FREE CRYPTO and badword"), now());

        assert_eq!(result.actions.len(), 2);
        assert_eq!(result.actions[0].action, ModerationActionKind::Timeout);
        assert_eq!(result.actions[0].duration, Some(Duration::from_secs(60)));
        assert_eq!(result.actions[0].reason, "Matched rule 'ads'");
        assert_eq!(result.actions[1].action, ModerationActionKind::Mute);
        assert_eq!(result.actions[1].duration, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_caps_always_warns_and_leaves_content() {
        let engine = engine_with(vec![RuleSpec::Caps {
            pattern: None,
            action: RuleAction::Filter,
        }]);

        let result = engine.evaluate(&message("HELLO EVERYONE HOW ARE YOU"), now());

        assert_eq!(result.content, "HELLO EVERYONE HOW ARE YOU");
        assert_eq!(result.actions.len(), 1);
        assert_eq!(result.actions[0].action, ModerationActionKind::Warn);
    }

    #[test]
    fn test_profanity_only_sanctions_with_warn() {
        let engine = engine_with(vec![RuleSpec::Profanity {
            action: RuleAction::Mute,
        }]);

        let result = engine.evaluate(&message("damn"), now());

        assert_eq!(result.content, "****");
        assert!(result.actions.is_empty());
    }

    #[test]
    fn test_oversized_rule_duration_rejected() {
        let engine = engine_with(vec![]);

        let err = engine
            .add_rule(RuleSpec::Spam {
                action: RuleAction::Timeout,
                duration_secs: Some(u64::MAX),
            })
            .unwrap_err();

        assert!(matches!(err, ModerationError::InvalidRule { ref rule, .. } if rule == "spam"));
    }

    #[test]
    fn test_custom_filter_masks_matches() {
        let engine = engine_with(vec![RuleSpec::Custom {
            name: "phone".to_string(),
            pattern: r"\d{3}-\d{4}".to_string(),
            action: RuleAction::Filter,
            duration_secs: None,
        }]);

        let result = engine.evaluate(&message("call 555-1234"), now());

        assert_eq!(result.content, "call ********");
        assert!(result.actions.is_empty());
    }

    #[test]
    fn test_snapshot_survives_concurrent_removal() {
        let engine = engine_with(RuleSpec::default_rules());
        let snapshot = engine.snapshot();

        engine.remove_rule(1).unwrap();

        assert_eq!(snapshot.len(), 4);
        assert_eq!(engine.list_rules().len(), 3);
    }
}
