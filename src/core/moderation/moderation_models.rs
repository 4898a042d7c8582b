// Moderation domain models - data structures for the chat moderation pipeline.
//
// These are pure domain types with no transport dependencies.
// The transport layer decides how a decision is shown (or not shown) to viewers.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// MESSAGES
// ============================================================================

/// A chat message as handed to the pipeline by the transport.
///
/// The pipeline never mutates it; it builds a [`FilteredMessage`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// The message the transport may broadcast after moderation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredMessage {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// True when `content` differs from what the user sent.
    pub filtered: bool,
    /// What the user actually sent, kept only when filtering happened.
    pub original_content: Option<String>,
}

impl FilteredMessage {
    /// Build the outgoing message from the original and the working content.
    pub fn from_message(message: &ChatMessage, content: String) -> Self {
        let filtered = content != message.content;
        Self {
            id: message.id.clone(),
            user_id: message.user_id.clone(),
            user_name: message.user_name.clone(),
            original_content: filtered.then(|| message.content.clone()),
            content,
            timestamp: message.timestamp,
            filtered,
        }
    }
}

// ============================================================================
// ACTIONS
// ============================================================================

/// What happened to a user as the result of a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationActionKind {
    Warn,
    Mute,
    Kick,
    Timeout,
}

impl std::fmt::Display for ModerationActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModerationActionKind::Warn => write!(f, "Warn"),
            ModerationActionKind::Mute => write!(f, "Mute"),
            ModerationActionKind::Kick => write!(f, "Kick"),
            ModerationActionKind::Timeout => write!(f, "Timeout"),
        }
    }
}

/// One recorded sanction against a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModerationAction {
    pub user_id: String,
    pub user_name: String,
    pub action: ModerationActionKind,
    pub reason: String,
    /// Only set for time-bounded actions (mute, timeout).
    #[serde(with = "optional_secs")]
    pub duration: Option<Duration>,
    pub timestamp: DateTime<Utc>,
}

/// The per-message verdict returned to the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModerationDecision {
    /// When false the transport must not broadcast `filtered_message`.
    pub allowed: bool,
    pub filtered_message: FilteredMessage,
    /// The first action triggered by this message, if any.
    pub action: Option<ModerationAction>,
}

// ============================================================================
// RULES
// ============================================================================

pub type RuleId = u64;

pub const DEFAULT_CAPS_PATTERN: &str = r"^[A-Z\s!?]{10,}$";
pub const DEFAULT_LINK_PATTERN: &str = r"https?://\S+";

/// Upper bound for every configured or requested duration (100 years).
pub const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// `now + duration`, or `None` when the result does not fit in a timestamp.
pub fn expiry_after(now: DateTime<Utc>, duration: Duration) -> Option<DateTime<Utc>> {
    let delta = chrono::Duration::from_std(duration).ok()?;
    now.checked_add_signed(delta)
}

/// What a rule does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Warn,
    Mute,
    Kick,
    Timeout,
    /// Alter the content only; nothing is counted against the user.
    Filter,
}

impl RuleAction {
    /// The sanction this action records, or `None` for pure filtering.
    pub fn sanction(self) -> Option<ModerationActionKind> {
        match self {
            RuleAction::Warn => Some(ModerationActionKind::Warn),
            RuleAction::Mute => Some(ModerationActionKind::Mute),
            RuleAction::Kick => Some(ModerationActionKind::Kick),
            RuleAction::Timeout => Some(ModerationActionKind::Timeout),
            RuleAction::Filter => None,
        }
    }
}

/// A rule as written in configuration or sent by an administrator.
///
/// Patterns are plain strings here; [`RuleSpec::compile`] turns them into regexes
/// so a bad pattern is rejected when the rule is added, not when a message arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleSpec {
    Profanity {
        action: RuleAction,
    },
    Spam {
        action: RuleAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_secs: Option<u64>,
    },
    Caps {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
        action: RuleAction,
    },
    Links {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
        action: RuleAction,
    },
    Custom {
        name: String,
        pattern: String,
        action: RuleAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_secs: Option<u64>,
    },
}

impl RuleSpec {
    /// Short label used in logs and error messages.
    pub fn label(&self) -> String {
        match self {
            RuleSpec::Profanity { .. } => "profanity".to_string(),
            RuleSpec::Spam { .. } => "spam".to_string(),
            RuleSpec::Caps { .. } => "caps".to_string(),
            RuleSpec::Links { .. } => "links".to_string(),
            RuleSpec::Custom { name, .. } => format!("custom:{}", name),
        }
    }

    /// The rule set used when no configuration says otherwise.
    pub fn default_rules() -> Vec<RuleSpec> {
        vec![
            RuleSpec::Profanity {
                action: RuleAction::Filter,
            },
            RuleSpec::Caps {
                pattern: None,
                action: RuleAction::Warn,
            },
            RuleSpec::Spam {
                action: RuleAction::Warn,
                duration_secs: None,
            },
            RuleSpec::Links {
                pattern: None,
                action: RuleAction::Filter,
            },
        ]
    }
}

/// Compiled rule, one variant per detection mechanism.
#[derive(Debug, Clone)]
pub enum RuleKind {
    /// Always masks; records a warning only when configured with `warn`.
    Profanity {
        warn: bool,
    },
    Spam {
        action: RuleAction,
        duration: Option<Duration>,
    },
    /// Always records a warning on a match.
    Caps {
        pattern: Regex,
    },
    Links {
        pattern: Regex,
        action: RuleAction,
    },
    Custom {
        name: String,
        pattern: Regex,
        action: RuleAction,
        duration: Option<Duration>,
    },
}

/// A rule installed in the engine.
#[derive(Debug, Clone)]
pub struct ModerationRule {
    pub id: RuleId,
    /// Kept so the rule can be listed back exactly as it was added.
    pub spec: RuleSpec,
    pub kind: RuleKind,
}

// ============================================================================
// PER-USER STATE
// ============================================================================

/// Violation history for one user. Created on the first violation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserViolation {
    pub user_id: String,
    pub violations: Vec<ModerationAction>,
    /// Always equal to the number of `Warn` entries in `violations`.
    pub warning_count: u32,
    pub mute_count: u32,
    /// `warning_count` when the last automatic mute was applied
    pub warnings_at_last_mute: u32,
    pub last_violation: DateTime<Utc>,
}

impl UserViolation {
    /// Warnings collected since the last automatic mute.
    pub fn pending_warnings(&self) -> u32 {
        self.warning_count.saturating_sub(self.warnings_at_last_mute)
    }
}

/// An active mute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MuteRecord {
    pub user_id: String,
    pub until: DateTime<Utc>,
    pub reason: String,
}

impl MuteRecord {
    /// A mute is live while `until` is strictly in the future.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.until > now
    }

    /// Whole seconds left, rounded up so a live mute never reports zero.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        let millis = (self.until - now).num_milliseconds().max(0) as u64;
        Duration::from_secs(millis.div_ceil(1000))
    }
}

/// Where a user sits in the escalation path.
///
/// `Clean -> Warned -> Muted -> (expiry) -> Clean`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UserModerationState {
    Clean,
    Warned { warnings: u32 },
    Muted { until: DateTime<Utc>, reason: String },
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Warning-to-mute escalation policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Number of warnings that triggers an automatic mute
    pub warnings_before_mute: u32,
    /// Automatic mute length in seconds
    pub mute_duration_secs: u64,
    /// Reason stored on the automatic mute
    pub mute_reason: String,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            warnings_before_mute: 3, // 3 warnings...
            mute_duration_secs: 300, // ...then a 5 minute mute
            mute_reason: "Repeated violations".to_string(),
        }
    }
}

/// Sliding-window spam detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpamConfig {
    /// Trailing window in seconds
    pub window_secs: u64,
    /// How many recent messages are kept (and needed before flagging)
    pub max_tracked_messages: usize,
    /// Flag when the tracked messages have at most this many distinct contents
    pub max_distinct_messages: usize,
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            window_secs: 10,
            max_tracked_messages: 5,
            max_distinct_messages: 2,
        }
    }
}

/// Everything the pipeline needs at construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    pub escalation: EscalationConfig,
    pub spam: SpamConfig,
    /// Duration attached to rule-produced mute/timeout actions without their own
    pub default_action_duration_secs: u64,
    pub profanity_words: Vec<String>,
    pub rules: Vec<RuleSpec>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            escalation: EscalationConfig::default(),
            spam: SpamConfig::default(),
            default_action_duration_secs: 300,
            profanity_words: default_profanity_words(),
            rules: RuleSpec::default_rules(),
        }
    }
}

pub fn default_profanity_words() -> Vec<String> {
    ["damn", "crap", "shit", "fuck", "bitch", "bastard", "asshole"]
        .iter()
        .map(|w| w.to_string())
        .collect()
}

/// Serialize an optional `Duration` as whole seconds.
mod optional_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }
}
