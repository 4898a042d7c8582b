// Moderation pipeline - core business logic for per-message moderation.
//
// This service handles:
// - Running the rule list over every message (profanity, spam, caps, links, custom)
// - Recording violations per user
// - Warning escalation (3 warnings -> 5 minute mute by default)
// - Denying messages from muted users
//
// NO transport dependencies here - just pure domain logic.

use super::moderation_models::{
    ChatMessage, FilteredMessage, ModerationAction, ModerationActionKind, ModerationConfig,
    ModerationDecision, MuteRecord, RuleId, RuleSpec, UserModerationState, UserViolation,
    MAX_DURATION_SECS,
};
use super::mute_store::MuteStore;
use super::rule_engine::RuleEngine;
use super::violation_tracker::ViolationTracker;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const MUTED_REASON: &str = "User is muted";

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("No rule with id {0}")]
    RuleNotFound(RuleId),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

// ============================================================================
// CLOCK TRAIT (PORT)
// ============================================================================

/// Source of "now" for the pipeline.
///
/// Mute expiry and the spam window are both plain timestamps, so swapping the
/// clock is all it takes to replay a conversation deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// Moderation pipeline: one instance per process (or per room, if the owner
/// wants room-scoped moderation), shared behind an `Arc`.
///
/// All state for one user is mutated under that user's lock, so two messages
/// from the same user never interleave. Different users run in parallel.
pub struct ModerationPipeline<C: Clock> {
    clock: C,
    config: ModerationConfig,
    rules: RuleEngine,
    violations: ViolationTracker,
    mutes: MuteStore,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<C: Clock> ModerationPipeline<C> {
    /// Create a pipeline from `config`, compiling its rules up front.
    pub fn new(config: ModerationConfig, clock: C) -> Result<Self, ModerationError> {
        validate_config(&config)?;
        let rules = RuleEngine::new(&config)?;

        tracing::info!(
            rules = config.rules.len(),
            profanity_words = config.profanity_words.len(),
            warnings_before_mute = config.escalation.warnings_before_mute,
            "Moderation pipeline ready"
        );

        Ok(Self {
            clock,
            config,
            rules,
            violations: ViolationTracker::new(),
            mutes: MuteStore::new(),
            user_locks: DashMap::new(),
        })
    }

    pub fn config(&self) -> &ModerationConfig {
        &self.config
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        // Clone the Arc out so the map shard is released before we block on the mutex
        Arc::clone(
            self.user_locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Moderate one message.
    ///
    /// # Returns
    /// A decision the transport acts on: broadcast `filtered_message` when
    /// `allowed`, drop it otherwise.
    ///
    /// # Errors
    /// `InvalidMessage` for an empty user id or blank content. Nothing is
    /// recorded in that case. `InvalidDuration` if the escalation mute cannot
    /// be scheduled, which a validated config rules out.
    pub fn moderate_message(
        &self,
        message: &ChatMessage,
    ) -> Result<ModerationDecision, ModerationError> {
        if message.user_id.is_empty() {
            return Err(ModerationError::InvalidMessage("missing user id".to_string()));
        }
        if message.content.trim().is_empty() {
            return Err(ModerationError::InvalidMessage("empty content".to_string()));
        }

        let lock = self.user_lock(&message.user_id);
        let _guard = lock.lock();
        let now = self.clock.now();

        // 1-6. Run the rules in order
        let evaluation = self.rules.evaluate(message, now);

        // 7. Record what they produced
        let new_warnings = evaluation
            .actions
            .iter()
            .filter(|a| a.action == ModerationActionKind::Warn)
            .count();
        let record = self
            .violations
            .record(&message.user_id, &evaluation.actions, now);

        // 8. Escalate once the user has collected enough warnings
        if let Some(record) = &record {
            let threshold = self.config.escalation.warnings_before_mute;
            if new_warnings > 0 && record.warning_count >= threshold {
                self.escalate(message, record.warning_count, now)?;
            }
        }

        let filtered_message = FilteredMessage::from_message(message, evaluation.content);

        // 9. Muted users are denied
        if let Some(mute) = self.mutes.get(&message.user_id, now) {
            tracing::warn!(
                user_id = %message.user_id,
                message_id = %message.id,
                until = %mute.until,
                "Message denied: user is muted"
            );
            return Ok(ModerationDecision {
                allowed: false,
                filtered_message,
                action: Some(ModerationAction {
                    user_id: message.user_id.clone(),
                    user_name: message.user_name.clone(),
                    action: ModerationActionKind::Mute,
                    reason: MUTED_REASON.to_string(),
                    duration: Some(mute.remaining_at(now)),
                    timestamp: now,
                }),
            });
        }

        // 10. Allowed, possibly filtered
        Ok(ModerationDecision {
            allowed: true,
            filtered_message,
            action: evaluation.actions.into_iter().next(),
        })
    }

    /// Apply the automatic mute. Caller holds the user's lock.
    fn escalate(
        &self,
        message: &ChatMessage,
        warnings: u32,
        now: DateTime<Utc>,
    ) -> Result<(), ModerationError> {
        let escalation = &self.config.escalation;
        let duration = Duration::from_secs(escalation.mute_duration_secs);
        let record = self
            .mutes
            .mute(&message.user_id, duration, &escalation.mute_reason, now)?;

        self.violations.record_escalation(
            &message.user_id,
            ModerationAction {
                user_id: message.user_id.clone(),
                user_name: message.user_name.clone(),
                action: ModerationActionKind::Mute,
                reason: escalation.mute_reason.clone(),
                duration: Some(duration),
                timestamp: now,
            },
            now,
        );

        tracing::info!(
            user_id = %message.user_id,
            warnings,
            until = %record.until,
            "User muted after repeated violations"
        );
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Administrative operations
    // ------------------------------------------------------------------------

    /// Add a rule at the end of the list. Bad patterns are rejected here.
    pub fn add_rule(&self, spec: RuleSpec) -> Result<RuleId, ModerationError> {
        let label = spec.label();
        let id = self.rules.add_rule(spec)?;
        tracing::info!(rule_id = id, rule = %label, "Rule added");
        Ok(id)
    }

    pub fn remove_rule(&self, id: RuleId) -> Result<RuleSpec, ModerationError> {
        let removed = self.rules.remove_rule(id)?;
        tracing::info!(rule_id = id, rule = %removed.label(), "Rule removed");
        Ok(removed)
    }

    pub fn list_rules(&self) -> Vec<(RuleId, RuleSpec)> {
        self.rules.list_rules()
    }

    /// Manually mute a user, replacing any current mute.
    ///
    /// # Errors
    /// `InvalidDuration` for durations over `MAX_DURATION_SECS`. The current
    /// mute, if any, is left alone.
    pub fn mute_user(
        &self,
        user_id: &str,
        duration: Duration,
        reason: &str,
    ) -> Result<MuteRecord, ModerationError> {
        if duration.as_secs() > MAX_DURATION_SECS {
            return Err(ModerationError::InvalidDuration(format!(
                "{}s exceeds the maximum of {}s",
                duration.as_secs(),
                MAX_DURATION_SECS
            )));
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock();

        let record = self.mutes.mute(user_id, duration, reason, self.clock.now())?;
        tracing::info!(user_id, until = %record.until, reason, "User muted by moderator");
        Ok(record)
    }

    /// Lift a mute. Unmuting someone who is not muted is a no-op.
    pub fn unmute_user(&self, user_id: &str) -> bool {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock();

        let removed = self.mutes.unmute(user_id);
        if removed {
            tracing::info!(user_id, "User unmuted");
        }
        removed
    }

    pub fn is_user_muted(&self, user_id: &str) -> bool {
        self.mutes.is_muted(user_id, self.clock.now())
    }

    pub fn get_user_violations(&self, user_id: &str) -> Option<UserViolation> {
        self.violations.get(user_id)
    }

    /// Where the user sits in `Clean -> Warned -> Muted`.
    ///
    /// Only warnings received since the last automatic mute count towards
    /// `Warned`, so a lapsed mute reads as `Clean`.
    pub fn get_user_state(&self, user_id: &str) -> UserModerationState {
        if let Some(mute) = self.mutes.get(user_id, self.clock.now()) {
            return UserModerationState::Muted {
                until: mute.until,
                reason: mute.reason,
            };
        }
        match self.violations.get(user_id) {
            Some(record) if record.pending_warnings() > 0 => UserModerationState::Warned {
                warnings: record.pending_warnings(),
            },
            _ => UserModerationState::Clean,
        }
    }

    /// Live mutes, ordered by user id. Expired records are evicted while listing.
    pub fn list_muted_users(&self) -> Vec<MuteRecord> {
        self.mutes.list_active(self.clock.now())
    }

    /// Forget a user's violations and spam window. An active mute stays.
    pub fn clear_user_violations(&self, user_id: &str) -> bool {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock();

        self.rules.clear_user(user_id);
        let cleared = self.violations.clear_user(user_id);
        tracing::info!(user_id, cleared, "User violations cleared");
        cleared
    }

    /// Drop expired mutes. Correctness never depends on this; it only keeps
    /// the map from holding dead records for users who went quiet.
    pub fn sweep_expired_mutes(&self) -> usize {
        let swept = self.mutes.sweep(self.clock.now());
        if swept > 0 {
            tracing::debug!(swept, "Expired mutes swept");
        }
        swept
    }

    /// Clear all per-user state. Rules are kept.
    ///
    /// The per-user locks survive, so a message already in flight still
    /// serializes with the ones that follow the reset.
    ///
    /// For tests and administrative resets only, never the message path.
    pub fn reset(&self) {
        self.rules.clear_state();
        self.violations.clear();
        self.mutes.clear();
        tracing::warn!("Moderation state reset");
    }
}

fn validate_config(config: &ModerationConfig) -> Result<(), ModerationError> {
    if config.escalation.warnings_before_mute == 0 {
        return Err(ModerationError::ConfigError(
            "warnings_before_mute must be at least 1".to_string(),
        ));
    }
    if config.spam.window_secs == 0 {
        return Err(ModerationError::ConfigError(
            "spam window_secs must be at least 1".to_string(),
        ));
    }
    if config.spam.max_tracked_messages == 0 {
        return Err(ModerationError::ConfigError(
            "spam max_tracked_messages must be at least 1".to_string(),
        ));
    }

    let durations = [
        ("spam window_secs", config.spam.window_secs),
        ("mute_duration_secs", config.escalation.mute_duration_secs),
        ("default_action_duration_secs", config.default_action_duration_secs),
    ];
    for (name, secs) in durations {
        if secs > MAX_DURATION_SECS {
            return Err(ModerationError::ConfigError(format!(
                "{} must be at most {}",
                name, MAX_DURATION_SECS
            )));
        }
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
