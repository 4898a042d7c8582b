// Violation tracker - per-user history of sanctions and the counters
// that drive escalation.

use super::moderation_models::{ModerationAction, ModerationActionKind, UserViolation};
use chrono::{DateTime, Utc};
use dashmap::DashMap;

pub struct ViolationTracker {
    /// user_id -> history
    records: DashMap<String, UserViolation>,
}

impl ViolationTracker {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Append `actions` to the user's history and return the updated record.
    ///
    /// An empty slice records nothing and returns whatever already exists, so
    /// users who never misbehave never get an entry.
    pub fn record(
        &self,
        user_id: &str,
        actions: &[ModerationAction],
        now: DateTime<Utc>,
    ) -> Option<UserViolation> {
        if actions.is_empty() {
            return self.get(user_id);
        }

        let mut entry = self
            .records
            .entry(user_id.to_string())
            .or_insert_with(|| UserViolation {
                user_id: user_id.to_string(),
                violations: Vec::new(),
                warning_count: 0,
                mute_count: 0,
                warnings_at_last_mute: 0,
                last_violation: now,
            });

        for action in actions {
            match action.action {
                ModerationActionKind::Warn => entry.warning_count += 1,
                ModerationActionKind::Mute => entry.mute_count += 1,
                ModerationActionKind::Kick | ModerationActionKind::Timeout => {}
            }
            entry.violations.push(action.clone());
        }
        entry.last_violation = now;

        Some(entry.clone())
    }

    /// Record the automatic mute that `warning_count` warnings triggered.
    ///
    /// Marks those warnings as served so the user's state only counts warnings
    /// received after this point.
    pub fn record_escalation(
        &self,
        user_id: &str,
        action: ModerationAction,
        now: DateTime<Utc>,
    ) -> Option<UserViolation> {
        let mut entry = self.records.get_mut(user_id)?;
        entry.mute_count += 1;
        entry.warnings_at_last_mute = entry.warning_count;
        entry.violations.push(action);
        entry.last_violation = now;
        Some(entry.clone())
    }

    /// Snapshot of a user's history, `None` if they have none.
    pub fn get(&self, user_id: &str) -> Option<UserViolation> {
        self.records.get(user_id).map(|v| v.clone())
    }

    /// Drop a user's history. Returns whether there was anything to drop.
    pub fn clear_user(&self, user_id: &str) -> bool {
        self.records.remove(user_id).is_some()
    }

    pub fn clear(&self) {
        self.records.clear();
    }
}

impl Default for ViolationTracker {
    fn default() -> Self {
        Self::new()
    }
}
