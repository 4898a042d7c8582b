// Mute store - who is muted and until when.
//
// Expiry is lazy: nothing runs on a timer. Reads that find an expired record
// delete it (`is_muted`, `get`, `list_active`), and `sweep` does the same for
// the whole map on demand.

use super::moderation_models::{expiry_after, MuteRecord};
use super::moderation_service::ModerationError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;

pub struct MuteStore {
    /// user_id -> mute
    mutes: DashMap<String, MuteRecord>,
}

impl MuteStore {
    pub fn new() -> Self {
        Self {
            mutes: DashMap::new(),
        }
    }

    /// Mute `user_id` until `now + duration`, replacing any existing mute.
    ///
    /// Fails without touching the store when `now + duration` is not a
    /// representable timestamp.
    pub fn mute(
        &self,
        user_id: &str,
        duration: Duration,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<MuteRecord, ModerationError> {
        let until = expiry_after(now, duration).ok_or_else(|| {
            ModerationError::InvalidDuration(format!("{}s is out of range", duration.as_secs()))
        })?;
        let record = MuteRecord {
            user_id: user_id.to_string(),
            until,
            reason: reason.to_string(),
        };
        self.mutes.insert(user_id.to_string(), record.clone());
        Ok(record)
    }

    /// Remove a mute whether or not it has expired. Returns whether one existed.
    pub fn unmute(&self, user_id: &str) -> bool {
        self.mutes.remove(user_id).is_some()
    }

    /// The live mute for `user_id`, evicting it if it has expired.
    pub fn get(&self, user_id: &str, now: DateTime<Utc>) -> Option<MuteRecord> {
        if self
            .mutes
            .remove_if(user_id, |_, record| !record.is_active_at(now))
            .is_some()
        {
            tracing::debug!(user_id, "Mute expired");
            return None;
        }
        self.mutes.get(user_id).map(|r| r.clone())
    }

    pub fn is_muted(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        self.get(user_id, now).is_some()
    }

    /// Every live mute, ordered by user id. Expired records are evicted as a
    /// side effect of listing.
    pub fn list_active(&self, now: DateTime<Utc>) -> Vec<MuteRecord> {
        self.sweep(now);
        let mut active: Vec<MuteRecord> = self.mutes.iter().map(|r| r.value().clone()).collect();
        active.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        active
    }

    /// Drop every expired record. Returns how many were dropped.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.mutes.len();
        self.mutes.retain(|_, record| record.is_active_at(now));
        before.saturating_sub(self.mutes.len())
    }

    pub fn clear(&self) {
        self.mutes.clear();
    }

    /// Number of stored records, expired ones included.
    pub fn len(&self) -> usize {
        self.mutes.len()
    }
}

impl Default for MuteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn secs(s: i64) -> DateTime<Utc> {
        now() + chrono::Duration::seconds(s)
    }

    #[test]
    fn test_mute_and_expiry() {
        let store = MuteStore::new();
        let record = store.mute("u1", Duration::from_secs(300), "spam", now()).unwrap();

        assert_eq!(record.until, secs(300));
        assert!(store.is_muted("u1", secs(299)));
        // until == now is already over
        assert!(!store.is_muted("u1", secs(300)));
        assert_eq!(store.len(), 0, "expired record is evicted by the check");
    }

    #[test]
    fn test_mute_keeps_sub_second_precision() {
        let store = MuteStore::new();
        let record = store
            .mute("u1", Duration::from_millis(1500), "spam", now())
            .unwrap();

        assert_eq!(record.until, now() + chrono::Duration::milliseconds(1500));
    }

    #[test]
    fn test_out_of_range_duration_is_rejected() {
        let store = MuteStore::new();

        for duration in [Duration::from_secs(10_000_000_000_000), Duration::from_secs(u64::MAX)] {
            let err = store.mute("u1", duration, "forever", now()).unwrap_err();
            assert!(matches!(err, ModerationError::InvalidDuration(_)));
        }
        assert!(!store.is_muted("u1", now()));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_mute_overwrites_existing() {
        let store = MuteStore::new();
        store.mute("u1", Duration::from_secs(600), "first", now()).unwrap();
        store.mute("u1", Duration::from_secs(60), "second", now()).unwrap();

        let record = store.get("u1", now()).unwrap();
        assert_eq!(record.reason, "second");
        assert_eq!(record.until, secs(60));
    }

    #[test]
    fn test_unmute_is_idempotent() {
        let store = MuteStore::new();

        assert!(!store.unmute("never-muted"));

        store.mute("u1", Duration::from_secs(60), "spam", now()).unwrap();
        assert!(store.unmute("u1"));
        assert!(!store.unmute("u1"));
        assert!(!store.is_muted("u1", now()));
    }

    #[test]
    fn test_list_active_evicts_expired() {
        let store = MuteStore::new();
        store.mute("b", Duration::from_secs(100), "short", now()).unwrap();
        store.mute("a", Duration::from_secs(500), "long", now()).unwrap();
        store.mute("c", Duration::from_secs(10), "tiny", now()).unwrap();
        assert_eq!(store.len(), 3);

        let active = store.list_active(secs(200));

        let ids: Vec<&str> = active.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
        // Listing is not a pure read: expired records are gone afterwards
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sweep_reports_evictions() {
        let store = MuteStore::new();
        store.mute("a", Duration::from_secs(10), "x", now()).unwrap();
        store.mute("b", Duration::from_secs(20), "x", now()).unwrap();

        assert_eq!(store.sweep(secs(15)), 1);
        assert_eq!(store.sweep(secs(15)), 0);
        assert!(store.is_muted("b", secs(15)));
    }
}
