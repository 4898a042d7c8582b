// Spam detector - per-user sliding window over recent messages.
//
// A message is spam when the window is full (5 messages inside 10 seconds by
// default) and those messages carry at most 2 distinct contents.

use super::moderation_models::{SpamConfig, MAX_DURATION_SECS};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashSet, VecDeque};
use std::hash::{Hash, Hasher};

/// A record of a message for tracking purposes.
#[derive(Debug, Clone)]
struct MessageRecord {
    /// Hash of the normalized content (for duplicate detection)
    content_hash: u64,
    timestamp: DateTime<Utc>,
}

pub struct SpamDetector {
    config: SpamConfig,
    /// `window_secs`, capped so it always fits a chrono duration
    window: chrono::Duration,
    /// user_id -> recent messages, oldest first, at most `max_tracked_messages`
    trackers: DashMap<String, VecDeque<MessageRecord>>,
}

impl SpamDetector {
    pub fn new(config: SpamConfig) -> Self {
        let window = chrono::Duration::seconds(config.window_secs.min(MAX_DURATION_SECS) as i64);
        Self {
            config,
            window,
            trackers: DashMap::new(),
        }
    }

    /// Hash message content for duplicate detection.
    fn hash_content(content: &str) -> u64 {
        let normalized = content.trim().to_lowercase();
        let mut hasher = DefaultHasher::new();
        normalized.hash(&mut hasher);
        hasher.finish()
    }

    /// Record `content` for `user_id` and report whether it completes a spam burst.
    pub fn is_spam(&self, user_id: &str, content: &str, now: DateTime<Utc>) -> bool {
        let window_start = now.checked_sub_signed(self.window);
        let max = self.config.max_tracked_messages;

        let mut records = self.trackers.entry(user_id.to_string()).or_default();

        // 1. Forget anything that fell out of the window
        if let Some(window_start) = window_start {
            records.retain(|r| r.timestamp >= window_start);
        }

        // 2. Record this message, keeping only the most recent entries
        records.push_back(MessageRecord {
            content_hash: Self::hash_content(content),
            timestamp: now,
        });
        while records.len() > max {
            records.pop_front();
        }

        // 3. Full window with little variety = flood
        if records.len() < max {
            return false;
        }
        let distinct: HashSet<u64> = records.iter().map(|r| r.content_hash).collect();
        distinct.len() <= self.config.max_distinct_messages
    }

    /// Forget one user's history.
    pub fn clear_user(&self, user_id: &str) {
        self.trackers.remove(user_id);
    }

    pub fn clear(&self) {
        self.trackers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn at(ms: i64) -> DateTime<Utc> {
        start() + chrono::Duration::milliseconds(ms)
    }

    #[test]
    fn test_fifth_identical_message_is_spam() {
        let detector = SpamDetector::new(SpamConfig::default());

        for i in 0..4 {
            assert!(
                !detector.is_spam("u1", "buy now", at(i * 500)),
                "Message {} should not be spam",
                i
            );
        }
        assert!(detector.is_spam("u1", "buy now", at(2000)));
    }

    #[test]
    fn test_five_distinct_messages_are_not_spam() {
        let detector = SpamDetector::new(SpamConfig::default());

        for i in 0..5 {
            assert!(!detector.is_spam("u1", &format!("topic {}", i), at(i * 100)));
        }
    }

    #[test]
    fn test_two_distinct_contents_still_spam() {
        let detector = SpamDetector::new(SpamConfig::default());
        let contents = ["hi", "HI ", "hello", "hi", "hello"];

        let results: Vec<bool> = contents
            .iter()
            .enumerate()
            .map(|(i, c)| detector.is_spam("u1", c, at(i as i64 * 100)))
            .collect();

        assert_eq!(results, vec![false, false, false, false, true]);
    }

    #[test]
    fn test_old_messages_leave_the_window() {
        let detector = SpamDetector::new(SpamConfig::default());

        for i in 0..4 {
            detector.is_spam("u1", "same", at(i * 100));
        }
        // 11 seconds later the earlier burst no longer counts
        assert!(!detector.is_spam("u1", "same", at(11_000)));
    }

    #[test]
    fn test_message_exactly_window_old_still_counts() {
        let detector = SpamDetector::new(SpamConfig::default());

        for i in 0..4 {
            assert!(!detector.is_spam("u1", "same", at(i * 1000)));
        }
        // The first message is exactly 10 seconds old and stays in the window
        assert!(detector.is_spam("u1", "same", at(10_000)));
    }

    #[test]
    fn test_huge_window_does_not_overflow() {
        let detector = SpamDetector::new(SpamConfig {
            window_secs: 10_000_000_000_000_000,
            ..SpamConfig::default()
        });

        for i in 0..4 {
            assert!(!detector.is_spam("u1", "same", at(i * 1000)));
        }
        assert!(detector.is_spam("u1", "same", at(60_000)));
    }

    #[test]
    fn test_window_reaching_before_the_epoch_keeps_history() {
        let detector = SpamDetector::new(SpamConfig {
            window_secs: u64::MAX,
            ..SpamConfig::default()
        });
        let earliest = DateTime::<Utc>::MIN_UTC;

        for i in 0..4 {
            detector.is_spam("u1", "same", earliest + chrono::Duration::seconds(i));
        }
        assert!(detector.is_spam("u1", "same", earliest + chrono::Duration::seconds(4)));
    }

    #[test]
    fn test_users_are_tracked_separately() {
        let detector = SpamDetector::new(SpamConfig::default());

        for i in 0..4 {
            detector.is_spam("u1", "same", at(i * 100));
        }
        assert!(!detector.is_spam("u2", "same", at(500)));
        assert!(detector.is_spam("u1", "same", at(500)));
    }

    #[test]
    fn test_clear_user_resets_window() {
        let detector = SpamDetector::new(SpamConfig::default());

        for i in 0..4 {
            detector.is_spam("u1", "same", at(i * 100));
        }
        detector.clear_user("u1");
        assert!(!detector.is_spam("u1", "same", at(500)));
    }
}
