// Clock implementations for the core `Clock` port.
//
// - `SystemClock` reads the wall clock (production)
// - `ManualClock` only moves when told to (replays, tests, simulations)

use crate::core::moderation::Clock;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that stands still until advanced.
///
/// Replaying the same messages against a fresh pipeline with a `ManualClock`
/// started at the same instant gives identical decisions.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{ChatMessage, ModerationConfig, ModerationPipeline};
    use chrono::TimeZone;
    use std::sync::Arc;

    #[test]
    fn test_manual_clock_moves_only_when_told() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);

        assert_eq!(clock.now(), start);
        clock.advance(chrono::Duration::seconds(90));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(90));
        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_system_clock_is_current() {
        let before = Utc::now();
        let now = SystemClock.now();
        assert!(now >= before);
    }

    #[test]
    fn test_manual_clock_drives_mute_expiry() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let pipeline =
            ModerationPipeline::new(ModerationConfig::default(), Arc::clone(&clock)).unwrap();
        let message = ChatMessage {
            id: "1".to_string(),
            user_id: "u1".to_string(),
            user_name: "alice".to_string(),
            content: "hi".to_string(),
            timestamp: start,
        };

        pipeline
            .mute_user("u1", std::time::Duration::from_secs(60), "test")
            .unwrap();
        assert!(!pipeline.moderate_message(&message).unwrap().allowed);

        clock.advance(chrono::Duration::seconds(61));
        assert!(pipeline.moderate_message(&message).unwrap().allowed);
    }
}
