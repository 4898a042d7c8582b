// Core moderation module - per-message chat moderation.
// Leaves first: filter and detector, then the rule engine over them,
// then per-user state, then the pipeline that ties it all together.

pub mod moderation_models;
pub mod moderation_service;
pub mod mute_store;
pub mod profanity_filter;
pub mod rule_engine;
pub mod spam_detector;
pub mod violation_tracker;

pub use moderation_models::*;
pub use moderation_service::*;
pub use mute_store::MuteStore;
pub use profanity_filter::ProfanityFilter;
pub use rule_engine::{RuleEngine, RuleEvaluation, LINK_REPLACEMENT};
pub use spam_detector::SpamDetector;
pub use violation_tracker::ViolationTracker;
