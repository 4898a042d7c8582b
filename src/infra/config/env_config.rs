// Configuration loading for the moderation pipeline.
//
// Order of precedence (later wins):
// 1. Built-in defaults (`ModerationConfig::default()`)
// 2. A JSON file named by MODERATION_CONFIG_FILE
// 3. Individual MODERATION_* environment variables

use crate::core::moderation::ModerationConfig;
use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;

pub const CONFIG_FILE_VAR: &str = "MODERATION_CONFIG_FILE";

/// Load configuration from the process environment (call `dotenv` first).
pub fn load_config() -> Result<ModerationConfig> {
    load_config_from(|key| std::env::var(key).ok())
}

/// Load configuration using `lookup` in place of the environment.
pub fn load_config_from<F>(lookup: F) -> Result<ModerationConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match lookup(CONFIG_FILE_VAR) {
        Some(path) => read_config_file(&path)?,
        None => ModerationConfig::default(),
    };

    apply_override(&lookup, "MODERATION_WARNINGS_BEFORE_MUTE", &mut config.escalation.warnings_before_mute);
    apply_override(&lookup, "MODERATION_MUTE_DURATION_SECS", &mut config.escalation.mute_duration_secs);
    apply_override(&lookup, "MODERATION_SPAM_WINDOW_SECS", &mut config.spam.window_secs);
    apply_override(&lookup, "MODERATION_SPAM_MAX_MESSAGES", &mut config.spam.max_tracked_messages);
    apply_override(&lookup, "MODERATION_SPAM_MAX_DISTINCT", &mut config.spam.max_distinct_messages);

    if let Some(words) = lookup("MODERATION_PROFANITY_WORDS") {
        config.profanity_words = words
            .split(',')
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
    }

    Ok(config)
}

/// Read a full or partial config from a JSON file.
pub fn read_config_file(path: impl AsRef<Path>) -> Result<ModerationConfig> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open moderation config {}", path.display()))?;
    let config = serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to parse moderation config {}", path.display()))?;
    Ok(config)
}

/// Overwrite `target` with a parsed env value. Bad values are logged and ignored.
fn apply_override<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!(key, value = %raw, "Ignoring unparseable config override"),
        }
    }
}
