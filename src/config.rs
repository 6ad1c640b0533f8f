use crate::grouping::{validate_threshold, DEFAULT_GROUPING_THRESHOLD};
use log::warn;

pub const DB_PATH_VAR: &str = "QGROUP_DB_PATH";
pub const AI_ENABLED_VAR: &str = "QGROUP_AI_ENABLED";
pub const THRESHOLD_VAR: &str = "QGROUP_THRESHOLD";
pub const BACKFILL_CHUNK_VAR: &str = "QGROUP_BACKFILL_CHUNK";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub db_path: String,
    /// Embeddings are only generated, backfilled and grouped when set.
    pub ai_enabled: bool,
    pub threshold: f64,
    pub backfill_chunk: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: "questions.db".to_string(),
            ai_enabled: false,
            threshold: DEFAULT_GROUPING_THRESHOLD,
            backfill_chunk: 64,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup; unparsable values fall back to
    /// the defaults with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();

        let db_path = lookup(DB_PATH_VAR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.db_path);

        let ai_enabled = match lookup(AI_ENABLED_VAR) {
            None => defaults.ai_enabled,
            Some(raw) => parse_flag(&raw).unwrap_or_else(|| {
                warn!("Ignoring {}={:?}: expected true/false", AI_ENABLED_VAR, raw);
                defaults.ai_enabled
            }),
        };

        let threshold = lookup(THRESHOLD_VAR)
            .and_then(|raw| match raw.trim().parse::<f64>() {
                Ok(value) if validate_threshold(value).is_ok() => Some(value),
                _ => {
                    warn!("Ignoring {}={:?}: expected 0.0..=1.0", THRESHOLD_VAR, raw);
                    None
                }
            })
            .unwrap_or(defaults.threshold);

        let backfill_chunk = lookup(BACKFILL_CHUNK_VAR)
            .and_then(|value| value.trim().parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(defaults.backfill_chunk);

        Settings {
            db_path,
            ai_enabled,
            threshold,
            backfill_chunk,
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
