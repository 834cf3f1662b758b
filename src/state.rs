use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::blocker::{EngineSnapshot, UsageSnapshot};

/// Current state version
const STATE_VERSION: &str = "2.0";

/// Daily usage persisted across restarts
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UsageState {
    pub version: String,
    pub saved_at: DateTime<Local>,
    pub usage: UsageSnapshot,
    pub breaches_today: u32,
    #[serde(default)]
    pub counted_today: Vec<String>,
}

impl UsageState {
    pub fn from_snapshot(snapshot: &EngineSnapshot) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            saved_at: snapshot.taken_at,
            usage: snapshot.usage.clone(),
            breaches_today: snapshot.breaches_today,
            counted_today: snapshot.counted_today.clone(),
        }
    }

    /// Whether the stored usage belongs to the day of `now`
    pub fn is_current(&self, now: DateTime<Local>) -> bool {
        self.usage.day == now.date_naive()
    }
}

/// Get the per-user state file path
pub fn get_state_path() -> Result<PathBuf> {
    Ok(crate::config::get_data_dir()?.join("state.json"))
}

/// Load state from file
pub fn load_state(path: &Path) -> Result<Option<UsageState>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file: {}", path.display()))?;

    let state: UsageState = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

    if state.version != STATE_VERSION {
        warn!(
            "State file version mismatch (expected {}, got {}), ignoring it",
            STATE_VERSION, state.version
        );
        return Ok(None);
    }

    Ok(Some(state))
}

/// Save state to file
pub fn save_state(path: &Path, state: &UsageState) -> Result<()> {
    let content = serde_json::to_string_pretty(state).context("Failed to serialize state")?;

    crate::platform::common::atomic_write(path, content.as_bytes())
        .with_context(|| format!("Failed to write state file: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocker::UsageRecord;
    use chrono::TimeZone;

    fn make_state(now: DateTime<Local>) -> UsageState {
        UsageState {
            version: STATE_VERSION.to_string(),
            saved_at: now,
            usage: UsageSnapshot {
                day: now.date_naive(),
                records: vec![UsageRecord {
                    package: "com.example.social".to_string(),
                    cumulative_millis: 1_800_000,
                    day: now.date_naive(),
                }],
                foreground: Some("com.example.social".to_string()),
            },
            breaches_today: 1,
            counted_today: vec!["com.example.social".to_string()],
        }
    }

    #[test]
    fn test_missing_state_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_state(&dir.path().join("state.json")).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = make_state(Local.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap());

        save_state(&path, &state).unwrap();
        let loaded = load_state(&path).unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.usage.minutes_for("com.example.social"), 30);
    }

    #[test]
    fn test_version_mismatch_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut state = make_state(Local.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap());
        state.version = "0.1".to_string();

        save_state(&path, &state).unwrap();
        assert!(load_state(&path).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_state_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(load_state(&path).is_err());
    }

    #[test]
    fn test_is_current() {
        let saved = Local.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let state = make_state(saved);

        assert!(state.is_current(Local.with_ymd_and_hms(2025, 3, 10, 23, 0, 0).unwrap()));
        assert!(!state.is_current(Local.with_ymd_and_hms(2025, 3, 11, 12, 0, 0).unwrap()));
    }
}
