use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session persistence & lifecycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Controls where session trees/snapshots are persisted and when a session
/// is considered stale enough to reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Directory holding one JSON file per session (§6.4).
    #[serde(default = "d_state_dir")]
    pub state_dir: PathBuf,

    /// Session lifecycle rules (resets, idle timeouts).
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            state_dir: d_state_dir(),
            lifecycle: LifecycleConfig::default(),
        }
    }
}

/// Session lifecycle rules. A session whose last activity predates the
/// reset window is lazily reset to a fresh tree on the next observer bind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Daily reset hour (0–23, local gateway time). `None` disables daily reset.
    #[serde(default)]
    pub daily_reset_hour: Option<u8>,

    /// Idle timeout in minutes. If the last event was more than this many
    /// minutes ago, the session is reset on the next inbound connection.
    #[serde(default)]
    pub idle_minutes: Option<u32>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            daily_reset_hour: None,
            idle_minutes: None,
        }
    }
}

fn d_state_dir() -> PathBuf {
    PathBuf::from("./data/sessions")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lifecycle_never_resets() {
        let cfg = SessionsConfig::default();
        assert!(cfg.lifecycle.daily_reset_hour.is_none());
        assert!(cfg.lifecycle.idle_minutes.is_none());
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: SessionsConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.state_dir, PathBuf::from("./data/sessions"));
    }
}
