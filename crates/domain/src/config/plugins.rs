use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Plugin configuration (§4.4.1, §4.4.2)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for the state-context plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateContextConfig {
    /// When `true`, human messages do NOT trigger a `state_of_run`/
    /// `handoff_context` update. The spec's default behaviour is `false`
    /// (human messages always influence these fields); flipping this on is
    /// an explicit cost/latency trade-off — see SPEC_FULL.md §9 Open
    /// Question (ii). Every skipped update is logged at `debug` level.
    #[serde(default)]
    pub skip_on_human_message: bool,
}

impl Default for StateContextConfig {
    fn default() -> Self {
        Self {
            skip_on_human_message: false,
        }
    }
}

/// Configuration for the analysis-watchlist plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Minimum per-component score (1–10) that counts as triggered.
    #[serde(default = "d_threshold")]
    pub trigger_threshold: u8,

    /// The agent name treated as the human proxy; skipped when scoring and
    /// forced as the next speaker once a component triggers.
    #[serde(default = "d_user_proxy")]
    pub user_proxy_name: String,

    /// Watchlist components to score every agent message against.
    #[serde(default)]
    pub components: Vec<WatchlistComponent>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            trigger_threshold: d_threshold(),
            user_proxy_name: d_user_proxy(),
            components: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistComponent {
    pub label: String,
    pub description: String,
    /// Deterministic colour, assigned by hashing `label` if not set
    /// explicitly (§4.4.2 "Parsing").
    #[serde(default)]
    pub color: Option<String>,
}

fn d_threshold() -> u8 {
    7
}

fn d_user_proxy() -> String {
    "user_proxy".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = AnalysisConfig::default();
        assert_eq!(cfg.trigger_threshold, 7);
        assert_eq!(cfg.user_proxy_name, "user_proxy");
        assert!(cfg.components.is_empty());
    }

    #[test]
    fn state_context_default_always_updates() {
        assert!(!StateContextConfig::default().skip_on_human_message);
    }
}
