mod gcm;
mod observability;
mod plugins;
mod server;
mod sessions;

pub use gcm::*;
pub use observability::*;
pub use plugins::*;
pub use server::*;
pub use sessions::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub state_context: StateContextConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// The static team roster every session is built from (§6.5) — there
    /// is no dynamic agent/team YAML loader in this stack's scope.
    #[serde(default)]
    pub gcm: GroupChatConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate ambient (process-wide) configuration. Per-run group-chat
    /// configuration is validated separately via `GroupChatConfig::validate`
    /// when a run actually starts (§7 "Configuration" errors fail run start,
    /// not process start).
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.server.port == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.server.host.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*"
        {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)"
                    .into(),
            });
        }

        if let Some(hour) = self.sessions.lifecycle.daily_reset_hour {
            if hour > 23 {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field: "sessions.lifecycle.daily_reset_hour".into(),
                    message: format!("hour must be 0-23, got {hour}"),
                });
            }
        }

        if self.analysis.trigger_threshold == 0 || self.analysis.trigger_threshold > 10 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "analysis.trigger_threshold".into(),
                message: format!(
                    "trigger_threshold must be 1-10, got {}",
                    self.analysis.trigger_threshold
                ),
            });
        }

        issues
    }

    /// `true` if any issue is an `Error` (process should not start).
    pub fn has_fatal_issues(issues: &[ConfigIssue]) -> bool {
        issues.iter().any(|i| i.severity == ConfigSeverity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_fatal_issues() {
        let cfg = Config::default();
        let issues = cfg.validate();
        assert!(!Config::has_fatal_issues(&issues));
    }

    #[test]
    fn zero_port_is_fatal() {
        let mut cfg = Config::default();
        cfg.server.port = 0;
        let issues = cfg.validate();
        assert!(Config::has_fatal_issues(&issues));
    }

    #[test]
    fn wildcard_cors_is_warning_only() {
        let mut cfg = Config::default();
        cfg.server.cors.allowed_origins = vec!["*".into()];
        let issues = cfg.validate();
        assert!(!Config::has_fatal_issues(&issues));
        assert!(issues
            .iter()
            .any(|i| i.field == "server.cors.allowed_origins"));
    }

    #[test]
    fn bad_trigger_threshold_is_fatal() {
        let mut cfg = Config::default();
        cfg.analysis.trigger_threshold = 11;
        assert!(Config::has_fatal_issues(&cfg.validate()));
    }

    #[test]
    fn toml_roundtrip_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.server.port, 3210);
    }
}
