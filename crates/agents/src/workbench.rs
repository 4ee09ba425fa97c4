use async_trait::async_trait;
use sa_domain::error::Result;
use sa_domain::tool::{ToolCall, ToolDefinition};
use serde::{Deserialize, Serialize};

/// The result of executing one tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    pub call_id: String,
    pub ok: bool,
    pub content: String,
}

/// An agent's tool surface: what it can see, and what it can actually run
/// once a policy has filtered it. Grounded on the connection-manager shape
/// of an MCP client — a set of advertised tools plus a dispatch method —
/// narrowed here to the two operations a group-chat agent needs.
#[async_trait]
pub trait Workbench: Send + Sync {
    /// Tool definitions visible to the LLM for this agent, already filtered
    /// by this workbench's `ToolPolicy`.
    fn list_tools(&self) -> Vec<ToolDefinition>;

    /// Execute a tool call. Implementations should reject (return an `Err`
    /// or an `ok: false` result) calls that `list_tools` would not have
    /// advertised, rather than trusting the caller.
    async fn execute(&self, call: &ToolCall) -> Result<ToolExecutionResult>;
}

/// Prefix-based allow/deny policy for tool names (e.g. `"fs."`,
/// `"web.fetch"`). Deny takes precedence over allow on overlapping
/// prefixes, so a broad allow can be narrowed by a specific deny.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolPolicy {
    #[serde(default)]
    pub allowed_prefixes: Vec<String>,
    #[serde(default)]
    pub denied_prefixes: Vec<String>,
}

impl ToolPolicy {
    pub fn allow_all() -> Self {
        Self {
            allowed_prefixes: vec![String::new()],
            denied_prefixes: Vec::new(),
        }
    }

    pub fn allows(&self, tool_name: &str) -> bool {
        if self
            .denied_prefixes
            .iter()
            .any(|p| tool_name.starts_with(p.as_str()))
        {
            return false;
        }
        self.allowed_prefixes
            .iter()
            .any(|p| tool_name.starts_with(p.as_str()))
    }

    pub fn filter<'a>(&self, tools: &'a [ToolDefinition]) -> Vec<&'a ToolDefinition> {
        tools.iter().filter(|t| self.allows(&t.name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: String::new(),
            parameters: serde_json::json!({}),
        }
    }

    #[test]
    fn allow_all_permits_everything() {
        let policy = ToolPolicy::allow_all();
        assert!(policy.allows("fs.read"));
        assert!(policy.allows("anything"));
    }

    #[test]
    fn prefix_match_allows() {
        let policy = ToolPolicy {
            allowed_prefixes: vec!["fs.".into()],
            denied_prefixes: Vec::new(),
        };
        assert!(policy.allows("fs.read"));
        assert!(!policy.allows("web.fetch"));
    }

    #[test]
    fn deny_overrides_allow() {
        let policy = ToolPolicy {
            allowed_prefixes: vec!["fs.".into()],
            denied_prefixes: vec!["fs.delete".into()],
        };
        assert!(policy.allows("fs.read"));
        assert!(!policy.allows("fs.delete_all"));
    }

    #[test]
    fn filter_keeps_only_allowed_tools() {
        let policy = ToolPolicy {
            allowed_prefixes: vec!["fs.".into()],
            denied_prefixes: Vec::new(),
        };
        let tools = vec![tool("fs.read"), tool("web.fetch")];
        let filtered = policy.filter(&tools);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "fs.read");
    }
}
