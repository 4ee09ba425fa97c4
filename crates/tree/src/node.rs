use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a tree node counts toward trim depth (§4.2: "Only `message`
/// nodes count toward trim depth").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Message,
    ToolCall,
    ToolExecution,
}

/// One node in the conversation tree (§3 "Tree node").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: String,
    pub agent_name: String,
    pub display_name: String,
    pub content: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    pub is_active: bool,
    pub branch_id: String,
    pub timestamp: DateTime<Utc>,
    pub node_type: NodeType,
}

impl TreeNode {
    pub fn new_root(id: impl Into<String>, content: impl Into<String>, branch_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent_name: "You".into(),
            display_name: "You".into(),
            content: content.into(),
            summary: None,
            parent_id: None,
            children: Vec::new(),
            is_active: true,
            branch_id: branch_id.into(),
            timestamp: Utc::now(),
            node_type: NodeType::Message,
        }
    }
}
