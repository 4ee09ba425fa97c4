//! Team construction — the one seam between a session and whatever owns
//! concrete LLM/tool wiring (the gateway binary). `sa-sessions` never talks
//! to a provider directly; it asks a `TeamFactory` for one.

use std::collections::HashMap;
use std::sync::Arc;

use sa_agents::{AgentContainer, LlmClient};
use sa_domain::config::GroupChatConfig;
use sa_domain::error::Result;
use sa_gcm::Plugin;

/// Everything a `GroupChatManager` needs besides its config: the agent
/// roster, the selector's own LLM client, and the plugin chain.
pub struct Team {
    pub agents: HashMap<String, Arc<AgentContainer>>,
    pub selector_llm: Arc<dyn LlmClient>,
    pub plugins: Vec<Arc<dyn Plugin>>,
}

/// Builds a [`Team`] for a given run. Concrete LLM provider wiring, tool
/// workbenches, and plugin configuration (state-context / analysis) are
/// owned by whatever implements this — `sa-sessions` only needs the
/// resulting containers and stays provider-agnostic.
pub trait TeamFactory: Send + Sync {
    fn build_team(&self, config: &GroupChatConfig) -> Result<Team>;
}
