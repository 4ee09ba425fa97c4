//! The gateway's [`TeamFactory`] — the seam `sa-sessions` calls into to
//! turn a validated [`GroupChatConfig`] into a runnable [`Team`].
//!
//! Concrete LLM provider wiring is explicitly out of scope (§6.2, §9): the
//! chat-completion/streaming HTTP client behind `LlmClient` is never
//! fabricated here. `StubLlmClient` documents that boundary in code —
//! it answers `capabilities()` honestly and fails loudly on `chat`/
//! `chat_stream` rather than silently returning canned text.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sa_agents::{AgentContainer, ChatRequest, ChatResponse, LlmClient};
use sa_domain::capability::LlmCapabilities;
use sa_domain::config::{AnalysisConfig, Config, GroupChatConfig, StateContextConfig};
use sa_domain::error::{Error, Result};
use sa_domain::stream::{BoxStream, StreamEvent};
use sa_gcm::{AnalysisWatchlistPlugin, Plugin, StateContextPlugin};
use sa_sessions::{Team, TeamFactory};
use tokio_util::sync::CancellationToken;

/// An `LlmClient` with no provider behind it. Exists purely so the rest
/// of the stack (agent turns, speaker selection, the two plugins) can be
/// wired and exercised without depending on a concrete chat-completion
/// crate this repo has no business fabricating.
pub struct StubLlmClient {
    capabilities: LlmCapabilities,
}

impl StubLlmClient {
    pub fn new() -> Self {
        Self {
            capabilities: LlmCapabilities::default(),
        }
    }
}

#[async_trait]
impl LlmClient for StubLlmClient {
    async fn chat(&self, _request: ChatRequest, _cancellation_token: CancellationToken) -> Result<ChatResponse> {
        Err(Error::Provider {
            provider: "stub".into(),
            message: "no concrete LLM provider is configured; this gateway ships with the \
                      chat-completion client left out of scope (§6.2)"
                .into(),
        })
    }

    fn chat_stream(
        &self,
        _request: ChatRequest,
        _cancellation_token: CancellationToken,
    ) -> BoxStream<'static, StreamEvent> {
        Box::pin(futures_util::stream::empty())
    }

    fn capabilities(&self) -> &LlmCapabilities {
        &self.capabilities
    }
}

/// Builds one [`AgentContainer`] per participant and the two built-in
/// plugins (state-context, analysis-watchlist), all sharing the same
/// [`StubLlmClient`] until a real provider is wired in.
pub struct ConfigDrivenTeamFactory {
    config: Arc<Config>,
}

impl ConfigDrivenTeamFactory {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

impl TeamFactory for ConfigDrivenTeamFactory {
    fn build_team(&self, config: &GroupChatConfig) -> Result<Team> {
        let llm: Arc<dyn LlmClient> = Arc::new(StubLlmClient::new());

        let mut agents = HashMap::new();
        for name in &config.participants {
            let description = config
                .participant_descriptions
                .get(name)
                .cloned()
                .unwrap_or_default();
            agents.insert(
                name.clone(),
                Arc::new(AgentContainer::new(name.clone(), description, llm.clone())),
            );
        }

        let state_context_config: StateContextConfig = self.config.state_context.clone();
        let analysis_config: AnalysisConfig = self.config.analysis.clone();

        let plugins: Vec<Arc<dyn Plugin>> = vec![
            Arc::new(StateContextPlugin::new(llm.clone(), state_context_config)),
            Arc::new(AnalysisWatchlistPlugin::new(llm.clone(), analysis_config)),
        ];

        Ok(Team {
            agents,
            selector_llm: llm,
            plugins,
        })
    }
}
