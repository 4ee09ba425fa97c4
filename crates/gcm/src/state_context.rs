use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use sa_agents::{ChatRequest, LlmClient};
use sa_domain::config::StateContextConfig;
use sa_domain::message::Event;
use sa_domain::tool::Message;
use sa_domain::trace::TraceEvent;
use sa_tree::Snapshot;
use tokio_util::sync::CancellationToken;

use crate::plugin::{Plugin, PluginContext, PluginUpdate};

/// Names treated as "a human, not an agent" for the purposes of state
/// updates (§4.4.1).
const HUMAN_SOURCE_NAMES: &[&str] = &["You", "user", "user_proxy"];

/// Maintains `state_of_run`, `tool_call_facts`, and `handoff_context` —
/// the three freeform text blobs every agent and the selector see
/// injected into their prompts (§4.4.1).
pub struct StateContextPlugin {
    llm: Arc<dyn LlmClient>,
    config: StateContextConfig,
    state_of_run: RwLock<String>,
    tool_call_facts: RwLock<String>,
    handoff_context: RwLock<Option<String>>,
}

impl StateContextPlugin {
    pub fn new(llm: Arc<dyn LlmClient>, config: StateContextConfig) -> Self {
        Self {
            llm,
            config,
            state_of_run: RwLock::new(String::new()),
            tool_call_facts: RwLock::new(String::new()),
            handoff_context: RwLock::new(None),
        }
    }

    fn is_human(source: &str) -> bool {
        HUMAN_SOURCE_NAMES.contains(&source)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            state_of_run: self.state_of_run.read().clone(),
            tool_call_facts: self
                .tool_call_facts
                .read()
                .split('\n')
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            handoff_context: self.handoff_context.read().clone(),
        }
    }

    fn state_update_event(&self, message_index: usize) -> Event {
        Event::StateUpdate {
            state_of_run: self.state_of_run.read().clone(),
            tool_call_facts: self.tool_call_facts.read().clone(),
            handoff_context: self.handoff_context.read().clone().unwrap_or_default(),
            message_index,
        }
    }

    async fn ask_llm(&self, prompt: String, cancellation_token: &CancellationToken) -> Option<String> {
        let call = self.llm.chat(
            ChatRequest {
                messages: vec![Message::system(prompt)],
                tools: Vec::new(),
                system: None,
            },
            cancellation_token.clone(),
        );
        let response = tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => return None,
            result = call => result,
        };

        match response {
            Ok(r) => Some(r.message.content.extract_all_text()),
            Err(e) => {
                tracing::warn!(error = %e, "state-context plugin llm call failed");
                None
            }
        }
    }

    async fn update_on_tool_execution(&self, raw_results: &str, cancellation_token: &CancellationToken) -> bool {
        let current = self.tool_call_facts.read().clone();
        let prompt = format!(
            "Verified facts so far:\n{current}\n\nNew tool results:\n{raw_results}\n\nRespond with ONLY the new fact(s) to append, one per line."
        );
        match self.ask_llm(prompt, cancellation_token).await {
            Some(addition) if !addition.trim().is_empty() => {
                let mut facts = self.tool_call_facts.write();
                if !facts.is_empty() {
                    facts.push('\n');
                }
                facts.push_str(addition.trim());
                true
            }
            _ => false,
        }
    }

    async fn update_on_agent_message(
        &self,
        source: &str,
        content: &str,
        cancellation_token: &CancellationToken,
    ) -> bool {
        let current = self.state_of_run.read().clone();
        let prompt = format!(
            "Progress so far: {current}\n\nLatest message from {source}: {content}\n\nRespond with ONLY the updated state-of-run summary."
        );
        match self.ask_llm(prompt, cancellation_token).await {
            Some(updated) if !updated.trim().is_empty() => {
                *self.state_of_run.write() = updated.trim().to_string();
                true
            }
            _ => false,
        }
    }

    async fn update_on_human_message(&self, content: &str, cancellation_token: &CancellationToken) -> bool {
        *self.handoff_context.write() = Some(content.to_string());
        self.update_on_agent_message("human", content, cancellation_token).await
    }
}

#[async_trait]
impl Plugin for StateContextPlugin {
    fn name(&self) -> &str {
        "state_context"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    async fn on_message_added(&self, ctx: &PluginContext<'_>, event: &Event) -> PluginUpdate {
        let changed = match event {
            Event::ToolCallExecution { results, .. } => {
                let raw = results
                    .iter()
                    .map(|r| format!("{}({}) -> {}", r.name, r.call_id, r.content))
                    .collect::<Vec<_>>()
                    .join("\n");
                self.update_on_tool_execution(&raw, &ctx.cancellation_token).await
            }
            Event::ChatMessage { source, content, .. } if Self::is_human(source) => {
                if self.config.skip_on_human_message {
                    tracing::info!(
                        message_index = ctx.message_index,
                        "skipping state-context update for human message (skip_on_human_message=true)"
                    );
                    false
                } else {
                    self.update_on_human_message(content, &ctx.cancellation_token).await
                }
            }
            Event::ChatMessage { source, content, .. } => {
                self.update_on_agent_message(source, content, &ctx.cancellation_token).await
            }
            _ => false,
        };

        if !changed {
            return PluginUpdate::none();
        }

        TraceEvent::SnapshotWritten {
            session_id: String::new(),
            message_index: ctx.message_index,
        }
        .emit();

        PluginUpdate {
            snapshot: Some(self.snapshot()),
            events: vec![self.state_update_event(ctx.message_index)],
        }
    }

    async fn on_before_speaker_selection(&self, _ctx: &PluginContext<'_>) -> Option<String> {
        None
    }

    async fn on_user_message(
        &self,
        ctx: &PluginContext<'_>,
        content: &str,
        _target: &str,
    ) -> PluginUpdate {
        if self.config.skip_on_human_message {
            return PluginUpdate::none();
        }
        self.update_on_human_message(content, &ctx.cancellation_token).await;
        PluginUpdate {
            snapshot: Some(self.snapshot()),
            events: vec![self.state_update_event(ctx.message_index)],
        }
    }

    fn on_branch(&self, _trim_count: u32, _new_length: usize) {
        // State is entirely snapshot-backed; `restore_from_snapshot` does
        // the actual work once the manager has picked the right snapshot.
    }

    fn restore_from_snapshot(&self, snapshot: Option<&Snapshot>) {
        match snapshot {
            Some(s) => {
                *self.state_of_run.write() = s.state_of_run.clone();
                *self.tool_call_facts.write() = s.tool_call_facts.join("\n");
                *self.handoff_context.write() = s.handoff_context.clone();
            }
            None => {
                self.state_of_run.write().clear();
                self.tool_call_facts.write().clear();
                *self.handoff_context.write() = None;
            }
        }
    }

    fn state_for_agent(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("state_of_run".into(), self.state_of_run.read().clone());
        map.insert("tool_call_facts".into(), self.tool_call_facts.read().clone());
        if let Some(h) = self.handoff_context.read().clone() {
            map.insert("handoff_context".into(), h);
        }
        map
    }

    fn state_for_selector(&self) -> HashMap<String, String> {
        self.state_for_agent()
    }

    fn save_state(&self) -> serde_json::Value {
        serde_json::json!({
            "state_of_run": self.state_of_run.read().clone(),
            "tool_call_facts": self.tool_call_facts.read().clone(),
            "handoff_context": self.handoff_context.read().clone(),
        })
    }

    fn load_state(&self, state: serde_json::Value) {
        if let Some(v) = state.get("state_of_run").and_then(|v| v.as_str()) {
            *self.state_of_run.write() = v.to_string();
        }
        if let Some(v) = state.get("tool_call_facts").and_then(|v| v.as_str()) {
            *self.tool_call_facts.write() = v.to_string();
        }
        if let Some(v) = state.get("handoff_context").and_then(|v| v.as_str()) {
            *self.handoff_context.write() = Some(v.to_string());
        }
    }
}
