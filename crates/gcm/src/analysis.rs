use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use sa_agents::{ChatRequest, LlmClient};
use sa_domain::config::{AnalysisConfig, WatchlistComponent};
use sa_domain::message::{ComponentScore, Event};
use sa_domain::tool::Message;
use sa_domain::trace::TraceEvent;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::plugin::{Plugin, PluginContext, PluginUpdate};

const PALETTE: &[&str] = &[
    "#e57373", "#64b5f6", "#81c784", "#ffd54f", "#ba68c8", "#4db6ac", "#f06292", "#a1887f",
];

/// Records that a component crossed `trigger_threshold` at a given node, so
/// the manager can force the next speaker to the user proxy and the observer
/// UI can render the triggering score (§4.4.2).
#[derive(Debug, Clone)]
pub struct PendingAnalysis {
    pub node_id: String,
    pub triggered_components: Vec<String>,
}

/// Scores every agent message against a configured watchlist and forces a
/// hand-off to the human proxy once any component crosses its threshold
/// (§4.4.2).
pub struct AnalysisWatchlistPlugin {
    llm: Arc<dyn LlmClient>,
    config: RwLock<AnalysisConfig>,
    pending: RwLock<Option<PendingAnalysis>>,
}

impl AnalysisWatchlistPlugin {
    pub fn new(llm: Arc<dyn LlmClient>, config: AnalysisConfig) -> Self {
        Self {
            llm,
            config: RwLock::new(config),
            pending: RwLock::new(None),
        }
    }

    fn is_user_proxy(&self, source: &str) -> bool {
        source == self.config.read().user_proxy_name || source == "You" || source == "user"
    }

    fn color_for(label: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(label.as_bytes());
        let digest = hasher.finalize();
        let index = digest[0] as usize % PALETTE.len();
        PALETTE[index].to_string()
    }

    /// Generate a 2-5 component watchlist from a free-form description
    /// (§4.4.2 "Parsing"). Colours are assigned deterministically when the
    /// caller didn't pin one.
    pub async fn generate_components(
        &self,
        description: &str,
        cancellation_token: CancellationToken,
    ) -> sa_domain::error::Result<Vec<WatchlistComponent>> {
        let prompt = format!(
            "Derive 2 to 5 short watchlist components from this description.\n\
             Description: {description}\n\n\
             Respond with one `label: description` pair per line, nothing else."
        );
        let response = self
            .llm
            .chat(
                ChatRequest {
                    messages: vec![Message::system(prompt)],
                    tools: Vec::new(),
                    system: None,
                },
                cancellation_token,
            )
            .await?;

        let text = response.message.content.extract_all_text();
        let components: Vec<WatchlistComponent> = text
            .lines()
            .filter_map(|line| {
                let (label, desc) = line.split_once(':')?;
                let label = label.trim().to_string();
                if label.is_empty() {
                    return None;
                }
                Some(WatchlistComponent {
                    color: Some(Self::color_for(&label)),
                    label,
                    description: desc.trim().to_string(),
                })
            })
            .take(5)
            .collect();

        Ok(components)
    }

    async fn score_message(
        &self,
        source: &str,
        content: &str,
        cancellation_token: &CancellationToken,
    ) -> Option<Vec<ComponentScore>> {
        let components = self.config.read().components.clone();
        if components.is_empty() {
            return None;
        }

        let mut scores = Vec::with_capacity(components.len());
        for component in &components {
            if cancellation_token.is_cancelled() {
                break;
            }

            let prompt = format!(
                "Score how strongly this message from {source} matches \"{}\" ({}) on a scale of 1-10.\n\
                 Message: {content}\n\n\
                 Respond with ONLY the number, optionally followed by a short reason on the next line.",
                component.label, component.description
            );

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
                _ = cancellation_token.cancelled() => break,
                result = call => match result {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(error = %e, component = %component.label, "analysis scoring call failed");
                        continue;
                    }
                },
            };

            let text = response.message.content.extract_all_text();
            let mut lines = text.lines();
            let score: u8 = lines
                .next()
                .and_then(|l| l.trim().parse().ok())
                .unwrap_or(0);
            let reasoning = lines.collect::<Vec<_>>().join(" ").trim().to_string();

            scores.push(ComponentScore {
                label: component.label.clone(),
                score: score.min(10),
                reasoning,
            });
        }

        Some(scores)
    }
}

#[async_trait]
impl Plugin for AnalysisWatchlistPlugin {
    fn name(&self) -> &str {
        "analysis_watchlist"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    async fn on_message_added(&self, ctx: &PluginContext<'_>, event: &Event) -> PluginUpdate {
        let Event::ChatMessage { source, content, id } = event else {
            return PluginUpdate::none();
        };
        if self.is_user_proxy(source) {
            return PluginUpdate::none();
        }

        let Some(scores) = self.score_message(source, content, &ctx.cancellation_token).await else {
            return PluginUpdate::none();
        };
        let threshold = self.config.read().trigger_threshold;
        let triggered: Vec<String> = scores
            .iter()
            .filter(|s| s.score >= threshold)
            .map(|s| s.label.clone())
            .collect();

        if !triggered.is_empty() {
            TraceEvent::AnalysisTriggered {
                session_id: String::new(),
                node_id: id.clone(),
                components: triggered.clone(),
            }
            .emit();

            *self.pending.write() = Some(PendingAnalysis {
                node_id: id.clone(),
                triggered_components: triggered.clone(),
            });
        }

        PluginUpdate {
            snapshot: None,
            events: vec![Event::AnalysisUpdate {
                node_id: id.clone(),
                scores,
                triggered,
            }],
        }
    }

    async fn on_before_speaker_selection(&self, _ctx: &PluginContext<'_>) -> Option<String> {
        if self.pending.read().is_some() {
            Some(self.config.read().user_proxy_name.clone())
        } else {
            None
        }
    }

    async fn on_user_message(
        &self,
        _ctx: &PluginContext<'_>,
        _content: &str,
        _target: &str,
    ) -> PluginUpdate {
        *self.pending.write() = None;
        PluginUpdate::none()
    }

    fn on_branch(&self, _trim_count: u32, _new_length: usize) {
        *self.pending.write() = None;
    }

    fn state_for_agent(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    fn state_for_selector(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    fn save_state(&self) -> serde_json::Value {
        let pending = self.pending.read();
        match &*pending {
            Some(p) => serde_json::json!({
                "pending_node_id": p.node_id,
                "pending_components": p.triggered_components,
            }),
            None => serde_json::json!({}),
        }
    }

    fn load_state(&self, state: serde_json::Value) {
        let node_id = state.get("pending_node_id").and_then(|v| v.as_str());
        match node_id {
            Some(node_id) => {
                let components = state
                    .get("pending_components")
                    .and_then(|v| v.as_array())
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                *self.pending.write() = Some(PendingAnalysis {
                    node_id: node_id.to_string(),
                    triggered_components: components,
                });
            }
            None => *self.pending.write() = None,
        }
    }
}
