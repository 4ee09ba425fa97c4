use std::collections::HashMap;

use async_trait::async_trait;
use sa_domain::message::Event;
use sa_tree::Snapshot;
use tokio_util::sync::CancellationToken;

/// Read-only context handed to every plugin hook: where in the thread the
/// triggering event landed, the participant roster, and the run's
/// cancellation token (so a plugin LLM call can be raced against an
/// interrupt like every other long call), so a plugin never needs a
/// back-reference into the manager.
pub struct PluginContext<'a> {
    pub message_index: usize,
    pub participants: &'a [String],
    pub cancellation_token: CancellationToken,
}

/// What a plugin hook produced: an optional snapshot for the manager to
/// record, and zero or more observer-facing events (`StateUpdate`,
/// `AnalysisUpdate`) to splice into the run's event stream alongside the
/// triggering message (§4.7 step 6).
#[derive(Default)]
pub struct PluginUpdate {
    pub snapshot: Option<Snapshot>,
    pub events: Vec<Event>,
}

impl PluginUpdate {
    pub fn none() -> Self {
        Self::default()
    }
}

/// A component that observes thread growth, may inject state into agent
/// and selector prompts, may force the next speaker, and can snapshot and
/// restore its own internal state across branches (§4.4).
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Lets the manager recover a concrete plugin type (e.g. to dispatch a
    /// `component_generation_request` straight to the analysis-watchlist
    /// plugin) without widening every hook on this trait for one call.
    fn as_any(&self) -> &dyn std::any::Any;

    /// Called after every thread append.
    async fn on_message_added(&self, ctx: &PluginContext<'_>, event: &Event) -> PluginUpdate;

    /// Called before speaker selection runs. Returning `Some(name)` forces
    /// that participant to speak next, short-circuiting the rest of the
    /// selection chain.
    async fn on_before_speaker_selection(&self, ctx: &PluginContext<'_>) -> Option<String>;

    /// Called inside `SendUserDirected`, before the message is published.
    async fn on_user_message(
        &self,
        ctx: &PluginContext<'_>,
        content: &str,
        target: &str,
    ) -> PluginUpdate;

    /// Called after a branch is created, so plugin-local state (separate
    /// from snapshot-backed state) can be reset or recovered.
    fn on_branch(&self, trim_count: u32, new_length: usize);

    /// Called by the manager with the snapshot it restored (the one at the
    /// largest index `<= new_length - 1`, or `None` if none exists yet),
    /// so a plugin whose visible state *is* the snapshot content can
    /// repopulate itself. Default is a no-op for plugins with no
    /// snapshot-backed state.
    fn restore_from_snapshot(&self, snapshot: Option<&Snapshot>) {
        let _ = snapshot;
    }

    /// Template variables injected into an agent's system prompt.
    fn state_for_agent(&self) -> HashMap<String, String>;

    /// Template variables injected into the selector prompt.
    fn state_for_selector(&self) -> HashMap<String, String>;

    fn save_state(&self) -> serde_json::Value;
    fn load_state(&self, state: serde_json::Value);
}
