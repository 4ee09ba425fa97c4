use std::collections::HashMap;
use std::sync::Arc;

use sa_agents::{AgentContainer, AgentInputQueue, LlmClient};
use sa_domain::config::GroupChatConfig;
use sa_domain::error::{Error, Result};
use sa_domain::message::Event;
use sa_domain::tool::Message;
use sa_domain::trace::TraceEvent;
use sa_tree::{ConversationTree, NodeType, SnapshotStore, TreeNode};
use tokio_util::sync::CancellationToken;

use crate::plugin::{Plugin, PluginContext};
use crate::selection::{SelectionInput, SpeakerSelector};
use crate::termination::{TerminationChecker, TerminationReason};

/// Safety valve against a misbehaving selector/termination combination that
/// would otherwise spin forever without ever satisfying a stop condition.
const MAX_TURNS_PER_RUN: u32 = 1000;

/// What a run-advancing call produced: either it ran to a stop, or it
/// paused waiting on a human (`UserInputRequested` is already in `events`,
/// the caller surfaces it and calls back in via `AgentInputQueue`).
pub struct RunOutcome {
    pub events: Vec<Event>,
    /// The tree node id created for each entry in `events`, in lockstep
    /// (`None` for event variants that don't materialise a tree node —
    /// `SelectorEvent`, `StopMessage`, `UserInputRequested`, the two plugin
    /// update events). Observer-facing translation (§4.7 step 6) needs
    /// these ids for `agent_message`/`tool_call`/`tool_execution` frames.
    pub node_ids: Vec<Option<String>>,
    pub termination: Option<TerminationReason>,
}

/// Owns `message_thread` (via `ConversationTree`), runs speaker selection,
/// dispatches turns to `AgentContainer`s, and services interrupt/branch
/// commands (§4.1).
pub struct GroupChatManager {
    session_id: String,
    config: GroupChatConfig,
    tree: ConversationTree,
    snapshots: SnapshotStore,
    agents: HashMap<String, Arc<AgentContainer>>,
    selector: SpeakerSelector,
    selector_llm: Arc<dyn LlmClient>,
    termination: TerminationChecker,
    plugins: Vec<Arc<dyn Plugin>>,
    input_queue: Arc<AgentInputQueue>,
    previous_speaker: Option<String>,
    interrupted: bool,
    /// Cancelled by `interrupt()`; raced against every in-flight LLM call
    /// (selector, plugin, and agent turns alike) so an interrupt unwinds
    /// within one suspension point instead of waiting for the call to
    /// finish on its own.
    cancellation: CancellationToken,
}

impl GroupChatManager {
    pub fn new(
        session_id: impl Into<String>,
        config: GroupChatConfig,
        selector_llm: Arc<dyn LlmClient>,
        agents: HashMap<String, Arc<AgentContainer>>,
        plugins: Vec<Arc<dyn Plugin>>,
        input_queue: Arc<AgentInputQueue>,
    ) -> Result<Self> {
        config.validate()?;
        for name in &config.participants {
            if !agents.contains_key(name) {
                return Err(Error::Config(format!(
                    "no agent container registered for participant \"{name}\""
                )));
            }
        }

        let selector = SpeakerSelector::new(config.selector_prompt.clone(), config.max_selector_attempts);
        let termination = TerminationChecker::new(
            config.termination.conditions.clone(),
            config.max_turns,
        );

        Ok(Self {
            session_id: session_id.into(),
            config,
            tree: ConversationTree::new(),
            snapshots: SnapshotStore::new(),
            agents,
            selector,
            selector_llm,
            termination,
            plugins,
            input_queue,
            previous_speaker: None,
            interrupted: false,
            cancellation: CancellationToken::new(),
        })
    }

    pub fn tree(&self) -> &ConversationTree {
        &self.tree
    }

    /// Recovers the registered analysis-watchlist plugin, if any, so the
    /// gateway can dispatch `component_generation_request` straight to it
    /// instead of threading a second plugin list through the session.
    pub fn analysis_plugin(&self) -> Option<&crate::analysis::AnalysisWatchlistPlugin> {
        self.plugins
            .iter()
            .find_map(|p| p.as_any().downcast_ref::<crate::analysis::AnalysisWatchlistPlugin>())
    }

    /// The token `interrupt()` cancels; callers that make their own
    /// long-running LLM calls under the manager's lock (component
    /// generation) race against the same token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Replace the tree and snapshots wholesale (session load). Plugin
    /// state is not touched here; callers also call `load_state`.
    pub fn restore_tree(&mut self, tree: ConversationTree, snapshots: SnapshotStore) {
        self.tree = tree;
        self.snapshots = snapshots;
    }

    /// §4.1 `Start(task)` — publish the initial task and run until
    /// termination, an agent pauses on human input, or the safety valve
    /// trips.
    pub async fn start(&mut self, task: &str) -> Result<RunOutcome> {
        let root_id = uuid::Uuid::new_v4().to_string();
        self.tree.initialize_root(root_id, task)?;
        self.interrupted = false;
        self.cancellation = CancellationToken::new();
        self.termination.reset();

        TraceEvent::RunStarted {
            session_id: self.session_id.clone(),
            participants: self.config.participants.len(),
        }
        .emit();

        self.run_until_pause().await
    }

    /// §4.1 `Interrupt()` — never fails: every side-effect is best-effort.
    pub fn interrupt(&mut self) -> Event {
        self.interrupted = true;
        self.cancellation.cancel();
        let cancelled = self.input_queue.cancel_session(&self.session_id, "interrupted");
        tracing::info!(session_id = %self.session_id, cancelled, "interrupt issued");

        TraceEvent::InterruptIssued {
            session_id: self.session_id.clone(),
        }
        .emit();

        Event::StopMessage {
            source: "system".into(),
            content: "USER_INTERRUPT".into(),
        }
    }

    /// §4.1 `SendUserDirected(target, content, trim_count)`.
    pub async fn send_user_directed(
        &mut self,
        target: &str,
        content: &str,
        trim_count: u32,
    ) -> Result<RunOutcome> {
        if !self.agents.contains_key(target) {
            return Err(Error::Validation(format!("unknown target agent \"{target}\"")));
        }

        self.interrupted = false;
        self.cancellation = CancellationToken::new();

        if trim_count > 0 {
            self.apply_trim(trim_count)?;
        }

        let new_node_id = uuid::Uuid::new_v4().to_string();
        let node_id = if trim_count > 0 {
            self.tree.create_branch(new_node_id, trim_count, content)?.id.clone()
        } else {
            self.tree.add_node(new_node_id, "You", content, NodeType::Message)?.id.clone()
        };
        let message_index = self.tree.active_message_path().len().saturating_sub(1);

        let ctx = PluginContext {
            message_index,
            participants: &self.config.participants,
            cancellation_token: self.cancellation.clone(),
        };

        let mut events = vec![Event::ChatMessage {
            source: "You".into(),
            content: content.to_string(),
            id: node_id.clone(),
        }];
        let mut node_ids = vec![Some(node_id)];

        for plugin in &self.plugins {
            let update = plugin.on_user_message(&ctx, content, target).await;
            if let Some(snapshot) = update.snapshot {
                self.snapshots.insert(message_index, snapshot);
            }
            for extra in update.events {
                events.push(extra);
                node_ids.push(None);
            }
        }

        self.previous_speaker = Some(target.to_string());
        let mut outcome = self.run_turn(target).await?;
        events.append(&mut outcome.events);
        node_ids.append(&mut outcome.node_ids);

        Ok(RunOutcome {
            events,
            node_ids,
            termination: outcome.termination,
        })
    }

    /// §4.1 `Reset()` — clears thread, termination state, and snapshots.
    /// Plugin state is untouched; callers that want a full reset should
    /// also call `load_state` with empty plugin blobs.
    pub fn reset(&mut self) {
        self.tree = ConversationTree::new();
        self.snapshots = SnapshotStore::new();
        self.termination.reset();
        self.previous_speaker = None;
        self.interrupted = false;
    }

    /// §4.1 `SaveState()` — thread, selection metadata, plugin state, and
    /// snapshots, all string-keyed for JSON round-tripping.
    pub fn save_state(&self) -> serde_json::Value {
        let plugin_states: HashMap<String, serde_json::Value> = self
            .plugins
            .iter()
            .map(|p| (p.name().to_string(), p.save_state()))
            .collect();

        serde_json::json!({
            "session_id": self.session_id,
            "previous_speaker": self.previous_speaker,
            "plugins": plugin_states,
        })
    }

    pub fn load_state(&self, state: &serde_json::Value) {
        let Some(plugin_states) = state.get("plugins").and_then(|v| v.as_object()) else {
            return;
        };
        for plugin in &self.plugins {
            if let Some(blob) = plugin_states.get(plugin.name()) {
                plugin.load_state(blob.clone());
            }
        }
    }

    /// Translate a manager-level trim count into a tree-level one and
    /// restore the largest snapshot at or before the resulting thread
    /// length, notifying every plugin so snapshot-backed state recovers.
    fn apply_trim(&mut self, trim_count: u32) -> Result<()> {
        let full_path = self.tree.active_path();
        let plan = sa_tree::TrimPlan::translate(&full_path, trim_count)?;

        let message_count = self.tree.active_message_path().len();
        let new_length = message_count.saturating_sub(plan.messages_removed);
        self.snapshots.truncate_after(new_length.saturating_sub(1));
        let restored = self.snapshots.restore_at_or_before(new_length.saturating_sub(1));

        TraceEvent::SnapshotRestored {
            session_id: self.session_id.clone(),
            requested_index: new_length.saturating_sub(1),
            restored_index: restored.map(|(idx, _)| idx),
        }
        .emit();

        let snapshot = restored.map(|(_, s)| s.clone());
        for plugin in &self.plugins {
            plugin.on_branch(trim_count, new_length);
            plugin.restore_from_snapshot(snapshot.as_ref());
        }

        Ok(())
    }

    /// Drive the manager forward: select a speaker, run its turn, repeat
    /// until termination, an interrupt, or a human-input pause.
    async fn run_until_pause(&mut self) -> Result<RunOutcome> {
        let mut all_events = Vec::new();
        let mut all_node_ids = Vec::new();

        for _ in 0..MAX_TURNS_PER_RUN {
            if self.interrupted {
                break;
            }

            let speaker = self.select_speaker().await?;
            let mut outcome = self.run_turn(&speaker).await?;
            let terminated = outcome.termination.is_some();
            all_events.append(&mut outcome.events);
            all_node_ids.append(&mut outcome.node_ids);

            if terminated {
                return Ok(RunOutcome {
                    events: all_events,
                    node_ids: all_node_ids,
                    termination: outcome.termination,
                });
            }
        }

        Ok(RunOutcome {
            events: all_events,
            node_ids: all_node_ids,
            termination: None,
        })
    }

    async fn select_speaker(&self) -> Result<String> {
        let mut plugin_override = None;
        let ctx = PluginContext {
            message_index: self.tree.len().saturating_sub(1),
            participants: &self.config.participants,
            cancellation_token: self.cancellation.clone(),
        };
        for plugin in &self.plugins {
            if let Some(name) = plugin.on_before_speaker_selection(&ctx).await {
                plugin_override = Some(name);
                break;
            }
        }

        let mut extra_context = HashMap::new();
        for plugin in &self.plugins {
            extra_context.extend(plugin.state_for_selector());
        }

        let thread = self.thread_events();
        let input = SelectionInput {
            session_id: &self.session_id,
            thread: &thread,
            participants: &self.config.participants,
            participant_descriptions: &self.config.participant_descriptions,
            previous_speaker: self.previous_speaker.as_deref(),
            allow_repeated_speaker: self.config.allow_repeated_speaker,
            plugin_override,
            extra_context,
        };

        let (speaker, source) = self
            .selector
            .select(self.selector_llm.as_ref(), &input, &self.cancellation)
            .await?;

        TraceEvent::SpeakerSelected {
            session_id: self.session_id.clone(),
            speaker: speaker.clone(),
            via: source,
        }
        .emit();

        Ok(speaker)
    }

    /// Run one agent's full turn (LLM call plus any tool round-trips),
    /// appending every event it produces to the tree and checking
    /// termination after each.
    async fn run_turn(&mut self, speaker: &str) -> Result<RunOutcome> {
        let agent = self
            .agents
            .get(speaker)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("unknown participant \"{speaker}\"")))?;

        let history = self.history_messages();
        let produced = agent.take_turn(&history, self.cancellation.clone()).await?;

        let mut events = Vec::with_capacity(produced.len());
        let mut node_ids = Vec::with_capacity(produced.len());
        let mut termination = None;

        for event in produced {
            let (node_id, extra_events) = self.append_event(&event).await?;
            events.push(event.clone());
            node_ids.push(node_id);
            for extra in extra_events {
                events.push(extra);
                node_ids.push(None);
            }

            if event.is_message() {
                self.previous_speaker = Some(speaker.to_string());
            }

            if let Some(reason) = self.termination.check(&event) {
                TraceEvent::TerminationTriggered {
                    session_id: self.session_id.clone(),
                    reason: format!("{reason:?}"),
                }
                .emit();
                termination = Some(reason);
                break;
            }
        }

        Ok(RunOutcome {
            events,
            node_ids,
            termination,
        })
    }

    /// Append one event to the tree and run every plugin's
    /// `on_message_added` hook, serialised in registration order (§4.4).
    /// Returns the new tree node's id, or `None` for event variants that
    /// don't materialise one (the observer-facing translation in the
    /// gateway needs this id for `agent_message`/`tool_call`/
    /// `tool_execution` frames).
    async fn append_event(&mut self, event: &Event) -> Result<(Option<String>, Vec<Event>)> {
        let node_type = match event {
            Event::ChatMessage { .. } => NodeType::Message,
            Event::ToolCallRequest { .. } => NodeType::ToolCall,
            Event::ToolCallExecution { .. } => NodeType::ToolExecution,
            _ => return Ok((None, Vec::new())),
        };

        let id = uuid::Uuid::new_v4().to_string();
        let source = event.source().unwrap_or("system").to_string();
        let content = serde_json::to_string(event).unwrap_or_default();
        self.tree.add_node(id.clone(), source, content, node_type)?;

        let message_index = self.tree.active_message_path().len().saturating_sub(1);
        let ctx = PluginContext {
            message_index,
            participants: &self.config.participants,
            cancellation_token: self.cancellation.clone(),
        };

        let mut extra_events = Vec::new();
        for plugin in &self.plugins {
            let update = plugin.on_message_added(&ctx, event).await;
            if let Some(snapshot) = update.snapshot {
                self.snapshots.insert(message_index, snapshot);
                TraceEvent::SnapshotWritten {
                    session_id: self.session_id.clone(),
                    message_index,
                }
                .emit();
            }
            extra_events.extend(update.events);
        }

        Ok((Some(id), extra_events))
    }

    /// Reconstruct the `Event` thread from the active path, for the
    /// selector prompt's `{history}` placeholder.
    fn thread_events(&self) -> Vec<Event> {
        self.tree
            .active_path()
            .into_iter()
            .filter_map(Self::event_from_node)
            .collect()
    }

    fn event_from_node(node: &TreeNode) -> Option<Event> {
        serde_json::from_str(&node.content).ok()
    }

    /// The provider-agnostic message history every agent's turn sees:
    /// every `ChatMessage` on the active path, oldest first.
    fn history_messages(&self) -> Vec<Message> {
        self.thread_events()
            .iter()
            .filter_map(|e| match e {
                Event::ChatMessage { source, content, .. } => {
                    if source == "You" {
                        Some(Message::user(content.clone()))
                    } else {
                        Some(Message::assistant(content.clone()))
                    }
                }
                _ => None,
            })
            .collect()
    }
}
