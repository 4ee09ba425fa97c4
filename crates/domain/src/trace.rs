use serde::Serialize;

/// Structured trace events emitted across the group-chat runtime.
///
/// Each variant mirrors a lifecycle transition described in the spec; emit
/// these instead of ad-hoc log lines so the event stream stays machine
/// parseable (`trace_event` field carries the JSON payload).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        session_id: String,
    },
    SessionResumed {
        session_id: String,
        observers: usize,
    },
    RunStarted {
        session_id: String,
        participants: usize,
    },
    SpeakerSelected {
        session_id: String,
        speaker: String,
        via: SelectionSource,
    },
    SelectorAttempt {
        session_id: String,
        attempt: u32,
        max_attempts: u32,
        reason: String,
    },
    /// Emitted whenever the selector exhausts its attempt budget and falls
    /// back to the previous speaker (or the first participant). See
    /// SPEC_FULL.md §9 Open Question (i) — the fallback is allowed but must
    /// never be silent.
    SelectorFallback {
        session_id: String,
        attempts: u32,
        fallback_speaker: String,
    },
    TerminationTriggered {
        session_id: String,
        reason: String,
    },
    InterruptIssued {
        session_id: String,
    },
    BranchCreated {
        session_id: String,
        trim_count: u32,
        new_branch_id: String,
        new_length: usize,
    },
    SnapshotWritten {
        session_id: String,
        message_index: usize,
    },
    SnapshotRestored {
        session_id: String,
        requested_index: usize,
        restored_index: Option<usize>,
    },
    AgentInputRequested {
        session_id: String,
        request_id: String,
        agent_name: String,
    },
    AgentInputProvided {
        session_id: String,
        request_id: String,
    },
    AgentInputCancelled {
        session_id: String,
        request_id: String,
        reason: String,
    },
    PluginHookError {
        session_id: String,
        plugin: String,
        hook: String,
        message: String,
    },
    AnalysisTriggered {
        session_id: String,
        node_id: String,
        components: Vec<String>,
    },
}

/// Where a speaker-selection decision came from (§4.1 precedence chain).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionSource {
    PluginOverride,
    SelectorFunc,
    CandidateFunc,
    Llm,
    FallbackPrevious,
    FallbackFirst,
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "gcm_event");
    }
}
