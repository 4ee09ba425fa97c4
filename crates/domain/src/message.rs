use serde::{Deserialize, Serialize};

/// The canonical event sum type flowing through the group-chat manager.
///
/// Every entry in a message thread is one of these variants. `ChatMessage`
/// and paired `ToolCallRequest`/`ToolCallExecution` entries are "logical" —
/// they count toward trim depth (§4.3); the rest do not.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A complete utterance from an agent or a user.
    #[serde(rename = "chat_message")]
    ChatMessage {
        source: String,
        content: String,
        id: String,
    },

    /// Partial text preceding a `ChatMessage` with matching `full_message_id`.
    /// Never counted toward trim depth and dropped from the live thread once
    /// its terminating `ChatMessage` lands (SPEC_FULL.md §9 Open Question iii).
    #[serde(rename = "streaming_chunk")]
    StreamingChunk {
        source: String,
        content: String,
        full_message_id: String,
    },

    /// Always immediately followed by a `ToolCallExecution` with the same
    /// `call_id` set; together counted as one logical node for trimming.
    #[serde(rename = "tool_call_request")]
    ToolCallRequest {
        source: String,
        calls: Vec<ToolCall>,
    },

    #[serde(rename = "tool_call_execution")]
    ToolCallExecution {
        source: String,
        results: Vec<ToolCallResult>,
    },

    /// Internal selector scratch output; not shown to observers by default.
    #[serde(rename = "selector_event")]
    SelectorEvent { source: String, content: String },

    /// Terminates the run. `content` carries the reason
    /// (e.g. `"USER_INTERRUPT"` for a non-terminal interrupt stop).
    #[serde(rename = "stop_message")]
    StopMessage { source: String, content: String },

    /// Emitted when a user-proxy agent needs a human answer.
    #[serde(rename = "user_input_requested")]
    UserInputRequested {
        source: String,
        request_id: String,
        prompt: String,
    },

    /// Plugin-emitted: the state-context plugin's three text blobs.
    #[serde(rename = "state_update")]
    StateUpdate {
        state_of_run: String,
        tool_call_facts: String,
        handoff_context: String,
        message_index: usize,
    },

    /// Plugin-emitted: the analysis-watchlist plugin's per-component scores.
    #[serde(rename = "analysis_update")]
    AnalysisUpdate {
        node_id: String,
        scores: Vec<ComponentScore>,
        triggered: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub call_id: String,
    pub name: String,
    pub ok: bool,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentScore {
    pub label: String,
    pub score: u8,
    pub reasoning: String,
}

impl Event {
    /// The agent/user name that produced this event, when the variant has one.
    pub fn source(&self) -> Option<&str> {
        match self {
            Event::ChatMessage { source, .. }
            | Event::StreamingChunk { source, .. }
            | Event::ToolCallRequest { source, .. }
            | Event::ToolCallExecution { source, .. }
            | Event::SelectorEvent { source, .. }
            | Event::StopMessage { source, .. }
            | Event::UserInputRequested { source, .. } => Some(source),
            Event::StateUpdate { .. } | Event::AnalysisUpdate { .. } => None,
        }
    }

    /// Whether this event counts as a "message" node for trim-depth purposes
    /// (§4.3, §8 "only fully-materialised ChatMessage events count").
    pub fn is_message(&self) -> bool {
        matches!(self, Event::ChatMessage { .. })
    }

    pub fn is_tool_call_request(&self) -> bool {
        matches!(self, Event::ToolCallRequest { .. })
    }

    pub fn is_tool_call_execution(&self) -> bool {
        matches!(self, Event::ToolCallExecution { .. })
    }

    /// `call_id`s carried by a `ToolCallRequest`/`ToolCallExecution`, used to
    /// verify pairing (invariant 4).
    pub fn call_ids(&self) -> Option<Vec<&str>> {
        match self {
            Event::ToolCallRequest { calls, .. } => {
                Some(calls.iter().map(|c| c.id.as_str()).collect())
            }
            Event::ToolCallExecution { results, .. } => {
                Some(results.iter().map(|r| r.call_id.as_str()).collect())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_is_message() {
        let e = Event::ChatMessage {
            source: "A".into(),
            content: "hi".into(),
            id: "1".into(),
        };
        assert!(e.is_message());
        assert_eq!(e.source(), Some("A"));
    }

    #[test]
    fn streaming_chunk_is_not_message() {
        let e = Event::StreamingChunk {
            source: "A".into(),
            content: "h".into(),
            full_message_id: "1".into(),
        };
        assert!(!e.is_message());
    }

    #[test]
    fn tool_pair_call_ids_match() {
        let req = Event::ToolCallRequest {
            source: "A".into(),
            calls: vec![ToolCall {
                id: "c1".into(),
                name: "search".into(),
                args: serde_json::json!({}),
            }],
        };
        let exec = Event::ToolCallExecution {
            source: "A".into(),
            results: vec![ToolCallResult {
                call_id: "c1".into(),
                name: "search".into(),
                ok: true,
                content: "result".into(),
            }],
        };
        assert_eq!(req.call_ids(), Some(vec!["c1"]));
        assert_eq!(exec.call_ids(), Some(vec!["c1"]));
    }

    #[test]
    fn serde_tag_roundtrip() {
        let e = Event::StopMessage {
            source: "system".into(),
            content: "USER_INTERRUPT".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"type\":\"stop_message\""));
        let back: Event = serde_json::from_str(&json).unwrap();
        match back {
            Event::StopMessage { content, .. } => assert_eq!(content, "USER_INTERRUPT"),
            _ => panic!("wrong variant"),
        }
    }
}
