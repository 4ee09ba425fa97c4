//! `sa-protocol` — the observer wire protocol: the JSON text frames
//! exchanged between the gateway and a connected dashboard/tab (§6.1).
//!
//! Every frame carries `type` and `timestamp`; the gateway crate is
//! responsible for translating between these wire shapes and the
//! `sa_gcm`/`sa_tree` domain types, and for the `timestamp` stamping
//! itself (this crate has no clock dependency).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sa_tree::TreeNode;
use serde::{Deserialize, Serialize};

/// A client → server frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "start_run")]
    StartRun {
        session_id: String,
        #[serde(default)]
        initial_topic: Option<String>,
        #[serde(default)]
        company_name: Option<String>,
        #[serde(default)]
        bill_name: Option<String>,
        #[serde(default)]
        congress: Option<String>,
        #[serde(default)]
        analysis_prompt: Option<String>,
        #[serde(default)]
        trigger_threshold: Option<u8>,
    },

    #[serde(rename = "run_start_confirmed")]
    RunStartConfirmed {
        session_id: String,
        #[serde(default)]
        approved_components: Vec<String>,
    },

    #[serde(rename = "user_interrupt")]
    UserInterrupt {},

    #[serde(rename = "user_directed_message")]
    UserDirectedMessage {
        content: String,
        target_agent: String,
        #[serde(default)]
        trim_count: u32,
    },

    #[serde(rename = "human_input_response")]
    HumanInputResponse { request_id: String, user_input: String },

    #[serde(rename = "terminate_request")]
    TerminateRequest {},

    #[serde(rename = "component_generation_request")]
    ComponentGenerationRequest { analysis_prompt: String },
}

/// A server → client frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "agent_team_names")]
    AgentTeamNames {
        timestamp: DateTime<Utc>,
        names: Vec<String>,
    },

    #[serde(rename = "agent_details")]
    AgentDetails {
        timestamp: DateTime<Utc>,
        details: HashMap<String, String>,
    },

    #[serde(rename = "participant_names")]
    ParticipantNames {
        timestamp: DateTime<Utc>,
        participants: Vec<String>,
    },

    #[serde(rename = "agent_message")]
    AgentMessage {
        timestamp: DateTime<Utc>,
        agent_name: String,
        content: String,
        #[serde(default)]
        summary: Option<String>,
        node_id: String,
    },

    #[serde(rename = "tool_call")]
    ToolCall {
        timestamp: DateTime<Utc>,
        agent_name: String,
        tools: Vec<ToolCallSummary>,
        node_id: String,
    },

    #[serde(rename = "tool_execution")]
    ToolExecution {
        timestamp: DateTime<Utc>,
        agent_name: String,
        results: Vec<ToolExecutionSummary>,
        node_id: String,
    },

    #[serde(rename = "tree_update")]
    TreeUpdate {
        timestamp: DateTime<Utc>,
        root: Vec<TreeNode>,
        current_branch_id: String,
    },

    #[serde(rename = "state_update")]
    StateUpdate {
        timestamp: DateTime<Utc>,
        state_of_run: String,
        tool_call_facts: String,
        handoff_context: String,
        message_index: usize,
    },

    #[serde(rename = "analysis_update")]
    AnalysisUpdate {
        timestamp: DateTime<Utc>,
        node_id: String,
        scores: HashMap<String, ComponentScoreDetail>,
        triggered_components: Vec<String>,
    },

    #[serde(rename = "analysis_components_init")]
    AnalysisComponentsInit {
        timestamp: DateTime<Utc>,
        components: Vec<WatchlistComponentView>,
    },

    #[serde(rename = "agent_input_request")]
    AgentInputRequest {
        timestamp: DateTime<Utc>,
        request_id: String,
        prompt: String,
        agent_name: String,
        #[serde(default)]
        feedback_context: Option<String>,
    },

    #[serde(rename = "interrupt_acknowledged")]
    InterruptAcknowledged { timestamp: DateTime<Utc> },

    #[serde(rename = "stream_end")]
    StreamEnd {
        timestamp: DateTime<Utc>,
        reason: String,
    },

    #[serde(rename = "run_termination")]
    RunTermination {
        timestamp: DateTime<Utc>,
        status: RunStatus,
        reason: String,
        source: String,
    },

    #[serde(rename = "error")]
    Error {
        timestamp: DateTime<Utc>,
        error_code: String,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Completed,
    Interrupted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallSummary {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionSummary {
    pub tool_call_id: String,
    pub tool_name: String,
    pub success: bool,
    pub result: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentScoreDetail {
    pub score: u8,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistComponentView {
    pub label: String,
    pub description: String,
    pub color: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frame_round_trips_through_json() {
        let frame = ClientFrame::UserDirectedMessage {
            content: "please redirect".into(),
            target_agent: "agent_a".into(),
            trim_count: 2,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"user_directed_message\""));
        let back: ClientFrame = serde_json::from_str(&json).unwrap();
        match back {
            ClientFrame::UserDirectedMessage { trim_count, .. } => assert_eq!(trim_count, 2),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn empty_object_frames_parse_with_no_fields() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"user_interrupt"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::UserInterrupt {}));
    }

    #[test]
    fn run_termination_serializes_status_as_screaming_snake_case() {
        let frame = ServerFrame::RunTermination {
            timestamp: Utc::now(),
            status: RunStatus::Interrupted,
            reason: "USER_INTERRUPT".into(),
            source: "manager".into(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"status\":\"INTERRUPTED\""));
    }

    #[test]
    fn start_run_optional_fields_default_to_none() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"start_run","session_id":"s1"}"#).unwrap();
        match frame {
            ClientFrame::StartRun {
                session_id,
                initial_topic,
                trigger_threshold,
                ..
            } => {
                assert_eq!(session_id, "s1");
                assert!(initial_topic.is_none());
                assert!(trigger_threshold.is_none());
            }
            _ => panic!("wrong variant"),
        }
    }
}
