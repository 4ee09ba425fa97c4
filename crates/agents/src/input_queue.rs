//! Agent-input queue — pauses a turn when an agent asks the human a
//! question, and resumes it when the observer answers (or interrupts).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

/// The outcome of a pending agent input request.
#[derive(Debug)]
pub enum InputResponse {
    Provided(String),
    Cancelled { reason: String },
}

struct PendingInput {
    session_id: String,
    agent_name: String,
    prompt: String,
    created_at: DateTime<Utc>,
    respond: oneshot::Sender<InputResponse>,
}

/// Serializable snapshot of a pending request, for the observer wire
/// protocol's `agent_input_request` frame.
#[derive(Debug, Clone, Serialize)]
pub struct PendingInputInfo {
    pub request_id: String,
    pub session_id: String,
    pub agent_name: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

/// Thread-safe table of in-flight `user_input_requested` events, keyed by
/// request id. One entry exists per paused turn.
#[derive(Default)]
pub struct AgentInputQueue {
    pending: RwLock<HashMap<String, PendingInput>>,
}

impl AgentInputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending request and return its id plus a receiver
    /// the caller should await (typically with a timeout).
    pub fn register(
        &self,
        session_id: impl Into<String>,
        agent_name: impl Into<String>,
        prompt: impl Into<String>,
    ) -> (String, oneshot::Receiver<InputResponse>) {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.write().insert(
            request_id.clone(),
            PendingInput {
                session_id: session_id.into(),
                agent_name: agent_name.into(),
                prompt: prompt.into(),
                created_at: Utc::now(),
                respond: tx,
            },
        );
        (request_id, rx)
    }

    /// Resolve a pending request with a human-provided answer. Returns
    /// `true` if a matching request was found and still pending.
    pub fn provide(&self, request_id: &str, content: String) -> bool {
        if let Some(pending) = self.pending.write().remove(request_id) {
            let _ = pending.respond.send(InputResponse::Provided(content));
            return true;
        }
        false
    }

    /// Cancel a pending request (e.g. the run was interrupted before the
    /// human answered).
    pub fn cancel(&self, request_id: &str, reason: impl Into<String>) -> bool {
        if let Some(pending) = self.pending.write().remove(request_id) {
            let _ = pending.respond.send(InputResponse::Cancelled {
                reason: reason.into(),
            });
            return true;
        }
        false
    }

    /// Cancel every pending request belonging to a session (used when the
    /// whole run terminates while a question is outstanding).
    pub fn cancel_session(&self, session_id: &str, reason: &str) -> usize {
        let ids: Vec<String> = self
            .pending
            .read()
            .iter()
            .filter(|(_, p)| p.session_id == session_id)
            .map(|(id, _)| id.clone())
            .collect();
        let mut cancelled = 0;
        for id in ids {
            if self.cancel(&id, reason) {
                cancelled += 1;
            }
        }
        cancelled
    }

    pub fn list_pending_for_session(&self, session_id: &str) -> Vec<PendingInputInfo> {
        self.pending
            .read()
            .iter()
            .filter(|(_, p)| p.session_id == session_id)
            .map(|(id, p)| PendingInputInfo {
                request_id: id.clone(),
                session_id: p.session_id.clone(),
                agent_name: p.agent_name.clone(),
                prompt: p.prompt.clone(),
                created_at: p.created_at,
            })
            .collect()
    }

    pub fn remove_expired(&self, request_id: &str) {
        self.pending.write().remove(request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn provide_resolves_the_waiting_receiver() {
        let queue = AgentInputQueue::new();
        let (request_id, rx) = queue.register("s1", "agent_a", "pick a number");

        assert!(queue.provide(&request_id, "42".into()));
        match rx.await.unwrap() {
            InputResponse::Provided(v) => assert_eq!(v, "42"),
            _ => panic!("expected Provided"),
        }
    }

    #[tokio::test]
    async fn cancel_resolves_as_cancelled() {
        let queue = AgentInputQueue::new();
        let (request_id, rx) = queue.register("s1", "agent_a", "pick a number");

        assert!(queue.cancel(&request_id, "interrupted"));
        match rx.await.unwrap() {
            InputResponse::Cancelled { reason } => assert_eq!(reason, "interrupted"),
            _ => panic!("expected Cancelled"),
        }
    }

    #[test]
    fn provide_unknown_request_returns_false() {
        let queue = AgentInputQueue::new();
        assert!(!queue.provide("missing", "x".into()));
    }

    #[test]
    fn cancel_session_cancels_only_matching_session() {
        let queue = AgentInputQueue::new();
        let (_id1, _rx1) = queue.register("s1", "a", "q1");
        let (_id2, _rx2) = queue.register("s2", "a", "q2");

        let cancelled = queue.cancel_session("s1", "run terminated");
        assert_eq!(cancelled, 1);
        assert_eq!(queue.list_pending_for_session("s2").len(), 1);
        assert!(queue.list_pending_for_session("s1").is_empty());
    }

    #[test]
    fn list_pending_reflects_registrations() {
        let queue = AgentInputQueue::new();
        let (_id, _rx) = queue.register("s1", "agent_a", "what next?");
        let pending = queue.list_pending_for_session("s1");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].agent_name, "agent_a");
    }
}
