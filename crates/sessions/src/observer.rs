//! Observer connections: the fan-out side of a session. Each connected
//! dashboard/tab gets one bounded outbound queue; the manager task never
//! blocks on a slow observer (§5 "Backpressure").

use sa_protocol::ServerFrame;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Outbound queue depth before a non-critical frame gets dropped rather
/// than blocking the broadcaster.
const OBSERVER_QUEUE_CAPACITY: usize = 256;

/// Stable identity for one connected observer, used to target
/// disconnect-time cleanup (cancel only requests owned by this observer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

impl ObserverId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The sending half of one observer's outbound frame queue. The receiving
/// half is owned by the gateway's per-connection writer task.
#[derive(Clone)]
pub struct ObserverHandle {
    tx: mpsc::Sender<ServerFrame>,
}

/// `false` for frames whose loss is tolerable because a later frame
/// supersedes them or the observer can recover on reconnect (a
/// `tree_update` always gives the full current state). Everything else is
/// sent best-effort via a detached task rather than dropped.
fn is_droppable(frame: &ServerFrame) -> bool {
    matches!(
        frame,
        ServerFrame::AgentMessage { .. }
            | ServerFrame::ToolCall { .. }
            | ServerFrame::ToolExecution { .. }
            | ServerFrame::StateUpdate { .. }
            | ServerFrame::AnalysisUpdate { .. }
    )
}

impl ObserverHandle {
    /// Create a handle plus the receiver the caller's writer task should
    /// drain.
    pub fn channel() -> (Self, mpsc::Receiver<ServerFrame>) {
        let (tx, rx) = mpsc::channel(OBSERVER_QUEUE_CAPACITY);
        (Self { tx }, rx)
    }

    /// Enqueue a frame for this observer. Never blocks: a full queue drops
    /// droppable frames immediately and routes everything else through a
    /// detached best-effort send.
    pub fn send(&self, frame: ServerFrame) {
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(frame)) => {
                if is_droppable(&frame) {
                    tracing::warn!("observer queue full, dropping frame");
                    return;
                }
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(frame).await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn distinct_ids_are_not_equal() {
        assert_ne!(ObserverId::new(), ObserverId::new());
    }

    #[tokio::test]
    async fn send_delivers_to_the_receiver() {
        let (handle, mut rx) = ObserverHandle::channel();
        handle.send(ServerFrame::InterruptAcknowledged { timestamp: Utc::now() });
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, ServerFrame::InterruptAcknowledged { .. }));
    }

    #[tokio::test]
    async fn full_queue_drops_droppable_frames_without_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = ObserverHandle { tx };
        handle.send(ServerFrame::AgentMessage {
            timestamp: Utc::now(),
            agent_name: "a".into(),
            content: "first".into(),
            summary: None,
            node_id: "n1".into(),
        });
        handle.send(ServerFrame::AgentMessage {
            timestamp: Utc::now(),
            agent_name: "a".into(),
            content: "second".into(),
            summary: None,
            node_id: "n2".into(),
        });
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, ServerFrame::AgentMessage { content, .. } if content == "first"));
        assert!(rx.try_recv().is_err());
    }
}
