//! A single session: the conversation tree/manager pair plus the set of
//! observers currently attached to it (§4.7 "Session").

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sa_agents::AgentInputQueue;
use sa_gcm::GroupChatManager;
use sa_protocol::ServerFrame;
use tokio::sync::Mutex;

use crate::observer::{ObserverHandle, ObserverId};

/// One active group chat: its manager (exclusive owner of the thread),
/// the input-queue it shares with every agent's paused turn, and the
/// observers currently watching it. Reconnects attach a new observer to
/// the same `Session` rather than creating a new one (§4.7 step 3).
pub struct Session {
    pub session_id: String,
    pub manager: Mutex<GroupChatManager>,
    pub input_queue: Arc<AgentInputQueue>,
    observers: RwLock<HashMap<ObserverId, ObserverHandle>>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, manager: GroupChatManager, input_queue: Arc<AgentInputQueue>) -> Self {
        Self {
            session_id: session_id.into(),
            manager: Mutex::new(manager),
            input_queue,
            observers: RwLock::new(HashMap::new()),
        }
    }

    /// Attach a new observer and return its id plus the receiver the
    /// caller's writer task should drain.
    pub fn attach_observer(&self) -> (ObserverId, tokio::sync::mpsc::Receiver<ServerFrame>) {
        let (handle, rx) = ObserverHandle::channel();
        let id = ObserverId::new();
        self.observers.write().insert(id, handle);
        (id, rx)
    }

    /// Detach an observer on disconnect. The session itself is kept alive
    /// for reconnect (§4.7 step 7); only the input-queue entries owned by
    /// this observer are the caller's responsibility to cancel.
    pub fn detach_observer(&self, id: ObserverId) {
        self.observers.write().remove(&id);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Fan a single frame out to every attached observer.
    pub fn broadcast(&self, frame: ServerFrame) {
        for handle in self.observers.read().values() {
            handle.send(frame.clone());
        }
    }
}
