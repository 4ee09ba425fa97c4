//! Session Manager (§4.7, §2 "Session Manager" row): owns every active
//! session keyed by id, builds fresh ones on first bind via a
//! [`TeamFactory`], and persists/reloads them to `state_dir`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use sa_agents::AgentInputQueue;
use sa_domain::config::GroupChatConfig;
use sa_domain::error::Result;
use sa_domain::trace::TraceEvent;
use sa_gcm::GroupChatManager;
use tokio::sync::Mutex;

use crate::persistence;
use crate::session::Session;
use crate::team::TeamFactory;

/// `session_id -> Session`, guarded by a single async mutex (§4.7
/// "Session. Hash map ... guarded by a mutex"). Session bodies use their
/// own interior locking (the manager is behind a `tokio::sync::Mutex`,
/// observers behind a `parking_lot::RwLock`), so holding this lock is
/// only ever needed for the map lookup/insert itself.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    team_factory: Arc<dyn TeamFactory>,
    state_dir: PathBuf,
}

impl SessionManager {
    pub fn new(team_factory: Arc<dyn TeamFactory>, state_dir: PathBuf) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            team_factory,
            state_dir,
        }
    }

    /// Return the existing session for `session_id` (a tab re-attach), or
    /// build a fresh one from `config` — restoring prior state from disk
    /// if a state file exists for this id.
    pub async fn get_or_create(&self, session_id: &str, config: &GroupChatConfig) -> Result<Arc<Session>> {
        let mut sessions = self.sessions.lock().await;

        if let Some(session) = sessions.get(session_id) {
            TraceEvent::SessionResumed {
                session_id: session_id.to_string(),
                observers: session.observer_count(),
            }
            .emit();
            return Ok(Arc::clone(session));
        }

        let team = self.team_factory.build_team(config)?;
        let input_queue = Arc::new(AgentInputQueue::new());
        let mut gcm = GroupChatManager::new(
            session_id,
            config.clone(),
            team.selector_llm,
            team.agents,
            team.plugins,
            input_queue.clone(),
        )?;

        let state_path = persistence::state_file_path(&self.state_dir, session_id);
        if state_path.exists() {
            persistence::load_into(&state_path, &mut gcm)?;
        }

        let session = Arc::new(Session::new(session_id, gcm, input_queue));
        sessions.insert(session_id.to_string(), Arc::clone(&session));

        TraceEvent::SessionCreated {
            session_id: session_id.to_string(),
        }
        .emit();

        Ok(session)
    }

    /// Write `session_id`'s current tree/snapshots/plugin state to disk.
    pub async fn persist(&self, session_id: &str) -> Result<()> {
        let sessions = self.sessions.lock().await;
        let Some(session) = sessions.get(session_id) else {
            return Ok(());
        };
        let manager = session.manager.lock().await;
        let path = persistence::state_file_path(&self.state_dir, session_id);
        persistence::save(&path, &manager)
    }

    /// Broadcast an already-translated wire frame to every observer of
    /// `session_id`. A no-op if the session doesn't exist (e.g. it was
    /// never bound, or was dropped after the last observer left).
    pub async fn broadcast(&self, session_id: &str, frame: sa_protocol::ServerFrame) {
        let sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(session_id) {
            session.broadcast(frame);
        }
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
