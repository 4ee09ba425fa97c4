//! Shared application state handed to every axum handler.

use std::sync::Arc;

use sa_domain::config::Config;
use sa_sessions::SessionManager;

/// Everything a request handler needs: the resolved config, the one
/// [`SessionManager`] shared by every connection, and the cached API
/// token digest (`None` in dev mode — see [`crate::auth`]).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
    pub api_token_hash: Option<Vec<u8>>,
}
