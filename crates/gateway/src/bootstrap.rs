//! Builds [`AppState`] from a resolved [`Config`] (§6.5).

use std::sync::Arc;

use sa_domain::config::Config;
use sa_sessions::SessionManager;

use crate::auth;
use crate::state::AppState;
use crate::team::ConfigDrivenTeamFactory;

pub fn build_app_state(config: Arc<Config>) -> AppState {
    let team_factory = Arc::new(ConfigDrivenTeamFactory::new(config.clone()));
    let sessions = Arc::new(SessionManager::new(
        team_factory,
        config.sessions.state_dir.clone(),
    ));
    let api_token_hash = auth::token_hash_from_env();

    AppState {
        config,
        sessions,
        api_token_hash,
    }
}
