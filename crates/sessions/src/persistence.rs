//! Session-level persistence (§6.4): one JSON file per session holding
//! the tree, its snapshots, and every plugin's serialized state, written
//! atomically via `sa_tree::persistence`'s `*.tmp` + rename.

use std::path::{Path, PathBuf};

use sa_domain::error::Result;
use sa_gcm::GroupChatManager;

/// Resolve the on-disk path for a session's state file under `state_dir`.
pub fn state_file_path(state_dir: &Path, session_id: &str) -> PathBuf {
    state_dir.join(format!("{session_id}.json"))
}

/// Persist a manager's tree, snapshots, and plugin state to `path`.
pub fn save(path: &Path, manager: &GroupChatManager) -> Result<()> {
    sa_tree::persistence::save_with_extra(path, manager.tree(), manager.snapshots(), manager.save_state())
}

/// Load a tree and snapshots from `path` and apply them plus the embedded
/// plugin state to `manager`. The caller is responsible for having built
/// `manager` with the same config/agent roster the session was saved with.
pub fn load_into(path: &Path, manager: &mut GroupChatManager) -> Result<()> {
    let (tree, snapshots, plugin_state) = sa_tree::persistence::load_with_extra(path)?;
    manager.restore_tree(tree, snapshots);
    manager.load_state(&plugin_state);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_file_path_joins_session_id_with_json_extension() {
        let path = state_file_path(Path::new("/data/sessions"), "s1");
        assert_eq!(path, PathBuf::from("/data/sessions/s1.json"));
    }
}
