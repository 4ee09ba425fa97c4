use std::collections::HashMap;
use std::fs;
use std::path::Path;

use sa_domain::error::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::node::TreeNode;
use crate::snapshot::SnapshotStore;
use crate::tree::ConversationTree;

/// On-disk representation of a conversation tree plus its sparse
/// snapshots, written atomically (write to `*.tmp`, then rename) so a
/// crash mid-write never leaves a half-written file behind.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TreeDocument {
    root_id: Option<String>,
    node_map: HashMap<String, TreeNode>,
    current_node_id: Option<String>,
    current_branch_id: String,
    snapshots: SnapshotStore,
    /// Opaque caller payload (e.g. plugin states), round-tripped unread.
    /// Defaults to `null` for documents written before this field existed.
    #[serde(default)]
    extra: serde_json::Value,
}

/// Serialize `tree` and `snapshots` to `path`, replacing any existing file.
pub fn save(path: &Path, tree: &ConversationTree, snapshots: &SnapshotStore) -> Result<()> {
    save_with_extra(path, tree, snapshots, serde_json::Value::Null)
}

/// Load a previously-saved tree from `path`. The tree's cursor is restored
/// via `restore_cursor` rather than trusted blindly, in case persistence
/// predates a crash that happened mid-branch-creation.
pub fn load(path: &Path) -> Result<(ConversationTree, SnapshotStore)> {
    let (tree, snapshots, _extra) = load_with_extra(path)?;
    Ok((tree, snapshots))
}

/// Like [`save`], but also embeds an arbitrary JSON payload in the same
/// file (§6.4: one JSON file per session holding `{tree, current_branch_id,
/// plugin_states}`) so the tree and whatever owns `extra` stay atomic with
/// each other.
pub fn save_with_extra(
    path: &Path,
    tree: &ConversationTree,
    snapshots: &SnapshotStore,
    extra: serde_json::Value,
) -> Result<()> {
    let doc = TreeDocument {
        root_id: tree.root_id().map(str::to_string),
        node_map: tree.node_map().clone(),
        current_node_id: tree.current_node_id().map(str::to_string),
        current_branch_id: tree.current_branch_id().to_string(),
        snapshots: snapshots.clone(),
        extra,
    };

    let json = serde_json::to_vec_pretty(&doc)?;

    let parent = path.parent().ok_or_else(|| Error::Config(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(parent)?;

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, &json)?;
    fs::rename(&tmp_path, path)?;

    tracing::debug!(path = %path.display(), nodes = doc.node_map.len(), "tree persisted");
    Ok(())
}

/// Like [`load`], but also returns the `extra` payload embedded by
/// [`save_with_extra`] (`Value::Null` if the file predates that field).
pub fn load_with_extra(path: &Path) -> Result<(ConversationTree, SnapshotStore, serde_json::Value)> {
    let bytes = fs::read(path)?;
    let doc: TreeDocument = serde_json::from_slice(&bytes)?;

    let mut tree = ConversationTree::new();
    tree.set_root_id(doc.root_id);
    *tree.node_map_mut() = doc.node_map;
    tree.set_current_branch_id(doc.current_branch_id);
    tree.set_current_node_id(doc.current_node_id);
    tree.restore_cursor();

    Ok((tree, doc.snapshots, doc.extra))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;

    #[test]
    fn save_then_load_is_a_fixed_point() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.json");

        let mut tree = ConversationTree::new();
        tree.initialize_root("root", "topic").unwrap();
        tree.add_node("n1", "A", "hi", NodeType::Message).unwrap();

        let mut snapshots = SnapshotStore::new();
        snapshots.insert(0, crate::snapshot::Snapshot {
            state_of_run: "working".into(),
            tool_call_facts: vec![],
            handoff_context: None,
        });

        save(&path, &tree, &snapshots).unwrap();
        let (loaded_tree, loaded_snapshots) = load(&path).unwrap();

        assert_eq!(loaded_tree.len(), tree.len());
        assert_eq!(loaded_tree.current_node_id(), Some("n1"));
        assert_eq!(loaded_snapshots.len(), snapshots.len());

        // Re-saving the loaded tree should reproduce the same byte length
        // class of document (fixed point), not merely "doesn't crash".
        let path2 = dir.path().join("tree2.json");
        save(&path2, &loaded_tree, &loaded_snapshots).unwrap();
        let original = fs::read_to_string(&path).unwrap();
        let roundtripped = fs::read_to_string(&path2).unwrap();
        assert_eq!(original, roundtripped);
    }

    #[test]
    fn load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(load(&path).is_err());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("tree.json");

        let mut tree = ConversationTree::new();
        tree.initialize_root("root", "topic").unwrap();
        let snapshots = SnapshotStore::new();

        save(&path, &tree, &snapshots).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn save_with_extra_roundtrips_the_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let mut tree = ConversationTree::new();
        tree.initialize_root("root", "topic").unwrap();
        let snapshots = SnapshotStore::new();
        let extra = serde_json::json!({"plugins": {"analysis_watchlist": {"pending": null}}});

        save_with_extra(&path, &tree, &snapshots, extra.clone()).unwrap();
        let (_loaded_tree, _loaded_snapshots, loaded_extra) = load_with_extra(&path).unwrap();
        assert_eq!(loaded_extra, extra);
    }

    #[test]
    fn load_defaults_extra_to_null_for_files_without_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.json");

        let mut tree = ConversationTree::new();
        tree.initialize_root("root", "topic").unwrap();
        let snapshots = SnapshotStore::new();

        save(&path, &tree, &snapshots).unwrap();
        let (_t, _s, extra) = load_with_extra(&path).unwrap();
        assert_eq!(extra, serde_json::Value::Null);
    }
}
