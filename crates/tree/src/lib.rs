//! `sa-tree` — the conversation tree: branching message history, sparse
//! state snapshots, the trim translator, and atomic on-disk persistence.
//!
//! Nodes are stored in an id-keyed arena (`ConversationTree`) rather than a
//! pointer graph, so the whole structure is trivially `Send`, cheap to
//! clone for a wire snapshot, and free of reference-cycle bookkeeping.

pub mod node;
pub mod persistence;
pub mod snapshot;
pub mod tree;
pub mod trim;

pub use node::{NodeType, TreeNode};
pub use snapshot::{Snapshot, SnapshotStore};
pub use tree::ConversationTree;
pub use trim::TrimPlan;
