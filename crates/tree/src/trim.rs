use sa_domain::error::{Error, Result};

use crate::node::{NodeType, TreeNode};

/// Result of translating a UI-facing "redirect N turns back" request into
/// tree-level trim parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimPlan {
    /// Number of logical units walked past — this is the value
    /// `ConversationTree::create_branch` expects.
    pub trim_count: u32,
    /// Total nodes skipped on the old active path, including both halves
    /// of any `(tool_call, tool_execution)` pair.
    pub nodes_skipped: usize,
    /// Of `nodes_skipped`, how many were `message` nodes — the figure
    /// snapshot/message-index bookkeeping needs, since snapshots are keyed
    /// by message position, not raw node count.
    pub messages_removed: usize,
}

/// Translates a request to redirect the conversation `requested_units`
/// turns back into the `trim_count` the tree understands (§4.3).
///
/// A "turn" is one logical unit: either a single `message` node, or a
/// `(tool_call, tool_execution)` pair (§4.3, §8 invariant 6, scenario 3).
/// The pair is never split — walking past one always consumes both nodes
/// together and counts as exactly one unit, same as a lone message node.
pub fn translate(path: &[&TreeNode], requested_units: u32) -> Result<TrimPlan> {
    if requested_units == 0 {
        return Ok(TrimPlan {
            trim_count: 0,
            nodes_skipped: 0,
            messages_removed: 0,
        });
    }

    let mut remaining = requested_units;
    let mut nodes_skipped = 0usize;
    let mut messages_removed = 0usize;
    let mut i = path.len();

    while i > 0 {
        match path[i - 1].node_type {
            NodeType::Message => {
                nodes_skipped += 1;
                messages_removed += 1;
                i -= 1;
                remaining -= 1;
            }
            NodeType::ToolExecution => {
                if i < 2 || path[i - 2].node_type != NodeType::ToolCall {
                    return Err(Error::Validation(format!(
                        "tool_call_execution node {} has no matching preceding tool_call_request",
                        path[i - 1].id
                    )));
                }
                nodes_skipped += 2;
                i -= 2;
                remaining -= 1;
            }
            NodeType::ToolCall => {
                return Err(Error::Validation(format!(
                    "tool_call node {} has no matching tool_call_execution",
                    path[i - 1].id
                )));
            }
        }

        if remaining == 0 {
            return Ok(TrimPlan {
                trim_count: requested_units,
                nodes_skipped,
                messages_removed,
            });
        }
    }

    Err(Error::Validation(format!(
        "requested {requested_units} turns back but the active path only has {} unit(s)",
        requested_units - remaining
    )))
}
