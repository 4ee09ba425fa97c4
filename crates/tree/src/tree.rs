use std::collections::HashMap;

use sa_domain::error::{Error, Result};

use crate::node::{NodeType, TreeNode};

/// The branching history of messages, rooted at the task (§3 "Conversation
/// tree"). Nodes are stored in a map keyed by id ("arena+index", §9)
/// rather than as a pointer graph, so persistence and lookup are both O(1)
/// and the structure cannot contain cycles.
#[derive(Debug, Clone)]
pub struct ConversationTree {
    root_id: Option<String>,
    node_map: HashMap<String, TreeNode>,
    current_node_id: Option<String>,
    current_branch_id: String,
}

impl Default for ConversationTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationTree {
    pub fn new() -> Self {
        Self {
            root_id: None,
            node_map: HashMap::new(),
            current_node_id: None,
            current_branch_id: "main".to_string(),
        }
    }

    /// Create the root node for a fresh run. Errors if a root already exists.
    pub fn initialize_root(&mut self, id: impl Into<String>, content: impl Into<String>) -> Result<()> {
        if self.root_id.is_some() {
            return Err(Error::Other("tree already has a root".into()));
        }
        let id = id.into();
        let node = TreeNode::new_root(id.clone(), content, self.current_branch_id.clone());
        self.node_map.insert(id.clone(), node);
        self.root_id = Some(id.clone());
        self.current_node_id = Some(id);
        Ok(())
    }

    pub fn root_id(&self) -> Option<&str> {
        self.root_id.as_deref()
    }

    pub fn current_node_id(&self) -> Option<&str> {
        self.current_node_id.as_deref()
    }

    pub fn current_branch_id(&self) -> &str {
        &self.current_branch_id
    }

    pub fn find(&self, id: &str) -> Option<&TreeNode> {
        self.node_map.get(id)
    }

    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }

    /// Append a new node as a child of the current node, and advance the
    /// cursor to it (§3 "Lifecycle").
    pub fn add_node(
        &mut self,
        id: impl Into<String>,
        agent_name: impl Into<String>,
        content: impl Into<String>,
        node_type: NodeType,
    ) -> Result<&TreeNode> {
        let parent_id = self
            .current_node_id
            .clone()
            .ok_or_else(|| Error::Other("tree has no current node; call initialize_root first".into()))?;

        let id = id.into();
        let agent_name = agent_name.into();
        let node = TreeNode {
            id: id.clone(),
            display_name: agent_name.clone(),
            agent_name,
            content: content.into(),
            summary: None,
            parent_id: Some(parent_id.clone()),
            children: Vec::new(),
            is_active: true,
            branch_id: self.current_branch_id.clone(),
            timestamp: chrono::Utc::now(),
            node_type,
        };

        self.node_map.insert(id.clone(), node);
        if let Some(parent) = self.node_map.get_mut(&parent_id) {
            parent.children.push(id.clone());
        }
        self.current_node_id = Some(id.clone());
        Ok(self.node_map.get(&id).expect("just inserted"))
    }

    /// The path from root to the current node, inclusive (§3 invariant 3:
    /// every node on this path is active).
    pub fn active_path(&self) -> Vec<&TreeNode> {
        let mut path = Vec::new();
        let mut cursor = self.current_node_id.clone();
        while let Some(id) = cursor {
            let node = match self.node_map.get(&id) {
                Some(n) => n,
                None => break,
            };
            path.push(node);
            cursor = node.parent_id.clone();
        }
        path.reverse();
        path
    }

    /// Only the `message` nodes on the active path, oldest first — this is
    /// the projection the trim translator counts against.
    pub fn active_message_path(&self) -> Vec<&TreeNode> {
        self.active_path()
            .into_iter()
            .filter(|n| n.node_type == NodeType::Message)
            .collect()
    }

    pub fn ancestors(&self, id: &str) -> Vec<&TreeNode> {
        let mut result = Vec::new();
        let mut cursor = self.node_map.get(id).and_then(|n| n.parent_id.clone());
        while let Some(pid) = cursor {
            let Some(node) = self.node_map.get(&pid) else { break };
            result.push(node);
            cursor = node.parent_id.clone();
        }
        result
    }

    pub fn children(&self, id: &str) -> Vec<&TreeNode> {
        self.node_map
            .get(id)
            .map(|n| n.children.iter().filter_map(|c| self.node_map.get(c)).collect())
            .unwrap_or_default()
    }

    pub fn descendants(&self, id: &str) -> Vec<&TreeNode> {
        let mut out = Vec::new();
        let mut stack: Vec<String> = self
            .node_map
            .get(id)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.node_map.get(&cur) {
                stack.extend(node.children.clone());
                out.push(node);
            }
        }
        out
    }

    pub fn siblings(&self, id: &str) -> Vec<&TreeNode> {
        let Some(node) = self.node_map.get(id) else { return Vec::new() };
        let Some(parent_id) = &node.parent_id else { return Vec::new() };
        self.children(parent_id)
            .into_iter()
            .filter(|n| n.id != id)
            .collect()
    }

    /// Breadth-limited view of a node's subtree, for partial tree updates.
    pub fn subtree(&self, id: &str, max_depth: Option<usize>) -> Vec<&TreeNode> {
        let Some(root) = self.node_map.get(id) else { return Vec::new() };
        let mut out = vec![root];
        let mut frontier = vec![(id.to_string(), 0usize)];
        while let Some((cur, depth)) = frontier.pop() {
            if let Some(max) = max_depth {
                if depth >= max {
                    continue;
                }
            }
            if let Some(node) = self.node_map.get(&cur) {
                for child_id in &node.children {
                    if let Some(child) = self.node_map.get(child_id) {
                        out.push(child);
                        frontier.push((child_id.clone(), depth + 1));
                    }
                }
            }
        }
        out
    }

    /// All nodes reachable from root — used by invariant 2
    /// (`|node_map| == nodes reachable from root`).
    pub fn reachable_from_root(&self) -> Vec<&TreeNode> {
        let Some(root_id) = &self.root_id else { return Vec::new() };
        let mut out = Vec::new();
        let Some(root) = self.node_map.get(root_id) else { return Vec::new() };
        out.push(root);
        out.extend(self.descendants(root_id));
        out
    }

    /// §4.2 `create_branch` semantics.
    ///
    /// 1. Walk up from `current_node`, counting one unit per `message` node
    ///    and one unit per recognized `(tool_call, tool_execution)` pair,
    ///    until `trim_count` such units are skipped (§4.3).
    /// 2. If that lands mid tool-call — a pair is structurally never a
    ///    standalone redirect point — keep walking up for free past any
    ///    trailing tool ancestors until a `message` node is reached.
    /// 3. Mark the child of the branch point on the old path (and all its
    ///    descendants) `is_active = false`.
    /// 4. Attach a new user node as a fresh child of the branch point; it
    ///    becomes `current_node`; `branch_id` is rotated.
    pub fn create_branch(
        &mut self,
        new_node_id: impl Into<String>,
        trim_count: u32,
        user_content: impl Into<String>,
    ) -> Result<&TreeNode> {
        let Some(start) = self.current_node_id.clone() else {
            return Err(Error::Other("tree has no current node".into()));
        };

        // `skipped_child` tracks the node one step below the branch point on
        // the old active path — the subtree it roots is what gets deactivated.
        let mut branch_point = start.clone();
        let mut skipped_child: Option<String> = None;

        if trim_count > 0 {
            let mut remaining = trim_count;
            while remaining > 0 {
                let Some(node) = self.node_map.get(&branch_point) else {
                    return Err(Error::Validation("trim_count exceeds the active path".into()));
                };
                match node.node_type {
                    NodeType::Message => {
                        let Some(parent_id) = node.parent_id.clone() else {
                            return Err(Error::Validation("trim_count exceeds the active path".into()));
                        };
                        skipped_child = Some(branch_point.clone());
                        branch_point = parent_id;
                        remaining -= 1;
                    }
                    NodeType::ToolExecution => {
                        let Some(call_id) = node.parent_id.clone() else {
                            return Err(Error::Validation("trim_count exceeds the active path".into()));
                        };
                        let Some(call_node) = self.node_map.get(&call_id) else {
                            return Err(Error::Validation("trim_count exceeds the active path".into()));
                        };
                        if call_node.node_type != NodeType::ToolCall {
                            return Err(Error::Validation(format!(
                                "tool_call_execution node {branch_point} has no matching preceding tool_call_request"
                            )));
                        }
                        let Some(call_parent_id) = call_node.parent_id.clone() else {
                            return Err(Error::Validation("trim_count exceeds the active path".into()));
                        };
                        // The tool_call node, not the execution, is the direct
                        // child of the new branch point — deactivating it
                        // takes the whole pair (and anything below it) along.
                        skipped_child = Some(call_id);
                        branch_point = call_parent_id;
                        remaining -= 1;
                    }
                    NodeType::ToolCall => {
                        return Err(Error::Validation(format!(
                            "tool_call node {branch_point} has no matching tool_call_execution"
                        )));
                    }
                }
            }

            // A tool_call/tool_execution pair can never be a redirect point on
            // its own; fold any trailing tool ancestors into the deactivated
            // tail for free until we reach a real message ancestor.
            loop {
                let Some(node) = self.node_map.get(&branch_point) else {
                    return Err(Error::Validation("trim_count exceeds the active path".into()));
                };
                if node.node_type == NodeType::Message {
                    break;
                }
                let Some(parent_id) = node.parent_id.clone() else {
                    return Err(Error::Validation("trim_count exceeds the active path".into()));
                };
                skipped_child = Some(branch_point.clone());
                branch_point = parent_id;
            }
        }

        // Mark the old sub-branch inactive: the skipped child and everything
        // below it.
        if let Some(child) = skipped_child {
            self.deactivate_subtree(&child);
        }

        let new_branch_id = uuid::Uuid::new_v4().to_string();
        let new_id = new_node_id.into();
        let node = TreeNode {
            id: new_id.clone(),
            agent_name: "You".into(),
            display_name: "You".into(),
            content: user_content.into(),
            summary: None,
            parent_id: Some(branch_point.clone()),
            children: Vec::new(),
            is_active: true,
            branch_id: new_branch_id.clone(),
            timestamp: chrono::Utc::now(),
            node_type: NodeType::Message,
        };
        self.node_map.insert(new_id.clone(), node);
        if let Some(parent) = self.node_map.get_mut(&branch_point) {
            parent.children.push(new_id.clone());
        }
        self.current_node_id = Some(new_id.clone());
        self.current_branch_id = new_branch_id;

        Ok(self.node_map.get(&new_id).expect("just inserted"))
    }

    fn deactivate_subtree(&mut self, id: &str) {
        let mut stack = vec![id.to_string()];
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.node_map.get_mut(&cur) {
                node.is_active = false;
                stack.extend(node.children.clone());
            }
        }
    }

    /// Rebuild `current_node_id` as the last active node along
    /// `current_branch_id`, used after loading from persistence.
    pub fn restore_cursor(&mut self) {
        let mut candidates: Vec<&TreeNode> = self
            .node_map
            .values()
            .filter(|n| n.is_active && n.branch_id == self.current_branch_id)
            .collect();
        candidates.sort_by_key(|n| n.timestamp);
        self.current_node_id = candidates.last().map(|n| n.id.clone());
    }

    pub(crate) fn node_map(&self) -> &HashMap<String, TreeNode> {
        &self.node_map
    }

    pub(crate) fn node_map_mut(&mut self) -> &mut HashMap<String, TreeNode> {
        &mut self.node_map
    }

    pub(crate) fn set_root_id(&mut self, id: Option<String>) {
        self.root_id = id;
    }

    pub(crate) fn set_current_node_id(&mut self, id: Option<String>) {
        self.current_node_id = id;
    }

    pub(crate) fn set_current_branch_id(&mut self, id: String) {
        self.current_branch_id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_three_messages() -> ConversationTree {
        let mut t = ConversationTree::new();
        t.initialize_root("root", "topic").unwrap();
        t.add_node("n1", "A", "hello from A", NodeType::Message).unwrap();
        t.add_node("n2", "B", "hello from B", NodeType::Message).unwrap();
        t.add_node("n3", "C", "hello from C", NodeType::Message).unwrap();
        t
    }

    #[test]
    fn initialize_root_sets_cursor() {
        let mut t = ConversationTree::new();
        t.initialize_root("root", "topic").unwrap();
        assert_eq!(t.current_node_id(), Some("root"));
        assert_eq!(t.root_id(), Some("root"));
    }

    #[test]
    fn double_initialize_fails() {
        let mut t = ConversationTree::new();
        t.initialize_root("root", "topic").unwrap();
        assert!(t.initialize_root("root2", "topic2").is_err());
    }

    #[test]
    fn add_node_advances_cursor_and_links_parent() {
        let mut t = tree_with_three_messages();
        assert_eq!(t.current_node_id(), Some("n3"));
        let n3 = t.find("n3").unwrap();
        assert_eq!(n3.parent_id.as_deref(), Some("n2"));
        let n2 = t.find("n2").unwrap();
        assert!(n2.children.contains(&"n3".to_string()));
    }

    #[test]
    fn active_path_is_root_to_cursor() {
        let t = tree_with_three_messages();
        let path: Vec<&str> = t.active_path().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(path, vec!["root", "n1", "n2", "n3"]);
    }

    #[test]
    fn node_map_size_equals_reachable_from_root() {
        let t = tree_with_three_messages();
        assert_eq!(t.len(), t.reachable_from_root().len());
    }

    #[test]
    fn create_branch_trim_1_deactivates_last_message_and_its_subtree() {
        let mut t = tree_with_three_messages();
        t.create_branch("u1", 1, "redirect").unwrap();

        // n3 (the last message) and its (empty) subtree are deactivated.
        assert!(!t.find("n3").unwrap().is_active);
        // The new node attaches to n2.
        let new_node = t.find("u1").unwrap();
        assert_eq!(new_node.parent_id.as_deref(), Some("n2"));
        assert!(new_node.is_active);
        assert_eq!(t.current_node_id(), Some("u1"));
        assert_ne!(new_node.branch_id, "main");
    }

    #[test]
    fn create_branch_trim_0_appends_sibling_without_deactivating() {
        let mut t = tree_with_three_messages();
        t.create_branch("u1", 0, "redirect").unwrap();
        assert!(t.find("n3").unwrap().is_active);
        let new_node = t.find("u1").unwrap();
        assert_eq!(new_node.parent_id.as_deref(), Some("n3"));
    }

    #[test]
    fn create_branch_to_root_attaches_there() {
        let mut t = tree_with_three_messages();
        // 3 message nodes above root (n1, n2, n3).
        t.create_branch("u1", 3, "redirect").unwrap();
        let new_node = t.find("u1").unwrap();
        assert_eq!(new_node.parent_id.as_deref(), Some("root"));
    }

    #[test]
    fn create_branch_exceeding_path_errors() {
        let mut t = tree_with_three_messages();
        assert!(t.create_branch("u1", 4, "redirect").is_err());
    }

    #[test]
    fn deactivating_subtree_marks_descendants_too() {
        let mut t = tree_with_three_messages();
        // Branch to n2 (trim 2): n3's subtree would be empty here, so add a
        // grandchild under n3 first to exercise cascading deactivation.
        t.add_node("n4", "A", "follow-up", NodeType::Message).unwrap();
        t.create_branch("u1", 2, "redirect").unwrap();
        assert!(!t.find("n3").unwrap().is_active);
        assert!(!t.find("n4").unwrap().is_active);
    }

    #[test]
    fn siblings_excludes_self() {
        let mut t = tree_with_three_messages();
        t.create_branch("u1", 1, "redirect").unwrap();
        let sibs: Vec<&str> = t.siblings("u1").iter().map(|n| n.id.as_str()).collect();
        assert_eq!(sibs, vec!["n3"]);
    }

    #[test]
    fn restore_cursor_finds_latest_active_node_on_branch() {
        let mut t = tree_with_three_messages();
        t.set_current_node_id(None);
        t.restore_cursor();
        assert_eq!(t.current_node_id(), Some("n3"));
    }

    /// thread: [task, a_msg, tc_req, tc_exec, b_msg]
    fn tree_with_tool_pair() -> ConversationTree {
        let mut t = ConversationTree::new();
        t.initialize_root("task", "topic").unwrap();
        t.add_node("a_msg", "A", "A's reply", NodeType::Message).unwrap();
        t.add_node("tc_req", "A", "call a tool", NodeType::ToolCall).unwrap();
        t.add_node("tc_exec", "A", "tool result", NodeType::ToolExecution).unwrap();
        t.add_node("b_msg", "B", "B's reply", NodeType::Message).unwrap();
        t
    }

    #[test]
    fn create_branch_trim_2_counts_tool_pair_as_one_unit() {
        let mut t = tree_with_tool_pair();
        t.create_branch("u1", 2, "redirect").unwrap();

        let new_node = t.find("u1").unwrap();
        assert_eq!(new_node.parent_id.as_deref(), Some("a_msg"));
        assert!(!t.find("tc_req").unwrap().is_active);
        assert!(!t.find("tc_exec").unwrap().is_active);
        assert!(!t.find("b_msg").unwrap().is_active);
    }

    #[test]
    fn create_branch_trim_1_lands_on_nearest_message_ancestor() {
        let mut t = tree_with_tool_pair();
        t.create_branch("u1", 1, "redirect").unwrap();

        // trim_count=1 only asks to skip b_msg, but the branch point can't
        // rest mid tool-call, so it continues up to a_msg, taking the whole
        // tool pair along with it.
        let new_node = t.find("u1").unwrap();
        assert_eq!(new_node.parent_id.as_deref(), Some("a_msg"));
        assert!(!t.find("tc_req").unwrap().is_active);
        assert!(!t.find("tc_exec").unwrap().is_active);
        assert!(!t.find("b_msg").unwrap().is_active);
    }

    #[test]
    fn create_branch_orphaned_tool_execution_errors() {
        let mut t = ConversationTree::new();
        t.initialize_root("task", "topic").unwrap();
        t.add_node("exec", "A", "dangling exec", NodeType::ToolExecution).unwrap();
        assert!(t.create_branch("u1", 1, "redirect").is_err());
    }
}
