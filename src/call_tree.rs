//! Arena-backed call tree of operator invocations
//!
//! One [`CallTree`] per worker thread. Nodes live in a flat arena and refer to
//! their children by [`NodeId`], so the attribution pass can keep an explicit
//! stack of indices instead of recursing.
//!
//! # Geometry
//!
//! ```text
//! ProfilerStep#1 [0, 1000)           (structural, not an operator)
//! ├─ aten::linear [10, 400)
//! │  └─ aten::addmm [20, 390)
//! └─ Optimizer.step [500, 900)       (structural)
//!    └─ aten::add_ [510, 600)
//! ```
//!
//! Intervals are half-open. A child's interval lies inside its parent's and
//! siblings are disjoint and ordered by start time. The tree does not check
//! any of this; the upstream tree builder guarantees it, and violations only
//! degrade attribution.

use crate::memory_metrics::DeviceMetrics;
use crate::memory_record::RecordId;
use std::collections::BTreeSet;
use std::fmt;

/// Index of a node inside its [`CallTree`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A single invocation in the call tree
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub name: String,
    pub start_time: i64,
    pub end_time: i64,
    /// Real operators own memory metrics; step markers, optimizer steps and
    /// data loader spans do not.
    pub is_operator: bool,
    children: Vec<NodeId>,
    memory_records: BTreeSet<RecordId>,
    /// Filled by aggregation, keyed by device name
    pub memory_metrics: DeviceMetrics,
}

impl TreeNode {
    fn new(name: impl Into<String>, start_time: i64, end_time: i64, is_operator: bool) -> Self {
        Self {
            name: name.into(),
            start_time,
            end_time,
            is_operator,
            children: Vec::new(),
            memory_records: BTreeSet::new(),
            memory_metrics: DeviceMetrics::new(),
        }
    }

    /// Children in start-time order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Records attributed to this node
    pub fn memory_records(&self) -> &BTreeSet<RecordId> {
        &self.memory_records
    }

    /// Attribute a record to this node.
    ///
    /// Returns `false` if the record was already attributed here.
    pub fn add_memory_record(&mut self, record: RecordId) -> bool {
        self.memory_records.insert(record)
    }

    /// Whether `ts` falls in `[start_time, end_time)`
    pub fn contains(&self, ts: i64) -> bool {
        self.start_time <= ts && ts < self.end_time
    }
}

/// Call tree for one worker thread
#[derive(Debug, Clone)]
pub struct CallTree {
    tid: u64,
    nodes: Vec<TreeNode>,
    root: Option<NodeId>,
}

impl CallTree {
    /// Create an empty tree for thread `tid`
    pub fn new(tid: u64) -> Self {
        Self {
            tid,
            nodes: Vec::new(),
            root: None,
        }
    }

    pub fn tid(&self) -> u64 {
        self.tid
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Set the root node. Replaces any previous root; earlier nodes stay in
    /// the arena but become unreachable.
    pub fn set_root(
        &mut self,
        name: impl Into<String>,
        start_time: i64,
        end_time: i64,
        is_operator: bool,
    ) -> NodeId {
        let id = self.push(TreeNode::new(name, start_time, end_time, is_operator));
        self.root = Some(id);
        id
    }

    /// Append a child to `parent`. Children must be added in start-time order.
    ///
    /// # Panics
    /// Panics if `parent` does not belong to this tree.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        start_time: i64,
        end_time: i64,
        is_operator: bool,
    ) -> NodeId {
        let id = self.push(TreeNode::new(name, start_time, end_time, is_operator));
        self.nodes[parent.0].children.push(id);
        id
    }

    fn push(&mut self, node: TreeNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut TreeNode {
        &mut self.nodes[id.0]
    }

    /// Number of nodes in the arena
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over every node in the arena with its id
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &TreeNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Find the first node with the given name (arena order)
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes().find(|(_, n)| n.name == name).map(|(id, _)| id)
    }

    /// Drop every attributed record and every aggregated metric
    pub fn clear_memory(&mut self) {
        for node in &mut self.nodes {
            node.memory_records.clear();
            node.memory_metrics.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_tree() {
        let mut tree = CallTree::new(7);
        let root = tree.set_root("ProfilerStep#1", 0, 100, false);
        let a = tree.add_child(root, "aten::linear", 10, 40, true);
        let b = tree.add_child(root, "aten::relu", 50, 60, true);
        let c = tree.add_child(a, "aten::addmm", 15, 35, true);

        assert_eq!(tree.tid(), 7);
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.root(), Some(root));
        assert_eq!(tree.node(root).children(), &[a, b]);
        assert_eq!(tree.node(a).children(), &[c]);
        assert_eq!(tree.find("aten::relu"), Some(b));
        assert!(tree.find("aten::conv2d").is_none());
    }

    #[test]
    fn test_contains_is_half_open() {
        let mut tree = CallTree::new(1);
        let root = tree.set_root("op", 10, 20, true);
        let node = tree.node(root);

        assert!(!node.contains(9));
        assert!(node.contains(10));
        assert!(node.contains(19));
        assert!(!node.contains(20));
    }

    #[test]
    fn test_memory_records_have_set_semantics() {
        let mut tree = CallTree::new(1);
        let root = tree.set_root("op", 0, 10, true);

        assert!(tree.node_mut(root).add_memory_record(RecordId(3)));
        assert!(!tree.node_mut(root).add_memory_record(RecordId(3)));
        assert_eq!(tree.node(root).memory_records().len(), 1);

        tree.clear_memory();
        assert!(tree.node(root).memory_records().is_empty());
    }
}
