// Transient per-thread state for one attribution pass

use crate::call_tree::NodeId;
use crate::memory_record::RecordId;

/// One entry of the active path: the parent we descended from and the index
/// of the child we entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFrame {
    pub node: NodeId,
    pub child_index: usize,
}

/// Mutable bookkeeping for one thread's pass, discarded afterwards
#[derive(Debug, Clone, Default)]
pub struct AttributionState {
    /// How many times each node was entered during descent
    pub(crate) entered: Vec<u32>,
    /// Active path from the root to the current node
    pub(crate) stack: Vec<StackFrame>,
    pub(crate) processed: Vec<RecordId>,
    pub(crate) staled: Vec<RecordId>,
    pub(crate) max_depth: usize,
}

impl AttributionState {
    pub fn new(node_count: usize) -> Self {
        Self {
            entered: vec![0; node_count],
            ..Default::default()
        }
    }

    pub(crate) fn enter(&mut self, node: NodeId) {
        self.entered[node.0] += 1;
    }

    pub(crate) fn observe_depth(&mut self) {
        self.max_depth = self.max_depth.max(self.stack.len());
    }

    pub(crate) fn stale(&mut self, record: RecordId) {
        self.staled.push(record);
    }

    pub(crate) fn process(&mut self, record: RecordId) {
        self.processed.push(record);
    }
}
