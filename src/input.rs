//! Profile document loader for the `opmem` binary
//!
//! The document carries what the upstream trace parser and tree builder
//! produce: one nested call tree per thread, the memory events grouped by
//! thread and sorted by time, operator call counts, and optionally the
//! run-level summary from sibling analyses.
//!
//! ```json
//! {
//!   "threads": [
//!     { "tid": 1, "root": { "name": "ProfilerStep#1", "start": 0, "end": 100,
//!                           "children": [ { "name": "aten::empty", "start": 10,
//!                                           "end": 20, "operator": true } ] } }
//!   ],
//!   "memory_events": [
//!     { "tid": 1, "ts": 15, "device_type": "cuda", "device_id": 0, "bytes": 512 }
//!   ],
//!   "op_calls": [ { "name": "aten::empty", "calls": 1 } ]
//! }
//! ```

use crate::aggregation::OperatorCallCounts;
use crate::call_tree::{CallTree, NodeId};
use crate::error::{OpmemError, Result};
use crate::memory_record::MemoryEvent;
use crate::recommendation::RunSummary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// One node of a nested call tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub start: i64,
    pub end: i64,
    #[serde(default)]
    pub operator: bool,
    #[serde(default)]
    pub children: Vec<NodeSpec>,
}

/// A thread and the root of its call tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSpec {
    pub tid: u64,
    pub root: NodeSpec,
}

/// Invocation count of one operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpCallSpec {
    pub name: String,
    pub calls: u64,
}

/// Everything the profiler consumes for one worker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileDocument {
    #[serde(default)]
    pub threads: Vec<ThreadSpec>,
    #[serde(default)]
    pub memory_events: Vec<MemoryEvent>,
    #[serde(default)]
    pub op_calls: Vec<OpCallSpec>,
    #[serde(default)]
    pub summary: Option<RunSummary>,
}

impl ProfileDocument {
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| OpmemError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Build one arena tree per thread
    ///
    /// Node geometry is taken as-is. Listing the same thread twice is an
    /// error.
    pub fn call_trees(&self) -> Result<BTreeMap<u64, CallTree>> {
        let mut trees = BTreeMap::new();
        for thread in &self.threads {
            if trees.contains_key(&thread.tid) {
                return Err(OpmemError::InvalidTree {
                    tid: thread.tid,
                    reason: "thread listed more than once".to_string(),
                });
            }
            trees.insert(thread.tid, build_tree(thread.tid, &thread.root));
        }
        Ok(trees)
    }

    /// Operator call counts, summed by name
    pub fn call_counts(&self) -> OperatorCallCounts {
        OperatorCallCounts::from_pairs(self.op_calls.iter().map(|op| (op.name.clone(), op.calls)))
    }
}

/// Flatten a nested [`NodeSpec`] into an arena, children in document order
fn build_tree(tid: u64, root: &NodeSpec) -> CallTree {
    let mut tree = CallTree::new(tid);
    let root_id = tree.set_root(root.name.clone(), root.start, root.end, root.operator);

    let mut pending: Vec<(NodeId, &NodeSpec)> = vec![(root_id, root)];
    while let Some((parent, spec)) = pending.pop() {
        for child in &spec.children {
            let id = tree.add_child(parent, child.name.clone(), child.start, child.end, child.operator);
            pending.push((id, child));
        }
    }
    tree
}
