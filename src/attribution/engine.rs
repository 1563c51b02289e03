// Single forward scan that places memory records on call tree nodes

use crate::attribution::state::{AttributionState, StackFrame};
use crate::call_tree::{CallTree, NodeId};
use crate::diagnostics::AttributionDiagnostics;
use crate::memory_record::{MemoryEvent, MemoryRecord, RecordId};
use std::collections::BTreeMap;

/// Outcome of attributing one thread's records
#[derive(Debug, Clone, Default)]
pub struct ThreadAttribution {
    pub tid: u64,
    /// All records of the thread, in input order, indexed by [`RecordId`]
    records: Vec<MemoryRecord>,
    processed: Vec<RecordId>,
    staled: Vec<RecordId>,
    /// Entry counts indexed by [`NodeId`]
    entered: Vec<u32>,
    max_depth: usize,
}

impl ThreadAttribution {
    fn all_staled(tid: u64, records: Vec<MemoryRecord>) -> Self {
        let staled = (0..records.len()).map(RecordId).collect();
        Self {
            tid,
            records,
            staled,
            ..Default::default()
        }
    }

    pub fn records(&self) -> &[MemoryRecord] {
        &self.records
    }

    pub fn record(&self, id: RecordId) -> &MemoryRecord {
        &self.records[id.0]
    }

    pub fn processed_ids(&self) -> &[RecordId] {
        &self.processed
    }

    pub fn staled_ids(&self) -> &[RecordId] {
        &self.staled
    }

    pub fn processed_records(&self) -> impl Iterator<Item = &MemoryRecord> {
        self.processed.iter().map(|id| &self.records[id.0])
    }

    pub fn staled_records(&self) -> impl Iterator<Item = &MemoryRecord> {
        self.staled.iter().map(|id| &self.records[id.0])
    }

    /// Whether descent entered `node` at least once
    pub fn was_entered(&self, node: NodeId) -> bool {
        self.entry_count(node) > 0
    }

    pub fn entry_count(&self, node: NodeId) -> u32 {
        self.entered.get(node.0).copied().unwrap_or(0)
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Hand the records back, with `op_name` stamped where attributed
    pub fn into_records(self) -> Vec<MemoryRecord> {
        self.records
    }

    pub fn diagnostics(&self) -> AttributionDiagnostics {
        AttributionDiagnostics {
            staled_records: self.staled.len(),
            processed_records: self.processed.len(),
            max_tree_depth: self.max_depth,
            unreached_nodes: 0,
        }
    }
}

/// Attribution results for every thread
#[derive(Debug, Clone, Default)]
pub struct Attribution {
    pub threads: BTreeMap<u64, ThreadAttribution>,
}

impl Attribution {
    pub fn processed_records(&self) -> impl Iterator<Item = &MemoryRecord> {
        self.threads.values().flat_map(|t| t.processed_records())
    }

    pub fn staled_records(&self) -> impl Iterator<Item = &MemoryRecord> {
        self.threads.values().flat_map(|t| t.staled_records())
    }

    pub fn diagnostics(&self) -> AttributionDiagnostics {
        let mut diagnostics = AttributionDiagnostics::default();
        for thread in self.threads.values() {
            diagnostics.merge(&thread.diagnostics());
        }
        diagnostics
    }
}

/// Group events into per-thread record lists, keeping input order
pub fn group_by_thread<I>(events: I) -> BTreeMap<u64, Vec<MemoryRecord>>
where
    I: IntoIterator<Item = MemoryEvent>,
{
    let mut records_by_tid: BTreeMap<u64, Vec<MemoryRecord>> = BTreeMap::new();
    for event in events {
        let record = MemoryRecord::from_event(event);
        records_by_tid.entry(record.tid()).or_default().push(record);
    }
    records_by_tid
}

/// Attribute every thread's records onto that thread's tree
///
/// Threads are processed one after another; see
/// [`crate::profile::MemoryProfiler`] for the parallel driver.
pub fn attribute(
    trees: &mut BTreeMap<u64, CallTree>,
    records_by_tid: BTreeMap<u64, Vec<MemoryRecord>>,
) -> Attribution {
    let mut attribution = Attribution::default();
    for (tid, records) in records_by_tid {
        let thread = attribute_thread(tid, trees.get_mut(&tid), records);
        attribution.threads.insert(tid, thread);
    }

    attribution.diagnostics().log_summary();
    attribution
}

/// Attribute one thread's time-ordered records onto its call tree
///
/// Each record ends up in exactly one of the processed or staled lists.
/// Records before the root starts, after the tree is exhausted, or on a
/// non-operator node are staled and never retried.
///
/// Records and metrics left on `tree` by an earlier pass are dropped first;
/// their ids index a record list that no longer exists.
pub fn attribute_thread(
    tid: u64,
    mut tree: Option<&mut CallTree>,
    mut records: Vec<MemoryRecord>,
) -> ThreadAttribution {
    if let Some(tree) = tree.as_deref_mut() {
        tree.clear_memory();
    }

    if records.is_empty() {
        return ThreadAttribution {
            tid,
            ..Default::default()
        };
    }

    let Some(tree) = tree else {
        tracing::debug!(
            "no call tree for tid {}, {} memory records staled",
            tid,
            records.len()
        );
        return ThreadAttribution::all_staled(tid, records);
    };

    let mut state = AttributionState::new(tree.len());
    let mut current = tree.root();
    let mut child_index = 0usize;

    if let Some(root) = current {
        state.enter(root);
    }

    let mut record_index = 0usize;
    while record_index < records.len() {
        let id = RecordId(record_index);
        let ts = records[record_index].ts();
        state.observe_depth();

        let Some(mut node_id) = current else {
            tracing::trace!(
                "could not find the node for tid {}, timestamp: {}, record index: {}, total records: {}",
                tid,
                ts,
                record_index,
                records.len()
            );
            state.stale(id);
            record_index += 1;
            continue;
        };

        let node = tree.node(node_id);
        if ts < node.start_time {
            // Only the root can be current with a record before its start.
            tracing::trace!(
                "record timestamp {} is less than the start time of {}",
                ts,
                node.name
            );
            state.stale(id);
            record_index += 1;
            continue;
        }
        if ts >= node.end_time {
            match state.stack.pop() {
                Some(frame) => {
                    current = Some(frame.node);
                    child_index = frame.child_index + 1;
                }
                None => current = None,
            }
            continue;
        }

        // Descend to the innermost node whose interval embraces the record.
        while let Some(&child) = tree.node(node_id).children().get(child_index) {
            let child_node = tree.node(child);
            if ts < child_node.start_time {
                break;
            } else if child_node.contains(ts) {
                state.enter(child);
                state.stack.push(StackFrame {
                    node: node_id,
                    child_index,
                });
                node_id = child;
                child_index = 0;
            } else {
                child_index += 1;
            }
        }
        current = Some(node_id);

        let node = tree.node_mut(node_id);
        if node.is_operator {
            node.add_memory_record(id);
            records[record_index].set_op_name(&node.name);
            state.process(id);
        } else {
            state.stale(id);
        }

        record_index += 1;
    }

    ThreadAttribution {
        tid,
        records,
        processed: state.processed,
        staled: state.staled,
        entered: state.entered,
        max_depth: state.max_depth,
    }
}
