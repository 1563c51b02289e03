// Post-order self/total aggregation over one call tree

use crate::attribution::{Attribution, ThreadAttribution};
use crate::call_tree::{CallTree, NodeId};
use crate::memory_metrics::{add_totals, self_metrics_from_records, MemoryMetrics};
use std::collections::BTreeMap;

/// Aggregate every tree that has an attribution result
///
/// Returns the number of unreached nodes skipped across all trees.
pub fn aggregate(trees: &mut BTreeMap<u64, CallTree>, attribution: &Attribution) -> usize {
    let mut unreached = 0;
    for (tid, thread) in &attribution.threads {
        if let Some(tree) = trees.get_mut(tid) {
            unreached += aggregate_tree(tree, thread);
        }
    }
    unreached
}

/// Fill `memory_metrics` on every reached node of `tree`
///
/// Operator nodes seed their self half from their attributed records and
/// start their total half equal to it. Every reached node, operator or not,
/// then adds each child's total half into its own total half. A node that
/// attribution never entered is skipped together with its whole subtree.
///
/// Returns how many unreached subtrees were skipped. Previous metrics are
/// cleared first, so running this twice gives the same result.
pub fn aggregate_tree(tree: &mut CallTree, attribution: &ThreadAttribution) -> usize {
    clear_metrics(tree);

    let Some(root) = tree.root() else {
        return 0;
    };

    let mut unreached = 0;
    let mut stack: Vec<(NodeId, usize)> = Vec::new();
    if open_node(tree, root, attribution) {
        stack.push((root, 0));
    } else {
        unreached += 1;
    }

    while let Some(frame) = stack.last_mut() {
        let (node, next) = *frame;

        if let Some(child) = tree.node(node).children().get(next).copied() {
            frame.1 += 1;
            if open_node(tree, child, attribution) {
                stack.push((child, 0));
            } else {
                unreached += 1;
            }
            continue;
        }

        stack.pop();
        if let Some(&(parent, _)) = stack.last() {
            let child_metrics = tree.node(node).memory_metrics.clone();
            add_totals(&mut tree.node_mut(parent).memory_metrics, &child_metrics);
        }
    }

    if unreached > 0 {
        tracing::debug!(
            "tid {}: {} subtrees were never entered during attribution",
            tree.tid(),
            unreached
        );
    }
    unreached
}

fn clear_metrics(tree: &mut CallTree) {
    for index in 0..tree.len() {
        tree.node_mut(NodeId(index)).memory_metrics.clear();
    }
}

/// Seed a node's self metrics on first visit.
///
/// Returns `false` when the node was never entered and must be skipped.
fn open_node(tree: &mut CallTree, id: NodeId, attribution: &ThreadAttribution) -> bool {
    if !attribution.was_entered(id) {
        return false;
    }

    let node = tree.node_mut(id);
    if !node.is_operator {
        tracing::trace!(
            "node {}:{} is not an operator node, skipping its self metrics",
            node.name,
            node.start_time
        );
        return true;
    }

    let self_by_device = self_metrics_from_records(
        node.memory_records()
            .iter()
            .filter_map(|record| attribution.records().get(record.0)),
    );
    node.memory_metrics = self_by_device
        .into_iter()
        .map(|(device, half)| (device, MemoryMetrics::seeded(half)))
        .collect();
    true
}
