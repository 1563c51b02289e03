// Aggregation and flattening tests

use super::*;
use crate::attribution::attribute_thread;
use crate::call_tree::CallTree;
use crate::memory_metrics::MetricHalf;
use crate::memory_record::{DeviceType, MemoryEvent, MemoryRecord};

fn cpu(ts: i64, bytes: i64) -> MemoryRecord {
    gpu_or_cpu(ts, bytes, DeviceType::Cpu, -1)
}

fn gpu(ts: i64, bytes: i64, device_id: i64) -> MemoryRecord {
    gpu_or_cpu(ts, bytes, DeviceType::Cuda, device_id)
}

fn gpu_or_cpu(ts: i64, bytes: i64, device_type: DeviceType, device_id: i64) -> MemoryRecord {
    MemoryRecord::from_event(MemoryEvent {
        scope: String::new(),
        tid: 1,
        pid: 1,
        ts,
        device_type,
        device_id,
        addr: 0,
        bytes,
        total_allocated: 0,
        total_reserved: 0,
    })
}

fn half(increase: i64, alloc_bytes: i64, alloc_count: i64) -> MetricHalf {
    MetricHalf {
        increase,
        alloc_bytes,
        alloc_count,
    }
}

#[test]
fn test_single_operator_net_increase() {
    let mut tree = CallTree::new(1);
    let op = tree.set_root("aten::empty", 0, 100, true);
    let attribution = attribute_thread(1, Some(&mut tree), vec![cpu(10, 1000), cpu(20, -500)]);

    let unreached = aggregate_tree(&mut tree, &attribution);
    assert_eq!(unreached, 0);

    let metrics = tree.node(op).memory_metrics["CPU"];
    assert_eq!(metrics.self_metrics, half(500, 1000, 1));
    assert_eq!(metrics.total_metrics, metrics.self_metrics);
}

#[test]
fn test_parent_total_includes_child() {
    let mut tree = CallTree::new(1);
    let parent = tree.set_root("aten::linear", 0, 100, true);
    let child = tree.add_child(parent, "aten::addmm", 10, 50, true);
    let attribution = attribute_thread(1, Some(&mut tree), vec![cpu(5, 100), cpu(30, 40)]);

    aggregate_tree(&mut tree, &attribution);

    let parent_metrics = tree.node(parent).memory_metrics["CPU"];
    let child_metrics = tree.node(child).memory_metrics["CPU"];
    assert_eq!(parent_metrics.self_metrics, half(100, 100, 1));
    assert_eq!(parent_metrics.total_metrics, half(140, 140, 2));
    assert_eq!(child_metrics.self_metrics, half(40, 40, 1));
    assert_eq!(child_metrics.total_metrics, half(40, 40, 1));
}

#[test]
fn test_structural_node_propagates_totals() {
    let mut tree = CallTree::new(1);
    let root = tree.set_root("ProfilerStep#3", 0, 100, false);
    let optim = tree.add_child(root, "Optimizer.step", 10, 90, false);
    let add = tree.add_child(optim, "aten::add_", 20, 30, true);
    let attribution = attribute_thread(1, Some(&mut tree), vec![cpu(25, 64)]);

    aggregate_tree(&mut tree, &attribution);

    assert_eq!(tree.node(add).memory_metrics["CPU"].total_metrics, half(64, 64, 1));
    let optim_metrics = tree.node(optim).memory_metrics["CPU"];
    assert!(optim_metrics.self_metrics.is_zero());
    assert_eq!(optim_metrics.total_metrics, half(64, 64, 1));
    assert_eq!(tree.node(root).memory_metrics["CPU"].total_metrics, half(64, 64, 1));
}

#[test]
fn test_devices_aggregate_independently() {
    let mut tree = CallTree::new(1);
    let parent = tree.set_root("aten::to", 0, 100, true);
    tree.add_child(parent, "aten::copy_", 10, 50, true);
    let records = vec![cpu(5, 10), gpu(20, 300, 0), gpu(30, 200, 1)];
    let attribution = attribute_thread(1, Some(&mut tree), records);

    aggregate_tree(&mut tree, &attribution);

    let metrics = &tree.node(parent).memory_metrics;
    assert_eq!(metrics["CPU"].to_array(), [10, 10, 1, 10, 10, 1]);
    assert_eq!(metrics["GPU0"].to_array(), [0, 0, 0, 300, 300, 1]);
    assert_eq!(metrics["GPU1"].to_array(), [0, 0, 0, 200, 200, 1]);
}

#[test]
fn test_unreached_subtree_is_skipped() {
    let mut tree = CallTree::new(1);
    let root = tree.set_root("step", 0, 100, false);
    let reached = tree.add_child(root, "aten::mul", 10, 20, true);
    let unreached = tree.add_child(root, "aten::div", 30, 60, true);
    let grandchild = tree.add_child(unreached, "aten::empty", 40, 50, true);

    let attribution = attribute_thread(1, Some(&mut tree), vec![cpu(15, 8)]);
    // Attribution never reached aten::div, so the grandchild's records (if
    // any were ever placed there by another pass) must not leak upward.
    tree.node_mut(grandchild)
        .add_memory_record(crate::memory_record::RecordId(0));

    let skipped = aggregate_tree(&mut tree, &attribution);

    assert_eq!(skipped, 1);
    assert!(tree.node(unreached).memory_metrics.is_empty());
    assert!(tree.node(grandchild).memory_metrics.is_empty());
    assert_eq!(tree.node(reached).memory_metrics["CPU"].total_metrics, half(8, 8, 1));
    assert_eq!(tree.node(root).memory_metrics["CPU"].total_metrics, half(8, 8, 1));
}

#[test]
fn test_reaggregation_is_stable() {
    let mut tree = CallTree::new(1);
    let parent = tree.set_root("aten::linear", 0, 100, true);
    tree.add_child(parent, "aten::addmm", 10, 50, true);
    let attribution = attribute_thread(1, Some(&mut tree), vec![cpu(5, 100), cpu(30, 40)]);

    aggregate_tree(&mut tree, &attribution);
    let first = tree.node(parent).memory_metrics.clone();
    aggregate_tree(&mut tree, &attribution);

    assert_eq!(tree.node(parent).memory_metrics, first);
}

#[test]
fn test_flatten_sums_same_operator_name() {
    let mut tree = CallTree::new(1);
    let root = tree.set_root("step", 0, 100, false);
    tree.add_child(root, "aten::empty", 10, 20, true);
    tree.add_child(root, "aten::empty", 30, 40, true);
    tree.add_child(root, "aten::zero_", 50, 60, true);
    let attribution = attribute_thread(
        1,
        Some(&mut tree),
        vec![cpu(12, 100), cpu(35, 50), cpu(55, 0)],
    );
    aggregate_tree(&mut tree, &attribution);

    let metrics = OperatorMetrics::from_tree(&tree);
    let calls = OperatorCallCounts::from_pairs([("aten::empty", 2u64), ("aten::empty", 1)]);
    let report = flatten(&metrics, &calls);

    let row = report.get("CPU", "aten::empty").unwrap();
    assert_eq!(row.to_array(), [150, 150, 2, 150, 150, 2, 3]);
    // A zero-byte event leaves an all-zero vector, which is dropped
    assert!(report.get("CPU", "aten::zero_").is_none());
    // Structural nodes never appear
    assert!(report.get("CPU", "step").is_none());
}

#[test]
fn test_flatten_unknown_calls_default_to_zero() {
    let mut metrics = OperatorMetrics::default();
    metrics.add("GPU0", "aten::conv2d", crate::memory_metrics::MemoryMetrics::seeded(half(1, 1, 1)));

    let report = flatten(&metrics, &OperatorCallCounts::new());
    assert_eq!(report.get("GPU0", "aten::conv2d").unwrap().calls, 0);
    assert!(report.has_memory_data());
    assert_eq!(report.device_names().collect::<Vec<_>>(), vec!["GPU0"]);
}

#[test]
fn test_operator_metrics_merge_commutes() {
    let seeded = crate::memory_metrics::MemoryMetrics::seeded;
    let mut a = OperatorMetrics::default();
    a.add("CPU", "aten::add", seeded(half(10, 10, 1)));
    let mut b = OperatorMetrics::default();
    b.add("CPU", "aten::add", seeded(half(5, 7, 2)));
    b.add("GPU0", "aten::mul", seeded(half(3, 3, 1)));

    let mut ab = a.clone();
    ab.merge(&b);
    let mut ba = b.clone();
    ba.merge(&a);

    assert_eq!(ab, ba);
    assert_eq!(
        ab.get("CPU", "aten::add").unwrap().to_array(),
        [15, 17, 3, 15, 17, 3]
    );
}

#[test]
fn test_report_serializes_as_rows() {
    let mut metrics = OperatorMetrics::default();
    metrics.add(
        "CPU",
        "aten::cat",
        crate::memory_metrics::MemoryMetrics::seeded(half(4, 4, 1)),
    );
    let report = flatten(&metrics, &OperatorCallCounts::from_pairs([("aten::cat", 9u64)]));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "CPU": { "aten::cat": [4, 4, 1, 4, 4, 1, 9] } })
    );
}

#[test]
fn test_call_counts_clamp_to_row_range() {
    let seeded = crate::memory_metrics::MemoryMetrics::seeded;
    let mut metrics = OperatorMetrics::default();
    metrics.add("CPU", "aten::copy_", seeded(half(1, 1, 1)));
    let calls = OperatorCallCounts::from_pairs([("aten::copy_", u64::MAX), ("aten::copy_", 5)]);
    assert_eq!(calls.get("aten::copy_"), u64::MAX);

    let report = flatten(&metrics, &calls);
    assert_eq!(report.get("CPU", "aten::copy_").unwrap().to_array()[6], i64::MAX);
}
