// Flattening aggregated node metrics into a device -> operator report

use crate::call_tree::CallTree;
use crate::memory_metrics::{MemoryMetrics, METRIC_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Width of a report row: the metric vector plus the invocation count
pub const ROW_LENGTH: usize = METRIC_COUNT + 1;

/// Operator metrics summed by name, keyed by device then operator name
///
/// Partial results from different threads merge by vector addition, which is
/// associative and commutative, so merge order never changes the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorMetrics {
    by_device: BTreeMap<String, BTreeMap<String, MemoryMetrics>>,
}

impl OperatorMetrics {
    /// Collect the aggregated metrics of every operator node in `tree`
    pub fn from_tree(tree: &CallTree) -> Self {
        let mut metrics = Self::default();
        for (_, node) in tree.nodes() {
            if !node.is_operator {
                continue;
            }
            for (device, values) in &node.memory_metrics {
                if !values.is_zero() {
                    metrics.add(device, &node.name, *values);
                }
            }
        }
        metrics
    }

    pub fn add(&mut self, device: &str, op_name: &str, values: MemoryMetrics) {
        *self
            .by_device
            .entry(device.to_string())
            .or_default()
            .entry(op_name.to_string())
            .or_default() += values;
    }

    pub fn merge(&mut self, other: &OperatorMetrics) {
        for (device, ops) in &other.by_device {
            for (op_name, values) in ops {
                self.add(device, op_name, *values);
            }
        }
    }

    pub fn get(&self, device: &str, op_name: &str) -> Option<&MemoryMetrics> {
        self.by_device.get(device)?.get(op_name)
    }

    pub fn is_empty(&self) -> bool {
        self.by_device.is_empty()
    }
}

/// Operator invocation counts, summed across duplicate names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorCallCounts(BTreeMap<String, u64>);

impl OperatorCallCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(name, calls)` pairs; repeated names are summed
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let mut counts = Self::new();
        for (name, calls) in pairs {
            counts.add(name, calls);
        }
        counts
    }

    pub fn add(&mut self, name: impl Into<String>, calls: u64) {
        let count = self.0.entry(name.into()).or_default();
        *count = count.saturating_add(calls);
    }

    /// Invocation count for `name`, zero when unknown
    pub fn get(&self, name: &str) -> u64 {
        self.0.get(name).copied().unwrap_or(0)
    }
}

/// One operator's row in the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "[i64; 7]")]
pub struct OperatorMemoryRow {
    pub metrics: MemoryMetrics,
    pub calls: u64,
}

impl OperatorMemoryRow {
    /// `[self_increase, self_alloc_bytes, self_alloc_count, total_increase,
    /// total_alloc_bytes, total_alloc_count, calls]`
    pub fn to_array(&self) -> [i64; ROW_LENGTH] {
        let m = self.metrics.to_array();
        let calls = i64::try_from(self.calls).unwrap_or(i64::MAX);
        [m[0], m[1], m[2], m[3], m[4], m[5], calls]
    }
}

impl From<OperatorMemoryRow> for [i64; ROW_LENGTH] {
    fn from(row: OperatorMemoryRow) -> Self {
        row.to_array()
    }
}

/// Report keyed by device name, then operator name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MemoryReport {
    devices: BTreeMap<String, BTreeMap<String, OperatorMemoryRow>>,
}

impl MemoryReport {
    pub fn get(&self, device: &str, op_name: &str) -> Option<&OperatorMemoryRow> {
        self.devices.get(device)?.get(op_name)
    }

    pub fn device_names(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Whether any row carries a non-zero metric
    pub fn has_memory_data(&self) -> bool {
        self.devices
            .values()
            .flat_map(|ops| ops.values())
            .any(|row| !row.metrics.is_zero())
    }
}

/// Join summed operator metrics with invocation counts
///
/// Operators whose metric vector is all zero are dropped.
pub fn flatten(metrics: &OperatorMetrics, calls: &OperatorCallCounts) -> MemoryReport {
    let mut report = MemoryReport::default();
    for (device, ops) in &metrics.by_device {
        for (op_name, values) in ops {
            if values.is_zero() {
                continue;
            }
            report
                .devices
                .entry(device.clone())
                .or_default()
                .insert(
                    op_name.clone(),
                    OperatorMemoryRow {
                        metrics: *values,
                        calls: calls.get(op_name),
                    },
                );
        }
    }
    report
}
