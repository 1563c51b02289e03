//! Per-device memory metric vectors
//!
//! Every node carries, per device, a fixed-size vector split into a "self"
//! half (its own attributed records) and a "total" half (self plus every
//! descendant's total). The halves are named structs so the split cannot be
//! mis-indexed; [`MemoryMetrics::to_array`] gives the positional layout
//! `[self_increase, self_alloc_bytes, self_alloc_count, total_increase,
//! total_alloc_bytes, total_alloc_count]` used in reports.

use crate::memory_record::MemoryRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::AddAssign;

/// Number of metrics in one half of a [`MemoryMetrics`] vector
pub const HALF_METRIC_COUNT: usize = 3;

/// Number of metrics in a full [`MemoryMetrics`] vector
pub const METRIC_COUNT: usize = HALF_METRIC_COUNT * 2;

/// One half (self or total) of a memory metric vector
///
/// Sums saturate at the `i64` bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricHalf {
    /// Net bytes allocated minus freed
    pub increase: i64,
    /// Bytes allocated (positive deltas only)
    pub alloc_bytes: i64,
    /// Number of allocations (positive deltas only)
    pub alloc_count: i64,
}

impl MetricHalf {
    /// Fold one record's byte delta into this half
    pub fn record(&mut self, bytes: i64) {
        self.increase = self.increase.saturating_add(bytes);
        if bytes > 0 {
            self.alloc_bytes = self.alloc_bytes.saturating_add(bytes);
            self.alloc_count = self.alloc_count.saturating_add(1);
        }
    }

    pub fn is_zero(&self) -> bool {
        self.increase == 0 && self.alloc_bytes == 0 && self.alloc_count == 0
    }

    pub fn to_array(&self) -> [i64; HALF_METRIC_COUNT] {
        [self.increase, self.alloc_bytes, self.alloc_count]
    }
}

impl AddAssign for MetricHalf {
    fn add_assign(&mut self, rhs: Self) {
        self.increase = self.increase.saturating_add(rhs.increase);
        self.alloc_bytes = self.alloc_bytes.saturating_add(rhs.alloc_bytes);
        self.alloc_count = self.alloc_count.saturating_add(rhs.alloc_count);
    }
}

/// Full metric vector for one node on one device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub self_metrics: MetricHalf,
    pub total_metrics: MetricHalf,
}

impl MemoryMetrics {
    /// Seed a vector from self metrics; a node's total starts equal to its self.
    pub fn seeded(self_metrics: MetricHalf) -> Self {
        Self {
            self_metrics,
            total_metrics: self_metrics,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.self_metrics.is_zero() && self.total_metrics.is_zero()
    }

    pub fn to_array(&self) -> [i64; METRIC_COUNT] {
        let s = self.self_metrics.to_array();
        let t = self.total_metrics.to_array();
        [s[0], s[1], s[2], t[0], t[1], t[2]]
    }
}

impl AddAssign for MemoryMetrics {
    fn add_assign(&mut self, rhs: Self) {
        self.self_metrics += rhs.self_metrics;
        self.total_metrics += rhs.total_metrics;
    }
}

/// Metric vectors keyed by device name (`CPU`, `GPU0`, ...)
///
/// Devices appear lazily on first use; a device missing on one side of an
/// addition counts as zero.
pub type DeviceMetrics = BTreeMap<String, MemoryMetrics>;

/// Compute per-device self metrics from a node's attributed records
///
/// Records without a device name are skipped.
pub fn self_metrics_from_records<'a, I>(records: I) -> BTreeMap<String, MetricHalf>
where
    I: IntoIterator<Item = &'a MemoryRecord>,
{
    let mut by_device: BTreeMap<String, MetricHalf> = BTreeMap::new();
    for record in records {
        let Some(device) = record.device_name() else {
            continue;
        };
        by_device
            .entry(device.to_string())
            .or_default()
            .record(record.bytes());
    }
    by_device
}

/// Add every device's total half of `from` into the total half of `into`
pub fn add_totals(into: &mut DeviceMetrics, from: &DeviceMetrics) {
    for (device, metrics) in from {
        into.entry(device.clone()).or_default().total_metrics += metrics.total_metrics;
    }
}
