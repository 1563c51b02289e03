//! Diagnostic counters for one attribution + aggregation run
//!
//! Returned next to the report instead of living in global state. None of the
//! counters change the report; callers decide whether they deserve a warning.

use serde::{Deserialize, Serialize};

/// Counters gathered while attributing and aggregating
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionDiagnostics {
    /// Records that could not be placed on any operator node
    pub staled_records: usize,
    /// Records attributed to an operator node
    pub processed_records: usize,
    /// Deepest node stack seen during descent
    pub max_tree_depth: usize,
    /// Nodes skipped by aggregation because attribution never entered them
    pub unreached_nodes: usize,
}

impl AttributionDiagnostics {
    pub fn total_records(&self) -> usize {
        self.staled_records + self.processed_records
    }

    /// Fraction of records that were staled (0.0 when there are no records)
    pub fn staled_ratio(&self) -> f64 {
        let total = self.total_records();
        if total == 0 {
            return 0.0;
        }
        self.staled_records as f64 / total as f64
    }

    /// Combine counters from another thread's pass
    ///
    /// Counts add, depth takes the maximum, so merge order does not matter.
    pub fn merge(&mut self, other: &AttributionDiagnostics) {
        self.staled_records += other.staled_records;
        self.processed_records += other.processed_records;
        self.max_tree_depth = self.max_tree_depth.max(other.max_tree_depth);
        self.unreached_nodes += other.unreached_nodes;
    }

    /// Emit the run summary at debug level
    pub fn log_summary(&self) {
        if self.staled_records > 0 && self.total_records() > 0 {
            tracing::debug!(
                "{} memory records are skipped in total {} memory records and only {} get processed ({:.1}% staled)",
                self.staled_records,
                self.total_records(),
                self.processed_records,
                self.staled_ratio() * 100.0
            );
        }
        if self.max_tree_depth > 0 {
            tracing::debug!("max tree height is {}", self.max_tree_depth);
        }
        if self.unreached_nodes > 0 {
            tracing::debug!(
                "{} tree nodes were never entered and were left out of aggregation",
                self.unreached_nodes
            );
        }
    }
}
