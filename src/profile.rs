//! Memory profiling driver
//!
//! Runs attribution and aggregation for every thread and merges the partial
//! results into one [`MemoryProfile`]. Threads share nothing, so each pass can
//! run on its own scoped worker; partial operator metrics are combined only at
//! the end with vector addition, which makes the result independent of which
//! worker finishes first.
//!
//! # Example
//!
//! ```
//! use opmem::aggregation::OperatorCallCounts;
//! use opmem::call_tree::CallTree;
//! use opmem::config::ProfilerConfig;
//! use opmem::memory_record::{DeviceType, MemoryEvent};
//! use opmem::profile::MemoryProfiler;
//! use std::collections::BTreeMap;
//!
//! # fn main() -> opmem::error::Result<()> {
//! let mut tree = CallTree::new(1);
//! let root = tree.set_root("ProfilerStep#1", 0, 100, false);
//! tree.add_child(root, "aten::empty", 10, 20, true);
//! let trees = BTreeMap::from([(1, tree)]);
//!
//! let events = vec![MemoryEvent {
//!     scope: String::new(),
//!     tid: 1,
//!     pid: 1,
//!     ts: 15,
//!     device_type: DeviceType::Cuda,
//!     device_id: 0,
//!     addr: 0x7f00,
//!     bytes: 4096,
//!     total_allocated: 4096,
//!     total_reserved: 2 << 20,
//! }];
//! let calls = OperatorCallCounts::from_pairs([("aten::empty", 1u64)]);
//!
//! let profile = MemoryProfiler::new(ProfilerConfig::default()).analyze(trees, events, &calls)?;
//! let row = profile.report.get("GPU0", "aten::empty").unwrap();
//! assert_eq!(row.to_array(), [4096, 4096, 1, 4096, 4096, 1, 1]);
//! # Ok(())
//! # }
//! ```

use crate::aggregation::{aggregate_tree, flatten, MemoryReport, OperatorCallCounts, OperatorMetrics};
use crate::attribution::{attribute_thread, group_by_thread};
use crate::call_tree::CallTree;
use crate::config::ProfilerConfig;
use crate::diagnostics::AttributionDiagnostics;
use crate::error::{OpmemError, Result};
use crate::memory_record::{MemoryEvent, MemoryRecord};
use std::collections::BTreeMap;

/// Result of one thread's attribution + aggregation pass
#[derive(Debug, Clone)]
pub struct ThreadProfile {
    pub tid: u64,
    /// The thread's tree with per-node metrics filled in
    pub tree: Option<CallTree>,
    pub operator_metrics: OperatorMetrics,
    pub diagnostics: AttributionDiagnostics,
    /// The thread's records, `op_name` stamped where attributed
    pub records: Vec<MemoryRecord>,
}

/// Merged result over all threads
#[derive(Debug, Clone, Default)]
pub struct MemoryProfile {
    /// `device -> operator -> [7 numbers]`
    pub report: MemoryReport,
    pub diagnostics: AttributionDiagnostics,
    /// All records, grouped by thread id in ascending order
    pub records: Vec<MemoryRecord>,
    /// Trees with aggregated node metrics, by thread id
    pub trees: BTreeMap<u64, CallTree>,
}

impl MemoryProfile {
    /// Whether the run recorded any memory activity on an operator
    pub fn has_memory_data(&self) -> bool {
        self.report.has_memory_data()
    }
}

/// Attribute and aggregate one thread
pub fn profile_thread(tid: u64, tree: Option<CallTree>, records: Vec<MemoryRecord>) -> ThreadProfile {
    let mut tree = tree;
    let attribution = attribute_thread(tid, tree.as_mut(), records);
    let mut diagnostics = attribution.diagnostics();

    let operator_metrics = match tree.as_mut() {
        Some(tree) if !attribution.records().is_empty() => {
            diagnostics.unreached_nodes = aggregate_tree(tree, &attribution);
            OperatorMetrics::from_tree(tree)
        }
        _ => OperatorMetrics::default(),
    };

    ThreadProfile {
        tid,
        tree,
        operator_metrics,
        diagnostics,
        records: attribution.into_records(),
    }
}

/// Merge per-thread results and join operator call counts
///
/// The input order does not affect the result.
pub fn merge_thread_profiles<I>(profiles: I, calls: &OperatorCallCounts) -> MemoryProfile
where
    I: IntoIterator<Item = ThreadProfile>,
{
    let mut metrics = OperatorMetrics::default();
    let mut diagnostics = AttributionDiagnostics::default();
    let mut records_by_tid: BTreeMap<u64, Vec<MemoryRecord>> = BTreeMap::new();
    let mut trees = BTreeMap::new();

    for profile in profiles {
        metrics.merge(&profile.operator_metrics);
        diagnostics.merge(&profile.diagnostics);
        records_by_tid.insert(profile.tid, profile.records);
        if let Some(tree) = profile.tree {
            trees.insert(profile.tid, tree);
        }
    }

    MemoryProfile {
        report: flatten(&metrics, calls),
        diagnostics,
        records: records_by_tid.into_values().flatten().collect(),
        trees,
    }
}

/// Drives attribution and aggregation over every thread
#[derive(Debug, Clone, Default)]
pub struct MemoryProfiler {
    config: ProfilerConfig,
}

impl MemoryProfiler {
    pub fn new(config: ProfilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Attribute `events` onto `trees`, aggregate, and build the report
    ///
    /// `events` must be grouped by thread and time-ordered within a thread.
    /// Fails only if a worker thread panics.
    pub fn analyze<I>(
        &self,
        mut trees: BTreeMap<u64, CallTree>,
        events: I,
        calls: &OperatorCallCounts,
    ) -> Result<MemoryProfile>
    where
        I: IntoIterator<Item = MemoryEvent>,
    {
        let records_by_tid = group_by_thread(events);

        let mut work: Vec<(u64, Option<CallTree>, Vec<MemoryRecord>)> = records_by_tid
            .into_iter()
            .map(|(tid, records)| (tid, trees.remove(&tid), records))
            .collect();
        // Trees without memory records still come back in the profile.
        work.extend(trees.into_iter().map(|(tid, tree)| (tid, Some(tree), Vec::new())));

        let profiles = if self.config.parallel && work.len() > 1 {
            run_parallel(work)?
        } else {
            work.into_iter()
                .map(|(tid, tree, records)| profile_thread(tid, tree, records))
                .collect()
        };

        let profile = merge_thread_profiles(profiles, calls);
        profile.diagnostics.log_summary();
        Ok(profile)
    }
}

fn run_parallel(work: Vec<(u64, Option<CallTree>, Vec<MemoryRecord>)>) -> Result<Vec<ThreadProfile>> {
    let joined = crossbeam::scope(|scope| {
        let handles: Vec<_> = work
            .into_iter()
            .map(|(tid, tree, records)| {
                (tid, scope.spawn(move |_| profile_thread(tid, tree, records)))
            })
            .collect();

        handles
            .into_iter()
            .map(|(tid, handle)| {
                handle.join().map_err(|_| {
                    tracing::warn!("attribution worker for tid {} panicked", tid);
                    OpmemError::WorkerPanicked(format!("thread {}", tid))
                })
            })
            .collect::<Result<Vec<_>>>()
    });

    joined.map_err(|_| OpmemError::WorkerPanicked("worker scope".to_string()))?
}
