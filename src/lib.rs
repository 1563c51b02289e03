//! opmem - Per-operator memory attribution for training-run profiles
//!
//! This library places allocator events on the operator call tree of each
//! worker thread and rolls them up into per-device self/total metrics,
//! keyed by operator name.

pub mod aggregation;
pub mod attribution;
pub mod call_tree;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod input;
pub mod json_output;
pub mod memory_metrics;
pub mod memory_record;
pub mod profile;
pub mod recommendation;
