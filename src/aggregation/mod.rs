// Bottom-up memory metric rollup and per-operator report
//
// After attribution, one post-order pass per tree fills every reached node's
// per-device vector: the self half from the node's own records, the total
// half from self plus every child's total. Nodes attribution never entered,
// and everything beneath them, are left out.
//
// Flattening then sums operator nodes by name per device and joins the
// operator invocation counts.

mod aggregator;
mod report;

pub use aggregator::{aggregate, aggregate_tree};
pub use report::{flatten, MemoryReport, OperatorCallCounts, OperatorMemoryRow, OperatorMetrics};

#[cfg(test)]
mod tests;
