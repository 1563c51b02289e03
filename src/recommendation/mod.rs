// Threshold rules that turn run-level ratios into recommendations
//
// The memory report is one input among several for the run-level analysis.
// Step-time breakdown, GPU utilization and the distributed setup come from
// sibling analyses as a RunSummary; each rule fires when its threshold is
// crossed and yields one plain-text recommendation.

mod config;
mod rules;

pub use config::RecommendationConfig;
pub use rules::{generate_recommendations, DeviceProperties, RunSummary};
