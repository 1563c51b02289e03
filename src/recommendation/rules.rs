// Recommendation rules over a run summary

use crate::recommendation::config::RecommendationConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Compute capability reported for one device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProperties {
    #[serde(default)]
    pub compute_major: Option<u32>,
    #[serde(default)]
    pub compute_minor: Option<u32>,
}

impl DeviceProperties {
    /// `major.minor` as a number, when both parts are known
    pub fn compute_capability(&self) -> Option<f64> {
        let (major, minor) = (self.compute_major?, self.compute_minor?);
        format!("{}.{}", major, minor).parse().ok()
    }
}

/// Run-level facts produced by the sibling analyses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSummary {
    /// Data loader time / total step time
    pub dataloader_ratio: f64,
    /// Communication time / total step time
    pub communication_ratio: f64,
    /// Utilization in `[0, 1]` keyed by GPU id
    pub gpu_utilization: BTreeMap<u32, f64>,
    pub used_devices: Vec<u32>,
    pub use_dp: bool,
    pub use_ddp: bool,
    pub use_nccl: bool,
    pub device_properties: Vec<DeviceProperties>,
}

/// Apply every rule to `summary`, in a fixed order
///
/// # Example
/// ```
/// use opmem::recommendation::{generate_recommendations, RecommendationConfig, RunSummary};
///
/// let summary = RunSummary {
///     dataloader_ratio: 0.2,
///     ..Default::default()
/// };
/// let recommendations = generate_recommendations(&summary, &RecommendationConfig::default());
/// assert_eq!(recommendations.len(), 1);
/// assert!(recommendations[0].contains("20.0%"));
/// ```
pub fn generate_recommendations(summary: &RunSummary, config: &RecommendationConfig) -> Vec<String> {
    let mut recommendations = Vec::new();

    if summary.dataloader_ratio > config.dataloader_ratio {
        recommendations.push(format!(
            "This run has high time cost on input data loading. {:.1}% of the step time is in \
             DataLoader. You could try to set num_workers on DataLoader's construction and enable \
             multi-processes on data loading.",
            summary.dataloader_ratio * 100.0
        ));
    }

    recommendations.extend(distributed_recommendations(summary, config));
    recommendations.extend(gpu_recommendation(summary, config));

    recommendations
}

fn distributed_recommendations(summary: &RunSummary, config: &RecommendationConfig) -> Vec<String> {
    let mut recommendations = Vec::new();

    if summary.use_dp && summary.used_devices.len() > 1 {
        recommendations.push(
            "It is recommended to use DistributedDataParallel instead of DataParallel to do \
             multi-GPU training."
                .to_string(),
        );
    }

    if summary.use_ddp && !summary.use_nccl {
        let capable = summary
            .device_properties
            .iter()
            .filter_map(DeviceProperties::compute_capability)
            .any(|cc| cc >= config.nccl_min_compute_capability);
        if capable {
            recommendations.push(
                "NCCL backend is currently the fastest and highly recommended backend when using \
                 DDP for training."
                    .to_string(),
            );
        }
    }

    if summary.communication_ratio > config.communication_ratio {
        recommendations.push(format!(
            "This run has high time cost on communication. {:.1}% of the step time is in \
             communication. You could try Gradient Accumulation or increase the batch size. \
             Note: Gradient accumulation will increase global effective batch size, which may \
             hurt model convergence and accuracy.",
            summary.communication_ratio * 100.0
        ));
    }

    recommendations
}

fn gpu_recommendation(summary: &RunSummary, config: &RecommendationConfig) -> Option<String> {
    let low_util_gpus: Vec<u32> = summary
        .gpu_utilization
        .iter()
        .filter(|(_, util)| **util < config.low_gpu_utilization)
        .map(|(gpu, _)| *gpu)
        .collect();

    if low_util_gpus.is_empty() {
        return None;
    }

    let verb = if low_util_gpus.len() == 1 { "has" } else { "have" };
    Some(format!(
        "GPU {} {} low utilization. You could try to increase batch size to improve. Note: \
         Increasing batch size may affect the speed and stability of model convergence.",
        join_gpu_ids(&low_util_gpus),
        verb
    ))
}

/// `0`, `0 and 1`, `0, 1 and 2`
fn join_gpu_ids(gpus: &[u32]) -> String {
    match gpus {
        [] => String::new(),
        [only] => only.to_string(),
        [init @ .., last] => {
            let head: Vec<String> = init.iter().map(u32::to_string).collect();
            format!("{} and {}", head.join(", "), last)
        }
    }
}
