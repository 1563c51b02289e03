// Thresholds for run-level recommendations

use serde::{Deserialize, Serialize};

/// Thresholds used by [`super::generate_recommendations`]
///
/// # Example
/// ```
/// use opmem::recommendation::RecommendationConfig;
///
/// let config = RecommendationConfig::default();
/// assert_eq!(config.dataloader_ratio, 0.05);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    /// Share of step time spent in the data loader above which input loading
    /// is flagged
    pub dataloader_ratio: f64,

    /// Share of step time spent in communication above which gradient
    /// accumulation / larger batches are suggested
    pub communication_ratio: f64,

    /// GPUs whose utilization is below this are reported as underused
    pub low_gpu_utilization: f64,

    /// Minimum compute capability (`major.minor`) for which the NCCL backend
    /// is recommended to DDP runs using another backend
    pub nccl_min_compute_capability: f64,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            dataloader_ratio: 0.05,
            communication_ratio: 0.10,
            low_gpu_utilization: 0.5,
            nccl_min_compute_capability: 3.5,
        }
    }
}

impl RecommendationConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("dataloader_ratio", self.dataloader_ratio),
            ("communication_ratio", self.communication_ratio),
            ("low_gpu_utilization", self.low_gpu_utilization),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be in [0, 1], got {}", name, value));
            }
        }

        if self.nccl_min_compute_capability < 0.0 {
            return Err(format!(
                "nccl_min_compute_capability must be non-negative, got {}",
                self.nccl_min_compute_capability
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RecommendationConfig::default();
        assert_eq!(config.communication_ratio, 0.10);
        assert_eq!(config.low_gpu_utilization, 0.5);
        assert_eq!(config.nccl_min_compute_capability, 3.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_invalid_ratio() {
        let mut config = RecommendationConfig::default();
        config.communication_ratio = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.contains("communication_ratio"));
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_invalid_compute_capability() {
        let mut config = RecommendationConfig::default();
        config.nccl_min_compute_capability = -1.0;
        assert!(config.validate().is_err());
    }
}
