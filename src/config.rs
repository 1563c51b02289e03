//! Profiler configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! parallel = true
//!
//! [recommendation]
//! dataloader_ratio = 0.05
//! communication_ratio = 0.10
//! low_gpu_utilization = 0.5
//! nccl_min_compute_capability = 3.5
//! ```

use crate::error::{OpmemError, Result};
use crate::recommendation::RecommendationConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level configuration for a profiling run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Run each thread's attribution pass on its own worker thread
    pub parallel: bool,

    /// Thresholds for run-level recommendations
    pub recommendation: RecommendationConfig,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            recommendation: RecommendationConfig::default(),
        }
    }
}

impl ProfilerConfig {
    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ProfilerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML configuration file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| OpmemError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.recommendation
            .validate()
            .map_err(OpmemError::InvalidConfig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = ProfilerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ProfilerConfig::default());
        assert!(config.parallel);
    }

    #[test]
    fn test_partial_override() {
        let config = ProfilerConfig::from_toml_str(
            r#"
            parallel = false

            [recommendation]
            low_gpu_utilization = 0.8
            "#,
        )
        .unwrap();

        assert!(!config.parallel);
        assert_eq!(config.recommendation.low_gpu_utilization, 0.8);
        assert_eq!(config.recommendation.dataloader_ratio, 0.05);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let err = ProfilerConfig::from_toml_str("[recommendation]\ndataloader_ratio = 2.0\n")
            .unwrap_err();
        assert!(matches!(err, OpmemError::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let err = ProfilerConfig::from_toml_str("parallel = ").unwrap_err();
        assert!(matches!(err, OpmemError::Toml(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "parallel = false").unwrap();

        let config = ProfilerConfig::from_toml_file(file.path()).unwrap();
        assert!(!config.parallel);

        let missing = ProfilerConfig::from_toml_file("/nonexistent/opmem.toml").unwrap_err();
        assert!(matches!(missing, OpmemError::ReadFile { .. }));
    }
}
