//! Recognized configuration surface. Every key is optional; missing keys
//! fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub system: SystemConfig,
    pub clustering: ClusteringConfig,
    pub runtime: RuntimeConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            system: SystemConfig::default(),
            clustering: ClusteringConfig::default(),
            runtime: RuntimeConfig::default(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Config {
    /// Load and parse a TOML config file. A missing file is not an error —
    /// callers get an all-defaults config, since every key here is optional.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(Error::from)
    }

    /// `min_cluster_size = max(absolute_floor, floor(ratio * total_queries))`.
    /// Computed once per run and cached by the caller.
    pub fn min_cluster_size(&self, total_queries: usize) -> usize {
        let ratio_based = (self.clustering.min_cluster_size.ratio * total_queries as f64) as usize;
        self.clustering.min_cluster_size.absolute.max(ratio_based)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub recursion_limit: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            recursion_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub initial_k: usize,
    pub max_samples_per_cluster: usize,
    pub min_cluster_size: MinClusterSize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            initial_k: 10,
            max_samples_per_cluster: 10,
            min_cluster_size: MinClusterSize::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinClusterSize {
    pub absolute: usize,
    pub ratio: f64,
}

impl Default for MinClusterSize {
    fn default() -> Self {
        Self {
            absolute: 10,
            ratio: 0.005,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub high_level_goal: Option<String>,
    pub target_category_range: String,
    pub sample_size: Option<usize>,
    pub dataset: String,
    pub output_dir: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            high_level_goal: None,
            target_category_range: default_target_range(),
            sample_size: None,
            dataset: "default".to_string(),
            output_dir: "output".to_string(),
        }
    }
}

fn default_target_range() -> String {
    "15".to_string()
}

pub fn default_high_level_goal() -> &'static str {
    "Perform intelligent intent classification over user queries, producing \
     high-quality categories with clear business meaning."
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model_name: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub backoff_base_secs: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model_name: "gpt-4o-mini".to_string(),
            max_retries: 3,
            timeout_secs: 60,
            backoff_base_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model_name: String,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model_name: "text-embedding-3-small".to_string(),
            batch_size: 256,
            timeout_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_table() {
        let config = Config::default();
        assert_eq!(config.system.recursion_limit, 100);
        assert_eq!(config.clustering.initial_k, 10);
        assert_eq!(config.clustering.max_samples_per_cluster, 10);
        assert_eq!(config.clustering.min_cluster_size.absolute, 10);
        assert_eq!(config.clustering.min_cluster_size.ratio, 0.005);
        assert_eq!(config.runtime.target_category_range, "15");
        assert!(config.runtime.sample_size.is_none());
    }

    #[test]
    fn min_cluster_size_uses_floor_not_ratio_when_ratio_is_smaller() {
        let config = Config::default();
        // 1000 * 0.005 = 5, floor(5) = 5, still below absolute floor of 10.
        assert_eq!(config.min_cluster_size(1000), 10);
        // 10_000 * 0.005 = 50, now the ratio wins.
        assert_eq!(config.min_cluster_size(10_000), 50);
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let config = Config::load(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(config.system.recursion_limit, 100);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let toml_str = r#"
            [clustering]
            initial_k = 20
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.clustering.initial_k, 20);
        assert_eq!(config.clustering.max_samples_per_cluster, 10);
    }
}
