//! Configuration (§4.A): daemon, indexer, retrieval, storage and validation settings,
//! loaded from `daemon.config.json` under the memory root with defaults per spec.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::DmmError;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DaemonConfig {
    pub host: String,
    pub port: u16,
    pub auto_start: bool,
    pub graceful_shutdown_timeout_ms: u64,
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 7437,
            auto_start: true,
            graceful_shutdown_timeout_ms: 5000,
            log_level: "info".to_string(),
        }
    }
}

impl DaemonConfig {
    pub fn graceful_shutdown_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.graceful_shutdown_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexerConfig {
    pub watch_interval_ms: u64,
    pub debounce_ms: u64,
    pub embedding_model: String,
    pub batch_size: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            watch_interval_ms: 1000,
            debounce_ms: 100,
            embedding_model: crate::DEFAULT_EMBEDDING_MODEL.to_string(),
            batch_size: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalConfig {
    pub top_k_directories: usize,
    pub max_candidates: usize,
    pub diversity_threshold: f32,
    pub default_budget: usize,
    pub baseline_budget: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k_directories: 3,
            max_candidates: 50,
            diversity_threshold: 0.92,
            default_budget: 2000,
            baseline_budget: 800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    pub embeddings_db: String,
    pub stats_db: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            embeddings_db: "index/embeddings.db".to_string(),
            stats_db: "index/stats.db".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn db_path(&self, memory_root: &Path) -> PathBuf {
        memory_root.join(&self.embeddings_db)
    }

    pub fn stats_db_path(&self, memory_root: &Path) -> PathBuf {
        memory_root.join(&self.stats_db)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationConfig {
    pub min_tokens: usize,
    pub max_tokens: usize,
    pub max_hard_tokens: usize,
    pub warn_on_missing_optional: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_tokens: 300,
            max_tokens: 800,
            max_hard_tokens: 2000,
            warn_on_missing_optional: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewerConfig {
    pub duplicate_exact: f32,
    pub duplicate_semantic: f32,
    pub duplicate_warning: f32,
    pub auto_approve_confidence: f32,
}

impl Default for ReviewerConfig {
    fn default() -> Self {
        Self {
            duplicate_exact: 0.99,
            duplicate_semantic: 0.85,
            duplicate_warning: 0.70,
            auto_approve_confidence: 0.95,
        }
    }
}

/// Complete DMM configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub version: String,
    pub daemon: DaemonConfig,
    pub indexer: IndexerConfig,
    pub retrieval: RetrievalConfig,
    pub storage: StorageConfig,
    pub validation: ValidationConfig,
    pub reviewer: ReviewerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            daemon: DaemonConfig::default(),
            indexer: IndexerConfig::default(),
            retrieval: RetrievalConfig::default(),
            storage: StorageConfig::default(),
            validation: ValidationConfig::default(),
            reviewer: ReviewerConfig::default(),
        }
    }
}

impl Config {
    const FILE_NAME: &'static str = "daemon.config.json";

    /// Loads `daemon.config.json` from under `memory_root`, falling back to defaults
    /// when the file is absent.
    pub fn load_or_default(memory_root: &Path) -> Result<Self, DmmError> {
        let config_path = memory_root.join(Self::FILE_NAME);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&config_path)?;
        serde_json::from_str(&raw).map_err(|e| DmmError::Config(format!("invalid config at {}: {e}", config_path.display())))
    }

    pub fn save(&self, memory_root: &Path) -> Result<(), DmmError> {
        let config_path = memory_root.join(Self::FILE_NAME);
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| DmmError::Config(e.to_string()))?;
        std::fs::write(config_path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = Config::default();
        assert_eq!(config.daemon.port, 7437);
        assert_eq!(config.retrieval.diversity_threshold, 0.92);
        assert_eq!(config.validation.min_tokens, 300);
        assert_eq!(config.validation.max_tokens, 800);
        assert_eq!(config.validation.max_hard_tokens, 2000);
    }

    #[test]
    fn round_trips_through_json() {
        let config = Config::default();
        let dir = tempfile::tempdir().unwrap();
        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.daemon.port, config.daemon.port);
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.retrieval.default_budget, 2000);
    }
}
