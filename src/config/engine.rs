use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tunables for the fork-tree engine, read from a TOML file.
///
/// ```toml
/// [fork]
/// max_fork_tree_nodes = 500
///
/// [graph]
/// max_depth = 10
/// max_nodes = 10000
/// processing_timeout_secs = 30
/// max_contributor_window_days = 365
///
/// [cache]
/// primary_ttl_secs = 1800
/// secondary_ttl_secs = 600
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fork: ForkConfig,
    pub graph: GraphConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForkConfig {
    /// Negative disables the limit, zero forbids forking, positive caps the tree size.
    pub max_fork_tree_nodes: i64,
}

impl Default for ForkConfig {
    fn default() -> Self {
        Self {
            max_fork_tree_nodes: -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Default depth for a graph request, and the ceiling a request may ask for.
    pub max_depth: usize,
    pub max_nodes: usize,
    pub processing_timeout_secs: u64,
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Ceiling for a request's `contributor_window_days`.
    pub max_contributor_window_days: u32,
}

impl GraphConfig {
    #[must_use]
    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_nodes: 10_000,
            processing_timeout_secs: 30,
            default_page_size: 50,
            max_page_size: 100,
            max_contributor_window_days: 365,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL of the raw weekly contributor counts.
    pub primary_ttl_secs: u64,
    /// TTL of the filtered per-branch summaries; must stay below the primary TTL.
    pub secondary_ttl_secs: u64,
}

impl CacheConfig {
    #[must_use]
    pub fn primary_ttl(&self) -> Duration {
        Duration::from_secs(self.primary_ttl_secs)
    }

    #[must_use]
    pub fn secondary_ttl(&self) -> Duration {
        Duration::from_secs(self.secondary_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            primary_ttl_secs: 1800,
            secondary_ttl_secs: 600,
        }
    }
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.secondary_ttl_secs >= self.cache.primary_ttl_secs {
            return Err(Error::Config(format!(
                "cache.secondary_ttl_secs ({}) must be lower than cache.primary_ttl_secs ({})",
                self.cache.secondary_ttl_secs, self.cache.primary_ttl_secs
            )));
        }
        if self.graph.max_nodes == 0 {
            return Err(Error::Config("graph.max_nodes must be positive".to_string()));
        }
        if self.graph.max_depth == 0 {
            return Err(Error::Config("graph.max_depth must be positive".to_string()));
        }
        if self.graph.processing_timeout_secs == 0 {
            return Err(Error::Config(
                "graph.processing_timeout_secs must be positive".to_string(),
            ));
        }
        if self.graph.max_contributor_window_days == 0 {
            return Err(Error::Config(
                "graph.max_contributor_window_days must be positive".to_string(),
            ));
        }
        if self.graph.default_page_size == 0
            || self.graph.default_page_size > self.graph.max_page_size
        {
            return Err(Error::Config(
                "graph.default_page_size must be between 1 and graph.max_page_size".to_string(),
            ));
        }
        Ok(())
    }
}
