//! ============================================================================
//! Configuration - tunables for building, indexing, and retrieval
//! ============================================================================
//! Defaults come from `Default`, an optional JSON file can override them,
//! and `CHRONICLE_*` environment variables are applied last.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::gate::DEFAULT_MAX_CONCURRENCY;
use crate::llm::{DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL};
use crate::similarity::DEFAULT_HALF_LIFE_DAYS;
use crate::types::{ChronicleError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChronicleConfig {
    #[serde(default)]
    pub builder: BuilderConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub retriever: RetrieverConfig,

    #[serde(default)]
    pub llm: LlmSettings,

    /// Chunk cache location; `None` means the default under the home directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Interactions per level-0 chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Children per chunk above level 0
    #[serde(default = "default_group_size")]
    pub group_size: usize,

    /// Maximum in-flight summarize/embed calls
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Outgoing edges kept per node before symmetrization
    #[serde(default = "default_neighbor_count")]
    pub neighbor_count: usize,

    #[serde(default = "default_half_life")]
    pub half_life_days: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverConfig {
    #[serde(default = "default_half_life")]
    pub half_life_days: f64,

    /// Ask the collaborator to judge relevance when there are more candidates than needed
    #[serde(default = "default_true")]
    pub use_llm_judge: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Read from OPENAI_API_KEY; never written back out
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

fn default_chunk_size() -> usize {
    12
}

fn default_group_size() -> usize {
    5
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_neighbor_count() -> usize {
    8
}

fn default_half_life() -> f64 {
    DEFAULT_HALF_LIFE_DAYS
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.into()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.into()
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            group_size: default_group_size(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            neighbor_count: default_neighbor_count(),
            half_life_days: default_half_life(),
        }
    }
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            half_life_days: default_half_life(),
            use_llm_judge: true,
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            api_key: None,
        }
    }
}

impl ChronicleConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Read a JSON config file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ChronicleError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let mut config: Self = serde_json::from_str(&raw).map_err(|e| {
            ChronicleError::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })?;
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment in production)
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CHRONICLE_CHUNK_SIZE") {
            self.builder.chunk_size = parse_var("CHRONICLE_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = lookup("CHRONICLE_GROUP_SIZE") {
            self.builder.group_size = parse_var("CHRONICLE_GROUP_SIZE", &v)?;
        }
        if let Some(v) = lookup("CHRONICLE_MAX_CONCURRENCY") {
            self.builder.max_concurrency = parse_var("CHRONICLE_MAX_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("CHRONICLE_NEIGHBOR_COUNT") {
            self.index.neighbor_count = parse_var("CHRONICLE_NEIGHBOR_COUNT", &v)?;
        }
        if let Some(v) = lookup("CHRONICLE_HALF_LIFE_DAYS") {
            let half_life: f64 = parse_var("CHRONICLE_HALF_LIFE_DAYS", &v)?;
            if !(half_life > 0.0) {
                return Err(ChronicleError::Config(format!(
                    "CHRONICLE_HALF_LIFE_DAYS must be positive, got {}",
                    v
                )));
            }
            self.index.half_life_days = half_life;
            self.retriever.half_life_days = half_life;
        }
        if let Some(v) = lookup("CHRONICLE_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = lookup("CHRONICLE_CHAT_MODEL") {
            self.llm.chat_model = v;
        }
        if let Some(v) = lookup("CHRONICLE_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Some(v) = lookup("CHRONICLE_CACHE_PATH") {
            self.cache_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            self.llm.api_key = Some(v);
        }

        debug!(
            "Config: chunk_size={} group_size={} concurrency={} neighbors={}",
            self.builder.chunk_size,
            self.builder.group_size,
            self.builder.max_concurrency,
            self.index.neighbor_count
        );
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ChronicleError::Config(format!("Invalid value for {}: '{}'", name, value)))
}
