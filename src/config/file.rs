//! TOML settings file loading
//!
//! Supports `~/.config/omni/beacon/retrieval.toml` as a persistent settings
//! source. All fields are optional; the file is a partial overlay on top of
//! defaults, and a handful of environment variables overlay the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use serde_json::Value;

use super::fields;
use super::{GraphSearchConfig, RerankingModelConfig, RetrieveConfig};
use crate::Result;
use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// Engine-wide knobs that are not part of a per-query config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Per-attempt timeout for semantic and full-text backends
    pub backend_timeout: Duration,
    /// Retries for semantic and full-text backends
    pub backend_retry_count: u32,
    /// Maximum rerank batches in flight at once
    pub rerank_max_in_flight: usize,
    /// Maximum cached rerank scores
    pub rerank_cache_capacity: u64,
    /// Backoff curve shared by every retried operation
    pub retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            backend_timeout: Duration::from_secs(10),
            backend_retry_count: 1,
            rerank_max_in_flight: 4,
            rerank_cache_capacity: 10_000,
            retry: RetryPolicy::default(),
        }
    }
}

/// Top-level TOML settings file schema
#[derive(Debug, Default, Deserialize)]
pub struct RetrievalSettingsFile {
    /// Engine-wide knobs
    #[serde(default)]
    pub engine: EngineFileConfig,

    /// Default retrieval config, in its stored wire form
    #[serde(default)]
    pub retrieval: Option<Value>,

    /// Reranking service settings
    #[serde(default)]
    pub reranking: Option<Value>,

    /// Graph service settings
    #[serde(default)]
    pub graph: Option<Value>,
}

/// `[engine]` section
#[derive(Debug, Default, Deserialize)]
pub struct EngineFileConfig {
    /// Seconds per semantic/full-text attempt
    pub backend_timeout: Option<f64>,
    pub backend_retry_count: Option<u32>,
    pub rerank_max_in_flight: Option<usize>,
    pub rerank_cache_capacity: Option<u64>,
    pub retry_base_delay_ms: Option<u64>,
    pub retry_max_delay_ms: Option<u64>,
}

/// Fully resolved settings
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub engine: EngineSettings,
    pub retrieval: RetrieveConfig,
    pub reranking: RerankingModelConfig,
    pub graph: GraphSearchConfig,
}

impl Settings {
    /// Load and resolve a settings file, overlaying process environment
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if any
    /// value fails validation
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: RetrievalSettingsFile = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded retrieval settings");
        Ok(Self::resolve(file, |key| std::env::var(key).ok())?)
    }

    /// Load the settings file from the standard path
    ///
    /// Returns defaults (plus environment overlay) if the file doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid
    pub fn load_default() -> Result<Self> {
        match settings_file_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::resolve(RetrievalSettingsFile::default(), |key| {
                std::env::var(key).ok()
            })?),
        }
    }

    /// Resolve a parsed file against defaults and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns the first field that fails validation, with its section prefix
    pub fn resolve(
        file: RetrievalSettingsFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> std::result::Result<Self, ConfigError> {
        let engine = resolve_engine(&file.engine, &env)?;

        let retrieval = file
            .retrieval
            .as_ref()
            .map(RetrieveConfig::from_value)
            .transpose()
            .map_err(|e| e.nested_under("retrieval"))?
            .unwrap_or_default();

        let mut reranking = file
            .reranking
            .as_ref()
            .map(RerankingModelConfig::from_value)
            .transpose()
            .map_err(|e| e.nested_under("reranking"))?
            .unwrap_or_default();
        if let Some(key) = env("BEACON_RETRIEVAL_RERANK_API_KEY").filter(|k| !k.is_empty()) {
            reranking.set_api_key(Some(SecretString::from(key)));
        }

        let mut graph = file
            .graph
            .as_ref()
            .map(GraphSearchConfig::from_value)
            .transpose()
            .map_err(|e| e.nested_under("graph"))?
            .unwrap_or_default();
        if let Some(key) = env("BEACON_RETRIEVAL_GRAPH_API_KEY").filter(|k| !k.is_empty()) {
            graph.set_api_key(Some(SecretString::from(key)));
        }

        Ok(Self {
            engine,
            retrieval,
            reranking,
            graph,
        })
    }
}

fn resolve_engine(
    file: &EngineFileConfig,
    env: &impl Fn(&str) -> Option<String>,
) -> std::result::Result<EngineSettings, ConfigError> {
    let mut settings = EngineSettings::default();

    let timeout = match env("BEACON_RETRIEVAL_BACKEND_TIMEOUT") {
        Some(raw) => Some(raw.parse::<f64>().map_err(|_| {
            ConfigError::invalid_type("BEACON_RETRIEVAL_BACKEND_TIMEOUT", "a number of seconds")
        })?),
        None => file.backend_timeout,
    };
    if let Some(secs) = timeout {
        let secs = fields::positive_seconds("engine.backend_timeout", secs)?;
        settings.backend_timeout = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
    }

    let retries = match env("BEACON_RETRIEVAL_BACKEND_RETRIES") {
        Some(raw) => Some(raw.parse::<u32>().map_err(|_| {
            ConfigError::invalid_type("BEACON_RETRIEVAL_BACKEND_RETRIES", "a non-negative integer")
        })?),
        None => file.backend_retry_count,
    };
    if let Some(retries) = retries {
        settings.backend_retry_count = retries;
    }

    let in_flight = match env("BEACON_RETRIEVAL_RERANK_MAX_IN_FLIGHT") {
        Some(raw) => Some(raw.parse::<usize>().map_err(|_| {
            ConfigError::invalid_type("BEACON_RETRIEVAL_RERANK_MAX_IN_FLIGHT", "a positive integer")
        })?),
        None => file.rerank_max_in_flight,
    };
    if let Some(n) = in_flight {
        if n == 0 {
            return Err(ConfigError::out_of_range(
                "engine.rerank_max_in_flight",
                "at least 1",
                n,
            ));
        }
        settings.rerank_max_in_flight = n;
    }

    if let Some(capacity) = file.rerank_cache_capacity {
        settings.rerank_cache_capacity = capacity;
    }
    if let Some(ms) = file.retry_base_delay_ms {
        settings.retry.base_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = file.retry_max_delay_ms {
        settings.retry.max_delay = Duration::from_millis(ms);
    }
    if settings.retry.max_delay < settings.retry.base_delay {
        return Err(ConfigError::out_of_range(
            "engine.retry_max_delay_ms",
            "at least engine.retry_base_delay_ms",
            settings.retry.max_delay.as_millis(),
        ));
    }

    Ok(settings)
}

/// Return the settings file path: `~/.config/omni/beacon/retrieval.toml`
#[must_use]
pub fn settings_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("beacon")
            .join("retrieval.toml")
    })
}
