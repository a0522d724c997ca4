//! Versioned retrieval configuration and its wire map

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::fields::{self, Object};
use super::weights::Weights;
use crate::error::ConfigError;

/// Schema version written by this crate
///
/// Version 1 predates the graph strategy: it has no `weights.graph_setting`
/// and may spell full-text search as `keyword_search`.
pub const CURRENT_VERSION: u32 = 2;

/// Which strategy set a query runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SearchMethod {
    #[default]
    Semantic,
    FullText,
    /// Semantic + full-text, plus graph when its relation weight is non-zero
    Hybrid,
    Graph,
}

impl SearchMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "semantic_search",
            Self::FullText => "full_text_search",
            Self::Hybrid => "hybrid_search",
            Self::Graph => "graph_search",
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "semantic_search" => Ok(Self::Semantic),
            "full_text_search" => Ok(Self::FullText),
            "hybrid_search" => Ok(Self::Hybrid),
            "graph_search" => Ok(Self::Graph),
            other => Err(ConfigError::UnknownVariant {
                field: "search_method".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Fusion discipline used when reranking is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RerankingMode {
    /// Send candidates to an external reranking model
    RerankingModel,
    /// Weighted linear combination of normalized strategy scores
    #[default]
    WeightedScore,
}

impl RerankingMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RerankingModel => "reranking_model",
            Self::WeightedScore => "weighted_score",
        }
    }
}

impl fmt::Display for RerankingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RerankingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reranking_model" => Ok(Self::RerankingModel),
            "weighted_score" => Ok(Self::WeightedScore),
            other => Err(ConfigError::UnknownVariant {
                field: "reranking_mode".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Which external reranking model to call
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RerankingModel {
    pub reranking_model_name: String,
    pub reranking_provider_name: String,
}

impl RerankingModel {
    #[must_use]
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            reranking_model_name: name.into(),
            reranking_provider_name: provider.into(),
        }
    }

    fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let map = fields::object(value, "reranking_model")?;
        Ok(Self {
            reranking_model_name: fields::string(map, "reranking_model", "reranking_model_name")?
                .unwrap_or_default(),
            reranking_provider_name: fields::string(
                map,
                "reranking_model",
                "reranking_provider_name",
            )?
            .unwrap_or_default(),
        })
    }

    fn to_value(&self) -> Value {
        json!({
            "reranking_model_name": self.reranking_model_name,
            "reranking_provider_name": self.reranking_provider_name,
        })
    }
}

/// Configuration for one retrieval invocation
///
/// Every mutation is validated before it is applied, so an instance is
/// always in a valid state and a rejected setter leaves it untouched.
/// The wire form (`to_value` / `from_value`) is what gets persisted next
/// to a knowledge base's settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct RetrieveConfig {
    version: u32,
    search_method: SearchMethod,
    top_k: u32,
    score_threshold: f64,
    score_threshold_enabled: bool,
    reranking_mode: RerankingMode,
    reranking_enable: bool,
    weights: Weights,
    reranking_model: RerankingModel,
}

impl Default for RetrieveConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            search_method: SearchMethod::Semantic,
            top_k: 4,
            score_threshold: 0.0,
            score_threshold_enabled: false,
            reranking_mode: RerankingMode::WeightedScore,
            reranking_enable: false,
            weights: Weights::default(),
            reranking_model: RerankingModel::default(),
        }
    }
}

impl RetrieveConfig {
    /// Start a builder seeded with defaults
    #[must_use]
    pub fn builder() -> RetrieveConfigBuilder {
        RetrieveConfigBuilder::default()
    }

    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub const fn search_method(&self) -> SearchMethod {
        self.search_method
    }

    #[must_use]
    pub const fn top_k(&self) -> u32 {
        self.top_k
    }

    #[must_use]
    pub const fn score_threshold(&self) -> f64 {
        self.score_threshold
    }

    #[must_use]
    pub const fn score_threshold_enabled(&self) -> bool {
        self.score_threshold_enabled
    }

    #[must_use]
    pub const fn reranking_mode(&self) -> RerankingMode {
        self.reranking_mode
    }

    #[must_use]
    pub const fn reranking_enable(&self) -> bool {
        self.reranking_enable
    }

    #[must_use]
    pub const fn weights(&self) -> &Weights {
        &self.weights
    }

    #[must_use]
    pub const fn reranking_model(&self) -> &RerankingModel {
        &self.reranking_model
    }

    /// # Errors
    ///
    /// Returns an error if `version` is older than [`CURRENT_VERSION`];
    /// legacy configs are upgraded on read instead
    pub fn set_version(&mut self, version: u32) -> Result<(), ConfigError> {
        if version < CURRENT_VERSION {
            return Err(ConfigError::out_of_range(
                "version",
                "at least the current schema version",
                version,
            ));
        }
        self.version = version;
        Ok(())
    }

    pub const fn set_search_method(&mut self, method: SearchMethod) {
        self.search_method = method;
    }

    /// # Errors
    ///
    /// Returns an error if `top_k` is 0
    pub fn set_top_k(&mut self, top_k: u32) -> Result<(), ConfigError> {
        self.top_k = fields::at_least_one("top_k", top_k)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if `threshold` is outside [0, 1]
    pub fn set_score_threshold(&mut self, threshold: f64) -> Result<(), ConfigError> {
        self.score_threshold = fields::unit_interval("score_threshold", threshold)?;
        Ok(())
    }

    pub const fn set_score_threshold_enabled(&mut self, enabled: bool) {
        self.score_threshold_enabled = enabled;
    }

    pub const fn set_reranking_mode(&mut self, mode: RerankingMode) {
        self.reranking_mode = mode;
    }

    pub const fn set_reranking_enable(&mut self, enabled: bool) {
        self.reranking_enable = enabled;
    }

    pub fn set_weights(&mut self, weights: Weights) {
        self.weights = weights;
    }

    /// Replace the weights from an untyped map
    ///
    /// The map is fully parsed and validated before anything is assigned.
    ///
    /// # Errors
    ///
    /// Returns an error if a sub-object or required graph field is missing,
    /// or any value is out of range
    pub fn set_weights_from_value(&mut self, value: &Value) -> Result<(), ConfigError> {
        self.weights = Weights::from_value(value)?;
        Ok(())
    }

    pub fn set_reranking_model(&mut self, model: RerankingModel) {
        self.reranking_model = model;
    }

    /// Build a config from its wire map
    ///
    /// Only keys present in the map are applied; everything else keeps its
    /// default. Older schema versions are upgraded first and unknown keys
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns the first field that fails validation
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let map = fields::object(value, "retrieve_config")?;
        let version = fields::count(map, "", "version", 1)?.unwrap_or(CURRENT_VERSION);

        let upgraded;
        let map = if version < CURRENT_VERSION {
            upgraded = upgrade_legacy(map);
            &upgraded
        } else {
            if version > CURRENT_VERSION {
                tracing::warn!(
                    version,
                    current = CURRENT_VERSION,
                    "retrieval config written by a newer schema, ignoring unknown keys"
                );
            }
            map
        };

        let mut config = Self {
            version: version.max(CURRENT_VERSION),
            ..Self::default()
        };

        if let Some(method) = fields::string(map, "", "search_method")? {
            config.set_search_method(method.parse()?);
        }
        if let Some(top_k) = fields::count(map, "", "top_k", 1)? {
            config.set_top_k(top_k)?;
        }
        if let Some(threshold) = fields::float(map, "", "score_threshold")? {
            config.set_score_threshold(threshold)?;
        }
        if let Some(enabled) = fields::boolean(map, "", "score_threshold_enabled")? {
            config.set_score_threshold_enabled(enabled);
        }
        if let Some(mode) = fields::string(map, "", "reranking_mode")? {
            config.set_reranking_mode(mode.parse()?);
        }
        if let Some(enabled) = fields::boolean(map, "", "reranking_enable")? {
            config.set_reranking_enable(enabled);
        }
        if let Some(weights) = map.get("weights").filter(|v| !v.is_null()) {
            config.set_weights_from_value(weights)?;
        }
        if let Some(model) = map.get("reranking_model").filter(|v| !v.is_null()) {
            config.set_reranking_model(RerankingModel::from_value(model)?);
        }

        Ok(config)
    }

    /// Wire map; the exact inverse of [`RetrieveConfig::from_value`]
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "version": self.version,
            "search_method": self.search_method.as_str(),
            "top_k": self.top_k,
            "score_threshold": self.score_threshold,
            "score_threshold_enabled": self.score_threshold_enabled,
            "reranking_mode": self.reranking_mode.as_str(),
            "reranking_enable": self.reranking_enable,
            "weights": self.weights.to_value(),
            "reranking_model": self.reranking_model.to_value(),
        })
    }
}

impl TryFrom<Value> for RetrieveConfig {
    type Error = ConfigError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(&value)
    }
}

impl From<RetrieveConfig> for Value {
    fn from(config: RetrieveConfig) -> Self {
        config.to_value()
    }
}

/// Bring a version-1 map up to the current schema
fn upgrade_legacy(map: &Object) -> Object {
    let mut map = map.clone();

    if map.get("search_method").and_then(Value::as_str) == Some("keyword_search") {
        map.insert(
            "search_method".to_string(),
            Value::from(SearchMethod::FullText.as_str()),
        );
    }

    if let Some(weights) = map.get_mut("weights").and_then(Value::as_object_mut) {
        weights
            .entry("graph_setting")
            .or_insert_with(Weights::default_graph_setting_value);
    }

    tracing::debug!(to = CURRENT_VERSION, "upgraded legacy retrieval config");
    map
}

/// Builder that collects values and validates them all in [`build`](Self::build)
#[derive(Debug, Clone, Default)]
pub struct RetrieveConfigBuilder {
    search_method: Option<SearchMethod>,
    top_k: Option<u32>,
    score_threshold: Option<f64>,
    score_threshold_enabled: Option<bool>,
    reranking_mode: Option<RerankingMode>,
    reranking_enable: Option<bool>,
    weights: Option<Weights>,
    reranking_model: Option<RerankingModel>,
}

impl RetrieveConfigBuilder {
    #[must_use]
    pub const fn search_method(mut self, method: SearchMethod) -> Self {
        self.search_method = Some(method);
        self
    }

    #[must_use]
    pub const fn top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Sets the threshold and enables threshold filtering
    #[must_use]
    pub const fn score_threshold(mut self, threshold: f64) -> Self {
        self.score_threshold = Some(threshold);
        self.score_threshold_enabled = Some(true);
        self
    }

    #[must_use]
    pub const fn score_threshold_enabled(mut self, enabled: bool) -> Self {
        self.score_threshold_enabled = Some(enabled);
        self
    }

    /// Sets the fusion discipline and enables reranking
    #[must_use]
    pub const fn reranking_mode(mut self, mode: RerankingMode) -> Self {
        self.reranking_mode = Some(mode);
        self.reranking_enable = Some(true);
        self
    }

    #[must_use]
    pub const fn reranking_enable(mut self, enabled: bool) -> Self {
        self.reranking_enable = Some(enabled);
        self
    }

    #[must_use]
    pub fn weights(mut self, weights: Weights) -> Self {
        self.weights = Some(weights);
        self
    }

    #[must_use]
    pub fn reranking_model(mut self, model: RerankingModel) -> Self {
        self.reranking_model = Some(model);
        self
    }

    /// # Errors
    ///
    /// Returns the first collected value that fails validation
    pub fn build(self) -> Result<RetrieveConfig, ConfigError> {
        let mut config = RetrieveConfig::default();

        if let Some(method) = self.search_method {
            config.set_search_method(method);
        }
        if let Some(top_k) = self.top_k {
            config.set_top_k(top_k)?;
        }
        if let Some(threshold) = self.score_threshold {
            config.set_score_threshold(threshold)?;
        }
        if let Some(enabled) = self.score_threshold_enabled {
            config.set_score_threshold_enabled(enabled);
        }
        if let Some(mode) = self.reranking_mode {
            config.set_reranking_mode(mode);
        }
        if let Some(enabled) = self.reranking_enable {
            config.set_reranking_enable(enabled);
        }
        if let Some(weights) = self.weights {
            config.set_weights(weights);
        }
        if let Some(model) = self.reranking_model {
            config.set_reranking_model(model);
        }

        Ok(config)
    }
}
