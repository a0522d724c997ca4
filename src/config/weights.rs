//! Per-strategy fusion weights and graph traversal settings

use serde_json::{Value, json};

use super::fields::{self, Object};
use crate::error::ConfigError;
use crate::result::RetrievalType;

const DEFAULT_GRAPH_TIMEOUT_SECS: f64 = 30.0;
const DEFAULT_GRAPH_RETRIES: u32 = 3;

/// Semantic (vector) strategy weight and embedding model selection
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSetting {
    vector_weight: f64,
    /// Embedding model the semantic backend should query with
    pub embedding_model_name: String,
    /// Provider serving the embedding model
    pub embedding_provider_name: String,
}

impl VectorSetting {
    /// # Errors
    ///
    /// Returns an error if `vector_weight` is outside [0, 1]
    pub fn new(
        vector_weight: f64,
        embedding_model_name: impl Into<String>,
        embedding_provider_name: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            vector_weight: fields::unit_interval(
                "weights.vector_setting.vector_weight",
                vector_weight,
            )?,
            embedding_model_name: embedding_model_name.into(),
            embedding_provider_name: embedding_provider_name.into(),
        })
    }

    #[must_use]
    pub const fn vector_weight(&self) -> f64 {
        self.vector_weight
    }

    fn from_map(map: &Object, parent: &str) -> Result<Self, ConfigError> {
        let weight = fields::require(
            fields::float(map, parent, "vector_weight")?,
            parent,
            "vector_weight",
        )?;
        Ok(Self {
            vector_weight: fields::unit_interval(&fields::path(parent, "vector_weight"), weight)?,
            embedding_model_name: fields::string(map, parent, "embedding_model_name")?
                .unwrap_or_default(),
            embedding_provider_name: fields::string(map, parent, "embedding_provider_name")?
                .unwrap_or_default(),
        })
    }

    fn to_value(&self) -> Value {
        json!({
            "vector_weight": self.vector_weight,
            "embedding_model_name": self.embedding_model_name,
            "embedding_provider_name": self.embedding_provider_name,
        })
    }
}

/// Full-text (keyword) strategy weight
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordSetting {
    keyword_weight: f64,
}

impl KeywordSetting {
    /// # Errors
    ///
    /// Returns an error if `keyword_weight` is outside [0, 1]
    pub fn new(keyword_weight: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            keyword_weight: fields::unit_interval(
                "weights.keyword_setting.keyword_weight",
                keyword_weight,
            )?,
        })
    }

    #[must_use]
    pub const fn keyword_weight(&self) -> f64 {
        self.keyword_weight
    }

    fn from_map(map: &Object, parent: &str) -> Result<Self, ConfigError> {
        let weight = fields::require(
            fields::float(map, parent, "keyword_weight")?,
            parent,
            "keyword_weight",
        )?;
        Ok(Self {
            keyword_weight: fields::unit_interval(&fields::path(parent, "keyword_weight"), weight)?,
        })
    }

    fn to_value(&self) -> Value {
        json!({ "keyword_weight": self.keyword_weight })
    }
}

/// Graph strategy weight plus the traversal budget used when the graph
/// strategy runs inside a retrieval config
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSetting {
    relation_weight: f64,
    max_depth: u32,
    include_properties: bool,
    timeout: f64,
    retry_count: u32,
}

impl GraphSetting {
    /// # Errors
    ///
    /// Returns an error if `relation_weight` is outside [0, 1] or `max_depth` is 0
    pub fn new(
        relation_weight: f64,
        max_depth: u32,
        include_properties: bool,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            relation_weight: fields::unit_interval(
                "weights.graph_setting.relation_weight",
                relation_weight,
            )?,
            max_depth: fields::at_least_one("weights.graph_setting.max_depth", max_depth)?,
            include_properties,
            timeout: DEFAULT_GRAPH_TIMEOUT_SECS,
            retry_count: DEFAULT_GRAPH_RETRIES,
        })
    }

    /// Per-attempt timeout in seconds
    ///
    /// # Errors
    ///
    /// Returns an error if `timeout` is not a positive finite number
    pub fn with_timeout(mut self, timeout: f64) -> Result<Self, ConfigError> {
        self.timeout = fields::positive_seconds("weights.graph_setting.timeout", timeout)?;
        Ok(self)
    }

    #[must_use]
    pub const fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    #[must_use]
    pub const fn relation_weight(&self) -> f64 {
        self.relation_weight
    }

    #[must_use]
    pub const fn max_depth(&self) -> u32 {
        self.max_depth
    }

    #[must_use]
    pub const fn include_properties(&self) -> bool {
        self.include_properties
    }

    /// Per-attempt timeout in seconds
    #[must_use]
    pub const fn timeout(&self) -> f64 {
        self.timeout
    }

    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    fn from_map(map: &Object, parent: &str) -> Result<Self, ConfigError> {
        let relation_weight = fields::require(
            fields::float(map, parent, "relation_weight")?,
            parent,
            "relation_weight",
        )?;
        let max_depth = fields::require(
            fields::count(map, parent, "max_depth", 1)?,
            parent,
            "max_depth",
        )?;
        let include_properties = fields::require(
            fields::boolean(map, parent, "include_properties")?,
            parent,
            "include_properties",
        )?;

        let timeout = match fields::float(map, parent, "timeout")? {
            Some(t) => fields::positive_seconds(&fields::path(parent, "timeout"), t)?,
            None => DEFAULT_GRAPH_TIMEOUT_SECS,
        };

        Ok(Self {
            relation_weight: fields::unit_interval(
                &fields::path(parent, "relation_weight"),
                relation_weight,
            )?,
            max_depth,
            include_properties,
            timeout,
            retry_count: fields::count(map, parent, "retry_count", 0)?
                .unwrap_or(DEFAULT_GRAPH_RETRIES),
        })
    }

    fn to_value(&self) -> Value {
        json!({
            "relation_weight": self.relation_weight,
            "max_depth": self.max_depth,
            "include_properties": self.include_properties,
            "timeout": self.timeout,
            "retry_count": self.retry_count,
        })
    }
}

impl Default for GraphSetting {
    fn default() -> Self {
        Self {
            relation_weight: 0.0,
            max_depth: 2,
            include_properties: true,
            timeout: DEFAULT_GRAPH_TIMEOUT_SECS,
            retry_count: DEFAULT_GRAPH_RETRIES,
        }
    }
}

/// Fusion weights for every strategy
///
/// All three settings are always present. Vector and keyword weights are
/// not required to sum to 1; fusion renormalizes by the weight mass of the
/// strategies that actually found a fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Weights {
    pub vector_setting: VectorSetting,
    pub keyword_setting: KeywordSetting,
    pub graph_setting: GraphSetting,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            vector_setting: VectorSetting {
                vector_weight: 0.7,
                embedding_model_name: String::new(),
                embedding_provider_name: String::new(),
            },
            keyword_setting: KeywordSetting {
                keyword_weight: 0.3,
            },
            graph_setting: GraphSetting::default(),
        }
    }
}

impl Weights {
    #[must_use]
    pub const fn new(
        vector_setting: VectorSetting,
        keyword_setting: KeywordSetting,
        graph_setting: GraphSetting,
    ) -> Self {
        Self {
            vector_setting,
            keyword_setting,
            graph_setting,
        }
    }

    /// Fusion weight applied to candidates of the given provenance
    ///
    /// `Hybrid` candidates come from backends that already blend vector and
    /// keyword search, so they take the mean of those two weights.
    #[must_use]
    pub fn weight_for(&self, kind: RetrievalType) -> f64 {
        match kind {
            RetrievalType::Semantic => self.vector_setting.vector_weight,
            RetrievalType::FullText => self.keyword_setting.keyword_weight,
            RetrievalType::Graph => self.graph_setting.relation_weight,
            RetrievalType::Hybrid => {
                f64::midpoint(
                    self.vector_setting.vector_weight,
                    self.keyword_setting.keyword_weight,
                )
            }
        }
    }

    /// Parse the wire `weights` map
    ///
    /// Every sub-object must be present; the whole map is validated before
    /// anything is returned.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing or invalid field
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        Self::from_value_at(value, "weights")
    }

    pub(crate) fn from_value_at(value: &Value, parent: &str) -> Result<Self, ConfigError> {
        let map = fields::object(value, parent)?;

        let sub = |key: &str| -> Result<&Object, ConfigError> {
            let field = fields::path(parent, key);
            let v = map
                .get(key)
                .filter(|v| !v.is_null())
                .ok_or_else(|| ConfigError::missing(field.clone()))?;
            fields::object(v, &field)
        };

        let vector = sub("vector_setting")?;
        let keyword = sub("keyword_setting")?;
        let graph = sub("graph_setting")?;

        Ok(Self {
            vector_setting: VectorSetting::from_map(
                vector,
                &fields::path(parent, "vector_setting"),
            )?,
            keyword_setting: KeywordSetting::from_map(
                keyword,
                &fields::path(parent, "keyword_setting"),
            )?,
            graph_setting: GraphSetting::from_map(graph, &fields::path(parent, "graph_setting"))?,
        })
    }

    /// Wire form of the weights map
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "vector_setting": self.vector_setting.to_value(),
            "keyword_setting": self.keyword_setting.to_value(),
            "graph_setting": self.graph_setting.to_value(),
        })
    }

    /// Wire form of the default graph setting, used when upgrading
    /// configs written before the graph strategy existed
    pub(crate) fn default_graph_setting_value() -> Value {
        GraphSetting::default().to_value()
    }
}
