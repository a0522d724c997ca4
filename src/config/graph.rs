//! Standalone graph service configuration

use std::collections::BTreeSet;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use url::Url;

use super::fields;
use super::weights::GraphSetting;
use crate::error::ConfigError;

/// Connection and traversal settings for the graph service
///
/// When the graph strategy runs inside a retrieval config, the traversal
/// fields (weight, depth, properties, timeout, retries) are overlaid from
/// `weights.graph_setting`; endpoint, key, type filters and limit always
/// come from here.
#[derive(Debug)]
pub struct GraphSearchConfig {
    relation_weight: f64,
    max_depth: u32,
    include_properties: bool,
    api_endpoint: Option<Url>,
    api_key: Option<SecretString>,
    timeout: f64,
    retry_count: u32,
    relation_types: BTreeSet<String>,
    node_types: BTreeSet<String>,
    limit: u32,
}

impl Default for GraphSearchConfig {
    fn default() -> Self {
        Self {
            relation_weight: 0.3,
            max_depth: 2,
            include_properties: true,
            api_endpoint: None,
            api_key: None,
            timeout: 30.0,
            retry_count: 3,
            relation_types: BTreeSet::new(),
            node_types: BTreeSet::new(),
            limit: 20,
        }
    }
}

impl Clone for GraphSearchConfig {
    fn clone(&self) -> Self {
        Self {
            relation_weight: self.relation_weight,
            max_depth: self.max_depth,
            include_properties: self.include_properties,
            api_endpoint: self.api_endpoint.clone(),
            api_key: self
                .api_key
                .as_ref()
                .map(|k| SecretString::from(k.expose_secret().to_owned())),
            timeout: self.timeout,
            retry_count: self.retry_count,
            relation_types: self.relation_types.clone(),
            node_types: self.node_types.clone(),
            limit: self.limit,
        }
    }
}

impl GraphSearchConfig {
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

    #[must_use]
    pub const fn api_endpoint(&self) -> Option<&Url> {
        self.api_endpoint.as_ref()
    }

    #[must_use]
    pub const fn api_key(&self) -> Option<&SecretString> {
        self.api_key.as_ref()
    }

    /// Per-attempt timeout in seconds
    #[must_use]
    pub const fn timeout(&self) -> f64 {
        self.timeout
    }

    #[must_use]
    pub fn timeout_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout).unwrap_or(Duration::MAX)
    }

    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Relation types to follow; empty means all
    #[must_use]
    pub const fn relation_types(&self) -> &BTreeSet<String> {
        &self.relation_types
    }

    /// Node types to return; empty means all
    #[must_use]
    pub const fn node_types(&self) -> &BTreeSet<String> {
        &self.node_types
    }

    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// # Errors
    ///
    /// Returns an error if `weight` is outside [0, 1]
    pub fn set_relation_weight(&mut self, weight: f64) -> Result<(), ConfigError> {
        self.relation_weight = fields::unit_interval("relation_weight", weight)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if `depth` is 0
    pub fn set_max_depth(&mut self, depth: u32) -> Result<(), ConfigError> {
        self.max_depth = fields::at_least_one("max_depth", depth)?;
        Ok(())
    }

    pub const fn set_include_properties(&mut self, include: bool) {
        self.include_properties = include;
    }

    /// Set the service endpoint; a blank string clears it
    ///
    /// # Errors
    ///
    /// Returns an error if `endpoint` is not an http(s) URL
    pub fn set_api_endpoint(&mut self, endpoint: &str) -> Result<(), ConfigError> {
        self.api_endpoint = fields::endpoint("api_endpoint", endpoint)?;
        Ok(())
    }

    pub fn set_api_key(&mut self, key: Option<SecretString>) {
        self.api_key = key;
    }

    /// # Errors
    ///
    /// Returns an error if `timeout` is not a positive finite number of seconds
    pub fn set_timeout(&mut self, timeout: f64) -> Result<(), ConfigError> {
        self.timeout = fields::positive_seconds("timeout", timeout)?;
        Ok(())
    }

    pub const fn set_retry_count(&mut self, retries: u32) {
        self.retry_count = retries;
    }

    pub fn set_relation_types(&mut self, types: impl IntoIterator<Item = impl Into<String>>) {
        self.relation_types = types.into_iter().map(Into::into).collect();
    }

    pub fn set_node_types(&mut self, types: impl IntoIterator<Item = impl Into<String>>) {
        self.node_types = types.into_iter().map(Into::into).collect();
    }

    /// # Errors
    ///
    /// Returns an error if `limit` is 0
    pub fn set_limit(&mut self, limit: u32) -> Result<(), ConfigError> {
        self.limit = fields::at_least_one("limit", limit)?;
        Ok(())
    }

    /// Copy with the traversal fields taken from an embedded graph setting
    #[must_use]
    pub fn with_setting(&self, setting: &GraphSetting) -> Self {
        Self {
            relation_weight: setting.relation_weight(),
            max_depth: setting.max_depth(),
            include_properties: setting.include_properties(),
            timeout: setting.timeout(),
            retry_count: setting.retry_count(),
            ..self.clone()
        }
    }

    /// Build from an untyped map; absent keys keep defaults
    ///
    /// # Errors
    ///
    /// Returns the first field that fails validation
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let map = fields::object(value, "graph")?;
        let mut config = Self::default();

        if let Some(w) = fields::float(map, "", "relation_weight")? {
            config.set_relation_weight(w)?;
        }
        if let Some(d) = fields::count(map, "", "max_depth", 1)? {
            config.set_max_depth(d)?;
        }
        if let Some(p) = fields::boolean(map, "", "include_properties")? {
            config.set_include_properties(p);
        }
        if let Some(e) = fields::string(map, "", "api_endpoint")? {
            config.set_api_endpoint(&e)?;
        }
        if let Some(k) = fields::string(map, "", "api_key")? {
            config.set_api_key((!k.is_empty()).then(|| SecretString::from(k)));
        }
        if let Some(t) = fields::float(map, "", "timeout")? {
            config.set_timeout(t)?;
        }
        if let Some(r) = fields::count(map, "", "retry_count", 0)? {
            config.set_retry_count(r);
        }
        if let Some(types) = fields::string_set(map, "", "relation_types")? {
            config.relation_types = types;
        }
        if let Some(types) = fields::string_set(map, "", "node_types")? {
            config.node_types = types;
        }
        if let Some(l) = fields::count(map, "", "limit", 1)? {
            config.set_limit(l)?;
        }

        Ok(config)
    }

    /// Wire map, including the API key so it can be persisted
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "relation_weight": self.relation_weight,
            "max_depth": self.max_depth,
            "include_properties": self.include_properties,
            "api_endpoint": self.api_endpoint.as_ref().map_or("", Url::as_str),
            "api_key": self.api_key.as_ref().map_or("", |k| k.expose_secret()),
            "timeout": self.timeout,
            "retry_count": self.retry_count,
            "relation_types": self.relation_types,
            "node_types": self.node_types,
            "limit": self.limit,
        })
    }
}
