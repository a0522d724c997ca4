//! Reranking service configuration

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use url::Url;

use super::fields;
use super::retrieve::RerankingModel;
use crate::error::ConfigError;

/// Connection, batching and caching settings for the reranking service
#[derive(Debug)]
pub struct RerankingModelConfig {
    reranking_model_name: String,
    reranking_provider_name: String,
    api_endpoint: Option<Url>,
    api_key: Option<SecretString>,
    timeout: f64,
    retry_count: u32,
    top_n: u32,
    batch_size: u32,
    use_cache: bool,
    cache_ttl: u64,
}

impl Default for RerankingModelConfig {
    fn default() -> Self {
        Self {
            reranking_model_name: String::new(),
            reranking_provider_name: String::new(),
            api_endpoint: None,
            api_key: None,
            timeout: 30.0,
            retry_count: 2,
            top_n: 10,
            batch_size: 32,
            use_cache: false,
            cache_ttl: 3600,
        }
    }
}

impl Clone for RerankingModelConfig {
    fn clone(&self) -> Self {
        Self {
            reranking_model_name: self.reranking_model_name.clone(),
            reranking_provider_name: self.reranking_provider_name.clone(),
            api_endpoint: self.api_endpoint.clone(),
            api_key: self
                .api_key
                .as_ref()
                .map(|k| SecretString::from(k.expose_secret().to_owned())),
            timeout: self.timeout,
            retry_count: self.retry_count,
            top_n: self.top_n,
            batch_size: self.batch_size,
            use_cache: self.use_cache,
            cache_ttl: self.cache_ttl,
        }
    }
}

impl RerankingModelConfig {
    #[must_use]
    pub fn reranking_model_name(&self) -> &str {
        &self.reranking_model_name
    }

    #[must_use]
    pub fn reranking_provider_name(&self) -> &str {
        &self.reranking_provider_name
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

    #[must_use]
    pub const fn top_n(&self) -> u32 {
        self.top_n
    }

    #[must_use]
    pub const fn batch_size(&self) -> u32 {
        self.batch_size
    }

    #[must_use]
    pub const fn use_cache(&self) -> bool {
        self.use_cache
    }

    /// Cache entry lifetime in seconds
    #[must_use]
    pub const fn cache_ttl(&self) -> u64 {
        self.cache_ttl
    }

    pub fn set_reranking_model_name(&mut self, name: impl Into<String>) {
        self.reranking_model_name = name.into();
    }

    pub fn set_reranking_provider_name(&mut self, provider: impl Into<String>) {
        self.reranking_provider_name = provider.into();
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

    /// # Errors
    ///
    /// Returns an error if `top_n` is 0
    pub fn set_top_n(&mut self, top_n: u32) -> Result<(), ConfigError> {
        self.top_n = fields::at_least_one("top_n", top_n)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if `batch_size` is 0
    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        self.batch_size = fields::at_least_one("batch_size", batch_size)?;
        Ok(())
    }

    pub const fn set_use_cache(&mut self, use_cache: bool) {
        self.use_cache = use_cache;
    }

    pub const fn set_cache_ttl(&mut self, seconds: u64) {
        self.cache_ttl = seconds;
    }

    /// Copy targeting the model named in a retrieval config
    ///
    /// Blank names in `model` keep this config's values.
    #[must_use]
    pub fn for_model(&self, model: &RerankingModel) -> Self {
        let mut config = self.clone();
        if !model.reranking_model_name.is_empty() {
            config
                .reranking_model_name
                .clone_from(&model.reranking_model_name);
        }
        if !model.reranking_provider_name.is_empty() {
            config
                .reranking_provider_name
                .clone_from(&model.reranking_provider_name);
        }
        config
    }

    /// Build from an untyped map; absent keys keep defaults
    ///
    /// # Errors
    ///
    /// Returns the first field that fails validation
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let map = fields::object(value, "reranking")?;
        let mut config = Self::default();

        if let Some(name) = fields::string(map, "", "reranking_model_name")? {
            config.set_reranking_model_name(name);
        }
        if let Some(provider) = fields::string(map, "", "reranking_provider_name")? {
            config.set_reranking_provider_name(provider);
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
        if let Some(n) = fields::count(map, "", "top_n", 1)? {
            config.set_top_n(n)?;
        }
        if let Some(b) = fields::count(map, "", "batch_size", 1)? {
            config.set_batch_size(b)?;
        }
        if let Some(c) = fields::boolean(map, "", "use_cache")? {
            config.set_use_cache(c);
        }
        if let Some(ttl) = fields::seconds(map, "", "cache_ttl")? {
            config.set_cache_ttl(ttl);
        }

        Ok(config)
    }

    /// Wire map, including the API key so it can be persisted
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "reranking_model_name": self.reranking_model_name,
            "reranking_provider_name": self.reranking_provider_name,
            "api_endpoint": self.api_endpoint.as_ref().map_or("", Url::as_str),
            "api_key": self.api_key.as_ref().map_or("", |k| k.expose_secret()),
            "timeout": self.timeout,
            "retry_count": self.retry_count,
            "top_n": self.top_n,
            "batch_size": self.batch_size,
            "use_cache": self.use_cache,
            "cache_ttl": self.cache_ttl,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_round_trips() {
        let stored = json!({
            "reranking_model_name": "jina-reranker-v2",
            "reranking_provider_name": "jina",
            "api_endpoint": "https://api.jina.ai/v1/rerank",
            "api_key": "jina-key",
            "timeout": 8.0,
            "retry_count": 1,
            "top_n": 3,
            "batch_size": 16,
            "use_cache": true,
            "cache_ttl": 0
        });

        let config = RerankingModelConfig::from_value(&stored).unwrap();
        assert_eq!(config.batch_size(), 16);
        assert!(config.use_cache());
        assert_eq!(config.to_value(), stored);
    }

    #[test]
    fn rejects_invalid_bounds() {
        let mut config = RerankingModelConfig::default();
        assert!(config.set_top_n(0).is_err());
        assert!(config.set_batch_size(0).is_err());
        assert!(config.set_timeout(-3.0).is_err());
        assert!(config.set_top_n(1).is_ok());
        assert!(config.set_batch_size(1).is_ok());

        let err = RerankingModelConfig::from_value(&json!({ "cache_ttl": -5 })).unwrap_err();
        assert_eq!(err.field(), "cache_ttl");
    }

    #[test]
    fn for_model_overrides_non_blank_names() {
        let mut base = RerankingModelConfig::default();
        base.set_reranking_model_name("default-model");
        base.set_reranking_provider_name("default-provider");

        let merged = base.for_model(&RerankingModel::new("rerank-v3.5", ""));
        assert_eq!(merged.reranking_model_name(), "rerank-v3.5");
        assert_eq!(merged.reranking_provider_name(), "default-provider");
    }
}
