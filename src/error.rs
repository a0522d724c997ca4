//! Error types for Beacon retrieval

use std::time::Duration;

use thiserror::Error;

/// Result type alias for retrieval operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the retrieval core
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    /// The knowledge base code set is empty or malformed
    #[error("invalid knowledge base codes: {0}")]
    InvalidKnowledgeBases(String),

    /// An attempt exceeded its time budget
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// What was being attempted (strategy or service name)
        operation: String,
        /// Per-attempt budget that was exceeded
        timeout: Duration,
    },

    /// A search backend reported a failure
    #[error("{backend} backend failed: {reason}")]
    Backend {
        /// Backend name
        backend: &'static str,
        /// Failure description
        reason: String,
    },

    /// An outbound service answered with a non-2xx status
    #[error("{service} returned HTTP {status}: {body}")]
    Upstream {
        /// Service name
        service: &'static str,
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
        /// Server-requested delay before retrying
        retry_after: Option<Duration>,
    },

    /// An outbound service answered with a body we could not use
    #[error("malformed {service} response: {reason}")]
    MalformedResponse {
        /// Service name
        service: &'static str,
        /// What was wrong with the body
        reason: String,
    },

    /// The query was cancelled by the caller
    #[error("retrieval cancelled")]
    Cancelled,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether another attempt of the same operation could succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Backend { .. } | Self::MalformedResponse { .. } => true,
            Self::Upstream { status, .. } => crate::retry::is_recoverable(*status),
            Self::Http(e) => !e.is_builder() && !e.is_redirect(),
            Self::InvalidConfiguration(_)
            | Self::InvalidKnowledgeBases(_)
            | Self::Cancelled
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Toml(_) => false,
        }
    }

    /// Server-requested retry delay, if the failure carried one
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Upstream { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Field-level configuration validation failure
///
/// `field` is the dotted wire path of the offending value,
/// e.g. `weights.graph_setting.max_depth`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Value lies outside its documented range
    #[error("{field} must be {constraint}, got {value}")]
    OutOfRange {
        /// Offending field
        field: String,
        /// Human-readable constraint, e.g. "within [0, 1]"
        constraint: &'static str,
        /// Rejected value
        value: String,
    },

    /// Required key absent from a nested map
    #[error("{field} is required")]
    Missing {
        /// Missing field
        field: String,
    },

    /// Value has the wrong JSON type
    #[error("{field} must be {expected}")]
    InvalidType {
        /// Offending field
        field: String,
        /// Expected type description
        expected: &'static str,
    },

    /// Value is not a member of a closed enumeration
    #[error("{field} has unknown value {value:?}")]
    UnknownVariant {
        /// Offending field
        field: String,
        /// Rejected value
        value: String,
    },

    /// Endpoint is not an http(s) URL
    #[error("{field} is not a valid http(s) URL: {reason}")]
    InvalidUrl {
        /// Offending field
        field: String,
        /// Parse failure or scheme problem
        reason: String,
    },
}

impl ConfigError {
    /// Dotted path of the field that failed validation
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::OutOfRange { field, .. }
            | Self::Missing { field }
            | Self::InvalidType { field, .. }
            | Self::UnknownVariant { field, .. }
            | Self::InvalidUrl { field, .. } => field,
        }
    }

    pub(crate) fn out_of_range(
        field: impl Into<String>,
        constraint: &'static str,
        value: impl ToString,
    ) -> Self {
        Self::OutOfRange {
            field: field.into(),
            constraint,
            value: value.to_string(),
        }
    }

    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Self::Missing {
            field: field.into(),
        }
    }

    pub(crate) fn invalid_type(field: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidType {
            field: field.into(),
            expected,
        }
    }

    /// Prefix the field path, used when a nested map is validated on its own
    #[must_use]
    pub(crate) fn nested_under(self, parent: &str) -> Self {
        let join = |field: String| format!("{parent}.{field}");
        match self {
            Self::OutOfRange {
                field,
                constraint,
                value,
            } => Self::OutOfRange {
                field: join(field),
                constraint,
                value,
            },
            Self::Missing { field } => Self::Missing { field: join(field) },
            Self::InvalidType { field, expected } => Self::InvalidType {
                field: join(field),
                expected,
            },
            Self::UnknownVariant { field, value } => Self::UnknownVariant {
                field: join(field),
                value,
            },
            Self::InvalidUrl { field, reason } => Self::InvalidUrl {
                field: join(field),
                reason,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_reports_field_and_constraint() {
        let err = ConfigError::out_of_range("score_threshold", "within [0, 1]", 1.5);
        assert_eq!(err.field(), "score_threshold");
        assert_eq!(
            err.to_string(),
            "score_threshold must be within [0, 1], got 1.5"
        );
    }

    #[test]
    fn nested_prefixes_field_path() {
        let err = ConfigError::missing("max_depth").nested_under("weights.graph_setting");
        assert_eq!(err.field(), "weights.graph_setting.max_depth");
    }

    #[test]
    fn retryable_classification() {
        let timeout = Error::Timeout {
            operation: "graph".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(timeout.is_retryable());

        let throttled = Error::Upstream {
            service: "rerank",
            status: 429,
            body: String::new(),
            retry_after: Some(Duration::from_secs(2)),
        };
        assert!(throttled.is_retryable());
        assert_eq!(throttled.retry_after(), Some(Duration::from_secs(2)));

        let rejected = Error::Upstream {
            service: "rerank",
            status: 401,
            body: "bad key".to_string(),
            retry_after: None,
        };
        assert!(!rejected.is_retryable());

        assert!(!Error::Cancelled.is_retryable());
        assert!(
            !Error::InvalidConfiguration(ConfigError::missing("weights")).is_retryable()
        );
    }
}
