//! Range checks and typed lookups shared by the config value objects
//!
//! Lookups return `Ok(None)` for absent or `null` keys so callers can keep
//! their defaults, and fail with the dotted field path on a type mismatch.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use url::Url;

use crate::error::ConfigError;

pub(crate) type Object = Map<String, Value>;

const UNIT_INTERVAL: &str = "within [0, 1]";
const AT_LEAST_ONE: &str = "at least 1";
const NON_NEGATIVE: &str = "at least 0";
const POSITIVE_SECONDS: &str = "a finite number of seconds greater than 0";

/// Join a parent path and a key into a dotted field path
pub(crate) fn path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

pub(crate) fn unit_interval(field: &str, value: f64) -> Result<f64, ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::out_of_range(field, UNIT_INTERVAL, value))
    }
}

pub(crate) fn at_least_one(field: &str, value: u32) -> Result<u32, ConfigError> {
    if value >= 1 {
        Ok(value)
    } else {
        Err(ConfigError::out_of_range(field, AT_LEAST_ONE, value))
    }
}

pub(crate) fn positive_seconds(field: &str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::out_of_range(field, POSITIVE_SECONDS, value))
    }
}

/// Parse an optional http(s) endpoint; blank strings mean "not configured"
pub(crate) fn endpoint(field: &str, raw: &str) -> Result<Option<Url>, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        field: field.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(Some(url)),
        other => Err(ConfigError::InvalidUrl {
            field: field.to_string(),
            reason: format!("unsupported scheme {other:?}"),
        }),
    }
}

pub(crate) fn object<'a>(value: &'a Value, field: &str) -> Result<&'a Object, ConfigError> {
    value
        .as_object()
        .ok_or_else(|| ConfigError::invalid_type(field, "an object"))
}

fn present<'a>(map: &'a Object, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

pub(crate) fn float(map: &Object, parent: &str, key: &str) -> Result<Option<f64>, ConfigError> {
    present(map, key)
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| ConfigError::invalid_type(path(parent, key), "a number"))
        })
        .transpose()
}

pub(crate) fn boolean(map: &Object, parent: &str, key: &str) -> Result<Option<bool>, ConfigError> {
    present(map, key)
        .map(|v| {
            v.as_bool()
                .ok_or_else(|| ConfigError::invalid_type(path(parent, key), "a boolean"))
        })
        .transpose()
}

pub(crate) fn string(map: &Object, parent: &str, key: &str) -> Result<Option<String>, ConfigError> {
    present(map, key)
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| ConfigError::invalid_type(path(parent, key), "a string"))
        })
        .transpose()
}

/// Integer count with a lower bound (0 for retry counts, 1 for sizes)
pub(crate) fn count(
    map: &Object,
    parent: &str,
    key: &str,
    min: u32,
) -> Result<Option<u32>, ConfigError> {
    let Some(v) = present(map, key) else {
        return Ok(None);
    };
    let field = path(parent, key);
    let n = v
        .as_i64()
        .ok_or_else(|| ConfigError::invalid_type(field.clone(), "an integer"))?;

    let constraint = if min == 0 { NON_NEGATIVE } else { AT_LEAST_ONE };
    if n < i64::from(min) {
        return Err(ConfigError::out_of_range(field, constraint, n));
    }
    u32::try_from(n)
        .map(Some)
        .map_err(|_| ConfigError::out_of_range(field, "at most 4294967295", n))
}

/// Unsigned integer with no upper bound beyond `u64`
pub(crate) fn seconds(map: &Object, parent: &str, key: &str) -> Result<Option<u64>, ConfigError> {
    let Some(v) = present(map, key) else {
        return Ok(None);
    };
    let field = path(parent, key);
    if let Some(n) = v.as_u64() {
        return Ok(Some(n));
    }
    match v.as_i64() {
        Some(n) => Err(ConfigError::out_of_range(field, NON_NEGATIVE, n)),
        None => Err(ConfigError::invalid_type(field, "an integer")),
    }
}

pub(crate) fn string_set(
    map: &Object,
    parent: &str,
    key: &str,
) -> Result<Option<BTreeSet<String>>, ConfigError> {
    let Some(v) = present(map, key) else {
        return Ok(None);
    };
    let field = path(parent, key);
    let items = v
        .as_array()
        .ok_or_else(|| ConfigError::invalid_type(field.clone(), "an array of strings"))?;

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| ConfigError::invalid_type(field.clone(), "an array of strings"))
        })
        .collect::<Result<BTreeSet<_>, _>>()
        .map(Some)
}

pub(crate) fn require<T>(value: Option<T>, parent: &str, key: &str) -> Result<T, ConfigError> {
    value.ok_or_else(|| ConfigError::missing(path(parent, key)))
}
