//! Function configuration and secret decoding.
//!
//! A variant's `ConfigFactory` supplies the defaults (notably the default
//! pre/post conditions); YAML decoding overlays only the keys that are
//! present, so an empty document keeps the variant's behavior.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::ValidationError;
use crate::validate::Validator;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("secret document must be a mapping")]
    SecretNotMapping,
}

/// Per-namespace function configuration.
///
/// Serializes with the same camelCase keys it is written with, because the
/// whole config is exposed to expressions and templates under the
/// environment's `config` key.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub pre_condition: String,
    pub post_condition: String,
    /// Templated YAML body describing the outbound action.
    pub action: String,
    /// Maximum request body size in bytes; `0` and `-1` mean unlimited.
    pub max_body_size: i64,
    /// Outbound call time limit in milliseconds; `0` means none.
    #[serde(rename = "timeout")]
    pub timeout_ms: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    pre_condition: Option<String>,
    post_condition: Option<String>,
    action: Option<String>,
    max_body_size: Option<i64>,
    #[serde(rename = "timeout")]
    timeout_ms: Option<i64>,
}

impl Config {
    /// Variant-independent base: accept everything, no action, no limits.
    pub fn with_conditions(pre: impl Into<String>, post: impl Into<String>) -> Self {
        Self {
            pre_condition: pre.into(),
            post_condition: post.into(),
            action: String::new(),
            max_body_size: 0,
            timeout_ms: 0,
        }
    }

    /// Overlay the keys present in `input` onto `self`. An empty document
    /// keeps every default.
    pub fn merge_yaml(mut self, input: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = if input.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(input)?
        };
        if let Some(v) = raw.pre_condition {
            self.pre_condition = v;
        }
        if let Some(v) = raw.post_condition {
            self.post_condition = v;
        }
        if let Some(v) = raw.action {
            self.action = v;
        }
        if let Some(v) = raw.max_body_size {
            self.max_body_size = v;
        }
        if let Some(v) = raw.timeout_ms {
            self.timeout_ms = v;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Validator::new();
        v.require_str("action", &self.action);
        v.min_len("action", &self.action, 5);
        v.gte("maxBodySize", self.max_body_size, -1);
        v.gte("timeout", self.timeout_ms, 0);
        v.finish()
    }
}

/// Opaque per-namespace secret mapping.
pub type Secret = Map<String, Value>;

/// Decode a secret document. The YAML must be a string-keyed mapping; the
/// values are arbitrary.
pub fn decode_secret(input: &str) -> Result<Secret, ConfigError> {
    let value: Value = serde_yaml::from_str(input)?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(ConfigError::SecretNotMapping),
    }
}
