//! The per-request environment mapping read by predicates and templates.
//!
//! Key ownership: `data` and `config` and `secret` are written once when the
//! environment is built; `response` is written by the action stage, after
//! which the post-condition can observe it. Nothing else writes here.

use axon_core::config::{Config, Secret};
use serde_json::{Map, Value};

#[derive(Debug, Default, Clone)]
pub struct Environment {
    map: Map<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_data(&mut self, data: Map<String, Value>) {
        self.map.insert("data".to_string(), Value::Object(data));
    }

    pub fn set_config(&mut self, config: &Config) {
        let v = serde_json::to_value(config).unwrap_or(Value::Null);
        self.map.insert("config".to_string(), v);
    }

    /// An absent secret is exposed as `null`, so expressions can test for it.
    pub fn set_secret(&mut self, secret: Option<Secret>) {
        let v = secret.map(Value::Object).unwrap_or(Value::Null);
        self.map.insert("secret".to_string(), v);
    }

    pub fn set_response(&mut self, response: Value) {
        self.map.insert("response".to_string(), response);
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_land_under_their_names() {
        let mut env = Environment::new();
        env.set_data(json!({"x": 1}).as_object().unwrap().clone());
        env.set_config(&Config::with_conditions("true", "true"));
        env.set_secret(None);
        env.set_response(json!("ok"));

        let m = env.as_map();
        assert_eq!(m["data"]["x"], json!(1));
        assert_eq!(m["config"]["preCondition"], json!("true"));
        assert_eq!(m["secret"], json!(null));
        assert_eq!(m["response"], json!("ok"));
    }
}
