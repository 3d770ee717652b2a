//! GraphQL action: a JSON POST of `{query, variables, operationName}`.
//!
//! The URI uses the `graphql`/`graphqls` scheme and is dialed over
//! http/https.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use axon_core::action::{
    Action, ActionBuildError, ActionError, ActionFactory, ConfigFactory, InvokeContext,
};
use axon_core::config::Config;
use axon_core::error::ValidationError;
use axon_core::validate::Validator;

use crate::transport::{effective_timeout, map_reqwest_error, response_value};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GraphqlAction {
    pub uri: String,
    pub headers: BTreeMap<String, String>,
    pub query: String,
    pub variables: Map<String, Value>,
    pub operation_name: String,
    #[serde(rename = "timeout")]
    pub timeout_ms: i64,
}

impl GraphqlAction {
    /// `graphql://` dials as `http://`, `graphqls://` as `https://`.
    fn endpoint(&self) -> String {
        self.uri.replacen("graphql", "http", 1)
    }
}

#[async_trait]
impl Action for GraphqlAction {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Validator::new();
        v.require_str("uri", &self.uri);
        v.min_len("uri", &self.uri, 7);
        if !self.uri.is_empty() {
            v.scheme("uri", &self.uri, "graphql|graphqls");
        }
        v.require_str("query", &self.query);
        v.finish()
    }

    async fn invoke(&self, ctx: &InvokeContext) -> Result<Value, ActionError> {
        let mut payload = json!({ "query": self.query });
        if !self.variables.is_empty() {
            payload["variables"] = Value::Object(self.variables.clone());
        }
        if !self.operation_name.is_empty() {
            payload["operationName"] = Value::String(self.operation_name.clone());
        }

        let endpoint = self.endpoint();
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ActionError::Other(e.to_string()))?;

        let mut rb = client.post(&endpoint).json(&payload);
        if let Some(limit) = effective_timeout(self.timeout_ms, ctx) {
            rb = rb.timeout(limit);
        }
        for (name, value) in &self.headers {
            rb = rb.header(name, value);
        }

        debug!(endpoint = %endpoint, operation = %self.operation_name, "sending query");
        let resp = rb.send().await.map_err(map_reqwest_error)?;
        response_value(resp).await
    }

    fn log_object(&self) -> Value {
        json!({
            "uri": self.uri,
            "headers": self.headers,
            "query": self.query,
            "variables": self.variables,
        })
    }
}

pub struct GraphqlConfigFactory;

impl ConfigFactory for GraphqlConfigFactory {
    fn defaults(&self) -> Config {
        Config::with_conditions("true", "response.status == 200")
    }
}

pub struct GraphqlActionFactory;

impl ActionFactory for GraphqlActionFactory {
    fn build(&self, rendered: &str) -> Result<Box<dyn Action>, ActionBuildError> {
        let action: GraphqlAction = serde_yaml::from_str(rendered)?;
        Ok(Box::new(action))
    }
}
