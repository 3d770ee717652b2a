//! Plain HTTP/HTTPS action.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
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
pub struct HttpAction {
    pub uri: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    /// Time limit (in ms) for the outbound request; 0 uses the engine's.
    #[serde(rename = "timeout")]
    pub timeout_ms: i64,
    pub options: HttpOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpOptions {
    pub transport: TransportOptions,
    pub tls: TlsOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransportOptions {
    pub follow_redirect: bool,
    pub max_redirects: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            follow_redirect: true,
            max_redirects: 50,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TlsOptions {
    /// PEM bundle appended to the trusted roots.
    pub ca_cert_data: String,
    /// PEM client certificate, paired with `clientKeyData`.
    pub client_cert_data: String,
    pub client_key_data: String,
    pub insecure_skip_verify: bool,
}

impl HttpAction {
    fn client(&self) -> Result<reqwest::Client, ActionError> {
        let redirect = if self.options.transport.follow_redirect {
            reqwest::redirect::Policy::limited(self.options.transport.max_redirects)
        } else {
            reqwest::redirect::Policy::none()
        };

        let mut builder = reqwest::Client::builder().redirect(redirect);

        let tls = &self.options.tls;
        if tls.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if !tls.ca_cert_data.is_empty() {
            let cert = reqwest::Certificate::from_pem(tls.ca_cert_data.as_bytes())
                .map_err(|e| ActionError::Other(format!("invalid caCertData: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        if !tls.client_cert_data.is_empty() {
            if tls.client_key_data.is_empty() {
                return Err(ActionError::Other(
                    "clientKeyData not provided for the client certificate".to_string(),
                ));
            }
            let pem = format!("{}\n{}", tls.client_cert_data, tls.client_key_data);
            let identity = reqwest::Identity::from_pem(pem.as_bytes())
                .map_err(|e| ActionError::Other(format!("invalid client certificate: {e}")))?;
            builder = builder.identity(identity);
        }

        builder
            .build()
            .map_err(|e| ActionError::Other(e.to_string()))
    }
}

#[async_trait]
impl Action for HttpAction {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Validator::new();
        v.require_str("uri", &self.uri);
        v.min_len("uri", &self.uri, 7);
        if !self.uri.is_empty() {
            v.scheme("uri", &self.uri, "http|https");
        }
        v.require_str("method", &self.method);
        v.min_len("method", &self.method, 3);
        v.finish()
    }

    async fn invoke(&self, ctx: &InvokeContext) -> Result<Value, ActionError> {
        let method: reqwest::Method = self
            .method
            .parse()
            .map_err(|_| ActionError::Other(format!("invalid method '{}'", self.method)))?;

        let mut rb = self.client()?.request(method, &self.uri);
        if let Some(limit) = effective_timeout(self.timeout_ms, ctx) {
            rb = rb.timeout(limit);
        }
        for (name, value) in &self.headers {
            rb = rb.header(name, value);
        }
        if !self.body.is_empty() {
            rb = rb.body(self.body.clone());
        }

        debug!(method = %self.method, uri = %self.uri, "sending request");
        let resp = rb.send().await.map_err(map_reqwest_error)?;
        debug!(status = resp.status().as_u16(), uri = %self.uri, "response received");
        response_value(resp).await
    }

    fn log_object(&self) -> Value {
        json!({
            "uri": self.uri,
            "method": self.method,
            "headers": self.headers,
            "body": self.body,
        })
    }
}

pub struct HttpConfigFactory;

impl ConfigFactory for HttpConfigFactory {
    fn defaults(&self) -> Config {
        // A 2xx answer counts as success unless the config says otherwise.
        Config::with_conditions(
            "true",
            "response.status >= 200 and response.status < 300",
        )
    }
}

pub struct HttpActionFactory;

impl ActionFactory for HttpActionFactory {
    fn build(&self, rendered: &str) -> Result<Box<dyn Action>, ActionBuildError> {
        let action: HttpAction = serde_yaml::from_str(rendered)?;
        Ok(Box::new(action))
    }
}
