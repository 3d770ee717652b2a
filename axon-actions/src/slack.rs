//! Slack action: posts a message through `chat.postMessage`.
//!
//! The URI carries the channel in its fragment: `slack:#deploys`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use axon_core::action::{
    Action, ActionBuildError, ActionError, ActionFactory, ConfigFactory, InvokeContext,
};
use axon_core::config::Config;
use axon_core::error::ValidationError;
use axon_core::validate::{scheme_allowed, Validator};

use crate::transport::{effective_timeout, map_reqwest_error};

const DEFAULT_API_BASE: &str = "https://slack.com/api";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SlackAction {
    pub uri: String,
    pub token: String,
    pub message: String,
    pub username: String,
    pub icon_url: String,
    pub icon_emoji: String,
    /// Override of the Slack API base, mostly for tests.
    pub api_url: String,
    #[serde(rename = "timeout")]
    pub timeout_ms: i64,
}

impl SlackAction {
    pub fn channel(&self) -> String {
        url::Url::parse(&self.uri)
            .ok()
            .and_then(|u| u.fragment().map(|f| f.to_string()))
            .unwrap_or_default()
    }

    fn api_base(&self) -> &str {
        if self.api_url.is_empty() {
            DEFAULT_API_BASE
        } else {
            &self.api_url
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: String,
    #[serde(default)]
    channel: String,
    #[serde(default)]
    ts: String,
}

#[async_trait]
impl Action for SlackAction {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Validator::new();
        v.require_str("uri", &self.uri);
        if !self.uri.is_empty() {
            if !scheme_allowed(&self.uri, "slack") {
                v.push("uri", "unsupported scheme. Only slack supported");
            } else if self.channel().is_empty() {
                v.push(
                    "uri",
                    "no channel provided. The channel goes in the fragment of the action URI",
                );
            }
        }
        v.require_str("token", &self.token);
        v.require_str("message", &self.message);
        v.finish()
    }

    async fn invoke(&self, ctx: &InvokeContext) -> Result<Value, ActionError> {
        let mut payload = json!({
            "channel": self.channel(),
            "text": self.message,
        });
        if !self.username.is_empty() {
            payload["username"] = Value::String(self.username.clone());
        }
        if !self.icon_url.is_empty() {
            payload["icon_url"] = Value::String(self.icon_url.clone());
        }
        if !self.icon_emoji.is_empty() {
            payload["icon_emoji"] = Value::String(self.icon_emoji.clone());
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ActionError::Other(e.to_string()))?;

        let mut rb = client
            .post(format!("{}/chat.postMessage", self.api_base()))
            .bearer_auth(&self.token)
            .json(&payload);
        if let Some(limit) = effective_timeout(self.timeout_ms, ctx) {
            rb = rb.timeout(limit);
        }

        let resp = rb.send().await.map_err(map_reqwest_error)?;
        let parsed: PostMessageResponse = resp
            .json()
            .await
            .map_err(|e| ActionError::Other(format!("slack api request failed: {e}")))?;

        if !parsed.ok {
            return Err(ActionError::Other(format!(
                "slack api responded with error `{}`",
                parsed.error
            )));
        }

        debug!(channel = %parsed.channel, ts = %parsed.ts, "message sent");
        Ok(json!("ok"))
    }

    fn log_object(&self) -> Value {
        // The token never reaches the logs.
        json!({
            "uri": self.uri,
            "message": self.message,
            "channel": self.channel(),
        })
    }
}

pub struct SlackConfigFactory;

impl ConfigFactory for SlackConfigFactory {
    fn defaults(&self) -> Config {
        Config::with_conditions("true", "response == \"ok\"")
    }
}

pub struct SlackActionFactory;

impl ActionFactory for SlackActionFactory {
    fn build(&self, rendered: &str) -> Result<Box<dyn Action>, ActionBuildError> {
        let action: SlackAction = serde_yaml::from_str(rendered)?;
        Ok(Box::new(action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(yaml: &str) -> SlackAction {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn channel_comes_from_the_fragment() {
        let a = decode("uri: 'slack:#deploys'\ntoken: t\nmessage: hi\n");
        assert_eq!(a.channel(), "deploys");
        a.validate().unwrap();
    }

    #[test]
    fn missing_channel_is_rejected() {
        let a = decode("uri: 'slack:x'\ntoken: t\nmessage: hi\n");
        let err = a.validate().unwrap_err();
        assert!(err.to_string().contains("channel"));
    }

    #[test]
    fn non_slack_scheme_is_rejected() {
        let a = decode("uri: 'http://h#c'\ntoken: t\nmessage: hi\n");
        assert!(a.validate().is_err());
    }

    #[test]
    fn token_and_message_are_required() {
        let a = decode("uri: 'slack:#c'\n");
        let err = a.validate().unwrap_err();
        assert!(err.to_string().contains("token"));
        assert!(err.to_string().contains("message"));
    }

    #[test]
    fn token_is_not_logged() {
        let a = decode("uri: 'slack:#c'\ntoken: super-secret\nmessage: hi\n");
        assert!(!a.log_object().to_string().contains("super-secret"));
    }
}
