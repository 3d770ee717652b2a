//! The stage-ordered request pipeline.
//!
//! Each stage either produces a value for the stages after it or a
//! [`Terminal`] response; a terminal short-circuits the rest of the chain.
//! The post-condition runs *after* the action stage returns, because it
//! reads the `response` key the action wrote; it consults the writer's done
//! flag so it never overwrites an earlier terminal.

use std::io::Read;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, info, warn, Instrument};

use axon_core::action::{Action, ActionError, ActionFactory, ConfigFactory, InvokeContext};
use axon_core::config::{Config, Secret};
use axon_core::envelope::{Envelope, Stage};
use axon_core::expr::Predicate;
use axon_core::resources::ResourceStore;
use axon_core::template;

use crate::environment::Environment;

const MEDIA_TYPE_JSON: &str = "application/json";
const CONFIG_RESOURCE: &str = "function-spec.yml";
const SECRET_RESOURCE: &str = "function-secret.yml";

pub type BodyStream = Box<dyn AsyncRead + Send + Unpin>;

/// The engine's view of one inbound invocation.
pub struct FunctionRequest {
    pub request_id: String,
    /// Namespace selecting the config/secret directory.
    pub namespace: String,
    pub content_length: Option<i64>,
    pub content_type: Option<String>,
    pub body: BodyStream,
}

impl FunctionRequest {
    /// Convenience constructor used by tests and adapters that already hold
    /// the whole body.
    pub fn from_bytes(namespace: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            namespace: namespace.into(),
            content_length: Some(body.len() as i64),
            content_type: Some(MEDIA_TYPE_JSON.to_string()),
            body: Box::new(std::io::Cursor::new(body)),
        }
    }
}

/// Final result of a request: the HTTP status plus the envelope body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: u16,
    pub envelope: Envelope,
}

/// A terminal response produced by a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminal {
    pub status: u16,
    pub message: String,
    pub stage: Stage,
}

impl Terminal {
    pub fn new(status: u16, message: impl Into<String>, stage: Stage) -> Self {
        Self {
            status,
            message: message.into(),
            stage,
        }
    }

    fn into_outcome(self) -> Outcome {
        Outcome {
            status: self.status,
            envelope: Envelope::new(self.status, self.message, self.stage),
        }
    }
}

/// Writes exactly one terminal response per request: the first write wins
/// and later attempts are no-ops.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    terminal: Option<Terminal>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn write(&mut self, t: Terminal) {
        if let Some(first) = &self.terminal {
            debug!(
                stage = %t.stage,
                kept = %first.stage,
                "terminal response already written, ignoring"
            );
            return;
        }
        match t.status {
            200..=299 => info!(stage = %t.stage, status = t.status, message = %t.message, "request finished"),
            400..=499 => warn!(stage = %t.stage, status = t.status, message = %t.message, "request rejected"),
            _ => error!(stage = %t.stage, status = t.status, message = %t.message, "request failed"),
        }
        self.terminal = Some(t);
    }

    pub fn finish(self) -> Outcome {
        match self.terminal {
            Some(t) => t.into_outcome(),
            // Unreachable through `Engine::handle`, which always writes.
            None => Terminal::new(502, "no response produced", Stage::DoAction).into_outcome(),
        }
    }
}

/// Everything the post-condition hook needs once the action has run.
struct PostState {
    uri: String,
    post_source: String,
    post: Predicate,
    env: Environment,
}

pub struct Engine {
    store: Arc<dyn ResourceStore>,
    config_factory: Arc<dyn ConfigFactory>,
    action_factory: Arc<dyn ActionFactory>,
    configs_folder: String,
    secrets_folder: String,
}

impl Engine {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        config_factory: Arc<dyn ConfigFactory>,
        action_factory: Arc<dyn ActionFactory>,
    ) -> Self {
        Self {
            store,
            config_factory,
            action_factory,
            configs_folder: "configs".to_string(),
            secrets_folder: "secrets".to_string(),
        }
    }

    /// Override the resource folders (mostly useful in tests).
    pub fn with_folders(
        mut self,
        configs_folder: impl Into<String>,
        secrets_folder: impl Into<String>,
    ) -> Self {
        self.configs_folder = configs_folder.into();
        self.secrets_folder = secrets_folder.into();
        self
    }

    /// Run the whole pipeline for one request.
    pub async fn handle(&self, req: FunctionRequest) -> Outcome {
        let span = tracing::info_span!(
            "function",
            req_id = %req.request_id,
            namespace = %req.namespace,
        );
        self.run(req).instrument(span).await
    }

    async fn run(&self, mut req: FunctionRequest) -> Outcome {
        let mut writer = ResponseWriter::new();

        match self.run_chain(&mut req).await {
            ControlFlow::Break(terminal) => writer.write(terminal),
            ControlFlow::Continue(state) => {
                // The post-condition observes `response`, so it runs after
                // the action stage and only when nothing terminal has been
                // written yet.
                if !writer.is_done() {
                    writer.write(self.match_post_condition(&state));
                }
            }
        }

        writer.finish()
    }

    async fn run_chain(&self, req: &mut FunctionRequest) -> ControlFlow<Terminal, PostState> {
        let config = self.load_configuration(req)?;
        let secret = self.load_secret(req)?;
        self.check_content_length(req, &config)?;
        self.check_content_type(req)?;
        let pre = compile_condition(&config.pre_condition, Stage::ParsePreCondition)?;
        let post = compile_condition(&config.post_condition, Stage::ParsePostCondition)?;
        let data = self.parse_payload(req, &config).await?;

        let mut env = Environment::new();
        env.set_data(data);
        env.set_config(&config);
        env.set_secret(secret);
        info!(stage = "build-environment", "environment built");

        self.match_pre_condition(&pre, &env)?;
        let action = self.build_action(&config, &env)?;
        let response = self
            .do_action(action.as_ref(), &config, &req.request_id)
            .await?;
        env.set_response(response);

        ControlFlow::Continue(PostState {
            uri: action.uri().to_string(),
            post_source: config.post_condition.clone(),
            post,
            env,
        })
    }

    fn load_configuration(&self, req: &FunctionRequest) -> ControlFlow<Terminal, Config> {
        let fail =
            |message: String| ControlFlow::Break(Terminal::new(503, message, Stage::LoadConfiguration));

        let opened = match self
            .store
            .open(&self.configs_folder, &req.namespace, CONFIG_RESOURCE)
        {
            Ok(o) => o,
            Err(e) => return fail(e.to_string()),
        };
        let Some(reader) = opened else {
            return fail(format!(
                "no configuration file {CONFIG_RESOURCE} found in /{}/{}",
                self.configs_folder, req.namespace
            ));
        };

        let text = match read_to_string(reader) {
            Ok(t) => t,
            Err(e) => return fail(e.to_string()),
        };
        let config = match self.config_factory.defaults().merge_yaml(&text) {
            Ok(c) => c,
            Err(e) => return fail(e.to_string()),
        };
        if let Err(e) = config.validate() {
            return fail(e.to_string());
        }

        info!(
            stage = %Stage::LoadConfiguration,
            pre_condition = %config.pre_condition,
            post_condition = %config.post_condition,
            "configuration loaded"
        );
        ControlFlow::Continue(config)
    }

    fn load_secret(&self, req: &FunctionRequest) -> ControlFlow<Terminal, Option<Secret>> {
        let fail = |message: String| ControlFlow::Break(Terminal::new(503, message, Stage::LoadSecret));

        let opened = match self
            .store
            .open(&self.secrets_folder, &req.namespace, SECRET_RESOURCE)
        {
            Ok(o) => o,
            Err(e) => return fail(e.to_string()),
        };
        let Some(reader) = opened else {
            debug!(stage = %Stage::LoadSecret, "no secret loaded");
            return ControlFlow::Continue(None);
        };

        let text = match read_to_string(reader) {
            Ok(t) => t,
            Err(e) => return fail(e.to_string()),
        };
        match axon_core::config::decode_secret(&text) {
            Ok(secret) => {
                info!(stage = %Stage::LoadSecret, "secret loaded");
                ControlFlow::Continue(Some(secret))
            }
            Err(e) => fail(e.to_string()),
        }
    }

    fn check_content_length(
        &self,
        req: &FunctionRequest,
        config: &Config,
    ) -> ControlFlow<Terminal, ()> {
        let max = config.max_body_size;
        if max > 0 {
            if let Some(length) = req.content_length {
                if length > max {
                    return ControlFlow::Break(Terminal::new(
                        417,
                        format!("request too large. Maximum bytes allowed: {max}"),
                        Stage::CheckContentLength,
                    ));
                }
            }
        }
        debug!(stage = %Stage::CheckContentLength, "content length within limit");
        ControlFlow::Continue(())
    }

    fn check_content_type(&self, req: &FunctionRequest) -> ControlFlow<Terminal, ()> {
        let accepted = req
            .content_type
            .as_deref()
            .map(|header| {
                header.split(',').any(|token| {
                    token
                        .split(';')
                        .next()
                        .map(|t| t.trim().eq_ignore_ascii_case(MEDIA_TYPE_JSON))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false);

        if accepted {
            info!(stage = %Stage::CheckContentType, content_type = MEDIA_TYPE_JSON, "valid media type");
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(Terminal::new(
                415,
                format!("unsupported media type. Expected: {MEDIA_TYPE_JSON}"),
                Stage::CheckContentType,
            ))
        }
    }

    async fn parse_payload(
        &self,
        req: &mut FunctionRequest,
        config: &Config,
    ) -> ControlFlow<Terminal, Map<String, Value>> {
        let max = config.max_body_size;
        let mut buf = Vec::new();

        // The limit wraps the read itself so an oversized stream fails at
        // max + 1 bytes even without a Content-Length.
        let read = if max > 0 {
            let mut limited = (&mut req.body).take(max as u64 + 1);
            limited.read_to_end(&mut buf).await
        } else {
            req.body.read_to_end(&mut buf).await
        };

        if let Err(e) = read {
            return ControlFlow::Break(Terminal::new(400, e.to_string(), Stage::ParsePayload));
        }
        if max > 0 && buf.len() as i64 > max {
            return ControlFlow::Break(Terminal::new(
                413,
                format!("request too large. Maximum bytes allowed: {max}"),
                Stage::ParsePayload,
            ));
        }

        match serde_json::from_slice::<Map<String, Value>>(&buf) {
            Ok(data) => {
                info!(stage = %Stage::ParsePayload, size = buf.len(), "payload parsed");
                ControlFlow::Continue(data)
            }
            Err(e) => ControlFlow::Break(Terminal::new(400, e.to_string(), Stage::ParsePayload)),
        }
    }

    fn match_pre_condition(
        &self,
        pre: &Predicate,
        env: &Environment,
    ) -> ControlFlow<Terminal, ()> {
        match pre.eval_bool(env.as_map()) {
            Ok(true) => {
                info!(stage = %Stage::MatchPreCondition, "pre-condition matched");
                ControlFlow::Continue(())
            }
            Ok(false) => ControlFlow::Break(Terminal::new(
                200,
                "unsatisfied condition",
                Stage::MatchPreCondition,
            )),
            Err(e) => ControlFlow::Break(Terminal::new(
                400,
                e.to_string(),
                Stage::MatchPreCondition,
            )),
        }
    }

    fn build_action(
        &self,
        config: &Config,
        env: &Environment,
    ) -> ControlFlow<Terminal, Box<dyn Action>> {
        let fail = |message: String| ControlFlow::Break(Terminal::new(503, message, Stage::BuildAction));

        let rendered = match template::render("action", &config.action, env.as_map()) {
            Ok(r) => r,
            Err(e) => return fail(e.to_string()),
        };
        let action = match self.action_factory.build(&rendered) {
            Ok(a) => a,
            Err(e) => return fail(e.to_string()),
        };
        if let Err(e) = action.validate() {
            return fail(e.to_string());
        }

        info!(stage = %Stage::BuildAction, action = %action.log_object(), "action built");
        ControlFlow::Continue(action)
    }

    async fn do_action(
        &self,
        action: &dyn Action,
        config: &Config,
        request_id: &str,
    ) -> ControlFlow<Terminal, Value> {
        let deadline =
            (config.timeout_ms > 0).then(|| Duration::from_millis(config.timeout_ms as u64));
        let ctx = InvokeContext {
            request_id: request_id.to_string(),
            deadline,
        };

        info!(stage = %Stage::DoAction, endpoint = %action.uri(), "invoking endpoint");

        let result = match deadline {
            Some(limit) => match tokio::time::timeout(limit, action.invoke(&ctx)).await {
                Ok(r) => r,
                Err(_) => Err(ActionError::DeadlineExceeded),
            },
            None => action.invoke(&ctx).await,
        };

        match result {
            Ok(response) => {
                info!(stage = %Stage::DoAction, "invocation succeeded");
                ControlFlow::Continue(response)
            }
            Err(e) => ControlFlow::Break(Terminal::new(502, e.to_string(), Stage::DoAction)),
        }
    }

    fn match_post_condition(&self, state: &PostState) -> Terminal {
        match state.post.eval_bool(state.env.as_map()) {
            Ok(true) => {
                info!(stage = %Stage::MatchPostCondition, endpoint = %state.uri, "invocation satisfied post-condition");
                Terminal::new(200, "HTTP call succeeded", Stage::MatchPostCondition)
            }
            Ok(false) => Terminal::new(
                502,
                format!(
                    "endpoint '{}' call didn't satisfy postCondition: {}",
                    state.uri, state.post_source
                ),
                Stage::MatchPostCondition,
            ),
            Err(e) => Terminal::new(400, e.to_string(), Stage::MatchPostCondition),
        }
    }
}

fn compile_condition(source: &str, stage: Stage) -> ControlFlow<Terminal, Predicate> {
    match Predicate::compile(source) {
        Ok(p) => {
            info!(stage = %stage, "condition parsed");
            ControlFlow::Continue(p)
        }
        Err(e) => ControlFlow::Break(Terminal::new(503, e.to_string(), stage)),
    }
}

fn read_to_string(mut reader: Box<dyn Read + Send>) -> std::io::Result<String> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_keeps_the_first_terminal() {
        let mut w = ResponseWriter::new();
        assert!(!w.is_done());
        w.write(Terminal::new(415, "first", Stage::CheckContentType));
        w.write(Terminal::new(200, "second", Stage::MatchPostCondition));
        assert!(w.is_done());

        let out = w.finish();
        assert_eq!(out.status, 415);
        assert_eq!(out.envelope.message, "first");
        assert_eq!(out.envelope.data.stage, Stage::CheckContentType);
    }
}
