//! Shared reqwest plumbing for the wire variants.

use std::time::Duration;

use serde_json::{json, Map, Value};

use axon_core::action::{ActionError, InvokeContext};

/// The effective time limit for one call: the action's own timeout when set,
/// capped by the engine's remaining deadline.
pub(crate) fn effective_timeout(own_ms: i64, ctx: &InvokeContext) -> Option<Duration> {
    let own = (own_ms > 0).then(|| Duration::from_millis(own_ms as u64));
    match (own, ctx.deadline) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

pub(crate) fn map_reqwest_error(e: reqwest::Error) -> ActionError {
    if e.is_timeout() {
        return ActionError::DeadlineExceeded;
    }
    if e.is_connect() || e.is_request() {
        return ActionError::Network(e.to_string());
    }
    ActionError::Other(e.to_string())
}

/// Project a response into the environment's `response` value:
/// `{status, headers, body, json}`, with `json` null when the body is not
/// valid JSON.
pub(crate) async fn response_value(resp: reqwest::Response) -> Result<Value, ActionError> {
    let status = resp.status().as_u16();

    let mut headers = Map::new();
    for (name, value) in resp.headers() {
        if let Ok(s) = value.to_str() {
            headers.insert(name.to_string(), Value::String(s.to_string()));
        }
    }

    let body = resp.text().await.map_err(map_reqwest_error)?;
    let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);

    Ok(json!({
        "status": status,
        "headers": headers,
        "body": body,
        "json": parsed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_timeout_is_capped_by_the_deadline() {
        let ctx = InvokeContext {
            request_id: "r".to_string(),
            deadline: Some(Duration::from_millis(100)),
        };
        assert_eq!(
            effective_timeout(500, &ctx),
            Some(Duration::from_millis(100))
        );
        assert_eq!(
            effective_timeout(50, &ctx),
            Some(Duration::from_millis(50))
        );

        let no_deadline = InvokeContext {
            request_id: "r".to_string(),
            deadline: None,
        };
        assert_eq!(effective_timeout(0, &no_deadline), None);
    }
}
