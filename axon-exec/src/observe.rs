//! Request correlation and structured log projections.

use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use serde_json::{json, Map, Value};

pub const REQUEST_ID_HEADER: &str = "Request-Id";

/// The caller's `Request-Id` when present, otherwise a fresh UUID v4.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Install the global subscriber: `RUST_LOG`-style filtering over a fmt
/// layer. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

pub fn headers_log_object(headers: &HeaderMap) -> Value {
    let mut out = Map::new();
    for (name, value) in headers {
        let v = value.to_str().unwrap_or("<binary>");
        out.insert(name.to_string(), Value::String(v.to_string()));
    }
    Value::Object(out)
}

/// Projection of the inbound request head for the invocation log record.
pub fn request_log_object(parts: &Parts) -> Value {
    json!({
        "method": parts.method.as_str(),
        "url": parts.uri.to_string(),
        "content-length": parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok()),
        "content-type": parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        "headers": headers_log_object(&parts.headers),
    })
}
