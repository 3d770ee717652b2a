//! HTTP entry: adapts an inbound axum request to the engine and the
//! engine's outcome back to an HTTP response. Any method and any path reach
//! the same function.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::Router;
use futures_util::TryStreamExt;
use tracing::info;

use crate::engine::{Engine, FunctionRequest};
use crate::observe;

pub const NAMESPACE_HEADER: &str = "X-Fission-Function-Namespace";

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new().fallback(invoke).with_state(engine)
}

async fn invoke(State(engine): State<Arc<Engine>>, req: Request<Body>) -> Response {
    let (parts, body) = req.into_parts();

    let request_id = observe::request_id(&parts.headers);
    info!(
        req_id = %request_id,
        request = %observe::request_log_object(&parts),
        "function invoked"
    );

    let header_str = |name| {
        parts
            .headers
            .get(name)
            .and_then(|v: &HeaderValue| v.to_str().ok())
            .map(|v| v.to_string())
    };

    let reader = tokio_util::io::StreamReader::new(
        body.into_data_stream().map_err(std::io::Error::other),
    );

    let function_req = FunctionRequest {
        request_id: request_id.clone(),
        namespace: header_str(NAMESPACE_HEADER).unwrap_or_default(),
        content_length: header_str(CONTENT_LENGTH.as_str()).and_then(|v| v.parse().ok()),
        content_type: header_str(CONTENT_TYPE.as_str()),
        body: Box::new(reader),
    };

    let outcome = engine.handle(function_req).await;

    let status =
        StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, Json(outcome.envelope)).into_response();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(observe::REQUEST_ID_HEADER, value);
    }
    response
}
