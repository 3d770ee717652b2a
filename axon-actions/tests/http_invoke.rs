//! HTTP action invocation against a locally bound server.

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use axon_core::action::{Action, ActionError, InvokeContext};
use axon_actions::http::HttpAction;

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr.to_string()
}

fn ctx() -> InvokeContext {
    InvokeContext {
        request_id: "test".to_string(),
        deadline: None,
    }
}

fn action(yaml: &str) -> HttpAction {
    serde_yaml::from_str(yaml).unwrap()
}

#[tokio::test]
async fn get_produces_the_structured_response_value() {
    let addr = serve(Router::new().route("/item", get(|| async { Json(json!({"id": 42})) }))).await;
    let a = action(&format!("uri: http://{addr}/item\nmethod: GET\n"));
    a.validate().unwrap();

    let value = a.invoke(&ctx()).await.unwrap();
    assert_eq!(value["status"], json!(200));
    assert_eq!(value["json"]["id"], json!(42));
    assert_eq!(value["headers"]["content-type"], json!("application/json"));
    assert!(value["body"].as_str().unwrap().contains("42"));
}

#[tokio::test]
async fn post_sends_body_and_headers() {
    let addr = serve(Router::new().route(
        "/echo",
        post(
            |headers: axum::http::HeaderMap, body: String| async move {
                Json(json!({
                    "x-param": headers.get("x-param").and_then(|v| v.to_str().ok()),
                    "body": body,
                }))
            },
        ),
    ))
    .await;

    let a = action(&format!(
        "uri: http://{addr}/echo\nmethod: POST\nheaders:\n  X-Param: John Doe\nbody: 'payload'\n"
    ));
    let value = a.invoke(&ctx()).await.unwrap();
    assert_eq!(value["json"]["x-param"], json!("John Doe"));
    assert_eq!(value["json"]["body"], json!("payload"));
}

#[tokio::test]
async fn own_timeout_cuts_a_slow_endpoint() {
    let addr = serve(Router::new().route(
        "/slow",
        get(|| async {
            tokio::time::sleep(std::time::Duration::from_secs(3)).await;
            "late"
        }),
    ))
    .await;

    let a = action(&format!(
        "uri: http://{addr}/slow\nmethod: GET\ntimeout: 100\n"
    ));
    let err = a.invoke(&ctx()).await.unwrap_err();
    assert!(matches!(err, ActionError::DeadlineExceeded));
}

#[tokio::test]
async fn refused_connection_is_a_network_error() {
    // Bind then drop, so the port is very likely closed.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let a = action(&format!("uri: http://{addr}/\nmethod: GET\n"));
    let err = a.invoke(&ctx()).await.unwrap_err();
    assert!(matches!(err, ActionError::Network(_)), "got: {err:?}");
}

#[tokio::test]
async fn redirects_are_reported_when_following_is_off() {
    let addr = serve(Router::new().route(
        "/a",
        get(|| async { axum::response::Redirect::temporary("/b") }),
    ))
    .await;

    let a = action(&format!(
        "uri: http://{addr}/a\nmethod: GET\noptions:\n  transport:\n    followRedirect: false\n"
    ));
    let value = a.invoke(&ctx()).await.unwrap();
    assert_eq!(value["status"], json!(307));
}
