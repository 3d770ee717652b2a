//! Slack action invocation against a stand-in API server.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use axon_actions::slack::SlackAction;
use axon_core::action::{Action, ActionError, InvokeContext};

type Captured = Arc<Mutex<Option<(Option<String>, Value)>>>;

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

fn api_stub(captured: Captured, reply: Value) -> Router {
    Router::new()
        .route(
            "/chat.postMessage",
            post(
                move |State(captured): State<Captured>,
                      headers: HeaderMap,
                      Json(body): Json<Value>| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(|v| v.to_string());
                    *captured.lock().unwrap() = Some((auth, body));
                    Json(reply)
                },
            ),
        )
        .with_state(captured)
}

#[tokio::test]
async fn message_is_posted_with_bearer_token() {
    let captured: Captured = Arc::new(Mutex::new(None));
    let addr = serve(api_stub(
        captured.clone(),
        json!({"ok": true, "channel": "C123", "ts": "1.2"}),
    ))
    .await;

    let a: SlackAction = serde_yaml::from_str(&format!(
        "uri: 'slack:#deploys'\ntoken: xoxb-test\nmessage: 'deploy done'\nusername: bot\napiUrl: http://{addr}\n"
    ))
    .unwrap();
    a.validate().unwrap();

    let value = a.invoke(&ctx()).await.unwrap();
    assert_eq!(value, json!("ok"));

    let (auth, body) = captured.lock().unwrap().clone().unwrap();
    assert_eq!(auth.as_deref(), Some("Bearer xoxb-test"));
    assert_eq!(body["channel"], json!("deploys"));
    assert_eq!(body["text"], json!("deploy done"));
    assert_eq!(body["username"], json!("bot"));
}

#[tokio::test]
async fn api_error_fails_the_action() {
    let captured: Captured = Arc::new(Mutex::new(None));
    let addr = serve(api_stub(
        captured,
        json!({"ok": false, "error": "invalid_auth"}),
    ))
    .await;

    let a: SlackAction = serde_yaml::from_str(&format!(
        "uri: 'slack:#c'\ntoken: bad\nmessage: hi\napiUrl: http://{addr}\n"
    ))
    .unwrap();

    let err = a.invoke(&ctx()).await.unwrap_err();
    match err {
        ActionError::Other(msg) => assert!(msg.contains("invalid_auth"), "got: {msg}"),
        other => panic!("unexpected error: {other:?}"),
    }
}
