//! GraphQL action invocation against a locally bound server.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use axon_actions::graphql::GraphqlAction;
use axon_core::action::{Action, InvokeContext};

type Captured = Arc<Mutex<Option<Value>>>;

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

#[tokio::test]
async fn posts_query_variables_and_operation_name() {
    let captured: Captured = Arc::new(Mutex::new(None));
    let app = Router::new()
        .route(
            "/graphql",
            post(
                |State(captured): State<Captured>, Json(body): Json<Value>| async move {
                    *captured.lock().unwrap() = Some(body);
                    Json(json!({"data": {"hero": {"name": "R2-D2"}}}))
                },
            ),
        )
        .with_state(captured.clone());
    let addr = serve(app).await;

    let a: GraphqlAction = serde_yaml::from_str(&format!(
        concat!(
            "uri: graphql://{}/graphql\n",
            "query: 'query Hero {{ hero {{ name }} }}'\n",
            "variables:\n",
            "  episode: JEDI\n",
            "operationName: Hero\n",
        ),
        addr
    ))
    .unwrap();
    a.validate().unwrap();

    let value = a.invoke(&ctx()).await.unwrap();
    assert_eq!(value["status"], json!(200));
    assert_eq!(value["json"]["data"]["hero"]["name"], json!("R2-D2"));

    let sent = captured.lock().unwrap().clone().unwrap();
    assert_eq!(sent["query"], json!("query Hero { hero { name } }"));
    assert_eq!(sent["variables"]["episode"], json!("JEDI"));
    assert_eq!(sent["operationName"], json!("Hero"));
}

#[tokio::test]
async fn empty_variables_and_operation_are_omitted() {
    let captured: Captured = Arc::new(Mutex::new(None));
    let app = Router::new()
        .route(
            "/q",
            post(
                |State(captured): State<Captured>, Json(body): Json<Value>| async move {
                    *captured.lock().unwrap() = Some(body);
                    Json(json!({"data": null}))
                },
            ),
        )
        .with_state(captured.clone());
    let addr = serve(app).await;

    let a: GraphqlAction =
        serde_yaml::from_str(&format!("uri: graphql://{addr}/q\nquery: '{{ me }}'\n")).unwrap();
    a.invoke(&ctx()).await.unwrap();

    let sent = captured.lock().unwrap().clone().unwrap();
    assert!(sent.get("variables").is_none());
    assert!(sent.get("operationName").is_none());
}
