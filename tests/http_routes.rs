//! HTTP surface: media type enforcement, documents, and status codes.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{graph, registry, seeded, Journal, Recorder};
use jsonapi_sdk::{app, AppState, JsonApiOptions, ResourceHook};
use serde_json::{json, Value};
use tower::ServiceExt;

const JSON_API: &str = "application/vnd.api+json";

async fn test_app(recorders: Vec<Recorder>) -> Router {
    let graph = graph();
    let repo = seeded(&graph).await;
    app(AppState::new(graph, registry(recorders), repo, JsonApiOptions::default()))
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>, content_type: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", content_type)
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_and_readiness() {
    let (status, body) = send(test_app(Vec::new()).await, "GET", "/health", None, JSON_API).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(test_app(Vec::new()).await, "GET", "/ready", None, JSON_API).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resources"], 3);
}

#[tokio::test]
async fn create_returns_created_document() {
    let body = json!({ "data": {
        "type": "people",
        "attributes": { "last-name": "Hopper", "first-name": "Grace" },
        "relationships": { "todo-items": { "data": [{ "type": "todoItems", "id": "2" }] } }
    } });
    let (status, doc) = send(test_app(Vec::new()).await, "POST", "/api/v1/people", Some(body), JSON_API).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(doc["data"]["type"], "people");
    assert_eq!(doc["data"]["id"], "3");
    assert_eq!(doc["data"]["attributes"]["last-name"], "Hopper");
    assert_eq!(doc["data"]["relationships"]["todo-items"]["data"][0]["id"], "2");
}

#[tokio::test]
async fn other_media_types_are_unsupported() {
    let body = json!({ "data": { "type": "people", "attributes": { "last-name": "Hopper" } } });
    let (status, doc) = send(test_app(Vec::new()).await, "POST", "/api/v1/people", Some(body), "text/plain").await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(doc["error"]["code"], "unsupported_media_type");
}

#[tokio::test]
async fn missing_required_attribute_is_unprocessable() {
    let body = json!({ "data": { "type": "people", "attributes": { "first-name": "Grace" } } });
    let (status, doc) = send(test_app(Vec::new()).await, "POST", "/api/v1/people", Some(body), JSON_API).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(doc["error"]["details"][0]["field"], "last-name");
}

#[tokio::test]
async fn hook_rejection_is_forbidden() {
    let journal = Journal::default();
    let app = test_app(vec![Recorder::new("todoItems", &journal).rejecting(ResourceHook::BeforeDelete)]).await;
    let (status, doc) = send(app, "DELETE", "/api/v1/todoItems/1", None, JSON_API).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(doc["error"]["code"], "hook_rejected");
}

#[tokio::test]
async fn read_update_and_delete_by_id() {
    let graph = graph();
    let repo = seeded(&graph).await;
    let app = app(AppState::new(graph, registry(Vec::new()), repo, JsonApiOptions::default()));

    let (status, doc) = send(app.clone(), "GET", "/api/v1/todoItems/1", None, JSON_API).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["data"]["attributes"]["description"], "stored");
    assert_eq!(doc["data"]["relationships"]["owner"]["data"]["id"], "1");

    let patch = json!({ "data": { "type": "todoItems", "id": "1", "attributes": { "ordinal": 4 } } });
    let (status, doc) = send(app.clone(), "PATCH", "/api/v1/todoItems/1", Some(patch), JSON_API).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["data"]["attributes"]["ordinal"], 4);
    assert_eq!(doc["data"]["attributes"]["description"], "stored");

    let (status, _) = send(app.clone(), "DELETE", "/api/v1/todoItems/1", None, JSON_API).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(app, "GET", "/api/v1/todoItems/1", None, JSON_API).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_ids_and_unknown_types() {
    let (status, _) = send(test_app(Vec::new()).await, "GET", "/api/v1/people/abc", None, JSON_API).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(test_app(Vec::new()).await, "GET", "/api/v1/planets", None, JSON_API).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn relationship_endpoints_read_and_replace() {
    let graph = graph();
    let repo = seeded(&graph).await;
    let app = app(AppState::new(graph, registry(Vec::new()), repo, JsonApiOptions::default()));

    let body = json!({ "data": [{ "type": "tags", "id": "1" }, { "type": "tags", "id": "2" }] });
    let (status, doc) = send(
        app.clone(),
        "PATCH",
        "/api/v1/todoItems/1/relationships/tags",
        Some(body),
        JSON_API,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["data"].as_array().unwrap().len(), 2);

    let (status, doc) = send(app.clone(), "GET", "/api/v1/todoItems/1/relationships/tags", None, JSON_API).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["data"][1], json!({ "type": "tags", "id": "2" }));

    let (status, doc) = send(app, "GET", "/api/v1/todoItems/2/relationships/owner", None, JSON_API).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["data"], Value::Null);
}
