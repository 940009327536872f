#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use axum_extra::headers::{Authorization, HeaderMapExt};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::PgPool;
use tower::ServiceExt;

use inventory_api::{app_router, apply_migrations, builtin, ensure_admin, resolve, AppState};

pub const ADMIN: (&str, &str) = ("admin", "admin-pass");

/// Build the full application router over a fresh test database: schema
/// applied and the bootstrap admin created, exactly as `main` does.
pub async fn build_test_app(pool: PgPool) -> Router {
    let model = resolve(&builtin().expect("catalog parses")).expect("catalog resolves");
    apply_migrations(&pool, &model).await.expect("migrations apply");
    ensure_admin(&pool, &model, ADMIN.0, ADMIN.1).await.expect("admin bootstrap");
    app_router(
        AppState {
            pool,
            model: Arc::new(model),
        },
        1024 * 1024,
    )
}

/// Send one request and return status plus parsed JSON body (`Null` when empty).
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    auth: Option<(&str, &str)>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header(CONTENT_TYPE, "application/json");
    }
    let mut request = builder
        .body(match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        })
        .unwrap();
    if let Some((login, password)) = auth {
        request.headers_mut().typed_insert(Authorization::basic(login, password));
    }
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    }
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None, Some(ADMIN)).await
}

pub async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(body), Some(ADMIN)).await
}

pub async fn patch(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::PATCH, uri, Some(body), Some(ADMIN)).await
}

pub async fn delete(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::DELETE, uri, None, Some(ADMIN)).await
}

/// POST and return the created id, asserting 201.
pub async fn create(app: &Router, uri: &str, body: Value) -> i64 {
    let (status, json) = post(app, uri, body).await;
    assert_eq!(status, StatusCode::CREATED, "create {} failed: {}", uri, json);
    json["data"]["id"].as_i64().expect("created row has an id")
}
