//! Error taxonomy as seen on the wire: status, code and envelope shape.

mod common;

use axum::http::{header::WWW_AUTHENTICATE, StatusCode};
use axum::response::IntoResponse;
use inventory_api::AppError;
use serde_json::json;

async fn render(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    (status, common::body_json(response).await)
}

#[tokio::test]
async fn no_input_data_is_400() {
    let (status, body) = render(AppError::NoInputData).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "no_input_data");
    assert_eq!(body["error"]["message"], "no input data provided");
    assert!(body["error"].get("details").is_none());
}

#[tokio::test]
async fn validation_lists_every_field() {
    let mut fields = inventory_api::error::FieldErrors::new();
    fields.insert("name".into(), "is required".into());
    fields.insert("year".into(), "must be an integer year".into());
    let (status, body) = render(AppError::Validation(fields)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(
        body["error"]["details"],
        json!({"name": "is required", "year": "must be an integer year"})
    );
}

#[tokio::test]
async fn not_unique_names_the_field() {
    let (status, body) = render(AppError::NotUnique { field: "login".into() }).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "not_unique");
    assert_eq!(body["error"]["message"], "value of 'login' is not unique");
    assert_eq!(body["error"]["details"], json!({"login": "already exists"}));
}

#[tokio::test]
async fn not_found_and_row_not_found_are_404() {
    let (status, body) = render(AppError::NotFound("Building with id 7".into())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, body) = render(AppError::Db(sqlx::Error::RowNotFound)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn internal_errors_hide_their_cause() {
    let (status, body) = render(AppError::Internal("pool exploded at 0xdeadbeef".into())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "internal_error");
    assert_eq!(body["error"]["message"], "internal server error");

    let (status, body) = render(AppError::Db(sqlx::Error::PoolTimedOut)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["message"], "database error");
}

#[tokio::test]
async fn unauthorized_challenges_for_basic_auth() {
    let response = AppError::Unauthorized("missing credentials".into()).into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(WWW_AUTHENTICATE).unwrap(),
        "Basic realm=\"inventory\""
    );
    let body = common::body_json(response).await;
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn forbidden_is_403_without_challenge() {
    let response = AppError::Forbidden("admin role required".into()).into_response();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
}
