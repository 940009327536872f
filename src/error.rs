//! Typed errors and HTTP mapping.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Field key -> human-readable message.
pub type FieldErrors = BTreeMap<String, String>;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key on resource {0}")]
    InvalidPrimaryKey(String),
    #[error("duplicate path segment: {0}")]
    DuplicatePathSegment(String),
    #[error("duplicate field '{field}' on resource {resource}")]
    DuplicateField { resource: String, field: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no input data provided")]
    NoInputData,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("validation failed")]
    Validation(FieldErrors),
    #[error("value of '{field}' is not unique")]
    NotUnique { field: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("database: {0}")]
    Db(sqlx::Error),
    #[error("internal: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config_error",
            AppError::NoInputData => "no_input_data",
            AppError::BadRequest(_) | AppError::Validation(_) => "bad_request",
            AppError::NotUnique { .. } => "not_unique",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::Db(sqlx::Error::RowNotFound) => "not_found",
            AppError::Db(_) | AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NoInputData
            | AppError::BadRequest(_)
            | AppError::Validation(_)
            | AppError::NotUnique { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Db(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Db(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Storage-level constraint violations are the last line behind the explicit
/// pre-checks; everything else is an internal error.
impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            match db.code().as_deref() {
                Some(UNIQUE_VIOLATION) => {
                    return AppError::NotUnique {
                        field: db.constraint().unwrap_or("unknown").to_string(),
                    }
                }
                Some(FOREIGN_KEY_VIOLATION) => {
                    return AppError::BadRequest(format!(
                        "referenced row does not exist ({})",
                        db.constraint().unwrap_or("foreign key")
                    ))
                }
                _ => {}
            }
        }
        AppError::Db(e)
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let (message, details) = match &self {
            AppError::Validation(fields) => (self.to_string(), serde_json::to_value(fields).ok()),
            AppError::NotUnique { field } => {
                let mut fields = FieldErrors::new();
                fields.insert(field.clone(), "already exists".into());
                (self.to_string(), serde_json::to_value(fields).ok())
            }
            AppError::Db(e) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = %e, "database error");
                ("database error".to_string(), None)
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                ("internal server error".to_string(), None)
            }
            _ => (self.to_string(), None),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };
        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"inventory\""),
            );
        }
        response
    }
}

