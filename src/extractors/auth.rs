//! Extract the authenticated caller from the `Authorization: Basic ...` header.

use crate::auth::{authenticate, AuthUser};
use crate::error::AppError;
use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use axum_extra::headers::{authorization::Basic, Authorization, HeaderMapExt};

/// Login and password from the Basic auth header.
pub fn basic_credentials(headers: &HeaderMap) -> Result<(String, String), AppError> {
    let Authorization(basic) = headers
        .typed_get::<Authorization<Basic>>()
        .ok_or_else(|| AppError::Unauthorized("basic credentials required".into()))?;
    Ok((basic.username().to_string(), basic.password().to_string()))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let (login, password) = basic_credentials(&parts.headers)?;
        authenticate(&state.pool, &state.model, &login, &password).await
    }
}
