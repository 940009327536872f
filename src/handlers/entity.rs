//! Resource CRUD handlers: list, create, read, update, delete.

use crate::auth::AuthUser;
use crate::config::ResolvedEntity;
use crate::error::AppError;
use crate::response::{created, listed, ok};
use crate::service::{CrudService, RequestValidator};
use crate::state::AppState;
use crate::sql::{is_listable_key, ListQuery};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

fn parse_id(id_str: &str) -> Result<i32, AppError> {
    id_str
        .parse::<i32>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::BadRequest(format!("invalid id '{}'", id_str)))
}

/// Empty body, `{}` and `null` are all "no input data"; anything but an object is a bad request.
fn body_to_map(body: &Bytes) -> Result<Map<String, Value>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::NoInputData);
    }
    let value: Value =
        serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("invalid JSON body: {}", e)))?;
    match value {
        Value::Null => Err(AppError::NoInputData),
        Value::Object(m) if m.is_empty() => Err(AppError::NoInputData),
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

/// True when the body names at least one field the resource accepts.
fn has_writable_key(body: &Map<String, Value>, entity: &ResolvedEntity) -> bool {
    entity.writable_fields().any(|f| body.contains_key(&f.key))
}

/// Resolve the resource and enforce its role.
fn entity_for<'a>(state: &'a AppState, user: &AuthUser, path_segment: &str) -> Result<&'a ResolvedEntity, AppError> {
    let entity = state
        .model
        .entity_by_path(path_segment)
        .ok_or_else(|| AppError::NotFound(format!("resource '{}'", path_segment)))?;
    user.require(entity.role)?;
    Ok(entity)
}

fn not_found(entity: &ResolvedEntity, id: i32) -> AppError {
    AppError::NotFound(format!("{} with id {}", entity.label, id))
}

fn parse_count(key: &str, raw: &str) -> Result<u32, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("'{}' must be a non-negative integer", key)))
}

/// `?key=term` filters on any output key, plus `order_by` (`-key` for descending),
/// `limit` and `offset`. Filters on keys the resource does not expose are ignored.
fn list_query(entity: &ResolvedEntity, params: BTreeMap<String, String>) -> Result<ListQuery, AppError> {
    let mut list = ListQuery::default();
    for (key, value) in params {
        match key.as_str() {
            "limit" => list.limit = Some(parse_count(&key, &value)?),
            "offset" => list.offset = Some(parse_count(&key, &value)?),
            "order_by" => {
                let (name, descending) = match value.strip_prefix('-') {
                    Some(name) => (name, true),
                    None => (value.as_str(), false),
                };
                if !is_listable_key(entity, name) {
                    return Err(AppError::BadRequest(format!("cannot order by '{}'", name)));
                }
                list.order_by = Some(name.to_string());
                list.descending = descending;
            }
            _ if is_listable_key(entity, &key) => list.filters.push((key.clone(), value)),
            _ => {}
        }
    }
    Ok(list)
}

pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Path(path_segment): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &user, &path_segment)?;
    let list = list_query(entity, params)?;
    let rows = CrudService::list(&state.pool, entity, &list).await?;
    Ok(listed(rows))
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Path(path_segment): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &user, &path_segment)?;
    let body = body_to_map(&body)?;
    RequestValidator::validate(&body, entity)?;
    let row = CrudService::create(&state.pool, entity, &body).await?;
    Ok(created(row))
}

pub async fn read(
    State(state): State<AppState>,
    user: AuthUser,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &user, &path_segment)?;
    let id = parse_id(&id_str)?;
    let row = CrudService::read(&state.pool, entity, id)
        .await?
        .ok_or_else(|| not_found(entity, id))?;
    Ok(ok(row))
}

/// Partial update: only the fields present in the body change. The empty-body
/// check runs before the existence and validation checks.
pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path((path_segment, id_str)): Path<(String, String)>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &user, &path_segment)?;
    let id = parse_id(&id_str)?;
    let body = body_to_map(&body)?;
    if !has_writable_key(&body, entity) {
        return Err(AppError::NoInputData);
    }
    if !CrudService::exists(&state.pool, entity, id).await? {
        return Err(not_found(entity, id));
    }
    RequestValidator::validate_partial(&body, entity)?;
    let row = CrudService::update(&state.pool, entity, id, &body)
        .await?
        .ok_or_else(|| not_found(entity, id))?;
    Ok(ok(row))
}

pub async fn delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &user, &path_segment)?;
    let id = parse_id(&id_str)?;
    if !CrudService::delete(&state.pool, entity, id).await? {
        return Err(not_found(entity, id));
    }
    Ok(StatusCode::NO_CONTENT)
}
