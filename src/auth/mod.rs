//! Authentication and authorization primitives.
//!
//! - [`password`] -- Argon2id password hashing and verification.
//! - credential lookup against the user resource and the two-role check.

pub mod password;

use crate::config::{ResolvedEntity, ResolvedField, ResolvedModel, Role, USER_RESOURCE};
use crate::error::{AppError, ConfigError};
use crate::service::CrudService;
use crate::sql::{select_credentials, PgBindValue};
use serde_json::{json, Map};
use sqlx::{PgPool, Row};

/// Caller identity established by HTTP Basic auth.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i32,
    pub login: String,
    pub role: Role,
}

impl AuthUser {
    /// Reject callers below `required`. Admins pass user-level checks.
    pub fn require(&self, required: Role) -> Result<(), AppError> {
        if self.role >= required {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("{:?} role required", required).to_lowercase()))
        }
    }
}

struct UserFields<'a> {
    entity: &'a ResolvedEntity,
    id: &'a ResolvedField,
    login: &'a ResolvedField,
    password: &'a ResolvedField,
    is_admin: &'a ResolvedField,
}

fn user_fields(model: &ResolvedModel) -> Result<UserFields<'_>, ConfigError> {
    let entity = model.users().ok_or_else(|| ConfigError::MissingReference {
        kind: "resource",
        id: USER_RESOURCE.into(),
    })?;
    let get = |key: &str| {
        entity.field(key).ok_or_else(|| ConfigError::MissingReference {
            kind: "field",
            id: format!("{}.{}", USER_RESOURCE, key),
        })
    };
    let id = entity
        .fields
        .iter()
        .find(|f| f.primary_key)
        .ok_or_else(|| ConfigError::InvalidPrimaryKey(USER_RESOURCE.into()))?;
    Ok(UserFields {
        entity,
        id,
        login: get("login")?,
        password: get("password")?,
        is_admin: get("is_admin")?,
    })
}

/// Verify a login/password pair. Login matching is case-insensitive. Unknown
/// logins and wrong passwords are indistinguishable to the caller.
pub async fn authenticate(pool: &PgPool, model: &ResolvedModel, login: &str, password: &str) -> Result<AuthUser, AppError> {
    let uf = user_fields(model)?;
    let q = select_credentials(uf.entity, uf.login, &[uf.id, uf.login, uf.password, uf.is_admin], login);
    tracing::debug!(sql = %q.sql, "credential lookup");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    let Some(row) = query.fetch_optional(pool).await? else {
        tracing::warn!(login = %login, "unknown login");
        return Err(AppError::Unauthorized("invalid credentials".into()));
    };
    let id: i32 = row.try_get(uf.id.key.as_str())?;
    let stored_login: String = row.try_get(uf.login.key.as_str())?;
    let hash: String = row.try_get(uf.password.key.as_str())?;
    let is_admin: Option<bool> = row.try_get(uf.is_admin.key.as_str())?;

    let candidate = password.to_string();
    let matches = tokio::task::spawn_blocking(move || password::verify_password(&candidate, &hash))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(|e| AppError::Internal(format!("stored password hash: {}", e)))?;
    if !matches {
        tracing::warn!(login = %login, "wrong password");
        return Err(AppError::Unauthorized("invalid credentials".into()));
    }
    Ok(AuthUser {
        id,
        login: stored_login,
        role: if is_admin.unwrap_or(false) { Role::Admin } else { Role::User },
    })
}

/// Create the initial admin when the user table is empty, so the API is reachable after first start.
pub async fn ensure_admin(pool: &PgPool, model: &ResolvedModel, login: &str, password: &str) -> Result<(), AppError> {
    let uf = user_fields(model)?;
    if CrudService::count(pool, uf.entity).await? > 0 {
        return Ok(());
    }
    let mut body = Map::new();
    body.insert(uf.login.key.clone(), json!(login));
    body.insert(uf.password.key.clone(), json!(password));
    body.insert(uf.is_admin.key.clone(), json!(true));
    CrudService::create(pool, uf.entity, &body).await?;
    tracing::info!(login = %login, "bootstrap admin created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            id: 1,
            login: "someone".into(),
            role,
        }
    }

    #[test]
    fn admin_passes_every_check() {
        assert!(user(Role::Admin).require(Role::Admin).is_ok());
        assert!(user(Role::Admin).require(Role::User).is_ok());
    }

    #[test]
    fn plain_user_is_forbidden_from_admin_resources() {
        assert!(user(Role::User).require(Role::User).is_ok());
        let err = user(Role::User).require(Role::Admin).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(ref m) if m == "admin role required"));
    }

    #[test]
    fn builtin_user_resource_exposes_auth_fields() {
        let model = crate::config::resolve(&crate::config::builtin().unwrap()).unwrap();
        let uf = user_fields(&model).unwrap();
        assert_eq!(uf.id.column, "Id");
        assert_eq!(uf.login.column, "Login");
        assert!(uf.password.is_write_only());
        assert_eq!(uf.entity.role, Role::Admin);
    }
}
