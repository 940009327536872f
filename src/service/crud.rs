//! Generic CRUD execution against PostgreSQL.
//!
//! Every mutation runs as one transaction: uniqueness pre-checks, foreign-key
//! existence checks, the write itself and the re-read of the shaped row. Any
//! error drops the transaction, which rolls it back.

use crate::auth::password::hash_password;
use crate::config::{FieldType, ResolvedEntity};
use crate::error::{AppError, FieldErrors};
use crate::sql::{
    count, delete, exists_by_id, insert, ListQuery, select_by_id, select_list, unique_check, update, FieldValues, PgBindValue,
    QueryBuf,
};
use serde_json::{Map, Value};
use sqlx::{PgConnection, PgPool};

pub struct CrudService;

impl CrudService {
    /// Rows matching the list filters, ordered by the chosen key then primary key.
    pub async fn list(pool: &PgPool, entity: &ResolvedEntity, list: &ListQuery) -> Result<Vec<Value>, AppError> {
        let q = select_list(entity, list);
        let mut conn = pool.acquire().await?;
        Self::query_many(&mut conn, &q).await
    }

    /// Fetch one row by primary key. Returns JSON object or None.
    pub async fn read(pool: &PgPool, entity: &ResolvedEntity, id: i32) -> Result<Option<Value>, AppError> {
        let q = select_by_id(entity, id);
        let mut conn = pool.acquire().await?;
        Self::query_optional(&mut conn, &q).await
    }

    pub async fn exists(pool: &PgPool, entity: &ResolvedEntity, id: i32) -> Result<bool, AppError> {
        let q = exists_by_id(&entity.table_name, &entity.pk_column, &id.into());
        let mut conn = pool.acquire().await?;
        Self::query_bool(&mut conn, &q).await
    }

    /// Number of rows in the entity table.
    pub async fn count(pool: &PgPool, entity: &ResolvedEntity) -> Result<i64, AppError> {
        let q = count(entity);
        tracing::debug!(sql = %q.sql, "query");
        let n = sqlx::query_scalar::<_, i64>(&q.sql).fetch_one(pool).await?;
        Ok(n)
    }

    /// Insert one row from a validated body. Returns the created row.
    pub async fn create(pool: &PgPool, entity: &ResolvedEntity, body: &Map<String, Value>) -> Result<Value, AppError> {
        let values = Self::field_values(entity, body).await?;
        let mut tx = pool.begin().await?;
        Self::check_unique(&mut tx, entity, &values, None).await?;
        Self::check_references(&mut tx, &values).await?;
        let id = Self::query_id(&mut tx, &insert(entity, &values))
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))?;
        let row = Self::query_optional(&mut tx, &select_by_id(entity, id))
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))?;
        tx.commit().await?;
        tracing::info!(resource = %entity.path_segment, id, "created");
        Ok(row)
    }

    /// Apply a partial update. Returns the updated row, or None when the id does not exist.
    pub async fn update(
        pool: &PgPool,
        entity: &ResolvedEntity,
        id: i32,
        body: &Map<String, Value>,
    ) -> Result<Option<Value>, AppError> {
        let values = Self::field_values(entity, body).await?;
        let mut tx = pool.begin().await?;
        let exists = Self::query_bool(&mut tx, &exists_by_id(&entity.table_name, &entity.pk_column, &id.into())).await?;
        if !exists {
            return Ok(None);
        }
        Self::check_unique(&mut tx, entity, &values, Some(id)).await?;
        Self::check_references(&mut tx, &values).await?;
        if Self::query_id(&mut tx, &update(entity, id, &values)).await?.is_none() {
            return Ok(None);
        }
        let row = Self::query_optional(&mut tx, &select_by_id(entity, id)).await?;
        tx.commit().await?;
        tracing::info!(resource = %entity.path_segment, id, fields = values.len(), "updated");
        Ok(row)
    }

    /// Delete one row by id. Returns false when it did not exist. Dependent rows
    /// follow the foreign keys' ON DELETE rules.
    pub async fn delete(pool: &PgPool, entity: &ResolvedEntity, id: i32) -> Result<bool, AppError> {
        let mut tx = pool.begin().await?;
        let deleted = Self::query_id(&mut tx, &delete(entity, id)).await?.is_some();
        tx.commit().await?;
        if deleted {
            tracing::info!(resource = %entity.path_segment, id, "deleted");
        }
        Ok(deleted)
    }

    /// Writable fields present in body, in declaration order. Passwords are hashed here.
    async fn field_values<'a>(
        entity: &'a ResolvedEntity,
        body: &Map<String, Value>,
    ) -> Result<FieldValues<'a>, AppError> {
        let mut values = FieldValues::new();
        for field in entity.writable_fields() {
            let Some(v) = body.get(&field.key) else { continue };
            let v = match (field.field_type, v) {
                (FieldType::Password, Value::String(plain)) => Value::String(Self::hash(plain.clone()).await?),
                _ => v.clone(),
            };
            values.push((field, v));
        }
        Ok(values)
    }

    /// Argon2 is CPU-bound; keep it off the async workers.
    async fn hash(plain: String) -> Result<String, AppError> {
        tokio::task::spawn_blocking(move || hash_password(&plain))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?
            .map_err(|e| AppError::Internal(format!("password hashing: {}", e)))
    }

    async fn check_unique(
        conn: &mut PgConnection,
        entity: &ResolvedEntity,
        values: &FieldValues<'_>,
        exclude_id: Option<i32>,
    ) -> Result<(), AppError> {
        for (field, value) in values {
            if field.unique.is_none() || value.is_null() {
                continue;
            }
            let taken = Self::query_bool(conn, &unique_check(entity, field, value, exclude_id)).await?;
            if taken {
                return Err(AppError::NotUnique {
                    field: field.key.clone(),
                });
            }
        }
        Ok(())
    }

    /// Every non-null foreign id must exist. Reports all offending fields at once.
    async fn check_references(conn: &mut PgConnection, values: &FieldValues<'_>) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        for (field, value) in values {
            let Some(reference) = &field.reference else { continue };
            if value.is_null() {
                continue;
            }
            let q = exists_by_id(&reference.table_name, &reference.pk_column, value);
            if !Self::query_bool(conn, &q).await? {
                errors.insert(
                    field.key.clone(),
                    format!("{} with id {} does not exist", reference.label, value),
                );
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }

    fn bind_all<'q>(
        q: &'q QueryBuf,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        query
    }

    async fn query_many(conn: &mut PgConnection, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = Self::bind_all(q).fetch_all(&mut *conn).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn query_optional(conn: &mut PgConnection, q: &QueryBuf) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = Self::bind_all(q).fetch_optional(&mut *conn).await?;
        Ok(row.map(|r| row_to_json(&r)))
    }

    async fn query_bool(conn: &mut PgConnection, q: &QueryBuf) -> Result<bool, AppError> {
        use sqlx::Row;
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = Self::bind_all(q).fetch_one(&mut *conn).await?;
        Ok(row.try_get::<bool, _>(0)?)
    }

    /// Runs a statement returning the primary key (or nothing).
    async fn query_id(conn: &mut PgConnection, q: &QueryBuf) -> Result<Option<i32>, AppError> {
        use sqlx::Row;
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = Self::bind_all(q).fetch_optional(&mut *conn).await?;
        row.map(|r| r.try_get::<i32, _>(0)).transpose().map_err(AppError::from)
    }
}

pub(crate) fn row_to_json(row: &sqlx::postgres::PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        let v = cell_to_value(row, name);
        map.insert(name.to_string(), v);
    }
    Value::Object(map)
}

fn cell_to_value(row: &sqlx::postgres::PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    Value::Null
}
