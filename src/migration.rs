//! Apply the resolved model to the database: one table per resource with its
//! foreign keys, then unique indexes. Resources are resolved in dependency
//! order, so referenced tables always exist before the tables pointing at them.
//! Idempotent: every statement uses IF NOT EXISTS.

use crate::config::{ResolvedEntity, ResolvedModel, UniqueMode};
use crate::error::AppError;
use crate::sql::quoted;
use sqlx::PgPool;

/// Create missing tables and indexes for every resource.
pub async fn apply_migrations(pool: &PgPool, model: &ResolvedModel) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    for sql in ddl_statements(model) {
        tracing::debug!(sql = %sql, "ddl");
        sqlx::query(&sql).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    tracing::info!(resources = model.entities.len(), "schema up to date");
    Ok(())
}

/// DDL for the whole model in execution order.
pub fn ddl_statements(model: &ResolvedModel) -> Vec<String> {
    let mut out = Vec::new();
    for entity in &model.entities {
        out.push(create_table(entity));
        out.extend(unique_indexes(entity));
    }
    out
}

fn create_table(entity: &ResolvedEntity) -> String {
    let mut col_defs = Vec::with_capacity(entity.fields.len());
    for f in &entity.fields {
        if f.primary_key {
            col_defs.push(format!("{} SERIAL PRIMARY KEY", quoted(&f.column)));
            continue;
        }
        let mut def = format!("{} {}", quoted(&f.column), f.pg_type());
        if !f.nullable() {
            def.push_str(" NOT NULL");
        }
        if let Some(d) = &f.default {
            def.push_str(" DEFAULT ");
            def.push_str(d);
        }
        if let Some(r) = &f.reference {
            def.push_str(&format!(
                " REFERENCES {} ({}) ON UPDATE CASCADE ON DELETE {}",
                quoted(&r.table_name),
                quoted(&r.pk_column),
                r.on_delete.as_sql()
            ));
        }
        col_defs.push(def);
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quoted(&entity.table_name),
        col_defs.join(",\n  ")
    )
}

fn unique_indexes(entity: &ResolvedEntity) -> Vec<String> {
    entity
        .fields
        .iter()
        .filter_map(|f| {
            let target = match f.unique? {
                UniqueMode::Exact => quoted(&f.column),
                UniqueMode::CaseInsensitive => format!("lower({})", quoted(&f.column)),
            };
            Some(format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
                quoted(&format!("{}_{}_unique", entity.table_name, f.key)),
                quoted(&entity.table_name),
                target
            ))
        })
        .collect()
}
