//! Database bootstrap helpers.

use crate::error::{AppError, ConfigError};
use crate::sql::quoted;
use sqlx::ConnectOptions;
use std::str::FromStr;

/// Create the database named in `database_url` if it does not exist, connecting
/// through the `postgres` maintenance database.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| ConfigError::Load(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        sqlx::query(&format!("CREATE DATABASE {}", quoted(&db_name)))
            .execute(&mut conn)
            .await?;
        tracing::info!(database = %db_name, "database created");
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), ConfigError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| ConfigError::Load("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let mut split = path_and_query.splitn(2, '?');
    let db_name = split.next().unwrap_or("").trim();
    let query = split.next().map(|q| format!("?{}", q)).unwrap_or_default();
    let base = url.get(..path_start).unwrap_or(url);
    let admin_url = format!("{}postgres{}", base, query);
    Ok((admin_url, db_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_database_name_and_keeps_query() {
        let (admin, name) = parse_db_name_from_url("postgres://u:p@db:5432/inventory?sslmode=disable").unwrap();
        assert_eq!(name, "inventory");
        assert_eq!(admin, "postgres://u:p@db:5432/postgres?sslmode=disable");
    }

    #[test]
    fn url_without_path_is_a_config_error() {
        assert!(matches!(parse_db_name_from_url("inventory"), Err(ConfigError::Load(_))));
    }

    #[tokio::test]
    async fn malformed_url_is_reported_as_config_error() {
        let err = ensure_database_exists("not a url/inventory").await.unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::Load(_))), "{:?}", err);
    }
}
