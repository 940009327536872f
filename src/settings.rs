//! Process settings from environment variables (a `.env` file is honoured by `main`).

use crate::error::ConfigError;
use std::path::PathBuf;
use std::str::FromStr;

/// Server settings loaded from environment variables.
///
/// | Env Var              | Default                           |
/// |----------------------|-----------------------------------|
/// | `DATABASE_URL`       | `postgres://localhost/inventory`  |
/// | `HOST`               | `0.0.0.0`                         |
/// | `PORT`               | `3000`                            |
/// | `DEBUG`              | `false`                           |
/// | `DB_MAX_CONNECTIONS` | `5`                               |
/// | `BODY_LIMIT_BYTES`   | `1048576`                         |
/// | `CATALOG_PATH`       | unset (built-in catalog)          |
/// | `ADMIN_LOGIN`        | `admin`                           |
/// | `ADMIN_PASSWORD`     | `admin`                           |
#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub max_connections: u32,
    pub body_limit_bytes: usize,
    pub catalog_path: Option<PathBuf>,
    pub admin_login: String,
    pub admin_password: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        Ok(Settings {
            database_url: string("DATABASE_URL", "postgres://localhost/inventory"),
            host: string("HOST", "0.0.0.0"),
            port: parsed(&lookup, "PORT", 3000)?,
            debug: flag(&lookup, "DEBUG")?,
            max_connections: parsed(&lookup, "DB_MAX_CONNECTIONS", 5)?,
            body_limit_bytes: parsed(&lookup, "BODY_LIMIT_BYTES", 1024 * 1024)?,
            catalog_path: lookup("CATALOG_PATH").filter(|s| !s.is_empty()).map(PathBuf::from),
            admin_login: string("ADMIN_LOGIN", "admin"),
            admin_password: string("ADMIN_PASSWORD", "admin"),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Default tracing directive for this crate.
    pub fn log_directive(&self) -> &'static str {
        if self.debug {
            "inventory_api=debug"
        } else {
            "inventory_api=info"
        }
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Load(format!("{} must be a valid number, got '{}'", key, raw))),
        None => Ok(default),
    }
}

fn flag<F>(lookup: &F, key: &str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "" | "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Load(format!("{} must be a boolean, got '{}'", key, v))),
        },
    }
}
