//! Inventory API: REST backend for an institution's real-estate inventory,
//! driven by a declarative resource catalog over PostgreSQL.

pub mod auth;
pub mod case;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod migration;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;

pub use auth::{authenticate, ensure_admin, AuthUser};
pub use config::{builtin, load_from_file, resolve, FullConfig, ResolvedEntity, ResolvedModel};
pub use error::{AppError, ConfigError};
pub use migration::apply_migrations;
pub use routes::{app_router, operational_routes, entity_routes};
pub use service::CrudService;
pub use settings::Settings;
pub use state::AppState;
pub use store::ensure_database_exists;
