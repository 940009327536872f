//! Inventory server: resolves the resource catalog, creates the database and
//! tables if missing, bootstraps the first admin and serves the API.

use inventory_api::{
    app_router, apply_migrations, builtin, ensure_admin, ensure_database_exists, load_from_file, resolve, AppState,
    Settings,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(settings.log_directive())),
        )
        .init();

    let config = match &settings.catalog_path {
        Some(path) => load_from_file(path).await?,
        None => builtin()?,
    };
    let model = resolve(&config)?;
    tracing::info!(resources = model.entities.len(), "catalog resolved");

    ensure_database_exists(&settings.database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await?;

    apply_migrations(&pool, &model).await?;
    ensure_admin(&pool, &model, &settings.admin_login, &settings.admin_password).await?;

    let state = AppState {
        pool,
        model: Arc::new(model),
    };
    let app = app_router(state, settings.body_limit_bytes);

    let listener = TcpListener::bind(settings.bind_addr()).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
