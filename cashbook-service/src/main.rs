//! Cashbook store bootstrap: applies migrations and verifies connectivity.

use cashbook_core::observability::init_tracing;
use cashbook_service::config::CashbookConfig;
use cashbook_service::services::{init_metrics, Database};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load configuration
    let config = CashbookConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    // Initialize tracing
    init_tracing(&config.service_name, &config.log_level, config.log_json);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting cashbook-service"
    );

    // Initialize metrics
    init_metrics();

    tracing::info!(
        service_name = %config.service_name,
        db_max_connections = %config.database.max_connections,
        db_min_connections = %config.database.min_connections,
        "Configuration loaded"
    );

    let db = Database::new(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to connect to database");
        std::io::Error::other(format!("Database error: {}", e))
    })?;

    db.run_migrations().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to run migrations");
        std::io::Error::other(format!("Migration error: {}", e))
    })?;

    db.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Health check failed");
        std::io::Error::other(format!("Health check error: {}", e))
    })?;

    tracing::info!("Store ready");

    Ok(())
}
