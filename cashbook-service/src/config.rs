//! Configuration for cashbook-service.

use cashbook_core::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CashbookConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON logs (for deployments that ship logs to a collector).
    #[serde(default)]
    pub log_json: bool,
    #[serde(default)]
    pub database: DatabaseConfig,
}

fn default_service_name() -> String {
    "cashbook-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database_url() -> String {
    "sqlite://cashbook.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

impl CashbookConfig {
    /// Load from the optional `configuration` file plus `APP`-prefixed
    /// environment variables (e.g. `APP__DATABASE__URL`).
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
