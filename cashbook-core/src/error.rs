use thiserror::Error;

/// Error taxonomy shared across the cashbook crates.
///
/// Validation and date errors are raised before any storage work starts;
/// storage and recalculation errors roll back the transaction that raised
/// them.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(anyhow::Error),

    #[error("Invalid date format: {0}")]
    DateFormatError(anyhow::Error),

    #[error("Not found: {0}")]
    NotFoundError(anyhow::Error),

    #[error("Already paid: {0}")]
    AlreadyPaidError(anyhow::Error),

    #[error("Storage error: {0}")]
    StorageError(anyhow::Error),

    #[error("Recalculation failed at month {month}: {source}")]
    RecalculationError {
        month: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::StorageError(anyhow::Error::new(err))
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::StorageError(anyhow::Error::new(err))
    }
}

impl AppError {
    /// Label used for the error counter metric.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "validation_error",
            AppError::DateFormatError(_) => "date_format_error",
            AppError::NotFoundError(_) => "not_found",
            AppError::AlreadyPaidError(_) => "already_paid",
            AppError::StorageError(_) => "storage_error",
            AppError::RecalculationError { .. } => "recalculation_error",
            AppError::ConfigError(_) => "config_error",
        }
    }
}
