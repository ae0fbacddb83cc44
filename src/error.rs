use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Connect or query failure. Aborts the current pass only.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] sqlx::Error),

    /// A single odds_history row with a missing or unusable field.
    #[error("Malformed row ({column}): {reason}")]
    RowShape { column: &'static str, reason: String },

    #[error("Insert failed: {0}")]
    InsertFailure(#[source] sqlx::Error),

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pass aborted: {0}")]
    PassAborted(String),
}

impl AppError {
    pub fn row_shape(column: &'static str, reason: impl Into<String>) -> Self {
        AppError::RowShape { column, reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
