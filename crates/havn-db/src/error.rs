//! Error types for the data layer.

use havn_occupancy::StoreError;

/// Errors raised while setting up the `PostgreSQL` connection.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Classify a `sqlx` error for the ledger.
///
/// Unique violations become [`StoreError::Conflict`], decode problems become
/// [`StoreError::Corrupt`], everything else is treated as transient.
pub fn store_error(err: &sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_owned())
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => StoreError::Corrupt(err.to_string()),
        _ => StoreError::Unavailable(err.to_string()),
    }
}

/// Shorthand for mapping `sqlx` results into store results.
pub(crate) trait SqlxResultExt<T> {
    /// Map the error side through [`store_error`].
    fn into_store(self) -> Result<T, StoreError>;
}

impl<T> SqlxResultExt<T> for Result<T, sqlx::Error> {
    fn into_store(self) -> Result<T, StoreError> {
        self.map_err(|err| store_error(&err))
    }
}
