//! Error types for the import pipeline

use thiserror::Error;

/// Storage-layer failure. The duplicate-key case is split out because the
/// upsert engine resolves it by reloading the winning row.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate key")]
    DuplicateKey,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        // Postgres unique_violation
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.code().as_deref() == Some("23505") {
                return StoreError::DuplicateKey;
            }
        }
        StoreError::Database(err)
    }
}

/// Errors surfaced by import operations
#[derive(Debug, Error)]
pub enum ImportError {
    /// The staged file is gone. Callers treat the session as already done.
    #[error("import source not found: {0}")]
    SourceMissing(String),
    #[error("failed to read import source: {0}")]
    Source(String),
    #[error("column {0} has an empty name")]
    EmptyColumnName(usize),
    #[error("column names not allowed: {0}")]
    ReservedColumns(String),
    #[error("no email column found in the import source")]
    MissingEmailColumn,
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl ImportError {
    /// Machine-readable code sent back over NATS
    pub fn error_code(&self) -> &'static str {
        match self {
            ImportError::SourceMissing(_) => "SOURCE_MISSING",
            ImportError::Source(_) => "SOURCE_ERROR",
            ImportError::EmptyColumnName(_)
            | ImportError::ReservedColumns(_)
            | ImportError::MissingEmailColumn => "INVALID_HEADER",
            ImportError::Store(_) => "IMPORT_FAILED",
        }
    }
}
