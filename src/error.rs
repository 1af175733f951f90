//! Error types for the archive store

use std::path::PathBuf;

use sqlx::error::ErrorKind;
use thiserror::Error;

/// SQLite primary result code for `SQLITE_BUSY`; extended codes share the low byte.
const SQLITE_BUSY: i32 = 5;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The schema script could not be found. The store cannot be used until
    /// the configuration points at a real file.
    #[error("schema file not found: {}", path.display())]
    SchemaMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A constraint (foreign key, NOT NULL, ...) rejected the write
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// The lock wait timed out behind another writer
    #[error("database is busy: {0}")]
    Busy(String),

    #[error("invalid {field}: {message}")]
    InvalidArgument {
        field: &'static str,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[source] sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            message: message.into(),
        }
    }

    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if matches!(
                db_err.kind(),
                ErrorKind::ForeignKeyViolation
                    | ErrorKind::UniqueViolation
                    | ErrorKind::NotNullViolation
                    | ErrorKind::CheckViolation
            ) {
                return Self::Constraint(db_err.message().to_string());
            }
            let busy = db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .is_some_and(|code| code & 0xff == SQLITE_BUSY);
            if busy {
                return Self::Busy(db_err.message().to_string());
            }
        }
        Self::Sqlite(err)
    }
}
