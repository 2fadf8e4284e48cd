//! Failures of the redb-backed stores.

use thiserror::Error;

pub use cblocks_core::Error as CoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The database file or its directory could not be created or opened.
    #[error("Cannot access database file: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row is not valid JSON for its record type.
    #[error("Malformed stored record: {0}")]
    Record(#[from] serde_json::Error),

    /// redb rejected a transaction, table or commit.
    #[error("Database failure: {0}")]
    Database(String),

    #[error("{0} does not exist")]
    NotFound(String),

    /// A write was refused before touching the database.
    #[error("Rejected: {0}")]
    InvalidInput(String),
}

impl From<Error> for CoreError {
    fn from(e: Error) -> Self {
        match e {
            Error::Record(e) => CoreError::Serialization(e.to_string()),
            Error::NotFound(what) => CoreError::NotFound(what),
            Error::InvalidInput(reason) => CoreError::Validation(reason),
            other => CoreError::Store(other.to_string()),
        }
    }
}

/// Every redb error type maps onto [`Error::Database`].
macro_rules! database_errors {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for Error {
                fn from(e: $ty) -> Self {
                    Error::Database(e.to_string())
                }
            }
        )+
    };
}

database_errors!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);
