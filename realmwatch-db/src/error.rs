use std::time::Duration;

use thiserror::Error;
use tokio_rusqlite::rusqlite;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    #[error("cannot open character database {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("query did not finish within {0:?}")]
    Timeout(Duration),

    #[error("invalid table name {0:?}")]
    InvalidTableName(String),
}

pub type Result<T> = std::result::Result<T, DbError>;
