//! Error types for the PostgreSQL writer.

use thiserror::Error;

/// Errors that can occur while writing to or reading from PostgreSQL.
#[derive(Error, Debug)]
pub enum PostgreSQLPopulatorError {
    /// PostgreSQL connection or query error.
    #[error("PostgreSQL error: {0}")]
    PostgreSQL(#[from] tokio_postgres::Error),

    /// A returned row did not have the expected shape.
    #[error("Schema error: {0}")]
    Schema(String),

    /// An item cannot be encoded for its table.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),
}
