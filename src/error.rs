//! Run-level errors and their process exit codes.

use events_generator::GeneratorError;
use events_populate_postgresql::{PostgreSQLPopulatorError, QueryError};
use ingest_buffer::BufferError;
use thiserror::Error;

/// Invalid input detected before any work starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("DATABASE_URL is not set (pass --database-url or export DATABASE_URL)")]
    MissingDatabaseUrl,

    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(#[source] PostgreSQLPopulatorError),

    #[error("--max-connections must be at least 1")]
    NoConnections,

    #[error("Invalid time window")]
    InvalidWindow(#[from] GeneratorError),

    #[error("--samples must be at least 1")]
    NoSamples,

    #[error("Invalid buffer settings")]
    InvalidBuffer(#[source] BufferError),
}

/// The run was cancelled by ctrl-c.
#[derive(Error, Debug)]
pub enum Interrupted {
    /// Items accepted before the interrupt were still flushed.
    #[error("Interrupted after {written} items were written")]
    Ingest { written: u64 },

    #[error("Benchmark interrupted")]
    Query,
}

pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_QUERY: i32 = 3;
pub const EXIT_INTERRUPTED: i32 = 130;

/// Process exit code for an error returned by a command.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if cause.is::<ConfigError>() {
            return EXIT_CONFIG;
        }
        if cause.is::<Interrupted>() {
            return EXIT_INTERRUPTED;
        }
        if cause.is::<QueryError>() {
            return EXIT_QUERY;
        }
        if let Some(BufferError::InvalidOptions(_)) = cause.downcast_ref::<BufferError>() {
            return EXIT_CONFIG;
        }
    }
    EXIT_FAILURE
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use std::time::Duration;

    #[test]
    fn test_exit_codes() {
        let config = anyhow::Error::new(ConfigError::MissingDatabaseUrl);
        assert_eq!(exit_code(&config), EXIT_CONFIG);

        let query = anyhow::Error::new(QueryError::EmptyTable {
            table: "logs".to_string(),
        });
        assert_eq!(exit_code(&query), EXIT_QUERY);

        let interrupted = anyhow::Error::new(Interrupted::Ingest { written: 3 });
        assert_eq!(exit_code(&interrupted), EXIT_INTERRUPTED);

        let backpressure = anyhow::Error::new(BufferError::Backpressure {
            buffer: "simple_writer".to_string(),
            timeout: Duration::from_secs(30),
        });
        assert_eq!(exit_code(&backpressure), EXIT_FAILURE);
    }

    #[test]
    fn test_exit_code_looks_through_context() {
        let err: anyhow::Result<()> = Err(ConfigError::NoSamples.into());
        let err = err.context("query failed").unwrap_err();
        assert_eq!(exit_code(&err), EXIT_CONFIG);

        let err: anyhow::Result<()> =
            Err(BufferError::InvalidOptions("max_capacity must be at least 1".into()).into());
        assert_eq!(exit_code(&err.unwrap_err()), EXIT_CONFIG);
    }

    #[test]
    fn test_unknown_errors_are_failures() {
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), EXIT_FAILURE);
    }
}
