//! Shared state handed to every command.

use crate::error::ConfigError;
use crate::ingest::mask_connection_password;
use anyhow::Context;
use events_populate_postgresql::{
    parse_config, PgPool, PostgreSQLArgs, PostgreSQLEventStore, PostgreSQLFlusher, Workload,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Connection pool and cancellation token for one invocation.
#[derive(Clone)]
pub struct RunContext {
    pub pool: Arc<PgPool>,
    pub cancel: CancellationToken,
}

impl RunContext {
    /// Validate the connection settings and open the pool.
    pub async fn connect(args: &PostgreSQLArgs, cancel: CancellationToken) -> anyhow::Result<Self> {
        let url = database_url(args)?;
        info!(
            "Connecting to PostgreSQL at {} ({} connections)",
            mask_connection_password(&url),
            args.max_connections
        );

        let pool = PgPool::connect(&url, args.max_connections)
            .await
            .context("Failed to connect to PostgreSQL")?;
        Ok(Self {
            pool: Arc::new(pool),
            cancel,
        })
    }

    pub fn flusher(&self, workload: Workload) -> PostgreSQLFlusher {
        PostgreSQLFlusher::new(self.pool.clone(), workload)
    }

    pub fn event_store(&self, workload: Workload) -> PostgreSQLEventStore {
        PostgreSQLEventStore::new(self.pool.clone(), workload)
    }
}

/// The connection string, checked for presence and syntax.
pub fn database_url(args: &PostgreSQLArgs) -> Result<String, ConfigError> {
    if args.max_connections == 0 {
        return Err(ConfigError::NoConnections);
    }
    let url = args
        .database_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or(ConfigError::MissingDatabaseUrl)?;
    parse_config(url).map_err(ConfigError::InvalidDatabaseUrl)?;
    Ok(url.to_string())
}
