//! PostgreSQL backend for the events tables.
//!
//! Holds everything that talks to PostgreSQL: the connection pool, the
//! table DDL, the bulk-insert [`PostgreSQLFlusher`] used by the ingest
//! buffer, and the [`QueryBenchmark`] over [`PostgreSQLEventStore`].

pub mod args;
pub mod benchmark;
pub mod columnar;
pub mod ddl;
pub mod error;
pub mod flusher;
pub mod insert;
pub mod pool;
pub mod store;
pub mod workload;

pub use args::{PostgreSQLArgs, QueryArgs, SetupArgs};
pub use benchmark::{BenchmarkReport, QueryBenchmark, QueryError, ResolvedSamples};
pub use columnar::EventColumns;
pub use error::PostgreSQLPopulatorError;
pub use flusher::PostgreSQLFlusher;
pub use insert::PersistedEvent;
pub use pool::{parse_config, PgPool, PooledClient};
pub use store::{BenchmarkSample, EventLookup, PostgreSQLEventStore};
pub use workload::Workload;

use tracing::info;

/// Create (or with `reset`, drop and recreate) the tables for `workloads`.
pub async fn setup_tables(
    pool: &PgPool,
    workloads: &[Workload],
    reset: bool,
) -> Result<(), PostgreSQLPopulatorError> {
    let client = pool.get().await?;
    for workload in workloads {
        if reset {
            client.execute(&ddl::drop_table(*workload), &[]).await?;
        }
        for statement in ddl::create_statements(*workload) {
            client.batch_execute(&statement).await?;
        }
        info!("Table '{}' is ready", workload.table());
    }
    Ok(())
}
