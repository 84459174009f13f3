//! Helpers for tests that need a live PostgreSQL server.

use events_populate_postgresql::{PgPool, PostgreSQLPopulatorError, Workload};

/// Connection string for integration tests, from `DATABASE_URL`.
///
/// Tests skip themselves when it is unset.
pub fn test_database_url() -> Option<String> {
    std::env::var("DATABASE_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
}

/// Empty the event tables so counts start at zero.
pub async fn truncate_tables(
    pool: &PgPool,
    workloads: &[Workload],
) -> Result<(), PostgreSQLPopulatorError> {
    let client = pool.get().await?;
    for workload in workloads {
        client
            .batch_execute(&format!(
                "TRUNCATE TABLE {} RESTART IDENTITY",
                workload.table()
            ))
            .await?;
    }
    Ok(())
}
