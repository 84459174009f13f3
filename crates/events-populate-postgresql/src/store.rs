//! Read access used by the query benchmark.

use crate::error::PostgreSQLPopulatorError;
use crate::insert::{select_columns, PersistedEvent};
use crate::pool::PgPool;
use crate::workload::Workload;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// The `(tenant, resource)` pair a benchmark sample looks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BenchmarkSample {
    pub tenant_id: Uuid,
    pub resource_id: Uuid,
}

impl From<&PersistedEvent> for BenchmarkSample {
    fn from(event: &PersistedEvent) -> Self {
        Self {
            tenant_id: event.item.tenant_id,
            resource_id: event.item.resource_id,
        }
    }
}

/// Lookups the benchmark needs from a table.
#[async_trait]
pub trait EventLookup: Send + Sync {
    /// Smallest and largest id, or `None` when the table is empty.
    async fn id_bounds(&self) -> Result<Option<(i64, i64)>, PostgreSQLPopulatorError>;

    /// The row with `id`, if it exists.
    async fn get_by_id(&self, id: i64) -> Result<Option<PersistedEvent>, PostgreSQLPopulatorError>;

    /// Every row for the sample's `(tenant, resource)`.
    async fn list_by_resource(
        &self,
        sample: &BenchmarkSample,
    ) -> Result<Vec<PersistedEvent>, PostgreSQLPopulatorError>;
}

/// [`EventLookup`] over one event table.
pub struct PostgreSQLEventStore {
    pool: Arc<PgPool>,
    workload: Workload,
}

impl PostgreSQLEventStore {
    pub fn new(pool: Arc<PgPool>, workload: Workload) -> Self {
        Self { pool, workload }
    }

    pub fn table(&self) -> &'static str {
        self.workload.table()
    }
}

#[async_trait]
impl EventLookup for PostgreSQLEventStore {
    async fn id_bounds(&self) -> Result<Option<(i64, i64)>, PostgreSQLPopulatorError> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                &format!("SELECT MIN(id), MAX(id) FROM {}", self.table()),
                &[],
            )
            .await?;
        let min: Option<i64> = row.try_get(0)?;
        let max: Option<i64> = row.try_get(1)?;
        Ok(min.zip(max))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<PersistedEvent>, PostgreSQLPopulatorError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {} FROM {} WHERE id = $1",
                    select_columns(self.workload),
                    self.table()
                ),
                &[&id],
            )
            .await?;
        row.as_ref().map(PersistedEvent::from_row).transpose()
    }

    async fn list_by_resource(
        &self,
        sample: &BenchmarkSample,
    ) -> Result<Vec<PersistedEvent>, PostgreSQLPopulatorError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM {} WHERE tenant_id = $1 AND resource_id = $2 ORDER BY id",
                    select_columns(self.workload),
                    self.table()
                ),
                &[&sample.tenant_id, &sample.resource_id],
            )
            .await?;
        rows.iter().map(PersistedEvent::from_row).collect()
    }
}
