//! Buffer backend writing batches to PostgreSQL.

use crate::columnar::EventColumns;
use crate::insert::{insert_batch, PersistedEvent};
use crate::pool::PgPool;
use crate::workload::Workload;
use async_trait::async_trait;
use events_generator::EventItem;
use ingest_buffer::{FlushFailure, Flusher};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Writes each batch with one bulk INSERT on a pooled connection.
pub struct PostgreSQLFlusher {
    pool: Arc<PgPool>,
    workload: Workload,
}

impl PostgreSQLFlusher {
    pub fn new(pool: Arc<PgPool>, workload: Workload) -> Self {
        Self { pool, workload }
    }

    pub fn workload(&self) -> Workload {
        self.workload
    }
}

#[async_trait]
impl Flusher<EventItem> for PostgreSQLFlusher {
    type Output = PersistedEvent;

    async fn flush(&self, items: &[EventItem]) -> Result<Vec<PersistedEvent>, FlushFailure> {
        let started = Instant::now();
        let columns = EventColumns::from_items(items);
        let client = self.pool.get().await?;
        let events = insert_batch(&client, self.workload, &columns).await?;

        debug!(
            "Inserted {} rows into '{}' in {:?}",
            events.len(),
            self.workload.table(),
            started.elapsed()
        );
        Ok(events)
    }
}
