//! Bulk INSERT logic for the event tables.

use crate::columnar::EventColumns;
use crate::error::PostgreSQLPopulatorError;
use crate::workload::Workload;
use events_generator::{EventItem, EventType};
use tokio_postgres::{Client, Row};

/// A row as stored, with its server-assigned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEvent {
    pub id: i64,
    pub item: EventItem,
}

impl PersistedEvent {
    /// Decode a row selected with [`select_columns`].
    pub fn from_row(row: &Row) -> Result<Self, PostgreSQLPopulatorError> {
        let event_type: Option<String> = row.try_get("event_type")?;
        let event_type = event_type
            .map(|label| label.parse::<EventType>())
            .transpose()
            .map_err(|e| PostgreSQLPopulatorError::Schema(e.to_string()))?;

        Ok(Self {
            id: row.try_get("id")?,
            item: EventItem {
                created_at: row.try_get("created_at")?,
                tenant_id: row.try_get("tenant_id")?,
                resource_id: row.try_get("resource_id")?,
                payload: row.try_get("payload")?,
                event_type,
            },
        })
    }
}

/// Column list shared by inserts and reads, normalised so every table
/// decodes through [`PersistedEvent::from_row`].
pub fn select_columns(workload: Workload) -> String {
    let payload = match workload {
        Workload::Logs => "convert_to(log, 'UTF8')".to_string(),
        _ => workload.payload_column().to_string(),
    };
    let event_type = if workload.has_event_type() {
        "event_type::text"
    } else {
        "NULL::text"
    };
    format!("id, created_at, tenant_id, resource_id, {payload} AS payload, {event_type} AS event_type")
}

/// One statement inserting a whole batch from array parameters.
///
/// Rows are inserted in parameter order, so ids follow batch order.
pub fn bulk_insert_sql(workload: Workload) -> String {
    let table = workload.table();
    let (columns, source, select) = match workload {
        Workload::Simple => (
            "created_at, tenant_id, resource_id, data",
            "$1::timestamptz[], $2::uuid[], $3::uuid[], $4::bytea[]",
            "created_at, tenant_id, resource_id, data",
        ),
        Workload::Metrics => (
            "created_at, tenant_id, resource_id, event_type, data",
            "$1::timestamptz[], $2::uuid[], $3::uuid[], $4::text[], $5::bytea[]",
            "created_at, tenant_id, resource_id, event_type::metric_event_type, data",
        ),
        Workload::Logs => (
            "created_at, tenant_id, resource_id, log",
            "$1::timestamptz[], $2::uuid[], $3::uuid[], $4::text[]",
            "created_at, tenant_id, resource_id, log",
        ),
    };

    format!(
        "INSERT INTO {table} ({columns})\n\
         SELECT {select}\n\
         FROM unnest({source}) WITH ORDINALITY AS batch({columns}, ord)\n\
         ORDER BY ord\n\
         RETURNING {}",
        select_columns(workload)
    )
}

/// Insert a batch in one round trip and return the stored rows in batch
/// order.
pub async fn insert_batch(
    client: &Client,
    workload: Workload,
    columns: &EventColumns,
) -> Result<Vec<PersistedEvent>, PostgreSQLPopulatorError> {
    if columns.is_empty() {
        return Ok(Vec::new());
    }

    let sql = bulk_insert_sql(workload);
    let rows = match workload {
        Workload::Simple => {
            client
                .query(
                    &sql,
                    &[
                        &columns.created_ats,
                        &columns.tenant_ids,
                        &columns.resource_ids,
                        &columns.payloads,
                    ],
                )
                .await?
        }
        Workload::Metrics => {
            let labels = columns.event_type_labels()?;
            client
                .query(
                    &sql,
                    &[
                        &columns.created_ats,
                        &columns.tenant_ids,
                        &columns.resource_ids,
                        &labels,
                        &columns.payloads,
                    ],
                )
                .await?
        }
        Workload::Logs => {
            let lines = columns.payload_texts()?;
            client
                .query(
                    &sql,
                    &[
                        &columns.created_ats,
                        &columns.tenant_ids,
                        &columns.resource_ids,
                        &lines,
                    ],
                )
                .await?
        }
    };

    // RETURNING does not promise insertion order; ids do.
    let mut events = rows
        .iter()
        .map(PersistedEvent::from_row)
        .collect::<Result<Vec<_>, _>>()?;
    events.sort_by_key(|event| event.id);
    Ok(events)
}
