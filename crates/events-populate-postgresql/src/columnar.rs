//! Row-to-column conversion for array-parameter bulk inserts.

use crate::error::PostgreSQLPopulatorError;
use chrono::{DateTime, Utc};
use events_generator::{EventItem, EventType};
use uuid::Uuid;

/// A batch of items laid out as one vector per column.
///
/// Index `i` of every vector belongs to input item `i`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventColumns {
    pub created_ats: Vec<DateTime<Utc>>,
    pub tenant_ids: Vec<Uuid>,
    pub resource_ids: Vec<Uuid>,
    pub payloads: Vec<Vec<u8>>,
    pub event_types: Vec<Option<EventType>>,
}

impl EventColumns {
    pub fn from_items(items: &[EventItem]) -> Self {
        let mut columns = Self {
            created_ats: Vec::with_capacity(items.len()),
            tenant_ids: Vec::with_capacity(items.len()),
            resource_ids: Vec::with_capacity(items.len()),
            payloads: Vec::with_capacity(items.len()),
            event_types: Vec::with_capacity(items.len()),
        };
        for item in items {
            columns.created_ats.push(item.created_at);
            columns.tenant_ids.push(item.tenant_id);
            columns.resource_ids.push(item.resource_id);
            columns.payloads.push(item.payload.clone());
            columns.event_types.push(item.event_type);
        }
        columns
    }

    pub fn len(&self) -> usize {
        self.created_ats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.created_ats.is_empty()
    }

    /// Rebuild item `i`.
    pub fn row(&self, i: usize) -> Option<EventItem> {
        Some(EventItem {
            created_at: *self.created_ats.get(i)?,
            tenant_id: *self.tenant_ids.get(i)?,
            resource_id: *self.resource_ids.get(i)?,
            payload: self.payloads.get(i)?.clone(),
            event_type: *self.event_types.get(i)?,
        })
    }

    /// Enum labels for the `event_type` column. Every row must carry one.
    pub fn event_type_labels(&self) -> Result<Vec<&'static str>, PostgreSQLPopulatorError> {
        self.event_types
            .iter()
            .enumerate()
            .map(|(i, t)| {
                t.map(|t| t.as_str()).ok_or_else(|| {
                    PostgreSQLPopulatorError::InvalidPayload(format!(
                        "metric event at batch position {i} has no event type"
                    ))
                })
            })
            .collect()
    }

    /// Payloads as text for the `log` column. Every payload must be UTF-8.
    pub fn payload_texts(&self) -> Result<Vec<&str>, PostgreSQLPopulatorError> {
        self.payloads
            .iter()
            .enumerate()
            .map(|(i, p)| {
                std::str::from_utf8(p).map_err(|e| {
                    PostgreSQLPopulatorError::InvalidPayload(format!(
                        "log line at batch position {i} is not UTF-8: {e}"
                    ))
                })
            })
            .collect()
    }
}
