//! Generated record types.

use crate::GeneratorError;
use chrono::{DateTime, Utc};
use ingest_buffer::ItemSize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Outcome recorded by a metric event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Succeeded,
    Failed,
}

impl EventType {
    /// Event type for the item at `index` within its `(tenant, resource)` pair.
    ///
    /// Even indices are failures, odd indices successes.
    pub fn for_index(index: u64) -> Self {
        if index % 2 == 0 {
            EventType::Failed
        } else {
            EventType::Succeeded
        }
    }

    /// Label stored in the database enum.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Succeeded => "SUCCEEDED",
            EventType::Failed => "FAILED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = GeneratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCEEDED" => Ok(EventType::Succeeded),
            "FAILED" => Ok(EventType::Failed),
            other => Err(GeneratorError::UnknownEventType(other.to_string())),
        }
    }
}

/// One generated record, ready to be buffered for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventItem {
    pub created_at: DateTime<Utc>,
    pub tenant_id: Uuid,
    pub resource_id: Uuid,
    pub payload: Vec<u8>,
    /// Only set for metric events.
    pub event_type: Option<EventType>,
}

impl EventItem {
    /// Payload as text, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

impl ItemSize for EventItem {
    fn size_bytes(&self) -> usize {
        self.payload.len()
    }
}
