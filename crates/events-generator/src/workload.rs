//! Workload iterators.

use crate::ids::generate_uuid_v4;
use crate::item::{EventItem, EventType};
use crate::timestamp::TimeWindow;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use uuid::Uuid;

/// Number of tenants, resources per tenant and items per `(tenant, resource)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadShape {
    pub tenants: u64,
    pub resources: u64,
    pub count: u64,
}

impl WorkloadShape {
    pub fn new(tenants: u64, resources: u64, count: u64) -> Self {
        Self {
            tenants,
            resources,
            count,
        }
    }

    /// Total number of items the workload produces.
    pub fn total(&self) -> u64 {
        self.tenants
            .saturating_mul(self.resources)
            .saturating_mul(self.count)
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Simple,
    Metric(TimeWindow),
    Log(TimeWindow),
}

/// Lazily generated workload, tenant by tenant, resource by resource.
pub struct EventStream {
    kind: Kind,
    shape: WorkloadShape,
    rng: StdRng,
    tenant: u64,
    resource: u64,
    index: u64,
    tenant_id: Uuid,
    resource_id: Uuid,
}

/// Simple events: JSON payload, `created_at` is the generation time.
pub fn simple_events(shape: WorkloadShape, seed: Option<u64>) -> EventStream {
    EventStream::new(Kind::Simple, shape, seed)
}

/// Metric events spread over the 24 hours after `now`, alternating
/// `FAILED` (even index) and `SUCCEEDED` (odd index).
pub fn metric_events(shape: WorkloadShape, now: DateTime<Utc>, seed: Option<u64>) -> EventStream {
    EventStream::new(Kind::Metric(TimeWindow::day_from(now)), shape, seed)
}

/// Log lines spread linearly across `window`.
pub fn log_stream(shape: WorkloadShape, window: TimeWindow, seed: Option<u64>) -> EventStream {
    EventStream::new(Kind::Log(window), shape, seed)
}

impl EventStream {
    fn new(kind: Kind, shape: WorkloadShape, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            kind,
            shape,
            rng,
            tenant: 0,
            resource: 0,
            index: 0,
            tenant_id: Uuid::nil(),
            resource_id: Uuid::nil(),
        }
    }

    pub fn shape(&self) -> WorkloadShape {
        self.shape
    }

    fn build(&self, index: u64) -> EventItem {
        let (tenant_id, resource_id) = (self.tenant_id, self.resource_id);
        let message = format!("message for tenant {tenant_id}, resource {resource_id}, event {index}");

        match self.kind {
            Kind::Simple => EventItem {
                created_at: Utc::now(),
                tenant_id,
                resource_id,
                payload: json_payload(&message),
                event_type: None,
            },
            Kind::Metric(window) => EventItem {
                created_at: window.at(index, self.shape.count),
                tenant_id,
                resource_id,
                payload: json_payload(&message),
                event_type: Some(EventType::for_index(index)),
            },
            Kind::Log(window) => EventItem {
                created_at: window.at(index, self.shape.count),
                tenant_id,
                resource_id,
                payload: message.into_bytes(),
                event_type: None,
            },
        }
    }
}

fn json_payload(message: &str) -> Vec<u8> {
    format!("{{\"message\": \"{message}\"}}").into_bytes()
}

impl Iterator for EventStream {
    type Item = EventItem;

    fn next(&mut self) -> Option<EventItem> {
        if self.shape.total() == 0 || self.tenant >= self.shape.tenants {
            return None;
        }

        if self.resource == 0 && self.index == 0 {
            self.tenant_id = generate_uuid_v4(&mut self.rng);
        }
        if self.index == 0 {
            self.resource_id = generate_uuid_v4(&mut self.rng);
        }

        let item = self.build(self.index);

        self.index += 1;
        if self.index == self.shape.count {
            self.index = 0;
            self.resource += 1;
            if self.resource == self.shape.resources {
                self.resource = 0;
                self.tenant += 1;
            }
        }

        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.tenant >= self.shape.tenants || self.shape.total() == 0 {
            return (0, Some(0));
        }
        let per_tenant = self.shape.resources * self.shape.count;
        let done = self.tenant * per_tenant + self.resource * self.shape.count + self.index;
        let remaining = usize::try_from(self.shape.total() - done).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}
