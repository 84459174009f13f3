//! Schema statements for the event tables.

use crate::workload::Workload;

const CREATE_METRIC_EVENT_TYPE: &str = "DO $$ BEGIN
    CREATE TYPE metric_event_type AS ENUM ('SUCCEEDED', 'FAILED');
EXCEPTION
    WHEN duplicate_object THEN NULL;
END $$";

/// Statements creating the table (and its supporting type and index).
/// Every statement is idempotent.
pub fn create_statements(workload: Workload) -> Vec<String> {
    let table = workload.table();
    let mut statements = Vec::new();

    let columns = match workload {
        Workload::Simple => "    data BYTEA NOT NULL",
        Workload::Metrics => {
            statements.push(CREATE_METRIC_EVENT_TYPE.to_string());
            "    event_type metric_event_type NOT NULL,\n    data BYTEA NOT NULL"
        }
        Workload::Logs => "    log TEXT NOT NULL",
    };

    statements.push(format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n    \
         id BIGSERIAL PRIMARY KEY,\n    \
         created_at TIMESTAMPTZ NOT NULL,\n    \
         tenant_id UUID NOT NULL,\n    \
         resource_id UUID NOT NULL,\n\
         {columns}\n)"
    ));
    statements.push(format!(
        "CREATE INDEX IF NOT EXISTS {table}_tenant_resource_idx ON {table} (tenant_id, resource_id)"
    ));
    statements
}

/// Generate DROP TABLE statement.
pub fn drop_table(workload: Workload) -> String {
    format!("DROP TABLE IF EXISTS {}", workload.table())
}
