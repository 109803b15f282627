// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Every write made inside a transaction is recorded as a Change. The working
// copy already reflects the change; at COMMIT the log is replayed against the
// committed tables so concurrent commits from other contexts are preserved.
//
// ============================================================================

use serde_json::Value;

/// A single recorded write
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Insert a new record; fails at commit if the key exists
    Insert {
        entity: String,
        key: String,
        id: Value,
        record: Value,
    },

    /// Insert or replace a record
    Upsert {
        entity: String,
        key: String,
        id: Value,
        record: Value,
    },

    /// Set fields on an existing record. Skipped if the record is gone by commit time.
    Update {
        entity: String,
        key: String,
        assignments: Vec<(Vec<String>, Value)>,
    },

    /// Delete a record if present
    Delete { entity: String, key: String },
}
