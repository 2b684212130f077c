//! Schema initialization for the snapshot store
//!
//! The schema is created idempotently at startup; there is no versioned
//! migration history, only additive `IF NOT EXISTS` statements.

use rusqlite::Connection;

/// Create the snapshot and failure-state tables and their indexes
///
/// # Errors
/// Returns an error if any DDL statement fails.
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            service_name TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            status INTEGER NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_snapshots_service_time
            ON snapshots (service_name, timestamp);

        CREATE INDEX IF NOT EXISTS idx_snapshots_timestamp
            ON snapshots (timestamp);

        CREATE TABLE IF NOT EXISTS failure_state (
            service_name TEXT PRIMARY KEY,
            last_status INTEGER NOT NULL,
            last_checked TEXT NOT NULL,
            times_failed INTEGER NOT NULL DEFAULT 0,
            first_failure_time TEXT,
            last_failure_time TEXT
        );
        "#,
    )
}
