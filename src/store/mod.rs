//! Durable snapshot and failure-state storage backed by SQLite
//!
//! One connection behind a mutex; every operation is a single statement or
//! transaction, so readers observe either the pre- or post-write state of a
//! row, never a partial one. Snapshots are append-only and removed solely by
//! the retention sweep. The trend queries at the bottom are the read-only
//! surface used by downstream collaborators.

mod migrations;

use crate::error::StoreError;
use crate::types::{FailureState, Snapshot, Timestamp};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed store for snapshots and failure state
pub struct SnapshotStore {
    conn: Mutex<Connection>,
}

/// Per-service failure aggregate over a trailing window
#[derive(Debug, Clone, PartialEq)]
pub struct FailureStats {
    pub service_name: String,
    pub checks: i64,
    pub failures: i64,
    pub failure_rate: f64,
}

/// Recent snapshots plus the current failure state for one service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceHistory {
    pub snapshots: Vec<Snapshot>,
    pub failure_state: Option<FailureState>,
}

impl SnapshotStore {
    /// Open (or create) the database at `path` and initialize the schema
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be created.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::OpenFailed(format!("{}: {e}", path.display())))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append one snapshot; rows are never updated afterwards
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn append(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::WriteFailed("connection lock poisoned".to_string()))?;

        conn.execute(
            "INSERT INTO snapshots (service_name, timestamp, status, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                snapshot.service_name,
                snapshot.timestamp.to_rfc3339(),
                snapshot.status,
                snapshot.payload,
                snapshot.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Last `limit` snapshots for `service`, oldest first
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn recent_status(&self, service: &str, limit: usize) -> Result<Vec<Snapshot>, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::ReadFailed("connection lock poisoned".to_string()))?;

        let mut stmt = conn.prepare(
            "SELECT service_name, timestamp, status, payload, created_at
             FROM snapshots
             WHERE service_name = ?1
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2",
        )?;
        let mut snapshots: Vec<Snapshot> = stmt
            .query_map(params![service, limit as i64], parse_snapshot_row)?
            .collect::<Result<_, _>>()?;
        snapshots.reverse();
        Ok(snapshots)
    }

    /// Snapshots for `service` within `[from, to]`, in timestamp order
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn query_range(
        &self,
        service: &str,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<Snapshot>, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::ReadFailed("connection lock poisoned".to_string()))?;

        let mut stmt = conn.prepare(
            "SELECT service_name, timestamp, status, payload, created_at
             FROM snapshots
             WHERE service_name = ?1 AND timestamp >= ?2 AND timestamp <= ?3
             ORDER BY timestamp ASC, id ASC",
        )?;
        let snapshots = stmt
            .query_map(
                params![service, from.to_rfc3339(), to.to_rfc3339()],
                parse_snapshot_row,
            )?
            .collect::<Result<_, _>>()?;
        Ok(snapshots)
    }

    /// The most recent snapshot of every service observed so far
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn latest_snapshots(&self) -> Result<Vec<Snapshot>, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::ReadFailed("connection lock poisoned".to_string()))?;

        let mut stmt = conn.prepare(
            "SELECT service_name, timestamp, status, payload, created_at
             FROM snapshots
             WHERE id IN (SELECT MAX(id) FROM snapshots GROUP BY service_name)
             ORDER BY service_name ASC",
        )?;
        let snapshots = stmt
            .query_map([], parse_snapshot_row)?
            .collect::<Result<_, _>>()?;
        Ok(snapshots)
    }

    /// Delete snapshots strictly older than `cutoff`; returns rows removed
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub fn delete_older_than(&self, cutoff: Timestamp) -> Result<usize, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::WriteFailed("connection lock poisoned".to_string()))?;

        let removed = conn.execute(
            "DELETE FROM snapshots WHERE timestamp < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(removed)
    }

    /// Current failure state for `service`, if one has been recorded
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn failure_state(&self, service: &str) -> Result<Option<FailureState>, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::ReadFailed("connection lock poisoned".to_string()))?;

        let mut stmt = conn.prepare(
            "SELECT service_name, last_status, last_checked, times_failed,
                    first_failure_time, last_failure_time
             FROM failure_state
             WHERE service_name = ?1",
        )?;
        let mut rows = stmt.query_map(params![service], parse_failure_state_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Write the full failure-state row for a service, replacing any
    /// existing one
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn upsert_failure_state(&self, state: &FailureState) -> Result<(), StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::WriteFailed("connection lock poisoned".to_string()))?;

        conn.execute(
            "INSERT OR REPLACE INTO failure_state
                 (service_name, last_status, last_checked, times_failed,
                  first_failure_time, last_failure_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                state.service_name,
                state.last_status,
                state.last_checked.to_rfc3339(),
                state.times_failed,
                state.first_failure_time.map(|t| t.to_rfc3339()),
                state.last_failure_time.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Per-service check/failure counts over the last `days` days
    ///
    /// Read-only trend surface for downstream collaborators.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn failure_stats(&self, days: u64) -> Result<Vec<FailureStats>, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::ReadFailed("connection lock poisoned".to_string()))?;

        let cutoff = (Utc::now() - chrono::Duration::days(days as i64)).to_rfc3339();
        let mut stmt = conn.prepare(
            "SELECT service_name,
                    COUNT(*) AS checks,
                    SUM(CASE WHEN status != 0 THEN 1 ELSE 0 END) AS failures
             FROM snapshots
             WHERE timestamp >= ?1
             GROUP BY service_name
             ORDER BY failures DESC, service_name ASC",
        )?;
        let stats = stmt
            .query_map(params![cutoff], |row| {
                let checks: i64 = row.get(1)?;
                let failures: i64 = row.get(2)?;
                Ok(FailureStats {
                    service_name: row.get(0)?,
                    checks,
                    failures,
                    failure_rate: if checks > 0 {
                        failures as f64 / checks as f64
                    } else {
                        0.0
                    },
                })
            })?
            .collect::<Result<_, _>>()?;
        Ok(stats)
    }

    /// Recent snapshots and failure state for one service over `days` days
    ///
    /// # Errors
    /// Returns an error if any of the underlying queries fail.
    pub fn service_history(&self, service: &str, days: u64) -> Result<ServiceHistory, StoreError> {
        let now = Utc::now();
        let from = now - chrono::Duration::days(days as i64);
        Ok(ServiceHistory {
            snapshots: self.query_range(service, from, now)?,
            failure_state: self.failure_state(service)?,
        })
    }
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<Timestamp> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_snapshot_row(row: &Row<'_>) -> rusqlite::Result<Snapshot> {
    let timestamp: String = row.get(1)?;
    let created_at: String = row.get(4)?;
    Ok(Snapshot {
        service_name: row.get(0)?,
        timestamp: parse_timestamp(1, &timestamp)?,
        status: row.get(2)?,
        payload: row.get(3)?,
        created_at: parse_timestamp(4, &created_at)?,
    })
}

fn parse_failure_state_row(row: &Row<'_>) -> rusqlite::Result<FailureState> {
    let last_checked: String = row.get(2)?;
    let first_failure: Option<String> = row.get(4)?;
    let last_failure: Option<String> = row.get(5)?;
    Ok(FailureState {
        service_name: row.get(0)?,
        last_status: row.get(1)?,
        last_checked: parse_timestamp(2, &last_checked)?,
        times_failed: row.get(3)?,
        first_failure_time: first_failure.as_deref().map(|t| parse_timestamp(4, t)).transpose()?,
        last_failure_time: last_failure.as_deref().map(|t| parse_timestamp(5, t)).transpose()?,
    })
}
