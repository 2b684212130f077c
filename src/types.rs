//! Core data types for the Monit intelligence pipeline
//!
//! This module defines the fundamental data structures shared across the
//! application: health snapshots, per-service failure state, and the
//! transition classification produced by the failure tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// One health observation of one service at one instant
///
/// Snapshots are append-only: created once per poll cycle per observed
/// service, never mutated, and removed only by the retention sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    /// Name of the monitored service
    pub service_name: String,
    /// When the observation was taken
    pub timestamp: Timestamp,
    /// Monit status code; 0 = healthy, nonzero = failure/degraded variant
    pub status: i64,
    /// Opaque metric blob from the monitoring source, stored verbatim
    pub payload: String,
    /// When the row was created
    pub created_at: Timestamp,
}

impl Snapshot {
    /// Create a snapshot observed now
    pub fn new(service_name: impl Into<String>, status: i64, payload: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            service_name: service_name.into(),
            timestamp: now,
            status,
            payload: payload.into(),
            created_at: now,
        }
    }

    /// Whether this observation reports a failure
    pub fn is_failed(&self) -> bool {
        self.status != 0
    }
}

/// Persisted failure-tracking record, exactly one per service
///
/// `times_failed` counts transitions *into* failure (NEW or CHANGED); it is
/// never incremented while a known failure persists unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureState {
    pub service_name: String,
    pub last_status: i64,
    pub last_checked: Timestamp,
    pub times_failed: i64,
    pub first_failure_time: Option<Timestamp>,
    pub last_failure_time: Option<Timestamp>,
}

/// Classification of a status change relative to the stored failure state
///
/// The set is closed and the classification function is total: every
/// (previous, new) status pair maps to exactly one variant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    /// Healthy before, healthy now; only the check timestamp advances
    StillHealthy,
    /// Healthy before, failing now
    New,
    /// Failing before and now, with the same status code
    Ongoing,
    /// Failing before and now, with a different status code
    Changed,
    /// Failing before, healthy now
    Recovered,
}

impl Transition {
    /// Whether this transition is new information worth expensive follow-up
    ///
    /// Only transitions *into* failure (or into a different failure) are
    /// critical; an unchanged ongoing failure is deliberately suppressed to
    /// avoid re-triggering downstream analysis for an already-known problem.
    pub fn is_critical(self) -> bool {
        matches!(self, Transition::New | Transition::Changed)
    }

    /// Short uppercase label used in log lines and prompts
    pub fn label(self) -> &'static str {
        match self {
            Transition::StillHealthy => "HEALTHY",
            Transition::New => "NEW",
            Transition::Ongoing => "ONGOING",
            Transition::Changed => "CHANGED",
            Transition::Recovered => "RECOVERED",
        }
    }
}

/// One parsed entry from the Monit status listing
///
/// Produced by the Monit client; the poller turns each entry into a
/// [`Snapshot`]. The payload is the service element re-serialized to JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceHealth {
    pub name: String,
    pub status: i64,
    pub payload: String,
}

/// Human-readable description of a Monit status code
///
/// Monit encodes failures as an event bitmask; this decodes the common bits
/// for log lines and prompts. Unknown bits fall back to the raw code.
pub fn status_description(status: i64) -> String {
    if status == 0 {
        return "healthy".to_string();
    }

    const BITS: &[(i64, &str)] = &[
        (0x2, "resource limit matched"),
        (0x4, "timeout"),
        (0x8, "timestamp failed"),
        (0x10, "size failed"),
        (0x20, "connection failed"),
        (0x40, "permission failed"),
        (0x100, "gid failed"),
        (0x200, "does not exist"),
        (0x400, "invalid type"),
        (0x800, "data access error"),
        (0x1000, "execution failed"),
    ];

    let mut parts: Vec<&str> = BITS
        .iter()
        .filter(|(bit, _)| status & bit != 0)
        .map(|(_, name)| *name)
        .collect();

    if parts.is_empty() {
        parts.push("failed");
    }

    format!("{} (code {})", parts.join(", "), status)
}
