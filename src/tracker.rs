//! Failure state tracking
//!
//! `classify` is the transition table as a pure function; `FailureTracker`
//! applies the table's side effects to the persisted per-service state. The
//! table deliberately treats an unchanged nonzero status as ONGOING even
//! when the underlying root cause may have changed; that approximation is
//! part of the contract, not something to refine here.

use crate::error::StoreError;
use crate::store::SnapshotStore;
use crate::types::{FailureState, Timestamp, Transition};
use std::sync::Arc;

/// Classify a status change against the previously recorded status
///
/// Total over all `(previous, new)` pairs; absence of a prior record is
/// expressed by passing `previous_status = 0`.
pub fn classify(previous_status: i64, new_status: i64) -> Transition {
    match (previous_status, new_status) {
        (0, 0) => Transition::StillHealthy,
        (0, _) => Transition::New,
        (_, 0) => Transition::Recovered,
        (prev, new) if prev == new => Transition::Ongoing,
        _ => Transition::Changed,
    }
}

/// Applies classified transitions to the stored failure state
pub struct FailureTracker {
    store: Arc<SnapshotStore>,
}

impl FailureTracker {
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        Self { store }
    }

    /// Record one observation for `service` and return its classification
    ///
    /// Runs once per cycle per service. `times_failed` moves only on NEW and
    /// CHANGED; ONGOING advances `last_checked` alone.
    ///
    /// # Errors
    /// Returns an error if the failure state cannot be read or written.
    pub fn observe(
        &self,
        service: &str,
        new_status: i64,
        at: Timestamp,
    ) -> Result<Transition, StoreError> {
        let previous = self.store.failure_state(service)?;
        let previous_status = previous.as_ref().map_or(0, |s| s.last_status);
        let transition = classify(previous_status, new_status);

        let mut next = previous.unwrap_or(FailureState {
            service_name: service.to_string(),
            last_status: 0,
            last_checked: at,
            times_failed: 0,
            first_failure_time: None,
            last_failure_time: None,
        });
        next.last_checked = at;

        match transition {
            Transition::StillHealthy | Transition::Recovered => {
                next.last_status = new_status;
            }
            Transition::Ongoing => {}
            Transition::New => {
                next.last_status = new_status;
                next.times_failed += 1;
                next.first_failure_time = Some(at);
                next.last_failure_time = Some(at);
            }
            Transition::Changed => {
                next.last_status = new_status;
                next.times_failed += 1;
                next.last_failure_time = Some(at);
            }
        }

        self.store.upsert_failure_state(&next)?;
        Ok(transition)
    }
}
