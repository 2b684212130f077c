//! Scheduled ingestion
//!
//! One `ingest_once` call is the write half of a poll cycle: fetch the full
//! status listing, append one snapshot per service, then run the retention
//! sweep. A fetch failure abandons the tick; a failed append or sweep is
//! logged and the loop carries on.

use crate::error::PollError;
use crate::monit::MonitClient;
use crate::store::SnapshotStore;
use crate::types::{ServiceHealth, Snapshot};
use chrono::Utc;
use log::{debug, info, warn};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Source of the current health listing
///
/// Implemented by [`MonitClient`]; test doubles substitute canned listings.
pub trait StatusSource: Send + Sync {
    fn fetch_status(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ServiceHealth>, PollError>> + Send + '_>>;
}

impl StatusSource for MonitClient {
    fn fetch_status(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ServiceHealth>, PollError>> + Send + '_>> {
        Box::pin(MonitClient::fetch_status(self))
    }
}

/// Counters from one completed ingest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    /// Services present in the fetched listing
    pub observed: usize,
    /// Snapshots actually written
    pub persisted: usize,
    /// Snapshots removed by the retention sweep
    pub pruned: usize,
}

pub struct Poller {
    source: Arc<dyn StatusSource>,
    store: Arc<SnapshotStore>,
    retention: chrono::Duration,
}

impl Poller {
    pub fn new(source: Arc<dyn StatusSource>, store: Arc<SnapshotStore>, retention_days: u64) -> Self {
        Self {
            source,
            store,
            retention: chrono::Duration::days(retention_days as i64),
        }
    }

    /// Fetch the current listing, persist snapshots, sweep old ones
    ///
    /// # Errors
    /// Returns an error only when the listing itself cannot be fetched or
    /// parsed; that abandons the tick. Per-service persistence failures and
    /// a failed sweep are logged and absorbed.
    pub async fn ingest_once(&self) -> Result<IngestSummary, PollError> {
        let services = self.source.fetch_status().await?;
        let observed = services.len();
        debug!("fetched status for {observed} services");

        let mut persisted = 0usize;
        for health in &services {
            let snapshot = Snapshot::new(health.name.clone(), health.status, health.payload.clone());
            match self.store.append(&snapshot) {
                Ok(()) => persisted += 1,
                Err(e) => warn!(
                    "failed to persist snapshot for {}: {e}",
                    snapshot.service_name
                ),
            }
        }

        let pruned = self.sweep();
        Ok(IngestSummary {
            observed,
            persisted,
            pruned,
        })
    }

    /// Best-effort retention sweep; runs after all writes of the cycle
    fn sweep(&self) -> usize {
        let cutoff = Utc::now() - self.retention;
        match self.store.delete_older_than(cutoff) {
            Ok(0) => 0,
            Ok(removed) => {
                info!("retention sweep removed {removed} snapshots older than {cutoff}");
                removed
            }
            Err(e) => {
                warn!("retention sweep failed, will retry next cycle: {e}");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    struct StaticSource {
        services: Vec<ServiceHealth>,
    }

    impl StatusSource for StaticSource {
        fn fetch_status(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<ServiceHealth>, PollError>> + Send + '_>>
        {
            let services = self.services.clone();
            Box::pin(async move { Ok(services) })
        }
    }

    struct FailingSource;

    impl StatusSource for FailingSource {
        fn fetch_status(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<ServiceHealth>, PollError>> + Send + '_>>
        {
            Box::pin(async { Err(PollError::Unreachable("connection refused".to_string())) })
        }
    }

    fn health(name: &str, status: i64) -> ServiceHealth {
        ServiceHealth {
            name: name.to_string(),
            status,
            payload: format!(r#"{{"name":"{name}","status":"{status}"}}"#),
        }
    }

    fn make_store() -> (TempDir, Arc<SnapshotStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SnapshotStore::open(&dir.path().join("test.db")).unwrap());
        (dir, store)
    }

    #[tokio::test]
    async fn test_ingest_persists_one_snapshot_per_service() {
        let (_dir, store) = make_store();
        let source = Arc::new(StaticSource {
            services: vec![health("nginx", 0), health("redis", 512)],
        });
        let poller = Poller::new(source, Arc::clone(&store), 30);

        let summary = poller.ingest_once().await.unwrap();
        assert_eq!(summary.observed, 2);
        assert_eq!(summary.persisted, 2);

        let nginx = store.recent_status("nginx", 10).unwrap();
        assert_eq!(nginx.len(), 1);
        assert_eq!(nginx[0].status, 0);
        let redis = store.recent_status("redis", 10).unwrap();
        assert_eq!(redis[0].status, 512);
    }

    #[tokio::test]
    async fn test_unreachable_source_abandons_tick() {
        let (_dir, store) = make_store();
        let poller = Poller::new(Arc::new(FailingSource), Arc::clone(&store), 30);

        let result = poller.ingest_once().await;
        assert!(matches!(result, Err(PollError::Unreachable(_))));
        assert!(store.latest_snapshots().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_sweeps_expired_snapshots() {
        let (_dir, store) = make_store();

        let old = Snapshot {
            service_name: "nginx".to_string(),
            timestamp: Utc::now() - Duration::days(31),
            status: 0,
            payload: "{}".to_string(),
            created_at: Utc::now() - Duration::days(31),
        };
        store.append(&old).unwrap();

        let source = Arc::new(StaticSource {
            services: vec![health("nginx", 0)],
        });
        let poller = Poller::new(source, Arc::clone(&store), 30);

        let summary = poller.ingest_once().await.unwrap();
        assert_eq!(summary.pruned, 1);

        let remaining = store.recent_status("nginx", 10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].timestamp > Utc::now() - Duration::days(1));
    }

    #[tokio::test]
    async fn test_empty_listing_is_a_quiet_cycle() {
        let (_dir, store) = make_store();
        let poller = Poller::new(
            Arc::new(StaticSource { services: vec![] }),
            Arc::clone(&store),
            30,
        );

        let summary = poller.ingest_once().await.unwrap();
        assert_eq!(summary.observed, 0);
        assert_eq!(summary.persisted, 0);
    }
}
