//! Detection-fetch-handoff pipeline
//!
//! One `run_once` call is the read half of a poll cycle, in three ordered
//! stages: classify the fresh snapshots, gather bounded log context for the
//! services whose transition is critical, and hand the assembled bundle to
//! the analysis backend. Stage 2 is skipped entirely when nothing is
//! critical, and stage 3 is one-way: its result is logged, never persisted,
//! and never retried.

use crate::analysis::AnalysisBackend;
use crate::error::StoreError;
use crate::logs::{FetchOutcome, LogRegistry};
use crate::store::SnapshotStore;
use crate::tracker::FailureTracker;
use crate::types::{status_description, Timestamp, Transition};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Per-service outcome of the detect and fetch stages
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceReport {
    pub service_name: String,
    pub status: i64,
    pub transition: Transition,
    /// Populated during the fetch stage, and only for critical services
    pub logs: Option<FetchOutcome>,
}

impl ServiceReport {
    pub fn is_critical(&self) -> bool {
        self.transition.is_critical()
    }
}

/// Transient per-cycle bundle handed to the analysis backend
///
/// Rebuilt every cycle and discarded after handoff; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowContext {
    started_at: Timestamp,
    reports: Vec<ServiceReport>,
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            reports: Vec::new(),
        }
    }

    pub fn push(&mut self, report: ServiceReport) {
        self.reports.push(report);
    }

    pub fn reports(&self) -> &[ServiceReport] {
        &self.reports
    }

    pub fn critical_reports(&self) -> impl Iterator<Item = &ServiceReport> {
        self.reports.iter().filter(|report| report.is_critical())
    }

    pub fn critical_count(&self) -> usize {
        self.critical_reports().count()
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    fn attach_logs(&mut self, service: &str, outcome: FetchOutcome) {
        if let Some(report) = self
            .reports
            .iter_mut()
            .find(|report| report.service_name == service)
        {
            report.logs = Some(outcome);
        }
    }
}

impl Default for WorkflowContext {
    fn default() -> Self {
        Self::new()
    }
}

/// What one pipeline run did
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSummary {
    /// Services with a fresh snapshot this cycle
    pub services: usize,
    /// Services classified NEW or CHANGED
    pub critical: usize,
    /// Advisory text, when the handoff succeeded
    pub advisory: Option<String>,
}

pub struct Pipeline {
    store: Arc<SnapshotStore>,
    tracker: FailureTracker,
    registry: Arc<LogRegistry>,
    backend: Arc<dyn AnalysisBackend>,
}

impl Pipeline {
    pub fn new(
        store: Arc<SnapshotStore>,
        registry: Arc<LogRegistry>,
        backend: Arc<dyn AnalysisBackend>,
    ) -> Self {
        let tracker = FailureTracker::new(Arc::clone(&store));
        Self {
            store,
            tracker,
            registry,
            backend,
        }
    }

    /// Run the detection, fetch, and handoff stages over snapshots created
    /// at or after `since`
    ///
    /// # Errors
    /// Returns an error only if the snapshot listing cannot be read; every
    /// later failure is logged and absorbed so the scheduled loop survives.
    pub async fn run_once(&self, since: Timestamp) -> Result<CycleSummary, StoreError> {
        let mut context = WorkflowContext::new();

        // Stage 1: detect.
        for snapshot in self.store.latest_snapshots()? {
            if snapshot.created_at < since {
                debug!(
                    "no fresh snapshot for {}, skipping classification",
                    snapshot.service_name
                );
                continue;
            }
            match self.tracker.observe(
                &snapshot.service_name,
                snapshot.status,
                snapshot.timestamp,
            ) {
                Ok(transition) => {
                    if transition.is_critical() {
                        info!(
                            "service {} flagged critical: {} [{}]",
                            snapshot.service_name,
                            status_description(snapshot.status),
                            transition.label()
                        );
                    } else {
                        debug!(
                            "service {}: {} [{}]",
                            snapshot.service_name,
                            status_description(snapshot.status),
                            transition.label()
                        );
                    }
                    context.push(ServiceReport {
                        service_name: snapshot.service_name,
                        status: snapshot.status,
                        transition,
                        logs: None,
                    });
                }
                Err(e) => warn!(
                    "failed to update failure state for {}, skipping it this cycle: {e}",
                    snapshot.service_name
                ),
            }
        }

        let services = context.reports().len();
        let critical = context.critical_count();
        if critical == 0 {
            debug!("no critical transitions among {services} services");
            return Ok(CycleSummary {
                services,
                critical,
                advisory: None,
            });
        }

        // Stage 2: fetch, concurrently, one timeout per fetch.
        self.fetch_logs(&mut context).await;

        // Stage 3: one-way handoff.
        let advisory = match self.backend.analyze(&context).await {
            Ok(text) => {
                info!("analysis advisory for {critical} critical service(s):\n{text}");
                Some(text)
            }
            Err(e) => {
                warn!("analysis handoff failed, advisory dropped: {e}");
                None
            }
        };

        Ok(CycleSummary {
            services,
            critical,
            advisory,
        })
    }

    async fn fetch_logs(&self, context: &mut WorkflowContext) {
        // The journal strategy enforces its own deadline; this outer timeout
        // is the backstop for the file-based strategies.
        let timeout = self.registry.fetch_timeout() + Duration::from_secs(2);
        let mut tasks = tokio::task::JoinSet::new();

        for report in context.critical_reports() {
            let service = report.service_name.clone();
            let fetcher = self.registry.fetcher(&service);
            tasks.spawn(async move {
                let source = fetcher.describe();
                let outcome = match tokio::time::timeout(timeout, fetcher.fetch()).await {
                    Ok(outcome) => outcome,
                    Err(_) => FetchOutcome::unavailable(format!(
                        "fetch from {source} timed out after {}s",
                        timeout.as_secs()
                    )),
                };
                (service, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((service, outcome)) => {
                    debug!(
                        "gathered {} log line(s) for {service}",
                        outcome.line_count()
                    );
                    context.attach_logs(&service, outcome);
                }
                Err(e) => error!("log fetch task failed: {e}"),
            }
        }
    }
}
