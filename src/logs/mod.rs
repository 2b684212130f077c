//! Log aggregation
//!
//! Turns a service name into a bounded block of diagnostic text. Each of the
//! three retrieval strategies implements [`LogFetcher`]; the [`LogRegistry`]
//! is the immutable service-to-fetcher table built once from configuration.
//! A fetcher never fails fatally: an unreachable source degrades to
//! [`FetchOutcome::Unavailable`] with a reason.

mod journal;
mod newest_glob;
mod tail_file;

pub use journal::JournalQuery;
pub use newest_glob::NewestGlob;
pub use tail_file::TailFile;

use crate::config::{default_max_lines, LogFetchSpec, LogsConfig};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Longest individual line kept in a fetched bundle, in bytes
pub(crate) const MAX_LINE_BYTES: usize = 2000;

/// Result of one log fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// At most `max_lines` lines, oldest first
    Lines(Vec<String>),
    /// The source could not be read; the reason is surfaced downstream
    Unavailable { reason: String },
}

impl FetchOutcome {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        FetchOutcome::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn line_count(&self) -> usize {
        match self {
            FetchOutcome::Lines(lines) => lines.len(),
            FetchOutcome::Unavailable { .. } => 0,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, FetchOutcome::Unavailable { .. })
    }
}

/// A configured log source for one service
pub trait LogFetcher: Send + Sync {
    /// Human-readable description of the source, used in log lines and
    /// unavailability reasons
    fn describe(&self) -> String;

    /// Retrieve at most the configured number of lines
    ///
    /// Must not panic or return a fatal error for a missing or unreadable
    /// source; such conditions degrade to [`FetchOutcome::Unavailable`].
    fn fetch(&self) -> Pin<Box<dyn Future<Output = FetchOutcome> + Send + '_>>;
}

/// Immutable lookup table mapping service names to their log fetchers
///
/// Built once at startup from the `[logs]` configuration and passed
/// explicitly to the pipeline. Services without a configured spec fall back
/// to a journal query for `<service>.service`.
pub struct LogRegistry {
    fetchers: HashMap<String, Arc<dyn LogFetcher>>,
    fetch_timeout: Duration,
}

impl LogRegistry {
    pub fn from_config(cfg: &LogsConfig) -> Self {
        let fetch_timeout = Duration::from_secs(cfg.fetch_timeout_secs);
        let fetchers = cfg
            .services
            .iter()
            .map(|(service, spec)| (service.clone(), build_fetcher(spec, fetch_timeout)))
            .collect();
        Self {
            fetchers,
            fetch_timeout,
        }
    }

    /// The fetcher for `service`, or the journal fallback if none is
    /// configured
    pub fn fetcher(&self, service: &str) -> Arc<dyn LogFetcher> {
        match self.fetchers.get(service) {
            Some(fetcher) => Arc::clone(fetcher),
            None => Arc::new(JournalQuery::new(
                format!("{service}.service"),
                false,
                default_max_lines(),
                self.fetch_timeout,
            )),
        }
    }

    pub fn contains(&self, service: &str) -> bool {
        self.fetchers.contains_key(service)
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }
}

fn build_fetcher(spec: &LogFetchSpec, timeout: Duration) -> Arc<dyn LogFetcher> {
    match spec {
        LogFetchSpec::TailFile { path, max_lines } => {
            Arc::new(TailFile::new(path.clone(), *max_lines))
        }
        LogFetchSpec::NewestOfGlob { pattern, max_lines } => {
            Arc::new(NewestGlob::new(pattern.clone(), *max_lines))
        }
        LogFetchSpec::JournalQuery {
            unit,
            user_service,
            max_lines,
        } => Arc::new(JournalQuery::new(
            unit.clone(),
            *user_service,
            *max_lines,
            timeout,
        )),
    }
}

/// Truncate one line to `max_bytes`, respecting UTF-8 boundaries
pub(crate) fn truncate_line(line: &str, max_bytes: usize) -> String {
    if line.len() <= max_bytes {
        return line.to_string();
    }
    let mut end = max_bytes;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    format!("{} [truncated]", &line[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn registry_config() -> LogsConfig {
        let mut cfg = LogsConfig {
            fetch_timeout_secs: 10,
            services: Default::default(),
        };
        cfg.services.insert(
            "nginx".to_string(),
            LogFetchSpec::TailFile {
                path: PathBuf::from("/var/log/nginx/error.log"),
                max_lines: 50,
            },
        );
        cfg.services.insert(
            "backup".to_string(),
            LogFetchSpec::NewestOfGlob {
                pattern: "/var/backups/backup_log_*.log".to_string(),
                max_lines: 150,
            },
        );
        cfg.services.insert(
            "syncthing".to_string(),
            LogFetchSpec::JournalQuery {
                unit: "syncthing.service".to_string(),
                user_service: true,
                max_lines: 100,
            },
        );
        cfg
    }

    #[test]
    fn test_registry_builds_one_fetcher_per_service() {
        let registry = LogRegistry::from_config(&registry_config());
        assert_eq!(registry.len(), 3);
        assert!(registry.contains("nginx"));
        assert!(registry.contains("backup"));
        assert!(registry.contains("syncthing"));
        assert!(!registry.contains("postgres"));
    }

    #[test]
    fn test_registry_dispatches_by_strategy() {
        let registry = LogRegistry::from_config(&registry_config());
        assert!(registry
            .fetcher("nginx")
            .describe()
            .contains("/var/log/nginx/error.log"));
        assert!(registry
            .fetcher("backup")
            .describe()
            .contains("backup_log_*"));
        assert!(registry
            .fetcher("syncthing")
            .describe()
            .contains("syncthing.service"));
    }

    #[test]
    fn test_unregistered_service_falls_back_to_journal() {
        let registry = LogRegistry::from_config(&registry_config());
        let fallback = registry.fetcher("postgres");
        assert!(fallback.describe().contains("postgres.service"));
    }

    #[test]
    fn test_fetch_outcome_helpers() {
        let lines = FetchOutcome::Lines(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(lines.line_count(), 2);
        assert!(!lines.is_unavailable());

        let missing = FetchOutcome::unavailable("no such file");
        assert_eq!(missing.line_count(), 0);
        assert!(missing.is_unavailable());
    }

    #[test]
    fn test_truncate_line_short_input_unchanged() {
        assert_eq!(truncate_line("short", 2000), "short");
    }

    #[test]
    fn test_truncate_line_caps_long_input() {
        let long = "x".repeat(5000);
        let truncated = truncate_line(&long, 2000);
        assert!(truncated.ends_with("[truncated]"));
        assert!(truncated.len() < long.len());
    }

    #[test]
    fn test_truncate_line_respects_utf8_boundary() {
        // Multibyte character straddling the cut point must not split.
        let line = format!("{}é tail", "a".repeat(1999));
        let truncated = truncate_line(&line, 2000);
        assert!(truncated.ends_with("[truncated]"));
    }
}
