//! Newest-of-glob strategy: tail the most recently modified file matching a
//! pattern
//!
//! Used for sources that rotate into timestamped files. Ties on modification
//! time break towards the lexicographically greatest path, which for
//! date-stamped names is also the newest.

use crate::logs::tail_file::tail_lines;
use crate::logs::{FetchOutcome, LogFetcher};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::SystemTime;

pub struct NewestGlob {
    pattern: String,
    max_lines: usize,
}

impl NewestGlob {
    pub fn new(pattern: String, max_lines: usize) -> Self {
        Self { pattern, max_lines }
    }
}

impl LogFetcher for NewestGlob {
    fn describe(&self) -> String {
        format!("newest file matching {}", self.pattern)
    }

    fn fetch(&self) -> Pin<Box<dyn Future<Output = FetchOutcome> + Send + '_>> {
        let pattern = self.pattern.clone();
        let max_lines = self.max_lines;
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || resolve_and_tail(&pattern, max_lines)).await {
                Ok(outcome) => outcome,
                Err(e) => FetchOutcome::unavailable(format!("glob task failed: {e}")),
            }
        })
    }
}

fn resolve_and_tail(pattern: &str, max_lines: usize) -> FetchOutcome {
    let newest = match newest_match(pattern) {
        Ok(Some(path)) => path,
        Ok(None) => {
            return FetchOutcome::unavailable(format!("no files match {pattern}"));
        }
        Err(e) => {
            return FetchOutcome::unavailable(format!("invalid glob pattern {pattern}: {e}"));
        }
    };

    match tail_lines(&newest, max_lines) {
        Ok(lines) => FetchOutcome::Lines(lines),
        Err(e) => FetchOutcome::unavailable(format!("failed to read {}: {e}", newest.display())),
    }
}

/// The matching file with the greatest modification time, ties broken by
/// path order; `None` when nothing matches
fn newest_match(pattern: &str) -> Result<Option<PathBuf>, glob::PatternError> {
    let mut candidates: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in glob::glob(pattern)? {
        let path = match entry {
            Ok(path) => path,
            // Unreadable directory entries are skipped, not fatal.
            Err(_) => continue,
        };
        if !path.is_file() {
            continue;
        }
        let modified = match std::fs::metadata(&path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(_) => continue,
        };
        candidates.push((modified, path));
    }

    Ok(candidates
        .into_iter()
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{File, FileTimes, OpenOptions};
    use std::io::Write;
    use std::time::Duration;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        write!(file, "{contents}").unwrap();
        path
    }

    fn set_modified(path: &PathBuf, age: Duration) {
        let file = OpenOptions::new().write(true).open(path).unwrap();
        file.set_times(FileTimes::new().set_modified(SystemTime::now() - age))
            .unwrap();
    }

    #[tokio::test]
    async fn test_selects_most_recently_modified() {
        let dir = tempfile::tempdir().unwrap();
        let older = write_file(&dir, "a_2024-01-01.log", "january\n");
        let newer = write_file(&dir, "a_2024-02-01.log", "february\n");
        set_modified(&older, Duration::from_secs(3600));
        set_modified(&newer, Duration::from_secs(60));

        let pattern = dir.path().join("a_*.log").display().to_string();
        let outcome = NewestGlob::new(pattern, 10).fetch().await;
        assert_eq!(outcome, FetchOutcome::Lines(vec!["february".to_string()]));
    }

    #[tokio::test]
    async fn test_mtime_tie_breaks_to_greatest_path() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_file(&dir, "run_1.log", "one\n");
        let second = write_file(&dir, "run_2.log", "two\n");
        let shared = SystemTime::now() - Duration::from_secs(120);
        for path in [&first, &second] {
            let file = OpenOptions::new().write(true).open(path).unwrap();
            file.set_times(FileTimes::new().set_modified(shared)).unwrap();
        }

        let pattern = dir.path().join("run_*.log").display().to_string();
        let outcome = NewestGlob::new(pattern, 10).fetch().await;
        assert_eq!(outcome, FetchOutcome::Lines(vec!["two".to_string()]));
    }

    #[tokio::test]
    async fn test_no_match_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("nothing_*.log").display().to_string();

        let outcome = NewestGlob::new(pattern.clone(), 10).fetch().await;
        match outcome {
            FetchOutcome::Unavailable { reason } => {
                assert!(reason.contains("no files match"), "reason: {reason}")
            }
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_unavailable() {
        let outcome = NewestGlob::new("[".to_string(), 10).fetch().await;
        assert!(outcome.is_unavailable());
    }

    #[tokio::test]
    async fn test_cap_applies_to_selected_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut contents = String::new();
        for i in 0..400 {
            contents.push_str(&format!("entry {i}\n"));
        }
        write_file(&dir, "backup_log_2024-06-01.log", &contents);

        let pattern = dir.path().join("backup_log_*.log").display().to_string();
        let outcome = NewestGlob::new(pattern, 150).fetch().await;
        assert_eq!(outcome.line_count(), 150);
    }

    #[test]
    fn test_directories_are_not_candidates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("archive.log")).unwrap();
        let file = write_file(&dir, "current.log", "data\n");
        set_modified(&file, Duration::from_secs(30));

        let pattern = dir.path().join("*.log").display().to_string();
        let newest = newest_match(&pattern).unwrap().unwrap();
        assert_eq!(newest, file);
    }
}
