//! Journal-query strategy: recent entries for a systemd unit
//!
//! Shells out to `journalctl` with a hard timeout. The child is spawned with
//! `kill_on_drop` so an abandoned query cannot linger past its deadline.
//! Every failure, including a missing binary or an expired deadline, degrades
//! to an unavailable outcome.

use crate::logs::{truncate_line, FetchOutcome, LogFetcher, MAX_LINE_BYTES};
use std::future::Future;
use std::io::ErrorKind;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub struct JournalQuery {
    unit: String,
    user_service: bool,
    max_lines: usize,
    timeout: Duration,
    program: String,
}

impl JournalQuery {
    pub fn new(unit: String, user_service: bool, max_lines: usize, timeout: Duration) -> Self {
        Self {
            unit,
            user_service,
            max_lines,
            timeout,
            program: "journalctl".to_string(),
        }
    }

    #[cfg(test)]
    fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.user_service {
            args.push("--user".to_string());
        }
        args.extend([
            "-u".to_string(),
            self.unit.clone(),
            "-n".to_string(),
            self.max_lines.to_string(),
            "--no-pager".to_string(),
        ]);
        args
    }

    async fn run(&self) -> FetchOutcome {
        let mut command = Command::new(&self.program);
        command
            .args(self.build_args())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => {
                return FetchOutcome::unavailable(format!(
                    "journal query for {} timed out after {}s",
                    self.unit,
                    self.timeout.as_secs()
                ));
            }
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                return FetchOutcome::unavailable("journalctl is not available on this host");
            }
            Ok(Err(e)) => {
                return FetchOutcome::unavailable(format!("failed to run journalctl: {e}"));
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return FetchOutcome::unavailable(format!(
                "journalctl exited with {} for unit {}: {}",
                output.status,
                self.unit,
                stderr.trim()
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines: Vec<String> = stdout
            .lines()
            .map(|line| truncate_line(line, MAX_LINE_BYTES))
            .collect();
        // The -n flag already bounds the output; this guards against a
        // journalctl that ignores it.
        if lines.len() > self.max_lines {
            lines = lines.split_off(lines.len() - self.max_lines);
        }
        FetchOutcome::Lines(lines)
    }
}

impl LogFetcher for JournalQuery {
    fn describe(&self) -> String {
        if self.user_service {
            format!("user journal for {}", self.unit)
        } else {
            format!("journal for {}", self.unit)
        }
    }

    fn fetch(&self) -> Pin<Box<dyn Future<Output = FetchOutcome> + Send + '_>> {
        Box::pin(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(unit: &str) -> JournalQuery {
        JournalQuery::new(unit.to_string(), false, 100, Duration::from_secs(5))
    }

    #[test]
    fn test_args_for_system_unit() {
        let args = query("nginx.service").build_args();
        assert_eq!(args, vec!["-u", "nginx.service", "-n", "100", "--no-pager"]);
    }

    #[test]
    fn test_args_for_user_unit() {
        let args =
            JournalQuery::new("syncthing.service".to_string(), true, 50, Duration::from_secs(5))
                .build_args();
        assert_eq!(
            args,
            vec!["--user", "-u", "syncthing.service", "-n", "50", "--no-pager"]
        );
    }

    #[test]
    fn test_describe_names_the_unit() {
        assert_eq!(query("redis.service").describe(), "journal for redis.service");
        assert_eq!(
            JournalQuery::new("st.service".to_string(), true, 10, Duration::from_secs(1))
                .describe(),
            "user journal for st.service"
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let outcome = query("any.service")
            .with_program("/nonexistent/journalctl-for-tests")
            .fetch()
            .await;

        match outcome {
            FetchOutcome::Unavailable { reason } => {
                assert!(reason.contains("not available"), "reason: {reason}")
            }
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_unavailable() {
        let outcome = query("any.service").with_program("false").fetch().await;

        match outcome {
            FetchOutcome::Unavailable { reason } => {
                assert!(reason.contains("exited with"), "reason: {reason}")
            }
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_successful_output_becomes_lines() {
        // `echo` prints the argument list as a single line and exits zero.
        let outcome = query("any.service").with_program("echo").fetch().await;
        assert_eq!(outcome.line_count(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hanging_query_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-journalctl");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let outcome = JournalQuery::new(
            "any.service".to_string(),
            false,
            100,
            Duration::from_millis(200),
        )
        .with_program(&script.display().to_string())
        .fetch()
        .await;

        match outcome {
            FetchOutcome::Unavailable { reason } => {
                assert!(reason.contains("timed out"), "reason: {reason}")
            }
            other => panic!("expected unavailable, got {other:?}"),
        }
    }
}
