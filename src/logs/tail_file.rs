//! Tail-file strategy: the last `max_lines` lines of a single named file
//!
//! The file is read backwards in fixed-size chunks so that tailing a large
//! log does not load the whole file into memory.

use crate::logs::{truncate_line, FetchOutcome, LogFetcher, MAX_LINE_BYTES};
use std::fs::File;
use std::future::Future;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;

pub struct TailFile {
    path: PathBuf,
    max_lines: usize,
}

impl TailFile {
    pub fn new(path: PathBuf, max_lines: usize) -> Self {
        Self { path, max_lines }
    }
}

impl LogFetcher for TailFile {
    fn describe(&self) -> String {
        format!("tail of {}", self.path.display())
    }

    fn fetch(&self) -> Pin<Box<dyn Future<Output = FetchOutcome> + Send + '_>> {
        let path = self.path.clone();
        let max_lines = self.max_lines;
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || read_tail(&path, max_lines)).await {
                Ok(outcome) => outcome,
                Err(e) => FetchOutcome::unavailable(format!("tail task failed: {e}")),
            }
        })
    }
}

fn read_tail(path: &Path, max_lines: usize) -> FetchOutcome {
    match tail_lines(path, max_lines) {
        Ok(lines) => FetchOutcome::Lines(lines),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            FetchOutcome::unavailable(format!("log file {} does not exist", path.display()))
        }
        Err(e) => FetchOutcome::unavailable(format!("failed to read {}: {e}", path.display())),
    }
}

/// Read the last `max_lines` lines of `path`, oldest first
///
/// Seeks to the end and walks backwards chunk by chunk until enough newlines
/// have been seen, then keeps only the last `max_lines` complete lines. A
/// partial line at the chunk boundary is discarded with the excess.
pub(crate) fn tail_lines(path: &Path, max_lines: usize) -> std::io::Result<Vec<String>> {
    const CHUNK: u64 = 8192;

    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len == 0 || max_lines == 0 {
        return Ok(Vec::new());
    }

    let mut buf: Vec<u8> = Vec::new();
    let mut pos = len;
    let mut newlines = 0usize;

    while pos > 0 && newlines <= max_lines {
        let read_len = CHUNK.min(pos);
        pos -= read_len;
        file.seek(SeekFrom::Start(pos))?;
        let mut chunk = vec![0u8; read_len as usize];
        file.read_exact(&mut chunk)?;
        newlines += chunk.iter().filter(|&&b| b == b'\n').count();
        chunk.extend_from_slice(&buf);
        buf = chunk;
    }

    let text = String::from_utf8_lossy(&buf);
    let mut lines: Vec<String> = text
        .lines()
        .map(|line| truncate_line(line, MAX_LINE_BYTES))
        .collect();
    if lines.len() > max_lines {
        lines = lines.split_off(lines.len() - max_lines);
    }
    Ok(lines)
}
