//! Ingest progress reporting.
//!
//! Reports what `intake` is doing while files are collected and processed so
//! long transcriptions do not look like a hang. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use crate::models::{FileStatus, Outcome};

/// A single progress event.
#[derive(Clone, Debug)]
pub enum IngestProgressEvent {
    /// Walking an input path. Total unknown.
    Discovering { path: String },
    /// About to process file `n` of `total`.
    Processing {
        filename: String,
        n: u64,
        total: u64,
    },
    /// A file reached a terminal status (or was skipped).
    Finished {
        filename: String,
        outcome: Outcome,
        status: Option<FileStatus>,
    },
}

/// Reports ingest progress. Implementations write to stderr (human or JSON).
pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr: "ingest  processing  3 / 1,204  talk.mp4".
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Discovering { path } => {
                format!("ingest  discovering {}...\n", path)
            }
            IngestProgressEvent::Processing { filename, n, total } => format!(
                "ingest  processing  {} / {}  {}\n",
                format_number(*n),
                format_number(*total),
                filename
            ),
            IngestProgressEvent::Finished {
                filename,
                outcome,
                status,
            } => {
                let label = match (outcome, status) {
                    (Outcome::DuplicateSkipped, _) => "skipped (duplicate)".to_string(),
                    (Outcome::Accepted, Some(status)) => status.to_string(),
                    (Outcome::Accepted, None) => "done".to_string(),
                };
                format!("ingest  {}  {}\n", label, filename)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &IngestProgressEvent) -> serde_json::Value {
        match event {
            IngestProgressEvent::Discovering { path } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "path": path
            }),
            IngestProgressEvent::Processing { filename, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "processing",
                "filename": filename,
                "n": n,
                "total": total
            }),
            IngestProgressEvent::Finished {
                filename,
                outcome,
                status,
            } => serde_json::json!({
                "event": "progress",
                "phase": "finished",
                "filename": filename,
                "outcome": outcome,
                "status": status
            }),
        }
    }
}

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

/// Decimal with thousands separators: 1234567 -> "1,234,567".
pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
