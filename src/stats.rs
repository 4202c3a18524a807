//! Human-readable corpus listing and summary.
//!
//! Renders what `intake ingest` prints after a run: files grouped by format
//! with status, size, extracted length (or the error), and when they
//! finished; followed by status counts.

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::models::{IngestSummary, IngestedFile};
use crate::progress::format_number;

/// Per-format table of records, then unsupported files under "Other".
pub fn render_listing(records: &[IngestedFile], now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let mut formats = Vec::new();
    for record in records {
        if let Some(format) = record.format {
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
    }

    for format in formats {
        let group: Vec<&IngestedFile> = records.iter().filter(|r| r.format == Some(format)).collect();
        render_group(&mut out, &format!("{} files", format), &group, now);
    }
    let other: Vec<&IngestedFile> = records.iter().filter(|r| r.format.is_none()).collect();
    if !other.is_empty() {
        render_group(&mut out, "Other files", &other, now);
    }
    out
}

fn render_group(out: &mut String, title: &str, group: &[&IngestedFile], now: DateTime<Utc>) {
    let _ = writeln!(out, "{} ({})", title, group.len());
    let _ = writeln!(
        out,
        "  {:<32} {:<11} {:>9} {:>9}   {}",
        "FILE", "STATUS", "SIZE", "CHARS", "WHEN"
    );
    let _ = writeln!(out, "  {}", "-".repeat(76));
    for file in group {
        let chars = file
            .content_length()
            .map(|n| format_number(n as u64))
            .unwrap_or_else(|| "-".to_string());
        let when = file
            .processed_at()
            .or(file.failed_at())
            .map(|ts| format_ts_relative(ts, now))
            .unwrap_or_else(|| "in progress".to_string());
        let _ = writeln!(
            out,
            "  {:<32} {:<11} {:>9} {:>9}   {}",
            file.filename,
            file.status(),
            format_bytes(file.size_bytes),
            chars,
            when
        );
        if let Some(error) = file.error_detail() {
            let _ = writeln!(out, "      error: {}", error);
        }
    }
    out.push('\n');
}

pub fn render_summary(summary: &IngestSummary) -> String {
    format!(
        "Summary: {} file{}  ({} completed, {} failed, {} processing)\n",
        summary.total,
        if summary.total == 1 { "" } else { "s" },
        summary.completed,
        summary.failed,
        summary.processing
    )
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Relative time (e.g. "3 mins ago"), falling back to an absolute stamp.
fn format_ts_relative(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - ts).num_seconds();

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}
