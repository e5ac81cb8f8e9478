//! Run progress reporting.
//!
//! Reports observable progress during `ledger extract`, `ledger resolve`
//! and `ledger run` so users see how many records were found, how many
//! are left to date, and when the store was last checkpointed.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The report snapshot was parsed.
    Extracted { records: u64, categories: u64 },
    /// Extracted records were reconciled with the store.
    Merged { total: u64, added: u64 },
    /// n resolver attempts finished out of total pending.
    Resolving { n: u64, total: u64 },
    /// The store was saved with n of total attempts applied.
    Checkpoint { n: u64, total: u64 },
    /// Resolution finished.
    Done { resolved: u64, exhausted: u64 },
}

/// Reports run progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the pipeline.
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "resolve  1,234 / 5,000 records".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Extracted {
                records,
                categories,
            } => format!(
                "extract  {} records in {} categories\n",
                format_number(*records),
                format_number(*categories)
            ),
            ProgressEvent::Merged { total, added } => format!(
                "merge  {} records ({} new)\n",
                format_number(*total),
                format_number(*added)
            ),
            ProgressEvent::Resolving { n, total } => format!(
                "resolve  {} / {} records\n",
                format_number(*n),
                format_number(*total)
            ),
            ProgressEvent::Checkpoint { n, total } => format!(
                "resolve  saved at {} / {}\n",
                format_number(*n),
                format_number(*total)
            ),
            ProgressEvent::Done {
                resolved,
                exhausted,
            } => format!(
                "resolve  done: {} dated, {} exhausted\n",
                format_number(*resolved),
                format_number(*exhausted)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Extracted {
                records,
                categories,
            } => serde_json::json!({
                "event": "progress",
                "phase": "extracted",
                "records": records,
                "categories": categories
            }),
            ProgressEvent::Merged { total, added } => serde_json::json!({
                "event": "progress",
                "phase": "merged",
                "total": total,
                "added": added
            }),
            ProgressEvent::Resolving { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "resolving",
                "n": n,
                "total": total
            }),
            ProgressEvent::Checkpoint { n, total } => serde_json::json!({
                "event": "checkpoint",
                "n": n,
                "total": total
            }),
            ProgressEvent::Done {
                resolved,
                exhausted,
            } => serde_json::json!({
                "event": "done",
                "resolved": resolved,
                "exhausted": exhausted
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
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

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1), "1");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
