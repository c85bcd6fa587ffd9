//! Run progress reporting.
//!
//! Progress goes to **stderr** so stdout stays reserved for the final
//! summary. Structured diagnostics go through `tracing`; this module is
//! only for the user-facing "where are we" lines.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// A search results page was collected.
    Searching {
        query: String,
        page: u64,
        items: u64,
        total_hits: Option<u64>,
    },
    /// `done` of `total` pending downloads have settled.
    Downloading {
        query: String,
        done: u64,
        total: u64,
        downloaded: u64,
        skipped: u64,
        failed: u64,
    },
    Extracting {
        done: u64,
        total: u64,
    },
    Deduplicating {
        documents: u64,
    },
}

/// Reports progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: `download "passport"  [120/1,450]  dl=117 skip=40 fail=3`.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Searching {
                query,
                page,
                items,
                total_hits,
            } => match total_hits {
                Some(total) => format!(
                    "search {:?}  page {}  {} / {} items\n",
                    query,
                    page,
                    format_number(*items),
                    format_number(*total)
                ),
                None => format!(
                    "search {:?}  page {}  {} items\n",
                    query,
                    page,
                    format_number(*items)
                ),
            },
            ProgressEvent::Downloading {
                query,
                done,
                total,
                downloaded,
                skipped,
                failed,
            } => format!(
                "download {:?}  [{}/{}]  dl={} skip={} fail={}\n",
                query,
                format_number(*done),
                format_number(*total),
                downloaded,
                skipped,
                failed
            ),
            ProgressEvent::Extracting { done, total } => format!(
                "extract  {} / {} files\n",
                format_number(*done),
                format_number(*total)
            ),
            ProgressEvent::Deduplicating { documents } => {
                format!("dedupe  {} documents\n", format_number(*documents))
            }
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
            ProgressEvent::Searching {
                query,
                page,
                items,
                total_hits,
            } => serde_json::json!({
                "event": "progress",
                "phase": "searching",
                "query": query,
                "page": page,
                "items": items,
                "total_hits": total_hits
            }),
            ProgressEvent::Downloading {
                query,
                done,
                total,
                downloaded,
                skipped,
                failed,
            } => serde_json::json!({
                "event": "progress",
                "phase": "downloading",
                "query": query,
                "n": done,
                "total": total,
                "downloaded": downloaded,
                "skipped": skipped,
                "failed": failed
            }),
            ProgressEvent::Extracting { done, total } => serde_json::json!({
                "event": "progress",
                "phase": "extracting",
                "n": done,
                "total": total
            }),
            ProgressEvent::Deduplicating { documents } => serde_json::json!({
                "event": "progress",
                "phase": "deduplicating",
                "documents": documents
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
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
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

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
