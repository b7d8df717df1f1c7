//! Ingest progress reporting.
//!
//! Reports observable progress during `prag ingest` so users see which
//! source is being scanned and how many files are left. Progress is emitted
//! on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for ingestion.
#[derive(Clone, Debug)]
pub enum IngestProgressEvent {
    /// Walking a source directory or calling a remote API. Total unknown.
    Discovering { source: String },
    /// Files chunked so far for this source, out of `total`.
    Ingesting { source: String, n: u64, total: u64 },
    /// A batch for this source was embedded and saved.
    Stored { source: String, chunks: u64 },
}

/// Reports ingest progress. Implementations write to stderr (human or JSON).
pub trait IngestProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the ingest pipeline.
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr: "ingest hr  chunking  12 / 40 files".
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Discovering { source } => {
                format!("ingest {}  discovering...\n", source)
            }
            IngestProgressEvent::Ingesting { source, n, total } => format!(
                "ingest {}  chunking  {} / {} files\n",
                source,
                format_number(*n),
                format_number(*total)
            ),
            IngestProgressEvent::Stored { source, chunks } => format!(
                "ingest {}  stored  {} chunks\n",
                source,
                format_number(*chunks)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let obj = match &event {
            IngestProgressEvent::Discovering { source } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "discovering"
            }),
            IngestProgressEvent::Ingesting { source, n, total } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "chunking",
                "n": n,
                "total": total
            }),
            IngestProgressEvent::Stored { source, chunks } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "stored",
                "chunks": chunks
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

fn format_number(n: u64) -> String {
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

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
