//! Busy indicators for long-running session actions.
//!
//! Ingestion (parsing, chunking, embedding) and answering block until the
//! external work finishes. Reporters tell the user what is happening on
//! **stderr** so stdout stays reserved for answers.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// Files are being read and parsed.
    Loading { files: usize },
    /// Text was extracted and split.
    Split { segments: usize, chunks: usize },
    /// `n` of `total` chunks embedded so far.
    Embedding { n: usize, total: usize },
    /// The new index is live.
    Ready { chunks: usize },
    /// Retrieval and generation for a question are running.
    Thinking,
}

/// Receives progress events from a session.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Loading { files } => format!("loading {} file(s)...\n", files),
            ProgressEvent::Split { segments, chunks } => format!(
                "loaded {} page(s), created {} chunk(s)\n",
                format_number(*segments as u64),
                format_number(*chunks as u64)
            ),
            ProgressEvent::Embedding { n, total } => format!(
                "embedding  {} / {} chunks\n",
                format_number(*n as u64),
                format_number(*total as u64)
            ),
            ProgressEvent::Ready { chunks } => {
                format!("index ready ({} chunks)\n", format_number(*chunks as u64))
            }
            ProgressEvent::Thinking => "thinking...\n".to_string(),
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
            ProgressEvent::Loading { files } => serde_json::json!({
                "event": "progress",
                "phase": "loading",
                "files": files
            }),
            ProgressEvent::Split { segments, chunks } => serde_json::json!({
                "event": "progress",
                "phase": "split",
                "segments": segments,
                "chunks": chunks
            }),
            ProgressEvent::Embedding { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "n": n,
                "total": total
            }),
            ProgressEvent::Ready { chunks } => serde_json::json!({
                "event": "progress",
                "phase": "ready",
                "chunks": chunks
            }),
            ProgressEvent::Thinking => serde_json::json!({
                "event": "progress",
                "phase": "thinking"
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

fn format_number(n: u64) -> String {
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
