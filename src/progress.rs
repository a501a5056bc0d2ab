//! Ingestion progress reporting.
//!
//! The orchestrator reports after each file so users see what is being
//! processed and how much is left. Progress is emitted on **stderr** so
//! stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event during an ingestion run.
#[derive(Clone, Debug)]
pub enum IngestProgressEvent {
    /// Folder walk in progress; total not yet known.
    Discovering { project: String },
    /// One file finished with the given outcome.
    FileDone {
        project: String,
        file: String,
        status: &'static str,
        n: u64,
        total: u64,
    },
}

/// Reports ingestion progress. Implementations write to stderr.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress: "ingest marina-t2  12 / 40  ITT.pdf indexed".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Discovering { project } => {
                format!("ingest {}  discovering...\n", project)
            }
            IngestProgressEvent::FileDone {
                project,
                file,
                status,
                n,
                total,
            } => {
                format!("ingest {}  {} / {}  {} {}\n", project, n, total, file, status)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let obj = match &event {
            IngestProgressEvent::Discovering { project } => serde_json::json!({
                "event": "progress",
                "project": project,
                "phase": "discovering"
            }),
            IngestProgressEvent::FileDone {
                project,
                file,
                status,
                n,
                total,
            } => serde_json::json!({
                "event": "progress",
                "project": project,
                "phase": "ingesting",
                "file": file,
                "status": status,
                "n": n,
                "total": total
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
    fn report(&self, _event: IngestProgressEvent) {}
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

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
