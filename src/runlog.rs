//! Structured run log.
//!
//! Collects one JSON object per noteworthy event and writes them as
//! `run.log.jsonl` at the end of the run. Events carry a sequence number
//! instead of wall-clock time so reruns produce identical logs. Warning
//! counters are owned by the log value and threaded through the run - no
//! ambient state.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warning,
}

#[derive(Debug, Clone, Serialize)]
struct Event {
    seq: usize,
    level: Level,
    stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ident: Option<String>,
    message: String,
}

/// Event sink for one extraction run.
#[derive(Debug, Default)]
pub struct RunLog {
    events: Vec<Event>,
    warnings: usize,
    path: Option<PathBuf>,
}

impl RunLog {
    /// A log that will be written to `path` on [`RunLog::flush`]; pass
    /// `None` to keep events in memory only (still mirrored to `tracing`).
    pub fn new(path: Option<PathBuf>) -> Self {
        RunLog {
            events: Vec::new(),
            warnings: 0,
            path,
        }
    }

    pub fn info(&mut self, stage: &str, message: impl Into<String>) {
        self.push(Level::Info, stage, None, None, None, message.into());
    }

    pub fn warning(&mut self, stage: &str, message: impl Into<String>) {
        self.push(Level::Warning, stage, None, None, None, message.into());
    }

    /// Event tied to a specific attachment.
    pub fn attachment(
        &mut self,
        level: Level,
        stage: &str,
        page: usize,
        kind: &str,
        ident: &str,
        message: impl Into<String>,
    ) {
        self.push(
            level,
            stage,
            Some(page),
            Some(kind.to_string()),
            Some(ident.to_string()),
            message.into(),
        );
    }

    fn push(
        &mut self,
        level: Level,
        stage: &str,
        page: Option<usize>,
        kind: Option<String>,
        ident: Option<String>,
        message: String,
    ) {
        if level == Level::Warning {
            self.warnings += 1;
            warn!(stage = stage, "{message}");
        } else {
            info!(stage = stage, "{message}");
        }
        self.events.push(Event {
            seq: self.events.len(),
            level,
            stage: stage.to_string(),
            page,
            kind,
            ident,
            message,
        });
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    /// Append the run summary and write the jsonl file (when configured).
    /// Log-write failures are reported but never fail the run.
    pub fn flush(&mut self) {
        let summary = format!(
            "run complete: {} event(s), {} warning(s)",
            self.events.len(),
            self.warnings
        );
        self.push(Level::Info, "summary", None, None, None, summary);

        let Some(path) = self.path.clone() else {
            return;
        };
        let mut body = String::new();
        for event in &self.events {
            match serde_json::to_string(event) {
                Ok(line) => {
                    body.push_str(&line);
                    body.push('\n');
                }
                Err(e) => warn!(error = %e, "run log serialization failed"),
            }
        }
        if let Err(e) = fs::write(&path, body) {
            warn!(path = %path.display(), error = %e, "run log write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn counts_warnings() {
        let mut log = RunLog::new(None);
        log.info("setup", "starting");
        log.warning("caption", "uncertain id skipped");
        log.warning("prune", "file busy");
        assert_eq!(log.warning_count(), 2);
    }

    #[test]
    fn flush_writes_jsonl_with_sequence_numbers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.log.jsonl");
        let mut log = RunLog::new(Some(path.clone()));
        log.info("setup", "starting");
        log.attachment(Level::Warning, "gate", 3, "figure", "2", "refined rejected");
        log.flush();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3); // two events + summary
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["seq"], 0);
        assert_eq!(first["level"], "info");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["ident"], "2");
        assert_eq!(second["page"], 3);
        let last: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(last["stage"], "summary");
    }

    #[test]
    fn flush_without_path_is_silent() {
        let mut log = RunLog::new(None);
        log.info("setup", "x");
        log.flush();
        assert_eq!(log.warning_count(), 0);
    }
}
