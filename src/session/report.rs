//! Statistics a worker leaves behind when it exits.
//!
//! The report is the only data that flows back from a worker to its parent,
//! and it is only read after the `failed` flag is set or the worker exits.

use crate::error::RecorderError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Broad class of a worker failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    DeviceOpen,
    DeviceRead,
    LogWrite,
    Other,
}

/// Why a worker gave up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl WorkerFailure {
    /// Rebuild the error on the parent side. `log_path` fills in the path of
    /// log failures, which only the parent knows to report.
    pub fn into_error(self, log_path: &Path) -> RecorderError {
        match self.kind {
            FailureKind::DeviceOpen => RecorderError::DeviceOpenFailure(self.message),
            FailureKind::DeviceRead => RecorderError::DeviceReadFailure(self.message),
            FailureKind::LogWrite => {
                RecorderError::log_write(log_path, std::io::Error::other(self.message))
            }
            FailureKind::Other => RecorderError::WorkerFailed(self.message),
        }
    }
}

impl From<&RecorderError> for WorkerFailure {
    fn from(err: &RecorderError) -> Self {
        let (kind, message) = match err {
            RecorderError::DeviceOpenFailure(m) => (FailureKind::DeviceOpen, m.clone()),
            RecorderError::DeviceReadFailure(m) => (FailureKind::DeviceRead, m.clone()),
            RecorderError::LogWriteFailure { source, .. } => {
                (FailureKind::LogWrite, source.to_string())
            }
            other => (FailureKind::Other, other.to_string()),
        };
        Self { kind, message }
    }
}

/// Counters for one worker run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    /// `glove` or `trigger`.
    pub task: String,
    pub log_path: PathBuf,
    /// Device polls performed.
    pub polls: u64,
    /// Data rows written to the log.
    pub rows_written: u64,
    /// Clock time of the first detected pulse, for trigger workers.
    pub first_event_at: Option<f64>,
    pub finished_at: DateTime<Utc>,
    pub failure: Option<WorkerFailure>,
}

impl WorkerReport {
    pub fn new(task: impl Into<String>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            task: task.into(),
            log_path: log_path.into(),
            polls: 0,
            rows_written: 0,
            first_event_at: None,
            finished_at: Utc::now(),
            failure: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let outcome = match &self.failure {
            None => "ok".to_string(),
            Some(f) => format!("failed ({:?}): {}", f.kind, f.message),
        };
        format!(
            "{} recorder: {} rows from {} polls -> {} [{}]",
            self.task,
            self.rows_written,
            self.polls,
            self.log_path.display(),
            outcome
        )
    }

    /// Write the report to disk.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Read a report, returning `None` if the worker never wrote one.
    pub fn load(path: &Path) -> Result<Option<Self>, std::io::Error> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let report = serde_json::from_str(&content).map_err(std::io::Error::other)?;
        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let mut report = WorkerReport::new("glove", "/tmp/glove.tsv");
        report.polls = 20;
        report.rows_written = 10;
        report.save(&path).unwrap();

        let loaded = WorkerReport::load(&path).unwrap().unwrap();
        assert_eq!(loaded, report);
        assert!(loaded.succeeded());
    }

    #[test]
    fn test_missing_report_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(WorkerReport::load(&dir.path().join("report.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_failure_round_trips_error_kind() {
        let err = RecorderError::DeviceOpenFailure("no glove found on port USB0".into());
        let failure = WorkerFailure::from(&err);
        assert_eq!(failure.kind, FailureKind::DeviceOpen);

        match failure.into_error(Path::new("glove.tsv")) {
            RecorderError::DeviceOpenFailure(msg) => assert!(msg.contains("USB0")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_summary_mentions_failure() {
        let mut report = WorkerReport::new("trigger", "TRs.tsv");
        report.failure = Some(WorkerFailure {
            kind: FailureKind::DeviceRead,
            message: "unplugged".into(),
        });
        let summary = report.summary();
        assert!(summary.contains("trigger recorder"));
        assert!(summary.contains("unplugged"));
        assert!(!report.succeeded());
    }
}
