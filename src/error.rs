//! Error types shared by recorders, workers, and the append logger.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while recording or synchronizing.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// The device capability could not be acquired by a worker at startup.
    #[error("failed to open device: {0}")]
    DeviceOpenFailure(String),

    /// A read from an already-open device failed.
    #[error("failed to read from device: {0}")]
    DeviceReadFailure(String),

    #[error("failed to write log {path}: {source}")]
    LogWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no trigger pulse received within {0:?}")]
    SynchronizationTimeout(Duration),

    /// A wait was abandoned because the operator cancelled it.
    #[error("interrupted")]
    Interrupted,

    #[error("invalid channel layout: {0}")]
    InvalidLayout(String),

    /// The worker reported a failure through its failed flag.
    #[error("worker failed: {0}")]
    WorkerFailed(String),

    /// The worker exited without signalling readiness or failure.
    #[error("worker exited unexpectedly ({0})")]
    WorkerExited(String),

    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("shared flag {path}: {source}")]
    Flag {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to present stimulus: {0}")]
    Presentation(#[source] std::io::Error),

    #[error("invalid worker spec: {0}")]
    Spec(String),

    #[error("worker did not become ready within {0:?}")]
    NotReady(Duration),

    #[error("session has not been started")]
    NotStarted,

    #[error("session is already running")]
    AlreadyRunning,

    #[error("session has already been stopped; construct a new one")]
    AlreadyStopped,
}

impl RecorderError {
    pub(crate) fn log_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RecorderError::LogWriteFailure {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn flag(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RecorderError::Flag {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = RecorderError> = std::result::Result<T, E>;
