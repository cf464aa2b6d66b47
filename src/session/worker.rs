//! Worker-process side of a recording session.
//!
//! The parent serializes a [`WorkerSpec`] into the session's control
//! directory and launches `labsync worker --spec <path>`. The worker opens its
//! flags, builds the device named in the spec file, and polls it until the
//! stop flag is set. Whatever happens, it leaves a report behind, and on
//! failure it sets the `failed` flag after the report is on disk.

use crate::clock::Clock;
use crate::device::{ChannelLayout, GloveBackend, KeyboardBackend};
use crate::error::{RecorderError, Result};
use crate::session::control::{report_path, Signals};
use crate::session::glove::record_glove;
use crate::session::report::WorkerReport;
use crate::session::trigger::record_triggers;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[cfg(unix)]
use crate::signal::SharedFlag;
#[cfg(unix)]
use std::{thread, time::Duration};

#[cfg(unix)]
const PARENT_POLL: Duration = Duration::from_millis(100);

/// What a worker records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum WorkerTask {
    Glove {
        port: String,
        channels: ChannelLayout,
        backend: GloveBackend,
    },
    Trigger {
        key: String,
        backend: KeyboardBackend,
    },
}

impl WorkerTask {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerTask::Glove { .. } => "glove",
            WorkerTask::Trigger { .. } => "trigger",
        }
    }

    /// Whether the session carries a first-event flag.
    pub fn wants_first_event(&self) -> bool {
        matches!(self, WorkerTask::Trigger { .. })
    }

    pub fn reads_stdin(&self) -> bool {
        match self {
            WorkerTask::Trigger { backend, .. } => backend.reads_stdin(),
            WorkerTask::Glove { .. } => false,
        }
    }
}

/// Everything a worker process needs to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub log_path: PathBuf,
    pub control_dir: PathBuf,
    pub task: WorkerTask,
}

impl WorkerSpec {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| RecorderError::Spec(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| RecorderError::Spec(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RecorderError::Spec(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&content).map_err(|e| RecorderError::Spec(e.to_string()))
    }
}

/// Entry point of the `worker` subcommand.
///
/// Errors are returned only when the spec file or the flags cannot be loaded;
/// the parent then sees the worker exit without becoming ready. Device and log
/// failures are reported through the returned report and the `failed` flag.
pub fn run_worker(spec_path: &Path) -> Result<WorkerReport> {
    let spec = WorkerSpec::load(spec_path)?;
    let signals = Signals::open(&spec.control_dir, spec.task.wants_first_event())?;
    #[cfg(unix)]
    watch_parent(signals.stop.clone());
    Ok(execute(&spec, &signals))
}

/// Raise `stop` once the launching process is gone, so a killed parent does
/// not leave the worker polling with nobody to stop it.
#[cfg(unix)]
fn watch_parent(stop: SharedFlag) {
    let parent = std::os::unix::process::parent_id();
    let spawned = thread::Builder::new()
        .name("parent-watch".into())
        .spawn(move || {
            while !stop.is_set() {
                if std::os::unix::process::parent_id() != parent {
                    warn!(parent, "launching process exited, stopping");
                    stop.set();
                    return;
                }
                thread::sleep(PARENT_POLL);
            }
        });
    if let Err(e) = spawned {
        warn!("could not watch the launching process: {e}");
    }
}

/// Run the task's polling loop against already-open signals.
pub fn execute(spec: &WorkerSpec, signals: &Signals) -> WorkerReport {
    let clock = Clock::new();
    let mut report = WorkerReport::new(spec.task.name(), &spec.log_path);
    info!(task = spec.task.name(), pid = std::process::id(), "worker starting");

    let result = match &spec.task {
        WorkerTask::Glove {
            port,
            channels,
            backend,
        } => {
            let mut device = backend.build();
            record_glove(
                device.as_mut(),
                port,
                channels,
                &spec.log_path,
                signals,
                &clock,
                &mut report,
            )
        }
        WorkerTask::Trigger { key, backend } => {
            let mut device = backend.build();
            record_triggers(
                device.as_mut(),
                key,
                &spec.log_path,
                signals,
                &clock,
                &mut report,
            )
        }
    };

    report.finished_at = Utc::now();
    if let Err(e) = &result {
        error!(task = spec.task.name(), "worker failed: {e}");
        report.failure = Some(e.into());
    }
    if let Err(e) = report.save(&report_path(&spec.control_dir)) {
        warn!("could not write worker report: {e}");
    }
    if result.is_err() {
        signals.failed.set();
    }
    info!("{}", report.summary());
    report
}
