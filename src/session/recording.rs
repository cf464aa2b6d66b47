//! Parent-side lifecycle of an isolated recorder worker.
//!
//! ```text
//! Idle ──start()──▶ Running ──stop()──▶ Stopping ──worker exits──▶ Stopped
//! ```
//!
//! A stopped session cannot be restarted; construct a new one.

use crate::error::{RecorderError, Result};
use crate::session::control::{report_path, spec_path, Signals};
use crate::session::report::WorkerReport;
use crate::session::worker::{WorkerSpec, WorkerTask};
use crate::signal::SharedFlag;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Interval at which `wait_ready` re-checks the worker.
const READY_POLL: Duration = Duration::from_millis(5);

/// How to launch a worker process.
///
/// The worker is invoked as `<program> <args...> --spec <path>`.
#[derive(Debug, Clone)]
pub struct Launcher {
    program: PathBuf,
    args: Vec<OsString>,
}

impl Launcher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Re-run the current executable with its `worker` subcommand.
    pub fn current_exe() -> Result<Self> {
        let exe = std::env::current_exe().map_err(RecorderError::Spawn)?;
        Ok(Self::new(exe).arg("worker"))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn command(&self, spec: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg("--spec").arg(spec);
        cmd
    }
}

/// Lifecycle of a [`RecordingSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Owns one worker process and the flags used to talk to it.
///
/// The worker alone writes the log; the parent only sets `stop` and reads
/// the flags and report the worker leaves behind.
pub struct RecordingSession {
    log_path: PathBuf,
    task: WorkerTask,
    launcher: Launcher,
    state: SessionState,
    control: Option<TempDir>,
    signals: Option<Signals>,
    child: Option<Child>,
    exit_status: Option<ExitStatus>,
}

impl RecordingSession {
    pub fn new(log_path: impl Into<PathBuf>, task: WorkerTask, launcher: Launcher) -> Self {
        Self {
            log_path: log_path.into(),
            task,
            launcher,
            state: SessionState::Idle,
            control: None,
            signals: None,
            child: None,
            exit_status: None,
        }
    }

    /// Create the session's flags and launch the worker.
    ///
    /// Returns as soon as the process is spawned; use
    /// [`wait_ready`](Self::wait_ready) to wait for the device to open.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Running | SessionState::Stopping => {
                return Err(RecorderError::AlreadyRunning)
            }
            SessionState::Stopped => return Err(RecorderError::AlreadyStopped),
        }

        let control = tempfile::Builder::new()
            .prefix(&format!("labsync-{}-", self.task.name()))
            .tempdir()
            .map_err(RecorderError::Spawn)?;
        let signals = Signals::create(control.path(), self.task.wants_first_event())?;

        let spec = WorkerSpec {
            log_path: self.log_path.clone(),
            control_dir: control.path().to_path_buf(),
            task: self.task.clone(),
        };
        let spec_file = spec_path(control.path());
        spec.save(&spec_file)?;

        let stdin = if self.task.reads_stdin() {
            Stdio::inherit()
        } else {
            Stdio::null()
        };
        let child = self
            .launcher
            .command(&spec_file)
            .stdin(stdin)
            .spawn()
            .map_err(RecorderError::Spawn)?;

        info!(
            task = self.task.name(),
            pid = child.id(),
            log = %self.log_path.display(),
            "worker launched"
        );

        self.control = Some(control);
        self.signals = Some(signals);
        self.child = Some(child);
        self.state = SessionState::Running;
        Ok(())
    }

    /// Wait until the worker has opened its device and log.
    ///
    /// Fails with the worker's own error if it reports one, with
    /// `WorkerExited` if it dies silently, and with `NotReady` on timeout.
    pub fn wait_ready(&mut self, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        loop {
            let ready = match &self.signals {
                Some(signals) => signals.ready.is_set(),
                None => return Err(RecorderError::NotStarted),
            };
            if ready {
                return Ok(());
            }
            if self.state != SessionState::Running {
                return Err(self.failure().unwrap_or(RecorderError::AlreadyStopped));
            }
            self.check_alive()?;
            if started.elapsed() >= timeout {
                return Err(RecorderError::NotReady(timeout));
            }
            std::thread::sleep(READY_POLL);
        }
    }

    /// Non-blocking health check of a started worker.
    ///
    /// `Ok` while the worker is running (or exited cleanly after a stop);
    /// otherwise the failure the worker reported or its exit status.
    pub fn check_alive(&mut self) -> Result<()> {
        if let Some(err) = self.failure() {
            return Err(err);
        }
        if self.exit_status.is_none() {
            if let Some(child) = self.child.as_mut() {
                match child.try_wait() {
                    Ok(Some(status)) => self.exit_status = Some(status),
                    Ok(None) => {}
                    Err(e) => warn!("could not poll worker: {e}"),
                }
            }
        }
        match self.exit_status {
            Some(status) if self.state == SessionState::Running => {
                // A failure report may have landed between the two checks.
                Err(self
                    .failure()
                    .unwrap_or_else(|| RecorderError::WorkerExited(status.to_string())))
            }
            _ => Ok(()),
        }
    }

    /// Ask the worker to finish and wait for it to exit.
    ///
    /// Waits without a timeout. Safe to call repeatedly and on a worker that
    /// already died; never fails. Once this returns, the log is closed.
    pub fn stop(&mut self) {
        match self.state {
            SessionState::Stopped => return,
            SessionState::Idle => {
                self.state = SessionState::Stopped;
                return;
            }
            SessionState::Running | SessionState::Stopping => {}
        }

        if let Some(signals) = &self.signals {
            signals.stop.set();
        }
        self.state = SessionState::Stopping;
        debug!(task = self.task.name(), "stop requested");

        if let Some(mut child) = self.child.take() {
            match child.wait() {
                Ok(status) => self.exit_status = Some(status),
                Err(e) => warn!("could not wait for worker: {e}"),
            }
        }
        self.state = SessionState::Stopped;

        match self.report() {
            Some(report) => info!("{}", report.summary()),
            None => warn!(task = self.task.name(), "worker exited without a report"),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_failed(&self) -> bool {
        self.signals
            .as_ref()
            .map(|s| s.failed.is_set())
            .unwrap_or(false)
    }

    /// The error the worker reported, if it failed.
    pub fn failure(&self) -> Option<RecorderError> {
        if !self.is_failed() {
            return None;
        }
        let failure = self.report().and_then(|r| r.failure);
        Some(match failure {
            Some(f) => f.into_error(&self.log_path),
            None => RecorderError::WorkerFailed("worker failed without a report".into()),
        })
    }

    /// The worker's exit report, once it has written one.
    pub fn report(&self) -> Option<WorkerReport> {
        let dir = self.control.as_ref()?;
        match WorkerReport::load(&report_path(dir.path())) {
            Ok(report) => report,
            Err(e) => {
                warn!("unreadable worker report: {e}");
                None
            }
        }
    }

    /// The first-event flag, for sessions that have one and have started.
    pub fn first_event(&self) -> Option<&SharedFlag> {
        self.signals.as_ref()?.first_event.as_ref()
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn task(&self) -> &WorkerTask {
        &self.task
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if matches!(self.state, SessionState::Running | SessionState::Stopping) {
            self.stop();
        }
    }
}
