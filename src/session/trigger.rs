//! Scanner trigger (TR) recording and acquisition synchronization.
//!
//! The scanner emits one key press per acquisition cycle. A trigger worker
//! logs the clock time of every press and raises the session's first-event
//! flag on the first one, which the stimulus loop waits on before it starts.

use crate::clock::Clock;
use crate::device::{KeyboardBackend, KeyboardDevice};
use crate::error::{RecorderError, Result};
use crate::logger::AppendLogger;
use crate::session::control::Signals;
use crate::session::glove::TIMESTAMP_FIELD;
use crate::session::recording::{Launcher, RecordingSession, SessionState};
use crate::session::report::WorkerReport;
use crate::session::worker::WorkerTask;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Synchronization state layered over the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    WaitingForFirstPulse,
    /// At least one pulse has been seen. Never reverts.
    Synchronized,
}

struct OpenKeyboard<'a> {
    device: &'a mut dyn KeyboardDevice,
    open: bool,
}

impl<'a> OpenKeyboard<'a> {
    fn open(device: &'a mut dyn KeyboardDevice) -> Result<Self> {
        device.open()?;
        Ok(Self { device, open: true })
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.device.close();
        }
    }
}

impl Drop for OpenKeyboard<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Worker loop: log one `timestamp` row per trigger key press until stopped.
pub fn record_triggers(
    device: &mut dyn KeyboardDevice,
    key: &str,
    log_path: &Path,
    signals: &Signals,
    clock: &Clock,
    report: &mut WorkerReport,
) -> Result<()> {
    let mut keyboard = OpenKeyboard::open(device)?;
    let mut log = AppendLogger::create(log_path, [TIMESTAMP_FIELD])?;
    let filter = vec![key.to_string()];

    signals.ready.set();
    info!(key, log = %log_path.display(), "listening for TRs");

    while !signals.stop.is_set() {
        report.polls += 1;
        for _ in keyboard.device.poll_keys(&filter, true)? {
            let t = clock.time();
            log.write([(TIMESTAMP_FIELD, t)])?;
            report.rows_written = log.rows_written();

            if report.first_event_at.is_none() {
                report.first_event_at = Some(t);
                if let Some(first) = &signals.first_event {
                    first.set();
                }
                info!(t, "first TR received");
            } else {
                debug!(t, "TR");
            }
        }
    }

    log.close()?;
    keyboard.close();
    info!(pulses = report.rows_written, "TR listener stopped");
    Ok(())
}

/// Listens for scanner triggers from an isolated worker process.
pub struct TriggerSync {
    session: RecordingSession,
}

impl TriggerSync {
    pub fn new(
        log_path: impl Into<PathBuf>,
        key: impl Into<String>,
        backend: KeyboardBackend,
        launcher: Launcher,
    ) -> Self {
        let task = WorkerTask::Trigger {
            key: key.into(),
            backend,
        };
        Self {
            session: RecordingSession::new(log_path, task, launcher),
        }
    }

    pub fn start(&mut self) -> Result<()> {
        self.session.start()
    }

    pub fn wait_ready(&mut self, timeout: Duration) -> Result<()> {
        self.session.wait_ready(timeout)
    }

    pub fn stop(&mut self) {
        self.session.stop()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Whether the first pulse has been observed. Stays true after `stop`.
    pub fn received_first_tr(&self) -> bool {
        self.session
            .first_event()
            .map(|flag| flag.is_set())
            .unwrap_or(false)
    }

    pub fn sync_state(&self) -> SyncState {
        if self.received_first_tr() {
            SyncState::Synchronized
        } else {
            SyncState::WaitingForFirstPulse
        }
    }

    /// Block until the first pulse arrives, re-checking every `poll_interval`.
    ///
    /// Returns an error instead of waiting forever if the session was never
    /// started or its worker has failed or exited.
    pub fn wait_until_first_tr(&mut self, poll_interval: Duration) -> Result<()> {
        self.wait_for_first(poll_interval, None, None)
    }

    /// Like [`wait_until_first_tr`](Self::wait_until_first_tr), giving up with
    /// `SynchronizationTimeout` after `timeout`.
    pub fn wait_until_first_tr_timeout(
        &mut self,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<()> {
        self.wait_for_first(poll_interval, Some(timeout), None)
    }

    /// Wait for the first pulse while `running` stays set.
    ///
    /// Returns `Interrupted` once `running` is cleared, for example by a
    /// Ctrl+C handler. `timeout`, if given, behaves as in
    /// [`wait_until_first_tr_timeout`](Self::wait_until_first_tr_timeout).
    pub fn wait_until_first_tr_while(
        &mut self,
        poll_interval: Duration,
        timeout: Option<Duration>,
        running: &AtomicBool,
    ) -> Result<()> {
        self.wait_for_first(poll_interval, timeout, Some(running))
    }

    fn wait_for_first(
        &mut self,
        poll_interval: Duration,
        timeout: Option<Duration>,
        running: Option<&AtomicBool>,
    ) -> Result<()> {
        let started = Instant::now();
        loop {
            if self.received_first_tr() {
                return Ok(());
            }
            if running.is_some_and(|r| !r.load(Ordering::SeqCst)) {
                info!("stopped waiting for first TR");
                return Err(RecorderError::Interrupted);
            }
            match self.session.state() {
                SessionState::Running => self.session.check_alive()?,
                SessionState::Idle => return Err(RecorderError::NotStarted),
                SessionState::Stopping | SessionState::Stopped => {
                    return Err(RecorderError::AlreadyStopped)
                }
            }
            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    return Err(RecorderError::SynchronizationTimeout(limit));
                }
            }
            std::thread::sleep(poll_interval);
        }
    }

    pub fn session(&self) -> &RecordingSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut RecordingSession {
        &mut self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ScriptedKeyboard, ScriptedKeyboardConfig};
    use std::thread;

    fn scripted(press_on_polls: Vec<u64>) -> ScriptedKeyboard {
        ScriptedKeyboard::new(ScriptedKeyboardConfig {
            key: "s".into(),
            press_on_polls,
            poll_latency_us: 100,
        })
    }

    #[test]
    fn test_each_pulse_logged_and_first_flag_set() {
        let dir = tempfile::tempdir().unwrap();
        let signals = Signals::create(dir.path(), true).unwrap();
        let log_path = dir.path().join("TRs.tsv");

        let worker_signals = signals.clone();
        let worker_log = log_path.clone();
        let handle = thread::spawn(move || {
            let mut kb = scripted(vec![5, 10, 15]);
            let mut report = WorkerReport::new("trigger", &worker_log);
            record_triggers(
                &mut kb,
                "s",
                &worker_log,
                &worker_signals,
                &Clock::new(),
                &mut report,
            )
            .map(|_| report)
        });

        let first = signals.first_event.clone().unwrap();
        while !first.is_set() {
            thread::yield_now();
        }
        thread::sleep(Duration::from_millis(50));
        signals.stop.set();
        let report = handle.join().unwrap().unwrap();

        assert_eq!(report.rows_written, 3);
        assert!(report.first_event_at.is_some());
        assert!(first.is_set());

        let content = std::fs::read_to_string(&log_path).unwrap();
        let rows: Vec<f64> = content
            .split('\n')
            .skip(1)
            .map(|r| r.parse().unwrap())
            .collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], report.first_event_at.unwrap());
        assert!(rows.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_no_pulse_leaves_flag_unset() {
        let dir = tempfile::tempdir().unwrap();
        let signals = Signals::create(dir.path(), true).unwrap();
        let log_path = dir.path().join("TRs.tsv");

        let worker_signals = signals.clone();
        let worker_log = log_path.clone();
        let handle = thread::spawn(move || {
            let mut kb = scripted(vec![]);
            let mut report = WorkerReport::new("trigger", &worker_log);
            record_triggers(
                &mut kb,
                "s",
                &worker_log,
                &worker_signals,
                &Clock::new(),
                &mut report,
            )
            .map(|_| report)
        });

        thread::sleep(Duration::from_millis(20));
        signals.stop.set();
        let report = handle.join().unwrap().unwrap();

        assert_eq!(report.rows_written, 0);
        assert!(report.polls > 0);
        assert!(!signals.first_event.as_ref().unwrap().is_set());
        assert_eq!(std::fs::read_to_string(&log_path).unwrap(), "timestamp");
    }

    #[test]
    fn test_wait_before_start_is_rejected() {
        let mut sync = TriggerSync::new(
            "TRs.tsv",
            "s",
            KeyboardBackend::default(),
            Launcher::new("labsync"),
        );
        assert_eq!(sync.sync_state(), SyncState::WaitingForFirstPulse);
        let err = sync
            .wait_until_first_tr(Duration::from_millis(1))
            .unwrap_err();
        assert!(matches!(err, RecorderError::NotStarted));
    }

    #[test]
    fn test_cleared_flag_interrupts_wait() {
        let mut sync = TriggerSync::new(
            "TRs.tsv",
            "s",
            KeyboardBackend::default(),
            Launcher::new("labsync"),
        );
        let running = AtomicBool::new(false);
        let err = sync
            .wait_until_first_tr_while(Duration::from_millis(1), None, &running)
            .unwrap_err();
        assert!(matches!(err, RecorderError::Interrupted));
    }
}
