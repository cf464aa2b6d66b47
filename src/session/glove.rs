//! Data-glove recording.

use crate::clock::Clock;
use crate::device::{ChannelLayout, GloveBackend, SensorDevice};
use crate::error::Result;
use crate::logger::AppendLogger;
use crate::session::control::Signals;
use crate::session::recording::{Launcher, RecordingSession, SessionState};
use crate::session::report::WorkerReport;
use crate::session::worker::WorkerTask;
use std::iter::once;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Name of the clock column appended after the channel columns.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Closes the glove exactly once, on whichever path leaves the loop.
struct OpenGlove<'a> {
    device: &'a mut dyn SensorDevice,
    open: bool,
}

impl<'a> OpenGlove<'a> {
    fn open(device: &'a mut dyn SensorDevice, port: &str) -> Result<Self> {
        device.open(port)?;
        Ok(Self { device, open: true })
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.device.close();
        }
    }
}

impl Drop for OpenGlove<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Worker loop: log every new glove sample until the stop flag is set.
///
/// Each row holds the channels in `channels` order followed by the clock
/// time at which the sample was read. On exit the log is closed before the
/// device, on the normal path and on error alike.
pub fn record_glove(
    device: &mut dyn SensorDevice,
    port: &str,
    channels: &ChannelLayout,
    log_path: &Path,
    signals: &Signals,
    clock: &Clock,
    report: &mut WorkerReport,
) -> Result<()> {
    let mut glove = OpenGlove::open(device, port)?;
    let fields = channels.names().chain(once(TIMESTAMP_FIELD));
    let mut log = AppendLogger::create(log_path, fields)?;

    signals.ready.set();
    info!(
        port,
        channels = channels.len(),
        log = %log_path.display(),
        "glove recording started"
    );

    while !signals.stop.is_set() {
        report.polls += 1;
        if !glove.device.has_new_sample()? {
            continue;
        }
        let raw = glove.device.read_all_channels()?;
        let t = clock.time();
        let values = channels.select(&raw)?;
        log.write(values.into_iter().chain(once((TIMESTAMP_FIELD, t))))?;
        report.rows_written = log.rows_written();
    }

    log.close()?;
    glove.close();
    info!(rows = report.rows_written, polls = report.polls, "glove recording stopped");
    Ok(())
}

/// Records a data glove from an isolated worker process.
pub struct GloveRecorder {
    session: RecordingSession,
}

impl GloveRecorder {
    pub fn new(
        log_path: impl Into<PathBuf>,
        port: impl Into<String>,
        channels: ChannelLayout,
        backend: GloveBackend,
        launcher: Launcher,
    ) -> Self {
        let task = WorkerTask::Glove {
            port: port.into(),
            channels,
            backend,
        };
        Self {
            session: RecordingSession::new(log_path, task, launcher),
        }
    }

    /// Launch the worker. Returns without waiting for the glove to open.
    pub fn start(&mut self) -> Result<()> {
        self.session.start()
    }

    /// Block until the glove is open and logging, or the worker reports why not.
    pub fn wait_ready(&mut self, timeout: Duration) -> Result<()> {
        self.session.wait_ready(timeout)
    }

    /// Stop the worker and wait for it to close its log.
    pub fn stop(&mut self) {
        self.session.stop()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
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
    use crate::device::{SimulatedGlove, SimulatedGloveConfig};
    use crate::error::RecorderError;
    use std::thread;

    fn rows(path: &Path) -> Vec<Vec<String>> {
        let content = std::fs::read_to_string(path).unwrap();
        content
            .split('\n')
            .skip(1)
            .map(|r| r.split('\t').map(str::to_string).collect())
            .collect()
    }

    /// Runs the loop on a thread until the device has gone quiet, then stops it.
    fn run_until_quiet(
        config: SimulatedGloveConfig,
        layout: ChannelLayout,
    ) -> (PathBuf, WorkerReport, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let signals = Signals::create(dir.path(), false).unwrap();
        let log_path = dir.path().join("glove.tsv");
        let max_polls = config.max_polls.unwrap();

        let worker_signals = signals.clone();
        let worker_log = log_path.clone();
        let handle = thread::spawn(move || {
            let mut device = SimulatedGlove::new(config);
            let mut report = WorkerReport::new("glove", &worker_log);
            let result = record_glove(
                &mut device,
                "USB0",
                &layout,
                &worker_log,
                &worker_signals,
                &Clock::new(),
                &mut report,
            );
            assert!(!device.is_open());
            result.map(|_| report)
        });

        while !signals.ready.is_set() {
            thread::yield_now();
        }
        // Enough time for max_polls polls at the configured latency.
        thread::sleep(Duration::from_millis(max_polls * 2 + 50));
        signals.stop.set();
        let report = handle.join().unwrap().unwrap();
        (log_path, report, dir)
    }

    #[test]
    fn test_every_other_poll_yields_ten_rows() {
        let config = SimulatedGloveConfig {
            sample_every: 2,
            max_polls: Some(20),
            poll_latency_us: 200,
            ..Default::default()
        };
        let (log_path, report, _dir) = run_until_quiet(config, ChannelLayout::five_dt_14());

        let rows = rows(&log_path);
        assert_eq!(rows.len(), 10);
        assert_eq!(report.rows_written, 10);

        let mut last_t = f64::MIN;
        for (n, row) in rows.iter().enumerate() {
            assert_eq!(row.len(), 15);
            for ch in 0..14 {
                let expected = (n * 100 + ch) as f64;
                assert_eq!(row[ch].parse::<f64>().unwrap(), expected);
            }
            let t: f64 = row[14].parse().unwrap();
            assert!(t > last_t, "row {n}: {t} <= {last_t}");
            last_t = t;
        }
    }

    #[test]
    fn test_layout_controls_column_order() {
        let layout = ChannelLayout::new(vec![
            crate::device::ChannelDescriptor {
                name: "ring".into(),
                index: 9,
            },
            crate::device::ChannelDescriptor {
                name: "thumb".into(),
                index: 0,
            },
        ])
        .unwrap();
        let config = SimulatedGloveConfig {
            sample_every: 1,
            max_polls: Some(3),
            poll_latency_us: 0,
            ..Default::default()
        };
        let (log_path, _report, _dir) = run_until_quiet(config, layout);

        let content = std::fs::read_to_string(&log_path).unwrap();
        assert!(content.starts_with("ring\tthumb\ttimestamp\n9\t0\t"));
        assert_eq!(rows(&log_path).len(), 3);
    }

    #[test]
    fn test_short_reading_fails_and_closes_device() {
        let dir = tempfile::tempdir().unwrap();
        let signals = Signals::create(dir.path(), false).unwrap();
        let log_path = dir.path().join("glove.tsv");

        let mut device = SimulatedGlove::new(SimulatedGloveConfig {
            channels: 5,
            sample_every: 1,
            poll_latency_us: 0,
            ..Default::default()
        });
        let mut report = WorkerReport::new("glove", &log_path);
        let err = record_glove(
            &mut device,
            "USB0",
            &ChannelLayout::five_dt_14(),
            &log_path,
            &signals,
            &Clock::new(),
            &mut report,
        )
        .unwrap_err();

        assert!(matches!(err, RecorderError::DeviceReadFailure(_)));
        assert!(!device.is_open());
        // Header made it to disk even though the loop failed.
        let content = std::fs::read_to_string(&log_path).unwrap();
        assert!(content.starts_with("FD_THUMBNEAR"));
    }

    /// Raises the stop flag from inside the `stop_on`-th read.
    struct StopMidSample {
        inner: SimulatedGlove,
        stop: crate::signal::SharedFlag,
        stop_on: u64,
        reads: u64,
    }

    impl SensorDevice for StopMidSample {
        fn open(&mut self, port: &str) -> Result<()> {
            self.inner.open(port)
        }

        fn close(&mut self) {
            self.inner.close()
        }

        fn has_new_sample(&mut self) -> Result<bool> {
            self.inner.has_new_sample()
        }

        fn read_all_channels(&mut self) -> Result<Vec<f64>> {
            self.reads += 1;
            if self.reads == self.stop_on {
                self.stop.set();
            }
            self.inner.read_all_channels()
        }
    }

    #[test]
    fn test_at_most_one_sample_after_stop() {
        let dir = tempfile::tempdir().unwrap();
        let signals = Signals::create(dir.path(), false).unwrap();
        let log_path = dir.path().join("glove.tsv");
        let mut device = StopMidSample {
            inner: SimulatedGlove::new(SimulatedGloveConfig {
                sample_every: 1,
                poll_latency_us: 0,
                ..Default::default()
            }),
            stop: signals.stop.clone(),
            stop_on: 4,
            reads: 0,
        };
        let mut report = WorkerReport::new("glove", &log_path);

        record_glove(
            &mut device,
            "USB0",
            &ChannelLayout::five_dt_14(),
            &log_path,
            &signals,
            &Clock::new(),
            &mut report,
        )
        .unwrap();

        // Three rows landed before the flag; only the in-flight fourth follows it.
        assert_eq!(device.reads, 4);
        assert_eq!(report.rows_written, 4);
        assert_eq!(rows(&log_path).len(), 4);
        assert!(!device.inner.is_open());
    }

    #[test]
    fn test_recorder_starts_idle() {
        let recorder = GloveRecorder::new(
            "glove.tsv",
            "USB0",
            ChannelLayout::five_dt_14(),
            GloveBackend::default(),
            Launcher::new("labsync"),
        );
        assert_eq!(recorder.state(), SessionState::Idle);
    }
}
