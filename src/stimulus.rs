//! Boundary between the stimulus loop and the logging core.
//!
//! Rendering lives outside this crate behind [`Presenter`]. The only contract
//! is that `present` returns once the stimulus is on screen; the event row is
//! written immediately afterwards, on the same thread, so the logged time is
//! within one rendering step of the actual display update.

use crate::clock::Clock;
use crate::error::{RecorderError, Result};
use crate::logger::{AppendLogger, MISSING};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

pub const EVENT_FIELDS: [&str; 2] = ["timestamp", "target_position"];

/// Something that can put a labelled stimulus on screen.
pub trait Presenter {
    /// Display `label`, returning once the display has updated.
    fn present(&mut self, label: &str) -> std::io::Result<()>;
}

/// Headless presenter that announces each stimulus on stdout.
pub struct ConsolePresenter<W: Write> {
    out: W,
}

impl ConsolePresenter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write> ConsolePresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Presenter for ConsolePresenter<W> {
    fn present(&mut self, label: &str) -> std::io::Result<()> {
        writeln!(self.out, "showing {label}")?;
        self.out.flush()
    }
}

/// Timestamped log of what was on screen when.
pub struct EventLog {
    log: AppendLogger,
    clock: Clock,
}

impl EventLog {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            log: AppendLogger::create(path, EVENT_FIELDS)?,
            clock: Clock::new(),
        })
    }

    /// Record that `label` has just been displayed.
    pub fn record(&mut self, label: &str) -> Result<f64> {
        let t = self.clock.time();
        self.log.write([
            (EVENT_FIELDS[0], t.to_string()),
            (EVENT_FIELDS[1], label.to_string()),
        ])?;
        Ok(t)
    }

    /// Mark the end of the block with an `n/a` position and close the log.
    pub fn finish(mut self) -> Result<()> {
        self.record(MISSING)?;
        self.log.close()
    }

    pub fn rows_written(&self) -> u64 {
        self.log.rows_written()
    }
}

/// The stimuli of one block, shown in order for a fixed duration each.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub labels: Vec<String>,
    pub display: Duration,
}

/// Present every stimulus of `schedule`, logging each one as it appears.
///
/// Stops early when `running` is cleared. Returns the number of stimuli shown.
pub fn run_schedule(
    presenter: &mut dyn Presenter,
    schedule: &Schedule,
    events: &mut EventLog,
    running: &AtomicBool,
) -> Result<usize> {
    let mut shown = 0;
    for label in &schedule.labels {
        if !running.load(Ordering::SeqCst) {
            info!(shown, "stimulus loop interrupted");
            break;
        }
        presenter
            .present(label)
            .map_err(RecorderError::Presentation)?;
        events.record(label)?;
        shown += 1;
        std::thread::sleep(schedule.display);
    }
    Ok(shown)
}
