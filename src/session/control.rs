//! Files shared between a session and its worker.
//!
//! Every session gets a private control directory holding the worker spec,
//! the one-shot flags, and the report the worker leaves behind on exit.

use crate::error::Result;
use crate::signal::SharedFlag;
use std::path::{Path, PathBuf};

const STOP_FLAG: &str = "stop.flag";
const READY_FLAG: &str = "ready.flag";
const FAILED_FLAG: &str = "failed.flag";
const FIRST_EVENT_FLAG: &str = "first_event.flag";
const SPEC_FILE: &str = "worker.json";
const REPORT_FILE: &str = "report.json";

/// The flags of one session, as seen from either side.
#[derive(Debug, Clone)]
pub struct Signals {
    /// Set by the parent to ask the worker to finish.
    pub stop: SharedFlag,
    /// Set by the worker once its device and log are open.
    pub ready: SharedFlag,
    /// Set by the worker after it has written a failure report.
    pub failed: SharedFlag,
    /// Set by a trigger worker on the first detected pulse.
    pub first_event: Option<SharedFlag>,
}

impl Signals {
    /// Create fresh, unset flags in `dir`.
    pub fn create(dir: &Path, with_first_event: bool) -> Result<Self> {
        Ok(Self {
            stop: SharedFlag::create(dir.join(STOP_FLAG))?,
            ready: SharedFlag::create(dir.join(READY_FLAG))?,
            failed: SharedFlag::create(dir.join(FAILED_FLAG))?,
            first_event: if with_first_event {
                Some(SharedFlag::create(dir.join(FIRST_EVENT_FLAG))?)
            } else {
                None
            },
        })
    }

    /// Attach to flags created by the parent.
    pub fn open(dir: &Path, with_first_event: bool) -> Result<Self> {
        Ok(Self {
            stop: SharedFlag::open(dir.join(STOP_FLAG))?,
            ready: SharedFlag::open(dir.join(READY_FLAG))?,
            failed: SharedFlag::open(dir.join(FAILED_FLAG))?,
            first_event: if with_first_event {
                Some(SharedFlag::open(dir.join(FIRST_EVENT_FLAG))?)
            } else {
                None
            },
        })
    }
}

pub fn spec_path(dir: &Path) -> PathBuf {
    dir.join(SPEC_FILE)
}

pub fn report_path(dir: &Path) -> PathBuf {
    dir.join(REPORT_FILE)
}
