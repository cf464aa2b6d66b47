//! labsync - synchronized data acquisition for scanner experiments.
//!
//! Records a data glove and the scanner's trigger pulses from isolated worker
//! processes while the main process runs a stimulus loop. Every log row is
//! stamped with one machine-wide monotonic clock, so glove samples, TRs, and
//! stimulus onsets can be aligned offline.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      main process                            │
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────────┐    │
//! │  │GloveRecorder│   │ TriggerSync │   │  stimulus loop   │    │
//! │  └──────┬──────┘   └──────┬──────┘   │  (events.tsv)    │    │
//! │         │ stop/ready/     │ + first  └──────────────────┘    │
//! │         │ failed flags    │   event                          │
//! ├─────────┼─────────────────┼──────────────────────────────────┤
//! │  ┌──────▼──────┐   ┌──────▼──────┐                           │
//! │  │glove worker │   │ TR worker   │   one process each        │
//! │  │ (glove.tsv) │   │ (TRs.tsv)   │                           │
//! │  └─────────────┘   └─────────────┘                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use labsync::{ChannelLayout, GloveBackend, GloveRecorder, Launcher};
//! use std::time::Duration;
//!
//! let mut recorder = GloveRecorder::new(
//!     "glove.tsv",
//!     "USB0",
//!     ChannelLayout::five_dt_14(),
//!     GloveBackend::default(),
//!     Launcher::current_exe().expect("no executable path"),
//! );
//! recorder.start().expect("failed to launch worker");
//! recorder.wait_ready(Duration::from_secs(5)).expect("glove did not open");
//! // ... run the experiment ...
//! recorder.stop();
//! ```

pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod experiment;
pub mod logger;
pub mod session;
pub mod signal;
pub mod stimulus;

// Re-export key types at crate root for convenience
pub use clock::Clock;
pub use config::{Config, ConfigError};
pub use device::{
    ChannelDescriptor, ChannelLayout, GloveBackend, KeyEvent, KeyboardBackend, KeyboardDevice,
    SensorDevice,
};
pub use error::{RecorderError, Result};
pub use experiment::{Acquisition, RunLayout};
pub use logger::{AppendLogger, MISSING};
pub use session::{
    GloveRecorder, Launcher, RecordingSession, SessionState, SyncState, TriggerSync,
    WorkerReport,
};
pub use signal::SharedFlag;
pub use stimulus::{ConsolePresenter, EventLog, Presenter, Schedule};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
