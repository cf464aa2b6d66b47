//! Recorder sessions: one isolated worker process per device.

pub mod control;
pub mod glove;
pub mod recording;
pub mod report;
pub mod trigger;
pub mod worker;

pub use control::Signals;
pub use glove::{record_glove, GloveRecorder, TIMESTAMP_FIELD};
pub use recording::{Launcher, RecordingSession, SessionState};
pub use report::{FailureKind, WorkerFailure, WorkerReport};
pub use trigger::{record_triggers, SyncState, TriggerSync};
pub use worker::{execute, run_worker, WorkerSpec, WorkerTask};
