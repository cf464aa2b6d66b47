//! Device capabilities and the backends that implement them.
//!
//! Backends are chosen by configuration and constructed inside the worker
//! process, so a device handle never crosses a process boundary.

pub mod simulated;
pub mod stdin;
pub mod types;

pub use simulated::{
    PeriodicKeyboard, PeriodicKeyboardConfig, ScriptedKeyboard, ScriptedKeyboardConfig,
    SimulatedGlove, SimulatedGloveConfig,
};
pub use stdin::StdinKeyboard;
pub use types::{ChannelDescriptor, ChannelLayout, KeyEvent, KeyboardDevice, SensorDevice};

use serde::{Deserialize, Serialize};

/// Which glove implementation a worker should open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GloveBackend {
    Simulated(SimulatedGloveConfig),
}

impl GloveBackend {
    pub fn build(&self) -> Box<dyn SensorDevice> {
        match self {
            GloveBackend::Simulated(config) => Box::new(SimulatedGlove::new(config.clone())),
        }
    }
}

impl Default for GloveBackend {
    fn default() -> Self {
        GloveBackend::Simulated(SimulatedGloveConfig::default())
    }
}

/// Which keyboard implementation a trigger worker should open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeyboardBackend {
    /// Emulated scanner pressing the trigger key once per TR.
    Periodic(PeriodicKeyboardConfig),
    Scripted(ScriptedKeyboardConfig),
    Stdin,
}

impl KeyboardBackend {
    pub fn build(&self) -> Box<dyn KeyboardDevice> {
        match self {
            KeyboardBackend::Periodic(config) => Box::new(PeriodicKeyboard::new(config.clone())),
            KeyboardBackend::Scripted(config) => Box::new(ScriptedKeyboard::new(config.clone())),
            KeyboardBackend::Stdin => Box::new(StdinKeyboard::new()),
        }
    }

    /// Whether the worker needs the parent's stdin.
    pub fn reads_stdin(&self) -> bool {
        matches!(self, KeyboardBackend::Stdin)
    }
}

impl Default for KeyboardBackend {
    fn default() -> Self {
        KeyboardBackend::Periodic(PeriodicKeyboardConfig::default())
    }
}
