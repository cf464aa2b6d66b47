//! Deterministic stand-ins for the glove and the scanner trigger.
//!
//! These are used for dry runs without hardware and by the test suite.

use crate::clock::Clock;
use crate::device::types::{KeyEvent, KeyboardDevice, SensorDevice};
use crate::error::{RecorderError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for [`SimulatedGlove`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedGloveConfig {
    /// Number of raw channels the device reports.
    pub channels: usize,
    /// A new sample is reported on every `sample_every`-th poll.
    pub sample_every: u64,
    /// After this many polls the device stops producing samples.
    pub max_polls: Option<u64>,
    /// Simulated per-poll device latency in microseconds.
    pub poll_latency_us: u64,
    /// Refuse to open, as a disconnected glove would.
    pub fail_open: bool,
}

impl Default for SimulatedGloveConfig {
    fn default() -> Self {
        Self {
            channels: 14,
            sample_every: 2,
            max_polls: None,
            poll_latency_us: 1000,
            fail_open: false,
        }
    }
}

/// A glove that reports a new sample on a fixed poll cadence.
///
/// Sample `n` (0-based) has value `n * 100 + channel` on each channel.
#[derive(Debug)]
pub struct SimulatedGlove {
    config: SimulatedGloveConfig,
    port: Option<String>,
    polls: u64,
    samples: u64,
    pending: bool,
}

impl SimulatedGlove {
    pub fn new(config: SimulatedGloveConfig) -> Self {
        Self {
            config,
            port: None,
            polls: 0,
            samples: 0,
            pending: false,
        }
    }

    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

impl SensorDevice for SimulatedGlove {
    fn open(&mut self, port: &str) -> Result<()> {
        if self.config.fail_open {
            return Err(RecorderError::DeviceOpenFailure(format!(
                "no glove found on port {port}"
            )));
        }
        self.port = Some(port.to_string());
        Ok(())
    }

    fn close(&mut self) {
        self.port = None;
    }

    fn has_new_sample(&mut self) -> Result<bool> {
        if self.port.is_none() {
            return Err(RecorderError::DeviceReadFailure("glove is not open".into()));
        }
        if self.config.poll_latency_us > 0 {
            std::thread::sleep(Duration::from_micros(self.config.poll_latency_us));
        }
        if let Some(max) = self.config.max_polls {
            if self.polls >= max {
                return Ok(false);
            }
        }
        self.polls += 1;
        if self.config.sample_every > 0 && self.polls % self.config.sample_every == 0 {
            self.pending = true;
        }
        Ok(self.pending)
    }

    fn read_all_channels(&mut self) -> Result<Vec<f64>> {
        if self.port.is_none() {
            return Err(RecorderError::DeviceReadFailure("glove is not open".into()));
        }
        let base = self.samples * 100;
        self.samples += 1;
        self.pending = false;
        Ok((0..self.config.channels)
            .map(|ch| (base + ch as u64) as f64)
            .collect())
    }
}

/// Settings for [`ScriptedKeyboard`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptedKeyboardConfig {
    pub key: String,
    /// 1-based poll numbers on which `key` is pressed.
    pub press_on_polls: Vec<u64>,
    pub poll_latency_us: u64,
}

impl Default for ScriptedKeyboardConfig {
    fn default() -> Self {
        Self {
            key: "s".to_string(),
            press_on_polls: Vec::new(),
            poll_latency_us: 1000,
        }
    }
}

/// A keyboard that presses a key on predetermined polls.
#[derive(Debug)]
pub struct ScriptedKeyboard {
    config: ScriptedKeyboardConfig,
    polls: u64,
    buffered: Vec<KeyEvent>,
}

impl ScriptedKeyboard {
    pub fn new(config: ScriptedKeyboardConfig) -> Self {
        Self {
            config,
            polls: 0,
            buffered: Vec::new(),
        }
    }
}

impl KeyboardDevice for ScriptedKeyboard {
    fn poll_keys(&mut self, key_filter: &[String], consume_on_read: bool) -> Result<Vec<KeyEvent>> {
        if self.config.poll_latency_us > 0 {
            std::thread::sleep(Duration::from_micros(self.config.poll_latency_us));
        }
        self.polls += 1;
        if self.config.press_on_polls.contains(&self.polls) {
            self.buffered.push(KeyEvent::new(self.config.key.clone()));
        }
        Ok(drain_matching(&mut self.buffered, key_filter, consume_on_read))
    }
}

/// Settings for [`PeriodicKeyboard`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodicKeyboardConfig {
    pub key: String,
    /// Seconds between pulses (the repetition time).
    pub interval_secs: f64,
    /// Delay before the first pulse, measured from `open`.
    pub start_after_secs: f64,
    pub poll_latency_us: u64,
}

impl Default for PeriodicKeyboardConfig {
    fn default() -> Self {
        Self {
            key: "s".to_string(),
            interval_secs: 2.0,
            start_after_secs: 5.0,
            poll_latency_us: 500,
        }
    }
}

/// Emulates a scanner that presses the trigger key once per TR.
#[derive(Debug)]
pub struct PeriodicKeyboard {
    config: PeriodicKeyboardConfig,
    clock: Clock,
    next_pulse: Option<f64>,
    buffered: Vec<KeyEvent>,
}

impl PeriodicKeyboard {
    pub fn new(config: PeriodicKeyboardConfig) -> Self {
        Self {
            config,
            clock: Clock::new(),
            next_pulse: None,
            buffered: Vec::new(),
        }
    }
}

impl KeyboardDevice for PeriodicKeyboard {
    fn open(&mut self) -> Result<()> {
        if self.config.interval_secs <= 0.0 {
            return Err(RecorderError::DeviceOpenFailure(format!(
                "invalid pulse interval {}",
                self.config.interval_secs
            )));
        }
        self.next_pulse = Some(self.clock.time() + self.config.start_after_secs);
        Ok(())
    }

    fn close(&mut self) {
        self.next_pulse = None;
    }

    fn poll_keys(&mut self, key_filter: &[String], consume_on_read: bool) -> Result<Vec<KeyEvent>> {
        let Some(next) = self.next_pulse else {
            return Err(RecorderError::DeviceReadFailure(
                "emulated scanner is not open".into(),
            ));
        };
        if self.config.poll_latency_us > 0 {
            std::thread::sleep(Duration::from_micros(self.config.poll_latency_us));
        }
        if self.clock.time() >= next {
            self.buffered.push(KeyEvent::new(self.config.key.clone()));
            self.next_pulse = Some(next + self.config.interval_secs);
        }
        Ok(drain_matching(&mut self.buffered, key_filter, consume_on_read))
    }
}

/// Return buffered events matching the filter, removing them when consuming.
/// Non-matching events are dropped, as a filtered hardware read would.
pub(crate) fn drain_matching(
    buffered: &mut Vec<KeyEvent>,
    key_filter: &[String],
    consume_on_read: bool,
) -> Vec<KeyEvent> {
    buffered.retain(|e| e.matches(key_filter));
    if consume_on_read {
        std::mem::take(buffered)
    } else {
        buffered.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_glove(sample_every: u64) -> SimulatedGlove {
        SimulatedGlove::new(SimulatedGloveConfig {
            sample_every,
            poll_latency_us: 0,
            ..Default::default()
        })
    }

    #[test]
    fn test_glove_reports_every_other_poll() {
        let mut glove = quiet_glove(2);
        glove.open("USB0").unwrap();

        let mut fresh = 0;
        for _ in 0..20 {
            if glove.has_new_sample().unwrap() {
                fresh += 1;
                let values = glove.read_all_channels().unwrap();
                assert_eq!(values.len(), 14);
            }
        }
        assert_eq!(fresh, 10);
    }

    #[test]
    fn test_glove_values_are_deterministic() {
        let mut glove = quiet_glove(1);
        glove.open("USB0").unwrap();

        assert!(glove.has_new_sample().unwrap());
        assert_eq!(glove.read_all_channels().unwrap()[3], 3.0);
        assert!(glove.has_new_sample().unwrap());
        assert_eq!(glove.read_all_channels().unwrap()[0], 100.0);
    }

    #[test]
    fn test_glove_goes_quiet_after_max_polls() {
        let mut glove = SimulatedGlove::new(SimulatedGloveConfig {
            sample_every: 1,
            max_polls: Some(3),
            poll_latency_us: 0,
            ..Default::default()
        });
        glove.open("USB0").unwrap();
        for _ in 0..3 {
            assert!(glove.has_new_sample().unwrap());
            glove.read_all_channels().unwrap();
        }
        assert!(!glove.has_new_sample().unwrap());
        assert_eq!(glove.polls(), 3);
    }

    #[test]
    fn test_glove_open_failure() {
        let mut glove = SimulatedGlove::new(SimulatedGloveConfig {
            fail_open: true,
            ..Default::default()
        });
        let err = glove.open("USB0").unwrap_err();
        assert!(matches!(err, RecorderError::DeviceOpenFailure(_)));
        assert!(!glove.is_open());
    }

    #[test]
    fn test_scripted_keyboard_presses_on_schedule() {
        let mut kb = ScriptedKeyboard::new(ScriptedKeyboardConfig {
            key: "s".into(),
            press_on_polls: vec![5],
            poll_latency_us: 0,
        });
        let filter = vec!["s".to_string()];
        for poll in 1..=10 {
            let keys = kb.poll_keys(&filter, true).unwrap();
            assert_eq!(keys.len(), usize::from(poll == 5), "poll {poll}");
        }
    }

    #[test]
    fn test_unconsumed_keys_are_reported_again() {
        let mut kb = ScriptedKeyboard::new(ScriptedKeyboardConfig {
            key: "s".into(),
            press_on_polls: vec![1],
            poll_latency_us: 0,
        });
        let filter = vec!["s".to_string()];
        assert_eq!(kb.poll_keys(&filter, false).unwrap().len(), 1);
        assert_eq!(kb.poll_keys(&filter, true).unwrap().len(), 1);
        assert!(kb.poll_keys(&filter, true).unwrap().is_empty());
    }

    #[test]
    fn test_filter_drops_other_keys() {
        let mut kb = ScriptedKeyboard::new(ScriptedKeyboardConfig {
            key: "5".into(),
            press_on_polls: vec![1],
            poll_latency_us: 0,
        });
        assert!(kb.poll_keys(&["s".to_string()], true).unwrap().is_empty());
    }

    #[test]
    fn test_periodic_keyboard_pulses() {
        let mut kb = PeriodicKeyboard::new(PeriodicKeyboardConfig {
            key: "s".into(),
            interval_secs: 0.01,
            start_after_secs: 0.0,
            poll_latency_us: 0,
        });
        kb.open().unwrap();
        let filter = vec!["s".to_string()];

        let mut pulses = 0;
        let deadline = std::time::Instant::now() + Duration::from_millis(55);
        while std::time::Instant::now() < deadline {
            pulses += kb.poll_keys(&filter, true).unwrap().len();
        }
        assert!((4..=7).contains(&pulses), "pulses {pulses}");
    }

    #[test]
    fn test_periodic_keyboard_requires_open() {
        let mut kb = PeriodicKeyboard::new(PeriodicKeyboardConfig::default());
        assert!(kb.poll_keys(&[], true).is_err());
    }
}
