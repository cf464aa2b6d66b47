//! Device capabilities consumed by the recorders.
//!
//! Vendor SDKs sit behind these traits; the recorders never see anything but
//! raw channel values and key events.

use crate::error::{RecorderError, Result};
use crate::session::TIMESTAMP_FIELD;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A multi-channel sensor such as a data glove.
pub trait SensorDevice {
    /// Acquire the device on `port`.
    fn open(&mut self, port: &str) -> Result<()>;

    /// Release the device. Must be safe to call on a device that never opened.
    fn close(&mut self);

    /// Whether a sample arrived since the last `read_all_channels`.
    fn has_new_sample(&mut self) -> Result<bool>;

    /// Raw values for every channel, indexed by device channel number.
    fn read_all_channels(&mut self) -> Result<Vec<f64>>;
}

/// A keyboard-like source of key presses.
pub trait KeyboardDevice {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) {}

    /// Key presses matching `key_filter` since the last poll. With
    /// `consume_on_read` the returned events are cleared from the device
    /// buffer; otherwise they are reported again on the next poll.
    fn poll_keys(&mut self, key_filter: &[String], consume_on_read: bool) -> Result<Vec<KeyEvent>>;
}

/// A single key press.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: String,
}

impl KeyEvent {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn matches(&self, key_filter: &[String]) -> bool {
        key_filter.is_empty() || key_filter.iter().any(|k| k == &self.key)
    }
}

/// Name and device index of one recorded channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub name: String,
    pub index: usize,
}

/// Ordered list of channels to record. Log columns follow this order.
///
/// Channel names are unique and never `timestamp`, which the glove log
/// appends after the channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLayout")]
pub struct ChannelLayout {
    channels: Vec<ChannelDescriptor>,
}

#[derive(Deserialize)]
struct RawLayout {
    channels: Vec<ChannelDescriptor>,
}

impl TryFrom<RawLayout> for ChannelLayout {
    type Error = RecorderError;

    fn try_from(raw: RawLayout) -> Result<Self> {
        Self::new(raw.channels)
    }
}

impl ChannelLayout {
    pub fn new(channels: Vec<ChannelDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for channel in &channels {
            if channel.name == TIMESTAMP_FIELD {
                return Err(RecorderError::InvalidLayout(format!(
                    "channel name `{TIMESTAMP_FIELD}` is reserved"
                )));
            }
            if !seen.insert(channel.name.as_str()) {
                return Err(RecorderError::InvalidLayout(format!(
                    "duplicate channel name `{}`",
                    channel.name
                )));
            }
        }
        Ok(Self { channels })
    }

    /// Build a layout from names, assigning device indices in order.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let channels = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| ChannelDescriptor {
                name: name.into(),
                index,
            })
            .collect();
        Self::new(channels)
    }

    /// The 14-sensor layout of the 5DT Data Glove Ultra.
    pub fn five_dt_14() -> Self {
        const NAMES: [&str; 14] = [
            "FD_THUMBNEAR",
            "FD_THUMBFAR",
            "FD_THUMBINDEX",
            "FD_INDEXNEAR",
            "FD_INDEXFAR",
            "FD_INDEXMIDDLE",
            "FD_MIDDLENEAR",
            "FD_MIDDLEFAR",
            "FD_MIDDLERING",
            "FD_RINGNEAR",
            "FD_RINGFAR",
            "FD_RINGLITTLE",
            "FD_LITTLENEAR",
            "FD_LITTLEFAR",
        ];
        let channels = NAMES
            .iter()
            .enumerate()
            .map(|(index, name)| ChannelDescriptor {
                name: name.to_string(),
                index,
            })
            .collect();
        Self { channels }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.name.as_str())
    }

    /// Pick this layout's channels out of a raw device reading.
    pub fn select<'a>(&'a self, raw: &[f64]) -> Result<Vec<(&'a str, f64)>> {
        self.channels
            .iter()
            .map(|c| {
                raw.get(c.index).map(|v| (c.name.as_str(), *v)).ok_or_else(|| {
                    RecorderError::DeviceReadFailure(format!(
                        "channel {} expects index {} but device returned {} values",
                        c.name,
                        c.index,
                        raw.len()
                    ))
                })
            })
            .collect()
    }
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self::five_dt_14()
    }
}
