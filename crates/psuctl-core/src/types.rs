//! Core types used throughout psuctl.
//!
//! These types describe the four-channel supply independently of how it is
//! reached (simulated model, TCP socket, mock).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of output channels on the supply.
pub const CHANNEL_COUNT: u8 = 4;

/// Timestamp format used in measurement responses, the REST API, and the
/// telemetry log (`2026.10.15 12-00-00-000000`).
pub const TIMESTAMP_FORMAT: &str = "%Y.%m.%d %H-%M-%S-%6f";

/// A validated output channel number (1-4).
///
/// Construct via [`ChannelId::new`], which rejects anything outside the
/// supply's channel range, or iterate [`ChannelId::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(u8);

impl ChannelId {
    /// Every channel, in ascending order.
    pub const ALL: [ChannelId; CHANNEL_COUNT as usize] =
        [ChannelId(1), ChannelId(2), ChannelId(3), ChannelId(4)];

    /// Validate a raw channel number.
    pub fn new(number: i64) -> Result<Self> {
        match number {
            1..=4 => Ok(ChannelId(number as u8)),
            other => Err(Error::InvalidChannel(other)),
        }
    }

    /// The 1-based channel number.
    pub fn number(&self) -> u8 {
        self.0
    }

    /// Zero-based index, for per-channel storage.
    pub fn index(&self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Output state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputState {
    /// Output enabled.
    On,
    /// Output disabled (power-on default).
    #[default]
    Off,
}

impl OutputState {
    /// Whether the output is enabled.
    pub fn is_on(&self) -> bool {
        matches!(self, OutputState::On)
    }
}

impl fmt::Display for OutputState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputState::On => write!(f, "ON"),
            OutputState::Off => write!(f, "OFF"),
        }
    }
}

impl FromStr for OutputState {
    type Err = Error;

    /// Accepts `ON`/`OFF` in any case, or the SCPI boolean digits `1`/`0`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ON" | "1" => Ok(OutputState::On),
            "OFF" | "0" => Ok(OutputState::Off),
            _ => Err(Error::InvalidParameter(format!(
                "unknown output state '{s}'"
            ))),
        }
    }
}

/// Maximum settable voltage and current for one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelLimits {
    /// Voltage ceiling in volts.
    pub max_voltage: f64,
    /// Current ceiling in amperes.
    pub max_current: f64,
}

impl ChannelLimits {
    /// Create a limit pair.
    pub const fn new(max_voltage: f64, max_current: f64) -> Self {
        ChannelLimits {
            max_voltage,
            max_current,
        }
    }
}

/// Stored settings of one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelState {
    /// Which channel this is.
    pub channel: ChannelId,
    /// Voltage setting in volts.
    pub voltage: f64,
    /// Current setting in amperes.
    pub current: f64,
    /// Output state.
    pub output: OutputState,
}

impl ChannelState {
    /// Power-on state: 0 V, 0 A, output off.
    pub fn new(channel: ChannelId) -> Self {
        ChannelState {
            channel,
            voltage: 0.0,
            current: 0.0,
            output: OutputState::Off,
        }
    }

    /// Output power in watts: `voltage * current` while on, otherwise zero.
    pub fn power(&self) -> f64 {
        if self.output.is_on() {
            self.voltage * self.current
        } else {
            0.0
        }
    }

    /// Take a measurement of this channel at `timestamp`.
    pub fn reading(&self, timestamp: NaiveDateTime) -> TelemetryReading {
        TelemetryReading {
            voltage: self.voltage,
            current: self.current,
            state: self.output,
            power: self.power(),
            timestamp,
        }
    }
}

/// A point-in-time measurement of one channel.
///
/// Readings are produced on demand and never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    /// Voltage in volts.
    pub voltage: f64,
    /// Current in amperes.
    pub current: f64,
    /// Output state.
    pub state: OutputState,
    /// Output power in watts (zero while off).
    pub power: f64,
    /// Capture time (local wall clock).
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
}

/// Measurements of every channel, keyed by channel.
pub type Telemetry = BTreeMap<ChannelId, TelemetryReading>;

/// Format a timestamp with [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp written with [`TIMESTAMP_FORMAT`].
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), TIMESTAMP_FORMAT)
        .map_err(|e| Error::Protocol(format!("bad timestamp '{text}': {e}")))
}

mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        timestamp: &NaiveDateTime,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(timestamp))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<NaiveDateTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_timestamp(&text).map_err(serde::de::Error::custom)
    }
}
