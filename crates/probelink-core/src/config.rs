//! Engine configuration.
//!
//! Every tunable of the engine lives here, grouped by the component that
//! consumes it. All sections deserialize with `#[serde(default)]`, so a
//! configuration file only needs the keys it wants to override:
//!
//! ```json
//! {
//!   "aggregation": { "idle_flush_ms": 750 },
//!   "link": { "dtr": false, "rts": false }
//! }
//! ```
//!
//! Durations are stored in milliseconds and exposed as [`Duration`] through
//! accessor methods.

use crate::{
    Error, Result,
    constants::*,
    types::{DataBits, LineParameters, Parity, StopBits},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Complete engine configuration.
///
/// # Examples
///
/// ```
/// use probelink_core::EngineConfig;
///
/// let config = EngineConfig::from_json_str(r#"{ "aggregation": { "idle_flush_ms": 250 } }"#)?;
/// assert_eq!(config.aggregation.idle_flush_ms, 250);
/// assert_eq!(config.chip_info.command, "chipinfo");
/// # Ok::<(), probelink_core::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub framing: FramingConfig,
    pub aggregation: AggregationConfig,
    pub chip_info: ChipInfoConfig,
    pub link: LinkConfig,
    pub sinks: SinkConfig,
    pub probe: ProbeConfig,
}

/// Byte framer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramingConfig {
    /// Device-specific shell prompt stripped from the start of lines.
    /// The generic `"> "` prompt is always stripped.
    pub prompt: Option<String>,

    /// Lines longer than this are force-emitted.
    pub max_line_length: usize,

    /// Payloads are abandoned past this size, whatever their header says.
    pub max_binary_length: usize,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            prompt: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_binary_length: DEFAULT_MAX_BINARY_LENGTH,
        }
    }
}

/// Multi-line record aggregation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Idle time after the last accepted line before a record is flushed.
    pub idle_flush_ms: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            idle_flush_ms: DEFAULT_IDLE_FLUSH_MS,
        }
    }
}

impl AggregationConfig {
    pub fn idle_flush(&self) -> Duration {
        Duration::from_millis(self.idle_flush_ms)
    }
}

/// Chip-info collector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChipInfoConfig {
    /// Outgoing command that arms the collector before it is written.
    pub command: String,

    /// Idle time after the last field before the collection is flushed.
    pub idle_flush_ms: u64,

    /// Window after arming during which bare words are accepted as fields.
    pub collect_all_window_ms: u64,

    /// Ceiling for a collection that was not armed by a command.
    pub timeout_ms: u64,

    /// Number of recent lines kept for retroactive seeding.
    pub history_size: usize,

    /// Field count that forces a flush.
    pub max_fields: usize,
}

impl Default for ChipInfoConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_CHIPINFO_COMMAND.to_string(),
            idle_flush_ms: DEFAULT_IDLE_FLUSH_MS,
            collect_all_window_ms: DEFAULT_CHIPINFO_COLLECT_ALL_MS,
            timeout_ms: DEFAULT_CHIPINFO_TIMEOUT_MS,
            history_size: DEFAULT_CHIPINFO_HISTORY,
            max_fields: DEFAULT_CHIPINFO_MAX_FIELDS,
        }
    }
}

impl ChipInfoConfig {
    pub fn idle_flush(&self) -> Duration {
        Duration::from_millis(self.idle_flush_ms)
    }

    pub fn collect_all_window(&self) -> Duration {
        Duration::from_millis(self.collect_all_window_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Connection and I/O settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,

    /// DTR level applied after opening. High keeps auto-reset circuits idle.
    pub dtr: bool,

    /// RTS level applied after opening.
    pub rts: bool,

    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub disconnect_timeout_ms: u64,
    pub tick_interval_ms: u64,
    pub read_retry_delay_ms: u64,

    /// Consecutive read failures after which the link enters `Error`.
    pub max_consecutive_read_errors: u32,

    pub read_buffer_size: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            dtr: true,
            rts: true,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            disconnect_timeout_ms: DEFAULT_DISCONNECT_TIMEOUT_MS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            read_retry_delay_ms: DEFAULT_READ_RETRY_DELAY_MS,
            max_consecutive_read_errors: DEFAULT_MAX_CONSECUTIVE_READ_ERRORS,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl LinkConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn read_retry_delay(&self) -> Duration {
        Duration::from_millis(self.read_retry_delay_ms)
    }

    /// Line parameters applied after opening at `baud_rate`.
    pub fn line_parameters(&self, baud_rate: u32) -> LineParameters {
        LineParameters {
            baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
        }
    }
}

/// Broadcast sink capacities.
///
/// When a sink is full the oldest unread item is dropped for lagging
/// observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub line_capacity: usize,
    pub record_capacity: usize,
    pub binary_capacity: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            line_capacity: DEFAULT_LINE_SINK_CAPACITY,
            record_capacity: DEFAULT_RECORD_SINK_CAPACITY,
            binary_capacity: DEFAULT_BINARY_SINK_CAPACITY,
        }
    }
}

/// Auto-baud detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Rates to try, in order. The first one is the fallback.
    pub candidates: Vec<u32>,

    /// Bytes written after opening each candidate.
    pub sequence: Vec<u8>,

    pub settle_ms: u64,
    pub max_read_bytes: usize,

    /// Minimum printable ratio, in `(0, 1]`.
    pub printable_threshold: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            candidates: BAUD_CANDIDATES.to_vec(),
            sequence: DEFAULT_PROBE_SEQUENCE.to_vec(),
            settle_ms: DEFAULT_PROBE_SETTLE_MS,
            max_read_bytes: DEFAULT_PROBE_READ_BYTES,
            printable_threshold: DEFAULT_PRINTABLE_THRESHOLD,
        }
    }
}

impl ProbeConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Rate used when no candidate produces readable output.
    pub fn fallback_rate(&self) -> u32 {
        self.candidates.first().copied().unwrap_or(BAUD_CANDIDATES[0])
    }
}

impl EngineConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Reject values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfigValue`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("aggregation.idle_flush_ms", self.aggregation.idle_flush_ms),
            ("chip_info.idle_flush_ms", self.chip_info.idle_flush_ms),
            ("chip_info.timeout_ms", self.chip_info.timeout_ms),
            ("link.read_timeout_ms", self.link.read_timeout_ms),
            ("link.write_timeout_ms", self.link.write_timeout_ms),
            ("link.connect_timeout_ms", self.link.connect_timeout_ms),
            ("link.disconnect_timeout_ms", self.link.disconnect_timeout_ms),
            ("link.tick_interval_ms", self.link.tick_interval_ms),
        ];
        for (key, value) in durations {
            if value == 0 {
                return Err(Error::invalid_value(key, "must be greater than zero"));
            }
        }

        let sizes = [
            ("framing.max_line_length", self.framing.max_line_length),
            ("framing.max_binary_length", self.framing.max_binary_length),
            ("chip_info.history_size", self.chip_info.history_size),
            ("chip_info.max_fields", self.chip_info.max_fields),
            ("link.read_buffer_size", self.link.read_buffer_size),
            ("sinks.line_capacity", self.sinks.line_capacity),
            ("sinks.record_capacity", self.sinks.record_capacity),
            ("sinks.binary_capacity", self.sinks.binary_capacity),
            ("probe.max_read_bytes", self.probe.max_read_bytes),
        ];
        for (key, value) in sizes {
            if value == 0 {
                return Err(Error::invalid_value(key, "must be greater than zero"));
            }
        }

        if self.link.max_consecutive_read_errors == 0 {
            return Err(Error::invalid_value(
                "link.max_consecutive_read_errors",
                "must be greater than zero",
            ));
        }

        if self.chip_info.command.trim().is_empty() {
            return Err(Error::invalid_value("chip_info.command", "must not be empty"));
        }

        if self.probe.candidates.is_empty() {
            return Err(Error::invalid_value(
                "probe.candidates",
                "at least one baud rate is required",
            ));
        }

        if self.probe.candidates.contains(&0) {
            return Err(Error::invalid_value("probe.candidates", "baud rate 0 is invalid"));
        }

        let threshold = self.probe.printable_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(Error::invalid_value(
                "probe.printable_threshold",
                format!("must be in (0, 1], got {threshold}"),
            ));
        }

        Ok(())
    }
}
