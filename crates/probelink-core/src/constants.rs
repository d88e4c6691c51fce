//! Wire-level constants and timing defaults for the serial-link engine.
//!
//! The remote firmware speaks a line-oriented text protocol over a USB-serial
//! link, with two embedded sub-protocols that need exact byte matching:
//! length-prefixed binary file reads, and a bracketed chip self-description.
//!
//! # Stream Shape
//!
//! ```text
//! > scanap\r\n                      <- echoed command (prompt stripped)
//! AP #1: HomeNet\r\n                <- record start
//!   BSSID: aa:bb:cc:dd:ee:ff\r\n    <- continuation
//! \r\n                              <- blank line flushes the record
//! SD:READ:LENGTH:5\r\n              <- binary header, next bytes are raw
//! \x00\x01\x02\x03\x04              <- payload
//! \nSD:READ:END:                    <- binary terminator
//! ```
//!
//! Markers are matched case-sensitively and byte-for-byte. Timing values are
//! defaults only; every one of them can be overridden through
//! [`EngineConfig`](crate::config::EngineConfig).

// ============================================================================
// Line Framing
// ============================================================================

/// Carriage return, one of the two line terminators.
pub const CR: u8 = b'\r';

/// Line feed, one of the two line terminators.
pub const LF: u8 = b'\n';

/// Escape byte that opens an ANSI control sequence.
pub const ESC: u8 = 0x1B;

/// Generic shell prompt prefix removed from echoed lines.
///
/// # Examples
///
/// ```
/// use probelink_core::constants::GENERIC_PROMPT;
///
/// let echoed = "> scanap";
/// assert_eq!(echoed.strip_prefix(GENERIC_PROMPT), Some("scanap"));
/// ```
pub const GENERIC_PROMPT: &str = "> ";

/// Default maximum length of a single line before it is force-emitted.
///
/// A device that never sends CR/LF must not grow the line buffer forever.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

// ============================================================================
// Binary Transfer
// ============================================================================

/// Token announcing a binary payload. Followed by the declared byte count.
///
/// ```text
/// SD:READ:LENGTH:1024
/// ^^^^^^^^^^^^^^^
/// ```
pub const BINARY_LENGTH_TOKEN: &str = "SD:READ:LENGTH:";

/// Literal sequence terminating a binary payload.
///
/// The leading newline is part of the terminator, not of the payload.
///
/// # Examples
///
/// ```
/// use probelink_core::constants::BINARY_TERMINATOR;
///
/// assert_eq!(BINARY_TERMINATOR.len(), 13);
/// assert_eq!(BINARY_TERMINATOR[0], b'\n');
/// ```
pub const BINARY_TERMINATOR: &[u8] = b"\nSD:READ:END:";

/// Largest buffer reserved up front for a payload.
///
/// The declared length comes from the device and is only a hint.
pub const BINARY_PREALLOC_LIMIT: usize = 64 * 1024;

/// Bytes a payload may run past its declared length before the transfer is
/// abandoned and the stream returns to line mode.
pub const BINARY_OVERRUN_SLACK: usize = 1024;

/// Default upper bound on a single payload, whatever the header declares.
pub const DEFAULT_MAX_BINARY_LENGTH: usize = 16 * 1024 * 1024;

// ============================================================================
// Structured Blocks
// ============================================================================

/// Marker printed by the firmware before the chip-info fields.
pub const CHIPINFO_START_MARKER: &str = "[CHIPINFO_START]";

/// Marker printed by the firmware after the chip-info fields.
pub const CHIPINFO_END_MARKER: &str = "[CHIPINFO_END]";

/// Prefix of the synthetic record produced by the chip-info collector.
pub const CHIPINFO_RECORD_PREFIX: &str = "Chip Information: ";

/// Opening line of the key=value wifi status block.
pub const WIFI_STATUS_START_MARKER: &str = "=== WIFI STATUS ===";

/// Closing line of the key=value wifi status block.
pub const WIFI_STATUS_END_MARKER: &str = "=== END STATUS ===";

/// Default command that makes the firmware describe its chip.
pub const DEFAULT_CHIPINFO_COMMAND: &str = "chipinfo";

// ============================================================================
// Aggregation Timing
// ============================================================================

/// Default idle time after which an in-progress record is flushed (milliseconds).
pub const DEFAULT_IDLE_FLUSH_MS: u64 = 500;

/// Default window after arming during which bare words count as chip-info
/// fields (milliseconds).
pub const DEFAULT_CHIPINFO_COLLECT_ALL_MS: u64 = 1500;

/// Default ceiling for a chip-info collection armed without a command
/// (milliseconds).
pub const DEFAULT_CHIPINFO_TIMEOUT_MS: u64 = 5000;

/// Default number of recent lines kept for retroactive chip-info seeding.
pub const DEFAULT_CHIPINFO_HISTORY: usize = 25;

/// Default number of chip-info fields after which the record is flushed.
pub const DEFAULT_CHIPINFO_MAX_FIELDS: usize = 32;

/// Longest bare line still considered a chip-info feature word.
pub const CHIPINFO_BARE_FIELD_MAX_LEN: usize = 40;

// ============================================================================
// Link Timing
// ============================================================================

/// Default timeout for a single transport read (milliseconds).
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

/// Default timeout for a command write (milliseconds).
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 1000;

/// Default timeout for opening the transport (milliseconds).
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Default hard limit for a graceful disconnect (milliseconds).
///
/// When exceeded, the engine force-resets instead of waiting.
pub const DEFAULT_DISCONNECT_TIMEOUT_MS: u64 = 2000;

/// Default period of the idle-flush ticker (milliseconds).
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 500;

/// Default delay between retries after a failed read (milliseconds).
pub const DEFAULT_READ_RETRY_DELAY_MS: u64 = 100;

/// Consecutive read errors after which the reader gives up.
pub const DEFAULT_MAX_CONSECUTIVE_READ_ERRORS: u32 = 5;

/// Default size of the reader's scratch buffer (bytes).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Number of connection state transitions kept for diagnostics.
pub const STATE_HISTORY_CAPACITY: usize = 32;

// ============================================================================
// Sinks
// ============================================================================

/// Default capacity of the raw-line broadcast sink.
pub const DEFAULT_LINE_SINK_CAPACITY: usize = 1024;

/// Default capacity of the structured-record broadcast sink.
pub const DEFAULT_RECORD_SINK_CAPACITY: usize = 512;

/// Default capacity of the binary-blob broadcast sink.
pub const DEFAULT_BINARY_SINK_CAPACITY: usize = 16;

// ============================================================================
// Auto-Baud Detection
// ============================================================================

/// Candidate baud rates, most likely first.
///
/// The first entry doubles as the fallback when no candidate answers.
///
/// # Examples
///
/// ```
/// use probelink_core::constants::BAUD_CANDIDATES;
///
/// assert_eq!(BAUD_CANDIDATES[0], 115_200);
/// assert!(BAUD_CANDIDATES.contains(&921_600));
/// ```
pub const BAUD_CANDIDATES: [u32; 8] = [
    115_200, 9_600, 57_600, 38_400, 19_200, 230_400, 460_800, 921_600,
];

/// Bytes written to the port while probing a baud rate.
pub const DEFAULT_PROBE_SEQUENCE: &[u8] = b"\r\n";

/// Default time to wait for an answer after sending the probe (milliseconds).
pub const DEFAULT_PROBE_SETTLE_MS: u64 = 200;

/// Default maximum number of bytes read back per candidate.
pub const DEFAULT_PROBE_READ_BYTES: usize = 256;

/// Minimum share of printable bytes for a candidate to be accepted.
pub const DEFAULT_PRINTABLE_THRESHOLD: f64 = 0.75;
