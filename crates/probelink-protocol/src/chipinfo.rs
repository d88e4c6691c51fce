//! Out-of-band collector for the chip self-description.
//!
//! The chip-info response does not follow the start/continuation shape of
//! other records: fields arrive in firmware-dependent order, with varying
//! indentation, interleaved with unrelated log output, and the feature list
//! is printed as bare words. The collector therefore matches lines by field
//! label instead of by adjacency, and runs beside the aggregator.
//!
//! # States
//!
//! ```text
//!            command sent / [CHIPINFO_START] / distinctive field
//!   ┌──────┐ ───────────────────────────────────────────────> ┌───────┐
//!   │ Idle │                                                  │ Armed │
//!   └──────┘ <─────────── flush (no fields) ───────────────── └───────┘
//!      ^                                                          │ field
//!      │   [CHIPINFO_END] / idle / ceiling / field count          v
//!      └─────────────────────────────────────────────────── ┌────────────┐
//!                      "Chip Information: ..." queued       │ Collecting │
//!                                                           └────────────┘
//! ```
//!
//! While idle, every line goes into a short history. Arming scans that
//! history so fields printed before the arm signal are not lost.
//!
//! A seeded line was not claimed when it arrived, so it has usually been
//! emitted as a single-line record already. It appears in both records.
//!
//! Some labels (`MAC:`) are shared with scan records. A line that continues
//! the record being aggregated by label, or any line inside a block record,
//! belongs to that record and is never claimed or remembered here.

use probelink_core::config::ChipInfoConfig;
use probelink_core::constants::{
    CHIPINFO_BARE_FIELD_MAX_LEN, CHIPINFO_END_MARKER, CHIPINFO_RECORD_PREFIX,
    CHIPINFO_START_MARKER,
};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::classify::{RecordKind, detect_start};

/// Labels accepted as chip-info fields while armed.
const FIELD_LABELS: &[&str] = &[
    "chip model",
    "model",
    "chip revision",
    "revision",
    "chip id",
    "cores",
    "cpu cores",
    "cpu freq",
    "cpu frequency",
    "flash size",
    "flash",
    "psram",
    "psram size",
    "mac",
    "mac address",
    "features",
    "enabled features",
    "idf version",
    "sdk version",
];

/// Labels specific enough to arm the collector on their own.
const ARMING_LABELS: &[&str] = &[
    "chip model",
    "chip revision",
    "chip id",
    "cpu freq",
    "cpu frequency",
    "flash size",
    "psram size",
    "enabled features",
    "idf version",
];

/// Collector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipInfoState {
    /// Recording history, waiting for an arm signal.
    Idle,
    /// Armed, no field collected yet.
    Armed,
    /// At least one field collected.
    Collecting,
}

/// What armed the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmSource {
    /// The chip-info command is about to be written.
    Command,
    /// Start marker or header line.
    Marker,
    /// A distinctive field label.
    Field,
}

/// Label part of a `Label: value` line, lowercased.
fn field_label(line: &str) -> Option<String> {
    let (label, _) = line.split_once(':')?;
    let label = label.trim();
    if label.is_empty() || label.len() > 24 {
        return None;
    }
    Some(label.to_ascii_lowercase())
}

fn is_field(line: &str) -> bool {
    field_label(line).is_some_and(|l| FIELD_LABELS.contains(&l.as_str()))
}

fn is_arming_field(line: &str) -> bool {
    field_label(line).is_some_and(|l| ARMING_LABELS.contains(&l.as_str()))
}

fn is_header(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.starts_with("chip info") || lower == "=== chip info ==="
}

/// Whether the aggregation record of `kind` owns this line.
fn continues_record(kind: RecordKind, line: &str) -> bool {
    let rules = kind.rules();
    rules.block || rules.labels.iter().any(|label| line.starts_with(label))
}

/// Short line without a colon, as printed in feature lists.
fn bare_word(line: &str) -> Option<&str> {
    let word = line.trim_start_matches(['-', '*', ' ']).trim();
    let plausible = !word.is_empty()
        && word.len() <= CHIPINFO_BARE_FIELD_MAX_LEN
        && !word.contains(':')
        && !word.starts_with('[')
        && !word.starts_with("===")
        && word.chars().any(|c| c.is_ascii_alphanumeric())
        && detect_start(word).is_none();
    plausible.then_some(word)
}

/// Side aggregator for the chip-info response.
///
/// # Example
///
/// ```
/// use probelink_core::config::ChipInfoConfig;
/// use probelink_protocol::chipinfo::{ArmSource, ChipInfoCollector};
/// use std::time::Duration;
/// use tokio::time::Instant;
///
/// let mut collector = ChipInfoCollector::new(&ChipInfoConfig::default());
/// let now = Instant::now();
///
/// collector.arm(now, ArmSource::Command, Duration::from_secs(3), Some("chipinfo"));
/// collector.observe("chipinfo", now);
/// collector.observe("Chip Model: ESP32-S3", now);
/// collector.observe("Cores: 2", now);
/// collector.observe("[CHIPINFO_END]", now);
///
/// assert_eq!(
///     collector.next_record(),
///     Some("Chip Information: Chip Model: ESP32-S3, Cores: 2".to_string())
/// );
/// ```
#[derive(Debug)]
pub struct ChipInfoCollector {
    state: ChipInfoState,
    fields: Vec<String>,
    history: VecDeque<String>,
    history_size: usize,
    max_fields: usize,
    idle_flush: Duration,
    collect_all_window: Duration,
    default_ceiling: Duration,
    armed_at: Option<Instant>,
    deadline: Option<Instant>,
    last_field_at: Option<Instant>,
    echo: Option<String>,
    records: VecDeque<String>,
}

impl ChipInfoCollector {
    pub fn new(config: &ChipInfoConfig) -> Self {
        Self {
            state: ChipInfoState::Idle,
            fields: Vec::new(),
            history: VecDeque::with_capacity(config.history_size),
            history_size: config.history_size,
            max_fields: config.max_fields,
            idle_flush: config.idle_flush(),
            collect_all_window: config.collect_all_window(),
            default_ceiling: config.timeout(),
            armed_at: None,
            deadline: None,
            last_field_at: None,
            echo: None,
            records: VecDeque::new(),
        }
    }

    /// Arm the collector.
    ///
    /// `ceiling` bounds the whole collection. `echo` is the command text
    /// whose echo must not be taken for a field. Arming while already armed
    /// only extends the ceiling.
    pub fn arm(&mut self, now: Instant, source: ArmSource, ceiling: Duration, echo: Option<&str>) {
        self.deadline = Some(now + ceiling);
        if let Some(echo) = echo {
            self.echo = Some(echo.trim().to_string());
        }

        if self.state != ChipInfoState::Idle {
            return;
        }

        debug!(?source, "Chip-info collector armed");
        self.state = ChipInfoState::Armed;
        self.armed_at = Some(now);

        let seeded: Vec<String> = self
            .history
            .drain(..)
            .filter(|line| is_field(line))
            .collect();
        for field in seeded {
            self.push_field(field, now);
        }
    }

    /// Offer one cleaned line to the collector.
    ///
    /// Returns `true` when the collector claimed the line (a field, a marker,
    /// a header or the command echo). Claimed lines must not be emitted as
    /// ordinary single-line records.
    pub fn observe(&mut self, line: &str, now: Instant) -> bool {
        self.observe_beside(line, now, None)
    }

    /// Offer a line while a record of kind `active` is being aggregated.
    ///
    /// Lines that continue that record are left to the aggregator.
    pub fn observe_beside(&mut self, line: &str, now: Instant, active: Option<RecordKind>) -> bool {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return false;
        }

        if trimmed == CHIPINFO_START_MARKER {
            self.arm(now, ArmSource::Marker, self.default_ceiling, None);
            return true;
        }

        if trimmed == CHIPINFO_END_MARKER {
            self.flush();
            return true;
        }

        if active.is_some_and(|kind| continues_record(kind, trimmed)) {
            return false;
        }

        if self.state == ChipInfoState::Idle {
            if is_header(trimmed) {
                self.arm(now, ArmSource::Marker, self.default_ceiling, None);
                return true;
            }
            if is_arming_field(trimmed) {
                self.arm(now, ArmSource::Field, self.default_ceiling, None);
                self.push_field(trimmed.to_string(), now);
                return true;
            }
            self.remember(trimmed);
            return false;
        }

        if self
            .echo
            .as_deref()
            .is_some_and(|echo| trimmed.eq_ignore_ascii_case(echo))
        {
            return true;
        }

        if is_header(trimmed) {
            return true;
        }

        if is_field(trimmed) {
            self.push_field(trimmed.to_string(), now);
            return true;
        }

        if self.in_collect_all_window(now)
            && let Some(word) = bare_word(trimmed)
        {
            self.push_field(word.to_string(), now);
            return true;
        }

        false
    }

    fn in_collect_all_window(&self, now: Instant) -> bool {
        self.armed_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.collect_all_window)
    }

    fn remember(&mut self, line: &str) {
        if self.history.len() == self.history_size {
            self.history.pop_front();
        }
        self.history.push_back(line.to_string());
    }

    fn push_field(&mut self, field: String, now: Instant) {
        self.fields.push(field);
        self.state = ChipInfoState::Collecting;
        self.last_field_at = Some(now);

        if self.fields.len() >= self.max_fields {
            debug!(fields = self.fields.len(), "Chip-info field ceiling reached");
            self.flush();
        }
    }

    /// Flush on idle time since the last field or on the ceiling.
    ///
    /// Returns `true` when a record was queued. An armed collector that hit
    /// its ceiling without fields returns to idle silently.
    pub fn flush_idle(&mut self, now: Instant) -> bool {
        if self.state == ChipInfoState::Idle {
            return false;
        }

        let idle = self
            .last_field_at
            .is_some_and(|at| now.saturating_duration_since(at) >= self.idle_flush);
        let expired = self.deadline.is_some_and(|deadline| now >= deadline);

        if idle || expired {
            self.flush()
        } else {
            false
        }
    }

    /// Queue the collected fields as one record and return to idle.
    pub fn flush(&mut self) -> bool {
        let fields = std::mem::take(&mut self.fields);
        self.reset_collection();

        if fields.is_empty() {
            return false;
        }

        debug!(fields = fields.len(), "Chip-info record complete");
        self.records
            .push_back(format!("{CHIPINFO_RECORD_PREFIX}{}", fields.join(", ")));
        true
    }

    fn reset_collection(&mut self) {
        self.state = ChipInfoState::Idle;
        self.armed_at = None;
        self.deadline = None;
        self.last_field_at = None;
        self.echo = None;
        self.history.clear();
    }

    pub fn state(&self) -> ChipInfoState {
        self.state
    }

    /// Number of fields collected so far.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn next_record(&mut self) -> Option<String> {
        self.records.pop_front()
    }

    pub fn drain_records(&mut self) -> std::collections::vec_deque::Drain<'_, String> {
        self.records.drain(..)
    }

    /// Drop everything, including history.
    pub fn clear(&mut self) {
        self.fields.clear();
        self.reset_collection();
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> ChipInfoCollector {
        ChipInfoCollector::new(&ChipInfoConfig::default())
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_idle_collector_ignores_plain_lines() {
        let mut c = collector();
        let now = Instant::now();
        assert!(!c.observe("Scan started", now));
        assert!(!c.observe("Model: ESP32", now));
        assert_eq!(c.state(), ChipInfoState::Idle);
    }

    #[test]
    fn test_markers_bracket_collection() {
        let mut c = collector();
        let now = Instant::now();

        assert!(c.observe("[CHIPINFO_START]", now));
        assert_eq!(c.state(), ChipInfoState::Armed);
        assert!(c.observe("Model: ESP32-C6", now));
        assert!(c.observe("  Revision: 1", now));
        assert!(c.observe("[CHIPINFO_END]", now));

        assert_eq!(
            c.next_record(),
            Some("Chip Information: Model: ESP32-C6, Revision: 1".to_string())
        );
        assert_eq!(c.state(), ChipInfoState::Idle);
    }

    #[test]
    fn test_distinctive_field_arms() {
        let mut c = collector();
        let now = Instant::now();

        assert!(c.observe("Chip Model: ESP32-S3", now));
        assert_eq!(c.state(), ChipInfoState::Collecting);
        assert_eq!(c.field_count(), 1);
    }

    #[test]
    fn test_history_seeds_fields_on_arm() {
        let mut c = collector();
        let now = Instant::now();

        // Fields before the arm signal.
        c.observe("Model: ESP32", now);
        c.observe("unrelated log line", now);
        c.observe("Cores: 2", now);

        c.arm(now, ArmSource::Command, ms(3000), Some("chipinfo"));
        assert_eq!(c.field_count(), 2);

        c.observe("[CHIPINFO_END]", now);
        assert_eq!(
            c.next_record(),
            Some("Chip Information: Model: ESP32, Cores: 2".to_string())
        );
    }

    #[test]
    fn test_history_is_bounded() {
        let config = ChipInfoConfig {
            history_size: 2,
            ..ChipInfoConfig::default()
        };
        let mut c = ChipInfoCollector::new(&config);
        let now = Instant::now();

        c.observe("Model: ESP32", now);
        c.observe("noise 1", now);
        c.observe("noise 2", now);

        c.arm(now, ArmSource::Command, ms(3000), None);
        assert_eq!(c.field_count(), 0);
    }

    #[test]
    fn test_bare_words_only_inside_window() {
        let mut c = collector();
        let start = Instant::now();

        c.arm(start, ArmSource::Command, ms(5000), Some("chipinfo"));
        assert!(c.observe("chipinfo", start));
        assert_eq!(c.field_count(), 0);

        assert!(c.observe("Features:", start + ms(100)));
        assert!(c.observe("  - WiFi", start + ms(200)));
        assert!(c.observe("BLE", start + ms(300)));
        assert!(!c.observe("Embedded Flash", start + ms(1600)));

        c.flush();
        assert_eq!(
            c.next_record(),
            Some("Chip Information: Features:, WiFi, BLE".to_string())
        );
    }

    #[test]
    fn test_bare_word_rejects_record_starts_and_long_lines() {
        let mut c = collector();
        let now = Instant::now();
        c.arm(now, ArmSource::Command, ms(5000), None);

        assert!(!c.observe("AP #1: HomeNet", now));
        assert!(!c.observe(&"x".repeat(60), now));
        assert!(!c.observe("===", now));
    }

    #[test]
    fn test_idle_flush_after_last_field() {
        let mut c = collector();
        let start = Instant::now();

        c.observe("[CHIPINFO_START]", start);
        c.observe("Model: ESP32", start + ms(100));

        assert!(!c.flush_idle(start + ms(500)));
        assert!(c.flush_idle(start + ms(600)));
        assert!(c.next_record().is_some());
    }

    #[test]
    fn test_armed_without_fields_waits_for_ceiling() {
        let mut c = collector();
        let start = Instant::now();
        c.arm(start, ArmSource::Command, ms(2000), None);

        assert!(!c.flush_idle(start + ms(1000)));
        assert_eq!(c.state(), ChipInfoState::Armed);

        assert!(!c.flush_idle(start + ms(2000)));
        assert_eq!(c.state(), ChipInfoState::Idle);
        assert!(c.next_record().is_none());
    }

    #[test]
    fn test_ceiling_flushes_collected_fields() {
        let config = ChipInfoConfig {
            idle_flush_ms: 10_000,
            ..ChipInfoConfig::default()
        };
        let mut c = ChipInfoCollector::new(&config);
        let start = Instant::now();

        c.arm(start, ArmSource::Command, ms(1000), None);
        c.observe("Model: ESP32", start);
        assert!(c.flush_idle(start + ms(1000)));
    }

    #[test]
    fn test_field_count_ceiling() {
        let config = ChipInfoConfig {
            max_fields: 2,
            ..ChipInfoConfig::default()
        };
        let mut c = ChipInfoCollector::new(&config);
        let now = Instant::now();

        c.observe("[CHIPINFO_START]", now);
        c.observe("Model: A", now);
        c.observe("Cores: 2", now);

        assert_eq!(c.state(), ChipInfoState::Idle);
        assert_eq!(
            c.next_record(),
            Some("Chip Information: Model: A, Cores: 2".to_string())
        );
    }

    #[test]
    fn test_shared_label_left_to_active_record() {
        let mut c = collector();
        let now = Instant::now();
        c.arm(now, ArmSource::Command, ms(3000), Some("chipinfo"));

        let active = Some(RecordKind::BleDevice);
        assert!(!c.observe_beside("MAC: c0:ff:ee:00:11:22", now, active));
        assert!(!c.observe_beside("  MAC: c0:ff:ee:00:11:22", now, active));
        assert_eq!(c.field_count(), 0);

        // Without a record owning the label it is a chip field.
        assert!(c.observe_beside("MAC: 24:0a:c4:00:00:01", now, None));
        assert_eq!(c.field_count(), 1);
    }

    #[test]
    fn test_block_record_owns_every_line() {
        let mut c = collector();
        let now = Instant::now();

        let active = Some(RecordKind::WifiStatus);
        assert!(!c.observe_beside("Chip Model: ESP32", now, active));
        assert_eq!(c.state(), ChipInfoState::Idle);

        // Markers are still recognised.
        assert!(c.observe_beside("[CHIPINFO_START]", now, active));
        assert_eq!(c.state(), ChipInfoState::Armed);
    }

    #[test]
    fn test_owned_line_not_remembered() {
        let mut c = collector();
        let now = Instant::now();

        c.observe_beside("MAC: c0:ff:ee:00:11:22", now, Some(RecordKind::Tracker));
        c.arm(now, ArmSource::Command, ms(3000), None);
        assert_eq!(c.field_count(), 0);
    }

    #[test]
    fn test_end_marker_without_fields() {
        let mut c = collector();
        assert!(c.observe("[CHIPINFO_END]", Instant::now()));
        assert!(c.next_record().is_none());
    }
}
