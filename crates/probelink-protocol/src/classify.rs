//! Line classification for multi-line record aggregation.
//!
//! The firmware prints most scan results as a start line followed by a few
//! labelled or indented continuation lines:
//!
//! ```text
//! AP #3: HomeNet
//!   BSSID: aa:bb:cc:dd:ee:ff
//!   RSSI: -61
//!   Channel: 6
//! ```
//!
//! [`classify`] decides, for one cleaned line and the kind of record
//! currently being built, what role the line plays. All per-kind behaviour
//! (joiner, continuation labels, end marker) lives in [`RecordKind::rules`].

use probelink_core::constants::{WIFI_STATUS_END_MARKER, WIFI_STATUS_START_MARKER};
use serde::Serialize;
use std::fmt;

/// Kinds of multi-line records the aggregator can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    AccessPoint,
    BleDevice,
    Station,
    ServiceEntry,
    Tracker,
    Handshake,
    GpsFix,
    WifiStatus,
}

/// Aggregation rules for one record kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordRules {
    /// Separator placed between the accumulated lines.
    pub joiner: &'static str,

    /// Line prefixes that continue a record of this kind.
    pub labels: &'static [&'static str],

    /// Line that closes the record immediately.
    pub end_marker: Option<&'static str>,

    /// Every non-blank line continues the record until the end marker.
    pub block: bool,
}

impl RecordKind {
    /// Table of aggregation rules.
    ///
    /// # Examples
    ///
    /// ```
    /// use probelink_protocol::classify::RecordKind;
    ///
    /// assert_eq!(RecordKind::AccessPoint.rules().joiner, ", ");
    /// assert_eq!(RecordKind::ServiceEntry.rules().joiner, "\n");
    /// assert!(RecordKind::WifiStatus.rules().end_marker.is_some());
    /// ```
    pub fn rules(&self) -> RecordRules {
        match self {
            RecordKind::AccessPoint => RecordRules {
                joiner: ", ",
                labels: &["BSSID:", "RSSI:", "Channel:", "Auth:", "Encryption:"],
                end_marker: None,
                block: false,
            },
            RecordKind::BleDevice => RecordRules {
                joiner: ", ",
                labels: &["MAC:", "RSSI:", "Name:", "Type:", "Manufacturer:"],
                end_marker: None,
                block: false,
            },
            RecordKind::Station => RecordRules {
                joiner: ", ",
                labels: &["AP:", "RSSI:", "Channel:", "Packets:"],
                end_marker: None,
                block: false,
            },
            RecordKind::ServiceEntry => RecordRules {
                joiner: "\n",
                labels: &["Type:", "Host:", "IP:", "Port:", "TXT:"],
                end_marker: None,
                block: false,
            },
            RecordKind::Tracker => RecordRules {
                joiner: ", ",
                labels: &["MAC:", "RSSI:", "Type:", "Last Seen:"],
                end_marker: None,
                block: false,
            },
            RecordKind::Handshake => RecordRules {
                joiner: "\n",
                labels: &[
                    "SSID:", "AP:", "BSSID:", "STA:", "Client:", "Messages:", "Channel:", "File:",
                ],
                end_marker: None,
                block: false,
            },
            RecordKind::GpsFix => RecordRules {
                joiner: "\n",
                labels: &[
                    "Lat:", "Lon:", "Alt:", "Sats:", "Satellites:", "HDOP:", "Speed:", "Time:",
                ],
                end_marker: None,
                block: false,
            },
            RecordKind::WifiStatus => RecordRules {
                joiner: "\n",
                labels: &[],
                end_marker: Some(WIFI_STATUS_END_MARKER),
                block: true,
            },
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind_str = match self {
            RecordKind::AccessPoint => "AccessPoint",
            RecordKind::BleDevice => "BleDevice",
            RecordKind::Station => "Station",
            RecordKind::ServiceEntry => "ServiceEntry",
            RecordKind::Tracker => "Tracker",
            RecordKind::Handshake => "Handshake",
            RecordKind::GpsFix => "GpsFix",
            RecordKind::WifiStatus => "WifiStatus",
        };
        write!(f, "{}", kind_str)
    }
}

/// Role of one line relative to the active record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// Opens a new record of the given kind.
    Start(RecordKind),

    /// Belongs to the active record.
    Continuation,

    /// Closes the active record.
    EndMarker,

    /// Empty or whitespace-only line.
    Blank,

    /// Stands on its own.
    Single,
}

/// Check for an indexed start line such as `AP #12:`.
fn indexed_start(line: &str, tag: &str) -> bool {
    let Some(rest) = line.strip_prefix(tag) else {
        return false;
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    digits > 0 && rest[digits..].starts_with(':')
}

/// Detect the kind of record a line starts, if any.
///
/// # Examples
///
/// ```
/// use probelink_protocol::classify::{RecordKind, detect_start};
///
/// assert_eq!(detect_start("AP #1: HomeNet"), Some(RecordKind::AccessPoint));
/// assert_eq!(detect_start("BLE #7: Tag"), Some(RecordKind::BleDevice));
/// assert_eq!(detect_start("AP #x: bad"), None);
/// ```
pub fn detect_start(line: &str) -> Option<RecordKind> {
    let line = line.trim();

    if line == WIFI_STATUS_START_MARKER {
        return Some(RecordKind::WifiStatus);
    }

    const INDEXED: [(&str, RecordKind); 5] = [
        ("AP #", RecordKind::AccessPoint),
        ("BLE #", RecordKind::BleDevice),
        ("STA #", RecordKind::Station),
        ("SVC #", RecordKind::ServiceEntry),
        ("TRACKER #", RecordKind::Tracker),
    ];
    for (tag, kind) in INDEXED {
        if indexed_start(line, tag) {
            return Some(kind);
        }
    }

    if line.starts_with("HANDSHAKE") {
        return Some(RecordKind::Handshake);
    }
    if line.starts_with("GPS FIX") {
        return Some(RecordKind::GpsFix);
    }

    None
}

/// Classify a cleaned line given the kind of the active record.
///
/// Pure: the result depends only on the arguments.
///
/// # Examples
///
/// ```
/// use probelink_protocol::classify::{LineClass, RecordKind, classify};
///
/// let active = Some(RecordKind::AccessPoint);
/// assert_eq!(classify("  RSSI: -40", active), LineClass::Continuation);
/// assert_eq!(classify("RSSI: -40", active), LineClass::Continuation);
/// assert_eq!(classify("Scan complete", active), LineClass::Single);
/// assert_eq!(classify("RSSI: -40", None), LineClass::Single);
/// ```
pub fn classify(line: &str, active: Option<RecordKind>) -> LineClass {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineClass::Blank;
    }

    if let Some(kind) = active {
        let rules = kind.rules();
        if rules.end_marker == Some(trimmed) {
            return LineClass::EndMarker;
        }
        if rules.block {
            return LineClass::Continuation;
        }
    }

    if let Some(kind) = detect_start(trimmed) {
        return LineClass::Start(kind);
    }

    if let Some(kind) = active {
        let indented = line.starts_with([' ', '\t']);
        let labelled = kind
            .rules()
            .labels
            .iter()
            .any(|label| trimmed.starts_with(label));
        if indented || labelled {
            return LineClass::Continuation;
        }
    }

    LineClass::Single
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("AP #1: HomeNet", Some(RecordKind::AccessPoint))]
    #[case("AP #123:", Some(RecordKind::AccessPoint))]
    #[case("STA #4: aa:bb:cc:dd:ee:ff", Some(RecordKind::Station))]
    #[case("SVC #0: printer", Some(RecordKind::ServiceEntry))]
    #[case("TRACKER #2: AirTag", Some(RecordKind::Tracker))]
    #[case("HANDSHAKE captured", Some(RecordKind::Handshake))]
    #[case("GPS FIX", Some(RecordKind::GpsFix))]
    #[case("=== WIFI STATUS ===", Some(RecordKind::WifiStatus))]
    #[case("AP #: missing index", None)]
    #[case("AP #1 no colon", None)]
    #[case("APPLE #1: no", None)]
    #[case("Scan started", None)]
    fn test_detect_start(#[case] line: &str, #[case] expected: Option<RecordKind>) {
        assert_eq!(detect_start(line), expected);
    }

    #[test]
    fn test_blank_always_blank() {
        assert_eq!(classify("", None), LineClass::Blank);
        assert_eq!(classify("   ", Some(RecordKind::WifiStatus)), LineClass::Blank);
    }

    #[test]
    fn test_new_start_while_active() {
        assert_eq!(
            classify("BLE #1: Tag", Some(RecordKind::AccessPoint)),
            LineClass::Start(RecordKind::BleDevice)
        );
        assert_eq!(
            classify("AP #2: Other", Some(RecordKind::AccessPoint)),
            LineClass::Start(RecordKind::AccessPoint)
        );
    }

    #[test]
    fn test_labels_are_per_kind() {
        // "Lat:" continues a GPS fix but not an access point.
        assert_eq!(classify("Lat: 1.0", Some(RecordKind::GpsFix)), LineClass::Continuation);
        assert_eq!(classify("Lat: 1.0", Some(RecordKind::AccessPoint)), LineClass::Single);
    }

    #[test]
    fn test_block_swallows_everything_until_end() {
        let active = Some(RecordKind::WifiStatus);
        assert_eq!(classify("ssid=HomeNet", active), LineClass::Continuation);
        assert_eq!(classify("AP #1: inside", active), LineClass::Continuation);
        assert_eq!(classify("=== END STATUS ===", active), LineClass::EndMarker);
    }

    #[test]
    fn test_end_marker_without_block_is_single() {
        assert_eq!(classify("=== END STATUS ===", None), LineClass::Single);
    }

    #[test]
    fn test_indented_without_active_is_single() {
        assert_eq!(classify("  BSSID: aa", None), LineClass::Single);
    }

    #[test]
    fn test_rules_table_is_consistent() {
        for kind in [
            RecordKind::AccessPoint,
            RecordKind::BleDevice,
            RecordKind::Station,
            RecordKind::ServiceEntry,
            RecordKind::Tracker,
            RecordKind::Handshake,
            RecordKind::GpsFix,
            RecordKind::WifiStatus,
        ] {
            let rules = kind.rules();
            assert!(rules.joiner == ", " || rules.joiner == "\n", "{kind}");
            assert_eq!(rules.block, rules.end_marker.is_some(), "{kind}");
        }
    }
}
