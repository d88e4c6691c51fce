//! Typed decoding of completed records.
//!
//! [`decode`] is pure and stateless: the same text always yields the same
//! [`Decoded`] value. It is meant to be called lazily by whoever consumes a
//! record, not on every line.
//!
//! # Cascade
//!
//! Patterns are tried most specific first, so that a generic shape never
//! shadows a specific one:
//!
//! ```text
//! "Chip Information: ..."   -> ChipInfo
//! "=== WIFI STATUS ==="     -> WifiStatus
//! "STA #n: ..."             -> Station
//! "AP #n: ..."              -> AccessPoint
//! "BLE #n: ..."             -> BleDevice
//! "TRACKER #n: ..."         -> Tracker
//! "SVC #n: ..."             -> MdnsService
//! "HANDSHAKE ..."           -> Handshake
//! "GPS FIX ..."             -> GpsFix
//! single-line statuses      -> ScanStarted, SdReadBegin, Heap, ...
//! anything else             -> Unclassified
//! ```
//!
//! A record whose shape matched but which lacks a required field (an AP
//! without BSSID, for instance) falls back to `Unclassified` and carries a
//! [`SoftParseError::MissingRequired`]. Missing optional fields never fail a
//! record.
//!
//! # Example
//!
//! ```
//! use probelink_protocol::decoder::{ResponseKind, decode};
//!
//! let decoded = decode("AP #1: HomeNet, BSSID: AA:BB:CC:DD:EE:FF, RSSI: -61, Channel: 6");
//! match decoded.kind {
//!     ResponseKind::AccessPoint(ap) => {
//!         assert_eq!(ap.ssid, "HomeNet");
//!         assert_eq!(ap.bssid, "aa:bb:cc:dd:ee:ff");
//!         assert_eq!(ap.rssi, -61);
//!         assert_eq!(ap.channel, Some(6));
//!     }
//!     other => panic!("unexpected {other}"),
//! }
//! ```

mod fields;
mod patterns;
mod records;
mod response;
mod status;

use probelink_core::constants::{CHIPINFO_RECORD_PREFIX, WIFI_STATUS_START_MARKER};

pub use response::*;

use patterns::{
    AP_START, BLE_START, GPS_START, HANDSHAKE_START, STA_START, SVC_START, TRACKER_START,
};

/// Decode one record into its typed form.
pub fn decode(text: &str) -> Decoded {
    let mut issues = Vec::new();
    let kind = classify(text.trim(), &mut issues);
    Decoded { kind, issues }
}

fn classify(text: &str, issues: &mut Vec<SoftParseError>) -> ResponseKind {
    if let Some(body) = text.strip_prefix(CHIPINFO_RECORD_PREFIX) {
        return records::chip_info(body, text, issues);
    }
    if text.starts_with(WIFI_STATUS_START_MARKER) {
        return records::wifi_status(text, issues);
    }
    if let Some(caps) = STA_START.captures(text) {
        return records::station(&caps, text, issues);
    }
    if let Some(caps) = AP_START.captures(text) {
        return records::access_point(&caps, text, issues);
    }
    if let Some(caps) = BLE_START.captures(text) {
        return records::ble_device(&caps, text, issues);
    }
    if let Some(caps) = TRACKER_START.captures(text) {
        return records::tracker(&caps, text, issues);
    }
    if let Some(caps) = SVC_START.captures(text) {
        return records::mdns_service(&caps, text, issues);
    }
    if let Some(caps) = HANDSHAKE_START.captures(text) {
        return records::handshake(&caps, text, issues);
    }
    if GPS_START.is_match(text) {
        return records::gps_fix(text, issues);
    }

    // Status lines are single-line; a multi-line text is never one.
    if !text.contains('\n') {
        if let Some(kind) = status::decode(text, issues) {
            return kind;
        }
    }

    ResponseKind::Unclassified(text.to_string())
}
