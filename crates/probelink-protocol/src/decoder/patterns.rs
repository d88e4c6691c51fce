//! Compiled patterns, built once on first use.
//!
//! All patterns are literals; a failure to compile is a programming error
//! caught by the test suite, hence the `expect`.

use once_cell::sync::Lazy;
use regex::Regex;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("decoder pattern must compile")
}

// ----------------------------------------------------------------------------
// Record start lines
// ----------------------------------------------------------------------------

pub static AP_START: Lazy<Regex> = Lazy::new(|| compile(r"^AP #(\d+):[ \t]*([^,\n]*)"));
pub static BLE_START: Lazy<Regex> = Lazy::new(|| compile(r"^BLE #(\d+):[ \t]*([^,\n]*)"));
pub static STA_START: Lazy<Regex> = Lazy::new(|| compile(r"^STA #(\d+):[ \t]*([^,\n]*)"));
pub static SVC_START: Lazy<Regex> = Lazy::new(|| compile(r"^SVC #(\d+):[ \t]*([^\n]*)"));
pub static TRACKER_START: Lazy<Regex> =
    Lazy::new(|| compile(r"^TRACKER #(\d+):[ \t]*([^,\n]*)"));
pub static HANDSHAKE_START: Lazy<Regex> =
    Lazy::new(|| compile(r"^HANDSHAKE\b(?:[ \t]+CAPTURED)?:?[ \t]*([^\n]*)"));
pub static GPS_START: Lazy<Regex> = Lazy::new(|| compile(r"^GPS FIX\b"));

// ----------------------------------------------------------------------------
// Field values
// ----------------------------------------------------------------------------

pub static MAC_ADDRESS: Lazy<Regex> =
    Lazy::new(|| compile(r"^(?i)[0-9a-f]{2}(?::[0-9a-f]{2}){5}$"));
pub static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| compile(r"^\s*(-?\d+(?:\.\d+)?)"));
pub static KEY_VALUE: Lazy<Regex> =
    Lazy::new(|| compile(r"^\s*([A-Za-z][\w .-]*?)\s*[=:]\s*(.*?)\s*$"));

// ----------------------------------------------------------------------------
// Storage
// ----------------------------------------------------------------------------

pub static SD_READ_BEGIN: Lazy<Regex> = Lazy::new(|| compile(r"SD:READ:LENGTH:(\d+)"));
pub static SD_WRITE_OK: Lazy<Regex> = Lazy::new(|| compile(r"^SD:WRITE:OK(?::(\d+))?"));
pub static SD_ERROR: Lazy<Regex> =
    Lazy::new(|| compile(r"^SD:(?:[A-Z]+:)?ERROR:?[ \t]*(.*)$"));
pub static SD_FILE: Lazy<Regex> =
    Lazy::new(|| compile(r"^FILE:[ \t]*(.+?)[ \t]+(\d+)(?:[ \t]*bytes)?$"));
pub static SD_DIR: Lazy<Regex> = Lazy::new(|| compile(r"^DIR:[ \t]*(.+)$"));
pub static PCAP_SAVED: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)^(?:pcap|capture)\s+saved(?:\s+to)?:?\s*(\S+)(?:\s*\((\d+)\s+packets?\))?")
});

// ----------------------------------------------------------------------------
// Scans and attacks
// ----------------------------------------------------------------------------

pub static SCAN_STARTING: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)^(?:starting|started)\s+(\S.*?)\s+scan\b"));
pub static SCAN_STARTED: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)^scan(?:ning)?\s+started\b(?:\s+(?:for|on)\s+(.+?))?\.*$"));
pub static SCAN_COMPLETE: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)^scan\s+(?:complete|completed|finished|done)\b(?:\D*?(\d+))?")
});
pub static SCAN_STOPPED: Lazy<Regex> = Lazy::new(|| compile(r"(?i)^scan(?:ning)?\s+stopped\b"));

const ATTACKS: &str = r"deauth|beacon spam|probe flood|evil portal|karma|rickroll";

pub static DEAUTH_PROGRESS: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)^deauth\w*:?\s+(\d+)\s+(?:packets|frames)\b"));
pub static BEACON_PROGRESS: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)^beacons?\s+sent:?\s*(\d+)"));
pub static ATTACK_STARTED: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"(?i)^({ATTACKS})\s+(?:attack\s+)?started\b(?:\s+(?:on|against)\s+(.+?))?\.*$"
    ))
});
pub static ATTACK_STOPPED: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"(?i)^(?:({ATTACKS})\s+(?:attack\s+)?stopped|(?:all\s+)?attacks?\s+stopped)\b"
    ))
});

// ----------------------------------------------------------------------------
// Link
// ----------------------------------------------------------------------------

pub static CONNECTED: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)^connected to\s+(.+?)(?:\s*\((?:ip:?\s*)?(\d{1,3}(?:\.\d{1,3}){3})\))?$")
});
pub static DISCONNECTED: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)^disconnected\b(?:\s+from\s+([^(]+?))?(?:\s*\((?:reason:?\s*)?([^)]*)\))?\s*$")
});
pub static CHANNEL_SET: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)^(?:channel\s+(?:set|changed)\s+to|set\s+channel|channel)\s*:?\s*(\d+)\s*$")
});

// ----------------------------------------------------------------------------
// System
// ----------------------------------------------------------------------------

pub static VERSION: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)^(?:firmware\s+)?version:?\s*v?(\d+\.\d+(?:\.\d+)?[\w.+-]*)"));
pub static HEAP: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)^free\s+heap:?\s*(\d+)(?:\s*bytes)?(?:.*?\bmin(?:imum)?(?:\s+free)?:?\s*(\d+))?")
});
pub static UPTIME: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)^uptime:?\s*(\d+)\s*(ms|s|sec|secs|seconds|m|min|minutes|h|hours)?\b")
});
pub static UNKNOWN_COMMAND: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)^unknown\s+command:?\s*(.+?)\s*$"));
pub static ACK: Lazy<Regex> = Lazy::new(|| compile(r"^(?:OK|ACK)(?:[:\s]\s*(.*?))?\s*$"));
pub static ERROR: Lazy<Regex> = Lazy::new(|| compile(r"(?i)^(?:error|err)\b:?\s*(.*?)\s*$"));
