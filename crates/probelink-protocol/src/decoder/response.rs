//! Typed response variants.
//!
//! Every variant carries only the fields that response can have. Fields the
//! firmware may omit are `Option`s; RSSI is the one field with a sentinel
//! default ([`UNKNOWN_RSSI`]).

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// RSSI reported when the record did not carry one.
pub const UNKNOWN_RSSI: i32 = -100;

/// Scanned access point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessPoint {
    pub index: u32,
    pub ssid: String,
    pub bssid: String,
    pub rssi: i32,
    pub channel: Option<u8>,
    pub auth: Option<String>,
}

/// Scanned BLE advertiser.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BleDevice {
    pub index: u32,
    pub name: Option<String>,
    pub mac: String,
    pub rssi: i32,
    pub device_type: Option<String>,
    pub manufacturer: Option<String>,
}

/// Client station seen on the air.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    pub index: u32,
    pub mac: String,
    pub ap_bssid: Option<String>,
    pub rssi: i32,
    pub channel: Option<u8>,
    pub packets: Option<u64>,
}

/// mDNS service entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MdnsService {
    pub index: u32,
    pub instance: String,
    pub service_type: Option<String>,
    pub host: Option<String>,
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub txt: Vec<String>,
}

/// Bluetooth tracker (tag) sighting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tracker {
    pub index: u32,
    pub kind: String,
    pub mac: String,
    pub rssi: i32,
    pub last_seen: Option<String>,
}

/// Captured WPA handshake.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Handshake {
    pub ssid: Option<String>,
    pub bssid: String,
    pub client: Option<String>,
    pub messages: Option<u8>,
    pub channel: Option<u8>,
    pub file: Option<String>,
}

/// GPS position fix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub satellites: Option<u32>,
    pub hdop: Option<f64>,
    pub speed: Option<f64>,
    pub time: Option<String>,
}

/// Key=value wifi status block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WifiStatus {
    pub connected: bool,
    pub ssid: Option<String>,
    pub ip: Option<String>,
    pub rssi: Option<i32>,
    pub channel: Option<u8>,
    pub mode: Option<String>,
    /// All keys, lowercased, including the ones above.
    pub fields: BTreeMap<String, String>,
}

/// Radio and memory features a chip may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChipFeature {
    Wifi,
    Ble,
    BluetoothClassic,
    Ieee802154,
    EmbeddedFlash,
    EmbeddedPsram,
}

impl ChipFeature {
    /// Exact-string lookup of a feature name as printed by the firmware.
    ///
    /// # Examples
    ///
    /// ```
    /// use probelink_protocol::decoder::ChipFeature;
    ///
    /// assert_eq!(ChipFeature::lookup("WiFi"), Some(ChipFeature::Wifi));
    /// assert_eq!(ChipFeature::lookup("Embedded PSRAM"), Some(ChipFeature::EmbeddedPsram));
    /// assert_eq!(ChipFeature::lookup("wifi"), None);
    /// ```
    pub fn lookup(name: &str) -> Option<Self> {
        const TABLE: &[(&str, ChipFeature)] = &[
            ("WiFi", ChipFeature::Wifi),
            ("Wi-Fi", ChipFeature::Wifi),
            ("WIFI", ChipFeature::Wifi),
            ("WiFi 2.4GHz", ChipFeature::Wifi),
            ("BLE", ChipFeature::Ble),
            ("Bluetooth LE", ChipFeature::Ble),
            ("BT", ChipFeature::BluetoothClassic),
            ("BT Classic", ChipFeature::BluetoothClassic),
            ("Bluetooth Classic", ChipFeature::BluetoothClassic),
            ("802.15.4", ChipFeature::Ieee802154),
            ("IEEE 802.15.4", ChipFeature::Ieee802154),
            ("Embedded Flash", ChipFeature::EmbeddedFlash),
            ("Embedded PSRAM", ChipFeature::EmbeddedPsram),
        ];
        TABLE
            .iter()
            .find(|(text, _)| *text == name)
            .map(|(_, feature)| *feature)
    }
}

/// Chip self-description.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChipInfo {
    pub model: Option<String>,
    pub revision: Option<String>,
    pub cores: Option<u8>,
    pub cpu_freq_mhz: Option<u32>,
    pub flash_size: Option<String>,
    pub psram: Option<String>,
    pub mac: Option<String>,
    pub features: Vec<ChipFeature>,
    pub idf_version: Option<String>,
}

/// Every response shape the decoder knows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ResponseKind {
    // Multi-line records
    AccessPoint(AccessPoint),
    BleDevice(BleDevice),
    Station(Station),
    MdnsService(MdnsService),
    Tracker(Tracker),
    Handshake(Handshake),
    GpsFix(GpsFix),
    WifiStatus(WifiStatus),
    ChipInfo(ChipInfo),

    // Scans and attacks
    ScanStarted { target: Option<String> },
    ScanComplete { count: Option<u32> },
    ScanStopped,
    AttackStarted { attack: String, target: Option<String> },
    AttackStopped { attack: Option<String> },
    DeauthProgress { packets: u64 },
    BeaconProgress { beacons: u64 },

    // Link
    Connected { ssid: String, ip: Option<String> },
    Disconnected { ssid: Option<String>, reason: Option<String> },
    ChannelSet { channel: u8 },

    // Storage
    SdFileEntry { path: String, size: u64 },
    SdDirEntry { path: String },
    SdReadBegin { length: u64 },
    SdWriteOk { bytes: Option<u64> },
    SdError { message: String },
    PcapSaved { path: String, packets: Option<u64> },

    // System
    Version { version: String },
    Heap { free: u64, min_free: Option<u64> },
    Uptime { seconds: u64 },
    Ack { detail: Option<String> },
    Error { message: String },
    UnknownCommand { command: String },

    /// No pattern matched, or a required field was missing.
    Unclassified(String),
}

impl ResponseKind {
    /// Short snake_case name of the variant.
    pub fn name(&self) -> &'static str {
        match self {
            ResponseKind::AccessPoint(_) => "access_point",
            ResponseKind::BleDevice(_) => "ble_device",
            ResponseKind::Station(_) => "station",
            ResponseKind::MdnsService(_) => "mdns_service",
            ResponseKind::Tracker(_) => "tracker",
            ResponseKind::Handshake(_) => "handshake",
            ResponseKind::GpsFix(_) => "gps_fix",
            ResponseKind::WifiStatus(_) => "wifi_status",
            ResponseKind::ChipInfo(_) => "chip_info",
            ResponseKind::ScanStarted { .. } => "scan_started",
            ResponseKind::ScanComplete { .. } => "scan_complete",
            ResponseKind::ScanStopped => "scan_stopped",
            ResponseKind::AttackStarted { .. } => "attack_started",
            ResponseKind::AttackStopped { .. } => "attack_stopped",
            ResponseKind::DeauthProgress { .. } => "deauth_progress",
            ResponseKind::BeaconProgress { .. } => "beacon_progress",
            ResponseKind::Connected { .. } => "connected",
            ResponseKind::Disconnected { .. } => "disconnected",
            ResponseKind::ChannelSet { .. } => "channel_set",
            ResponseKind::SdFileEntry { .. } => "sd_file_entry",
            ResponseKind::SdDirEntry { .. } => "sd_dir_entry",
            ResponseKind::SdReadBegin { .. } => "sd_read_begin",
            ResponseKind::SdWriteOk { .. } => "sd_write_ok",
            ResponseKind::SdError { .. } => "sd_error",
            ResponseKind::PcapSaved { .. } => "pcap_saved",
            ResponseKind::Version { .. } => "version",
            ResponseKind::Heap { .. } => "heap",
            ResponseKind::Uptime { .. } => "uptime",
            ResponseKind::Ack { .. } => "ack",
            ResponseKind::Error { .. } => "error",
            ResponseKind::UnknownCommand { .. } => "unknown_command",
            ResponseKind::Unclassified(_) => "unclassified",
        }
    }

    pub fn is_classified(&self) -> bool {
        !matches!(self, ResponseKind::Unclassified(_))
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Non-fatal problem found while decoding one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SoftParseError {
    /// Optional field missing, default used.
    DefaultedField { field: &'static str, default: String },

    /// Field present but unparsable, treated as missing.
    InvalidField { field: &'static str, value: String },

    /// Chip feature name not in the feature table; dropped.
    UnknownFeature { name: String },

    /// Required field missing; the record fell back to `Unclassified`.
    MissingRequired { record: &'static str, field: &'static str },
}

impl fmt::Display for SoftParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoftParseError::DefaultedField { field, default } => {
                write!(f, "{field} missing, defaulted to {default}")
            }
            SoftParseError::InvalidField { field, value } => {
                write!(f, "{field} has invalid value {value:?}")
            }
            SoftParseError::UnknownFeature { name } => write!(f, "unknown chip feature {name:?}"),
            SoftParseError::MissingRequired { record, field } => {
                write!(f, "{record} record without required {field}")
            }
        }
    }
}

/// Result of decoding one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decoded {
    pub kind: ResponseKind,
    pub issues: Vec<SoftParseError>,
}

impl Decoded {
    pub fn clean(kind: ResponseKind) -> Self {
        Self {
            kind,
            issues: Vec::new(),
        }
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }
}
