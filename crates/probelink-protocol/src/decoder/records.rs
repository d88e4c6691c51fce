//! Decoders for aggregated multi-line records.

use regex::Captures;
use std::collections::BTreeMap;
use tracing::warn;

use super::fields::{Segments, key_value, mac, number, optional_number, rssi, text};
use super::response::*;

fn index(caps: &Captures<'_>, issues: &mut Vec<SoftParseError>) -> Option<u32> {
    caps.get(1)
        .and_then(|m| number("index", m.as_str(), issues))
}

fn head<'t>(caps: &Captures<'t>) -> &'t str {
    caps.get(2).map_or("", |m| m.as_str().trim())
}

fn missing(
    record: &'static str,
    field: &'static str,
    raw: &str,
    issues: &mut Vec<SoftParseError>,
) -> ResponseKind {
    issues.push(SoftParseError::MissingRequired { record, field });
    ResponseKind::Unclassified(raw.to_string())
}

pub(super) fn access_point(
    caps: &Captures<'_>,
    raw: &str,
    issues: &mut Vec<SoftParseError>,
) -> ResponseKind {
    let segments = Segments::parse(raw);
    let Some(index) = index(caps, issues) else {
        return missing("access_point", "index", raw, issues);
    };
    let Some(bssid) = segments.get(&["BSSID"]).and_then(mac) else {
        return missing("access_point", "bssid", raw, issues);
    };

    ResponseKind::AccessPoint(AccessPoint {
        index,
        ssid: head(caps).to_string(),
        bssid,
        rssi: rssi(&segments, issues),
        channel: optional_number(&segments, &["Channel"], "channel", issues),
        auth: text(segments.get(&["Auth", "Encryption"])),
    })
}

pub(super) fn ble_device(
    caps: &Captures<'_>,
    raw: &str,
    issues: &mut Vec<SoftParseError>,
) -> ResponseKind {
    let segments = Segments::parse(raw);
    let Some(index) = index(caps, issues) else {
        return missing("ble_device", "index", raw, issues);
    };

    // Unnamed advertisers print their MAC on the start line.
    let head = head(caps);
    let head_mac = mac(head);
    let Some(mac_address) = segments.get(&["MAC"]).and_then(mac).or(head_mac.clone()) else {
        return missing("ble_device", "mac", raw, issues);
    };
    let name = text(segments.get(&["Name"]))
        .or_else(|| head_mac.is_none().then(|| text(Some(head))).flatten());

    ResponseKind::BleDevice(BleDevice {
        index,
        name,
        mac: mac_address,
        rssi: rssi(&segments, issues),
        device_type: text(segments.get(&["Type"])),
        manufacturer: text(segments.get(&["Manufacturer"])),
    })
}

pub(super) fn station(
    caps: &Captures<'_>,
    raw: &str,
    issues: &mut Vec<SoftParseError>,
) -> ResponseKind {
    let segments = Segments::parse(raw);
    let Some(index) = index(caps, issues) else {
        return missing("station", "index", raw, issues);
    };
    let Some(mac_address) = mac(head(caps)) else {
        return missing("station", "mac", raw, issues);
    };

    let ap_bssid = match segments.get(&["AP"]) {
        Some(value) => {
            let parsed = mac(value);
            if parsed.is_none() {
                issues.push(SoftParseError::InvalidField {
                    field: "ap",
                    value: value.to_string(),
                });
            }
            parsed
        }
        None => None,
    };

    ResponseKind::Station(Station {
        index,
        mac: mac_address,
        ap_bssid,
        rssi: rssi(&segments, issues),
        channel: optional_number(&segments, &["Channel"], "channel", issues),
        packets: optional_number(&segments, &["Packets"], "packets", issues),
    })
}

pub(super) fn mdns_service(
    caps: &Captures<'_>,
    raw: &str,
    issues: &mut Vec<SoftParseError>,
) -> ResponseKind {
    let segments = Segments::parse(raw);
    let Some(index) = index(caps, issues) else {
        return missing("mdns_service", "index", raw, issues);
    };
    let instance = head(caps);
    if instance.is_empty() {
        return missing("mdns_service", "instance", raw, issues);
    }

    ResponseKind::MdnsService(MdnsService {
        index,
        instance: instance.to_string(),
        service_type: text(segments.get(&["Type"])),
        host: text(segments.get(&["Host"])),
        ip: text(segments.get(&["IP"])),
        port: optional_number(&segments, &["Port"], "port", issues),
        txt: segments
            .all(&["TXT"])
            .into_iter()
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

pub(super) fn tracker(
    caps: &Captures<'_>,
    raw: &str,
    issues: &mut Vec<SoftParseError>,
) -> ResponseKind {
    let segments = Segments::parse(raw);
    let Some(index) = index(caps, issues) else {
        return missing("tracker", "index", raw, issues);
    };
    let Some(mac_address) = segments.get(&["MAC"]).and_then(mac) else {
        return missing("tracker", "mac", raw, issues);
    };

    let kind = text(segments.get(&["Type"])).unwrap_or_else(|| head(caps).to_string());

    ResponseKind::Tracker(Tracker {
        index,
        kind,
        mac: mac_address,
        rssi: rssi(&segments, issues),
        last_seen: text(segments.get(&["Last Seen"])),
    })
}

pub(super) fn handshake(
    caps: &Captures<'_>,
    raw: &str,
    issues: &mut Vec<SoftParseError>,
) -> ResponseKind {
    let segments = Segments::parse(raw);
    let Some(bssid) = segments.get(&["BSSID", "AP"]).and_then(mac) else {
        return missing("handshake", "bssid", raw, issues);
    };

    // "HANDSHAKE CAPTURED: <ssid>" names the network on the start line.
    let ssid = text(segments.get(&["SSID"])).or_else(|| {
        let title = caps.get(1).map_or("", |m| m.as_str());
        text(Some(title)).filter(|t| !t.contains(':'))
    });

    ResponseKind::Handshake(Handshake {
        ssid,
        bssid,
        client: segments.get(&["STA", "Client"]).and_then(mac),
        messages: optional_number(&segments, &["Messages"], "messages", issues),
        channel: optional_number(&segments, &["Channel"], "channel", issues),
        file: text(segments.get(&["File"])),
    })
}

pub(super) fn gps_fix(raw: &str, issues: &mut Vec<SoftParseError>) -> ResponseKind {
    let segments = Segments::parse(raw);
    let Some(latitude) = optional_number::<f64>(&segments, &["Lat"], "lat", issues) else {
        return missing("gps_fix", "lat", raw, issues);
    };
    let Some(longitude) = optional_number::<f64>(&segments, &["Lon"], "lon", issues) else {
        return missing("gps_fix", "lon", raw, issues);
    };

    ResponseKind::GpsFix(GpsFix {
        latitude,
        longitude,
        altitude: optional_number(&segments, &["Alt"], "alt", issues),
        satellites: optional_number(
            &segments,
            &["Sats", "Satellites"],
            "satellites",
            issues,
        ),
        hdop: optional_number(&segments, &["HDOP"], "hdop", issues),
        speed: optional_number(&segments, &["Speed"], "speed", issues),
        time: text(segments.get(&["Time"])),
    })
}

pub(super) fn wifi_status(raw: &str, issues: &mut Vec<SoftParseError>) -> ResponseKind {
    let fields: BTreeMap<String, String> = raw
        .lines()
        .filter(|line| !line.trim_start().starts_with("==="))
        .filter_map(key_value)
        .collect();

    let get = |key: &str| fields.get(key).map(String::as_str);
    let ssid = text(get("ssid"));
    let connected = match get("status").or_else(|| get("state")) {
        Some(status) => status.eq_ignore_ascii_case("connected"),
        None => ssid.is_some(),
    };
    let rssi = get("rssi").and_then(|v| number("rssi", v, issues));
    let channel = get("channel").and_then(|v| number("channel", v, issues));
    let ip = text(get("ip"));
    let mode = text(get("mode"));

    ResponseKind::WifiStatus(WifiStatus {
        connected,
        ssid,
        ip,
        rssi,
        channel,
        mode,
        fields,
    })
}

/// Map feature names onto [`ChipFeature`], dropping unknown names.
fn features(segments: &Segments<'_>, issues: &mut Vec<SoftParseError>) -> Vec<ChipFeature> {
    let listed = segments
        .all(&["Features", "Enabled Features"])
        .into_iter()
        .flat_map(|value| value.split(['/', '|', ',']));
    let candidates = listed.chain(segments.bare().iter().copied());

    let mut out = Vec::new();
    for name in candidates.map(str::trim).filter(|n| !n.is_empty()) {
        match ChipFeature::lookup(name) {
            Some(feature) if !out.contains(&feature) => out.push(feature),
            Some(_) => {}
            None => {
                warn!(feature = name, "Unknown chip feature ignored");
                issues.push(SoftParseError::UnknownFeature {
                    name: name.to_string(),
                });
            }
        }
    }
    out
}

pub(super) fn chip_info(body: &str, raw: &str, issues: &mut Vec<SoftParseError>) -> ResponseKind {
    let segments = Segments::parse(body);
    if segments.is_empty() {
        return missing("chip_info", "fields", raw, issues);
    }

    let model = text(segments.get(&["Chip Model", "Model"]));
    if model.is_none() {
        issues.push(SoftParseError::DefaultedField {
            field: "model",
            default: "none".to_string(),
        });
    }

    ResponseKind::ChipInfo(ChipInfo {
        model,
        revision: text(segments.get(&["Chip Revision", "Revision"])),
        cores: optional_number(&segments, &["Cores", "CPU Cores"], "cores", issues),
        cpu_freq_mhz: optional_number(
            &segments,
            &["CPU Freq", "CPU Frequency"],
            "cpu_freq",
            issues,
        ),
        flash_size: text(segments.get(&["Flash Size", "Flash"])),
        psram: text(segments.get(&["PSRAM", "PSRAM Size"])),
        mac: segments
            .get(&["MAC", "MAC Address"])
            .map(|m| mac(m).unwrap_or_else(|| m.to_string())),
        features: features(&segments, issues),
        idf_version: text(segments.get(&["IDF Version", "SDK Version"])),
    })
}
