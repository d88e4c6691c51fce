//! Single-line status and acknowledgement decoding.

use super::fields::{number, text};
use super::patterns::*;
use super::response::{ResponseKind, SoftParseError};

fn group(caps: &regex::Captures<'_>, i: usize) -> Option<String> {
    text(caps.get(i).map(|m| m.as_str()))
}

fn uptime_seconds(value: u64, unit: Option<&str>) -> u64 {
    match unit.map(str::to_ascii_lowercase).as_deref() {
        Some("ms") => value / 1000,
        Some("m" | "min" | "minutes") => value.saturating_mul(60),
        Some("h" | "hours") => value.saturating_mul(3600),
        _ => value,
    }
}

/// Try every single-line pattern, most specific first.
pub(super) fn decode(line: &str, issues: &mut Vec<SoftParseError>) -> Option<ResponseKind> {
    let line = line.trim();

    if let Some(caps) = SD_READ_BEGIN.captures(line) {
        let length = number("length", &caps[1], issues)?;
        return Some(ResponseKind::SdReadBegin { length });
    }
    if let Some(caps) = SD_WRITE_OK.captures(line) {
        let bytes = caps
            .get(1)
            .and_then(|m| number("bytes", m.as_str(), issues));
        return Some(ResponseKind::SdWriteOk { bytes });
    }
    if let Some(caps) = SD_ERROR.captures(line) {
        return Some(ResponseKind::SdError {
            message: group(&caps, 1).unwrap_or_default(),
        });
    }
    if let Some(caps) = SD_FILE.captures(line) {
        let size = number("size", &caps[2], issues)?;
        return Some(ResponseKind::SdFileEntry {
            path: caps[1].to_string(),
            size,
        });
    }
    if let Some(caps) = SD_DIR.captures(line) {
        return Some(ResponseKind::SdDirEntry {
            path: caps[1].trim().to_string(),
        });
    }
    if let Some(caps) = UNKNOWN_COMMAND.captures(line) {
        return Some(ResponseKind::UnknownCommand {
            command: caps[1].to_string(),
        });
    }
    if let Some(caps) = PCAP_SAVED.captures(line) {
        return Some(ResponseKind::PcapSaved {
            path: caps[1].to_string(),
            packets: caps
                .get(2)
                .and_then(|m| number("packets", m.as_str(), issues)),
        });
    }
    if SCAN_STOPPED.is_match(line) {
        return Some(ResponseKind::ScanStopped);
    }
    if let Some(caps) = SCAN_COMPLETE.captures(line) {
        return Some(ResponseKind::ScanComplete {
            count: caps
                .get(1)
                .and_then(|m| number("count", m.as_str(), issues)),
        });
    }
    if let Some(caps) = SCAN_STARTING
        .captures(line)
        .or_else(|| SCAN_STARTED.captures(line))
    {
        return Some(ResponseKind::ScanStarted {
            target: group(&caps, 1),
        });
    }
    if let Some(caps) = DEAUTH_PROGRESS.captures(line) {
        let packets = number("packets", &caps[1], issues)?;
        return Some(ResponseKind::DeauthProgress { packets });
    }
    if let Some(caps) = BEACON_PROGRESS.captures(line) {
        let beacons = number("beacons", &caps[1], issues)?;
        return Some(ResponseKind::BeaconProgress { beacons });
    }
    if let Some(caps) = ATTACK_STARTED.captures(line) {
        return Some(ResponseKind::AttackStarted {
            attack: caps[1].to_ascii_lowercase(),
            target: group(&caps, 2),
        });
    }
    if let Some(caps) = ATTACK_STOPPED.captures(line) {
        return Some(ResponseKind::AttackStopped {
            attack: group(&caps, 1).map(|a| a.to_ascii_lowercase()),
        });
    }
    if let Some(caps) = CONNECTED.captures(line) {
        return Some(ResponseKind::Connected {
            ssid: caps[1].to_string(),
            ip: group(&caps, 2),
        });
    }
    if let Some(caps) = DISCONNECTED.captures(line) {
        return Some(ResponseKind::Disconnected {
            ssid: group(&caps, 1),
            reason: group(&caps, 2),
        });
    }
    if let Some(caps) = CHANNEL_SET.captures(line) {
        let channel = number("channel", &caps[1], issues)?;
        return Some(ResponseKind::ChannelSet { channel });
    }
    if let Some(caps) = VERSION.captures(line) {
        return Some(ResponseKind::Version {
            version: caps[1].to_string(),
        });
    }
    if let Some(caps) = HEAP.captures(line) {
        let free = number("free", &caps[1], issues)?;
        return Some(ResponseKind::Heap {
            free,
            min_free: caps
                .get(2)
                .and_then(|m| number("min_free", m.as_str(), issues)),
        });
    }
    if let Some(caps) = UPTIME.captures(line) {
        let value = number("uptime", &caps[1], issues)?;
        return Some(ResponseKind::Uptime {
            seconds: uptime_seconds(value, caps.get(2).map(|m| m.as_str())),
        });
    }
    if let Some(caps) = ACK.captures(line) {
        return Some(ResponseKind::Ack {
            detail: group(&caps, 1),
        });
    }
    if let Some(caps) = ERROR.captures(line) {
        return Some(ResponseKind::Error {
            message: group(&caps, 1).unwrap_or_default(),
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn kind(line: &str) -> Option<ResponseKind> {
        decode(line, &mut Vec::new())
    }

    #[rstest]
    #[case("SD:READ:LENGTH:512", ResponseKind::SdReadBegin { length: 512 })]
    #[case("SD:WRITE:OK:64", ResponseKind::SdWriteOk { bytes: Some(64) })]
    #[case("SD:READ:ERROR: no such file", ResponseKind::SdError { message: "no such file".into() })]
    #[case("FILE: /cap/1.pcap 2048 bytes", ResponseKind::SdFileEntry { path: "/cap/1.pcap".into(), size: 2048 })]
    #[case("DIR: /cap", ResponseKind::SdDirEntry { path: "/cap".into() })]
    #[case("Unknown command: foo", ResponseKind::UnknownCommand { command: "foo".into() })]
    #[case("PCAP saved to /cap/2.pcap (120 packets)", ResponseKind::PcapSaved { path: "/cap/2.pcap".into(), packets: Some(120) })]
    #[case("Scan stopped", ResponseKind::ScanStopped)]
    #[case("Scan complete: 14 networks", ResponseKind::ScanComplete { count: Some(14) })]
    #[case("Starting AP scan...", ResponseKind::ScanStarted { target: Some("AP".into()) })]
    #[case("Deauth: 200 packets sent", ResponseKind::DeauthProgress { packets: 200 })]
    #[case("Beacons sent: 1500", ResponseKind::BeaconProgress { beacons: 1500 })]
    #[case("Deauth attack started on HomeNet", ResponseKind::AttackStarted { attack: "deauth".into(), target: Some("HomeNet".into()) })]
    #[case("All attacks stopped", ResponseKind::AttackStopped { attack: None })]
    #[case("Connected to HomeNet (IP: 10.0.0.2)", ResponseKind::Connected { ssid: "HomeNet".into(), ip: Some("10.0.0.2".into()) })]
    #[case("Disconnected from HomeNet (reason: 8)", ResponseKind::Disconnected { ssid: Some("HomeNet".into()), reason: Some("8".into()) })]
    #[case("Channel set to 11", ResponseKind::ChannelSet { channel: 11 })]
    #[case("Version: v1.4.2", ResponseKind::Version { version: "1.4.2".into() })]
    #[case("Free heap: 123456 bytes, min: 98000", ResponseKind::Heap { free: 123456, min_free: Some(98000) })]
    #[case("Uptime: 5 min", ResponseKind::Uptime { seconds: 300 })]
    #[case("Uptime: 4500ms", ResponseKind::Uptime { seconds: 4 })]
    #[case("OK", ResponseKind::Ack { detail: None })]
    #[case("ERROR: bad argument", ResponseKind::Error { message: "bad argument".into() })]
    fn test_status_lines(#[case] line: &str, #[case] expected: ResponseKind) {
        assert_eq!(kind(line), Some(expected));
    }

    #[test]
    fn test_sd_error_before_generic_error() {
        assert!(matches!(kind("SD:ERROR: card missing"), Some(ResponseKind::SdError { .. })));
    }

    #[test]
    fn test_unmatched_line() {
        assert_eq!(kind("hello world"), None);
    }
}
