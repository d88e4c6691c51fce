//! Rendering of engine output for the terminal.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use probelink_engine::ResponseEnvelope;
use probelink_protocol::Decoded;
use probelink_transport::{PortInfo, ProbeOutcome};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One line of `--json` output.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputEvent<'a> {
    Line {
        text: &'a str,
    },
    Record {
        received_at: DateTime<Utc>,
        text: &'a str,
        decoded: &'a Decoded,
    },
    Binary {
        len: usize,
        saved_to: Option<&'a Path>,
    },
    Missed {
        sink: &'static str,
        count: u64,
    },
}

impl OutputEvent<'_> {
    pub fn to_json(&self) -> String {
        // Every field is plain data; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    pub json: bool,
}

impl Renderer {
    pub fn line(&self, text: &str) -> String {
        if self.json {
            OutputEvent::Line { text }.to_json()
        } else {
            text.to_string()
        }
    }

    /// Render a record, or `None` when the human view would only repeat the
    /// raw lines already printed.
    pub fn record(&self, envelope: &ResponseEnvelope) -> Option<String> {
        let decoded = envelope.decoded();
        if self.json {
            return Some(
                OutputEvent::Record {
                    received_at: envelope.received_at(),
                    text: envelope.text(),
                    decoded,
                }
                .to_json(),
            );
        }

        if !decoded.kind.is_classified() {
            return None;
        }
        let mut out = format!("  => {}: {}", decoded.kind, envelope.text().replace('\n', " | "));
        if decoded.has_issues() {
            let issues: Vec<String> = decoded.issues.iter().map(ToString::to_string).collect();
            out.push_str(&format!(" ({})", issues.join("; ")));
        }
        Some(out)
    }

    pub fn binary(&self, blob: &Bytes, saved_to: Option<&Path>) -> String {
        if self.json {
            return OutputEvent::Binary {
                len: blob.len(),
                saved_to,
            }
            .to_json();
        }
        match saved_to {
            Some(path) => format!("  => binary: {} bytes saved to {}", blob.len(), path.display()),
            None => format!("  => binary: {} bytes", blob.len()),
        }
    }

    pub fn missed(&self, sink: &'static str, count: u64) -> String {
        if self.json {
            OutputEvent::Missed { sink, count }.to_json()
        } else {
            format!("  => {count} {sink} item(s) dropped, output too slow")
        }
    }

    pub fn ports(&self, ports: &[PortInfo]) -> String {
        if self.json {
            return serde_json::to_string_pretty(ports).unwrap_or_default();
        }
        if ports.is_empty() {
            return "No serial ports found".to_string();
        }
        ports
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn probe(&self, outcome: &ProbeOutcome) -> String {
        if self.json {
            return serde_json::to_string_pretty(outcome).unwrap_or_default();
        }

        let mut out = String::new();
        for attempt in &outcome.attempts {
            let verdict = match (&attempt.error, attempt.printable_ratio) {
                (Some(error), _) => format!("error: {error}"),
                (None, Some(ratio)) => format!("{} bytes, {:.0}% printable", attempt.bytes_read, ratio * 100.0),
                (None, None) => "silent".to_string(),
            };
            out.push_str(&format!("{:>7}  {verdict}\n", attempt.baud_rate));
        }
        if outcome.detected {
            out.push_str(&format!("Detected {} baud", outcome.baud_rate));
        } else {
            out.push_str(&format!("No answer, falling back to {} baud", outcome.baud_rate));
        }
        out
    }
}

/// File name for a saved binary transfer.
pub fn blob_path(dir: &Path, at: DateTime<Utc>, seq: u64) -> PathBuf {
    dir.join(format!("transfer-{}-{seq}.bin", at.format("%Y%m%dT%H%M%S")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use probelink_transport::{PortKind, ProbeAttempt};

    const HUMAN: Renderer = Renderer { json: false };
    const JSON: Renderer = Renderer { json: true };

    #[test]
    fn test_line_json() {
        assert_eq!(JSON.line("OK"), r#"{"type":"line","text":"OK"}"#);
        assert_eq!(HUMAN.line("OK"), "OK");
    }

    #[test]
    fn test_unclassified_record_hidden_in_human_mode() {
        let envelope = ResponseEnvelope::new("boot noise", Utc::now());
        assert_eq!(HUMAN.record(&envelope), None);
        assert!(JSON.record(&envelope).unwrap().contains(r#""type":"record""#));
    }

    #[test]
    fn test_classified_record_human() {
        let envelope = ResponseEnvelope::new("Version: 1.4.2", Utc::now());
        assert_eq!(
            HUMAN.record(&envelope).as_deref(),
            Some("  => version: Version: 1.4.2")
        );
    }

    #[test]
    fn test_probe_summary() {
        let outcome = ProbeOutcome {
            baud_rate: 115_200,
            detected: false,
            attempts: vec![ProbeAttempt {
                baud_rate: 115_200,
                bytes_read: 0,
                printable_ratio: None,
                error: None,
            }],
        };
        assert_eq!(
            HUMAN.probe(&outcome),
            " 115200  silent\nNo answer, falling back to 115200 baud"
        );
    }

    #[test]
    fn test_ports_human() {
        assert_eq!(HUMAN.ports(&[]), "No serial ports found");
        let ports = [PortInfo::new("/dev/ttyUSB0", PortKind::Usb)];
        assert_eq!(HUMAN.ports(&ports), "/dev/ttyUSB0");
    }

    #[test]
    fn test_blob_path() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(
            blob_path(Path::new("/tmp/caps"), at, 3),
            PathBuf::from("/tmp/caps/transfer-20260301T123005-3.bin")
        );
    }
}
