//! Outgoing command encoding.
//!
//! The engine only needs the ASCII text of a command and how long the caller
//! expects the device to keep answering; CRLF is appended by the engine.

use std::fmt;
use std::time::Duration;

/// Default time a command's response is expected to take.
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(2);

/// Encoded form of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCommand {
    /// ASCII command text, without line terminator.
    pub text: String,

    /// Upper bound on how long the response may take.
    pub max_wait: Duration,
}

impl EncodedCommand {
    pub fn new(text: impl Into<String>, max_wait: Duration) -> Self {
        Self {
            text: text.into(),
            max_wait,
        }
    }

    /// Bytes written to the transport.
    ///
    /// # Examples
    ///
    /// ```
    /// use probelink_protocol::command::EncodedCommand;
    /// use std::time::Duration;
    ///
    /// let cmd = EncodedCommand::new("version", Duration::from_secs(1));
    /// assert_eq!(cmd.wire_bytes(), b"version\r\n".to_vec());
    /// ```
    pub fn wire_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.text.len() + 2);
        bytes.extend_from_slice(self.text.trim_end_matches(['\r', '\n']).as_bytes());
        bytes.extend_from_slice(b"\r\n");
        bytes
    }
}

/// Anything that can be turned into a command line.
pub trait EncodeCommand {
    fn encode(&self) -> EncodedCommand;
}

impl EncodeCommand for EncodedCommand {
    fn encode(&self) -> EncodedCommand {
        self.clone()
    }
}

/// Free-form command text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    pub text: String,
    pub max_wait: Duration,
}

impl RawCommand {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }
}

impl EncodeCommand for RawCommand {
    fn encode(&self) -> EncodedCommand {
        EncodedCommand::new(self.text.trim(), self.max_wait)
    }
}

/// Commonly used firmware commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    ScanAccessPoints,
    ScanBle,
    ScanStations,
    StopScan,
    ChipInfo,
    WifiStatus,
    Version,
    SdList { path: String },
    SdRead { path: String },
}

impl DeviceCommand {
    /// Command keyword as typed on the console.
    pub fn keyword(&self) -> &'static str {
        match self {
            DeviceCommand::ScanAccessPoints => "scanap",
            DeviceCommand::ScanBle => "scanble",
            DeviceCommand::ScanStations => "scansta",
            DeviceCommand::StopScan => "stopscan",
            DeviceCommand::ChipInfo => "chipinfo",
            DeviceCommand::WifiStatus => "wifistatus",
            DeviceCommand::Version => "version",
            DeviceCommand::SdList { .. } => "sd ls",
            DeviceCommand::SdRead { .. } => "sd read",
        }
    }

    fn max_wait(&self) -> Duration {
        match self {
            DeviceCommand::ScanAccessPoints | DeviceCommand::ScanStations => {
                Duration::from_secs(15)
            }
            DeviceCommand::ScanBle => Duration::from_secs(10),
            DeviceCommand::ChipInfo => Duration::from_secs(3),
            DeviceCommand::SdRead { .. } => Duration::from_secs(30),
            _ => DEFAULT_MAX_WAIT,
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceCommand::SdList { path } | DeviceCommand::SdRead { path } => {
                write!(f, "{} {}", self.keyword(), path)
            }
            _ => write!(f, "{}", self.keyword()),
        }
    }
}

impl EncodeCommand for DeviceCommand {
    fn encode(&self) -> EncodedCommand {
        EncodedCommand::new(self.to_string(), self.max_wait())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(DeviceCommand::ScanAccessPoints, "scanap")]
    #[case(DeviceCommand::ChipInfo, "chipinfo")]
    #[case(DeviceCommand::SdList { path: "/".into() }, "sd ls /")]
    #[case(DeviceCommand::SdRead { path: "/cap/1.pcap".into() }, "sd read /cap/1.pcap")]
    fn test_device_command_text(#[case] command: DeviceCommand, #[case] text: &str) {
        assert_eq!(command.encode().text, text);
    }

    #[test]
    fn test_raw_command_trims() {
        let encoded = RawCommand::new("  version \r\n").encode();
        assert_eq!(encoded.text, "version");
        assert_eq!(encoded.max_wait, DEFAULT_MAX_WAIT);
    }

    #[test]
    fn test_wire_bytes_single_crlf() {
        let encoded = EncodedCommand::new("scanap\r\n", Duration::from_secs(1));
        assert_eq!(encoded.wire_bytes(), b"scanap\r\n".to_vec());
    }

    #[test]
    fn test_chip_info_wait() {
        assert_eq!(DeviceCommand::ChipInfo.encode().max_wait, Duration::from_secs(3));
    }
}
