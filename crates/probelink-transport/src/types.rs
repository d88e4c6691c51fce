//! Types shared by the transport implementations and the baud probe.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of port, as far as the OS can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    Usb,
    Pci,
    Bluetooth,
    Unknown,
}

/// Description of an available serial port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3").
    pub name: String,

    pub kind: PortKind,

    /// USB vendor ID (if USB device).
    pub vid: Option<u16>,

    /// USB product ID (if USB device).
    pub pid: Option<u16>,

    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// Create a port description with only a name.
    pub fn new(name: impl Into<String>, kind: PortKind) -> Self {
        Self {
            name: name.into(),
            kind,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }

    /// Set the USB identifiers.
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }

    /// Set the product string.
    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            write!(f, " [{vid:04x}:{pid:04x}]")?;
        }
        if let Some(product) = &self.product {
            write!(f, " {product}")?;
        }
        Ok(())
    }
}

/// Result of sampling one candidate baud rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeAttempt {
    pub baud_rate: u32,

    /// Bytes read back during the settle window.
    pub bytes_read: usize,

    /// Share of printable bytes, `None` when nothing was read.
    pub printable_ratio: Option<f64>,

    /// Open or I/O failure, if the sample could not be taken.
    pub error: Option<String>,
}

impl ProbeAttempt {
    /// Whether this attempt reached `threshold`.
    pub fn accepted(&self, threshold: f64) -> bool {
        self.printable_ratio.is_some_and(|r| r >= threshold)
    }
}

/// Outcome of auto-baud detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeOutcome {
    /// Rate to connect at.
    pub baud_rate: u32,

    /// `false` when no candidate was accepted and the fallback was used.
    pub detected: bool,

    /// Every candidate tried, in order.
    pub attempts: Vec<ProbeAttempt>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_info_display() {
        let port = PortInfo::new("/dev/ttyACM0", PortKind::Usb)
            .with_usb_ids(0x303a, 0x1001)
            .with_product("USB JTAG/serial debug unit");
        assert_eq!(
            port.to_string(),
            "/dev/ttyACM0 [303a:1001] USB JTAG/serial debug unit"
        );
        assert_eq!(PortInfo::new("COM3", PortKind::Unknown).to_string(), "COM3");
    }

    #[test]
    fn test_attempt_accepted() {
        let attempt = ProbeAttempt {
            baud_rate: 9600,
            bytes_read: 4,
            printable_ratio: Some(0.75),
            error: None,
        };
        assert!(attempt.accepted(0.75));
        assert!(!attempt.accepted(0.8));

        let silent = ProbeAttempt {
            printable_ratio: None,
            ..attempt
        };
        assert!(!silent.accepted(0.1));
    }
}
