//! Serial transport backed by `tokio-serial`.

use probelink_core::{DataBits, LineParameters, Parity, StopBits};
use serialport::{SerialPortInfo, SerialPortType};
use std::time::Duration;
use tokio::io::{ReadHalf, WriteHalf};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{SerialTransport, TransportOpener};
use crate::types::{PortInfo, PortKind};

/// Driver-level timeout for blocking calls; the engine applies its own.
const DRIVER_TIMEOUT: Duration = Duration::from_millis(100);

fn data_bits(bits: DataBits) -> tokio_serial::DataBits {
    match bits {
        DataBits::Five => tokio_serial::DataBits::Five,
        DataBits::Six => tokio_serial::DataBits::Six,
        DataBits::Seven => tokio_serial::DataBits::Seven,
        DataBits::Eight => tokio_serial::DataBits::Eight,
    }
}

fn stop_bits(bits: StopBits) -> tokio_serial::StopBits {
    match bits {
        StopBits::One => tokio_serial::StopBits::One,
        StopBits::Two => tokio_serial::StopBits::Two,
    }
}

fn parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Odd => tokio_serial::Parity::Odd,
        Parity::Even => tokio_serial::Parity::Even,
    }
}

fn config_err(e: tokio_serial::Error) -> TransportError {
    TransportError::configuration(e.to_string())
}

/// Opens OS serial ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeOpener;

impl NativeOpener {
    pub fn new() -> Self {
        Self
    }
}

impl TransportOpener for NativeOpener {
    type Transport = NativeTransport;

    async fn open(&self, port: &str, baud_rate: u32) -> Result<NativeTransport> {
        // Opened 8N1 without flow control; DTR/RTS are left as the driver
        // sets them until the caller decides.
        let stream = tokio_serial::new(port, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(DRIVER_TIMEOUT)
            .open_native_async()
            .map_err(|e| TransportError::open(port, e.to_string()))?;

        debug!(port, baud_rate, "Serial port opened");
        Ok(NativeTransport {
            port: port.to_string(),
            stream,
        })
    }
}

/// An open OS serial port.
pub struct NativeTransport {
    port: String,
    stream: SerialStream,
}

impl SerialTransport for NativeTransport {
    type Reader = ReadHalf<SerialStream>;
    type Writer = WriteHalf<SerialStream>;

    fn port_name(&self) -> &str {
        &self.port
    }

    fn set_parameters(&mut self, params: &LineParameters) -> Result<()> {
        self.stream
            .set_baud_rate(params.baud_rate)
            .map_err(config_err)?;
        self.stream
            .set_data_bits(data_bits(params.data_bits))
            .map_err(config_err)?;
        self.stream
            .set_stop_bits(stop_bits(params.stop_bits))
            .map_err(config_err)?;
        self.stream
            .set_parity(parity(params.parity))
            .map_err(config_err)?;
        debug!(port = %self.port, %params, "Line parameters applied");
        Ok(())
    }

    fn set_control_lines(&mut self, dtr: bool, rts: bool) -> Result<()> {
        self.stream
            .write_data_terminal_ready(dtr)
            .map_err(config_err)?;
        self.stream.write_request_to_send(rts).map_err(config_err)?;
        debug!(port = %self.port, dtr, rts, "Control lines set");
        Ok(())
    }

    fn into_split(self) -> (Self::Reader, Self::Writer) {
        tokio::io::split(self.stream)
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                kind: PortKind::Usb,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                manufacturer: usb.manufacturer,
                product: usb.product,
                serial_number: usb.serial_number,
            },
            SerialPortType::PciPort => Self::new(info.port_name, PortKind::Pci),
            SerialPortType::BluetoothPort => Self::new(info.port_name, PortKind::Bluetooth),
            SerialPortType::Unknown => Self::new(info.port_name, PortKind::Unknown),
        }
    }
}

/// List serial ports known to the OS, USB ports first, then by name.
///
/// # Errors
///
/// Returns [`TransportError::Enumeration`] when the OS query fails.
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .map_err(|e| TransportError::enumeration(e.to_string()))?
        .into_iter()
        .map(PortInfo::from)
        .collect();

    ports.sort_by(|a, b| {
        (a.kind != PortKind::Usb, &a.name).cmp(&(b.kind != PortKind::Usb, &b.name))
    });
    ports.dedup_by(|a, b| a.name == b.name);
    Ok(ports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_setting_mapping() {
        assert_eq!(data_bits(DataBits::Seven), tokio_serial::DataBits::Seven);
        assert_eq!(stop_bits(StopBits::Two), tokio_serial::StopBits::Two);
        assert_eq!(parity(Parity::Even), tokio_serial::Parity::Even);
    }

    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let result = NativeOpener::new()
            .open("/dev/probelink-does-not-exist", 115_200)
            .await;
        assert!(matches!(result, Err(TransportError::Open { .. })));
    }
}
