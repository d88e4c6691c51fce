//! In-memory transport for testing and development.
//!
//! [`MockOpener`] hands out transports backed by [`tokio::io::duplex`]
//! streams. The device end of every opened link is delivered to the
//! [`MockLinkHandle`] as a [`MockDevice`], which tests use to play the
//! firmware: read the commands the engine writes and write responses back.
//!
//! ```text
//!   engine ── MockTransport ══ duplex ══ MockDevice ── test
//!                                           ^
//!                      MockLinkHandle::next_device()
//! ```
//!
//! # Examples
//!
//! ```
//! use probelink_transport::mock::MockOpener;
//! use probelink_transport::{SerialTransport, TransportOpener};
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! #[tokio::main]
//! async fn main() -> probelink_transport::Result<()> {
//!     let (opener, mut handle) = MockOpener::new();
//!
//!     let transport = opener.open("/dev/mock0", 115_200).await?;
//!     let (mut reader, mut writer) = transport.into_split();
//!     let mut device = handle.next_device().await.unwrap();
//!
//!     writer.write_all(b"version\r\n").await?;
//!     assert_eq!(device.read_line().await?, "version");
//!
//!     device.send(b"Version: 1.0.0\r\n").await?;
//!     let mut buf = [0u8; 16];
//!     let n = reader.read(&mut buf).await?;
//!     assert_eq!(&buf[..n], b"Version: 1.0.0\r\n");
//!     Ok(())
//! }
//! ```

use probelink_core::LineParameters;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;

use crate::error::{Result, TransportError};
use crate::traits::{SerialTransport, TransportOpener};

/// Capacity of each direction of the in-memory link.
const DUPLEX_CAPACITY: usize = 64 * 1024;

/// One call to [`TransportOpener::open`], as recorded by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRecord {
    pub port: String,
    pub baud_rate: u32,
}

/// Settings and call log shared between opener, transports and handle.
#[derive(Debug, Default)]
struct MockState {
    open_delay: Duration,
    fail_open: bool,
    greetings: HashMap<u32, Vec<u8>>,
    opens: Vec<OpenRecord>,
    parameters: Vec<LineParameters>,
    control_lines: Vec<(bool, bool)>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<MockState>,
    device_tx: mpsc::UnboundedSender<MockDevice>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the log from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Mock transport factory.
#[derive(Debug, Clone)]
pub struct MockOpener {
    shared: Arc<Shared>,
}

impl MockOpener {
    /// Create an opener and the handle that receives its device ends.
    pub fn new() -> (Self, MockLinkHandle) {
        let (device_tx, device_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            state: Mutex::new(MockState::default()),
            device_tx,
        });

        let handle = MockLinkHandle {
            shared: Arc::clone(&shared),
            device_rx,
        };
        (Self { shared }, handle)
    }
}

impl TransportOpener for MockOpener {
    type Transport = MockTransport;

    async fn open(&self, port: &str, baud_rate: u32) -> Result<MockTransport> {
        let (delay, fail, greeting) = {
            let mut state = self.shared.state();
            state.opens.push(OpenRecord {
                port: port.to_string(),
                baud_rate,
            });
            (
                state.open_delay,
                state.fail_open,
                state.greetings.get(&baud_rate).cloned(),
            )
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(TransportError::open(port, "mock open failure"));
        }

        let (host, mut device) = tokio::io::duplex(DUPLEX_CAPACITY);
        if let Some(greeting) = greeting {
            device.write_all(&greeting).await?;
        }

        // The handle may have been dropped; the link still works one-sided.
        let _ = self.shared.device_tx.send(MockDevice {
            port: port.to_string(),
            baud_rate,
            stream: device,
            pending: Vec::new(),
        });

        Ok(MockTransport {
            port: port.to_string(),
            stream: host,
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Host end of a mock link.
#[derive(Debug)]
pub struct MockTransport {
    port: String,
    stream: DuplexStream,
    shared: Arc<Shared>,
}

impl SerialTransport for MockTransport {
    type Reader = ReadHalf<DuplexStream>;
    type Writer = WriteHalf<DuplexStream>;

    fn port_name(&self) -> &str {
        &self.port
    }

    fn set_parameters(&mut self, params: &LineParameters) -> Result<()> {
        self.shared.state().parameters.push(*params);
        Ok(())
    }

    fn set_control_lines(&mut self, dtr: bool, rts: bool) -> Result<()> {
        self.shared.state().control_lines.push((dtr, rts));
        Ok(())
    }

    fn into_split(self) -> (Self::Reader, Self::Writer) {
        tokio::io::split(self.stream)
    }
}

/// Device end of a mock link.
#[derive(Debug)]
pub struct MockDevice {
    pub port: String,
    pub baud_rate: u32,
    stream: DuplexStream,
    pending: Vec<u8>,
}

impl MockDevice {
    /// Write bytes as if the firmware printed them.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    /// Read one CRLF- or LF-terminated line written by the host.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Disconnected`] when the host closed the link
    /// before a full line arrived.
    pub async fn read_line(&mut self) -> Result<String> {
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&line);
                return Ok(text.trim_end_matches(['\r', '\n']).to_string());
            }

            let mut buf = [0u8; 256];
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Err(TransportError::disconnected(&self.port));
            }
            self.pending.extend_from_slice(&buf[..n]);
        }
    }

    /// Read until the host closes its end, returning everything received.
    ///
    /// Completes only once both host halves are dropped.
    pub async fn read_to_close(&mut self) -> Result<Vec<u8>> {
        let mut out = std::mem::take(&mut self.pending);
        self.stream.read_to_end(&mut out).await?;
        Ok(out)
    }
}

/// Controls a [`MockOpener`] and receives the device end of each link.
#[derive(Debug)]
pub struct MockLinkHandle {
    shared: Arc<Shared>,
    device_rx: mpsc::UnboundedReceiver<MockDevice>,
}

impl MockLinkHandle {
    /// Delay every open by `delay`.
    pub fn set_open_delay(&self, delay: Duration) {
        self.shared.state().open_delay = delay;
    }

    /// Make every subsequent open fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.shared.state().fail_open = fail;
    }

    /// Bytes the device prints as soon as a link at `baud_rate` opens.
    ///
    /// Used to script what each candidate rate "sounds like" to the probe.
    pub fn greet_at(&self, baud_rate: u32, bytes: impl Into<Vec<u8>>) {
        self.shared.state().greetings.insert(baud_rate, bytes.into());
    }

    /// Wait for the device end of the next opened link.
    pub async fn next_device(&mut self) -> Option<MockDevice> {
        self.device_rx.recv().await
    }

    /// Device end of a link opened earlier, if any.
    pub fn try_next_device(&mut self) -> Option<MockDevice> {
        self.device_rx.try_recv().ok()
    }

    /// Every open call so far, in order.
    pub fn opens(&self) -> Vec<OpenRecord> {
        self.shared.state().opens.clone()
    }

    /// Every set of line parameters applied so far.
    pub fn parameters(&self) -> Vec<LineParameters> {
        self.shared.state().parameters.clone()
    }

    /// Every `(dtr, rts)` pair set so far.
    pub fn control_lines(&self) -> Vec<(bool, bool)> {
        self.shared.state().control_lines.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_open_records_call() {
        let (opener, mut handle) = MockOpener::new();
        let transport = opener.open("/dev/mock0", 9600).await.unwrap();

        assert_eq!(transport.port_name(), "/dev/mock0");
        assert_eq!(
            handle.opens(),
            vec![OpenRecord {
                port: "/dev/mock0".into(),
                baud_rate: 9600
            }]
        );
        assert_eq!(handle.next_device().await.unwrap().baud_rate, 9600);
    }

    #[tokio::test]
    async fn test_fail_open() {
        let (opener, handle) = MockOpener::new();
        handle.set_fail_open(true);

        let result = opener.open("/dev/mock0", 9600).await;
        assert!(matches!(result, Err(TransportError::Open { .. })));
        assert_eq!(handle.opens().len(), 1);
    }

    #[tokio::test]
    async fn test_settings_are_logged() {
        let (opener, handle) = MockOpener::new();
        let mut transport = opener.open("/dev/mock0", 115_200).await.unwrap();

        transport
            .set_parameters(&LineParameters::new(115_200))
            .unwrap();
        transport.set_control_lines(true, true).unwrap();

        assert_eq!(handle.parameters(), vec![LineParameters::new(115_200)]);
        assert_eq!(handle.control_lines(), vec![(true, true)]);
    }

    #[tokio::test]
    async fn test_greeting_is_readable_by_host() {
        let (opener, handle) = MockOpener::new();
        handle.greet_at(115_200, b"boot ok\r\n".to_vec());

        let transport = opener.open("/dev/mock0", 115_200).await.unwrap();
        let (mut reader, _writer) = transport.into_split();

        let mut buf = [0u8; 9];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"boot ok\r\n");
    }

    #[tokio::test]
    async fn test_device_sees_close() {
        let (opener, mut handle) = MockOpener::new();
        let transport = opener.open("/dev/mock0", 115_200).await.unwrap();
        let mut device = handle.next_device().await.unwrap();

        let (reader, mut writer) = transport.into_split();
        writer.write_all(b"bye").await.unwrap();
        drop(reader);
        drop(writer);

        assert_eq!(device.read_to_close().await.unwrap(), b"bye".to_vec());
        assert!(device.read_line().await.is_err());
    }
}
