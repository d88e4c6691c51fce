//! Transport trait definitions.
//!
//! The engine talks to the device through two traits: a [`TransportOpener`]
//! that knows how to open a named port at a baud rate, and the
//! [`SerialTransport`] it returns, which can be configured and then split
//! into tokio read and write halves. Closing is dropping both halves.
//!
//! ```text
//!   TransportOpener::open(port, baud)
//!            │
//!            v
//!   SerialTransport ── set_parameters(8N1) ── set_control_lines(dtr, rts)
//!            │
//!            │ into_split()
//!            v
//!   (AsyncRead, AsyncWrite) ──> reader task / command writer
//! ```
//!
//! Both traits use native `async fn` / RPITIT (Edition 2024), so they are not
//! object-safe. Use them as generic parameters:
//!
//! ```no_run
//! use probelink_transport::{Result, SerialTransport, TransportOpener};
//! use tokio::io::AsyncWriteExt;
//!
//! async fn hello<O: TransportOpener>(opener: &O) -> Result<()> {
//!     let transport = opener.open("/dev/ttyUSB0", 115_200).await?;
//!     let (_reader, mut writer) = transport.into_split();
//!     writer.write_all(b"version\r\n").await?;
//!     Ok(())
//! }
//! ```

use probelink_core::LineParameters;
use std::future::Future;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// An opened serial link, not yet split.
pub trait SerialTransport: Send + 'static {
    /// Read half handed to the reader task.
    type Reader: AsyncRead + Send + Unpin + 'static;

    /// Write half used for commands.
    type Writer: AsyncWrite + Send + Unpin + 'static;

    /// Port name this transport was opened on.
    fn port_name(&self) -> &str;

    /// Apply baud rate, data bits, stop bits and parity.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Configuration`](crate::TransportError::Configuration)
    /// if the driver rejects a setting.
    fn set_parameters(&mut self, params: &LineParameters) -> Result<()>;

    /// Drive the DTR and RTS modem control lines.
    ///
    /// Many USB-serial bridges wire these to the chip's reset and boot
    /// strapping pins; holding both high keeps the device running.
    fn set_control_lines(&mut self, dtr: bool, rts: bool) -> Result<()>;

    /// Split into independently owned read and write halves.
    fn into_split(self) -> (Self::Reader, Self::Writer);
}

/// Factory for transports.
pub trait TransportOpener: Send + Sync + 'static {
    type Transport: SerialTransport;

    /// Open `port` at `baud_rate`.
    ///
    /// Implementations must not toggle DTR/RTS here; the caller decides
    /// whether to touch them.
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
    ) -> impl Future<Output = Result<Self::Transport>> + Send;
}
