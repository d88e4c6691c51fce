//! Serial transport layer for probelink.
//!
//! This crate hides the serial port behind two traits so the engine can run
//! against real hardware or an in-memory link without change:
//!
//! - [`TransportOpener`] opens a named port at a baud rate.
//! - [`SerialTransport`] applies line parameters and modem control lines,
//!   then splits into tokio read and write halves.
//!
//! Two implementations are provided:
//!
//! - [`NativeOpener`] drives OS serial ports through `tokio-serial`.
//! - [`MockOpener`](mock::MockOpener) hands out `tokio::io::duplex` links
//!   whose device ends are scripted by tests.
//!
//! On top of the traits sit [`list_ports`] for enumeration and
//! [`detect_baud_rate`] for auto-baud detection.
//!
//! # Examples
//!
//! ```no_run
//! use probelink_core::config::ProbeConfig;
//! use probelink_transport::{NativeOpener, detect_baud_rate, list_ports};
//!
//! #[tokio::main]
//! async fn main() -> probelink_transport::Result<()> {
//!     for port in list_ports()? {
//!         println!("{port}");
//!     }
//!
//!     let outcome =
//!         detect_baud_rate(&NativeOpener::new(), "/dev/ttyUSB0", &ProbeConfig::default()).await;
//!     println!("device answers at {} baud", outcome.baud_rate);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod mock;
pub mod native;
pub mod probe;
pub mod traits;
pub mod types;

pub use error::{Result, TransportError};
pub use native::{NativeOpener, NativeTransport, list_ports};
pub use probe::{detect_baud_rate, printable_ratio};
pub use traits::{SerialTransport, TransportOpener};
pub use types::{PortInfo, PortKind, ProbeAttempt, ProbeOutcome};
