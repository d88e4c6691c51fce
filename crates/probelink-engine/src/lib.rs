//! Connection engine for probelink.
//!
//! [`LinkEngine`] owns a serial link end to end: it opens the transport,
//! runs the byte-to-record pipeline on a reader task, hands completed
//! records to a consumer task through a lossless queue, flushes idle records
//! from a ticker task, and publishes everything to broadcast sinks.
//!
//! # Components
//!
//! - **engine**: lifecycle state machine, connect/disconnect/force-reset,
//!   auto-baud, command writes and the per-connection tasks
//! - **dispatch**: unbounded FIFO from reader to consumer
//! - **sinks**: bounded drop-oldest fan-out for lines, records and blobs
//! - **envelope**: records with a receive time and lazy decoding
//! - **stats**: lock-free counters
//!
//! # Example
//!
//! ```no_run
//! use probelink_core::EngineConfig;
//! use probelink_engine::LinkEngine;
//! use probelink_protocol::DeviceCommand;
//! use probelink_transport::NativeOpener;
//!
//! # async fn example() -> probelink_engine::Result<()> {
//! let engine = LinkEngine::new(NativeOpener::new(), EngineConfig::default())?;
//! let mut lines = engine.subscribe_lines();
//!
//! let outcome = engine.connect_auto("/dev/ttyUSB0").await?;
//! println!("connected at {} baud", outcome.baud_rate);
//!
//! engine.send_command(&DeviceCommand::ScanAccessPoints).await;
//! while let Some(line) = lines.next_item().await {
//!     println!("{line}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod sinks;
pub mod stats;

pub use engine::{LinkEngine, StateTransition};
pub use envelope::ResponseEnvelope;
pub use error::{EngineError, Result};
pub use sinks::{Delivery, Sinks, Subscription};
pub use stats::{EngineStats, StatsSnapshot};
