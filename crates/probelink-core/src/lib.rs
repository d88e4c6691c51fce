//! Shared building blocks for the probelink serial-link engine.
//!
//! This crate holds everything the protocol, transport and engine crates
//! agree on: wire-level constants, the workspace error type, configuration
//! and the small value types that cross crate boundaries.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
