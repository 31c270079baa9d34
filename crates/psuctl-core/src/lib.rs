//! psuctl-core: Core traits, types, and error definitions for psuctl.
//!
//! This crate defines the instrument-agnostic abstractions shared by the
//! SCPI translator, the simulated power supply, the socket transport, and
//! the driver. Applications depend on these types without pulling in any
//! specific transport.
//!
//! # Key types
//!
//! - [`Transport`] -- text command/response channel to an instrument
//! - [`ChannelId`], [`ChannelState`], [`TelemetryReading`] -- channel model
//! - [`CorrelationId`] / [`CommandLog`] -- per-request command attribution
//! - [`Error`] / [`Result`] -- error handling

pub mod command_log;
pub mod correlation;
pub mod error;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use psuctl_core::*`.
pub use command_log::{CommandLog, DEFAULT_COMMAND_LOG_CAPACITY};
pub use correlation::CorrelationId;
pub use error::{Error, Result};
pub use transport::Transport;
pub use types::*;
