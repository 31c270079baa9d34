//! In-process simulation of a GW Instek GPP-4323 style power supply.
//!
//! This crate lets the driver run without hardware:
//!
//! - **Models** ([`models`]) -- per-channel voltage/current limits of the
//!   simulated supply.
//! - **Device model** ([`device`]) -- per-channel state, clamping, and
//!   measurement synthesis, addressed by translated SCPI commands.
//! - **Simulated transport** ([`transport`]) -- a
//!   [`Transport`](psuctl_core::Transport) that feeds commands straight to the
//!   device model and records them per correlation id.
//! - **Instrument server** ([`server`]) -- serves the device model over TCP so
//!   the real socket transport can be exercised end to end.

pub mod device;
pub mod models;
pub mod server;
pub mod transport;

pub use device::{DeviceAction, DeviceConfig, DeviceModel, DeviceResponse};
pub use models::SupplyModel;
pub use server::InstrumentServer;
pub use transport::SimulatedTransport;
