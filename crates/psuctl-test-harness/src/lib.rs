//! psuctl-test-harness: test utilities and mock transports for psuctl.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! the driver without a device model or socket, and [`MockInstrument`], a
//! scripted line-protocol peer for testing code that talks over TCP.

pub mod mock_instrument;
pub mod mock_transport;

pub use mock_instrument::MockInstrument;
pub use mock_transport::MockTransport;
