//! Transport trait for instrument communication.
//!
//! The [`Transport`] trait abstracts over the link to a power supply: one
//! textual SCPI command goes out, one textual response comes back.
//! Implementations exist for TCP sockets (`psuctl-transport`), for the
//! in-process simulated instrument (`psuctl-sim`), and for scripted mocks
//! (`psuctl-test-harness`).
//!
//! Every call may carry the [`CorrelationId`] of the inbound request that
//! caused it, so implementations can attribute commands to requests. The
//! telemetry poller passes `None`.

use async_trait::async_trait;

use crate::correlation::CorrelationId;
use crate::error::Result;

/// Asynchronous command/response transport to a power supply.
///
/// Methods take `&self` so a single transport can be shared between the
/// telemetry poller and concurrent request handlers; implementations are
/// responsible for keeping each command/response exchange atomic.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the connection to the instrument.
    ///
    /// Calling `connect()` on an already connected transport is a no-op.
    async fn connect(&self) -> Result<()>;

    /// Send one command and wait for its response text.
    ///
    /// Commands that produce no data (settings) return an empty string.
    async fn send_text(
        &self,
        command: &str,
        correlation: Option<&CorrelationId>,
    ) -> Result<String>;

    /// Close the connection.
    ///
    /// After calling `disconnect()`, subsequent `send_text()` calls should
    /// return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn disconnect(&self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
