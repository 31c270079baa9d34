//! In-process transport to the simulated device.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use psuctl_core::command_log::CommandLog;
use psuctl_core::correlation::CorrelationId;
use psuctl_core::error::{Error, Result};
use psuctl_core::transport::Transport;

use crate::device::DeviceModel;

/// [`Transport`] that hands every command directly to a [`DeviceModel`].
///
/// Commands sent with a correlation id are appended to the shared
/// [`CommandLog`] before they execute, so rejected commands are recorded
/// too. The transport starts out connected.
#[derive(Debug)]
pub struct SimulatedTransport {
    device: Arc<DeviceModel>,
    log: Arc<CommandLog>,
    connected: AtomicBool,
}

impl SimulatedTransport {
    /// Wrap `device`, recording correlated commands into `log`.
    pub fn new(device: Arc<DeviceModel>, log: Arc<CommandLog>) -> Self {
        SimulatedTransport {
            device,
            log,
            connected: AtomicBool::new(true),
        }
    }

    /// The command log this transport records into.
    pub fn command_log(&self) -> &Arc<CommandLog> {
        &self.log
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn send_text(
        &self,
        command: &str,
        correlation: Option<&CorrelationId>,
    ) -> Result<String> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        if let Some(id) = correlation {
            self.log.record(id, command).await;
        }

        let response = self.device.execute_command(command).await?;
        Ok(response.to_wire())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}
