//! Driver composition: telemetry poller plus REST API over one transport.

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use psuctl_core::command_log::CommandLog;
use psuctl_core::error::{Error, Result};
use psuctl_core::transport::Transport;
use psuctl_sim::{DeviceConfig, DeviceModel, SimulatedTransport, SupplyModel};

use crate::api;
use crate::config::DriverConfig;
use crate::supply::PowerSupply;
use crate::telemetry::TelemetryPoller;

/// Runs the telemetry poller and the REST API against one supply.
///
/// The driver owns the [`CommandLog`] that records, per correlation id,
/// the commands sent while serving each request.
#[derive(Debug)]
pub struct Driver {
    supply: Arc<PowerSupply>,
    log: Arc<CommandLog>,
    config: DriverConfig,
}

impl Driver {
    /// Drive the supply behind `transport`. The transport is expected to
    /// record correlated commands into `log`.
    pub fn new(transport: Arc<dyn Transport>, log: Arc<CommandLog>, config: DriverConfig) -> Self {
        Driver {
            supply: Arc::new(PowerSupply::new(transport)),
            log,
            config,
        }
    }

    /// Drive an in-process simulated supply.
    pub fn simulated(config: DriverConfig, device: DeviceConfig) -> Self {
        let log = Arc::new(CommandLog::new(config.command_log_capacity));
        let device = Arc::new(DeviceModel::new(SupplyModel::default(), device));
        let transport = SimulatedTransport::new(device, Arc::clone(&log));
        Self::new(Arc::new(transport), log, config)
    }

    /// The high-level supply interface.
    pub fn supply(&self) -> &Arc<PowerSupply> {
        &self.supply
    }

    /// Commands recorded per correlation id.
    pub fn command_log(&self) -> &Arc<CommandLog> {
        &self.log
    }

    /// The driver configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// The REST API router.
    pub fn router(&self) -> Router {
        api::router(Arc::clone(&self.supply))
    }

    /// Bind the configured REST address and serve until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let addr = self.config.rest_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Transport(format!("failed to bind REST API on {addr}: {e}")))?;
        self.serve(listener, cancel).await
    }

    /// Serve the REST API on `listener` and poll telemetry until `cancel`
    /// fires.
    pub async fn serve(&self, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        if let Err(e) = self.supply.transport().connect().await {
            warn!(error = %e, "initial connection to the supply failed");
        }

        let poller = TelemetryPoller::new(Arc::clone(&self.supply), &self.config);
        let poll_cancel = cancel.child_token();
        let poll_task = poller.spawn(poll_cancel.clone());

        let addr = listener.local_addr()?;
        info!(%addr, "REST API listening");

        let shutdown = cancel.clone();
        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;

        // The server may also stop on its own after an accept error.
        poll_cancel.cancel();
        if let Err(e) = poll_task.await {
            warn!(error = %e, "telemetry poller task failed");
        }

        if let Err(e) = self.supply.transport().disconnect().await {
            warn!(error = %e, "disconnect from the supply failed");
        }
        info!("driver stopped");
        served.map_err(Error::Io)
    }
}
