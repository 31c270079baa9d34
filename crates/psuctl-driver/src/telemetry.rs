//! Periodic telemetry polling.
//!
//! The [`TelemetryPoller`] reads all four channels, optionally appends a
//! block to the telemetry log file, then sleeps for the configured interval.
//! Polls carry no correlation id. A failed poll is logged and the loop
//! carries on with the next one.
//!
//! # Log file format
//!
//! ```text
//! 2026.10.15 12-00-00-000000 Telemetry:
//!     Channel 1:
//!         State: ON
//!         Current: 2.0A
//!         Voltage: 10.0V
//!         Power: 20.0W
//!         Timestamp: 2026.10.15 12-00-00-000000
//!     Channel 2:
//!         ...
//! ```
//!
//! Each block is followed by two blank lines.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use psuctl_core::error::Result;
use psuctl_core::types::{Telemetry, format_timestamp};

use crate::config::DriverConfig;
use crate::supply::PowerSupply;

/// Render one telemetry log block, including the trailing blank lines.
pub fn format_block(captured: &NaiveDateTime, telemetry: &Telemetry) -> String {
    let mut block = format!("{} Telemetry:\n", format_timestamp(captured));
    for (channel, reading) in telemetry {
        // Writing to a String cannot fail.
        let _ = write!(
            block,
            "    Channel {channel}:\n\
             \x20       State: {}\n\
             \x20       Current: {:?}A\n\
             \x20       Voltage: {:?}V\n\
             \x20       Power: {:?}W\n\
             \x20       Timestamp: {}\n",
            reading.state,
            reading.current,
            reading.voltage,
            reading.power,
            format_timestamp(&reading.timestamp),
        );
    }
    block.push_str("\n\n");
    block
}

/// Append `block` to the file at `path`, creating it if needed.
pub async fn append_block(path: &Path, block: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(block.as_bytes()).await?;
    file.flush().await
}

/// Background task that polls telemetry at a fixed interval.
#[derive(Debug)]
pub struct TelemetryPoller {
    supply: Arc<PowerSupply>,
    interval: Duration,
    log_path: Option<PathBuf>,
    show_telemetry: bool,
}

impl TelemetryPoller {
    /// Create a poller for `supply` using the telemetry settings of `config`.
    pub fn new(supply: Arc<PowerSupply>, config: &DriverConfig) -> Self {
        TelemetryPoller {
            supply,
            interval: config.telemetry_interval,
            log_path: config.telemetry_log.clone(),
            show_telemetry: config.show_telemetry,
        }
    }

    /// Read all channels once and write the log block.
    ///
    /// A failure to write the log file is logged, not returned.
    pub async fn poll_once(&self) -> Result<Telemetry> {
        let telemetry = self.supply.telemetry(None).await?;

        if self.show_telemetry {
            info!(?telemetry, "telemetry");
        } else {
            trace!(?telemetry, "telemetry");
        }

        if let Some(path) = &self.log_path {
            let block = format_block(&Local::now().naive_local(), &telemetry);
            if let Err(e) = append_block(path, &block).await {
                warn!(path = %path.display(), error = %e, "failed to write telemetry log");
            }
        }

        Ok(telemetry)
    }

    /// Poll until `cancel` fires. A poll already in flight runs to
    /// completion so its log block is written whole.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval_ms = self.interval.as_millis(), "telemetry poller started");
        while !cancel.is_cancelled() {
            if let Err(e) = self.poll_once().await {
                warn!(error = %e, "telemetry poll failed");
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!("telemetry poller stopped");
    }

    /// Run the poller as a background task.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
