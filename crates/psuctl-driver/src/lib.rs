//! Power supply driver for psuctl.
//!
//! The driver combines a [`PowerSupply`] (high-level operations expressed as
//! SCPI command sequences over a [`Transport`](psuctl_core::Transport)) with
//! two long-running tasks:
//!
//! - **Telemetry poller** ([`telemetry`]) -- reads every channel at a fixed
//!   interval and appends a block to the telemetry log file.
//! - **REST API** ([`api`]) -- serves telemetry and channel on/off requests,
//!   tagging each request with a correlation id that follows its commands
//!   down to the transport.
//!
//! # Example
//!
//! ```no_run
//! use psuctl_driver::{Driver, DriverConfig};
//! use psuctl_sim::DeviceConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> psuctl_core::Result<()> {
//! let driver = Driver::simulated(DriverConfig::default(), DeviceConfig::default());
//! driver.run(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod driver;
pub mod supply;
pub mod telemetry;

pub use api::{ApiError, METHOD_ROUTING_HEADER, UUID_HEADER};
pub use config::DriverConfig;
pub use driver::Driver;
pub use supply::PowerSupply;
pub use telemetry::TelemetryPoller;
