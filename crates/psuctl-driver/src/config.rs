//! Driver configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use psuctl_core::DEFAULT_COMMAND_LOG_CAPACITY;

/// Default REST API port.
pub const DEFAULT_REST_PORT: u16 = 8080;

/// Default delay between telemetry polls.
pub const DEFAULT_TELEMETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Default telemetry log file.
pub const DEFAULT_TELEMETRY_LOG: &str = "telemetry.logs";

/// Options for [`Driver`](crate::Driver).
///
/// Built with [`DriverConfig::default`] and the fluent setters:
///
/// ```
/// use std::time::Duration;
/// use psuctl_driver::DriverConfig;
///
/// let config = DriverConfig::default()
///     .rest_port(9000)
///     .telemetry_interval(Duration::from_secs(2))
///     .show_telemetry(true);
/// assert_eq!(config.rest_addr().port(), 9000);
/// ```
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Address the REST API binds to.
    pub rest_host: IpAddr,
    /// Port the REST API listens on.
    pub rest_port: u16,
    /// Delay between the end of one telemetry poll and the start of the next.
    pub telemetry_interval: Duration,
    /// File each poll appends a telemetry block to; `None` disables it.
    pub telemetry_log: Option<PathBuf>,
    /// Log every poll result at `info` instead of `trace`.
    pub show_telemetry: bool,
    /// Number of correlation ids the command log retains.
    pub command_log_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            rest_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            rest_port: DEFAULT_REST_PORT,
            telemetry_interval: DEFAULT_TELEMETRY_INTERVAL,
            telemetry_log: Some(PathBuf::from(DEFAULT_TELEMETRY_LOG)),
            show_telemetry: false,
            command_log_capacity: DEFAULT_COMMAND_LOG_CAPACITY,
        }
    }
}

impl DriverConfig {
    /// Set the REST bind address.
    pub fn rest_host(mut self, host: IpAddr) -> Self {
        self.rest_host = host;
        self
    }

    /// Set the REST port.
    pub fn rest_port(mut self, port: u16) -> Self {
        self.rest_port = port;
        self
    }

    /// Set the delay between telemetry polls.
    pub fn telemetry_interval(mut self, interval: Duration) -> Self {
        self.telemetry_interval = interval;
        self
    }

    /// Set (or clear, with `None`) the telemetry log file.
    pub fn telemetry_log(mut self, path: Option<PathBuf>) -> Self {
        self.telemetry_log = path;
        self
    }

    /// Enable or disable per-poll telemetry logging.
    pub fn show_telemetry(mut self, enabled: bool) -> Self {
        self.show_telemetry = enabled;
        self
    }

    /// Set the command log capacity.
    pub fn command_log_capacity(mut self, capacity: usize) -> Self {
        self.command_log_capacity = capacity;
        self
    }

    /// The socket address the REST API binds to.
    pub fn rest_addr(&self) -> SocketAddr {
        SocketAddr::new(self.rest_host, self.rest_port)
    }
}
