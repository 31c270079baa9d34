// psuctl -- drive a four-channel SCPI power supply from the command line.
//
// Usage:
//   psuctl serve                                   # REST API over a simulated supply
//   psuctl serve --host 192.168.1.50 --port 5025   # REST API over a real supply
//   psuctl emulate --port 5025                     # serve a simulated supply over TCP
//   psuctl send --host 127.0.0.1 ":SOURce1:VOLTage 5.0" ":MEASure1:ALL"
//   psuctl tree                                    # print the SCPI command tree

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use psuctl_core::{CommandLog, Transport};
use psuctl_driver::{Driver, DriverConfig};
use psuctl_scpi::{CommandTree, TranslatorConfig};
use psuctl_sim::{DeviceConfig, DeviceModel, InstrumentServer, SupplyModel};
use psuctl_transport::TcpTransport;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// psuctl -- control and monitor a four-channel programmable power supply.
#[derive(Parser)]
#[command(name = "psuctl", version, about)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes
    /// precedence when set.
    #[arg(long, default_value = "info", env = "PSUCTL_LOG_LEVEL", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the telemetry poller and the REST API.
    Serve(ServeArgs),

    /// Serve a simulated supply over TCP for `serve --host` or `send`.
    Emulate {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1")]
        bind: IpAddr,

        /// Port to listen on.
        #[arg(long, default_value_t = 5025, env = "PSUCTL_INSTRUMENT_PORT")]
        port: u16,

        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Send raw SCPI commands to a supply and print each response.
    Send {
        /// Supply host name or IP address.
        #[arg(long, env = "PSUCTL_INSTRUMENT_HOST")]
        host: String,

        /// Supply SCPI port.
        #[arg(long, default_value_t = 5025, env = "PSUCTL_INSTRUMENT_PORT")]
        port: u16,

        /// Response timeout in milliseconds.
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,

        /// Commands, e.g. ":SOURce1:VOLTage 5.0".
        #[arg(required = true)]
        commands: Vec<String>,
    },

    /// Print the SCPI command tree.
    Tree,
}

#[derive(Args)]
struct ServeArgs {
    /// Supply host name or IP address. Without it, an in-process simulated
    /// supply is used.
    #[arg(long, env = "PSUCTL_INSTRUMENT_HOST")]
    host: Option<String>,

    /// Supply SCPI port.
    #[arg(long, default_value_t = 5025, env = "PSUCTL_INSTRUMENT_PORT")]
    port: u16,

    /// Address the REST API binds to.
    #[arg(long, default_value = "0.0.0.0", env = "PSUCTL_REST_HOST")]
    rest_host: IpAddr,

    /// Port the REST API listens on.
    #[arg(long, default_value_t = psuctl_driver::config::DEFAULT_REST_PORT, env = "PSUCTL_REST_PORT")]
    rest_port: u16,

    /// Seconds between telemetry polls.
    #[arg(long, default_value_t = 10, env = "PSUCTL_TELEMETRY_INTERVAL")]
    telemetry_interval: u64,

    /// File each telemetry poll is appended to.
    #[arg(
        long,
        default_value = psuctl_driver::config::DEFAULT_TELEMETRY_LOG,
        env = "PSUCTL_TELEMETRY_LOG"
    )]
    telemetry_log: PathBuf,

    /// Do not write the telemetry log file.
    #[arg(long)]
    no_telemetry_log: bool,

    /// Log every telemetry poll at info level.
    #[arg(long)]
    show_telemetry: bool,

    /// Number of requests whose commands are kept in the command log.
    #[arg(long, default_value_t = psuctl_core::DEFAULT_COMMAND_LOG_CAPACITY)]
    command_log_capacity: usize,

    #[command(flatten)]
    device: DeviceArgs,
}

/// Options of the simulated device.
#[derive(Args)]
struct DeviceArgs {
    /// Log every SCPI translation at info level.
    #[arg(long)]
    log_translations: bool,

    /// Log every executed device action at info level.
    #[arg(long)]
    log_dispatch: bool,

    /// Log the command tree at startup.
    #[arg(long)]
    show_tree: bool,
}

impl DeviceArgs {
    fn config(&self) -> DeviceConfig {
        DeviceConfig::default()
            .translator(
                TranslatorConfig::default()
                    .log_translations(self.log_translations)
                    .show_tree(self.show_tree),
            )
            .log_dispatch(self.log_dispatch)
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_serve(args: ServeArgs) -> Result<()> {
    let telemetry_log = (!args.no_telemetry_log).then_some(args.telemetry_log);
    let config = DriverConfig::default()
        .rest_host(args.rest_host)
        .rest_port(args.rest_port)
        .telemetry_interval(Duration::from_secs(args.telemetry_interval))
        .telemetry_log(telemetry_log)
        .show_telemetry(args.show_telemetry)
        .command_log_capacity(args.command_log_capacity);

    let driver = match &args.host {
        Some(host) => {
            let addr = format!("{host}:{}", args.port);
            info!(%addr, "driving supply over TCP");
            let log = Arc::new(CommandLog::new(config.command_log_capacity));
            let transport = TcpTransport::new(addr).command_log(Arc::clone(&log));
            Driver::new(Arc::new(transport), log, config)
        }
        None => {
            info!(model = SupplyModel::default().name, "driving simulated supply");
            Driver::simulated(config, args.device.config())
        }
    };

    let cancel = shutdown_on_ctrl_c();
    driver.run(cancel).await.context("driver failed")
}

async fn cmd_emulate(bind: IpAddr, port: u16, device: DeviceArgs) -> Result<()> {
    let device = Arc::new(DeviceModel::new(SupplyModel::default(), device.config()));
    let addr = format!("{bind}:{port}");
    let server = InstrumentServer::bind(&addr, device)
        .await
        .with_context(|| format!("failed to start emulator on {addr}"))?;

    let cancel = shutdown_on_ctrl_c();
    server.run(cancel).await.context("emulator failed")
}

async fn cmd_send(host: &str, port: u16, timeout_ms: u64, commands: &[String]) -> Result<()> {
    let addr = format!("{host}:{port}");
    let transport = TcpTransport::new(&addr).response_timeout(Duration::from_millis(timeout_ms));
    transport
        .connect()
        .await
        .with_context(|| format!("failed to connect to {addr}"))?;

    for command in commands {
        match transport.send_text(command, None).await {
            Ok(response) if response.is_empty() => println!("{command} -> OK"),
            Ok(response) => println!("{command} -> {response}"),
            Err(e) => println!("{command} -> error: {e}"),
        }
    }

    transport.disconnect().await.context("failed to disconnect")?;
    Ok(())
}

fn cmd_tree() {
    print!("{}", CommandTree::gpp4323());
}

/// Cancellation token that fires on Ctrl-C.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
        }
        token.cancel();
    });
    cancel
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::default().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Command::Serve(args) => cmd_serve(args).await,
        Command::Emulate { bind, port, device } => cmd_emulate(bind, port, device).await,
        Command::Send {
            host,
            port,
            timeout_ms,
            commands,
        } => cmd_send(&host, port, timeout_ms, &commands).await,
        Command::Tree => {
            cmd_tree();
            Ok(())
        }
    }
}
