//! TCP front end for the simulated device.
//!
//! [`InstrumentServer`] accepts any number of clients and speaks the same
//! line protocol as the real instrument link: each `\n`-terminated command
//! line is answered with exactly one response line. Settings are answered
//! with an empty line, `:MEASure{n}:ALL` with a measurement line, and
//! rejected commands with `ERR <message>`.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use psuctl_core::error::{Error, Result};
use psuctl_scpi::commands::encode_error;

use crate::device::DeviceModel;

/// Serves a [`DeviceModel`] over TCP.
pub struct InstrumentServer {
    listener: TcpListener,
    device: Arc<DeviceModel>,
}

impl InstrumentServer {
    /// Bind to `addr` (e.g. `"127.0.0.1:5025"`, or port 0 for any free port).
    pub async fn bind(addr: &str, device: Arc<DeviceModel>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            Error::Transport(format!("failed to bind instrument server on {addr}: {e}"))
        })?;
        Ok(InstrumentServer { listener, device })
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Error::Io)
    }

    /// Run the server as a background task until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run(cancel))
    }

    /// Accept clients until `cancel` fires. Each client gets its own task.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        info!(%addr, model = self.device.model().name, "instrument emulator listening");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(%addr, "instrument emulator stopped");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "instrument client connected");
                            let device = Arc::clone(&self.device);
                            let cancel = cancel.clone();
                            tokio::spawn(async move {
                                if let Err(e) = serve_client(stream, device, cancel).await {
                                    warn!(%peer, error = %e, "instrument client failed");
                                }
                                debug!(%peer, "instrument client disconnected");
                            });
                        }
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }
            }
        }
    }
}

async fn serve_client(
    stream: TcpStream,
    device: Arc<DeviceModel>,
    cancel: CancellationToken,
) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            return Ok(());
        };
        let command = line.trim();
        if command.is_empty() {
            continue;
        }

        let response = match device.execute_command(command).await {
            Ok(response) => response.to_wire(),
            Err(e) => {
                debug!(command, error = %e, "command rejected");
                encode_error(&e)
            }
        };

        write_half.write_all(response.as_bytes()).await?;
        write_half.write_all(b"\n").await?;
        write_half.flush().await?;
    }
}
