//! TCP transport for instrument communication.
//!
//! This module provides [`TcpTransport`], which implements the [`Transport`]
//! trait for power supplies reachable over a raw SCPI socket (LAN option
//! cards, serial-to-Ethernet bridges, or `psuctl emulate`).
//!
//! The link is line oriented: every command is written as one
//! `\n`-terminated line and the instrument answers with exactly one line.
//! Settings are answered with an empty line, queries with their data, and
//! rejected commands with `ERR <message>`.
//!
//! # Example
//!
//! ```no_run
//! use psuctl_core::transport::Transport;
//! use psuctl_transport::TcpTransport;
//!
//! # async fn example() -> psuctl_core::Result<()> {
//! let transport = TcpTransport::new("192.168.1.50:5025");
//! transport.connect().await?;
//!
//! let line = transport.send_text(":MEASure1:ALL", None).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use psuctl_core::command_log::CommandLog;
use psuctl_core::correlation::CorrelationId;
use psuctl_core::error::{Error, Result};
use psuctl_core::transport::Transport;
use psuctl_scpi::commands::check_response;

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time to wait for the response line of one command (2 seconds).
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// An open socket, split so the reader can buffer lines.
#[derive(Debug)]
struct Link {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Link {
    fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Link {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }
}

/// TCP transport for power supply communication.
///
/// Construct with [`new`](TcpTransport::new), adjust timeouts with the
/// builder methods, then call [`Transport::connect`]. If the link drops or a
/// response times out, the socket is discarded and the next command opens a
/// fresh one; only an explicit [`Transport::disconnect`] makes further
/// commands fail with [`Error::NotConnected`].
#[derive(Debug)]
pub struct TcpTransport {
    /// The address string for connecting and logging.
    addr: String,
    connect_timeout: Duration,
    response_timeout: Duration,
    /// Records commands sent on behalf of a correlated request.
    log: Option<Arc<CommandLog>>,
    /// The socket, `None` while disconnected. Held for a whole exchange.
    link: Mutex<Option<Link>>,
    /// Mirrors `link.is_some()` for the synchronous `is_connected()`.
    connected: AtomicBool,
    /// Set by `connect()`, cleared by `disconnect()`.
    open: AtomicBool,
}

impl TcpTransport {
    /// Create a transport for `addr` (a `host:port` string). No connection
    /// is made until [`Transport::connect`] is called.
    pub fn new(addr: impl Into<String>) -> Self {
        TcpTransport {
            addr: addr.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            log: None,
            link: Mutex::new(None),
            connected: AtomicBool::new(false),
            open: AtomicBool::new(false),
        }
    }

    /// Wrap an already connected `TcpStream`.
    ///
    /// This is useful when the connection was established externally (e.g.,
    /// accepted from a listener in tests).
    pub fn from_stream(stream: TcpStream, addr: impl Into<String>) -> Self {
        let transport = TcpTransport {
            link: Mutex::new(Some(Link::new(stream))),
            connected: AtomicBool::new(true),
            open: AtomicBool::new(true),
            ..Self::new(addr)
        };
        tracing::debug!(addr = %transport.addr, "Wrapping existing TCP stream");
        transport
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set how long to wait for each response line.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Record correlated commands into `log`.
    pub fn command_log(mut self, log: Arc<CommandLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Get the address string this transport connects to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn open_link(&self) -> Result<Link> {
        tracing::debug!(
            addr = %self.addr,
            timeout_ms = self.connect_timeout.as_millis(),
            "Connecting to TCP endpoint"
        );

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| {
                tracing::error!(addr = %self.addr, "TCP connection timed out");
                Error::Timeout
            })?
            .map_err(|e| {
                tracing::error!(addr = %self.addr, error = %e, "TCP connection failed");
                map_connect_error(e, &self.addr)
            })?;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(
                addr = %self.addr,
                error = %e,
                "Failed to set TCP_NODELAY (continuing anyway)"
            );
        }

        tracing::info!(addr = %self.addr, "TCP connection established");
        Ok(Link::new(stream))
    }

    /// Write one command line and read one response line.
    async fn exchange(&self, link: &mut Link, command: &str) -> Result<String> {
        tracing::trace!(addr = %self.addr, command, "Sending command");

        let mut line = String::with_capacity(command.len() + 1);
        line.push_str(command);
        line.push('\n');
        link.writer
            .write_all(line.as_bytes())
            .await
            .map_err(map_io_error)?;
        link.writer.flush().await.map_err(map_io_error)?;

        let mut response = String::new();
        match tokio::time::timeout(self.response_timeout, link.reader.read_line(&mut response))
            .await
        {
            Ok(Ok(0)) => {
                tracing::warn!(addr = %self.addr, "Peer closed connection (0 bytes read)");
                Err(Error::ConnectionLost)
            }
            Ok(Ok(_)) => {
                tracing::trace!(
                    addr = %self.addr,
                    response = %response.trim_end(),
                    "Received response"
                );
                Ok(response)
            }
            Ok(Err(e)) => Err(map_io_error(e)),
            Err(_) => {
                tracing::warn!(
                    addr = %self.addr,
                    command,
                    timeout_ms = self.response_timeout.as_millis(),
                    "Timeout waiting for response"
                );
                Err(Error::Timeout)
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self) -> Result<()> {
        let mut slot = self.link.lock().await;
        self.open.store(true, Ordering::Release);
        if slot.is_none() {
            *slot = Some(self.open_link().await?);
            self.connected.store(true, Ordering::Release);
        }
        Ok(())
    }

    async fn send_text(
        &self,
        command: &str,
        correlation: Option<&CorrelationId>,
    ) -> Result<String> {
        let mut slot = self.link.lock().await;

        if slot.is_none() && !self.open.load(Ordering::Acquire) {
            return Err(Error::NotConnected);
        }

        // Recorded before any reconnect so failed attempts stay visible.
        if let (Some(log), Some(id)) = (&self.log, correlation) {
            log.record(id, command).await;
        }

        if slot.is_none() {
            tracing::debug!(addr = %self.addr, "Reconnecting after link failure");
            *slot = Some(self.open_link().await?);
            self.connected.store(true, Ordering::Release);
        }

        let link = slot.as_mut().ok_or(Error::NotConnected)?;
        match self.exchange(link, command).await {
            Ok(response) => Ok(check_response(&response)?.to_string()),
            Err(e) => {
                // A late or partial response would desynchronize the line
                // stream, so the socket is dropped on any link error.
                *slot = None;
                self.connected.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    async fn disconnect(&self) -> Result<()> {
        let mut slot = self.link.lock().await;
        self.open.store(false, Ordering::Release);
        self.connected.store(false, Ordering::Release);

        if let Some(mut link) = slot.take() {
            tracing::debug!(addr = %self.addr, "Closing TCP connection");
            if let Err(e) = link.writer.shutdown().await {
                tracing::warn!(
                    addr = %self.addr,
                    error = %e,
                    "Failed to shutdown TCP stream (continuing anyway)"
                );
            }
            tracing::info!(addr = %self.addr, "TCP connection closed");
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

/// Map a connection-time I/O error to the appropriate [`Error`] variant.
fn map_connect_error(e: std::io::Error, addr: &str) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Error::Transport(format!("connection refused: {}", addr))
        }
        _ => Error::Io(e),
    }
}

/// Map a data-path I/O error to the appropriate [`Error`] variant.
fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::UnexpectedEof => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::TcpListener;

    /// Helper: bind a TcpListener on a random available port and return it
    /// along with its address string.
    async fn test_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    /// Serve one connection, answering each received line with `reply(line)`.
    fn serve<F>(listener: TcpListener, reply: F) -> tokio::task::JoinHandle<Vec<String>>
    where
        F: Fn(&str) -> String + Send + 'static,
    {
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (r, mut w) = stream.into_split();
            let mut lines = BufReader::new(r).lines();
            let mut seen = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                let answer = reply(&line);
                seen.push(line);
                w.write_all(format!("{answer}\n").as_bytes()).await.unwrap();
            }
            seen
        })
    }

    #[tokio::test]
    async fn connect_send_receive() {
        let (listener, addr) = test_listener().await;
        let server = serve(listener, |line| {
            if line.starts_with(":MEAS") {
                "ON,10,2,20,2026.10.15 12-00-00-000000".to_string()
            } else {
                String::new()
            }
        });

        let transport = TcpTransport::new(&addr);
        assert!(!transport.is_connected());
        transport.connect().await.unwrap();
        assert!(transport.is_connected());

        assert_eq!(transport.send_text(":OUTPut1:STATe ON", None).await.unwrap(), "");
        assert_eq!(
            transport.send_text(":MEASure1:ALL", None).await.unwrap(),
            "ON,10,2,20,2026.10.15 12-00-00-000000"
        );

        transport.disconnect().await.unwrap();
        assert_eq!(
            server.await.unwrap(),
            vec![":OUTPut1:STATe ON", ":MEASure1:ALL"]
        );
    }

    #[tokio::test]
    async fn error_line_becomes_protocol_error() {
        let (listener, addr) = test_listener().await;
        let server = serve(listener, |_| "ERR invalid channel 7".to_string());

        let transport = TcpTransport::new(&addr);
        transport.connect().await.unwrap();
        let result = transport.send_text(":SOURce7:VOLTage 1.0", None).await;
        match result {
            Err(Error::Protocol(msg)) => assert!(msg.contains("invalid channel 7"), "{msg}"),
            other => panic!("expected Protocol error, got: {:?}", other),
        }
        assert!(transport.is_connected());

        transport.disconnect().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn correlated_commands_are_logged() {
        let (listener, addr) = test_listener().await;
        let server = serve(listener, |_| String::new());

        let log = Arc::new(CommandLog::default());
        let transport = TcpTransport::new(&addr).command_log(Arc::clone(&log));
        transport.connect().await.unwrap();

        let id = CorrelationId::new();
        transport.send_text(":OUTPut3:STATe OFF", Some(&id)).await.unwrap();
        transport.send_text(":MEASure3:ALL", None).await.unwrap();

        assert_eq!(log.commands_for(&id).await.unwrap(), vec![":OUTPut3:STATe OFF"]);
        assert_eq!(log.len().await, 1);

        transport.disconnect().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = TcpTransport::new(&addr).connect().await.unwrap_err();
        match &err {
            Error::Transport(msg) => assert!(
                msg.contains("connection refused"),
                "expected 'connection refused' in message, got: {}",
                msg
            ),
            other => panic!("expected Transport error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn connect_timeout_to_nonexistent_host() {
        // RFC 5737 TEST-NET-1 is black-holed on most stacks.
        let result = TcpTransport::new("192.0.2.1:5025")
            .connect_timeout(Duration::from_millis(100))
            .connect()
            .await;

        let err = result.unwrap_err();
        assert!(
            matches!(err, Error::Timeout | Error::Io(_) | Error::Transport(_)),
            "expected Timeout, Io or Transport, got: {:?}",
            err
        );
    }

    #[tokio::test]
    async fn response_timeout_drops_link() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let transport = TcpTransport::new(&addr).response_timeout(Duration::from_millis(100));
        transport.connect().await.unwrap();

        let result = transport.send_text(":MEASure1:ALL", None).await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert!(!transport.is_connected());

        server.abort();
    }

    #[tokio::test]
    async fn peer_close_is_connection_lost() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let transport = TcpTransport::new(&addr);
        transport.connect().await.unwrap();
        server.await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let result = transport.send_text(":MEASure1:ALL", None).await;
        assert!(
            matches!(result, Err(Error::ConnectionLost)),
            "expected ConnectionLost, got: {:?}",
            result
        );
    }

    #[tokio::test]
    async fn reconnects_after_link_failure() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            // First connection closes immediately, second one answers.
            let (first, _) = listener.accept().await.unwrap();
            drop(first);
            let (second, _) = listener.accept().await.unwrap();
            let (r, mut w) = second.into_split();
            let mut lines = BufReader::new(r).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            w.write_all(b"\n").await.unwrap();
            line
        });

        let transport = TcpTransport::new(&addr);
        transport.connect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(transport.send_text(":MEASure1:ALL", None).await.is_err());

        assert_eq!(transport.send_text(":OUTPut1:STATe ON", None).await.unwrap(), "");
        assert!(transport.is_connected());
        assert_eq!(server.await.unwrap(), ":OUTPut1:STATe ON");
    }

    #[tokio::test]
    async fn command_is_logged_when_reconnect_fails() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            // Accept once, then stop listening so reconnects are refused.
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let log = Arc::new(CommandLog::default());
        let transport = TcpTransport::new(&addr).command_log(Arc::clone(&log));
        transport.connect().await.unwrap();
        server.await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(transport.send_text(":MEASure1:ALL", None).await.is_err());
        assert!(!transport.is_connected());

        let id = CorrelationId::new();
        let result = transport.send_text(":OUTPut1:STATe ON", Some(&id)).await;
        assert!(
            matches!(result, Err(Error::Transport(_))),
            "expected Transport error, got: {:?}",
            result
        );
        assert_eq!(log.commands_for(&id).await.unwrap(), vec![":OUTPut1:STATe ON"]);
    }

    #[tokio::test]
    async fn send_after_disconnect_returns_not_connected() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let transport = TcpTransport::new(&addr);
        transport.connect().await.unwrap();
        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());

        let result = transport.send_text(":MEASure1:ALL", None).await;
        assert!(matches!(result, Err(Error::NotConnected)));

        // Disconnecting again is a no-op.
        transport.disconnect().await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn send_before_connect_returns_not_connected() {
        let transport = TcpTransport::new("127.0.0.1:1");
        let result = transport.send_text(":MEASure1:ALL", None).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn from_stream_works() {
        let (listener, addr) = test_listener().await;
        let server = serve(listener, |_| String::new());

        let raw_stream = TcpStream::connect(&addr).await.unwrap();
        let transport = TcpTransport::from_stream(raw_stream, addr.clone());
        assert!(transport.is_connected());
        assert_eq!(transport.addr(), addr);

        assert_eq!(transport.send_text(":SOURce2:CURRent 0.5", None).await.unwrap(), "");

        transport.disconnect().await.unwrap();
        assert_eq!(server.await.unwrap(), vec![":SOURce2:CURRent 0.5"]);
    }
}
