//! Scripted TCP instrument for transport-level testing.
//!
//! [`MockInstrument`] is a TCP listener pre-loaded with command/response
//! lines. It speaks the instrument line protocol (one `\n`-terminated line
//! each way per command), so a `TcpTransport` can be tested end to end
//! without a device model.
//!
//! # Example
//!
//! ```
//! use psuctl_test_harness::MockInstrument;
//!
//! # async fn example() -> psuctl_core::Result<()> {
//! let mut instrument = MockInstrument::bind().await?;
//!
//! // When the client sends ":MEASure1:ALL", answer with a measurement line.
//! instrument.expect(":MEASure1:ALL", "ON,10,2,20,2026.10.15 12-00-00-000000");
//!
//! let addr = instrument.addr();
//! instrument.start();
//! // ... connect a TcpTransport to `addr` and test ...
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use psuctl_core::error::{Error, Result};

/// A pre-loaded command/response pair for the mock instrument.
#[derive(Debug, Clone)]
struct LineExpectation {
    /// The exact line we expect the client to send (without terminator).
    command: String,
    /// The line to send back (without terminator).
    response: String,
}

/// A mock TCP instrument for testing code that talks over a socket.
///
/// The instrument listens on a random available port on localhost. Once
/// [`start`](MockInstrument::start) is called, it accepts a single
/// connection and processes expectations in order: for each expected
/// command line, it reads one line from the client and writes back the
/// corresponding response line.
///
/// If the client sends a line that does not match the next expectation,
/// the instrument records the mismatch and closes the connection.
#[derive(Debug)]
pub struct MockInstrument {
    /// Held until `start()` moves it into the serving task.
    listener: Option<TcpListener>,
    /// The address the instrument is listening on (e.g., "127.0.0.1:54321").
    addr: String,
    /// Ordered queue of expected command/response pairs.
    expectations: VecDeque<LineExpectation>,
    /// Handle to the serving task once started.
    handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockInstrument {
    /// Bind a new mock instrument to a random port.
    ///
    /// The instrument does not accept connections until
    /// [`start`](MockInstrument::start) is called, allowing expectations to
    /// be loaded first. Clients connecting earlier wait in the backlog.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock instrument: {}", e)))?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();

        Ok(Self {
            listener: Some(listener),
            addr,
            expectations: VecDeque::new(),
            handle: None,
        })
    }

    /// Add an expected command line and the response line to send for it.
    pub fn expect(&mut self, command: &str, response: &str) {
        self.expectations.push_back(LineExpectation {
            command: command.to_string(),
            response: response.to_string(),
        });
    }

    /// Get the address the instrument is listening on.
    pub fn addr(&self) -> String {
        self.addr.clone()
    }

    /// Start serving: accept one client and process all expectations.
    ///
    /// This spawns a background task. Call [`wait`](MockInstrument::wait) to
    /// block until all expectations have been processed and check for errors.
    /// Calling `start()` twice has no effect.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let expectations: Vec<LineExpectation> = self.expectations.drain(..).collect();

        self.handle = Some(tokio::spawn(async move {
            let (stream, _) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {}", e))?;
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();

            for (i, expectation) in expectations.iter().enumerate() {
                let line = lines
                    .next_line()
                    .await
                    .map_err(|e| format!("expectation {}: read error: {}", i, e))?
                    .ok_or_else(|| {
                        format!(
                            "expectation {}: client disconnected before sending '{}'",
                            i, expectation.command
                        )
                    })?;

                if line.trim_end_matches('\r') != expectation.command {
                    return Err(format!(
                        "expectation {}: command mismatch: expected '{}', got '{}'",
                        i, expectation.command, line
                    ));
                }

                write_half
                    .write_all(format!("{}\n", expectation.response).as_bytes())
                    .await
                    .map_err(|e| format!("expectation {}: write error: {}", i, e))?;
                write_half
                    .flush()
                    .await
                    .map_err(|e| format!("expectation {}: flush error: {}", i, e))?;
            }

            Ok(())
        }));
    }

    /// Wait for the serving task to complete and return any errors.
    ///
    /// Call this after the client has finished its interactions to verify
    /// that all expectations were met.
    pub async fn wait(self) -> std::result::Result<(), String> {
        match self.handle {
            Some(handle) => handle
                .await
                .map_err(|e| format!("instrument task panicked: {}", e))?,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn answers_scripted_lines() {
        let mut instrument = MockInstrument::bind().await.unwrap();
        instrument.expect(":OUTPut1:STATe ON", "");
        instrument.expect(":MEASure1:ALL", "ON,1,1,1,2026.10.15 12-00-00-000000");
        let addr = instrument.addr();
        instrument.start();

        let stream = TcpStream::connect(&addr).await.unwrap();
        let (r, mut w) = stream.into_split();
        let mut lines = BufReader::new(r).lines();

        w.write_all(b":OUTPut1:STATe ON\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "");
        w.write_all(b":MEASure1:ALL\n").await.unwrap();
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "ON,1,1,1,2026.10.15 12-00-00-000000"
        );

        instrument.wait().await.unwrap();
    }

    #[tokio::test]
    async fn reports_mismatch() {
        let mut instrument = MockInstrument::bind().await.unwrap();
        instrument.expect(":MEASure1:ALL", "");
        let addr = instrument.addr();
        instrument.start();

        let mut stream = TcpStream::connect(&addr).await.unwrap();
        stream.write_all(b":MEASure2:ALL\n").await.unwrap();

        let err = instrument.wait().await.unwrap_err();
        assert!(err.contains("command mismatch"), "{err}");
    }

    #[tokio::test]
    async fn reports_early_disconnect() {
        let mut instrument = MockInstrument::bind().await.unwrap();
        instrument.expect(":MEASure1:ALL", "");
        let addr = instrument.addr();
        instrument.start();

        drop(TcpStream::connect(&addr).await.unwrap());

        let err = instrument.wait().await.unwrap_err();
        assert!(err.contains("disconnected"), "{err}");
    }
}
