//! Mock transport for deterministic testing of the driver.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! command/response pairs. This lets you test command generation and
//! response parsing without a device model or a socket.
//!
//! # Example
//!
//! ```
//! use psuctl_test_harness::MockTransport;
//!
//! let mock = MockTransport::new();
//! // When the driver sends this command, answer with this line.
//! mock.expect(":MEASure1:ALL", "ON,10,2,20,2026.10.15 12-00-00-000000");
//! mock.expect(":OUTPut1:STATe OFF", "");
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use psuctl_core::correlation::CorrelationId;
use psuctl_core::error::{Error, Result};
use psuctl_core::transport::Transport;

/// What the mock answers when an expectation is consumed.
#[derive(Debug)]
enum Reply {
    Text(String),
    Fail(Error),
}

/// A pre-loaded command/reply pair for the mock transport.
#[derive(Debug)]
struct Expectation {
    /// The exact command we expect to be sent.
    command: String,
    reply: Reply,
}

#[derive(Debug)]
struct MockState {
    /// Ordered queue of expected command/reply pairs.
    expectations: VecDeque<Expectation>,
    /// Every command sent, with the correlation id it carried.
    sent: Vec<(String, Option<CorrelationId>)>,
    connected: bool,
}

/// A mock [`Transport`] for testing without hardware.
///
/// Expectations are consumed in order. Every `send_text()` call is recorded
/// and matched against the next expectation; a mismatch or an exhausted
/// queue returns [`Error::Protocol`].
#[derive(Debug)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            state: Mutex::new(MockState {
                expectations: VecDeque::new(),
                sent: Vec::new(),
                connected: true,
            }),
        }
    }

    /// Add an expected command and the response text to return for it.
    pub fn expect(&self, command: &str, response: &str) {
        self.push(command, Reply::Text(response.to_string()));
    }

    /// Add an expected command that fails with `error`.
    pub fn expect_failure(&self, command: &str, error: Error) {
        self.push(command, Reply::Fail(error));
    }

    /// All commands sent through this transport, in order.
    pub fn sent_commands(&self) -> Vec<String> {
        self.lock().sent.iter().map(|(c, _)| c.clone()).collect()
    }

    /// All commands sent through this transport with their correlation ids.
    pub fn sent_with_correlation(&self) -> Vec<(String, Option<CorrelationId>)> {
        self.lock().sent.clone()
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.lock().expectations.len()
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, subsequent `send_text()` calls return
    /// [`Error::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
    }

    fn push(&self, command: &str, reply: Reply) {
        self.lock().expectations.push_back(Expectation {
            command: command.to_string(),
            reply,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // Poisoning only means another test thread panicked; the state is intact.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<()> {
        self.lock().connected = true;
        Ok(())
    }

    async fn send_text(
        &self,
        command: &str,
        correlation: Option<&CorrelationId>,
    ) -> Result<String> {
        let mut state = self.lock();
        if !state.connected {
            return Err(Error::NotConnected);
        }

        state.sent.push((command.to_string(), correlation.copied()));

        let Some(expectation) = state.expectations.pop_front() else {
            return Err(Error::Protocol(format!(
                "no more expectations in mock transport (got '{command}')"
            )));
        };
        if expectation.command != command {
            return Err(Error::Protocol(format!(
                "unexpected command: expected '{}', got '{}'",
                expectation.command, command
            )));
        }

        match expectation.reply {
            Reply::Text(text) => Ok(text),
            Reply::Fail(error) => Err(error),
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.lock().connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }
}
