//! Error types for psuctl.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Translation, device, and transport
//! errors are all captured here so that a single request can carry any of
//! them back to the caller.

/// The error type for all psuctl operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A command-path segment matched no node in the command tree.
    #[error("unknown command segment '{segment}' in '{command}'")]
    UnknownSegment {
        /// The offending segment, as received.
        segment: String,
        /// The full command text.
        command: String,
    },

    /// A node matched, but its extraction rule could not read the parameter.
    #[error("cannot extract {rule} parameter from '{segment}'")]
    ParameterExtraction {
        /// The segment the rule was applied to.
        segment: String,
        /// Name of the extraction rule (`integer`, `float`, `state`).
        rule: &'static str,
    },

    /// The command ended on a routing node that has no operation.
    #[error("incomplete command: '{0}'")]
    IncompleteCommand(String),

    /// A translated command lacks a parameter its operation requires.
    #[error("missing parameter '{0}'")]
    MissingParameter(&'static str),

    /// An operation addressed a channel outside 1-4.
    #[error("invalid channel {0}: available channels are 1, 2, 3, 4")]
    InvalidChannel(i64),

    /// A parameter had the right shape but an unusable value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A transport-level error (socket, emulator link).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (malformed or error response from the instrument).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for a response from the instrument.
    #[error("timeout waiting for response")]
    Timeout,

    /// No connection to the instrument has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the instrument was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error was caused by the caller's input rather than by the
    /// instrument link or the library itself.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidChannel(_) | Error::InvalidParameter(_))
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
