//! Transport implementations for psuctl.
//!
//! This crate provides the network implementation of the
//! [`Transport`](psuctl_core::Transport) trait from `psuctl-core`:
//!
//! - [`TcpTransport`]: line-oriented SCPI over a TCP socket, for supplies
//!   with a LAN interface or behind a serial-to-Ethernet bridge
//!
//! The in-process simulated transport lives in `psuctl-sim`.

pub mod tcp;

pub use tcp::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_RESPONSE_TIMEOUT, TcpTransport};
