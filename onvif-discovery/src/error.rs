//! Error types for the discovery system.

use std::fmt;
use std::net::Ipv4Addr;

use serde::Serialize;
use thiserror::Error;

/// Where a per-interface failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InterfaceStage {
    /// Listing the host's interfaces
    Enumerate,
    /// Creating or binding the socket
    Bind,
    /// Sending the probe
    Send,
    /// Reading replies
    Receive,
}

/// Non-fatal failure on one interface. Discovery carries on with the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceWarning {
    pub interface: Ipv4Addr,
    pub stage: InterfaceStage,
    pub message: String,
}

impl fmt::Display for InterfaceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}): {}", self.interface, self.stage, self.message)
    }
}

/// Error type for discovery operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// No interface got as far as sending a probe
    #[error("no usable network interface ({} warnings)", .0.len())]
    NoUsableInterfaces(Vec<InterfaceWarning>),

    /// The caller's cancellation token fired before the window closed
    #[error("discovery canceled")]
    Canceled,

    /// A WS-Discovery message could not be decoded
    #[error("parse error: {0}")]
    Parse(String),
}

/// Convenience Result type alias for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
