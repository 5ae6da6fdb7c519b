//! Error types for the SOAP layer

use crate::fault::Fault;
use thiserror::Error;

/// Errors that can occur while building, sending or parsing SOAP messages
#[derive(Debug, Error)]
pub enum SoapError {
    /// Network or HTTP communication error
    #[error("Transport error during {operation}: {message}")]
    Transport { operation: String, message: String },

    /// The caller's deadline elapsed before the exchange completed
    #[error("Deadline exceeded during {operation}")]
    DeadlineExceeded { operation: String },

    /// The caller canceled the exchange
    #[error("Call canceled during {operation}")]
    Canceled { operation: String },

    /// XML is malformed or has an unexpected shape
    #[error("XML parsing error: {0}")]
    Parse(String),

    /// A required element is absent
    #[error("Missing element: {0}")]
    MissingElement(String),

    /// SOAP fault returned by the peer
    #[error("SOAP fault: {0}")]
    Fault(Fault),
}

impl SoapError {
    /// Whether a caller may reasonably retry the same request unchanged.
    ///
    /// Only transport-level failures qualify; faults and codec failures need a
    /// different request (or a different peer) to succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SoapError::Transport { .. } | SoapError::DeadlineExceeded { .. }
        )
    }
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, SoapError>;
