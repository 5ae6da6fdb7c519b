use onvif_soap::fault::subcode;
use onvif_soap::{Fault, SoapError};
use thiserror::Error;

use crate::service::Service;

/// High-level API errors for ONVIF operations
///
/// Faults returned by the device are classified by their subcode so callers
/// can tell "unsupported" from "not found" from "rejected" without digging
/// into the fault themselves.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network or HTTP failure, retryable in principle
    #[error("Transport error during {operation}: {message}")]
    Transport { operation: String, message: String },

    /// The per-call timeout elapsed
    #[error("Deadline exceeded during {operation}")]
    DeadlineExceeded { operation: String },

    /// The caller's cancellation token fired
    #[error("Call canceled during {operation}")]
    Canceled { operation: String },

    /// The reply could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// The device did not advertise an address for this service
    #[error("Service {0} is not supported by the device")]
    ServiceUnsupported(Service),

    /// Fault saying the feature is unsupported (`ter:PTZNotSupported`,
    /// `ter:ActionNotSupported`)
    #[error("Unsupported: {0}")]
    Unsupported(Fault),

    /// Fault for an unknown profile, preset, configuration or subscription
    #[error("Not found: {0}")]
    NotFound(Fault),

    /// The subscription is past its termination time
    #[error("Expired: {0}")]
    Expired(Fault),

    /// Authentication rejected
    #[error("Not authorized: {0}")]
    NotAuthorized(Fault),

    /// Any other fault
    #[error("SOAP fault: {0}")]
    Fault(Fault),

    /// A request failed local validation and was never sent
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl ApiError {
    /// Same rule as [`SoapError::is_retryable`]: only transport failures.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Transport { .. } | ApiError::DeadlineExceeded { .. })
    }

    /// The underlying fault, for any fault-derived variant
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            ApiError::Unsupported(f)
            | ApiError::NotFound(f)
            | ApiError::Expired(f)
            | ApiError::NotAuthorized(f)
            | ApiError::Fault(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, ApiError::Unsupported(_) | ApiError::ServiceUnsupported(_))
    }
}

/// Sort a fault into the variant its subcode implies.
pub fn classify_fault(fault: Fault) -> ApiError {
    let has = |code: &str| fault.has_subcode(code);
    if has(subcode::SUBSCRIPTION_EXPIRED) {
        ApiError::Expired(fault)
    } else if has(subcode::PTZ_NOT_SUPPORTED) || has(subcode::ACTION_NOT_SUPPORTED) {
        ApiError::Unsupported(fault)
    } else if has(subcode::NO_PROFILE)
        || has(subcode::NO_TOKEN)
        || has(subcode::NO_CONFIG)
        || has(subcode::NO_SOURCE)
        || has(subcode::RESOURCE_UNKNOWN)
    {
        ApiError::NotFound(fault)
    } else if has(subcode::NOT_AUTHORIZED) {
        ApiError::NotAuthorized(fault)
    } else {
        ApiError::Fault(fault)
    }
}

/// Type alias for results that can return an ApiError
pub type Result<T> = std::result::Result<T, ApiError>;

impl From<SoapError> for ApiError {
    fn from(error: SoapError) -> Self {
        match error {
            SoapError::Transport { operation, message } => ApiError::Transport { operation, message },
            SoapError::DeadlineExceeded { operation } => ApiError::DeadlineExceeded { operation },
            SoapError::Canceled { operation } => ApiError::Canceled { operation },
            SoapError::Parse(msg) => ApiError::Parse(msg),
            SoapError::MissingElement(msg) => ApiError::Parse(format!("missing element {}", msg)),
            SoapError::Fault(fault) => classify_fault(fault),
        }
    }
}

impl From<crate::operation::ValidationError> for ApiError {
    fn from(error: crate::operation::ValidationError) -> Self {
        ApiError::InvalidParameter(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[subcode::INVALID_ARG_VAL, subcode::NO_PROFILE], "NotFound")]
    #[case(&[subcode::INVALID_ARG_VAL, subcode::NO_TOKEN], "NotFound")]
    #[case(&[subcode::INVALID_ARG_VAL, subcode::NO_CONFIG], "NotFound")]
    #[case(&[subcode::INVALID_ARG_VAL, subcode::NO_SOURCE], "NotFound")]
    #[case(&[subcode::RESOURCE_UNKNOWN], "NotFound")]
    #[case(&[subcode::ACTION_NOT_SUPPORTED, subcode::PTZ_NOT_SUPPORTED], "Unsupported")]
    #[case(&[subcode::ACTION_NOT_SUPPORTED], "Unsupported")]
    #[case(&[subcode::SUBSCRIPTION_EXPIRED], "Expired")]
    #[case(&[subcode::NOT_AUTHORIZED], "NotAuthorized")]
    #[case(&[subcode::INVALID_ARG_VAL], "Fault")]
    #[case(&[], "Fault")]
    fn test_fault_classification(#[case] subcodes: &[&str], #[case] expected: &str) {
        let error: ApiError = SoapError::Fault(Fault::sender(subcodes, "x")).into();
        let kind = match &error {
            ApiError::NotFound(_) => "NotFound",
            ApiError::Unsupported(_) => "Unsupported",
            ApiError::Expired(_) => "Expired",
            ApiError::NotAuthorized(_) => "NotAuthorized",
            ApiError::Fault(_) => "Fault",
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(kind, expected);
        assert!(error.fault().is_some());
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_transport_errors_pass_through() {
        let error: ApiError = SoapError::DeadlineExceeded {
            operation: "GetProfiles".to_string(),
        }
        .into();
        assert!(matches!(error, ApiError::DeadlineExceeded { ref operation } if operation == "GetProfiles"));
        assert!(error.is_retryable());

        let error: ApiError = SoapError::MissingElement("Body/StopResponse".to_string()).into();
        assert!(matches!(error, ApiError::Parse(_)));
    }

    #[test]
    fn test_error_display() {
        let error = ApiError::ServiceUnsupported(Service::Ptz);
        assert_eq!(error.to_string(), "Service PTZ is not supported by the device");
        assert!(error.is_unsupported());
    }
}
