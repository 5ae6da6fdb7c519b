use onvif_soap::fault::subcode;
use onvif_soap::{Fault, SoapError};
use thiserror::Error;

/// Errors raised while serving requests or starting the server
///
/// Every variant has a fault representation, so a handler error always
/// reaches the client as a SOAP fault and never as a transport failure.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Profile {0} not found")]
    ProfileNotFound(String),

    /// The profile exists but has no PTZ configuration
    #[error("PTZ is not supported on profile {0}")]
    PtzNotSupported(String),

    #[error("Preset {0} not found")]
    PresetNotFound(String),

    #[error("Configuration {0} not found")]
    ConfigurationNotFound(String),

    #[error("Video source {0} not found")]
    VideoSourceNotFound(String),

    #[error("Subscription {0} not found")]
    SubscriptionNotFound(String),

    #[error("Subscription {0} has expired")]
    SubscriptionExpired(String),

    #[error("Profile {0} is fixed and cannot be deleted")]
    FixedProfile(String),

    /// A token or name that must be unique is already taken
    #[error("{0} already exists")]
    Conflict(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Sender not authorized")]
    NotAuthorized,

    #[error("Operation {0} not implemented")]
    NotImplemented(String),

    /// The request envelope or body could not be decoded
    #[error("Malformed request: {0}")]
    Malformed(String),

    /// A handler panicked or hit an unexpected state
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to bind {address}: {message}")]
    Bind { address: std::net::SocketAddr, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// SOAP fault sent back for this error
    pub fn to_fault(&self) -> Fault {
        let reason = self.to_string();
        match self {
            ServerError::ProfileNotFound(_) => {
                Fault::sender(&[subcode::INVALID_ARG_VAL, subcode::NO_PROFILE], reason)
            }
            ServerError::PtzNotSupported(_) => {
                Fault::sender(&[subcode::ACTION_NOT_SUPPORTED, subcode::PTZ_NOT_SUPPORTED], reason)
            }
            ServerError::PresetNotFound(_) => {
                Fault::sender(&[subcode::INVALID_ARG_VAL, subcode::NO_TOKEN], reason)
            }
            ServerError::ConfigurationNotFound(_) => {
                Fault::sender(&[subcode::INVALID_ARG_VAL, subcode::NO_CONFIG], reason)
            }
            ServerError::VideoSourceNotFound(_) => {
                Fault::sender(&[subcode::INVALID_ARG_VAL, subcode::NO_SOURCE], reason)
            }
            ServerError::SubscriptionNotFound(_) => Fault::sender(&[subcode::RESOURCE_UNKNOWN], reason),
            ServerError::SubscriptionExpired(_) => Fault::sender(&[subcode::SUBSCRIPTION_EXPIRED], reason),
            ServerError::FixedProfile(_) => {
                Fault::receiver(&[subcode::ACTION, subcode::CANNOT_DELETE_FIXED], reason)
            }
            ServerError::Conflict(_) => Fault::sender(&[subcode::INVALID_ARG_VAL, subcode::CONFLICT], reason),
            ServerError::InvalidArgument(_) => Fault::sender(&[subcode::INVALID_ARG_VAL], reason),
            ServerError::NotAuthorized => Fault::sender(&[subcode::NOT_AUTHORIZED], reason),
            ServerError::NotImplemented(_) => {
                Fault::receiver(&[subcode::ACTION_NOT_SUPPORTED], "not implemented")
            }
            ServerError::Malformed(_) => Fault::sender(&[], reason),
            ServerError::Internal(_)
            | ServerError::Configuration(_)
            | ServerError::Bind { .. }
            | ServerError::Io(_) => Fault::receiver(&[], "internal server error"),
        }
    }
}

impl From<SoapError> for ServerError {
    fn from(error: SoapError) -> Self {
        ServerError::Malformed(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
