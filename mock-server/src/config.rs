//! Server configuration
//!
//! [`ServerConfig`] controls where the server listens, who may call it and
//! the limits of the pull-point subscription manager. Start from
//! [`ServerConfig::default`] or one of the presets and adjust with the
//! `with_*` builders; [`OnvifServer::start`](crate::OnvifServer::start)
//! validates before binding.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use onvif_api::types::device::{DeviceInformation, Scope, ScopeDefinition};
use onvif_soap::Credentials;

use crate::error::{Result, ServerError};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen address
    /// Default: 0.0.0.0:8080
    pub bind_address: SocketAddr,

    /// Host put into advertised service addresses. `None` uses the bound IP,
    /// or the outbound interface address when bound to 0.0.0.0.
    pub advertised_host: Option<String>,

    /// Accounts accepted in the WS-Security header. Empty disables
    /// authentication.
    pub users: Vec<Credentials>,

    /// Upper bound on any subscription or renewal
    /// Default: 1 hour
    pub max_subscription_duration: Duration,

    /// Used when a subscribe request names no termination time
    /// Default: 60 seconds
    pub default_subscription_duration: Duration,

    /// Messages kept per subscription before the oldest is dropped
    /// Default: 100
    pub queue_capacity: usize,

    /// Upper bound on `MessageLimit` of a single pull
    /// Default: 100
    pub max_pull_messages: u32,

    /// Upper bound on the `Timeout` of a single pull
    /// Default: 60 seconds
    pub max_pull_wait: Duration,

    pub device_information: DeviceInformation,

    pub hostname: String,

    /// Free-form location put into the scopes
    pub location: String,

    /// WS-Discovery endpoint reference, `urn:uuid:...`
    pub endpoint_reference: String,

    /// Topics advertised by `GetEventProperties`
    pub event_topics: Vec<String>,

    /// Answer WS-Discovery probes
    /// Default: false
    pub discovery: bool,

    /// Discovery responder socket
    /// Default: 0.0.0.0:3702
    pub discovery_address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            advertised_host: None,
            users: Vec::new(),
            max_subscription_duration: Duration::from_secs(3600),
            default_subscription_duration: Duration::from_secs(60),
            queue_capacity: 100,
            max_pull_messages: 100,
            max_pull_wait: Duration::from_secs(60),
            device_information: DeviceInformation {
                manufacturer: "ONVIF SDK".to_string(),
                model: "Mock PTZ Camera".to_string(),
                firmware_version: env!("CARGO_PKG_VERSION").to_string(),
                serial_number: "MOCK-0001".to_string(),
                hardware_id: "mock-1".to_string(),
            },
            hostname: "onvif-mock".to_string(),
            location: "lab".to_string(),
            endpoint_reference: format!("urn:uuid:{}", uuid::Uuid::new_v4()),
            event_topics: vec![
                "tns1:VideoSource/MotionAlarm".to_string(),
                "tns1:Device/Trigger/DigitalInput".to_string(),
                "tns1:RuleEngine/CellMotionDetector/Motion".to_string(),
            ],
            discovery: false,
            discovery_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 3702)),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loopback on an ephemeral port, for tests
    pub fn local() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            ..Default::default()
        }
    }

    pub fn with_bind_address(mut self, address: SocketAddr) -> Self {
        self.bind_address = address;
        self
    }

    pub fn with_advertised_host(mut self, host: impl Into<String>) -> Self {
        self.advertised_host = Some(host.into());
        self
    }

    /// Require authentication and accept this account.
    pub fn with_user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.users.push(Credentials::new(username, password));
        self
    }

    pub fn with_subscription_limits(mut self, default: Duration, max: Duration) -> Self {
        self.default_subscription_duration = default;
        self.max_subscription_duration = max;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_max_pull_wait(mut self, wait: Duration) -> Self {
        self.max_pull_wait = wait;
        self
    }

    pub fn with_device_information(mut self, information: DeviceInformation) -> Self {
        self.device_information = information;
        self
    }

    pub fn with_discovery(mut self, address: SocketAddr) -> Self {
        self.discovery = true;
        self.discovery_address = address;
        self
    }

    pub fn requires_auth(&self) -> bool {
        !self.users.is_empty()
    }

    /// Password of `username`, if configured
    pub fn password_for(&self, username: &str) -> Option<&str> {
        self.users
            .iter()
            .find(|c| c.username == username)
            .map(|c| c.password.as_str())
    }

    /// Scopes reported by `GetScopes` and advertised in probe matches
    pub fn scopes(&self) -> Vec<Scope> {
        let scope = |definition, path: &str, value: &str| Scope {
            definition,
            item: format!("onvif://www.onvif.org/{}/{}", path, value.replace(' ', "%20")),
        };
        vec![
            scope(ScopeDefinition::Fixed, "type", "video_encoder"),
            scope(ScopeDefinition::Fixed, "type", "ptz"),
            scope(ScopeDefinition::Fixed, "Profile", "Streaming"),
            scope(ScopeDefinition::Fixed, "hardware", &self.device_information.model),
            scope(ScopeDefinition::Configurable, "name", &self.hostname),
            scope(ScopeDefinition::Configurable, "location", &self.location),
        ]
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.default_subscription_duration.is_zero() {
            return Err(ServerError::Configuration(
                "Default subscription duration must be greater than 0".to_string(),
            ));
        }

        if self.default_subscription_duration > self.max_subscription_duration {
            return Err(ServerError::Configuration(
                "Default subscription duration must not exceed the maximum".to_string(),
            ));
        }

        if self.queue_capacity == 0 {
            return Err(ServerError::Configuration(
                "Queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.max_pull_messages == 0 {
            return Err(ServerError::Configuration(
                "Max pull messages must be greater than 0".to_string(),
            ));
        }

        if self.users.iter().any(|c| c.username.trim().is_empty()) {
            return Err(ServerError::Configuration(
                "User names must not be empty".to_string(),
            ));
        }

        if matches!(&self.advertised_host, Some(host) if host.trim().is_empty()) {
            return Err(ServerError::Configuration(
                "Advertised host must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
