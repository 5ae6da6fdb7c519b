//! ONVIF device discovery library
//!
//! Sends a WS-Discovery `Probe` from every IPv4 interface and collects the
//! `ProbeMatches` replies for the whole listen window.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! # async fn run() -> onvif_discovery::Result<()> {
//! let outcome = onvif_discovery::discover(Duration::from_secs(3)).await?;
//! for device in &outcome.devices {
//!     println!("{} at {:?}", device.endpoint_reference, device.primary_xaddr());
//! }
//! for warning in &outcome.warnings {
//!     eprintln!("skipped {}", warning);
//! }
//! # Ok(())
//! # }
//! ```

pub mod device;
mod error;
mod listener;
pub mod probe;

pub use device::DeviceDescriptor;
pub use error::{DiscoveryError, InterfaceStage, InterfaceWarning, Result};
pub use listener::ProbeCollector;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// WS-Discovery multicast group and port
pub const MULTICAST_TARGET: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 3702);

/// Discovery settings.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Listen window; always observed in full
    pub duration: Duration,
    /// Interfaces to probe from. `None` enumerates the host's IPv4 interfaces.
    pub interfaces: Option<Vec<Ipv4Addr>>,
    /// Include loopback when enumerating
    pub include_loopback: bool,
    /// Where probes are sent
    pub target: SocketAddr,
    /// Requested device types
    pub types: Vec<String>,
    pub cancel: Option<CancellationToken>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(3),
            interfaces: None,
            include_loopback: false,
            target: SocketAddr::V4(MULTICAST_TARGET),
            types: vec![probe::NETWORK_VIDEO_TRANSMITTER.to_string()],
            cancel: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_interfaces(mut self, interfaces: Vec<Ipv4Addr>) -> Self {
        self.interfaces = Some(interfaces);
        self
    }

    pub fn with_loopback(mut self, include: bool) -> Self {
        self.include_loopback = include;
        self
    }

    pub fn with_target(mut self, target: SocketAddr) -> Self {
        self.target = target;
        self
    }

    pub fn with_types(mut self, types: Vec<String>) -> Self {
        self.types = types;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Devices found plus the interfaces that had to be skipped.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    pub devices: Vec<DeviceDescriptor>,
    pub warnings: Vec<InterfaceWarning>,
}

/// Probe with default settings for `duration`.
pub async fn discover(duration: Duration) -> Result<DiscoveryOutcome> {
    discover_with_config(DiscoveryConfig::default().with_duration(duration)).await
}

pub async fn discover_with_config(config: DiscoveryConfig) -> Result<DiscoveryOutcome> {
    let mut warnings = Vec::new();
    let interfaces = match &config.interfaces {
        Some(list) => list.clone(),
        None => listener::local_interfaces(config.include_loopback, &mut warnings),
    };

    let message_id: Arc<str> = Arc::from(format!("urn:uuid:{}", uuid::Uuid::new_v4()));
    let probe = probe::build_probe(&message_id, &config.types);
    let collector = Arc::new(ProbeCollector::default());
    let cancel = config.cancel.clone().unwrap_or_default();
    let deadline = Instant::now() + config.duration;

    let mut listeners = Vec::new();
    for iface in interfaces {
        let socket = match listener::open_socket(iface, config.target) {
            Ok(socket) => socket,
            Err(e) => {
                tracing::warn!("skipping interface {}: {}", iface, e);
                warnings.push(InterfaceWarning {
                    interface: iface,
                    stage: InterfaceStage::Bind,
                    message: e.to_string(),
                });
                continue;
            }
        };
        if let Err(e) = socket.send_to(probe.as_bytes(), config.target).await {
            tracing::warn!("probe from {} failed: {}", iface, e);
            warnings.push(InterfaceWarning {
                interface: iface,
                stage: InterfaceStage::Send,
                message: e.to_string(),
            });
            continue;
        }
        tracing::debug!("probe {} sent from {}", message_id, iface);
        let handle = tokio::spawn(listener::listen(
            iface,
            socket,
            message_id.clone(),
            collector.clone(),
            deadline,
            cancel.clone(),
        ));
        listeners.push((iface, handle));
    }

    if listeners.is_empty() {
        return Err(DiscoveryError::NoUsableInterfaces(warnings));
    }

    for (iface, handle) in listeners {
        warnings.extend(listener_warning(iface, handle.await));
    }
    if cancel.is_cancelled() {
        return Err(DiscoveryError::Canceled);
    }

    let devices = collector.devices();
    tracing::info!(
        "discovery finished: {} device(s), {} warning(s)",
        devices.len(),
        warnings.len()
    );
    Ok(DiscoveryOutcome { devices, warnings })
}

/// Warning left by a finished listener task. A task that panicked or was
/// aborted counts as a receive failure on its interface.
fn listener_warning(
    iface: Ipv4Addr,
    joined: std::result::Result<Option<InterfaceWarning>, tokio::task::JoinError>,
) -> Option<InterfaceWarning> {
    match joined {
        Ok(warning) => warning,
        Err(e) => {
            tracing::warn!("listener on {} ended abnormally: {}", iface, e);
            Some(InterfaceWarning {
                interface: iface,
                stage: InterfaceStage::Receive,
                message: format!("listener task failed: {}", e),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_listener_becomes_receive_warning() {
        let iface = Ipv4Addr::new(10, 0, 0, 7);
        let crashed = tokio::spawn(async move {
            if iface.is_private() {
                panic!("socket gone");
            }
            None
        })
        .await;
        let warning = listener_warning(iface, crashed).unwrap();
        assert_eq!(warning.interface, iface);
        assert_eq!(warning.stage, InterfaceStage::Receive);
        assert!(warning.message.contains("listener task failed"));

        assert!(listener_warning(iface, Ok(None)).is_none());
    }
}
