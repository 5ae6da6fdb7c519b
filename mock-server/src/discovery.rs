//! WS-Discovery responder
//!
//! Answers `Probe` messages with a `ProbeMatches` reply advertising the
//! server's device service address. Probes asking for types the server does
//! not have get no reply, as the protocol requires.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use onvif_discovery::probe::{self, ProbeMatch, NETWORK_VIDEO_TRANSMITTER};
use onvif_discovery::MULTICAST_TARGET;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{Result, ServerError};

const MAX_DATAGRAM: usize = 8192;

/// What the responder tells probing clients
#[derive(Debug, Clone)]
pub struct Advertisement {
    pub endpoint_reference: String,
    pub types: Vec<String>,
    pub scopes: Vec<String>,
    pub xaddrs: Vec<String>,
    pub metadata_version: u32,
}

impl Advertisement {
    /// Network video transmitter reachable at `device_url`
    pub fn new(endpoint_reference: impl Into<String>, device_url: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            endpoint_reference: endpoint_reference.into(),
            types: vec![NETWORK_VIDEO_TRANSMITTER.to_string(), "tds:Device".to_string()],
            scopes,
            xaddrs: vec![device_url.into()],
            metadata_version: 1,
        }
    }

    /// A probe without types matches everything; otherwise one requested
    /// type must match ours by local name.
    fn matches(&self, requested: &[String]) -> bool {
        fn local(name: &str) -> &str {
            name.rsplit(':').next().unwrap_or(name)
        }
        requested.is_empty()
            || requested
                .iter()
                .any(|wanted| self.types.iter().any(|ours| local(ours) == local(wanted)))
    }

    /// Reply to a received datagram, `None` when it is not a probe for us.
    pub fn answer(&self, datagram: &[u8]) -> Option<String> {
        let text = std::str::from_utf8(datagram).ok()?;
        let message = probe::parse_message(text).ok()?;
        let requested = message.probe_types?;
        if !self.matches(&requested) {
            return None;
        }
        let relates_to = message.message_id?;
        let reply = ProbeMatch {
            endpoint_reference: self.endpoint_reference.clone(),
            types: self.types.clone(),
            scopes: self.scopes.clone(),
            xaddrs: self.xaddrs.clone(),
            metadata_version: self.metadata_version,
        };
        let message_id = format!("urn:uuid:{}", uuid::Uuid::new_v4());
        Some(probe::build_probe_matches(&message_id, &relates_to, &[reply]))
    }
}

/// Reusable UDP socket. Bound to the unspecified address it also joins the
/// WS-Discovery multicast group.
fn open_socket(address: SocketAddr) -> io::Result<UdpSocket> {
    let domain = if address.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&address.into())?;

    if address.ip() == IpAddr::V4(Ipv4Addr::UNSPECIFIED) {
        if let Err(e) = socket.join_multicast_v4(MULTICAST_TARGET.ip(), &Ipv4Addr::UNSPECIFIED) {
            tracing::warn!("could not join {}: {}", MULTICAST_TARGET, e);
        }
    }
    UdpSocket::from_std(socket.into())
}

async fn serve(socket: UdpSocket, advertisement: Arc<Advertisement>, mut shutdown: oneshot::Receiver<()>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, from)) => {
                    let Some(reply) = advertisement.answer(&buf[..len]) else {
                        continue;
                    };
                    tracing::debug!("answering probe from {}", from);
                    if let Err(e) = socket.send_to(reply.as_bytes(), from).await {
                        tracing::warn!("probe reply to {} failed: {}", from, e);
                    }
                }
                Err(e) => tracing::debug!("discovery receive failed: {}", e),
            }
        }
    }
    tracing::debug!("discovery responder stopped");
}

/// Background task answering probes until shut down or dropped
#[derive(Debug)]
pub struct DiscoveryResponder {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl DiscoveryResponder {
    pub async fn start(address: SocketAddr, advertisement: Advertisement) -> Result<Self> {
        let socket = open_socket(address).map_err(|e| ServerError::Bind {
            address,
            message: e.to_string(),
        })?;
        let local_addr = socket.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(serve(socket, Arc::new(advertisement), shutdown_rx));
        tracing::info!("discovery responder listening on {}", local_addr);

        Ok(Self {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onvif_discovery::{discover_with_config, DiscoveryConfig};
    use std::time::Duration;

    fn advertisement() -> Advertisement {
        Advertisement::new(
            "urn:uuid:mock-camera",
            "http://127.0.0.1:8080/onvif/device_service",
            vec!["onvif://www.onvif.org/name/onvif-mock".to_string()],
        )
    }

    #[test]
    fn test_answers_matching_probe() {
        let probe = probe::build_probe("urn:uuid:probe-1", &[NETWORK_VIDEO_TRANSMITTER.to_string()]);
        let reply = advertisement().answer(probe.as_bytes()).unwrap();
        let parsed = probe::parse_message(&reply).unwrap();
        assert_eq!(parsed.relates_to.as_deref(), Some("urn:uuid:probe-1"));
        assert_eq!(parsed.matches.len(), 1);
        assert_eq!(parsed.matches[0].endpoint_reference, "urn:uuid:mock-camera");
        assert_eq!(
            parsed.matches[0].xaddrs,
            vec!["http://127.0.0.1:8080/onvif/device_service".to_string()]
        );
    }

    #[test]
    fn test_untyped_probe_matches() {
        let probe = probe::build_probe("urn:uuid:probe-2", &[]);
        assert!(advertisement().answer(probe.as_bytes()).is_some());
    }

    #[test]
    fn test_ignores_other_types_and_non_probes() {
        let probe = probe::build_probe("urn:uuid:probe-3", &["dp0:NetworkVideoDisplay".to_string()]);
        assert!(advertisement().answer(probe.as_bytes()).is_none());

        let reply = probe::build_probe_matches("urn:uuid:x", "urn:uuid:y", &[]);
        assert!(advertisement().answer(reply.as_bytes()).is_none());
        assert!(advertisement().answer(b"\xff\xfe").is_none());
    }

    #[tokio::test]
    async fn test_discovered_over_loopback() {
        let responder = DiscoveryResponder::start("127.0.0.1:0".parse().unwrap(), advertisement())
            .await
            .unwrap();

        let config = DiscoveryConfig::default()
            .with_duration(Duration::from_millis(500))
            .with_interfaces(vec![Ipv4Addr::LOCALHOST])
            .with_target(responder.local_addr());
        let outcome = discover_with_config(config).await.unwrap();

        assert_eq!(outcome.devices.len(), 1);
        assert_eq!(
            outcome.devices[0].primary_xaddr(),
            Some("http://127.0.0.1:8080/onvif/device_service")
        );
        assert_eq!(outcome.devices[0].name.as_deref(), Some("onvif-mock"));
        responder.shutdown().await;
    }
}
