//! Per-interface probe senders and reply listeners.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::device::DeviceDescriptor;
use crate::error::{InterfaceStage, InterfaceWarning};
use crate::probe;

const MAX_DATAGRAM: usize = 65_535;

/// Deduplicates replies by endpoint reference. A later reply replaces the
/// earlier descriptor but keeps its first-seen position.
#[derive(Debug, Default)]
pub struct ProbeCollector {
    inner: Mutex<CollectorState>,
}

#[derive(Debug, Default)]
struct CollectorState {
    order: Vec<String>,
    devices: HashMap<String, DeviceDescriptor>,
}

impl ProbeCollector {
    pub fn record(&self, device: DeviceDescriptor) {
        let mut state = self.inner.lock();
        let key = device.endpoint_reference.clone();
        if state.devices.insert(key.clone(), device).is_none() {
            state.order.push(key);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn devices(&self) -> Vec<DeviceDescriptor> {
        let state = self.inner.lock();
        state
            .order
            .iter()
            .filter_map(|key| state.devices.get(key).cloned())
            .collect()
    }
}

/// IPv4 interfaces to probe from. Enumeration failures become a warning.
pub(crate) fn local_interfaces(include_loopback: bool, warnings: &mut Vec<InterfaceWarning>) -> Vec<Ipv4Addr> {
    match get_if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces
            .iter()
            .filter(|iface| include_loopback || !iface.is_loopback())
            .filter_map(|iface| match &iface.addr {
                get_if_addrs::IfAddr::V4(v4) => Some(v4.ip),
                _ => None,
            })
            .collect(),
        Err(e) => {
            warnings.push(InterfaceWarning {
                interface: Ipv4Addr::UNSPECIFIED,
                stage: InterfaceStage::Enumerate,
                message: e.to_string(),
            });
            Vec::new()
        }
    }
}

/// UDP socket bound to `iface` with multicast egress pinned to it.
pub(crate) fn open_socket(iface: Ipv4Addr, target: SocketAddr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    if let IpAddr::V4(group) = target.ip() {
        if group.is_multicast() {
            socket.set_multicast_if_v4(&iface)?;
            socket.set_multicast_loop_v4(true)?;
        }
    }
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::new(IpAddr::V4(iface), 0).into())?;
    UdpSocket::from_std(socket.into())
}

/// Receive replies until the deadline or cancellation. Replies that do not
/// parse or relate to another probe are dropped.
pub(crate) async fn listen(
    iface: Ipv4Addr,
    socket: UdpSocket,
    message_id: Arc<str>,
    collector: Arc<ProbeCollector>,
    deadline: Instant,
    cancel: CancellationToken,
) -> Option<InterfaceWarning> {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep_until(deadline) => return None,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, from)) => handle_datagram(&buf[..len], from, &message_id, &collector),
                Err(e) => {
                    tracing::debug!("receive on {} failed: {}", iface, e);
                    return Some(InterfaceWarning {
                        interface: iface,
                        stage: InterfaceStage::Receive,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

fn handle_datagram(data: &[u8], from: SocketAddr, message_id: &str, collector: &ProbeCollector) {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let message = match probe::parse_message(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::trace!("ignoring datagram from {}: {}", from, e);
            return;
        }
    };
    if message.relates_to.as_deref() != Some(message_id) {
        return;
    }
    for probe_match in message.matches {
        if probe_match.endpoint_reference.is_empty() {
            continue;
        }
        collector.record(DeviceDescriptor::from_probe_match(probe_match, Some(from)));
    }
}
