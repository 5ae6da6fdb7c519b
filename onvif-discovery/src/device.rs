//! Discovered device descriptors.

use std::net::SocketAddr;

use serde::Serialize;

use crate::probe::ProbeMatch;

const SCOPE_PREFIX: &str = "onvif://www.onvif.org/";

/// A device that answered a probe.
///
/// The endpoint reference address is the identity: two replies with the same
/// address describe the same device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceDescriptor {
    pub endpoint_reference: String,
    pub types: Vec<String>,
    pub scopes: Vec<String>,
    /// Advertised device service addresses
    pub xaddrs: Vec<String>,
    pub metadata_version: u32,
    /// Where the reply came from
    pub source: Option<SocketAddr>,
    pub name: Option<String>,
    pub hardware: Option<String>,
    pub location: Option<String>,
    pub manufacturer: Option<String>,
}

impl DeviceDescriptor {
    pub fn from_probe_match(probe_match: ProbeMatch, source: Option<SocketAddr>) -> Self {
        let scope = |key: &str| scope_value(&probe_match.scopes, key);
        let name = scope("name");
        let hardware = scope("hardware");
        let location = scope("location");
        let manufacturer = scope("manufacturer").or_else(|| scope("mfr"));
        Self {
            endpoint_reference: probe_match.endpoint_reference,
            types: probe_match.types,
            scopes: probe_match.scopes,
            xaddrs: probe_match.xaddrs,
            metadata_version: probe_match.metadata_version,
            source,
            name,
            hardware,
            location,
            manufacturer,
        }
    }

    /// First advertised address, normally the device service URL.
    pub fn primary_xaddr(&self) -> Option<&str> {
        self.xaddrs.first().map(String::as_str)
    }

    pub fn has_type(&self, local: &str) -> bool {
        self.types
            .iter()
            .any(|t| t.rsplit(':').next() == Some(local))
    }
}

/// Value of the first `onvif://www.onvif.org/<key>/<value>` scope, decoded.
pub fn scope_value(scopes: &[String], key: &str) -> Option<String> {
    scopes.iter().find_map(|scope| {
        let rest = scope.strip_prefix(SCOPE_PREFIX)?;
        let (k, value) = rest.split_once('/')?;
        if k.eq_ignore_ascii_case(key) && !value.is_empty() {
            Some(String::from_utf8_lossy(&urlencoding::decode_binary(value.as_bytes())).into_owned())
        } else {
            None
        }
    })
}
