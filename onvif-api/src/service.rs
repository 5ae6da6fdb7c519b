use onvif_soap::envelope::ns;
use serde::{Deserialize, Serialize};

/// The ONVIF services a device may expose
///
/// Each service has its own endpoint address, resolved per device by the
/// [`ServiceRegistry`](crate::registry::ServiceRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Service {
    /// Device management - identity, capabilities, clock, scopes
    Device,

    /// Media (ver10) - profiles, configurations, stream and snapshot URIs
    Media,

    /// PTZ (ver20) - motion, presets, status
    Ptz,

    /// Imaging (ver20) - brightness, contrast and friends
    Imaging,

    /// Events - topic properties and pull-point subscriptions
    Events,

    /// Analytics (ver20) - negotiated only, no typed operations
    Analytics,
}

impl Service {
    pub const ALL: [Service; 6] = [
        Service::Device,
        Service::Media,
        Service::Ptz,
        Service::Imaging,
        Service::Events,
        Service::Analytics,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Service::Device => "Device",
            Service::Media => "Media",
            Service::Ptz => "PTZ",
            Service::Imaging => "Imaging",
            Service::Events => "Events",
            Service::Analytics => "Analytics",
        }
    }

    /// WSDL namespace, also the key in a `GetServices` listing
    pub const fn namespace(&self) -> &'static str {
        match self {
            Service::Device => ns::DEVICE,
            Service::Media => ns::MEDIA,
            Service::Ptz => ns::PTZ,
            Service::Imaging => ns::IMAGING,
            Service::Events => ns::EVENTS,
            Service::Analytics => ns::ANALYTICS,
        }
    }

    /// Prefix bound to [`Service::namespace`] on every envelope
    pub const fn prefix(&self) -> &'static str {
        match self {
            Service::Device => "tds",
            Service::Media => "trt",
            Service::Ptz => "tptz",
            Service::Imaging => "timg",
            Service::Events => "tev",
            Service::Analytics => "tan",
        }
    }

    /// Conventional HTTP path, used by the mock server
    pub const fn default_path(&self) -> &'static str {
        match self {
            Service::Device => "/onvif/device_service",
            Service::Media => "/onvif/media_service",
            Service::Ptz => "/onvif/ptz_service",
            Service::Imaging => "/onvif/imaging_service",
            Service::Events => "/onvif/events_service",
            Service::Analytics => "/onvif/analytics_service",
        }
    }

    /// Map a `GetServices` namespace to a service. Unknown namespaces (for
    /// example media ver20 or recording) yield `None`.
    pub fn from_namespace(namespace: &str) -> Option<Service> {
        let namespace = namespace.trim();
        Service::ALL
            .into_iter()
            .find(|s| s.namespace() == namespace)
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_round_trip() {
        for service in Service::ALL {
            assert_eq!(Service::from_namespace(service.namespace()), Some(service));
        }
        assert_eq!(Service::from_namespace("http://www.onvif.org/ver20/media/wsdl"), None);
    }

    #[test]
    fn test_prefixes_are_declared_on_envelopes() {
        for service in Service::ALL {
            assert!(
                ns::DECLARED
                    .iter()
                    .any(|(prefix, uri)| *prefix == service.prefix() && *uri == service.namespace()),
                "{} prefix not declared",
                service
            );
        }
    }
}
