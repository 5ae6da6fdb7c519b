//! Per-device service endpoint resolution
//!
//! A device exposes each ONVIF service at its own address. The registry maps
//! every [`Service`] to the address negotiated during
//! [`OnvifClient::initialize`](crate::client::OnvifClient::initialize) and
//! keeps the capability snapshot consistent with it: a service without an
//! address never reads as supported.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{ApiError, Result};
use crate::service::Service;
use crate::types::device::{Capabilities, GetServicesResponse};

/// Where the resolved addresses came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegistrySource {
    /// `GetServices` listing
    Services,
    /// Per-section `XAddr` of `GetCapabilities`
    Capabilities,
    /// Neither call succeeded, only the configured device endpoint is known
    DeviceOnly,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceRegistry {
    endpoints: BTreeMap<Service, String>,
    capabilities: Capabilities,
    source: RegistrySource,
}

impl ServiceRegistry {
    /// Registry that only knows the device service.
    pub fn device_only(device_endpoint: impl Into<String>) -> Self {
        let mut endpoints = BTreeMap::new();
        endpoints.insert(Service::Device, device_endpoint.into());
        Self {
            endpoints,
            capabilities: Capabilities::default(),
            source: RegistrySource::DeviceOnly,
        }
    }

    /// Resolve from a `GetServices` listing. Entries with an unknown
    /// namespace are ignored. `capabilities` is reconciled against the
    /// result, so pass `Capabilities::default()` if none were fetched.
    pub fn from_services(
        device_endpoint: impl Into<String>,
        services: &GetServicesResponse,
        capabilities: Capabilities,
    ) -> Self {
        let mut registry = Self::device_only(device_endpoint);
        for entry in &services.services {
            let Some(service) = Service::from_namespace(&entry.namespace) else {
                tracing::trace!("ignoring service namespace {}", entry.namespace);
                continue;
            };
            if service == Service::Device || entry.xaddr.trim().is_empty() {
                continue;
            }
            registry.endpoints.insert(service, entry.xaddr.trim().to_string());
        }
        registry.capabilities = capabilities;
        registry.source = RegistrySource::Services;
        registry.reconcile();
        registry
    }

    /// Resolve from the capability tree's per-section addresses.
    pub fn from_capabilities(device_endpoint: impl Into<String>, capabilities: Capabilities) -> Self {
        let mut registry = Self::device_only(device_endpoint);
        for service in Service::ALL {
            if service == Service::Device {
                continue;
            }
            if let Some(xaddr) = capabilities.xaddr(service) {
                registry.endpoints.insert(service, xaddr.trim().to_string());
            }
        }
        registry.capabilities = capabilities;
        registry.source = RegistrySource::Capabilities;
        registry.reconcile();
        registry
    }

    /// Clear capability sections whose service has no address.
    fn reconcile(&mut self) {
        for service in Service::ALL {
            if service != Service::Device && !self.endpoints.contains_key(&service) {
                self.capabilities.clear(service);
            }
        }
    }

    /// Address of `service`, or [`ApiError::ServiceUnsupported`].
    pub fn endpoint(&self, service: Service) -> Result<&str> {
        self.endpoints
            .get(&service)
            .map(String::as_str)
            .ok_or(ApiError::ServiceUnsupported(service))
    }

    pub fn supports(&self, service: Service) -> bool {
        self.endpoints.contains_key(&service)
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn source(&self) -> RegistrySource {
        self.source
    }

    /// Resolved services in a stable order
    pub fn services(&self) -> impl Iterator<Item = (Service, &str)> {
        self.endpoints.iter().map(|(s, e)| (*s, e.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::device::{MediaCapabilities, ServiceCapability, ServiceEntry};

    const DEVICE: &str = "http://192.0.2.10/onvif/device_service";

    fn entry(service: Service, xaddr: &str) -> ServiceEntry {
        ServiceEntry {
            namespace: service.namespace().to_string(),
            xaddr: xaddr.to_string(),
            version_major: 2,
            version_minor: 0,
        }
    }

    fn capabilities() -> Capabilities {
        Capabilities {
            media: Some(MediaCapabilities {
                xaddr: "http://192.0.2.10/caps/media".to_string(),
                ..Default::default()
            }),
            ptz: Some(ServiceCapability {
                xaddr: "http://192.0.2.10/caps/ptz".to_string(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_services_listing_wins() {
        let listing = GetServicesResponse {
            services: vec![
                entry(Service::Device, "http://other/device"),
                entry(Service::Media, "http://192.0.2.10/onvif/media_service"),
                ServiceEntry {
                    namespace: "http://www.onvif.org/ver20/media/wsdl".to_string(),
                    ..entry(Service::Media, "http://192.0.2.10/onvif/media2_service")
                },
            ],
        };
        let registry = ServiceRegistry::from_services(DEVICE, &listing, capabilities());
        assert_eq!(registry.source(), RegistrySource::Services);
        assert_eq!(registry.endpoint(Service::Device).unwrap(), DEVICE);
        assert_eq!(registry.endpoint(Service::Media).unwrap(), "http://192.0.2.10/onvif/media_service");

        // PTZ was in the capabilities but not in the listing
        assert!(matches!(registry.endpoint(Service::Ptz), Err(ApiError::ServiceUnsupported(Service::Ptz))));
        assert!(registry.capabilities().ptz.is_none());
        assert!(registry.capabilities().media.is_some());
    }

    #[test]
    fn test_capabilities_fallback() {
        let mut caps = capabilities();
        caps.imaging = Some(ServiceCapability { xaddr: String::new() });
        let registry = ServiceRegistry::from_capabilities(DEVICE, caps);
        assert_eq!(registry.source(), RegistrySource::Capabilities);
        assert_eq!(registry.endpoint(Service::Ptz).unwrap(), "http://192.0.2.10/caps/ptz");
        assert!(!registry.supports(Service::Imaging));
        assert!(registry.capabilities().imaging.is_none());
    }

    #[test]
    fn test_device_only() {
        let registry = ServiceRegistry::device_only(DEVICE);
        assert!(registry.supports(Service::Device));
        for service in [Service::Media, Service::Ptz, Service::Imaging, Service::Events, Service::Analytics] {
            assert!(registry.endpoint(service).is_err());
        }
        assert_eq!(registry.services().count(), 1);
    }
}
