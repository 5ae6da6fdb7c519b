use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use onvif_soap::{CallOptions, Credentials, SoapClient, SoapRequest, Transport, UsernameToken};
use parking_lot::RwLock;

use crate::error::{ApiError, Result};
use crate::operation::OnvifOperation;
use crate::registry::ServiceRegistry;
use crate::service::Service;
use crate::subscription::PullPointSubscription;
use crate::types::device::{
    Capabilities, CapabilityCategory, DeviceInformation, GetCapabilities, GetCapabilitiesRequest,
    GetDeviceInformation, GetServices, GetServicesRequest, GetSystemDateAndTime,
};
use crate::types::events::{CreatePullPointSubscription, CreatePullPointSubscriptionRequest};
use crate::types::media::{GetProfiles, GetStreamUri, GetStreamUriRequest, MediaUri, Profile};
use crate::types::ptz::{
    AbsoluteMove, AbsoluteMoveRequest, ContinuousMove, ContinuousMoveRequest, GetStatus, GetStatusRequest,
    PtzStatus, Stop, StopRequest,
};
use crate::types::PtzVector;

/// Per-call timeout applied when a call does not bring its own
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for one device
#[derive(Clone)]
pub struct ClientConfig {
    /// Device service address, e.g. `http://192.0.2.10/onvif/device_service`
    pub endpoint: String,
    pub credentials: Option<Credentials>,
    pub timeout: Duration,
    /// Custom transport; a default HTTP transport is built when absent
    pub transport: Option<Arc<dyn Transport>>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("credentials", &self.credentials)
            .field("timeout", &self.timeout)
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials: None,
            timeout: DEFAULT_TIMEOUT,
            transport: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let endpoint = url::Url::parse(self.endpoint.trim()).map_err(|e| {
            ApiError::InvalidParameter(format!("endpoint '{}' is not a valid URL: {}", self.endpoint, e))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") || endpoint.host_str().is_none() {
            return Err(ApiError::InvalidParameter(format!(
                "endpoint '{}' is not an http(s) URL",
                self.endpoint
            )));
        }
        if self.timeout.is_zero() {
            return Err(ApiError::InvalidParameter("timeout must be greater than zero".to_string()));
        }
        Ok(())
    }
}

struct ClientInner {
    endpoint: String,
    credentials: Option<Credentials>,
    timeout: Duration,
    soap: SoapClient,
    registry: RwLock<ServiceRegistry>,
    clock_offset: RwLock<chrono::Duration>,
}

/// Typed ONVIF client for one device
///
/// The client is cheap to clone; clones share the negotiated service
/// registry and the clock offset.
///
/// # Example
/// ```rust,ignore
/// use onvif_api::{ClientConfig, OnvifClient};
/// use onvif_api::types::media::GetProfiles;
/// use onvif_api::operation::Empty;
///
/// let client = OnvifClient::new(
///     ClientConfig::new("http://192.0.2.10/onvif/device_service").with_credentials("admin", "secret"),
/// )?;
/// client.initialize().await?;
/// let profiles = client.execute::<GetProfiles>(&Empty).await?;
/// ```
#[derive(Clone)]
pub struct OnvifClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for OnvifClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnvifClient")
            .field("endpoint", &self.inner.endpoint)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

/// Failures that make negotiation fall back instead of aborting: the device
/// answered, just not usefully.
fn negotiation_fallback(error: &ApiError) -> bool {
    matches!(
        error,
        ApiError::Fault(_) | ApiError::Unsupported(_) | ApiError::NotFound(_) | ApiError::Parse(_)
    )
}

impl OnvifClient {
    /// Build a client. No request is sent until the first call; until
    /// [`initialize`](Self::initialize) runs only the device service is
    /// resolvable.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let soap = match config.transport {
            Some(transport) => SoapClient::new(transport),
            None => SoapClient::http()?,
        };
        let endpoint = config.endpoint.trim().to_string();
        Ok(Self {
            inner: Arc::new(ClientInner {
                registry: RwLock::new(ServiceRegistry::device_only(endpoint.clone())),
                endpoint,
                credentials: config.credentials,
                timeout: config.timeout,
                soap,
                clock_offset: RwLock::new(chrono::Duration::zero()),
            }),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Configured per-call timeout
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Negotiate service addresses.
    ///
    /// `GetCapabilities(All)` runs first, then `GetServices`. The listing
    /// wins when it is available; otherwise the capability addresses are
    /// used; when both fail only the device service stays resolvable.
    /// Transport, deadline, cancellation and authorization errors abort
    /// instead of falling back.
    pub async fn initialize(&self) -> Result<()> {
        let request = GetCapabilitiesRequest {
            category: CapabilityCategory::All,
        };
        let capabilities = match self.execute::<GetCapabilities>(&request).await {
            Ok(capabilities) => Some(capabilities),
            Err(e) if negotiation_fallback(&e) => {
                tracing::warn!("GetCapabilities failed on {}: {}", self.inner.endpoint, e);
                None
            }
            Err(e) => return Err(e),
        };

        let listing = GetServicesRequest {
            include_capability: false,
        };
        let registry = match self.execute::<GetServices>(&listing).await {
            Ok(services) => {
                ServiceRegistry::from_services(&self.inner.endpoint, &services, capabilities.unwrap_or_default())
            }
            Err(e) if negotiation_fallback(&e) => {
                tracing::debug!("GetServices failed on {}: {}, using capabilities", self.inner.endpoint, e);
                match capabilities {
                    Some(capabilities) => ServiceRegistry::from_capabilities(&self.inner.endpoint, capabilities),
                    None => ServiceRegistry::device_only(&self.inner.endpoint),
                }
            }
            Err(e) => return Err(e),
        };

        tracing::info!(
            "negotiated {} services on {} ({:?})",
            registry.services().count(),
            self.inner.endpoint,
            registry.source()
        );
        *self.inner.registry.write() = registry;
        Ok(())
    }

    /// Snapshot of the negotiated registry
    pub fn registry(&self) -> ServiceRegistry {
        self.inner.registry.read().clone()
    }

    /// Capability snapshot, reconciled with the resolved addresses
    pub fn capabilities(&self) -> Capabilities {
        self.inner.registry.read().capabilities().clone()
    }

    pub fn supports(&self, service: Service) -> bool {
        self.inner.registry.read().supports(service)
    }

    /// Read the device clock and apply the offset to every subsequent
    /// WS-Security `Created` timestamp. Returns the offset (device minus
    /// local).
    pub async fn sync_time(&self) -> Result<chrono::Duration> {
        let sent = Utc::now();
        let reported = self
            .execute::<GetSystemDateAndTime>(&crate::operation::Empty)
            .await?;
        let device_now = reported
            .utc
            .ok_or_else(|| ApiError::Parse("device did not report UTCDateTime".to_string()))?;
        let offset = device_now - sent;
        *self.inner.clock_offset.write() = offset;
        tracing::debug!("device clock offset is {}s", offset.num_seconds());
        Ok(offset)
    }

    pub fn clock_offset(&self) -> chrono::Duration {
        *self.inner.clock_offset.read()
    }

    fn options(&self, options: &CallOptions) -> CallOptions {
        CallOptions {
            timeout: options.timeout.or(Some(self.inner.timeout)),
            cancel: options.cancel.clone(),
        }
    }

    /// Execute an operation against its service's resolved address with the
    /// configured timeout.
    pub async fn execute<Op: OnvifOperation>(&self, request: &Op::Request) -> Result<Op::Response> {
        self.execute_with::<Op>(request, &CallOptions::default()).await
    }

    /// Like [`execute`](Self::execute) with explicit bounds. A `None`
    /// timeout in `options` falls back to the configured one.
    pub async fn execute_with<Op: OnvifOperation>(
        &self,
        request: &Op::Request,
        options: &CallOptions,
    ) -> Result<Op::Response> {
        let endpoint = self.inner.registry.read().endpoint(Op::SERVICE)?.to_string();
        self.execute_at::<Op>(&endpoint, request, options).await
    }

    /// Execute at an explicit address, bypassing the registry. Used for
    /// subscription manager addresses.
    pub async fn execute_at<Op: OnvifOperation>(
        &self,
        endpoint: &str,
        request: &Op::Request,
        options: &CallOptions,
    ) -> Result<Op::Response> {
        let payload = Op::build_payload(request)?;
        let token = self
            .inner
            .credentials
            .as_ref()
            .map(|c| UsernameToken::generate(c, self.clock_offset()));

        let soap_request = SoapRequest {
            endpoint,
            namespace: Op::namespace(),
            prefix: Op::prefix(),
            action: Op::ACTION,
            payload: &payload,
            security: token.as_ref(),
        };
        let element = self
            .inner
            .soap
            .call(soap_request, &self.options(options))
            .await
            .map_err(|e| {
                tracing::debug!("{} on {} failed: {}", Op::ACTION, endpoint, e);
                ApiError::from(e)
            })?;
        Op::parse_response(&element)
    }

    pub async fn get_device_information(&self) -> Result<DeviceInformation> {
        self.execute::<GetDeviceInformation>(&crate::operation::Empty).await
    }

    pub async fn get_profiles(&self) -> Result<Vec<Profile>> {
        Ok(self.execute::<GetProfiles>(&crate::operation::Empty).await?.profiles)
    }

    /// Unicast RTSP URI of a profile
    pub async fn get_stream_uri(&self, profile_token: &str) -> Result<MediaUri> {
        self.execute::<GetStreamUri>(&GetStreamUriRequest::rtsp(profile_token))
            .await
    }

    pub async fn continuous_move(
        &self,
        profile_token: &str,
        velocity: PtzVector,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let request = ContinuousMoveRequest {
            profile_token: profile_token.to_string(),
            velocity,
            timeout,
        };
        self.execute::<ContinuousMove>(&request).await.map(|_| ())
    }

    pub async fn absolute_move(&self, profile_token: &str, position: PtzVector) -> Result<()> {
        self.execute::<AbsoluteMove>(&AbsoluteMoveRequest::new(profile_token, position))
            .await
            .map(|_| ())
    }

    /// Stop all axes
    pub async fn stop(&self, profile_token: &str) -> Result<()> {
        self.execute::<Stop>(&StopRequest::all(profile_token))
            .await
            .map(|_| ())
    }

    pub async fn get_status(&self, profile_token: &str) -> Result<PtzStatus> {
        self.execute::<GetStatus>(&GetStatusRequest::new(profile_token))
            .await
    }

    /// Open a pull-point subscription. `duration` is the requested initial
    /// termination; the device may shorten it.
    pub async fn create_pull_point_subscription(
        &self,
        request: &CreatePullPointSubscriptionRequest,
    ) -> Result<PullPointSubscription> {
        let response = self.execute::<CreatePullPointSubscription>(request).await?;
        tracing::debug!(
            "created pull-point {} terminating at {}",
            response.address,
            response.termination_time
        );
        Ok(PullPointSubscription::new(self.clone(), response))
    }
}
