//! Request dispatch
//!
//! The operations the server answers form a closed [`Operation`] enum built
//! from the typed operation definitions in `onvif-api`, so the element
//! names, prefixes and body codecs are shared with the client. Routing is an
//! exhaustive `match` over that enum: adding an operation without a handler
//! does not compile.
//!
//! A request goes through:
//!
//! 1. envelope parsing (malformed XML becomes a `Sender` fault)
//! 2. operation lookup by local name (unknown becomes
//!    `Receiver / ter:ActionNotSupported`, "not implemented")
//! 3. WS-Security digest check when users are configured
//! 4. body decode and validation, then the handler
//!
//! Handler panics are caught and reported as a `Receiver` fault.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use onvif_api::types::device::{
    self, Capabilities, DeviceCapabilities, EventCapabilities, GetScopesResponse, GetServicesResponse,
    HostnameInformation, MediaCapabilities, ServiceCapability, ServiceEntry, SystemDateAndTime,
};
use onvif_api::types::events::{
    self, CreatePullPointSubscriptionResponse, EventProperties, PullMessagesResponse, RenewResponse,
    CONCRETE_SET_DIALECT, MESSAGE_CONTENT_DIALECT,
};
use onvif_api::types::media::{self, GetProfilesResponse, GetVideoSourcesResponse, MediaUri, ProfileResponse};
use onvif_api::types::ptz::{self, GetConfigurationsResponse, GetNodesResponse, GetPresetsResponse, SetPresetResponse};
use onvif_api::types::imaging;
use onvif_api::{Empty, Fault, OnvifOperation, Service, Validate, XmlBody};
use onvif_soap::envelope;
use onvif_soap::UsernameToken;
use parking_lot::RwLock;
use url::Url;
use xmltree::Element;

use crate::clock::Clock;
use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::events::{SubscriptionLimits, SubscriptionManager};
use crate::model::DeviceModel;
use crate::ptz::PtzController;

/// Services with an HTTP endpoint on this server
pub const SERVED_SERVICES: [Service; 5] = [
    Service::Device,
    Service::Media,
    Service::Ptz,
    Service::Imaging,
    Service::Events,
];

/// Path of the subscription manager endpoint, followed by `/{id}`
pub const SUBSCRIPTION_PATH: &str = "/onvif/subscription";

const TOPIC_NAMESPACE_LOCATION: &str = "http://www.onvif.org/onvif/ver10/topics/topicns.xml";

macro_rules! operation_table {
    ($($variant:ident => $op:ty),+ $(,)?) => {
        /// Every operation the server answers
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Operation {
            $($variant),+
        }

        impl Operation {
            pub const ALL: &'static [Operation] = &[$(Operation::$variant),+];

            /// Local name of the request element
            pub fn name(&self) -> &'static str {
                match self {
                    $(Operation::$variant => <$op as OnvifOperation>::ACTION),+
                }
            }

            pub fn service(&self) -> Service {
                match self {
                    $(Operation::$variant => <$op as OnvifOperation>::SERVICE),+
                }
            }
        }
    };
}

operation_table! {
    GetDeviceInformation => device::GetDeviceInformation,
    GetCapabilities => device::GetCapabilities,
    GetServices => device::GetServices,
    GetSystemDateAndTime => device::GetSystemDateAndTime,
    GetScopes => device::GetScopes,
    GetHostname => device::GetHostname,
    GetProfiles => media::GetProfiles,
    GetProfile => media::GetProfile,
    CreateProfile => media::CreateProfile,
    DeleteProfile => media::DeleteProfile,
    AddVideoEncoderConfiguration => media::AddVideoEncoderConfiguration,
    AddPtzConfiguration => media::AddPtzConfiguration,
    RemovePtzConfiguration => media::RemovePtzConfiguration,
    GetVideoSources => media::GetVideoSources,
    GetStreamUri => media::GetStreamUri,
    GetSnapshotUri => media::GetSnapshotUri,
    GetNodes => ptz::GetNodes,
    GetConfigurations => ptz::GetConfigurations,
    ContinuousMove => ptz::ContinuousMove,
    AbsoluteMove => ptz::AbsoluteMove,
    RelativeMove => ptz::RelativeMove,
    Stop => ptz::Stop,
    GetStatus => ptz::GetStatus,
    GetPresets => ptz::GetPresets,
    SetPreset => ptz::SetPreset,
    GotoPreset => ptz::GotoPreset,
    RemovePreset => ptz::RemovePreset,
    GetImagingSettings => imaging::GetImagingSettings,
    SetImagingSettings => imaging::SetImagingSettings,
    GetOptions => imaging::GetOptions,
    GetEventProperties => events::GetEventProperties,
    CreatePullPointSubscription => events::CreatePullPointSubscription,
    PullMessages => events::PullMessages,
    Renew => events::Renew,
    Unsubscribe => events::Unsubscribe,
}

impl Operation {
    /// Look up by element name, with or without a namespace prefix.
    pub fn from_local_name(name: &str) -> Option<Operation> {
        let local = name.rsplit(':').next().unwrap_or(name);
        Self::ALL.iter().copied().find(|op| op.name() == local)
    }

    /// Everything but the calls a client makes before it can authenticate
    pub fn requires_auth(&self) -> bool {
        !matches!(
            self,
            Operation::GetSystemDateAndTime | Operation::GetCapabilities | Operation::GetServices
        )
    }

    /// Operations addressed to a subscription endpoint
    pub fn is_subscription_scoped(&self) -> bool {
        matches!(self, Operation::PullMessages | Operation::Renew | Operation::Unsubscribe)
    }
}

fn decode<Op: OnvifOperation>(body: &Element) -> Result<Op::Request> {
    let request = Op::Request::read_xml(body)?;
    request
        .validate()
        .map_err(|e| ServerError::InvalidArgument(e.to_string()))?;
    Ok(request)
}

fn encode<Op: OnvifOperation>(response: &Op::Response) -> String {
    envelope::operation_element(Op::prefix(), &format!("{}Response", Op::ACTION), &response.to_xml())
}

/// Decode, run a synchronous handler and encode its response.
fn serve<Op, F>(body: &Element, handler: F) -> Result<String>
where
    Op: OnvifOperation,
    F: FnOnce(Op::Request) -> Result<Op::Response>,
{
    let request = decode::<Op>(body)?;
    let response = handler(request)?;
    Ok(encode::<Op>(&response))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Run a handler future, turning a panic into [`ServerError::Internal`].
pub(crate) async fn shielded<F>(fut: F) -> Result<String>
where
    F: Future<Output = Result<String>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!("handler panicked: {}", message);
            Err(ServerError::Internal(message))
        }
    }
}

/// Host of `url`, brackets kept for IPv6. Falls back to `localhost` when
/// the URL has no host.
fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .unwrap_or_else(|| "localhost".to_string())
}

fn subscription_id(subscription: Option<&str>) -> Result<&str> {
    subscription.ok_or_else(|| {
        ServerError::SubscriptionNotFound("request was not sent to a subscription address".to_string())
    })
}

/// Shared request handler behind every HTTP route
#[derive(Debug)]
pub struct Dispatcher {
    config: ServerConfig,
    base_url: RwLock<String>,
    clock: Arc<dyn Clock>,
    model: Arc<DeviceModel>,
    ptz: Arc<PtzController>,
    events: Arc<SubscriptionManager>,
}

impl Dispatcher {
    pub fn new(config: ServerConfig, clock: Arc<dyn Clock>) -> Self {
        let model = Arc::new(DeviceModel::default());
        let ptz = Arc::new(PtzController::new(model.clone(), clock.clone()));
        let limits = SubscriptionLimits {
            default_duration: config.default_subscription_duration,
            max_duration: config.max_subscription_duration,
            queue_capacity: config.queue_capacity,
            max_pull_messages: config.max_pull_messages,
            max_pull_wait: config.max_pull_wait,
        };
        let events = Arc::new(SubscriptionManager::new(clock.clone(), limits));
        let base_url = format!("http://{}", config.bind_address);

        Self {
            config,
            base_url: RwLock::new(base_url),
            clock,
            model,
            ptz,
            events,
        }
    }

    /// Scheme, host and port put in front of every advertised address
    pub fn base_url(&self) -> String {
        self.base_url.read().clone()
    }

    pub fn set_base_url(&self, url: impl Into<String>) {
        *self.base_url.write() = url.into();
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn model(&self) -> &Arc<DeviceModel> {
        &self.model
    }

    pub fn ptz(&self) -> &Arc<PtzController> {
        &self.ptz
    }

    pub fn events(&self) -> &Arc<SubscriptionManager> {
        &self.events
    }

    /// Handle one raw request envelope. `subscription` is the id taken from
    /// a subscription endpoint path. Returns the response envelope, or the
    /// fault to send back.
    pub async fn handle(&self, raw: &str, subscription: Option<&str>) -> std::result::Result<String, Fault> {
        match shielded(self.dispatch(raw, subscription)).await {
            Ok(body) => Ok(envelope::build_response(&body)),
            Err(error) => {
                tracing::debug!("request failed: {}", error);
                Err(error.to_fault())
            }
        }
    }

    async fn dispatch(&self, raw: &str, subscription: Option<&str>) -> Result<String> {
        let parsed = envelope::parse_envelope(raw)?;
        let operation = Operation::from_local_name(&parsed.operation)
            .ok_or_else(|| ServerError::NotImplemented(parsed.operation.clone()))?;
        self.authenticate(operation, parsed.security.as_ref())?;
        tracing::debug!("handling {} ({})", operation.name(), operation.service().name());
        self.route(operation, &parsed.body, subscription).await
    }

    fn authenticate(&self, operation: Operation, token: Option<&UsernameToken>) -> Result<()> {
        if !self.config.requires_auth() || !operation.requires_auth() {
            return Ok(());
        }
        let token = token.ok_or(ServerError::NotAuthorized)?;
        match self.config.password_for(&token.username) {
            Some(password) if token.verify(password) => Ok(()),
            _ => {
                tracing::debug!("rejected credentials for {}", token.username);
                Err(ServerError::NotAuthorized)
            }
        }
    }

    fn service_url(&self, service: Service) -> String {
        format!("{}{}", self.base_url(), service.default_path())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            analytics: None,
            device: Some(DeviceCapabilities {
                xaddr: self.service_url(Service::Device),
                ..Default::default()
            }),
            events: Some(EventCapabilities {
                xaddr: self.service_url(Service::Events),
                ws_pull_point_support: true,
                ..Default::default()
            }),
            imaging: Some(ServiceCapability {
                xaddr: self.service_url(Service::Imaging),
            }),
            media: Some(MediaCapabilities {
                xaddr: self.service_url(Service::Media),
                rtp_tcp: true,
                rtp_rtsp_tcp: true,
                ..Default::default()
            }),
            ptz: Some(ServiceCapability {
                xaddr: self.service_url(Service::Ptz),
            }),
        }
    }

    fn services(&self) -> GetServicesResponse {
        GetServicesResponse {
            services: SERVED_SERVICES
                .iter()
                .map(|service| ServiceEntry {
                    namespace: service.namespace().to_string(),
                    xaddr: self.service_url(*service),
                    version_major: 2,
                    version_minor: 60,
                })
                .collect(),
        }
    }

    fn event_properties(&self) -> EventProperties {
        EventProperties {
            topic_namespace_locations: vec![TOPIC_NAMESPACE_LOCATION.to_string()],
            fixed_topic_set: true,
            topics: self.config.event_topics.clone(),
            topic_expression_dialects: vec![CONCRETE_SET_DIALECT.to_string()],
            message_content_filter_dialects: vec![MESSAGE_CONTENT_DIALECT.to_string()],
        }
    }

    fn stream_uri(&self, profile_token: &str) -> Result<MediaUri> {
        let profile = self.model.profile(profile_token)?;
        let encoder = profile.video_encoder_configuration.ok_or_else(|| {
            ServerError::InvalidArgument(format!("profile {} has no video encoder configuration", profile_token))
        })?;
        self.model.video_encoder(&encoder)?;
        Ok(MediaUri {
            uri: format!("rtsp://{}:554/{}/stream", host_of(&self.base_url()), profile.token),
            invalid_after_connect: false,
            invalid_after_reboot: false,
            timeout: Duration::ZERO,
        })
    }

    fn snapshot_uri(&self, profile_token: &str) -> Result<MediaUri> {
        let profile = self.model.profile(profile_token)?;
        Ok(MediaUri {
            uri: format!("{}/onvif/snapshot/{}", self.base_url(), profile.token),
            invalid_after_connect: false,
            invalid_after_reboot: false,
            timeout: Duration::ZERO,
        })
    }

    async fn route(&self, operation: Operation, body: &Element, subscription: Option<&str>) -> Result<String> {
        match operation {
            // Device
            Operation::GetDeviceInformation => serve::<device::GetDeviceInformation, _>(body, |_| {
                Ok(self.config.device_information.clone())
            }),
            Operation::GetCapabilities => serve::<device::GetCapabilities, _>(body, |request| {
                Ok(self.capabilities().filtered(request.category))
            }),
            Operation::GetServices => serve::<device::GetServices, _>(body, |_| Ok(self.services())),
            Operation::GetSystemDateAndTime => serve::<device::GetSystemDateAndTime, _>(body, |_| {
                Ok(SystemDateAndTime {
                    date_time_type: device::DateTimeType::Manual,
                    daylight_savings: false,
                    time_zone: Some("UTC".to_string()),
                    utc: Some(self.clock.now()),
                })
            }),
            Operation::GetScopes => serve::<device::GetScopes, _>(body, |_| {
                Ok(GetScopesResponse {
                    scopes: self.config.scopes(),
                })
            }),
            Operation::GetHostname => serve::<device::GetHostname, _>(body, |_| {
                Ok(HostnameInformation {
                    from_dhcp: false,
                    name: Some(self.config.hostname.clone()),
                })
            }),

            // Media
            Operation::GetProfiles => serve::<media::GetProfiles, _>(body, |_| {
                Ok(GetProfilesResponse {
                    profiles: self.model.profiles(),
                })
            }),
            Operation::GetProfile => serve::<media::GetProfile, _>(body, |request| {
                Ok(ProfileResponse {
                    profile: self.model.profile(&request.profile_token)?,
                })
            }),
            Operation::CreateProfile => serve::<media::CreateProfile, _>(body, |request| {
                let profile = self.model.create_profile(&request.name, request.token.as_deref())?;
                tracing::info!("created profile {}", profile.token);
                Ok(ProfileResponse { profile })
            }),
            Operation::DeleteProfile => serve::<media::DeleteProfile, _>(body, |request| {
                self.model.delete_profile(&request.profile_token)?;
                self.ptz.forget(&request.profile_token);
                tracing::info!("deleted profile {}", request.profile_token);
                Ok(Empty)
            }),
            Operation::AddVideoEncoderConfiguration => {
                serve::<media::AddVideoEncoderConfiguration, _>(body, |request| {
                    self.model
                        .add_video_encoder_configuration(&request.profile_token, &request.configuration_token)?;
                    Ok(Empty)
                })
            }
            Operation::AddPtzConfiguration => serve::<media::AddPtzConfiguration, _>(body, |request| {
                self.model
                    .add_ptz_configuration(&request.profile_token, &request.configuration_token)?;
                Ok(Empty)
            }),
            Operation::RemovePtzConfiguration => serve::<media::RemovePtzConfiguration, _>(body, |request| {
                self.model.remove_ptz_configuration(&request.profile_token)?;
                Ok(Empty)
            }),
            Operation::GetVideoSources => serve::<media::GetVideoSources, _>(body, |_| {
                Ok(GetVideoSourcesResponse {
                    video_sources: self.model.video_sources(),
                })
            }),
            Operation::GetStreamUri => {
                serve::<media::GetStreamUri, _>(body, |request| self.stream_uri(&request.profile_token))
            }
            Operation::GetSnapshotUri => {
                serve::<media::GetSnapshotUri, _>(body, |request| self.snapshot_uri(&request.profile_token))
            }

            // PTZ
            Operation::GetNodes => serve::<ptz::GetNodes, _>(body, |_| {
                Ok(GetNodesResponse {
                    nodes: self.model.ptz_nodes(),
                })
            }),
            Operation::GetConfigurations => serve::<ptz::GetConfigurations, _>(body, |_| {
                Ok(GetConfigurationsResponse {
                    configurations: self.model.ptz_configurations(),
                })
            }),
            Operation::ContinuousMove => serve::<ptz::ContinuousMove, _>(body, |request| {
                self.ptz.continuous_move(&request)?;
                Ok(Empty)
            }),
            Operation::AbsoluteMove => serve::<ptz::AbsoluteMove, _>(body, |request| {
                self.ptz.absolute_move(&request.profile_token, request.position)?;
                Ok(Empty)
            }),
            Operation::RelativeMove => serve::<ptz::RelativeMove, _>(body, |request| {
                self.ptz.relative_move(&request.profile_token, request.translation)?;
                Ok(Empty)
            }),
            Operation::Stop => serve::<ptz::Stop, _>(body, |request| {
                self.ptz.stop(&request)?;
                Ok(Empty)
            }),
            Operation::GetStatus => {
                serve::<ptz::GetStatus, _>(body, |request| self.ptz.status(&request.profile_token))
            }
            Operation::GetPresets => serve::<ptz::GetPresets, _>(body, |request| {
                Ok(GetPresetsResponse {
                    presets: self.ptz.presets(&request.profile_token)?,
                })
            }),
            Operation::SetPreset => serve::<ptz::SetPreset, _>(body, |request| {
                Ok(SetPresetResponse {
                    preset_token: self.ptz.set_preset(&request)?,
                })
            }),
            Operation::GotoPreset => serve::<ptz::GotoPreset, _>(body, |request| {
                self.ptz.goto_preset(&request.profile_token, &request.preset_token)?;
                Ok(Empty)
            }),
            Operation::RemovePreset => serve::<ptz::RemovePreset, _>(body, |request| {
                self.ptz.remove_preset(&request.profile_token, &request.preset_token)?;
                Ok(Empty)
            }),

            // Imaging
            Operation::GetImagingSettings => serve::<imaging::GetImagingSettings, _>(body, |request| {
                self.model.imaging_settings(&request.video_source_token)
            }),
            Operation::SetImagingSettings => serve::<imaging::SetImagingSettings, _>(body, |request| {
                self.model
                    .set_imaging_settings(&request.video_source_token, &request.settings)?;
                Ok(Empty)
            }),
            Operation::GetOptions => serve::<imaging::GetOptions, _>(body, |request| {
                self.model.imaging_options(&request.video_source_token)
            }),

            // Events
            Operation::GetEventProperties => {
                serve::<events::GetEventProperties, _>(body, |_| Ok(self.event_properties()))
            }
            Operation::CreatePullPointSubscription => {
                serve::<events::CreatePullPointSubscription, _>(body, |request| {
                    let created = self
                        .events
                        .subscribe(request.initial_termination_time, request.filter)?;
                    Ok(CreatePullPointSubscriptionResponse {
                        address: format!("{}{}/{}", self.base_url(), SUBSCRIPTION_PATH, created.id),
                        current_time: created.times.current_time,
                        termination_time: created.times.termination_time,
                    })
                })
            }
            Operation::PullMessages => {
                let request = decode::<events::PullMessages>(body)?;
                let id = subscription_id(subscription)?;
                let outcome = self
                    .events
                    .pull(id, request.timeout, request.message_limit)
                    .await?;
                Ok(encode::<events::PullMessages>(&PullMessagesResponse {
                    current_time: outcome.times.current_time,
                    termination_time: outcome.times.termination_time,
                    messages: outcome.messages,
                }))
            }
            Operation::Renew => serve::<events::Renew, _>(body, |request| {
                let times = self
                    .events
                    .renew(subscription_id(subscription)?, Some(request.termination_time))?;
                Ok(RenewResponse {
                    termination_time: times.termination_time,
                    current_time: Some(times.current_time),
                })
            }),
            Operation::Unsubscribe => serve::<events::Unsubscribe, _>(body, |_| {
                self.events.unsubscribe(subscription_id(subscription)?);
                Ok(Empty)
            }),
        }
    }
}
