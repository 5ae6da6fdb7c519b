//! Media service (ver10) types

use std::time::Duration;

use onvif_soap::time;
use onvif_soap::xml::{self, XmlWriter};
use onvif_soap::SoapError;
use serde::{Deserialize, Serialize};
use xmltree::Element;

use super::common::{optional_token_attr, own_token, Resolution};
use super::token_request;
use crate::operation::{require_token, Empty, Validate, ValidationError, XmlBody};

/// Media profile. Configurations are referenced by token only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub token: String,
    pub name: String,
    pub fixed: bool,
    pub video_source_configuration: Option<String>,
    pub video_encoder_configuration: Option<String>,
    pub audio_source_configuration: Option<String>,
    pub audio_encoder_configuration: Option<String>,
    pub ptz_configuration: Option<String>,
    pub metadata_configuration: Option<String>,
}

const CONFIGURATION_ELEMENTS: [&str; 6] = [
    "tt:VideoSourceConfiguration",
    "tt:AudioSourceConfiguration",
    "tt:VideoEncoderConfiguration",
    "tt:AudioEncoderConfiguration",
    "tt:PTZConfiguration",
    "tt:MetadataConfiguration",
];

impl Profile {
    pub fn new(token: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn has_ptz(&self) -> bool {
        self.ptz_configuration.is_some()
    }

    fn slot(&self, element: &str) -> Option<&String> {
        match element {
            "tt:VideoSourceConfiguration" => self.video_source_configuration.as_ref(),
            "tt:AudioSourceConfiguration" => self.audio_source_configuration.as_ref(),
            "tt:VideoEncoderConfiguration" => self.video_encoder_configuration.as_ref(),
            "tt:AudioEncoderConfiguration" => self.audio_encoder_configuration.as_ref(),
            "tt:PTZConfiguration" => self.ptz_configuration.as_ref(),
            _ => self.metadata_configuration.as_ref(),
        }
    }

    pub(crate) fn write(&self, w: &mut XmlWriter, name: &str) {
        w.open_with(
            name,
            &[("token", self.token.as_str()), ("fixed", xml::bool_str(self.fixed))],
        )
        .leaf("tt:Name", &self.name);
        for element in CONFIGURATION_ELEMENTS {
            if let Some(token) = self.slot(element) {
                w.empty(element, &[("token", token.as_str())]);
            }
        }
        w.close(name);
    }

    pub(crate) fn read(el: &Element) -> Result<Self, SoapError> {
        Ok(Self {
            token: own_token(el)?,
            name: xml::child_text(el, "tt:Name").unwrap_or_default(),
            fixed: xml::attr(el, "fixed")
                .and_then(xml::parse_bool)
                .unwrap_or(false),
            video_source_configuration: optional_token_attr(el, "tt:VideoSourceConfiguration"),
            video_encoder_configuration: optional_token_attr(el, "tt:VideoEncoderConfiguration"),
            audio_source_configuration: optional_token_attr(el, "tt:AudioSourceConfiguration"),
            audio_encoder_configuration: optional_token_attr(el, "tt:AudioEncoderConfiguration"),
            ptz_configuration: optional_token_attr(el, "tt:PTZConfiguration"),
            metadata_configuration: optional_token_attr(el, "tt:MetadataConfiguration"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetProfilesResponse {
    pub profiles: Vec<Profile>,
}

impl XmlBody for GetProfilesResponse {
    fn write_xml(&self, w: &mut XmlWriter) {
        for profile in &self.profiles {
            profile.write(w, "trt:Profiles");
        }
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        let profiles = xml::children(el, "trt:Profiles")
            .map(Profile::read)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { profiles })
    }
}

/// Response carrying a single `trt:Profile`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub profile: Profile,
}

impl XmlBody for ProfileResponse {
    fn write_xml(&self, w: &mut XmlWriter) {
        self.profile.write(w, "trt:Profile");
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        Ok(Self {
            profile: Profile::read(xml::require_child(el, "trt:Profile")?)?,
        })
    }
}

token_request!(GetProfileRequest, profile_token, "trt:ProfileToken");
token_request!(DeleteProfileRequest, profile_token, "trt:ProfileToken");
token_request!(RemovePtzConfigurationRequest, profile_token, "trt:ProfileToken");
token_request!(GetSnapshotUriRequest, profile_token, "trt:ProfileToken");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProfileRequest {
    pub name: String,
    /// Requested token, the device picks one when absent
    pub token: Option<String>,
}

impl CreateProfileRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl XmlBody for CreateProfileRequest {
    fn write_xml(&self, w: &mut XmlWriter) {
        w.leaf("trt:Name", &self.name)
            .leaf_opt("trt:Token", self.token.as_deref());
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        Ok(Self {
            name: xml::require_text(el, "trt:Name")?,
            token: xml::child_text(el, "trt:Token").filter(|t| !t.is_empty()),
        })
    }
}

impl Validate for CreateProfileRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require_token("Name", &self.name)?;
        if let Some(token) = &self.token {
            require_token("Token", token)?;
        }
        Ok(())
    }
}

/// `AddVideoEncoderConfiguration` / `AddPTZConfiguration` request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddConfigurationRequest {
    pub profile_token: String,
    pub configuration_token: String,
}

impl AddConfigurationRequest {
    pub fn new(profile_token: impl Into<String>, configuration_token: impl Into<String>) -> Self {
        Self {
            profile_token: profile_token.into(),
            configuration_token: configuration_token.into(),
        }
    }
}

impl XmlBody for AddConfigurationRequest {
    fn write_xml(&self, w: &mut XmlWriter) {
        w.leaf("trt:ProfileToken", &self.profile_token)
            .leaf("trt:ConfigurationToken", &self.configuration_token);
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        Ok(Self {
            profile_token: xml::require_text(el, "trt:ProfileToken")?,
            configuration_token: xml::require_text(el, "trt:ConfigurationToken")?,
        })
    }
}

impl Validate for AddConfigurationRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require_token("ProfileToken", &self.profile_token)?;
        require_token("ConfigurationToken", &self.configuration_token)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoSource {
    pub framerate: f32,
    pub resolution: Resolution,
}

/// Physical input with its token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSourceEntry {
    pub token: String,
    pub source: VideoSource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetVideoSourcesResponse {
    pub video_sources: Vec<VideoSourceEntry>,
}

impl XmlBody for GetVideoSourcesResponse {
    fn write_xml(&self, w: &mut XmlWriter) {
        for entry in &self.video_sources {
            w.open_with("trt:VideoSources", &[("token", entry.token.as_str())])
                .leaf("tt:Framerate", entry.source.framerate);
            entry.source.resolution.write(w, "tt:Resolution");
            w.close("trt:VideoSources");
        }
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        let video_sources = xml::children(el, "trt:VideoSources")
            .map(|vs| {
                Ok(VideoSourceEntry {
                    token: own_token(vs)?,
                    source: VideoSource {
                        framerate: xml::parse_child(vs, "tt:Framerate")?.unwrap_or(0.0),
                        resolution: Resolution::read(xml::require_child(vs, "tt:Resolution")?)?,
                    },
                })
            })
            .collect::<Result<Vec<_>, SoapError>>()?;
        Ok(Self { video_sources })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamType {
    #[default]
    RtpUnicast,
    RtpMulticast,
}

impl StreamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamType::RtpUnicast => "RTP-Unicast",
            StreamType::RtpMulticast => "RTP-Multicast",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportProtocol {
    Udp,
    Tcp,
    #[default]
    Rtsp,
    Http,
}

impl TransportProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Udp => "UDP",
            TransportProtocol::Tcp => "TCP",
            TransportProtocol::Rtsp => "RTSP",
            TransportProtocol::Http => "HTTP",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        [
            TransportProtocol::Udp,
            TransportProtocol::Tcp,
            TransportProtocol::Rtsp,
            TransportProtocol::Http,
        ]
        .into_iter()
        .find(|p| p.as_str() == raw)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetStreamUriRequest {
    pub profile_token: String,
    pub stream: StreamType,
    pub protocol: TransportProtocol,
}

impl GetStreamUriRequest {
    /// Unicast RTSP, the common case
    pub fn rtsp(profile_token: impl Into<String>) -> Self {
        Self {
            profile_token: profile_token.into(),
            ..Self::default()
        }
    }
}

impl XmlBody for GetStreamUriRequest {
    fn write_xml(&self, w: &mut XmlWriter) {
        w.open("trt:StreamSetup")
            .leaf("tt:Stream", self.stream.as_str())
            .open("tt:Transport")
            .leaf("tt:Protocol", self.protocol.as_str())
            .close("tt:Transport")
            .close("trt:StreamSetup")
            .leaf("trt:ProfileToken", &self.profile_token);
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        let setup = xml::require_child(el, "trt:StreamSetup")?;
        let stream = match xml::child_text(setup, "tt:Stream").as_deref() {
            Some("RTP-Multicast") => StreamType::RtpMulticast,
            _ => StreamType::RtpUnicast,
        };
        let protocol = match xml::child(setup, "tt:Transport").and_then(|t| xml::child_text(t, "tt:Protocol")) {
            Some(raw) => TransportProtocol::parse(&raw)
                .ok_or_else(|| SoapError::Parse(format!("unknown transport protocol '{}'", raw)))?,
            None => TransportProtocol::default(),
        };
        Ok(Self {
            profile_token: xml::require_text(el, "trt:ProfileToken")?,
            stream,
            protocol,
        })
    }
}

impl Validate for GetStreamUriRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require_token("ProfileToken", &self.profile_token)
    }
}

/// Stream or snapshot URI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaUri {
    pub uri: String,
    pub invalid_after_connect: bool,
    pub invalid_after_reboot: bool,
    pub timeout: Duration,
}

impl XmlBody for MediaUri {
    fn write_xml(&self, w: &mut XmlWriter) {
        w.open("trt:MediaUri")
            .leaf("tt:Uri", &self.uri)
            .leaf("tt:InvalidAfterConnect", xml::bool_str(self.invalid_after_connect))
            .leaf("tt:InvalidAfterReboot", xml::bool_str(self.invalid_after_reboot))
            .leaf("tt:Timeout", time::format_duration(self.timeout))
            .close("trt:MediaUri");
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        let media_uri = xml::require_child(el, "trt:MediaUri")?;
        let timeout = match xml::child_text(media_uri, "tt:Timeout") {
            Some(raw) if !raw.is_empty() => time::parse_duration(&raw)?,
            _ => Duration::ZERO,
        };
        Ok(Self {
            uri: xml::require_text(media_uri, "tt:Uri")?,
            invalid_after_connect: xml::child_flag(media_uri, "tt:InvalidAfterConnect"),
            invalid_after_reboot: xml::child_flag(media_uri, "tt:InvalidAfterReboot"),
            timeout,
        })
    }
}

crate::define_onvif_operation! {
    operation: GetProfiles,
    service: Media,
    request: Empty,
    response: GetProfilesResponse,
}

crate::define_onvif_operation! {
    operation: GetProfile,
    service: Media,
    request: GetProfileRequest,
    response: ProfileResponse,
}

crate::define_onvif_operation! {
    operation: CreateProfile,
    service: Media,
    request: CreateProfileRequest,
    response: ProfileResponse,
}

crate::define_onvif_operation! {
    operation: DeleteProfile,
    service: Media,
    request: DeleteProfileRequest,
    response: Empty,
}

crate::define_onvif_operation! {
    operation: AddVideoEncoderConfiguration,
    service: Media,
    request: AddConfigurationRequest,
    response: Empty,
}

crate::define_onvif_operation! {
    operation: AddPtzConfiguration,
    action: "AddPTZConfiguration",
    service: Media,
    request: AddConfigurationRequest,
    response: Empty,
}

crate::define_onvif_operation! {
    operation: RemovePtzConfiguration,
    action: "RemovePTZConfiguration",
    service: Media,
    request: RemovePtzConfigurationRequest,
    response: Empty,
}

crate::define_onvif_operation! {
    operation: GetVideoSources,
    service: Media,
    request: Empty,
    response: GetVideoSourcesResponse,
}

crate::define_onvif_operation! {
    operation: GetStreamUri,
    service: Media,
    request: GetStreamUriRequest,
    response: MediaUri,
}

crate::define_onvif_operation! {
    operation: GetSnapshotUri,
    service: Media,
    request: GetSnapshotUriRequest,
    response: MediaUri,
}
