//! PTZ service (ver20) types

use std::time::Duration;

use chrono::{DateTime, Utc};
use onvif_soap::time;
use onvif_soap::xml::{self, XmlWriter};
use onvif_soap::SoapError;
use serde::{Deserialize, Serialize};
use xmltree::Element;

use super::common::{own_token, FloatRange, PtzSpeed, PtzVector};
use super::token_request;
use crate::operation::{require_token, Empty, Validate, ValidationError, XmlBody};

pub const PAN_TILT_POSITION_SPACE: &str =
    "http://www.onvif.org/ver10/tptz/PanTiltSpaces/PositionGenericSpace";
pub const ZOOM_POSITION_SPACE: &str =
    "http://www.onvif.org/ver10/tptz/ZoomSpaces/PositionGenericSpace";

/// Absolute position limits of a PTZ configuration or node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PtzLimits {
    pub pan: FloatRange,
    pub tilt: FloatRange,
    pub zoom: FloatRange,
}

impl Default for PtzLimits {
    fn default() -> Self {
        Self {
            pan: FloatRange::NORMALIZED,
            tilt: FloatRange::NORMALIZED,
            zoom: FloatRange::UNIT,
        }
    }
}

impl PtzLimits {
    /// Clamp every present component into its range.
    pub fn clamp(&self, vector: PtzVector) -> PtzVector {
        PtzVector {
            pan: vector.pan.map(|v| self.pan.clamp(v)),
            tilt: vector.tilt.map(|v| self.tilt.clamp(v)),
            zoom: vector.zoom.map(|v| self.zoom.clamp(v)),
        }
    }

    fn write_pan_tilt(&self, w: &mut XmlWriter) {
        w.leaf("tt:URI", PAN_TILT_POSITION_SPACE);
        self.pan.write(w, "tt:XRange");
        self.tilt.write(w, "tt:YRange");
    }

    fn write_zoom(&self, w: &mut XmlWriter) {
        w.leaf("tt:URI", ZOOM_POSITION_SPACE);
        self.zoom.write(w, "tt:XRange");
    }

    /// Read from the parents of the pan/tilt and zoom ranges; missing
    /// ranges keep their generic defaults.
    fn read(pan_tilt: Option<&Element>, zoom: Option<&Element>) -> Result<Self, SoapError> {
        let mut limits = Self::default();
        if let Some(pt) = pan_tilt {
            if let Some(x) = FloatRange::read_child(pt, "tt:XRange")? {
                limits.pan = x;
            }
            if let Some(y) = FloatRange::read_child(pt, "tt:YRange")? {
                limits.tilt = y;
            }
        }
        if let Some(z) = zoom {
            if let Some(x) = FloatRange::read_child(z, "tt:XRange")? {
                limits.zoom = x;
            }
        }
        Ok(limits)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PtzNode {
    pub token: String,
    pub name: String,
    pub limits: PtzLimits,
    pub maximum_number_of_presets: u32,
    pub home_supported: bool,
}

impl PtzNode {
    fn write(&self, w: &mut XmlWriter) {
        w.open_with("tptz:PTZNode", &[("token", self.token.as_str())])
            .leaf("tt:Name", &self.name)
            .open("tt:SupportedPTZSpaces")
            .open("tt:AbsolutePanTiltPositionSpace");
        self.limits.write_pan_tilt(w);
        w.close("tt:AbsolutePanTiltPositionSpace")
            .open("tt:AbsoluteZoomPositionSpace");
        self.limits.write_zoom(w);
        w.close("tt:AbsoluteZoomPositionSpace")
            .close("tt:SupportedPTZSpaces")
            .leaf("tt:MaximumNumberOfPresets", self.maximum_number_of_presets)
            .leaf("tt:HomeSupported", xml::bool_str(self.home_supported))
            .close("tptz:PTZNode");
    }

    fn read(el: &Element) -> Result<Self, SoapError> {
        let spaces = xml::child(el, "tt:SupportedPTZSpaces");
        let limits = PtzLimits::read(
            spaces.and_then(|s| xml::child(s, "tt:AbsolutePanTiltPositionSpace")),
            spaces.and_then(|s| xml::child(s, "tt:AbsoluteZoomPositionSpace")),
        )?;
        Ok(Self {
            token: own_token(el)?,
            name: xml::child_text(el, "tt:Name").unwrap_or_default(),
            limits,
            maximum_number_of_presets: xml::parse_child(el, "tt:MaximumNumberOfPresets")?.unwrap_or(0),
            home_supported: xml::child_flag(el, "tt:HomeSupported"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetNodesResponse {
    pub nodes: Vec<PtzNode>,
}

impl XmlBody for GetNodesResponse {
    fn write_xml(&self, w: &mut XmlWriter) {
        for node in &self.nodes {
            node.write(w);
        }
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        let nodes = xml::children(el, "tptz:PTZNode")
            .map(PtzNode::read)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { nodes })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PtzConfiguration {
    pub token: String,
    pub name: String,
    pub node_token: String,
    pub limits: PtzLimits,
    pub default_speed: PtzSpeed,
    pub default_timeout: Option<Duration>,
}

impl PtzConfiguration {
    fn write(&self, w: &mut XmlWriter) {
        w.open_with("tptz:PTZConfiguration", &[("token", self.token.as_str())])
            .leaf("tt:Name", &self.name)
            .leaf("tt:NodeToken", &self.node_token);
        if !self.default_speed.is_empty() {
            self.default_speed.write(w, "tt:DefaultPTZSpeed");
        }
        w.leaf_opt("tt:DefaultPTZTimeout", self.default_timeout.map(time::format_duration))
            .open("tt:PanTiltLimits")
            .open("tt:Range");
        self.limits.write_pan_tilt(w);
        w.close("tt:Range")
            .close("tt:PanTiltLimits")
            .open("tt:ZoomLimits")
            .open("tt:Range");
        self.limits.write_zoom(w);
        w.close("tt:Range")
            .close("tt:ZoomLimits")
            .close("tptz:PTZConfiguration");
    }

    fn read(el: &Element) -> Result<Self, SoapError> {
        let range = |name: &str| xml::child(el, name).and_then(|l| xml::child(l, "tt:Range"));
        let default_timeout = match xml::child_text(el, "tt:DefaultPTZTimeout") {
            Some(raw) if !raw.is_empty() => Some(time::parse_duration(&raw)?),
            _ => None,
        };
        Ok(Self {
            token: own_token(el)?,
            name: xml::child_text(el, "tt:Name").unwrap_or_default(),
            node_token: xml::child_text(el, "tt:NodeToken").unwrap_or_default(),
            limits: PtzLimits::read(range("tt:PanTiltLimits"), range("tt:ZoomLimits"))?,
            default_speed: PtzVector::read_child(el, "tt:DefaultPTZSpeed")?.unwrap_or_default(),
            default_timeout,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetConfigurationsResponse {
    pub configurations: Vec<PtzConfiguration>,
}

impl XmlBody for GetConfigurationsResponse {
    fn write_xml(&self, w: &mut XmlWriter) {
        for configuration in &self.configurations {
            configuration.write(w);
        }
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        let configurations = xml::children(el, "tptz:PTZConfiguration")
            .map(PtzConfiguration::read)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { configurations })
    }
}

fn check_components(parameter: &str, vector: &PtzVector, range: FloatRange) -> Result<(), ValidationError> {
    for value in [vector.pan, vector.tilt, vector.zoom].into_iter().flatten() {
        if !value.is_finite() || !range.contains(value) {
            return Err(ValidationError::range_error(parameter, range.min, range.max, value));
        }
    }
    Ok(())
}

fn check_finite(parameter: &str, vector: &PtzVector) -> Result<(), ValidationError> {
    for value in [vector.pan, vector.tilt, vector.zoom].into_iter().flatten() {
        if !value.is_finite() {
            return Err(ValidationError::Custom {
                parameter: parameter.to_string(),
                message: format!("{} is not a finite number", value),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContinuousMoveRequest {
    pub profile_token: String,
    pub velocity: PtzSpeed,
    /// Motion stops on its own after this long
    pub timeout: Option<Duration>,
}

impl ContinuousMoveRequest {
    pub fn new(profile_token: impl Into<String>, velocity: PtzSpeed) -> Self {
        Self {
            profile_token: profile_token.into(),
            velocity,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl XmlBody for ContinuousMoveRequest {
    fn write_xml(&self, w: &mut XmlWriter) {
        w.leaf("tptz:ProfileToken", &self.profile_token);
        self.velocity.write(w, "tptz:Velocity");
        w.leaf_opt("tptz:Timeout", self.timeout.map(time::format_duration));
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        let timeout = match xml::child_text(el, "tptz:Timeout") {
            Some(raw) if !raw.is_empty() => Some(time::parse_duration(&raw)?),
            _ => None,
        };
        Ok(Self {
            profile_token: xml::require_text(el, "tptz:ProfileToken")?,
            velocity: PtzVector::read(xml::require_child(el, "tptz:Velocity")?)?,
            timeout,
        })
    }
}

impl Validate for ContinuousMoveRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require_token("ProfileToken", &self.profile_token)?;
        if self.velocity.is_empty() {
            return Err(ValidationError::missing("Velocity"));
        }
        check_components("Velocity", &self.velocity, FloatRange::NORMALIZED)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbsoluteMoveRequest {
    pub profile_token: String,
    pub position: PtzVector,
    pub speed: Option<PtzSpeed>,
}

impl AbsoluteMoveRequest {
    pub fn new(profile_token: impl Into<String>, position: PtzVector) -> Self {
        Self {
            profile_token: profile_token.into(),
            position,
            speed: None,
        }
    }
}

impl XmlBody for AbsoluteMoveRequest {
    fn write_xml(&self, w: &mut XmlWriter) {
        w.leaf("tptz:ProfileToken", &self.profile_token);
        self.position.write(w, "tptz:Position");
        if let Some(speed) = &self.speed {
            speed.write(w, "tptz:Speed");
        }
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        Ok(Self {
            profile_token: xml::require_text(el, "tptz:ProfileToken")?,
            position: PtzVector::read(xml::require_child(el, "tptz:Position")?)?,
            speed: PtzVector::read_child(el, "tptz:Speed")?,
        })
    }
}

impl Validate for AbsoluteMoveRequest {
    /// Targets outside the configured range are clamped by the device, so
    /// only finiteness is checked here.
    fn validate(&self) -> Result<(), ValidationError> {
        require_token("ProfileToken", &self.profile_token)?;
        if self.position.is_empty() {
            return Err(ValidationError::missing("Position"));
        }
        check_finite("Position", &self.position)?;
        match &self.speed {
            Some(speed) => check_components("Speed", speed, FloatRange::UNIT),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelativeMoveRequest {
    pub profile_token: String,
    pub translation: PtzVector,
    pub speed: Option<PtzSpeed>,
}

impl RelativeMoveRequest {
    pub fn new(profile_token: impl Into<String>, translation: PtzVector) -> Self {
        Self {
            profile_token: profile_token.into(),
            translation,
            speed: None,
        }
    }
}

impl XmlBody for RelativeMoveRequest {
    fn write_xml(&self, w: &mut XmlWriter) {
        w.leaf("tptz:ProfileToken", &self.profile_token);
        self.translation.write(w, "tptz:Translation");
        if let Some(speed) = &self.speed {
            speed.write(w, "tptz:Speed");
        }
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        Ok(Self {
            profile_token: xml::require_text(el, "tptz:ProfileToken")?,
            translation: PtzVector::read(xml::require_child(el, "tptz:Translation")?)?,
            speed: PtzVector::read_child(el, "tptz:Speed")?,
        })
    }
}

impl Validate for RelativeMoveRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require_token("ProfileToken", &self.profile_token)?;
        if self.translation.is_empty() {
            return Err(ValidationError::missing("Translation"));
        }
        check_finite("Translation", &self.translation)?;
        match &self.speed {
            Some(speed) => check_components("Speed", speed, FloatRange::UNIT),
            None => Ok(()),
        }
    }
}

/// `Stop`. An absent flag means "stop that axis group too".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopRequest {
    pub profile_token: String,
    pub pan_tilt: Option<bool>,
    pub zoom: Option<bool>,
}

impl StopRequest {
    /// Stop every axis
    pub fn all(profile_token: impl Into<String>) -> Self {
        Self {
            profile_token: profile_token.into(),
            pan_tilt: None,
            zoom: None,
        }
    }

    pub fn stops_pan_tilt(&self) -> bool {
        self.pan_tilt.unwrap_or(true)
    }

    pub fn stops_zoom(&self) -> bool {
        self.zoom.unwrap_or(true)
    }
}

impl XmlBody for StopRequest {
    fn write_xml(&self, w: &mut XmlWriter) {
        w.leaf("tptz:ProfileToken", &self.profile_token)
            .leaf_opt("tptz:PanTilt", self.pan_tilt.map(xml::bool_str))
            .leaf_opt("tptz:Zoom", self.zoom.map(xml::bool_str));
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        let flag = |name: &str| xml::child_text(el, name).and_then(|raw| xml::parse_bool(&raw));
        Ok(Self {
            profile_token: xml::require_text(el, "tptz:ProfileToken")?,
            pan_tilt: flag("tptz:PanTilt"),
            zoom: flag("tptz:Zoom"),
        })
    }
}

impl Validate for StopRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require_token("ProfileToken", &self.profile_token)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveState {
    #[default]
    Idle,
    Moving,
    Unknown,
}

impl MoveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveState::Idle => "IDLE",
            MoveState::Moving => "MOVING",
            MoveState::Unknown => "UNKNOWN",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw.trim() {
            "IDLE" => MoveState::Idle,
            "MOVING" => MoveState::Moving,
            _ => MoveState::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PtzStatus {
    pub position: PtzVector,
    pub pan_tilt: MoveState,
    pub zoom: MoveState,
    pub error: Option<String>,
    pub utc_time: DateTime<Utc>,
}

impl PtzStatus {
    pub fn is_moving(&self) -> bool {
        self.pan_tilt == MoveState::Moving || self.zoom == MoveState::Moving
    }
}

impl XmlBody for PtzStatus {
    fn write_xml(&self, w: &mut XmlWriter) {
        w.open("tptz:PTZStatus");
        self.position.write(w, "tt:Position");
        w.open("tt:MoveStatus")
            .leaf("tt:PanTilt", self.pan_tilt.as_str())
            .leaf("tt:Zoom", self.zoom.as_str())
            .close("tt:MoveStatus")
            .leaf_opt("tt:Error", self.error.as_deref())
            .leaf("tt:UtcTime", time::format_datetime(self.utc_time))
            .close("tptz:PTZStatus");
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        let status = xml::require_child(el, "tptz:PTZStatus")?;
        let move_status = xml::child(status, "tt:MoveStatus");
        let state = |name: &str| {
            move_status
                .and_then(|m| xml::child_text(m, name))
                .map(|raw| MoveState::parse(&raw))
                .unwrap_or(MoveState::Unknown)
        };
        Ok(Self {
            position: PtzVector::read_child(status, "tt:Position")?.unwrap_or_default(),
            pan_tilt: state("tt:PanTilt"),
            zoom: state("tt:Zoom"),
            error: xml::child_text(status, "tt:Error").filter(|e| !e.is_empty()),
            utc_time: time::parse_datetime(&xml::require_text(status, "tt:UtcTime")?)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub token: String,
    pub name: String,
    pub position: Option<PtzVector>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetPresetsResponse {
    pub presets: Vec<Preset>,
}

impl XmlBody for GetPresetsResponse {
    fn write_xml(&self, w: &mut XmlWriter) {
        for preset in &self.presets {
            w.open_with("tptz:Preset", &[("token", preset.token.as_str())])
                .leaf("tt:Name", &preset.name);
            if let Some(position) = &preset.position {
                position.write(w, "tt:PTZPosition");
            }
            w.close("tptz:Preset");
        }
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        let presets = xml::children(el, "tptz:Preset")
            .map(|p| {
                Ok(Preset {
                    token: own_token(p)?,
                    name: xml::child_text(p, "tt:Name").unwrap_or_default(),
                    position: PtzVector::read_child(p, "tt:PTZPosition")?,
                })
            })
            .collect::<Result<Vec<_>, SoapError>>()?;
        Ok(Self { presets })
    }
}

token_request!(GetStatusRequest, profile_token, "tptz:ProfileToken");
token_request!(GetPresetsRequest, profile_token, "tptz:ProfileToken");

/// Create a preset at the current position, or overwrite `preset_token`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPresetRequest {
    pub profile_token: String,
    pub preset_name: Option<String>,
    pub preset_token: Option<String>,
}

impl XmlBody for SetPresetRequest {
    fn write_xml(&self, w: &mut XmlWriter) {
        w.leaf("tptz:ProfileToken", &self.profile_token)
            .leaf_opt("tptz:PresetName", self.preset_name.as_deref())
            .leaf_opt("tptz:PresetToken", self.preset_token.as_deref());
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        Ok(Self {
            profile_token: xml::require_text(el, "tptz:ProfileToken")?,
            preset_name: xml::child_text(el, "tptz:PresetName").filter(|n| !n.is_empty()),
            preset_token: xml::child_text(el, "tptz:PresetToken").filter(|t| !t.is_empty()),
        })
    }
}

impl Validate for SetPresetRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require_token("ProfileToken", &self.profile_token)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPresetResponse {
    pub preset_token: String,
}

impl XmlBody for SetPresetResponse {
    fn write_xml(&self, w: &mut XmlWriter) {
        w.leaf("tptz:PresetToken", &self.preset_token);
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        Ok(Self {
            preset_token: xml::require_text(el, "tptz:PresetToken")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GotoPresetRequest {
    pub profile_token: String,
    pub preset_token: String,
    pub speed: Option<PtzSpeed>,
}

impl GotoPresetRequest {
    pub fn new(profile_token: impl Into<String>, preset_token: impl Into<String>) -> Self {
        Self {
            profile_token: profile_token.into(),
            preset_token: preset_token.into(),
            speed: None,
        }
    }
}

impl XmlBody for GotoPresetRequest {
    fn write_xml(&self, w: &mut XmlWriter) {
        w.leaf("tptz:ProfileToken", &self.profile_token)
            .leaf("tptz:PresetToken", &self.preset_token);
        if let Some(speed) = &self.speed {
            speed.write(w, "tptz:Speed");
        }
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        Ok(Self {
            profile_token: xml::require_text(el, "tptz:ProfileToken")?,
            preset_token: xml::require_text(el, "tptz:PresetToken")?,
            speed: PtzVector::read_child(el, "tptz:Speed")?,
        })
    }
}

impl Validate for GotoPresetRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require_token("ProfileToken", &self.profile_token)?;
        require_token("PresetToken", &self.preset_token)?;
        match &self.speed {
            Some(speed) => check_components("Speed", speed, FloatRange::UNIT),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovePresetRequest {
    pub profile_token: String,
    pub preset_token: String,
}

impl RemovePresetRequest {
    pub fn new(profile_token: impl Into<String>, preset_token: impl Into<String>) -> Self {
        Self {
            profile_token: profile_token.into(),
            preset_token: preset_token.into(),
        }
    }
}

impl XmlBody for RemovePresetRequest {
    fn write_xml(&self, w: &mut XmlWriter) {
        w.leaf("tptz:ProfileToken", &self.profile_token)
            .leaf("tptz:PresetToken", &self.preset_token);
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        Ok(Self {
            profile_token: xml::require_text(el, "tptz:ProfileToken")?,
            preset_token: xml::require_text(el, "tptz:PresetToken")?,
        })
    }
}

impl Validate for RemovePresetRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require_token("ProfileToken", &self.profile_token)?;
        require_token("PresetToken", &self.preset_token)
    }
}

crate::define_onvif_operation! {
    operation: GetNodes,
    service: Ptz,
    request: Empty,
    response: GetNodesResponse,
}

crate::define_onvif_operation! {
    operation: GetConfigurations,
    service: Ptz,
    request: Empty,
    response: GetConfigurationsResponse,
}

crate::define_onvif_operation! {
    operation: ContinuousMove,
    service: Ptz,
    request: ContinuousMoveRequest,
    response: Empty,
}

crate::define_onvif_operation! {
    operation: AbsoluteMove,
    service: Ptz,
    request: AbsoluteMoveRequest,
    response: Empty,
}

crate::define_onvif_operation! {
    operation: RelativeMove,
    service: Ptz,
    request: RelativeMoveRequest,
    response: Empty,
}

crate::define_onvif_operation! {
    operation: Stop,
    service: Ptz,
    request: StopRequest,
    response: Empty,
}

crate::define_onvif_operation! {
    operation: GetStatus,
    service: Ptz,
    request: GetStatusRequest,
    response: PtzStatus,
}

crate::define_onvif_operation! {
    operation: GetPresets,
    service: Ptz,
    request: GetPresetsRequest,
    response: GetPresetsResponse,
}

crate::define_onvif_operation! {
    operation: SetPreset,
    service: Ptz,
    request: SetPresetRequest,
    response: SetPresetResponse,
}

crate::define_onvif_operation! {
    operation: GotoPreset,
    service: Ptz,
    request: GotoPresetRequest,
    response: Empty,
}

crate::define_onvif_operation! {
    operation: RemovePreset,
    service: Ptz,
    request: RemovePresetRequest,
    response: Empty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OnvifOperation;
    use crate::types::test_support::{request_round_trip, round_trip};
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn test_continuous_move_wire_shape() {
        let request = ContinuousMoveRequest::new("main", PtzVector::pan_tilt(0.5, 0.0))
            .with_timeout(Duration::from_secs(2));
        assert_eq!(
            ContinuousMove::build_payload(&request).unwrap(),
            r#"<tptz:ProfileToken>main</tptz:ProfileToken><tptz:Velocity><tt:PanTilt x="0.5" y="0"/></tptz:Velocity><tptz:Timeout>PT2S</tptz:Timeout>"#
        );
        assert_eq!(request_round_trip::<ContinuousMove>(&request), request);
    }

    proptest! {
        #[test]
        fn test_continuous_move_timeout_round_trip(millis in 0u64..86_400_000, nanos in 0u32..1_000_000) {
            let timeout = Duration::from_millis(millis) + Duration::from_nanos(u64::from(nanos));
            let request = ContinuousMoveRequest::new("main", PtzVector::pan_tilt(0.5, -0.25)).with_timeout(timeout);
            prop_assert_eq!(request_round_trip::<ContinuousMove>(&request), request);
        }
    }

    #[rstest]
    #[case(PtzVector::default())]
    #[case(PtzVector::pan_tilt(1.5, 0.0))]
    #[case(PtzVector::zoom(f32::NAN))]
    fn test_continuous_move_rejects_bad_velocity(#[case] velocity: PtzVector) {
        let request = ContinuousMoveRequest::new("main", velocity);
        assert!(ContinuousMove::build_payload(&request).is_err());
    }

    #[test]
    fn test_absolute_move_allows_out_of_range_targets() {
        let request = AbsoluteMoveRequest::new("main", PtzVector::pan_tilt(-3.0, 0.2).with_zoom(2.0));
        assert!(AbsoluteMove::build_payload(&request).is_ok());

        let mut bad_speed = request.clone();
        bad_speed.speed = Some(PtzVector::pan_tilt(2.0, 0.0));
        assert!(AbsoluteMove::build_payload(&bad_speed).is_err());
    }

    #[test]
    fn test_stop_flags_default_to_true() {
        let stop = StopRequest::all("main");
        assert!(stop.stops_pan_tilt() && stop.stops_zoom());
        assert_eq!(Stop::build_payload(&stop).unwrap(), "<tptz:ProfileToken>main</tptz:ProfileToken>");

        let zoom_only = StopRequest {
            pan_tilt: Some(false),
            ..StopRequest::all("main")
        };
        let decoded = request_round_trip::<Stop>(&zoom_only);
        assert!(!decoded.stops_pan_tilt());
        assert!(decoded.stops_zoom());
    }

    #[test]
    fn test_status_round_trip() {
        let status = PtzStatus {
            position: PtzVector::pan_tilt(-0.5, 0.25).with_zoom(0.0),
            pan_tilt: MoveState::Moving,
            zoom: MoveState::Idle,
            error: None,
            utc_time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        };
        let decoded = round_trip::<GetStatus>(&status);
        assert_eq!(decoded, status);
        assert!(decoded.is_moving());
    }

    #[test]
    fn test_configuration_round_trip() {
        let response = GetConfigurationsResponse {
            configurations: vec![PtzConfiguration {
                token: "ptz_cfg".to_string(),
                name: "PTZ".to_string(),
                node_token: "node0".to_string(),
                limits: PtzLimits {
                    zoom: FloatRange::new(0.0, 0.5),
                    ..PtzLimits::default()
                },
                default_speed: PtzVector::pan_tilt(0.5, 0.5).with_zoom(0.5),
                default_timeout: Some(Duration::from_secs(5)),
            }],
        };
        assert_eq!(round_trip::<GetConfigurations>(&response), response);

        let nodes = GetNodesResponse {
            nodes: vec![PtzNode {
                token: "node0".to_string(),
                name: "Node".to_string(),
                limits: PtzLimits::default(),
                maximum_number_of_presets: 32,
                home_supported: false,
            }],
        };
        assert_eq!(round_trip::<GetNodes>(&nodes), nodes);
    }

    #[test]
    fn test_presets_round_trip() {
        let presets = GetPresetsResponse {
            presets: vec![
                Preset {
                    token: "1".to_string(),
                    name: "Door".to_string(),
                    position: Some(PtzVector::pan_tilt(0.1, 0.2).with_zoom(0.3)),
                },
                Preset {
                    token: "2".to_string(),
                    name: "Empty".to_string(),
                    position: None,
                },
            ],
        };
        assert_eq!(round_trip::<GetPresets>(&presets), presets);

        let set = SetPresetRequest {
            profile_token: "main".to_string(),
            preset_name: Some("Door".to_string()),
            preset_token: None,
        };
        assert_eq!(request_round_trip::<SetPreset>(&set), set);
    }

    #[test]
    fn test_limits_clamp_only_present_axes() {
        let limits = PtzLimits {
            zoom: FloatRange::new(0.0, 0.5),
            ..PtzLimits::default()
        };
        let clamped = limits.clamp(PtzVector {
            pan: Some(-2.0),
            tilt: None,
            zoom: Some(0.9),
        });
        assert_eq!(clamped.pan, Some(-1.0));
        assert_eq!(clamped.tilt, None);
        assert_eq!(clamped.zoom, Some(0.5));
    }
}
