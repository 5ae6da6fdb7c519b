//! Imaging service (ver20) types

use onvif_soap::xml::{self, XmlWriter};
use onvif_soap::SoapError;
use serde::{Deserialize, Serialize};
use xmltree::Element;

use super::common::FloatRange;
use super::token_request;
use crate::operation::{require_token, Validate, ValidationError, XmlBody};

const FIELDS: [&str; 4] = ["tt:Brightness", "tt:ColorSaturation", "tt:Contrast", "tt:Sharpness"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImagingSettings {
    pub brightness: Option<f32>,
    pub color_saturation: Option<f32>,
    pub contrast: Option<f32>,
    pub sharpness: Option<f32>,
}

impl ImagingSettings {
    fn values(&self) -> [Option<f32>; 4] {
        [self.brightness, self.color_saturation, self.contrast, self.sharpness]
    }

    /// Overlay the fields present in `other`.
    pub fn merge(&mut self, other: &ImagingSettings) {
        self.brightness = other.brightness.or(self.brightness);
        self.color_saturation = other.color_saturation.or(self.color_saturation);
        self.contrast = other.contrast.or(self.contrast);
        self.sharpness = other.sharpness.or(self.sharpness);
    }

    /// Name of the first field that falls outside `options`, if any
    pub fn out_of_range(&self, options: &ImagingOptions) -> Option<(&'static str, f32, FloatRange)> {
        self.values()
            .into_iter()
            .zip(options.ranges())
            .zip(FIELDS)
            .find_map(|((value, range), field)| match (value, range) {
                (Some(v), Some(r)) if !r.contains(v) => Some((xml::local_name(field), v, r)),
                _ => None,
            })
    }

    fn write(&self, w: &mut XmlWriter, name: &str) {
        w.open(name);
        for (field, value) in FIELDS.iter().zip(self.values()) {
            w.leaf_opt(field, value);
        }
        w.close(name);
    }

    fn read(el: &Element) -> Result<Self, SoapError> {
        Ok(Self {
            brightness: xml::parse_child(el, "tt:Brightness")?,
            color_saturation: xml::parse_child(el, "tt:ColorSaturation")?,
            contrast: xml::parse_child(el, "tt:Contrast")?,
            sharpness: xml::parse_child(el, "tt:Sharpness")?,
        })
    }
}

impl XmlBody for ImagingSettings {
    fn write_xml(&self, w: &mut XmlWriter) {
        self.write(w, "timg:ImagingSettings");
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        Self::read(xml::require_child(el, "timg:ImagingSettings")?)
    }
}

token_request!(GetImagingSettingsRequest, video_source_token, "timg:VideoSourceToken");
token_request!(GetOptionsRequest, video_source_token, "timg:VideoSourceToken");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetImagingSettingsRequest {
    pub video_source_token: String,
    pub settings: ImagingSettings,
    pub force_persistence: bool,
}

impl SetImagingSettingsRequest {
    pub fn new(video_source_token: impl Into<String>, settings: ImagingSettings) -> Self {
        Self {
            video_source_token: video_source_token.into(),
            settings,
            force_persistence: true,
        }
    }
}

impl XmlBody for SetImagingSettingsRequest {
    fn write_xml(&self, w: &mut XmlWriter) {
        w.leaf("timg:VideoSourceToken", &self.video_source_token);
        self.settings.write(w, "timg:ImagingSettings");
        w.leaf("timg:ForcePersistence", xml::bool_str(self.force_persistence));
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        Ok(Self {
            video_source_token: xml::require_text(el, "timg:VideoSourceToken")?,
            settings: ImagingSettings::read(xml::require_child(el, "timg:ImagingSettings")?)?,
            force_persistence: xml::child_text(el, "timg:ForcePersistence")
                .and_then(|raw| xml::parse_bool(&raw))
                .unwrap_or(true),
        })
    }
}

impl Validate for SetImagingSettingsRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require_token("VideoSourceToken", &self.video_source_token)?;
        for (field, value) in FIELDS.iter().zip(self.settings.values()) {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(ValidationError::Custom {
                        parameter: xml::local_name(field).to_string(),
                        message: format!("{} is not a finite number", v),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Valid ranges per imaging field; `None` means the field is not adjustable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImagingOptions {
    pub brightness: Option<FloatRange>,
    pub color_saturation: Option<FloatRange>,
    pub contrast: Option<FloatRange>,
    pub sharpness: Option<FloatRange>,
}

impl ImagingOptions {
    /// `[0, 100]` for every field
    pub fn percent() -> Self {
        let range = Some(FloatRange::new(0.0, 100.0));
        Self {
            brightness: range,
            color_saturation: range,
            contrast: range,
            sharpness: range,
        }
    }

    fn ranges(&self) -> [Option<FloatRange>; 4] {
        [self.brightness, self.color_saturation, self.contrast, self.sharpness]
    }
}

impl XmlBody for ImagingOptions {
    fn write_xml(&self, w: &mut XmlWriter) {
        w.open("timg:ImagingOptions");
        for (field, range) in FIELDS.iter().zip(self.ranges()) {
            if let Some(range) = range {
                range.write(w, field);
            }
        }
        w.close("timg:ImagingOptions");
    }

    fn read_xml(el: &Element) -> Result<Self, SoapError> {
        let options = xml::require_child(el, "timg:ImagingOptions")?;
        Ok(Self {
            brightness: FloatRange::read_child(options, "tt:Brightness")?,
            color_saturation: FloatRange::read_child(options, "tt:ColorSaturation")?,
            contrast: FloatRange::read_child(options, "tt:Contrast")?,
            sharpness: FloatRange::read_child(options, "tt:Sharpness")?,
        })
    }
}

crate::define_onvif_operation! {
    operation: GetImagingSettings,
    service: Imaging,
    request: GetImagingSettingsRequest,
    response: ImagingSettings,
}

crate::define_onvif_operation! {
    operation: SetImagingSettings,
    service: Imaging,
    request: SetImagingSettingsRequest,
    response: crate::operation::Empty,
}

crate::define_onvif_operation! {
    operation: GetOptions,
    service: Imaging,
    request: GetOptionsRequest,
    response: ImagingOptions,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OnvifOperation;
    use crate::types::test_support::{request_round_trip, round_trip};

    #[test]
    fn test_settings_round_trip() {
        let settings = ImagingSettings {
            brightness: Some(55.0),
            contrast: Some(40.5),
            ..Default::default()
        };
        assert_eq!(round_trip::<GetImagingSettings>(&settings), settings);

        let request = SetImagingSettingsRequest::new("vs0", settings);
        assert_eq!(request_round_trip::<SetImagingSettings>(&request), request);
    }

    #[test]
    fn test_options_round_trip() {
        let options = ImagingOptions {
            sharpness: None,
            ..ImagingOptions::percent()
        };
        assert_eq!(round_trip::<GetOptions>(&options), options);
    }

    #[test]
    fn test_merge_and_range_check() {
        let mut current = ImagingSettings {
            brightness: Some(50.0),
            contrast: Some(50.0),
            ..Default::default()
        };
        current.merge(&ImagingSettings {
            contrast: Some(120.0),
            ..Default::default()
        });
        assert_eq!(current.brightness, Some(50.0));
        assert_eq!(current.contrast, Some(120.0));

        let (field, value, _) = current.out_of_range(&ImagingOptions::percent()).unwrap();
        assert_eq!(field, "Contrast");
        assert_eq!(value, 120.0);
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let request = SetImagingSettingsRequest::new(
            "vs0",
            ImagingSettings {
                sharpness: Some(f32::INFINITY),
                ..Default::default()
            },
        );
        assert!(SetImagingSettings::build_payload(&request).is_err());
    }
}
