//! Shapes shared across services.

use onvif_soap::xml::{self, XmlWriter};
use onvif_soap::SoapError;
use serde::{Deserialize, Serialize};
use xmltree::Element;

/// Closed interval `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloatRange {
    pub min: f32,
    pub max: f32,
}

impl FloatRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Generic normalized space used by pan/tilt
    pub const NORMALIZED: FloatRange = FloatRange::new(-1.0, 1.0);

    /// Generic normalized zoom space
    pub const UNIT: FloatRange = FloatRange::new(0.0, 1.0);

    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.min;
        }
        value.max(self.min).min(self.max)
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    pub(crate) fn write(&self, w: &mut XmlWriter, name: &str) {
        w.open(name)
            .leaf("tt:Min", self.min)
            .leaf("tt:Max", self.max)
            .close(name);
    }

    pub(crate) fn read(el: &Element) -> Result<Self, SoapError> {
        Ok(Self {
            min: xml::require_parsed(el, "tt:Min")?,
            max: xml::require_parsed(el, "tt:Max")?,
        })
    }

    pub(crate) fn read_child(el: &Element, name: &str) -> Result<Option<Self>, SoapError> {
        xml::child(el, name).map(Self::read).transpose()
    }
}

/// Pan, tilt and zoom, each independently optional. An absent component
/// means "leave this axis alone".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PtzVector {
    pub pan: Option<f32>,
    pub tilt: Option<f32>,
    pub zoom: Option<f32>,
}

/// Speed uses the vector shape with per-axis magnitudes in `[0, 1]`.
pub type PtzSpeed = PtzVector;

impl PtzVector {
    pub fn pan_tilt(pan: f32, tilt: f32) -> Self {
        Self {
            pan: Some(pan),
            tilt: Some(tilt),
            zoom: None,
        }
    }

    pub fn zoom(zoom: f32) -> Self {
        Self {
            zoom: Some(zoom),
            ..Self::default()
        }
    }

    pub fn with_zoom(mut self, zoom: f32) -> Self {
        self.zoom = Some(zoom);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pan.is_none() && self.tilt.is_none() && self.zoom.is_none()
    }

    /// `<tt:PanTilt x= y=/>` and `<tt:Zoom x=/>` as children of `name`.
    pub(crate) fn write(&self, w: &mut XmlWriter, name: &str) {
        w.open(name);
        self.write_components(w);
        w.close(name);
    }

    pub(crate) fn write_components(&self, w: &mut XmlWriter) {
        if self.pan.is_some() || self.tilt.is_some() {
            let x = self.pan.map(|v| v.to_string());
            let y = self.tilt.map(|v| v.to_string());
            let mut attrs = Vec::new();
            if let Some(x) = &x {
                attrs.push(("x", x.as_str()));
            }
            if let Some(y) = &y {
                attrs.push(("y", y.as_str()));
            }
            w.empty("tt:PanTilt", &attrs);
        }
        if let Some(zoom) = self.zoom {
            let x = zoom.to_string();
            w.empty("tt:Zoom", &[("x", x.as_str())]);
        }
    }

    /// Read the components from an element holding `PanTilt`/`Zoom` children.
    pub(crate) fn read(el: &Element) -> Result<Self, SoapError> {
        let mut vector = Self::default();
        if let Some(pan_tilt) = xml::child(el, "tt:PanTilt") {
            vector.pan = xml::parse_attr(pan_tilt, "x")?;
            vector.tilt = xml::parse_attr(pan_tilt, "y")?;
        }
        if let Some(zoom) = xml::child(el, "tt:Zoom") {
            vector.zoom = xml::parse_attr(zoom, "x")?;
        }
        Ok(vector)
    }

    pub(crate) fn read_child(el: &Element, name: &str) -> Result<Option<Self>, SoapError> {
        xml::child(el, name).map(Self::read).transpose()
    }
}

/// `width x height`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub(crate) fn write(&self, w: &mut XmlWriter, name: &str) {
        w.open(name)
            .leaf("tt:Width", self.width)
            .leaf("tt:Height", self.height)
            .close(name);
    }

    pub(crate) fn read(el: &Element) -> Result<Self, SoapError> {
        Ok(Self {
            width: xml::require_parsed(el, "tt:Width")?,
            height: xml::require_parsed(el, "tt:Height")?,
        })
    }
}

/// `token` attribute of a required child
pub(crate) fn token_attr(el: &Element, name: &str) -> Result<String, SoapError> {
    let child = xml::require_child(el, name)?;
    xml::attr(child, "token")
        .map(str::to_string)
        .ok_or_else(|| SoapError::MissingElement(format!("{}/@token", name)))
}

/// `token` attribute of an optional child
pub(crate) fn optional_token_attr(el: &Element, name: &str) -> Option<String> {
    xml::child(el, name)
        .and_then(|c| xml::attr(c, "token"))
        .map(str::to_string)
}

/// `token` attribute on the element itself
pub(crate) fn own_token(el: &Element) -> Result<String, SoapError> {
    xml::attr(el, "token")
        .map(str::to_string)
        .ok_or_else(|| SoapError::MissingElement(format!("{}/@token", el.name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn wrap(inner: &str) -> Element {
        xml::parse_document(&format!(
            r#"<Root xmlns:tt="http://www.onvif.org/ver10/schema">{}</Root>"#,
            inner
        ))
        .unwrap()
    }

    #[test]
    fn test_partial_vectors_round_trip() {
        for vector in [
            PtzVector::default(),
            PtzVector::pan_tilt(0.5, -0.25),
            PtzVector::zoom(0.75),
            PtzVector {
                pan: Some(-1.0),
                tilt: None,
                zoom: Some(0.0),
            },
        ] {
            let mut w = XmlWriter::new();
            vector.write_components(&mut w);
            assert_eq!(PtzVector::read(&wrap(&w.finish())).unwrap(), vector);
        }
    }

    #[test]
    fn test_zero_is_not_absent() {
        let mut w = XmlWriter::new();
        PtzVector::zoom(0.0).write_components(&mut w);
        let xml = w.finish();
        assert_eq!(xml, r#"<tt:Zoom x="0"/>"#);
        assert_eq!(PtzVector::read(&wrap(&xml)).unwrap().zoom, Some(0.0));
    }

    #[test]
    fn test_bad_attribute_is_parse_error() {
        let el = wrap(r#"<tt:PanTilt x="left" y="0"/>"#);
        assert!(matches!(PtzVector::read(&el), Err(SoapError::Parse(_))));
    }

    proptest! {
        #[test]
        fn test_clamp_stays_in_range(value in -10.0f32..10.0, min in -2.0f32..0.0, max in 0.0f32..2.0) {
            let range = FloatRange::new(min, max);
            let clamped = range.clamp(value);
            prop_assert!(range.contains(clamped));
            if range.contains(value) {
                prop_assert_eq!(clamped, value);
            }
        }

        #[test]
        fn test_vector_round_trip(pan in proptest::option::of(-1.0f32..1.0), tilt in proptest::option::of(-1.0f32..1.0), zoom in proptest::option::of(0.0f32..1.0)) {
            let vector = PtzVector { pan, tilt, zoom };
            let mut w = XmlWriter::new();
            vector.write(&mut w, "tt:Position");
            let root = wrap(&w.finish());
            let decoded = PtzVector::read_child(&root, "tt:Position").unwrap().unwrap();
            prop_assert_eq!(decoded, vector);
        }
    }
}
