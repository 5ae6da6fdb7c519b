//! Operation framework
//!
//! Every ONVIF operation is a zero-sized type implementing [`OnvifOperation`]
//! that ties a request type and a response type to a service and an action
//! name. Requests and responses implement [`XmlBody`], which is used in both
//! directions: the client writes requests and reads responses, the mock
//! server reads requests and writes responses.

pub mod macros;

use onvif_soap::xml::XmlWriter;
use onvif_soap::SoapError;
use xmltree::Element;

use crate::error::ApiError;
use crate::service::Service;

/// Inner XML of an operation element, in both directions
pub trait XmlBody: Sized {
    /// Write the children of the operation element.
    fn write_xml(&self, w: &mut XmlWriter);

    /// Read from the operation element itself.
    fn read_xml(el: &Element) -> Result<Self, SoapError>;

    fn to_xml(&self) -> String {
        let mut w = XmlWriter::new();
        self.write_xml(&mut w);
        w.finish()
    }
}

/// Validation error types
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Parameter '{parameter}' value '{value}' is out of range ({min}..={max})")]
    RangeError {
        parameter: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("Required parameter '{parameter}' is missing")]
    MissingParameter { parameter: String },

    #[error("Parameter '{parameter}' failed validation: {message}")]
    Custom { parameter: String, message: String },
}

impl ValidationError {
    pub fn range_error(
        parameter: &str,
        min: impl std::fmt::Display,
        max: impl std::fmt::Display,
        value: impl std::fmt::Display,
    ) -> Self {
        Self::RangeError {
            parameter: parameter.to_string(),
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    pub fn missing(parameter: &str) -> Self {
        Self::MissingParameter {
            parameter: parameter.to_string(),
        }
    }
}

/// Local checks run before a request is sent
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

pub(crate) fn require_token(parameter: &str, token: &str) -> Result<(), ValidationError> {
    if token.trim().is_empty() {
        return Err(ValidationError::missing(parameter));
    }
    Ok(())
}

/// Base trait for all ONVIF operations
pub trait OnvifOperation {
    type Request: XmlBody + Validate;
    type Response: XmlBody;

    /// The service whose endpoint receives this operation
    const SERVICE: Service;

    /// Local name of the request element
    const ACTION: &'static str;

    /// Namespace of the request element. Differs from the service namespace
    /// only for WS-BaseNotification operations.
    fn namespace() -> &'static str {
        Self::SERVICE.namespace()
    }

    fn prefix() -> &'static str {
        Self::SERVICE.prefix()
    }

    /// Validate and serialize the request payload.
    fn build_payload(request: &Self::Request) -> Result<String, ValidationError> {
        request.validate()?;
        Ok(request.to_xml())
    }

    /// Decode the `{ACTION}Response` element.
    fn parse_response(xml: &Element) -> Result<Self::Response, ApiError> {
        Ok(Self::Response::read_xml(xml)?)
    }
}

/// Request or response with no content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Empty;

impl XmlBody for Empty {
    fn write_xml(&self, _w: &mut XmlWriter) {}

    fn read_xml(_el: &Element) -> Result<Self, SoapError> {
        Ok(Empty)
    }
}

impl Validate for Empty {}
