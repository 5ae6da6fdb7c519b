//! Typed requests and responses, grouped by service
//!
//! Each module also declares the operations of its service with
//! [`define_onvif_operation!`](crate::define_onvif_operation).

pub mod common;
pub mod device;
pub mod events;
pub mod imaging;
pub mod media;
pub mod ptz;

pub use common::{FloatRange, PtzSpeed, PtzVector, Resolution};

/// A request whose only content is a single token element.
macro_rules! token_request {
    ($(#[$meta:meta])* $name:ident, $field:ident, $element:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
        pub struct $name {
            pub $field: String,
        }

        impl $name {
            pub fn new($field: impl Into<String>) -> Self {
                Self { $field: $field.into() }
            }
        }

        impl $crate::operation::XmlBody for $name {
            fn write_xml(&self, w: &mut onvif_soap::xml::XmlWriter) {
                w.leaf($element, &self.$field);
            }

            fn read_xml(el: &xmltree::Element) -> ::std::result::Result<Self, onvif_soap::SoapError> {
                Ok(Self {
                    $field: onvif_soap::xml::require_text(el, $element)?,
                })
            }
        }

        impl $crate::operation::Validate for $name {
            fn validate(&self) -> ::std::result::Result<(), $crate::operation::ValidationError> {
                $crate::operation::require_token(onvif_soap::xml::local_name($element), &self.$field)
            }
        }
    };
}

pub(crate) use token_request;
