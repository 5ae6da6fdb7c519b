//! Type-safe ONVIF client API
//!
//! Every ONVIF operation is a type implementing [`OnvifOperation`], declared
//! next to its request and response types under [`types`]. An
//! [`OnvifClient`] negotiates the device's service addresses once and then
//! runs operations against the right endpoint:
//!
//! ```rust,ignore
//! use onvif_api::{ClientConfig, OnvifClient, PtzVector};
//! use onvif_api::types::ptz::{ContinuousMove, ContinuousMoveRequest};
//!
//! let client = OnvifClient::new(
//!     ClientConfig::new("http://192.0.2.10/onvif/device_service").with_credentials("admin", "secret"),
//! )?;
//! client.initialize().await?;
//!
//! let profile = &client.get_profiles().await?[0];
//! client
//!     .execute::<ContinuousMove>(&ContinuousMoveRequest::new(&profile.token, PtzVector::pan_tilt(0.5, 0.0)))
//!     .await?;
//! client.stop(&profile.token).await?;
//! ```
//!
//! Services the device does not advertise fail fast with
//! [`ApiError::ServiceUnsupported`] without touching the network.
//!
//! The request and response types implement [`operation::XmlBody`] in both
//! directions, so a server can decode requests and encode responses with the
//! same definitions.

pub mod client;
pub mod error;
pub mod operation;
pub mod registry;
pub mod service;
pub mod subscription;
pub mod types;

pub use client::{ClientConfig, OnvifClient};
pub use error::{classify_fault, ApiError, Result};
pub use operation::{Empty, OnvifOperation, Validate, ValidationError, XmlBody};
pub use registry::{RegistrySource, ServiceRegistry};
pub use service::Service;
pub use subscription::PullPointSubscription;
pub use types::{FloatRange, PtzSpeed, PtzVector, Resolution};

pub use onvif_soap::{CallOptions, Credentials, Fault, SoapError};
