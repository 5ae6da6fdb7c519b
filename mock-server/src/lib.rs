//! In-memory ONVIF device for tests and local development.
//!
//! The server speaks the same SOAP wire format as real cameras and uses the
//! request and response types of `onvif-api`, so a client can be exercised
//! end to end without hardware.
//!
//! # Overview
//!
//! - [`OnvifServer`]: warp HTTP server on the conventional
//!   `/onvif/{device,media,ptz,imaging,events}_service` paths plus
//!   `/onvif/subscription/{id}` for pull-point subscriptions.
//! - [`Dispatcher`]: envelope parsing, authentication and routing over the
//!   closed [`Operation`] set.
//! - [`DeviceModel`]: profiles, configurations, video sources and imaging.
//! - [`PtzController`]: per-profile motion state, positions and presets.
//! - [`SubscriptionManager`]: subscriptions with bounded event queues.
//! - [`DiscoveryResponder`]: answers WS-Discovery probes.
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use onvif_api::types::events::NotificationMessage;
//! use onvif_server::{OnvifServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> onvif_server::Result<()> {
//!     let server = OnvifServer::start(ServerConfig::local().with_user("admin", "secret")).await?;
//!     println!("point the client at {}", server.device_url());
//!
//!     // Subscribers see this on their next pull
//!     server.publish(
//!         &NotificationMessage::new("tns1:VideoSource/MotionAlarm", Utc::now()).with_data("State", "true"),
//!     );
//!
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod logging;
pub mod model;
pub mod ptz;
pub mod server;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ServerConfig;
pub use discovery::{Advertisement, DiscoveryResponder};
pub use dispatch::{Dispatcher, Operation};
pub use error::{Result, ServerError};
pub use events::{SubscriptionLimits, SubscriptionManager};
pub use logging::{init_logging, LoggingMode};
pub use model::DeviceModel;
pub use ptz::{MotionFlags, PtzController, PtzSnapshot};
pub use server::OnvifServer;
