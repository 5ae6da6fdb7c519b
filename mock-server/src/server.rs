//! HTTP front end
//!
//! One warp route per served service path plus the subscription manager
//! endpoint. Every POST body goes to the [`Dispatcher`]; successful replies
//! are sent with status 200, `Sender` faults with 400 and all other faults
//! with 500, as `application/soap+xml`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use onvif_api::types::events::NotificationMessage;
use onvif_api::Service;
use onvif_soap::{envelope, Fault};
use tokio::sync::mpsc;
use warp::http::StatusCode;
use warp::{Filter, Reply};

use crate::clock::{Clock, SystemClock};
use crate::config::ServerConfig;
use crate::discovery::{Advertisement, DiscoveryResponder};
use crate::dispatch::{Dispatcher, SERVED_SERVICES, SUBSCRIPTION_PATH};
use crate::error::{Result, ServerError};
use crate::events::SubscriptionManager;
use crate::model::DeviceModel;
use crate::ptz::PtzController;

const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// Largest accepted request body
const MAX_BODY: u64 = 1024 * 1024;

/// A running mock device
///
/// ```no_run
/// use onvif_server::{OnvifServer, ServerConfig};
///
/// # #[tokio::main]
/// # async fn main() -> onvif_server::Result<()> {
/// let server = OnvifServer::start(ServerConfig::local()).await?;
/// println!("device service at {}", server.device_url());
/// server.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct OnvifServer {
    local_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    discovery: Option<DiscoveryResponder>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl OnvifServer {
    /// Validate `config`, bind and start serving.
    pub async fn start(config: ServerConfig) -> Result<Self> {
        Self::start_with_clock(config, Arc::new(SystemClock)).await
    }

    /// Like [`OnvifServer::start`] with timestamps taken from `clock`
    pub async fn start_with_clock(config: ServerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let bind_address = config.bind_address;
        let dispatcher = Arc::new(Dispatcher::new(config, clock));

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (local_addr, server) = warp::serve(routes(dispatcher.clone()))
            .try_bind_with_graceful_shutdown(bind_address, async move {
                shutdown_rx.recv().await;
            })
            .map_err(|e| ServerError::Bind {
                address: bind_address,
                message: e.to_string(),
            })?;

        let base_url = format!("http://{}", advertised_authority(dispatcher.config(), local_addr));
        dispatcher.set_base_url(base_url.clone());
        let server_handle = tokio::spawn(server);
        tracing::info!("ONVIF mock server listening on {} as {}", local_addr, base_url);

        let discovery = if dispatcher.config().discovery {
            let config = dispatcher.config();
            let scopes = config.scopes().into_iter().map(|scope| scope.item).collect();
            let advertisement = Advertisement::new(
                config.endpoint_reference.clone(),
                format!("{}{}", base_url, Service::Device.default_path()),
                scopes,
            );
            match DiscoveryResponder::start(config.discovery_address, advertisement).await {
                Ok(responder) => Some(responder),
                Err(e) => {
                    let _ = shutdown_tx.send(()).await;
                    let _ = server_handle.await;
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self {
            local_addr,
            dispatcher,
            discovery,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// Address the HTTP listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `http://host:port` used in every advertised address
    pub fn base_url(&self) -> String {
        self.dispatcher.base_url()
    }

    /// Device service endpoint, the address clients are configured with
    pub fn device_url(&self) -> String {
        format!("{}{}", self.base_url(), Service::Device.default_path())
    }

    pub fn discovery_addr(&self) -> Option<SocketAddr> {
        self.discovery.as_ref().map(DiscoveryResponder::local_addr)
    }

    pub fn model(&self) -> &Arc<DeviceModel> {
        self.dispatcher.model()
    }

    pub fn ptz(&self) -> &Arc<PtzController> {
        self.dispatcher.ptz()
    }

    pub fn events(&self) -> &Arc<SubscriptionManager> {
        self.dispatcher.events()
    }

    /// Queue an event on every matching subscription. Returns how many
    /// subscriptions received it.
    pub fn publish(&self, message: &NotificationMessage) -> usize {
        self.dispatcher.events().publish(message)
    }

    /// Stop accepting requests and wait for in-flight ones to finish.
    pub async fn shutdown(mut self) {
        if let Some(responder) = self.discovery.take() {
            responder.shutdown().await;
        }
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
        tracing::info!("ONVIF mock server on {} stopped", self.local_addr);
    }
}

/// `host:port` clients should use to reach `bound`
fn advertised_authority(config: &ServerConfig, bound: SocketAddr) -> String {
    if let Some(host) = &config.advertised_host {
        return format!("{}:{}", host, bound.port());
    }
    let ip = if bound.ip().is_unspecified() {
        detect_local_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
    } else {
        bound.ip()
    };
    SocketAddr::new(ip, bound.port()).to_string()
}

/// Address of the interface used for outbound traffic. Connecting a UDP
/// socket sends nothing.
fn detect_local_ip() -> Option<IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip())
}

fn is_service_segment(segment: &str) -> bool {
    SERVED_SERVICES
        .iter()
        .any(|service| service.default_path().strip_prefix("/onvif/") == Some(segment))
}

/// SOAP 1.2 HTTP binding: the client is to blame for `Sender` faults
fn fault_status(fault: &Fault) -> StatusCode {
    if fault.is_sender() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

async fn respond(dispatcher: &Dispatcher, body: &[u8], subscription: Option<&str>) -> warp::reply::Response {
    let raw = String::from_utf8_lossy(body);
    let (status, document) = match dispatcher.handle(&raw, subscription).await {
        Ok(document) => (StatusCode::OK, document),
        Err(fault) => (fault_status(&fault), envelope::build_fault(&fault)),
    };
    let reply = warp::reply::with_header(document, "content-type", SOAP_CONTENT_TYPE);
    warp::reply::with_status(reply, status).into_response()
}

fn with_dispatcher(
    dispatcher: Arc<Dispatcher>,
) -> impl Filter<Extract = (Arc<Dispatcher>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || dispatcher.clone())
}

fn routes(
    dispatcher: Arc<Dispatcher>,
) -> impl Filter<Extract = (impl Reply,), Error = std::convert::Infallible> + Clone {
    let subscription_segment = SUBSCRIPTION_PATH.trim_start_matches("/onvif/");

    let subscription = warp::post()
        .and(warp::path("onvif"))
        .and(warp::path(subscription_segment))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::body::content_length_limit(MAX_BODY))
        .and(warp::body::bytes())
        .and(with_dispatcher(dispatcher.clone()))
        .then(|id: String, body: Bytes, dispatcher: Arc<Dispatcher>| async move {
            respond(&dispatcher, &body, Some(&id)).await
        });

    let service = warp::post()
        .and(warp::path("onvif"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::body::content_length_limit(MAX_BODY))
        .and(warp::body::bytes())
        .and(with_dispatcher(dispatcher))
        .and_then(|segment: String, body: Bytes, dispatcher: Arc<Dispatcher>| async move {
            if !is_service_segment(&segment) {
                return Err(warp::reject::not_found());
            }
            Ok(respond(&dispatcher, &body, None).await)
        });

    subscription.or(service).recover(handle_rejection)
}

/// Handle rejections and convert them to HTTP responses.
async fn handle_rejection(err: warp::Rejection) -> std::result::Result<impl Reply, std::convert::Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
    } else {
        tracing::debug!("unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    Ok(warp::reply::with_status(message, code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_segments() {
        assert!(is_service_segment("device_service"));
        assert!(is_service_segment("ptz_service"));
        assert!(is_service_segment("events_service"));
        assert!(!is_service_segment("analytics_service"));
        assert!(!is_service_segment("subscription"));
    }

    #[test]
    fn test_advertised_authority() {
        let bound: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        assert_eq!(advertised_authority(&ServerConfig::local(), bound), "127.0.0.1:8080");

        let config = ServerConfig::local().with_advertised_host("camera.lab");
        assert_eq!(advertised_authority(&config, bound), "camera.lab:8080");

        let any: SocketAddr = "0.0.0.0:8080".parse().unwrap();
        assert!(!advertised_authority(&ServerConfig::local(), any).starts_with("0.0.0.0"));
    }

    #[tokio::test]
    async fn test_routes() {
        let dispatcher = Arc::new(Dispatcher::new(ServerConfig::local(), Arc::new(SystemClock)));
        let routes = routes(dispatcher);
        let request = envelope::build_request("<tds:GetHostname/>", None);

        let ok = warp::test::request()
            .method("POST")
            .path("/onvif/device_service")
            .body(request.clone())
            .reply(&routes)
            .await;
        assert_eq!(ok.status(), StatusCode::OK);
        assert!(ok.headers()["content-type"].to_str().unwrap().starts_with("application/soap+xml"));

        let fault = warp::test::request()
            .method("POST")
            .path("/onvif/subscription/unknown")
            .body(envelope::build_request("<wsnt:Renew><wsnt:TerminationTime>PT1M</wsnt:TerminationTime></wsnt:Renew>", None))
            .reply(&routes)
            .await;
        assert_eq!(fault.status(), StatusCode::BAD_REQUEST);
        assert!(String::from_utf8_lossy(fault.body()).contains("ResourceUnknown"));

        let unknown = warp::test::request()
            .method("POST")
            .path("/onvif/device_service")
            .body(envelope::build_request("<tds:Reboot/>", None))
            .reply(&routes)
            .await;
        assert_eq!(unknown.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let missing = warp::test::request()
            .method("POST")
            .path("/onvif/recording_service")
            .body(request.clone())
            .reply(&routes)
            .await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let wrong_method = warp::test::request()
            .method("GET")
            .path("/onvif/device_service")
            .reply(&routes)
            .await;
        assert_eq!(wrong_method.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
