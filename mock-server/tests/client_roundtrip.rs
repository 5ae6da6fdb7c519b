//! End-to-end tests: the `onvif-api` client against a running mock server
//!
//! Every test binds its own server on an ephemeral loopback port, so they
//! can run in parallel.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use onvif_api::types::events::{CreatePullPointSubscriptionRequest, NotificationMessage};
use onvif_api::types::media::{CreateProfile, CreateProfileRequest, DeleteProfile, DeleteProfileRequest};
use onvif_api::types::ptz::MoveState;
use onvif_api::{ApiError, ClientConfig, OnvifClient, PtzVector, RegistrySource, Service};
use onvif_server::{ManualClock, OnvifServer, ServerConfig};

async fn client_for(server: &OnvifServer) -> OnvifClient {
    let client = OnvifClient::new(ClientConfig::new(server.device_url())).unwrap();
    client.initialize().await.unwrap();
    client
}

fn motion(state: &str) -> NotificationMessage {
    NotificationMessage::new("tns1:VideoSource/MotionAlarm", Utc::now()).with_data("State", state)
}

#[tokio::test]
async fn test_initialize_discovers_served_services() {
    let server = OnvifServer::start(ServerConfig::local()).await.unwrap();
    let client = client_for(&server).await;

    assert_eq!(client.registry().source(), RegistrySource::Services);
    for service in [Service::Device, Service::Media, Service::Ptz, Service::Imaging, Service::Events] {
        assert!(client.supports(service), "{:?} should be advertised", service);
    }
    assert!(!client.supports(Service::Analytics));

    let info = client.get_device_information().await.unwrap();
    assert_eq!(info.model, "Mock PTZ Camera");

    server.shutdown().await;
}

#[tokio::test]
async fn test_profiles_and_stream_uri() {
    let server = OnvifServer::start(ServerConfig::local()).await.unwrap();
    let client = client_for(&server).await;

    let profiles = client.get_profiles().await.unwrap();
    let tokens: Vec<_> = profiles.iter().map(|p| p.token.as_str()).collect();
    assert_eq!(tokens, vec!["profile_main", "profile_sub"]);

    let uri = client.get_stream_uri("profile_main").await.unwrap();
    assert_eq!(uri.uri, "rtsp://127.0.0.1:554/profile_main/stream");

    let missing = client.get_stream_uri("nope").await.unwrap_err();
    assert!(matches!(missing, ApiError::NotFound(_)), "got {:?}", missing);

    server.shutdown().await;
}

#[tokio::test]
async fn test_profile_lifecycle() {
    let server = OnvifServer::start(ServerConfig::local()).await.unwrap();
    let client = client_for(&server).await;

    let created = client
        .execute::<CreateProfile>(&CreateProfileRequest::new("Extra"))
        .await
        .unwrap()
        .profile;
    assert!(!created.fixed);
    assert_eq!(client.get_profiles().await.unwrap().len(), 3);

    client
        .execute::<DeleteProfile>(&DeleteProfileRequest::new(created.token.as_str()))
        .await
        .unwrap();
    assert_eq!(client.get_profiles().await.unwrap().len(), 2);

    let fixed = client
        .execute::<DeleteProfile>(&DeleteProfileRequest::new("profile_main"))
        .await
        .unwrap_err();
    match fixed {
        ApiError::Fault(fault) => assert!(fault.has_subcode("DeletionOfFixedProfile")),
        other => panic!("expected a fault, got {:?}", other),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_ptz_motion() {
    let server = OnvifServer::start(ServerConfig::local()).await.unwrap();
    let client = client_for(&server).await;

    client
        .continuous_move("profile_main", PtzVector::pan_tilt(0.5, 0.0).with_zoom(0.2), None)
        .await
        .unwrap();
    let status = client.get_status("profile_main").await.unwrap();
    assert_eq!(status.pan_tilt, MoveState::Moving);
    assert_eq!(status.zoom, MoveState::Moving);

    client.stop("profile_main").await.unwrap();
    let status = client.get_status("profile_main").await.unwrap();
    assert!(!status.is_moving());

    // Out of range targets are clamped to the node's space
    client
        .absolute_move("profile_main", PtzVector::pan_tilt(2.0, -0.5))
        .await
        .unwrap();
    let position = client.get_status("profile_main").await.unwrap().position;
    assert_eq!(position.pan, Some(1.0));
    assert_eq!(position.tilt, Some(-0.5));

    let unsupported = client.stop("profile_sub").await.unwrap_err();
    assert!(matches!(unsupported, ApiError::Unsupported(_)), "got {:?}", unsupported);

    server.shutdown().await;
}

#[tokio::test]
async fn test_pull_point_round_trip() {
    let server = OnvifServer::start(ServerConfig::local()).await.unwrap();
    let client = client_for(&server).await;

    let subscription = client
        .create_pull_point_subscription(&CreatePullPointSubscriptionRequest::with_duration(Duration::from_secs(60)))
        .await
        .unwrap();
    assert!(subscription.address().contains("/onvif/subscription/"));
    assert!(subscription.is_active());

    assert!(subscription.pull(Duration::ZERO, 10).await.unwrap().is_empty());

    assert_eq!(server.publish(&motion("true")), 1);
    let messages = subscription.pull(Duration::from_secs(5), 10).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].topic, "tns1:VideoSource/MotionAlarm");

    assert!(subscription.pull(Duration::ZERO, 10).await.unwrap().is_empty());

    let before = subscription.termination_time();
    let renewed = subscription.renew(Duration::from_secs(120)).await.unwrap();
    assert!(renewed > before);

    subscription.unsubscribe().await.unwrap();
    subscription.unsubscribe().await.unwrap();
    assert!(server.events().is_empty());

    let gone = subscription.pull(Duration::ZERO, 10).await.unwrap_err();
    assert!(matches!(gone, ApiError::NotFound(_)), "got {:?}", gone);

    server.shutdown().await;
}

#[tokio::test]
async fn test_long_pull_returns_when_event_arrives() {
    let server = Arc::new(OnvifServer::start(ServerConfig::local()).await.unwrap());
    let client = client_for(&server).await;
    let subscription = client
        .create_pull_point_subscription(&CreatePullPointSubscriptionRequest::default())
        .await
        .unwrap();

    let publisher = server.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        publisher.publish(&motion("false"));
    });

    let started = std::time::Instant::now();
    let messages = subscription.pull(Duration::from_secs(10), 10).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_subscription_expires_on_device_clock() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()));
    let server = OnvifServer::start_with_clock(ServerConfig::local(), clock.clone())
        .await
        .unwrap();
    let client = client_for(&server).await;

    let subscription = client
        .create_pull_point_subscription(&CreatePullPointSubscriptionRequest::with_duration(Duration::from_secs(10)))
        .await
        .unwrap();
    assert_eq!(
        subscription.termination_time(),
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 10).unwrap()
    );

    clock.advance(Duration::from_secs(11));
    let expired = subscription.pull(Duration::ZERO, 10).await.unwrap_err();
    assert!(matches!(expired, ApiError::Expired(_)), "got {:?}", expired);

    // Expiry removed it; the next call no longer finds it
    let gone = subscription.pull(Duration::ZERO, 10).await.unwrap_err();
    assert!(matches!(gone, ApiError::NotFound(_)), "got {:?}", gone);

    server.shutdown().await;
}

#[tokio::test]
async fn test_authentication_required() {
    let server = OnvifServer::start(ServerConfig::local().with_user("admin", "secret"))
        .await
        .unwrap();

    // Capabilities and services are readable without credentials
    let anonymous = client_for(&server).await;
    let denied = anonymous.get_profiles().await.unwrap_err();
    assert!(matches!(denied, ApiError::NotAuthorized(_)), "got {:?}", denied);

    let wrong = OnvifClient::new(ClientConfig::new(server.device_url()).with_credentials("admin", "guess")).unwrap();
    wrong.initialize().await.unwrap();
    assert!(matches!(wrong.get_profiles().await, Err(ApiError::NotAuthorized(_))));

    let admin = OnvifClient::new(ClientConfig::new(server.device_url()).with_credentials("admin", "secret")).unwrap();
    admin.initialize().await.unwrap();
    assert_eq!(admin.get_profiles().await.unwrap().len(), 2);

    server.shutdown().await;
}

#[tokio::test]
async fn test_raw_http_faults() {
    let server = OnvifServer::start(ServerConfig::local()).await.unwrap();
    let http = reqwest::Client::new();

    let unknown = onvif_soap::envelope::build_request("<tds:Reboot/>", None);
    let response = http
        .post(server.device_url())
        .header("content-type", "application/soap+xml; charset=utf-8")
        .body(unknown)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 500);
    let body = response.text().await.unwrap();
    assert!(body.contains("ActionNotSupported"), "{}", body);

    let garbage = http
        .post(server.device_url())
        .body("not soap")
        .send()
        .await
        .unwrap();
    assert_eq!(garbage.status().as_u16(), 400);
    assert!(garbage.text().await.unwrap().contains("Sender"));

    let analytics = http
        .post(format!("{}/onvif/analytics_service", server.base_url()))
        .body(onvif_soap::envelope::build_request("<tds:GetHostname/>", None))
        .send()
        .await
        .unwrap();
    assert_eq!(analytics.status().as_u16(), 404);

    server.shutdown().await;
}
