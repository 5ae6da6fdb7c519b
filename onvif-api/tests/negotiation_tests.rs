//! Client behavior against recorded device traffic

use std::sync::Arc;
use std::time::Duration;

use onvif_api::types::device::GetDeviceInformation;
use onvif_api::types::events::CreatePullPointSubscriptionRequest;
use onvif_api::types::media::GetProfiles;
use onvif_api::types::ptz::{ContinuousMove, ContinuousMoveRequest, GetPresets, GetPresetsRequest};
use onvif_api::{ApiError, ClientConfig, Empty, OnvifClient, PtzVector, RegistrySource, Service};
use onvif_soap::envelope::{build_fault, build_response, operation_element};
use onvif_soap::fault::subcode;
use onvif_soap::{CaptureTransport, Fault, ReplayTransport};

const DEVICE: &str = "http://192.0.2.10/onvif/device_service";

fn reply(prefix: &str, action: &str, inner: &str) -> String {
    build_response(&operation_element(prefix, &format!("{}Response", action), inner))
}

/// A camera without PTZ: media and events only
fn fixed_camera_capabilities() -> String {
    reply(
        "tds",
        "GetCapabilities",
        "<tds:Capabilities>\
           <tt:Device><tt:XAddr>http://192.0.2.10/onvif/device_service</tt:XAddr></tt:Device>\
           <tt:Events><tt:XAddr>http://192.0.2.10/onvif/events_service</tt:XAddr>\
             <tt:WSPullPointSupport>true</tt:WSPullPointSupport></tt:Events>\
           <tt:Media><tt:XAddr>http://192.0.2.10/onvif/media_service</tt:XAddr></tt:Media>\
         </tds:Capabilities>",
    )
}

fn not_implemented() -> String {
    build_fault(&Fault::receiver(&[subcode::ACTION_NOT_SUPPORTED], "not implemented"))
}

fn client(transport: Arc<ReplayTransport>) -> OnvifClient {
    OnvifClient::new(
        ClientConfig::new(DEVICE)
            .with_credentials("admin", "secret")
            .with_transport(transport),
    )
    .unwrap()
}

#[tokio::test]
async fn test_missing_ptz_address_fails_fast() {
    let transport = Arc::new(ReplayTransport::from_responses(vec![
        ("GetCapabilities", fixed_camera_capabilities()),
        ("GetServices", not_implemented()),
    ]));
    let client = client(transport.clone());
    client.initialize().await.unwrap();
    assert_eq!(client.registry().source(), RegistrySource::Capabilities);
    assert!(client.capabilities().ptz.is_none());

    let before = transport.served().len();
    let request = ContinuousMoveRequest::new("main", PtzVector::pan_tilt(0.5, 0.0));
    let error = client.execute::<ContinuousMove>(&request).await.unwrap_err();
    assert!(matches!(error, ApiError::ServiceUnsupported(Service::Ptz)));
    assert!(error.is_unsupported());

    let error = client
        .execute::<GetPresets>(&GetPresetsRequest::new("main"))
        .await
        .unwrap_err();
    assert!(matches!(error, ApiError::ServiceUnsupported(Service::Ptz)));

    // No PTZ request ever reached the transport
    assert_eq!(transport.served().len(), before);
}

#[tokio::test]
async fn test_services_listing_drives_endpoints() {
    let services = reply(
        "tds",
        "GetServices",
        "<tds:Service><tds:Namespace>http://www.onvif.org/ver10/device/wsdl</tds:Namespace>\
           <tds:XAddr>http://192.0.2.10/onvif/device_service</tds:XAddr>\
           <tds:Version><tt:Major>2</tt:Major><tt:Minor>60</tt:Minor></tds:Version></tds:Service>\
         <tds:Service><tds:Namespace>http://www.onvif.org/ver10/media/wsdl</tds:Namespace>\
           <tds:XAddr>http://192.0.2.10/onvif/Media</tds:XAddr>\
           <tds:Version><tt:Major>2</tt:Major><tt:Minor>60</tt:Minor></tds:Version></tds:Service>",
    );
    let profiles = reply(
        "trt",
        "GetProfiles",
        r#"<trt:Profiles token="main" fixed="true"><tt:Name>Main</tt:Name></trt:Profiles>"#,
    );
    let transport = Arc::new(ReplayTransport::from_responses(vec![
        ("GetCapabilities", fixed_camera_capabilities()),
        ("GetServices", services),
        ("GetProfiles", profiles),
    ]));
    let client = client(transport.clone());
    client.initialize().await.unwrap();

    let registry = client.registry();
    assert_eq!(registry.source(), RegistrySource::Services);
    assert_eq!(registry.endpoint(Service::Media).unwrap(), "http://192.0.2.10/onvif/Media");
    // Events had a capability address but is absent from the listing
    assert!(!registry.supports(Service::Events));
    assert!(client.capabilities().events.is_none());

    let profiles = client.execute::<GetProfiles>(&Empty).await.unwrap().profiles;
    assert_eq!(profiles.len(), 1);
    assert!(profiles[0].fixed);
    assert_eq!(transport.remaining(), 0);
}

#[tokio::test]
async fn test_faults_are_classified() {
    let transport = Arc::new(ReplayTransport::from_responses(vec![
        ("GetCapabilities", not_implemented()),
        ("GetServices", not_implemented()),
        (
            "GetDeviceInformation",
            build_fault(&Fault::sender(&[subcode::NOT_AUTHORIZED], "Sender not authorized")),
        ),
    ]));
    let client = client(transport);
    client.initialize().await.unwrap();

    let error = client.execute::<GetDeviceInformation>(&Empty).await.unwrap_err();
    assert!(matches!(error, ApiError::NotAuthorized(_)));
    assert!(!error.is_retryable());
}

#[tokio::test]
async fn test_requests_carry_security_header() {
    let capture = Arc::new(CaptureTransport::new(ReplayTransport::from_responses(vec![(
        "GetDeviceInformation",
        reply(
            "tds",
            "GetDeviceInformation",
            "<tds:Manufacturer>Acme</tds:Manufacturer><tds:Model>C1</tds:Model>\
             <tds:FirmwareVersion>1.0</tds:FirmwareVersion><tds:SerialNumber>42</tds:SerialNumber>\
             <tds:HardwareId>hw</tds:HardwareId>",
        ),
    )])));
    let client = OnvifClient::new(
        ClientConfig::new(DEVICE)
            .with_credentials("admin", "secret")
            .with_transport(capture.clone()),
    )
    .unwrap();

    let info = client.get_device_information().await.unwrap();
    assert_eq!(info.manufacturer, "Acme");

    let exchanges = capture.exchanges();
    assert_eq!(exchanges.len(), 1);
    assert_eq!(exchanges[0].sequence, 1);
    assert_eq!(exchanges[0].operation, "GetDeviceInformation");
    let parsed = onvif_soap::envelope::parse_envelope(&exchanges[0].request).unwrap();
    let token = parsed.security.expect("UsernameToken header");
    assert_eq!(token.username, "admin");
    assert!(token.verify("secret"));
}

#[tokio::test]
async fn test_pull_point_subscription_lifecycle() {
    let subscription_address = "http://192.0.2.10/onvif/subscription/7";
    let create = reply(
        "tev",
        "CreatePullPointSubscription",
        &format!(
            "<tev:SubscriptionReference><wsa:Address>{}</wsa:Address></tev:SubscriptionReference>\
             <wsnt:CurrentTime>2030-01-01T00:00:00Z</wsnt:CurrentTime>\
             <wsnt:TerminationTime>2030-01-01T00:01:00Z</wsnt:TerminationTime>",
            subscription_address
        ),
    );
    let pull = reply(
        "tev",
        "PullMessages",
        r#"<tev:CurrentTime>2030-01-01T00:00:05Z</tev:CurrentTime>
           <tev:TerminationTime>2030-01-01T00:01:00Z</tev:TerminationTime>
           <wsnt:NotificationMessage>
             <wsnt:Topic Dialect="http://www.onvif.org/ver10/tev/topicExpression/ConcreteSet">tns1:VideoSource/MotionAlarm</wsnt:Topic>
             <wsnt:Message><tt:Message UtcTime="2030-01-01T00:00:04Z" PropertyOperation="Changed">
               <tt:Source><tt:SimpleItem Name="Source" Value="vs0"/></tt:Source>
               <tt:Data><tt:SimpleItem Name="State" Value="true"/></tt:Data>
             </tt:Message></wsnt:Message>
           </wsnt:NotificationMessage>"#,
    );
    let renew = reply(
        "wsnt",
        "Renew",
        "<wsnt:TerminationTime>2030-01-01T00:02:00Z</wsnt:TerminationTime>",
    );
    let unsubscribe = reply("wsnt", "Unsubscribe", "");

    let transport = Arc::new(ReplayTransport::from_responses(vec![
        ("GetCapabilities", fixed_camera_capabilities()),
        ("GetServices", not_implemented()),
        ("CreatePullPointSubscription", create),
        ("PullMessages", pull),
        ("Renew", renew),
        ("Unsubscribe", unsubscribe),
    ]));
    let client = client(transport.clone());
    client.initialize().await.unwrap();

    let subscription = client
        .create_pull_point_subscription(&CreatePullPointSubscriptionRequest::with_duration(Duration::from_secs(60)))
        .await
        .unwrap();
    assert_eq!(subscription.address(), subscription_address);
    assert!(subscription.is_active());

    let messages = subscription.pull(Duration::from_secs(1), 10).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].topic, "tns1:VideoSource/MotionAlarm");
    assert_eq!(messages[0].data_value("State"), Some("true"));

    let renewed = subscription.renew(Duration::from_secs(120)).await.unwrap();
    assert_eq!(renewed, subscription.termination_time());

    subscription.unsubscribe().await.unwrap();
    assert!(!subscription.is_active());
    assert_eq!(transport.remaining(), 0);
}
