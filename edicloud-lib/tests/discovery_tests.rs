//! Tests for UDP discovery against a loopback responder

mod common;

use common::*;
use edicloud_lib::descriptor::ProbeStatus;
use edicloud_lib::discovery::auth_hash;
use edicloud_lib::markup::Markup;
use std::time::Duration;

#[tokio::test]
async fn test_probe_parses_online_reply() {
    let relay_addr = "10.0.0.5:12345".parse().unwrap();
    let cloud = FakeDiscovery::spawn(Some(online_reply(relay_addr))).await;
    let discovery = DiscoveryClient::new(cloud.addr, fast_config());

    let descriptor = discovery.probe(DEVICE_ID, PASSWORD).await.unwrap();
    assert!(descriptor.success);
    assert_eq!(descriptor.status, Some(ProbeStatus::Online));
    assert_eq!(descriptor.relay_endpoint(), Some(("10.0.0.5", 12345, RELAY_ID)));
    assert_eq!(descriptor.password.as_deref(), Some(PASSWORD));
    assert_eq!(cloud.hits(), 1);
}

#[tokio::test]
async fn test_probe_request_contents() {
    let cloud = FakeDiscovery::spawn(Some("<param><code value=\"5000\" /></param>".to_string())).await;
    let discovery = DiscoveryClient::new(cloud.addr, fast_config());

    let descriptor = discovery.probe(DEVICE_ID, PASSWORD).await.unwrap();
    assert!(!descriptor.online);
    assert!(!descriptor.is_reachable());

    let requests = cloud.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    let doc = Markup::parse(&requests[0]).unwrap();
    assert_eq!(doc.child_value("code"), Some("1030"));
    assert_eq!(doc.child_value("id"), Some(DEVICE_ID));
    assert_eq!(doc.child_value("lanip"), Some("192.168.1.2"));
    assert_eq!(doc.child_value("lanport"), Some("36587"));
    assert_eq!(doc.child_value("auth"), Some(auth_hash(PASSWORD).as_str()));
    let seq = doc.child_value("seq").unwrap();
    assert!(seq.starts_with(DEVICE_ID));
    assert!(seq[DEVICE_ID.len()..].parse::<i64>().unwrap() > 0);
}

#[tokio::test]
async fn test_probe_gives_up_after_max_attempts() {
    let cloud = FakeDiscovery::spawn(None).await;
    let config = fast_config()
        .with_udp_timeout(Duration::from_millis(100))
        .with_udp_max_retries(3);
    let discovery = DiscoveryClient::new(cloud.addr, config);

    let result = discovery.probe(DEVICE_ID, PASSWORD).await;
    match result {
        Err(Error::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("Expected RetriesExhausted, got: {:?}", other),
    }

    // No further attempt after giving up
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(cloud.hits(), 3);
}

#[tokio::test]
async fn test_client_reports_failed_discovery_as_descriptor() {
    let cloud = FakeDiscovery::spawn(None).await;
    let config = fast_config()
        .with_udp_timeout(Duration::from_millis(50))
        .with_udp_max_retries(1);
    let mut client = cloud.client(config);

    let descriptor = client.discover().await;
    assert!(!descriptor.success);
    assert!(descriptor.status_description().starts_with("Discovery failed"));
    assert!(matches!(client.open().await, Err(Error::DeviceUnreachable { .. })));
}

#[tokio::test]
async fn test_offline_device_cannot_be_opened() {
    let cloud = FakeDiscovery::spawn(Some("<param><code value=\"5000\" /></param>".to_string())).await;
    let mut client = cloud.client(fast_config());
    client.discover().await;
    assert!(matches!(client.open().await, Err(Error::DeviceOffline)));
    assert!(!client.is_connected());
}
