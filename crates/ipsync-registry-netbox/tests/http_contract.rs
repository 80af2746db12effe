//! Contract Test: NetBox HTTP exchange
//!
//! Constraints verified:
//! - Reads and updates succeed only on 200, creates only on 201
//! - Reads send the read token, writes send the write token
//! - Write payloads carry the Registry field names
//!
//! If this test fails, a write the Registry did not accept can be reported as done.

mod common;

use common::serve_once;
use ipsync_core::config::TransportConfig;
use ipsync_core::records::{AddressStatus, CreateEntry, PatchEntry, PollingMetadata, RegistryId};
use ipsync_core::traits::RegistryBackend;
use ipsync_core::Error;
use ipsync_registry_netbox::NetboxRegistry;
use serde_json::json;

fn registry(base_url: &str) -> NetboxRegistry {
    NetboxRegistry::new(
        base_url,
        "reader-token",
        Some("writer-token".to_string()),
        false,
        &TransportConfig::default(),
    )
    .expect("registry construction succeeds")
}

fn patch_entry() -> PatchEntry {
    PatchEntry {
        id: RegistryId(7),
        status: AddressStatus::Active,
        custom_fields: PollingMetadata {
            device_id: "5".to_string(),
            sys_name: "core-sw1".to_string(),
            sys_descr: String::new(),
            hardware: String::new(),
            os: "ios".to_string(),
            last_polled: String::new(),
            serial: String::new(),
        },
    }
}

#[tokio::test]
async fn fetch_sends_read_token_and_decodes_results() {
    let body = json!({
        "count": 1,
        "next": null,
        "previous": null,
        "results": [{"id": 7, "address": "10.0.0.1/32", "custom_fields": {"sysName": "old"}}]
    });
    let (base_url, server) = serve_once(200, body.to_string()).await;

    let records = registry(&base_url).fetch_addresses().await.unwrap();
    let request = server.await.unwrap();

    assert_eq!(request.method, "GET");
    assert_eq!(request.target, "/api/ipam/ip-addresses/?limit=0");
    assert_eq!(request.header("authorization"), Some("Token reader-token"));
    assert_eq!(request.header("accept"), Some("application/json"));

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, RegistryId(7));
    assert_eq!(records[0].ip, "10.0.0.1");
}

#[tokio::test]
async fn fetch_failure_is_never_an_empty_snapshot() {
    let (base_url, server) = serve_once(500, r#"{"detail": "server error"}"#).await;

    let err = registry(&base_url).fetch_addresses().await.unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, Error::UnexpectedStatus { status: 500, .. }));
}

#[tokio::test]
async fn fetch_with_rejected_token_is_authentication_failure() {
    let (base_url, server) = serve_once(403, r#"{"detail": "Invalid token"}"#).await;

    let err = registry(&base_url).fetch_addresses().await.unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, Error::Authentication(_)));
}

#[tokio::test]
async fn fetch_of_capped_listing_aborts() {
    let body = json!({
        "count": 1500,
        "next": "http://netbox.invalid/api/ipam/ip-addresses/?limit=1000&offset=1000",
        "results": [{"id": 1, "address": "10.0.0.1/32"}]
    });
    let (base_url, server) = serve_once(200, body.to_string()).await;

    let err = registry(&base_url).fetch_addresses().await.unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, Error::Decode(_)));
}

#[tokio::test]
async fn create_succeeds_on_201_with_write_token() {
    let (base_url, server) = serve_once(201, "[]").await;

    let receipt = registry(&base_url)
        .create_addresses(&[CreateEntry::host_route("10.0.0.2")])
        .await
        .unwrap();
    let request = server.await.unwrap();

    assert_eq!(receipt.submitted, 1);
    assert!(!receipt.dry_run);
    assert_eq!(request.method, "POST");
    assert_eq!(request.target, "/api/ipam/ip-addresses/");
    assert_eq!(request.header("authorization"), Some("Token writer-token"));
    assert_eq!(request.json(), json!([{"address": "10.0.0.2/32", "status": "active"}]));
}

#[tokio::test]
async fn create_answered_with_200_is_a_failure() {
    let (base_url, server) = serve_once(200, "[]").await;

    let err = registry(&base_url)
        .create_addresses(&[CreateEntry::host_route("10.0.0.2")])
        .await
        .unwrap_err();
    server.await.unwrap();

    assert!(matches!(
        err,
        Error::UnexpectedStatus {
            status: 200,
            ref operation,
            ..
        } if operation == "create_addresses"
    ));
}

#[tokio::test]
async fn update_succeeds_on_200_with_write_token() {
    let (base_url, server) = serve_once(200, "[]").await;

    let receipt = registry(&base_url).update_addresses(&[patch_entry()]).await.unwrap();
    let request = server.await.unwrap();

    assert_eq!(receipt.submitted, 1);
    assert_eq!(request.method, "PATCH");
    assert_eq!(request.header("authorization"), Some("Token writer-token"));

    let payload = request.json();
    assert_eq!(payload[0]["id"], json!(7));
    assert_eq!(payload[0]["status"], json!("active"));
    assert_eq!(payload[0]["custom_fields"]["device_id"], json!("5"));
    assert_eq!(payload[0]["custom_fields"]["sysName"], json!("core-sw1"));
}

#[tokio::test]
async fn update_answered_with_201_is_a_failure() {
    let (base_url, server) = serve_once(201, "[]").await;

    let err = registry(&base_url).update_addresses(&[patch_entry()]).await.unwrap_err();
    server.await.unwrap();

    assert_eq!(err.status(), Some(201));
}

#[tokio::test]
async fn empty_update_is_still_sent() {
    let (base_url, server) = serve_once(200, "[]").await;

    let receipt = registry(&base_url).update_addresses(&[]).await.unwrap();
    let request = server.await.unwrap();

    assert_eq!(receipt.submitted, 0);
    assert_eq!(request.json(), json!([]));
}
