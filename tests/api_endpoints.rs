//! Integration tests for the identity ledger API endpoints
//!
//! These tests drive the router in-process and check status codes and JSON
//! shapes for registration, verification and audit endpoints.

use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use identity_ledger::api::{build_api_router, Node};
use identity_ledger::node::NodeState;
use identity_ledger::registry::IdentityRegistry;

fn test_server(state: Option<NodeState>) -> TestServer {
    let registry = Arc::new(RwLock::new(IdentityRegistry::new()));
    let state = state.map(|s| Arc::new(RwLock::new(s)));
    let node = Arc::new(Node::new_shared(registry, state));
    TestServer::new(build_api_router(node)).expect("Failed to create test server")
}

#[tokio::test]
async fn test_register_and_verify_flow() {
    let server = test_server(Some(NodeState::Ready));

    let response = server.get("/api/health").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["chain_length"], 1);

    let response = server
        .post("/api/identity")
        .json(&json!({"name": "Alice", "externalId": "ID12345", "publicKey": "AlicePublicKey"}))
        .await;
    assert_eq!(response.status_code(), 201);
    let alice: Value = response.json();
    assert_eq!(alice["blockIndex"], 2);
    assert_eq!(alice["record"]["recordType"], "identity");
    assert!(alice["record"]["localId"].is_string());

    let response = server
        .post("/api/identity")
        .json(&json!({"name": "Bob", "externalId": "ID67890", "publicKey": "BobPublicKey"}))
        .await;
    assert_eq!(response.status_code(), 201);

    let response = server.get("/api/identity/ID12345").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["record"]["name"], "Alice");
    assert_eq!(json["record"]["localId"], alice["record"]["localId"]);

    let response = server.get("/api/identity/ID99999").await;
    assert_eq!(response.status_code(), 404);
    let json: Value = response.json();
    assert!(json["error"].is_string());

    let response = server.get("/api/ledger/height").await;
    let height: u64 = response.json();
    assert_eq!(height, 3);

    let response = server.get("/api/ledger/validate").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["status"], "valid");
}

#[tokio::test]
async fn test_registration_validation_error() {
    let server = test_server(None);

    let response = server
        .post("/api/identity")
        .json(&json!({"name": "", "externalId": "ID1", "publicKey": "k"}))
        .await;
    assert_eq!(response.status_code(), 400);
    let json: Value = response.json();
    assert!(json["error"].as_str().unwrap().contains("name"));

    let response = server.get("/api/ledger/height").await;
    let height: u64 = response.json();
    assert_eq!(height, 1);
}

#[tokio::test]
async fn test_history_lists_every_registration() {
    let server = test_server(None);
    for key in ["first-key", "second-key"] {
        let response = server
            .post("/api/identity")
            .json(&json!({"name": "Alice", "externalId": "ID1", "publicKey": key}))
            .await;
        assert_eq!(response.status_code(), 201);
    }

    let json: Value = server.get("/api/identity/ID1/history").await.json();
    assert_eq!(json["count"], 2);
    assert_eq!(json["registrations"][0]["record"]["publicKey"], "first-key");
    assert_eq!(json["registrations"][1]["record"]["publicKey"], "second-key");

    let json: Value = server.get("/api/identity/ID1").await.json();
    assert_eq!(json["record"]["publicKey"], "first-key");
}

#[tokio::test]
async fn test_ledger_endpoints() {
    let server = test_server(None);

    let response = server
        .post("/api/ledger/append")
        .json(&json!({"recordType": "report", "title": "Quarterly"}))
        .await;
    assert_eq!(response.status_code(), 201);
    let block: Value = response.json();
    assert_eq!(block["index"], 2);

    let response = server.get("/api/ledger/block/1").await;
    assert_eq!(response.status_code(), 200);
    let genesis: Value = response.json();
    assert_eq!(genesis["previous_hash"], "0");
    assert_eq!(genesis["data"]["type"], "genesis");
    assert_eq!(block["previous_hash"], genesis["hash"]);

    let response = server.get("/api/ledger/block/0").await;
    assert_eq!(response.status_code(), 404);
    let response = server.get("/api/ledger/block/999").await;
    assert_eq!(response.status_code(), 404);

    let json: Value = server.get("/api/ledger/blocks").await.json();
    assert_eq!(json["total"], 2);
    assert_eq!(json["blocks"][0]["index"], 2);
    assert_eq!(json["limit"], 10);

    let json: Value = server.get("/api/ledger/export").await.json();
    assert_eq!(json.as_array().map(|a| a.len()), Some(2));

    let json: Value = server.get("/api/stats").await.json();
    assert!(json["total_requests"].is_number());
    assert_eq!(json["records_appended"], 1);
    assert_eq!(json["chain_length"], 2);
}

#[tokio::test]
async fn test_keypair_endpoint() {
    let server = test_server(None);
    let response = server.post("/api/identity/keypair").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["public_key"].as_str().map(str::len), Some(66));
    assert_eq!(json["secret_key"].as_str().map(str::len), Some(64));
}

#[tokio::test]
async fn test_degraded_node_refuses_writes() {
    let server = test_server(Some(NodeState::Degraded));

    let response = server.get("/api/health").await;
    assert_eq!(response.status_code(), 503);

    let response = server
        .post("/api/identity")
        .json(&json!({"name": "Alice", "externalId": "ID12345", "publicKey": "k"}))
        .await;
    assert_eq!(response.status_code(), 503);

    let response = server.get("/api/identity/ID12345").await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_writes_refused_once_shared_state_degrades() {
    let registry = Arc::new(RwLock::new(IdentityRegistry::new()));
    let state = Arc::new(RwLock::new(NodeState::Ready));
    let node = Arc::new(Node::new_shared(registry.clone(), Some(state.clone())));
    let server = TestServer::new(build_api_router(node)).expect("Failed to create test server");

    let response = server
        .post("/api/identity")
        .json(&json!({"name": "Alice", "externalId": "ID1", "publicKey": "k"}))
        .await;
    assert_eq!(response.status_code(), 201);

    *state.write().await = NodeState::Degraded;

    let response = server
        .post("/api/ledger/append")
        .json(&json!({"recordType": "report"}))
        .await;
    assert_eq!(response.status_code(), 503);
    let response = server
        .post("/api/identity")
        .json(&json!({"name": "Bob", "externalId": "ID2", "publicKey": "k"}))
        .await;
    assert_eq!(response.status_code(), 503);
    assert_eq!(registry.read().await.ledger().len(), 2);

    let response = server.get("/api/health").await;
    assert_eq!(response.status_code(), 503);
    let json: Value = response.json();
    assert_eq!(json["status"], "unhealthy");
    assert_eq!(json["node_state"], "Degraded");
}

#[tokio::test]
async fn test_partial_identity_payload_is_first_match() {
    let server = test_server(None);

    let response = server
        .post("/api/ledger/append")
        .json(&json!({"recordType": "identity", "externalId": "ID1", "name": "Legacy", "publicKey": "k0"}))
        .await;
    assert_eq!(response.status_code(), 201);
    let response = server
        .post("/api/identity")
        .json(&json!({"name": "Alice", "externalId": "ID1", "publicKey": "k1"}))
        .await;
    assert_eq!(response.status_code(), 201);

    let json: Value = server.get("/api/identity/ID1").await.json();
    assert_eq!(json["blockIndex"], 2);
    assert_eq!(json["record"]["name"], "Legacy");
}
