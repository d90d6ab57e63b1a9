//! Shared helpers for ftrack API integration tests
//!
//! Every ftrack call hits `POST /api`; mocks are told apart by a fragment
//! of the query expression or operation in the request body.

use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use hiersync_ftrack::{FtrackClient, FtrackTrackingSystem};

pub const API_USER: &str = "pipeline";
pub const API_KEY: &str = "test-api-key";

/// Starts a mock server and returns a provider pointing at it
pub async fn setup_ftrack_mock() -> (MockServer, FtrackTrackingSystem) {
    let server = MockServer::start().await;
    let client = FtrackClient::new(server.uri(), API_USER, API_KEY).with_max_retries(2);
    (server, FtrackTrackingSystem::new(client))
}

/// Mounts a query whose expression contains `fragment`
pub async fn mount_query(server: &MockServer, fragment: &str, data: Value) {
    Mock::given(method("POST"))
        .and(path("/api"))
        .and(header("ftrack-user", API_USER))
        .and(header("ftrack-api-key", API_KEY))
        .and(body_string_contains(fragment))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "action": "query", "data": data }
        ])))
        .mount(server)
        .await;
}

/// Mounts a write operation (create/update) on `entity_type`
pub async fn mount_operation(server: &MockServer, action: &str, entity_type: &str, data: Value) {
    Mock::given(method("POST"))
        .and(path("/api"))
        .and(body_string_contains(format!("\"action\":\"{}\"", action)))
        .and(body_string_contains(format!("\"entity_type\":\"{}\"", entity_type)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "action": action, "data": data }
        ])))
        .mount(server)
        .await;
}

/// The operation arrays of every request received so far
pub async fn sent_operations(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r: &Request| serde_json::from_slice::<Value>(&r.body).unwrap())
        .flat_map(|batch| batch.as_array().cloned().unwrap_or_default())
        .collect()
}
