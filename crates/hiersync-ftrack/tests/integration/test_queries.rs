//! Integration tests for project, tree and custom attribute queries

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use hiersync_core::domain::{EntityType, TrackingId};
use hiersync_core::ports::ITrackingSystem;
use hiersync_ftrack::provider::ID_CHUNK_SIZE;

use crate::common;

fn tid(s: &str) -> TrackingId {
    TrackingId::new(s).unwrap()
}

// ============================================================================
// Projects and trees
// ============================================================================

#[tokio::test]
async fn test_find_project_maps_full_name_and_code() {
    let (server, ftrack) = common::setup_ftrack_mock().await;
    common::mount_query(
        &server,
        "from Project where full_name",
        json!([{ "__entity_type__": "Project", "id": "p1", "full_name": "Demo Project", "name": "demo" }]),
    )
    .await;

    let project = ftrack.find_project("Demo Project").await.unwrap().unwrap();
    assert_eq!(project.id.as_str(), "p1");
    assert_eq!(project.name, "Demo Project");
    assert_eq!(project.code.as_deref(), Some("demo"));
    assert!(project.is_root());

    let sent = common::sent_operations(&server).await;
    assert_eq!(sent[0]["action"], "query");
    assert!(sent[0]["expression"]
        .as_str()
        .unwrap()
        .ends_with("where full_name is \"Demo Project\""));
}

#[tokio::test]
async fn test_find_project_absent() {
    let (server, ftrack) = common::setup_ftrack_mock().await;
    common::mount_query(&server, "from Project where full_name", json!([])).await;

    assert!(ftrack.find_project("Nope").await.unwrap().is_none());
}

#[tokio::test]
async fn test_fetch_project_tree_is_one_query() {
    let (server, ftrack) = common::setup_ftrack_mock().await;
    common::mount_query(
        &server,
        "from TypedContext where project_id",
        json!([
            {
                "__entity_type__": "Sequence", "id": "seq01", "name": "SEQ01", "parent_id": "p1",
                "object_type": {"name": "Sequence"}, "type": null,
                "link": [{"id": "p1", "name": "Demo"}, {"id": "seq01", "name": "SEQ01"}]
            },
            {
                "__entity_type__": "Task", "id": "t1", "name": "layout", "parent_id": "seq01",
                "object_type": {"name": "Task"}, "type": {"name": "Layout"},
                "link": [{"id": "p1", "name": "Demo"}, {"id": "seq01", "name": "SEQ01"}, {"id": "t1", "name": "layout"}]
            }
        ]),
    )
    .await;

    let entities = ftrack.fetch_project_tree(&tid("p1")).await.unwrap();

    assert_eq!(entities.len(), 2);
    assert_eq!(entities[0].entity_type, EntityType::Sequence);
    assert_eq!(entities[1].task_type.as_deref(), Some("Layout"));
    assert_eq!(entities[1].link_path, vec!["Demo", "SEQ01"]);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

// ============================================================================
// Custom attributes
// ============================================================================

#[tokio::test]
async fn test_attribute_configs_map_show_to_project() {
    let (server, ftrack) = common::setup_ftrack_mock().await;
    common::mount_query(
        &server,
        "from CustomAttributeConfiguration",
        json!([
            {"id": "cfg-show", "key": "avalon_mongo_id", "entity_type": "show", "object_type": null},
            {"id": "cfg-shot", "key": "avalon_mongo_id", "entity_type": "task", "object_type": {"name": "Shot"}}
        ]),
    )
    .await;

    let wanted = vec!["Project".to_string(), "Shot".to_string(), "Milestone".to_string()];
    let configured = ftrack
        .fetch_custom_attribute_configs("avalon_mongo_id", &wanted)
        .await
        .unwrap();

    assert!(configured.contains("Project"));
    assert!(configured.contains("Shot"));
    assert!(!configured.contains("Milestone"));
}

async fn mount_id_configurations(server: &wiremock::MockServer) {
    common::mount_query(
        server,
        "from CustomAttributeConfiguration",
        json!([
            {"id": "cfg-show", "key": "avalon_mongo_id", "entity_type": "show", "object_type": null},
            {"id": "cfg-shot", "key": "avalon_mongo_id", "entity_type": "task", "object_type": {"name": "Shot"}}
        ]),
    )
    .await;
}

#[tokio::test]
async fn test_bulk_read_chunks_ids() {
    let (server, ftrack) = common::setup_ftrack_mock().await;
    mount_id_configurations(&server).await;
    common::mount_query(
        &server,
        "from ContextCustomAttributeValue",
        json!([
            {"entity_id": "e0", "value": "aaaaaaaaaaaaaaaaaaaaaaa1"},
            {"entity_id": "e1", "value": null}
        ]),
    )
    .await;

    let ids: Vec<TrackingId> = (0..ID_CHUNK_SIZE + 1).map(|i| tid(&format!("e{}", i))).collect();
    let values = ftrack
        .read_custom_attribute_bulk(&ids, "avalon_mongo_id")
        .await
        .unwrap();

    // One configuration lookup, then two chunks
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert_eq!(values.len(), 1);
    assert_eq!(values[&tid("e0")], json!("aaaaaaaaaaaaaaaaaaaaaaa1"));
}

#[tokio::test]
async fn test_bulk_read_filters_by_configuration_ids() {
    let (server, ftrack) = common::setup_ftrack_mock().await;
    mount_id_configurations(&server).await;
    common::mount_query(&server, "from ContextCustomAttributeValue", json!([])).await;

    ftrack
        .read_custom_attribute_bulk(&[tid("sh010")], "avalon_mongo_id")
        .await
        .unwrap();

    let sent = common::sent_operations(&server).await;
    let expression = sent
        .iter()
        .filter_map(|op| op["expression"].as_str())
        .find(|e| e.contains("from ContextCustomAttributeValue"))
        .unwrap();
    assert!(expression.contains("configuration_id in (\"cfg-shot\", \"cfg-show\")"));
    assert!(expression.ends_with("entity_id in (\"sh010\")"));
}

#[tokio::test]
async fn test_bulk_read_of_unconfigured_attribute_is_empty() {
    let (server, ftrack) = common::setup_ftrack_mock().await;
    common::mount_query(&server, "from CustomAttributeConfiguration", json!([])).await;

    let values = ftrack
        .read_custom_attribute_bulk(&[tid("sh010")], "fps")
        .await
        .unwrap();

    assert!(values.is_empty());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_write_custom_attribute_uses_configuration_key() {
    let (server, ftrack) = common::setup_ftrack_mock().await;
    common::mount_query(
        &server,
        "from TypedContext where project_id",
        json!([{
            "__entity_type__": "Shot", "id": "sh010", "name": "SH010", "parent_id": "p1",
            "object_type": {"name": "Shot"}
        }]),
    )
    .await;
    common::mount_query(
        &server,
        "from CustomAttributeConfiguration",
        json!([{"id": "cfg-shot", "key": "avalon_mongo_id", "entity_type": "task", "object_type": {"name": "Shot"}}]),
    )
    .await;
    common::mount_operation(&server, "update", "ContextCustomAttributeValue", json!({})).await;

    ftrack.fetch_project_tree(&tid("p1")).await.unwrap();
    ftrack
        .write_custom_attribute(&tid("sh010"), "avalon_mongo_id", &json!("aaaaaaaaaaaaaaaaaaaaaaa1"))
        .await
        .unwrap();

    let sent = common::sent_operations(&server).await;
    let update = sent.iter().find(|op| op["action"] == "update").unwrap();
    assert_eq!(update["entity_key"], json!(["cfg-shot", "sh010"]));
    assert_eq!(update["entity_data"]["value"], "aaaaaaaaaaaaaaaaaaaaaaa1");
}

#[tokio::test]
async fn test_write_without_configuration_fails() {
    let (server, ftrack) = common::setup_ftrack_mock().await;
    common::mount_query(&server, "from Project where full_name", json!([{"id": "p1", "full_name": "Demo"}])).await;
    common::mount_query(&server, "from CustomAttributeConfiguration", json!([])).await;

    ftrack.find_project("Demo").await.unwrap();
    let err = ftrack
        .write_custom_attribute(&tid("p1"), "avalon_mongo_id", &json!("x"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No configuration"));
}

// ============================================================================
// Error handling
// ============================================================================

#[tokio::test]
async fn test_exception_payload_becomes_error() {
    let (server, ftrack) = common::setup_ftrack_mock().await;
    Mock::given(method("POST"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "exception": "ServerError",
            "content": "Permission denied"
        })))
        .mount(&server)
        .await;

    let err = ftrack.find_project("Demo").await.unwrap_err();
    assert!(format!("{:#}", err).contains("Permission denied"));
}

#[tokio::test]
async fn test_rate_limited_request_is_retried() {
    let (server, ftrack) = common::setup_ftrack_mock().await;
    Mock::given(method("POST"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "0"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    common::mount_query(&server, "from Project where full_name", json!([])).await;

    assert!(ftrack.find_project("Demo").await.unwrap().is_none());
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_rate_limit_exhausted() {
    let (server, ftrack) = common::setup_ftrack_mock().await;
    Mock::given(method("POST"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "0"))
        .mount(&server)
        .await;

    let err = ftrack.find_project("Demo").await.unwrap_err();
    assert!(format!("{:#}", err).contains("Too many requests"));
    // One attempt plus two retries
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}
