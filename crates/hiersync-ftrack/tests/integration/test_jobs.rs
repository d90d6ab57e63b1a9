//! Integration tests for Job records

use serde_json::{json, Value};

use hiersync_core::domain::{JobHandle, JobPayload, JobStatus};
use hiersync_core::ports::ITrackingSystem;

use crate::common;

#[tokio::test]
async fn test_create_job_runs_as_api_user() {
    let (server, ftrack) = common::setup_ftrack_mock().await;
    common::mount_query(&server, "from User where username", json!([{"id": "user-1"}])).await;
    common::mount_operation(&server, "create", "Job", json!({"id": "job-1"})).await;

    let job = ftrack.create_job("Demo", "Synchronizing project Demo").await.unwrap();
    assert_eq!(job.id, "job-1");

    let sent = common::sent_operations(&server).await;
    let create = sent.iter().find(|op| op["action"] == "create").unwrap();
    assert_eq!(create["entity_data"]["status"], "running");
    assert_eq!(create["entity_data"]["user_id"], "user-1");
    let data: Value =
        serde_json::from_str(create["entity_data"]["data"].as_str().unwrap()).unwrap();
    assert_eq!(data["description"], "Synchronizing project Demo");
}

#[tokio::test]
async fn test_create_job_unknown_user_fails() {
    let (server, ftrack) = common::setup_ftrack_mock().await;
    common::mount_query(&server, "from User where username", json!([])).await;

    assert!(ftrack.create_job("Demo", "sync").await.is_err());
}

#[tokio::test]
async fn test_update_job_status_sends_traceback() {
    let (server, ftrack) = common::setup_ftrack_mock().await;
    common::mount_operation(&server, "update", "Job", json!({})).await;

    let payload = JobPayload::new("Synchronization failed").with_traceback("boom\ncaused by: io");
    ftrack
        .update_job_status(&JobHandle::new("job-1"), JobStatus::Failed, &payload)
        .await
        .unwrap();

    let sent = common::sent_operations(&server).await;
    assert_eq!(sent[0]["entity_key"], json!(["job-1"]));
    assert_eq!(sent[0]["entity_data"]["status"], "failed");
    let data: Value = serde_json::from_str(sent[0]["entity_data"]["data"].as_str().unwrap()).unwrap();
    assert_eq!(data["traceback"], "boom\ncaused by: io");
}
