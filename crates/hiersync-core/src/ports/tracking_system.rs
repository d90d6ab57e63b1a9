//! Tracking system port
//!
//! Defines the interface to the production tracking service that owns the
//! canonical project hierarchy. Implemented by `hiersync-ftrack`.

use std::collections::{BTreeSet, HashMap};

use crate::domain::{JobHandle, JobPayload, JobStatus, TrackingEntity, TrackingId};

/// Custom attribute values keyed by entity; entities without a value are absent
pub type AttributeValues = HashMap<TrackingId, serde_json::Value>;

/// Port trait for the tracking system
///
/// All reads are bulk reads: implementations must not issue one request per
/// entity. Only the sync action creates and updates Job records.
#[async_trait::async_trait]
pub trait ITrackingSystem: Send + Sync {
    /// Looks up a project by its full name
    ///
    /// # Returns
    /// The project entity, or `None` if no such project exists
    async fn find_project(&self, name: &str) -> anyhow::Result<Option<TrackingEntity>>;

    /// Fetches every descendant of a project in a single query
    ///
    /// Task entities are included (with `task_type` set). Custom attribute
    /// fields (`synced_id`, `ignore_sync`, `attributes`) are left empty; they
    /// are filled by the attribute resolver.
    ///
    /// # Arguments
    /// * `project_id` - Identity of the project entity
    async fn fetch_project_tree(&self, project_id: &TrackingId) -> anyhow::Result<Vec<TrackingEntity>>;

    /// Returns the subset of `object_types` that have a custom attribute
    /// configuration for `attr_key`
    ///
    /// # Arguments
    /// * `attr_key` - Custom attribute key, e.g. `avalon_mongo_id`
    /// * `object_types` - Object type names present in the loaded tree
    async fn fetch_custom_attribute_configs(
        &self,
        attr_key: &str,
        object_types: &[String],
    ) -> anyhow::Result<BTreeSet<String>>;

    /// Reads one custom attribute for many entities
    ///
    /// # Arguments
    /// * `entity_ids` - Entities to read; implementations batch the request
    /// * `attr_key` - Custom attribute key
    async fn read_custom_attribute_bulk(
        &self,
        entity_ids: &[TrackingId],
        attr_key: &str,
    ) -> anyhow::Result<AttributeValues>;

    /// Writes one custom attribute value on one entity
    async fn write_custom_attribute(
        &self,
        entity_id: &TrackingId,
        attr_key: &str,
        value: &serde_json::Value,
    ) -> anyhow::Result<()>;

    /// Creates a Job record in `running` state
    ///
    /// # Arguments
    /// * `project` - Project the job runs for
    /// * `description` - Text shown in the tracking system's job list
    async fn create_job(&self, project: &str, description: &str) -> anyhow::Result<JobHandle>;

    /// Updates the status (and attached payload) of a Job record
    async fn update_job_status(
        &self,
        job: &JobHandle,
        status: JobStatus,
        payload: &JobPayload,
    ) -> anyhow::Result<()>;
}
