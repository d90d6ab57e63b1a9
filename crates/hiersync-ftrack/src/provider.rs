//! FtrackTrackingSystem - ITrackingSystem implementation for ftrack
//!
//! Wraps the [`FtrackClient`] and translates the port contract into query
//! expressions and batched operations.
//!
//! ## Design Notes
//!
//! - Writing a custom attribute needs the configuration id for the entity's
//!   object type. Object types seen while loading the tree and the
//!   configurations fetched by the resolver are cached behind a
//!   `tokio::sync::Mutex` because port methods take `&self`.
//! - `in (...)` filters are sent in chunks of [`ID_CHUNK_SIZE`] ids.

use std::collections::{BTreeSet, HashMap};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use hiersync_core::domain::{
    EntityType, JobHandle, JobPayload, JobStatus, TrackingEntity, TrackingId,
};
use hiersync_core::ports::{AttributeValues, ITrackingSystem};

use crate::client::{quote, FtrackClient};
use crate::FtrackError;

/// Maximum number of ids in one `in (...)` filter
pub const ID_CHUNK_SIZE: usize = 200;

/// Object type name ftrack uses for projects in attribute configurations
const PROJECT_CONFIG_ENTITY: &str = "show";

// ============================================================================
// ftrack row types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ProjectRow {
    id: String,
    full_name: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct LinkRow {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ContextRow {
    #[serde(rename = "__entity_type__")]
    entity_type: Option<String>,
    id: String,
    name: String,
    parent_id: Option<String>,
    object_type: Option<NamedRef>,
    #[serde(rename = "type")]
    task_type: Option<NamedRef>,
    #[serde(default)]
    link: Vec<LinkRow>,
}

#[derive(Debug, Deserialize)]
struct AttributeConfigRow {
    id: String,
    entity_type: String,
    object_type: Option<NamedRef>,
}

#[derive(Debug, Deserialize)]
struct AttributeValueRow {
    entity_id: String,
    #[serde(default)]
    value: Value,
}

fn rows<T: for<'de> Deserialize<'de>>(data: Vec<Value>, what: &str) -> Result<Vec<T>> {
    data.into_iter()
        .map(|row| {
            serde_json::from_value(row)
                .map_err(|e| FtrackError::InvalidResponse(format!("{} row: {}", what, e)))
        })
        .collect::<Result<Vec<T>, FtrackError>>()
        .map_err(Into::into)
}

// ============================================================================
// Cache
// ============================================================================

#[derive(Debug, Default)]
struct Cache {
    /// Object type name per entity
    object_types: HashMap<TrackingId, String>,
    /// attribute key -> object type name -> configuration id
    configurations: HashMap<String, HashMap<String, String>>,
    user_id: Option<String>,
}

// ============================================================================
// FtrackTrackingSystem
// ============================================================================

/// ftrack-backed implementation of the tracking system port
pub struct FtrackTrackingSystem {
    client: FtrackClient,
    cache: Mutex<Cache>,
}

impl FtrackTrackingSystem {
    pub fn new(client: FtrackClient) -> Self {
        Self {
            client,
            cache: Mutex::new(Cache::default()),
        }
    }

    pub fn client(&self) -> &FtrackClient {
        &self.client
    }

    /// Load (or return cached) configuration ids of an attribute key
    async fn configurations(&self, attr_key: &str) -> Result<HashMap<String, String>> {
        if let Some(cached) = self.cache.lock().await.configurations.get(attr_key) {
            return Ok(cached.clone());
        }

        let data = self
            .client
            .query(&format!(
                "select id, key, entity_type, object_type.name \
                 from CustomAttributeConfiguration where key is {}",
                quote(attr_key)
            ))
            .await?;

        let mut by_object_type = HashMap::new();
        for row in rows::<AttributeConfigRow>(data, "CustomAttributeConfiguration")? {
            let object_type = if row.entity_type == PROJECT_CONFIG_ENTITY {
                Some(EntityType::Project.name().to_string())
            } else {
                row.object_type.map(|o| o.name)
            };
            if let Some(object_type) = object_type {
                by_object_type.entry(object_type).or_insert(row.id);
            }
        }
        debug!(attr_key, configured = by_object_type.len(), "Loaded attribute configurations");

        self.cache
            .lock()
            .await
            .configurations
            .insert(attr_key.to_string(), by_object_type.clone());
        Ok(by_object_type)
    }

    async fn object_type_of(&self, entity_id: &TrackingId) -> Result<String> {
        if let Some(object_type) = self.cache.lock().await.object_types.get(entity_id) {
            return Ok(object_type.clone());
        }

        let data = self
            .client
            .query(&format!(
                "select id, name, object_type.name from TypedContext where id is {}",
                quote(entity_id.as_str())
            ))
            .await?;
        let object_type = rows::<ContextRow>(data, "TypedContext")?
            .into_iter()
            .next()
            .and_then(|row| row.object_type)
            .map(|o| o.name)
            .with_context(|| format!("Entity {} not found in ftrack", entity_id))?;

        self.cache
            .lock()
            .await
            .object_types
            .insert(entity_id.clone(), object_type.clone());
        Ok(object_type)
    }

    async fn user_id(&self) -> Result<String> {
        if let Some(id) = &self.cache.lock().await.user_id {
            return Ok(id.clone());
        }

        let data = self
            .client
            .query(&format!(
                "select id from User where username is {}",
                quote(self.client.api_user())
            ))
            .await?;
        let id = data
            .first()
            .and_then(|row| row.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .with_context(|| format!("ftrack user {} not found", self.client.api_user()))?;

        self.cache.lock().await.user_id = Some(id.clone());
        Ok(id)
    }
}

fn entity_from_row(row: ContextRow) -> Result<TrackingEntity> {
    let id = TrackingId::new(row.id.clone())?;
    let declared = row.entity_type.as_deref().unwrap_or_default();
    let object_type = row.object_type.map(|o| o.name);

    let entity_type = EntityType::from_name(declared)
        .or_else(|_| EntityType::from_name(object_type.as_deref().unwrap_or_default()))
        .unwrap_or_else(|_| {
            warn!(entity = %row.name, declared, "Unknown entity type, treating as Folder");
            EntityType::Folder
        });

    let mut entity = TrackingEntity::new(id, row.name, entity_type);
    if let Some(object_type) = object_type {
        entity = entity.with_object_type(object_type);
    }
    if let Some(parent_id) = row.parent_id {
        entity = entity.with_parent(TrackingId::new(parent_id)?);
    }
    if let Some(task_type) = row.task_type {
        entity = entity.with_task_type(task_type.name);
    }
    // The link ends with the entity itself
    let ancestors = row.link.len().saturating_sub(1);
    entity.link_path = row.link.into_iter().take(ancestors).map(|l| l.name).collect();
    Ok(entity)
}

fn string_value(value: &impl serde::Serialize) -> Result<String> {
    serde_json::to_string(value).context("Failed to serialize job data")
}

#[async_trait::async_trait]
impl ITrackingSystem for FtrackTrackingSystem {
    async fn find_project(&self, name: &str) -> Result<Option<TrackingEntity>> {
        let data = self
            .client
            .query(&format!(
                "select id, full_name, name from Project where full_name is {}",
                quote(name)
            ))
            .await?;

        let Some(row) = rows::<ProjectRow>(data, "Project")?.into_iter().next() else {
            return Ok(None);
        };
        let id = TrackingId::new(row.id)?;
        let mut project = TrackingEntity::new(id.clone(), row.full_name, EntityType::Project);
        if let Some(code) = row.name {
            project = project.with_code(code);
        }

        self.cache
            .lock()
            .await
            .object_types
            .insert(id, EntityType::Project.name().to_string());
        Ok(Some(project))
    }

    async fn fetch_project_tree(&self, project_id: &TrackingId) -> Result<Vec<TrackingEntity>> {
        let data = self
            .client
            .query(&format!(
                "select id, name, parent_id, object_type.name, type.name, link \
                 from TypedContext where project_id is {}",
                quote(project_id.as_str())
            ))
            .await?;

        let entities = rows::<ContextRow>(data, "TypedContext")?
            .into_iter()
            .map(entity_from_row)
            .collect::<Result<Vec<_>>>()?;

        let mut cache = self.cache.lock().await;
        for entity in &entities {
            cache
                .object_types
                .insert(entity.id.clone(), entity.object_type.clone());
        }
        debug!(project_id = %project_id, count = entities.len(), "Fetched project tree");
        Ok(entities)
    }

    async fn fetch_custom_attribute_configs(
        &self,
        attr_key: &str,
        object_types: &[String],
    ) -> Result<BTreeSet<String>> {
        let configured = self.configurations(attr_key).await?;
        Ok(object_types
            .iter()
            .filter(|t| configured.contains_key(t.as_str()))
            .cloned()
            .collect())
    }

    async fn read_custom_attribute_bulk(
        &self,
        entity_ids: &[TrackingId],
        attr_key: &str,
    ) -> Result<AttributeValues> {
        let mut values = AttributeValues::new();
        let configuration_ids: BTreeSet<String> = self
            .configurations(attr_key)
            .await?
            .into_values()
            .map(|id| quote(&id))
            .collect();
        if configuration_ids.is_empty() {
            debug!(attr_key, "Attribute is not configured, nothing to read");
            return Ok(values);
        }
        let configuration_filter = configuration_ids.into_iter().collect::<Vec<_>>().join(", ");

        for chunk in entity_ids.chunks(ID_CHUNK_SIZE) {
            let ids: Vec<String> = chunk.iter().map(|id| quote(id.as_str())).collect();
            let data = self
                .client
                .query(&format!(
                    "select entity_id, value from ContextCustomAttributeValue \
                     where configuration_id in ({}) and entity_id in ({})",
                    configuration_filter,
                    ids.join(", ")
                ))
                .await?;

            for row in rows::<AttributeValueRow>(data, "ContextCustomAttributeValue")? {
                if row.value.is_null() {
                    continue;
                }
                values.insert(TrackingId::new(row.entity_id)?, row.value);
            }
        }
        debug!(attr_key, requested = entity_ids.len(), found = values.len(), "Read custom attribute");
        Ok(values)
    }

    async fn write_custom_attribute(
        &self,
        entity_id: &TrackingId,
        attr_key: &str,
        value: &Value,
    ) -> Result<()> {
        let object_type = self.object_type_of(entity_id).await?;
        let configurations = self.configurations(attr_key).await?;
        let configuration_id = configurations.get(&object_type).with_context(|| {
            format!(
                "No configuration of attribute {} for object type {}",
                attr_key, object_type
            )
        })?;

        self.client
            .call(&[json!({
                "action": "update",
                "entity_type": "ContextCustomAttributeValue",
                "entity_key": [configuration_id, entity_id.as_str()],
                "entity_data": { "value": value },
            })])
            .await
            .with_context(|| format!("Failed to write {} on entity {}", attr_key, entity_id))?;

        debug!(entity_id = %entity_id, attr_key, "Wrote custom attribute");
        Ok(())
    }

    async fn create_job(&self, project: &str, description: &str) -> Result<JobHandle> {
        let user_id = self.user_id().await?;
        let job_id = uuid::Uuid::new_v4().to_string();
        let data = string_value(&JobPayload::new(description))?;

        let results = self
            .client
            .call(&[json!({
                "action": "create",
                "entity_type": "Job",
                "entity_data": {
                    "id": job_id,
                    "user_id": user_id,
                    "status": JobStatus::Running.as_str(),
                    "data": data,
                },
            })])
            .await
            .with_context(|| format!("Failed to create job for project {}", project))?;

        let id = results
            .first()
            .and_then(|r| r.pointer("/data/id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(job_id);
        debug!(job_id = %id, project, "Created job");
        Ok(JobHandle::new(id))
    }

    async fn update_job_status(
        &self,
        job: &JobHandle,
        status: JobStatus,
        payload: &JobPayload,
    ) -> Result<()> {
        let data = string_value(payload)?;
        self.client
            .call(&[json!({
                "action": "update",
                "entity_type": "Job",
                "entity_key": [job.id],
                "entity_data": { "status": status.as_str(), "data": data },
            })])
            .await
            .with_context(|| format!("Failed to update job {}", job.id))?;
        Ok(())
    }
}
