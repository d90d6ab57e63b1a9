//! In-memory port mocks shared by the engine tests

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use hiersync_core::config::Config;
use hiersync_core::domain::{
    AssetDiff, AssetDocument, AssetId, EntityType, JobHandle, JobPayload, JobStatus,
    TrackingEntity, TrackingId,
};
use hiersync_core::ports::{AttributeValues, IAssetDatabase, ITrackingSystem};
use hiersync_sync::SyncAction;

pub const ID_ATTRIBUTE: &str = "avalon_mongo_id";
pub const IGNORE_ATTRIBUTE: &str = "avalon_ignore_sync";

pub fn tid(s: &str) -> TrackingId {
    TrackingId::new(s).unwrap()
}

pub fn aid(n: u32) -> AssetId {
    AssetId::new(format!("{:024x}", n)).unwrap()
}

pub fn project() -> TrackingEntity {
    TrackingEntity::new(tid("p"), "Demo", EntityType::Project).with_code("demo")
}

pub fn node(id: &str, name: &str, entity_type: EntityType, parent: &str) -> TrackingEntity {
    TrackingEntity::new(tid(id), name, entity_type).with_parent(tid(parent))
}

pub fn task(id: &str, name: &str, task_type: &str, parent: &str) -> TrackingEntity {
    node(id, name, EntityType::Task, parent).with_task_type(task_type)
}

/// Demo / SEQ01 / SH010 with a "comp" task on the shot
pub fn sample_tree() -> Vec<TrackingEntity> {
    vec![
        node("seq01", "SEQ01", EntityType::Sequence, "p"),
        node("sh010", "SH010", EntityType::Shot, "seq01"),
        task("t1", "comp", "Compositing", "sh010"),
    ]
}

// ============================================================================
// MockTracking
// ============================================================================

/// Tracking system backed by vectors and maps
pub struct MockTracking {
    project: TrackingEntity,
    entities: Mutex<Vec<TrackingEntity>>,
    configured: Mutex<BTreeSet<String>>,
    attributes: Mutex<HashMap<(TrackingId, String), Value>>,
    /// Every successful attribute write
    writes: Mutex<Vec<(TrackingId, String, Value)>>,
    failing_writes: Mutex<HashSet<TrackingId>>,
    /// Job creations (`Running`) and status updates, in call order
    jobs: Mutex<Vec<(JobStatus, Option<JobPayload>)>>,
    fail_job_updates: AtomicBool,
}

impl MockTracking {
    pub fn new(project: TrackingEntity, entities: Vec<TrackingEntity>) -> Self {
        let configured = ["Project", "Episode", "Sequence", "Shot", "Folder", "AssetBuild"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self {
            project,
            entities: Mutex::new(entities),
            configured: Mutex::new(configured),
            attributes: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            failing_writes: Mutex::new(HashSet::new()),
            jobs: Mutex::new(Vec::new()),
            fail_job_updates: AtomicBool::new(false),
        }
    }

    pub fn set_attribute(&self, id: &str, key: &str, value: Value) {
        self.attributes
            .lock()
            .unwrap()
            .insert((tid(id), key.to_string()), value);
    }

    pub fn attribute(&self, id: &str, key: &str) -> Option<Value> {
        self.attributes
            .lock()
            .unwrap()
            .get(&(tid(id), key.to_string()))
            .cloned()
    }

    pub fn rename(&self, id: &str, name: &str) {
        for entity in self.entities.lock().unwrap().iter_mut() {
            if entity.id.as_str() == id {
                entity.name = name.to_string();
            }
        }
    }

    /// Add an entity at `position` in fetch order
    pub fn insert_entity(&self, position: usize, entity: TrackingEntity) {
        self.entities.lock().unwrap().insert(position, entity);
    }

    pub fn remove(&self, id: &str) {
        self.entities.lock().unwrap().retain(|e| e.id.as_str() != id);
    }

    pub fn unconfigure(&self, object_type: &str) {
        self.configured.lock().unwrap().remove(object_type);
    }

    pub fn fail_writes_for(&self, id: &str) {
        self.failing_writes.lock().unwrap().insert(tid(id));
    }

    pub fn fail_job_updates(&self) {
        self.fail_job_updates.store(true, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<(TrackingId, String, Value)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn jobs(&self) -> Vec<(JobStatus, Option<JobPayload>)> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ITrackingSystem for MockTracking {
    async fn find_project(&self, name: &str) -> anyhow::Result<Option<TrackingEntity>> {
        Ok((self.project.name == name).then(|| self.project.clone()))
    }

    async fn fetch_project_tree(&self, project_id: &TrackingId) -> anyhow::Result<Vec<TrackingEntity>> {
        anyhow::ensure!(*project_id == self.project.id, "unknown project {}", project_id);
        Ok(self.entities.lock().unwrap().clone())
    }

    async fn fetch_custom_attribute_configs(
        &self,
        _attr_key: &str,
        object_types: &[String],
    ) -> anyhow::Result<BTreeSet<String>> {
        let configured = self.configured.lock().unwrap();
        Ok(object_types
            .iter()
            .filter(|t| configured.contains(*t))
            .cloned()
            .collect())
    }

    async fn read_custom_attribute_bulk(
        &self,
        entity_ids: &[TrackingId],
        attr_key: &str,
    ) -> anyhow::Result<AttributeValues> {
        let attributes = self.attributes.lock().unwrap();
        Ok(entity_ids
            .iter()
            .filter_map(|id| {
                attributes
                    .get(&(id.clone(), attr_key.to_string()))
                    .map(|v| (id.clone(), v.clone()))
            })
            .collect())
    }

    async fn write_custom_attribute(
        &self,
        entity_id: &TrackingId,
        attr_key: &str,
        value: &Value,
    ) -> anyhow::Result<()> {
        if self.failing_writes.lock().unwrap().contains(entity_id) {
            anyhow::bail!("permission denied on {}", entity_id);
        }
        self.attributes
            .lock()
            .unwrap()
            .insert((entity_id.clone(), attr_key.to_string()), value.clone());
        self.writes
            .lock()
            .unwrap()
            .push((entity_id.clone(), attr_key.to_string(), value.clone()));
        Ok(())
    }

    async fn create_job(&self, _project: &str, _description: &str) -> anyhow::Result<JobHandle> {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.push((JobStatus::Running, None));
        Ok(JobHandle::new(format!("job-{}", jobs.len())))
    }

    async fn update_job_status(
        &self,
        _job: &JobHandle,
        status: JobStatus,
        payload: &JobPayload,
    ) -> anyhow::Result<()> {
        if self.fail_job_updates.load(Ordering::SeqCst) {
            anyhow::bail!("job service unavailable");
        }
        self.jobs.lock().unwrap().push((status, Some(payload.clone())));
        Ok(())
    }
}

// ============================================================================
// MockDatabase
// ============================================================================

/// One database write, in call order
#[derive(Debug, Clone, PartialEq)]
pub enum DbWrite {
    Insert(AssetId),
    Update(AssetId, Vec<&'static str>),
}

/// Asset database backed by a vector
#[derive(Default)]
pub struct MockDatabase {
    docs: Mutex<Vec<AssetDocument>>,
    log: Mutex<Vec<DbWrite>>,
    failing_names: Mutex<HashSet<String>>,
    /// Token cancelled once the named document has been inserted
    cancel_after: Mutex<Option<(String, CancellationToken)>>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes_for(&self, name: &str) {
        self.failing_names.lock().unwrap().insert(name.to_string());
    }

    pub fn cancel_after_insert(&self, name: &str, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((name.to_string(), token));
    }

    pub fn docs(&self) -> Vec<AssetDocument> {
        self.docs.lock().unwrap().clone()
    }

    pub fn doc_named(&self, name: &str) -> Option<AssetDocument> {
        self.docs().into_iter().find(|d| d.name == name)
    }

    pub fn log(&self) -> Vec<DbWrite> {
        self.log.lock().unwrap().clone()
    }

    /// Store a document without logging a write
    pub fn seed(&self, doc: AssetDocument) {
        self.docs.lock().unwrap().push(doc);
    }
}

#[async_trait]
impl IAssetDatabase for MockDatabase {
    async fn find_project(&self, name: &str) -> anyhow::Result<Option<AssetDocument>> {
        Ok(self
            .docs()
            .into_iter()
            .find(|d| d.is_project() && d.name == name))
    }

    async fn find_tree(&self, project_id: &AssetId) -> anyhow::Result<Vec<AssetDocument>> {
        Ok(self
            .docs()
            .into_iter()
            .filter(|d| d.parent.as_ref() == Some(project_id))
            .collect())
    }

    async fn insert(&self, document: &AssetDocument) -> anyhow::Result<AssetId> {
        if self.failing_names.lock().unwrap().contains(&document.name) {
            anyhow::bail!("write rejected for {}", document.name);
        }
        let mut docs = self.docs.lock().unwrap();
        anyhow::ensure!(
            docs.iter().all(|d| d.id != document.id),
            "duplicate id {}",
            document.id
        );
        docs.push(document.clone());
        self.log
            .lock()
            .unwrap()
            .push(DbWrite::Insert(document.id.clone()));
        if let Some((name, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if *name == document.name {
                token.cancel();
            }
        }
        Ok(document.id.clone())
    }

    async fn update(&self, id: &AssetId, diff: &AssetDiff) -> anyhow::Result<()> {
        let mut docs = self.docs.lock().unwrap();
        let doc = docs
            .iter_mut()
            .find(|d| d.id == *id)
            .ok_or_else(|| anyhow::anyhow!("document {} not found", id))?;
        if self.failing_names.lock().unwrap().contains(&doc.name) {
            anyhow::bail!("write rejected for {}", doc.name);
        }
        diff.apply(doc);
        self.log
            .lock()
            .unwrap()
            .push(DbWrite::Update(id.clone(), diff.changed_fields()));
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub tracking: Arc<MockTracking>,
    pub database: Arc<MockDatabase>,
}

impl Harness {
    pub fn new(entities: Vec<TrackingEntity>) -> Self {
        Self {
            tracking: Arc::new(MockTracking::new(project(), entities)),
            database: Arc::new(MockDatabase::new()),
        }
    }

    pub fn action(&self) -> SyncAction {
        self.action_with(&Config::default())
    }

    pub fn action_with(&self, config: &Config) -> SyncAction {
        SyncAction::new(self.tracking.clone(), self.database.clone(), config).unwrap()
    }
}
