//! Entity tree loader
//!
//! Fetches the tracking tree and the asset database tree of one project
//! concurrently. Both sides are read-only here.
//!
//! Task entities are folded into their parent's `tasks` map, and entity
//! types excluded in the configuration are dropped together with their
//! subtrees before anything else sees the tree.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use hiersync_core::domain::{
    DatabaseTree, EntityType, TaskInfo, TrackingEntity, TrackingId, TrackingTree,
};
use hiersync_core::ports::{IAssetDatabase, ITrackingSystem};

use crate::SyncError;

/// Both hierarchies of a project
#[derive(Debug, Clone)]
pub struct LoadedTrees {
    pub tracking: TrackingTree,
    pub database: DatabaseTree,
}

/// Loads the tracking and database trees of a project
pub struct TreeLoader {
    tracking: Arc<dyn ITrackingSystem + Send + Sync>,
    database: Arc<dyn IAssetDatabase + Send + Sync>,
    excluded_types: BTreeSet<EntityType>,
}

impl TreeLoader {
    pub fn new(
        tracking: Arc<dyn ITrackingSystem + Send + Sync>,
        database: Arc<dyn IAssetDatabase + Send + Sync>,
    ) -> Self {
        Self {
            tracking,
            database,
            excluded_types: BTreeSet::new(),
        }
    }

    /// Entity types dropped (with their subtrees) at load time
    #[must_use]
    pub fn with_excluded_types(mut self, types: impl IntoIterator<Item = EntityType>) -> Self {
        self.excluded_types = types.into_iter().collect();
        self
    }

    /// Load both trees of `project_name`
    ///
    /// # Errors
    /// - `ProjectNotFound` if the tracking system has no such project
    /// - `ExternalService` if either system cannot be queried
    /// - `HierarchyIntegrity` if a task's parent is missing
    #[tracing::instrument(skip(self))]
    pub async fn load(&self, project_name: &str) -> Result<LoadedTrees, SyncError> {
        let (tracking, database) = tokio::try_join!(
            self.load_tracking(project_name),
            self.load_database(project_name)
        )?;

        info!(
            tracking_entities = tracking.len(),
            database_assets = database.assets.len(),
            database_project = database.project.is_some(),
            "Loaded project trees"
        );
        Ok(LoadedTrees { tracking, database })
    }

    async fn load_tracking(&self, project_name: &str) -> Result<TrackingTree, SyncError> {
        let project = self
            .tracking
            .find_project(project_name)
            .await
            .map_err(SyncError::external("Could not look up the project in the tracking system"))?
            .ok_or_else(|| SyncError::ProjectNotFound(project_name.to_string()))?;

        let entities = self
            .tracking
            .fetch_project_tree(&project.id)
            .await
            .map_err(SyncError::external("Could not load the tracking hierarchy"))?;

        build_tracking_tree(project, entities, &self.excluded_types)
    }

    async fn load_database(&self, project_name: &str) -> Result<DatabaseTree, SyncError> {
        let project = self
            .database
            .find_project(project_name)
            .await
            .map_err(SyncError::external("Could not look up the project in the asset database"))?;

        let Some(project) = project else {
            debug!(project = project_name, "No project document yet");
            return Ok(DatabaseTree::empty());
        };
        let assets = self
            .database
            .find_tree(&project.id)
            .await
            .map_err(SyncError::external("Could not load the asset database hierarchy"))?;
        Ok(DatabaseTree::new(project, assets))
    }
}

/// Assemble a [`TrackingTree`] from the raw project descendants
///
/// Keeps document order for the remaining entities.
pub fn build_tracking_tree(
    project: TrackingEntity,
    entities: Vec<TrackingEntity>,
    excluded_types: &BTreeSet<EntityType>,
) -> Result<TrackingTree, SyncError> {
    let entities: Vec<TrackingEntity> = entities
        .into_iter()
        .filter(|e| e.id != project.id)
        .collect();

    let dropped = excluded_subtrees(&entities, excluded_types);
    if !dropped.is_empty() {
        debug!(count = dropped.len(), "Dropped entities of excluded types");
    }

    let parent_of: HashMap<&TrackingId, Option<&TrackingId>> = entities
        .iter()
        .map(|e| (&e.id, e.parent_id.as_ref()))
        .collect();
    let is_task: HashSet<&TrackingId> = entities
        .iter()
        .filter(|e| e.entity_type.is_task())
        .map(|e| &e.id)
        .collect();

    // Owner of each task: the nearest non-task ancestor
    let mut folded: Vec<(TrackingId, String, TaskInfo)> = Vec::new();
    for task in entities
        .iter()
        .filter(|e| e.entity_type.is_task() && !dropped.contains(&e.id))
    {
        let mut owner = task.parent_id.as_ref();
        let mut hops = 0;
        while let Some(id) = owner.filter(|id| is_task.contains(id)) {
            hops += 1;
            if hops > entities.len() {
                return Err(SyncError::HierarchyIntegrity(format!(
                    "task {} ({}) is part of a parent cycle",
                    task.name, task.id
                )));
            }
            owner = parent_of.get(id).copied().flatten();
        }
        let Some(owner) = owner.filter(|id| **id == project.id || parent_of.contains_key(id)) else {
            return Err(SyncError::HierarchyIntegrity(format!(
                "parent of task {} ({}) is not part of the project tree",
                task.name, task.id
            )));
        };
        let info = TaskInfo::new(task.task_type.clone().unwrap_or_default());
        folded.push((owner.clone(), task.name.clone(), info));
    }

    let mut project = project;
    let mut kept: Vec<TrackingEntity> = entities
        .into_iter()
        .filter(|e| !e.entity_type.is_task() && !dropped.contains(&e.id))
        .collect();

    let positions: HashMap<TrackingId, usize> = kept
        .iter()
        .enumerate()
        .map(|(i, e)| (e.id.clone(), i))
        .collect();
    for (owner, name, info) in folded {
        if owner == project.id {
            project.tasks.insert(name, info);
        } else if let Some(&i) = positions.get(&owner) {
            kept[i].tasks.insert(name, info);
        }
    }

    Ok(TrackingTree::new(project, kept))
}

/// Ids of excluded-type entities and everything below them
fn excluded_subtrees(
    entities: &[TrackingEntity],
    excluded_types: &BTreeSet<EntityType>,
) -> HashSet<TrackingId> {
    let mut dropped: HashSet<TrackingId> = entities
        .iter()
        .filter(|e| excluded_types.contains(&e.entity_type))
        .map(|e| e.id.clone())
        .collect();
    if dropped.is_empty() {
        return dropped;
    }

    loop {
        let before = dropped.len();
        for entity in entities {
            let under_dropped = entity
                .parent_id
                .as_ref()
                .is_some_and(|p| dropped.contains(p));
            if under_dropped {
                dropped.insert(entity.id.clone());
            }
        }
        if dropped.len() == before {
            return dropped;
        }
    }
}
