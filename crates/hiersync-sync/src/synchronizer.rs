//! Synchronizer
//!
//! Applies reconciled pairs to the asset database in parent-before-child
//! order and writes new database ids back to the tracking system.
//!
//! ## Write rules
//!
//! - `create` inserts a document; `update` writes only the changed fields
//! - `conflict`, `skip-ignored` and removal candidates write nothing
//! - A pair whose parent has no database id is skipped
//! - A failed asset write is reported and its siblings continue
//! - A failed project write aborts the run
//!
//! The id write-back is best-effort: a failure is reported, the database
//! write stays.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hiersync_core::domain::{
    AssetData, AssetDiff, AssetDocument, AssetId, PairStatus, ReportBuilder, SkipReason, SyncPair,
    TrackingEntity, TrackingId,
};
use hiersync_core::ports::{IAssetDatabase, ITrackingSystem};

use crate::SyncError;

// ============================================================================
// SyncStats
// ============================================================================

/// Counters of one synchronization run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub created: u32,
    pub updated: u32,
    /// Matched documents that were already up to date
    pub unchanged: u32,
    pub skipped: u32,
    pub conflicts: u32,
    /// Failed database writes
    pub failed: u32,
    pub write_backs: u32,
    pub write_back_failures: u32,
    pub removal_candidates: u32,
}

impl SyncStats {
    /// Number of database writes performed
    #[must_use]
    pub fn writes(&self) -> u32 {
        self.created + self.updated
    }
}

// ============================================================================
// Synchronizer
// ============================================================================

/// Ordered writer for reconciled pairs
pub struct Synchronizer {
    tracking: Arc<dyn ITrackingSystem + Send + Sync>,
    database: Arc<dyn IAssetDatabase + Send + Sync>,
    id_attribute: String,
    cancel: CancellationToken,
}

/// Ids known while walking the pairs
#[derive(Default)]
struct WalkState {
    /// Database id of every tracking entity that has a document
    known: HashMap<TrackingId, AssetId>,
    /// Ids already present in the database
    taken: HashSet<AssetId>,
    project_id: Option<AssetId>,
    project_tracking_id: Option<TrackingId>,
}

impl Synchronizer {
    pub fn new(
        tracking: Arc<dyn ITrackingSystem + Send + Sync>,
        database: Arc<dyn IAssetDatabase + Send + Sync>,
        id_attribute: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tracking,
            database,
            id_attribute: id_attribute.into(),
            cancel,
        }
    }

    /// Apply `pairs` in order
    ///
    /// `pairs` must start with the project pair and list parents before
    /// children, siblings next to each other, as produced by the hierarchy
    /// differ. Pairs are updated in place with the written documents.
    ///
    /// # Errors
    /// - `HierarchyIntegrity` if the project document cannot be written
    /// - `Cancelled` if the token fires between sibling groups
    #[tracing::instrument(skip_all, fields(pairs = pairs.len()))]
    pub async fn apply(
        &self,
        pairs: &mut [SyncPair],
        report: &mut ReportBuilder,
    ) -> Result<SyncStats, SyncError> {
        let mut stats = SyncStats::default();
        let mut state = WalkState::default();
        for pair in pairs.iter() {
            if let Some(doc) = &pair.database {
                state.taken.insert(doc.id.clone());
                if let Some(tracking_id) = pair.tracking_id() {
                    state.known.insert(tracking_id.clone(), doc.id.clone());
                }
            }
        }

        let mut current_group: Option<Option<TrackingId>> = None;
        for pair in pairs.iter_mut() {
            let group = pair.tracking.as_ref().map(|t| t.parent_id.clone());
            if let Some(group) = group {
                if current_group.as_ref() != Some(&group) {
                    if self.cancel.is_cancelled() {
                        warn!(written = stats.writes(), "Synchronization cancelled");
                        return Err(SyncError::Cancelled);
                    }
                    current_group = Some(group);
                }
            }

            match pair.status {
                PairStatus::Conflict => stats.conflicts += 1,
                PairStatus::SkipIgnored => stats.skipped += 1,
                PairStatus::RemovalCandidate => stats.removal_candidates += 1,
                PairStatus::Create | PairStatus::Update => {
                    let is_project = pair.tracking.as_ref().is_some_and(TrackingEntity::is_root);
                    if is_project {
                        self.apply_project(pair, &mut state, &mut stats, report).await?;
                    } else {
                        self.apply_asset(pair, &mut state, &mut stats, report).await;
                    }
                }
            }
        }

        info!(
            created = stats.created,
            updated = stats.updated,
            unchanged = stats.unchanged,
            skipped = stats.skipped,
            conflicts = stats.conflicts,
            failed = stats.failed,
            write_backs = stats.write_backs,
            "Synchronization applied"
        );
        Ok(stats)
    }

    // ------------------------------------------------------------------------
    // Project
    // ------------------------------------------------------------------------

    async fn apply_project(
        &self,
        pair: &mut SyncPair,
        state: &mut WalkState,
        stats: &mut SyncStats,
        report: &mut ReportBuilder,
    ) -> Result<(), SyncError> {
        let Some(entity) = pair.tracking.clone() else {
            return Ok(());
        };
        state.project_tracking_id = Some(entity.id.clone());

        let id = match pair.database.take() {
            None => {
                let id = fresh_id(&entity, &state.taken);
                let doc = AssetDocument::project(id.clone(), entity.name.clone(), project_data(&entity));
                self.database.insert(&doc).await.map_err(|e| {
                    SyncError::HierarchyIntegrity(format!(
                        "project document {} could not be created: {:#}",
                        entity.name, e
                    ))
                })?;
                info!(project = %entity.name, id = %id, "Created project document");
                stats.created += 1;
                pair.database = Some(doc);
                id
            }
            Some(mut current) => {
                let mut desired = current.clone();
                desired.name = entity.name.clone();
                desired.data = project_data(&entity);
                desired.data.attributes = merged_attributes(&current, &entity);

                let diff = AssetDiff::between(&current, &desired);
                if diff.is_empty() {
                    stats.unchanged += 1;
                } else {
                    self.database.update(&current.id, &diff).await.map_err(|e| {
                        SyncError::HierarchyIntegrity(format!(
                            "project document {} could not be updated: {:#}",
                            entity.name, e
                        ))
                    })?;
                    debug!(project = %entity.name, fields = ?diff.changed_fields(), "Updated project document");
                    diff.apply(&mut current);
                    stats.updated += 1;
                }
                let id = current.id.clone();
                pair.database = Some(current);
                id
            }
        };

        state.taken.insert(id.clone());
        state.known.insert(entity.id.clone(), id.clone());
        state.project_id = Some(id.clone());

        if pair.needs_write_back || entity.synced_id() != Some(id.as_str()) {
            self.write_back(pair, &id, stats, report).await;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Assets
    // ------------------------------------------------------------------------

    async fn apply_asset(
        &self,
        pair: &mut SyncPair,
        state: &mut WalkState,
        stats: &mut SyncStats,
        report: &mut ReportBuilder,
    ) {
        let Some(entity) = pair.tracking.clone() else {
            return;
        };

        let Some((project_id, visual_parent)) = resolve_parent(&entity, state) else {
            pair.mark_skipped(SkipReason::UnsyncedParent);
            stats.skipped += 1;
            report.info(
                pair.entity_ref(),
                "Skipped: the parent has no asset database document",
            );
            debug!(entity = %entity.path(), "Parent not synchronized, skipping");
            return;
        };

        let mut data = asset_data(&entity);
        data.visual_parent = visual_parent;

        match pair.database.take() {
            None => {
                let id = fresh_id(&entity, &state.taken);
                let doc = AssetDocument::asset(id.clone(), entity.name.clone(), project_id, data);
                if let Err(e) = self.database.insert(&doc).await {
                    warn!(entity = %entity.path(), error = %e, "Failed to create asset document");
                    report.write_failed(
                        pair.entity_ref(),
                        format!("Could not create the asset document: {:#}", e),
                    );
                    stats.failed += 1;
                    return;
                }
                debug!(entity = %entity.path(), id = %id, "Created asset document");
                stats.created += 1;
                state.taken.insert(id.clone());
                state.known.insert(entity.id.clone(), id.clone());
                pair.database = Some(doc);

                if entity.synced_id() != Some(id.as_str()) {
                    self.write_back(pair, &id, stats, report).await;
                }
            }
            Some(mut current) => {
                let mut desired = current.clone();
                desired.name = entity.name.clone();
                data.attributes = merged_attributes(&current, &entity);
                desired.data = data;

                let diff = AssetDiff::between(&current, &desired);
                if diff.is_empty() {
                    stats.unchanged += 1;
                } else {
                    let result = self.database.update(&current.id, &diff).await;
                    if let Err(e) = result {
                        warn!(entity = %entity.path(), error = %e, "Failed to update asset document");
                        pair.database = Some(current);
                        report.write_failed(
                            pair.entity_ref(),
                            format!("Could not update the asset document: {:#}", e),
                        );
                        stats.failed += 1;
                        return;
                    }
                    debug!(entity = %entity.path(), fields = ?diff.changed_fields(), "Updated asset document");
                    diff.apply(&mut current);
                    stats.updated += 1;
                }

                let id = current.id.clone();
                pair.database = Some(current);
                if pair.needs_write_back {
                    self.write_back(pair, &id, stats, report).await;
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Id write-back
    // ------------------------------------------------------------------------

    async fn write_back(
        &self,
        pair: &mut SyncPair,
        id: &AssetId,
        stats: &mut SyncStats,
        report: &mut ReportBuilder,
    ) {
        let Some(entity) = pair.tracking.as_mut() else {
            return;
        };
        let value = Value::String(id.as_str().to_string());
        match self
            .tracking
            .write_custom_attribute(&entity.id, &self.id_attribute, &value)
            .await
        {
            Ok(()) => {
                entity.synced_id = Some(id.as_str().to_string());
                pair.needs_write_back = false;
                stats.write_backs += 1;
            }
            Err(e) => {
                warn!(entity = %entity.path(), error = %e, "Failed to write back asset id");
                stats.write_back_failures += 1;
                report.write_failed(
                    pair.entity_ref(),
                    format!(
                        "Could not store the asset id in \"{}\": {:#}",
                        self.id_attribute, e
                    ),
                );
            }
        }
    }
}

// ============================================================================
// Document construction
// ============================================================================

/// Owning project and visual parent of an asset, if both are known
fn resolve_parent(entity: &TrackingEntity, state: &WalkState) -> Option<(AssetId, Option<AssetId>)> {
    let project_id = state.project_id.clone()?;
    let parent_id = entity.parent_id.as_ref()?;
    if state.project_tracking_id.as_ref() == Some(parent_id) {
        return Some((project_id, None));
    }
    let visual_parent = state.known.get(parent_id)?.clone();
    Some((project_id, Some(visual_parent)))
}

/// Reuse a well-formed unused `synced_id`, otherwise generate a new id
fn fresh_id(entity: &TrackingEntity, taken: &HashSet<AssetId>) -> AssetId {
    entity
        .synced_id()
        .and_then(|s| AssetId::new(s).ok())
        .filter(|id| !taken.contains(id))
        .unwrap_or_else(AssetId::generate)
}

fn asset_data(entity: &TrackingEntity) -> AssetData {
    AssetData {
        visual_parent: None,
        parents: entity.link_path.iter().skip(1).cloned().collect(),
        tasks: entity.tasks.clone(),
        entity_type: entity.entity_type.name().to_string(),
        ftrack_id: Some(entity.id.clone()),
        code: None,
        attributes: entity.attributes.clone(),
    }
}

fn project_data(entity: &TrackingEntity) -> AssetData {
    AssetData {
        parents: Vec::new(),
        code: entity.code.clone(),
        ..asset_data(entity)
    }
}

/// Stored attributes overlaid with the tracked values
fn merged_attributes(
    current: &AssetDocument,
    entity: &TrackingEntity,
) -> std::collections::BTreeMap<String, Value> {
    let mut attributes = current.data.attributes.clone();
    attributes.extend(entity.attributes.clone());
    attributes
}
