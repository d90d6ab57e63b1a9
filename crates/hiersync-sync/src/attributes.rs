//! Custom attribute resolver
//!
//! Checks which object types carry the id attribute configuration and
//! batch-reads the custom attributes the pipeline needs:
//!
//! - the asset database id (`sync.id_attribute`) into `synced_id`
//! - the ignore flag (`sync.ignore_attribute`) into `ignore_sync`
//! - every tracked attribute into `attributes`
//!
//! Each attribute key is read with a single bulk call over all entities.
//! Tracked attributes are hierarchical: an entity without its own value
//! takes the value of its nearest ancestor that has one.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::{Number, Value};
use tracing::{debug, info, warn};

use hiersync_conflict::HierarchyIndex;
use hiersync_core::config::SyncConfig;
use hiersync_core::domain::{
    EntityRef, ReportBuilder, ReportKind, TrackingEntity, TrackingId, TrackingTree,
};
use hiersync_core::ports::ITrackingSystem;

use crate::SyncError;

/// Outcome of attribute resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeResolution {
    /// Object types without the id attribute configuration; their entities
    /// are matched by name only and never written
    pub excluded_object_types: BTreeSet<String>,
}

/// Resolves custom attributes for a loaded tracking tree
pub struct AttributeResolver {
    tracking: Arc<dyn ITrackingSystem + Send + Sync>,
    id_attribute: String,
    ignore_attribute: String,
    tracked_attributes: Vec<String>,
    fps_attributes: BTreeSet<String>,
}

impl AttributeResolver {
    pub fn new(tracking: Arc<dyn ITrackingSystem + Send + Sync>, config: &SyncConfig) -> Self {
        Self {
            tracking,
            id_attribute: config.id_attribute.clone(),
            ignore_attribute: config.ignore_attribute.clone(),
            tracked_attributes: config.tracked_attributes.clone(),
            fps_attributes: config.fps_attributes.iter().cloned().collect(),
        }
    }

    /// Fill `synced_id`, `ignore_sync` and `attributes` on every entity
    ///
    /// # Errors
    /// - `ExternalService` if a bulk read fails
    /// - `HierarchyIntegrity` if the tree cannot be walked from the project
    #[tracing::instrument(skip_all, fields(project = %tree.project.name))]
    pub async fn resolve(
        &self,
        tree: &mut TrackingTree,
        report: &mut ReportBuilder,
    ) -> Result<AttributeResolution, SyncError> {
        let object_types: Vec<String> = tree
            .iter()
            .map(|e| e.object_type.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let configured = self
            .tracking
            .fetch_custom_attribute_configs(&self.id_attribute, &object_types)
            .await
            .map_err(SyncError::external("Could not read custom attribute configurations"))?;

        let excluded_object_types: BTreeSet<String> = object_types
            .iter()
            .filter(|t| !configured.contains(*t))
            .cloned()
            .collect();
        for object_type in &excluded_object_types {
            warn!(object_type = %object_type, attribute = %self.id_attribute, "Missing custom attribute configuration");
            report.push(
                ReportKind::MissingAttributeConfig,
                EntityRef::named(object_type.clone()),
                format!(
                    "Custom attribute \"{}\" is not configured for {}; its entities are not synchronized",
                    self.id_attribute, object_type
                ),
            );
        }

        let ids: Vec<TrackingId> = tree
            .iter()
            .filter(|e| !excluded_object_types.contains(&e.object_type))
            .map(|e| e.id.clone())
            .collect();
        if ids.is_empty() {
            return Ok(AttributeResolution {
                excluded_object_types,
            });
        }

        let synced_ids = self.read(&ids, &self.id_attribute).await?;
        let ignore_flags = self.read(&ids, &self.ignore_attribute).await?;
        for entity in tree.iter_mut() {
            entity.synced_id = synced_ids
                .get(&entity.id)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            entity.ignore_sync = ignore_flags.get(&entity.id).and_then(parse_flag);
        }

        for key in &self.tracked_attributes {
            let values = self.read(&ids, key).await?;
            let is_fps = self.fps_attributes.contains(key);
            for entity in tree.iter_mut() {
                let Some(value) = values.get(&entity.id) else {
                    continue;
                };
                if value.is_null() {
                    continue;
                }
                if !is_fps {
                    entity.attributes.insert(key.clone(), value.clone());
                    continue;
                }
                match convert_fps(value) {
                    Some(fps) => {
                        entity.attributes.insert(key.clone(), fps);
                    }
                    None => report.push(
                        ReportKind::InvalidAttribute,
                        EntityRef::tracking(entity),
                        format!("Value {} of \"{}\" is not a valid frame rate", value, key),
                    ),
                }
            }
        }

        let inherited = inherit_attributes(tree, &self.tracked_attributes)?;

        info!(
            entities = ids.len(),
            excluded_types = excluded_object_types.len(),
            inherited,
            with_synced_id = tree.iter().filter(|e| e.synced_id.is_some()).count(),
            "Resolved custom attributes"
        );
        Ok(AttributeResolution {
            excluded_object_types,
        })
    }

    async fn read(
        &self,
        ids: &[TrackingId],
        key: &str,
    ) -> Result<hiersync_core::ports::AttributeValues, SyncError> {
        let values = self
            .tracking
            .read_custom_attribute_bulk(ids, key)
            .await
            .map_err(SyncError::external(format!(
                "Could not read custom attribute \"{}\"",
                key
            )))?;
        debug!(attribute = key, values = values.len(), "Read custom attribute");
        Ok(values)
    }
}

/// Fill missing tracked attributes from the nearest ancestor
///
/// Walks the tree parent-before-child, so an inherited value is passed on
/// to grandchildren. Returns the number of values inherited.
pub fn inherit_attributes(tree: &mut TrackingTree, keys: &[String]) -> Result<usize, SyncError> {
    if keys.is_empty() {
        return Ok(0);
    }
    let index = HierarchyIndex::build(tree)?;
    let mut nodes: Vec<&mut TrackingEntity> = tree.iter_mut().collect();
    let mut effective: Vec<BTreeMap<String, Value>> = vec![BTreeMap::new(); nodes.len()];
    let mut inherited = 0;

    for &idx in index.order() {
        if let Some(parent) = index.parent(idx) {
            for key in keys {
                if nodes[idx].attributes.contains_key(key) {
                    continue;
                }
                if let Some(value) = effective[parent].get(key) {
                    nodes[idx].attributes.insert(key.clone(), value.clone());
                    inherited += 1;
                }
            }
        }
        effective[idx] = nodes[idx].attributes.clone();
    }
    Ok(inherited)
}

/// Interpret an ignore flag stored as bool, number or string
fn parse_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Frame rate as a JSON number
///
/// Accepts numbers, decimal strings and ratios such as `"24000/1001"`.
pub fn convert_fps(value: &Value) -> Option<Value> {
    let fps = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            match s.split_once('/') {
                Some((num, den)) => {
                    let num: f64 = num.trim().parse().ok()?;
                    let den: f64 = den.trim().parse().ok()?;
                    if den == 0.0 {
                        return None;
                    }
                    num / den
                }
                None => s.parse().ok()?,
            }
        }
        _ => return None,
    };
    if !fps.is_finite() || fps <= 0.0 {
        return None;
    }
    Number::from_f64(fps).map(Value::Number)
}
