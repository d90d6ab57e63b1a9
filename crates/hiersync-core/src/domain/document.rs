//! Asset-database documents
//!
//! An [`AssetDocument`] is one node of the asset database hierarchy: either
//! the unique project document or an asset under it. The document layout
//! follows the pipeline's document store (`_id`, `type`, `name`, `data.*`).
//!
//! [`AssetDiff`] is the minimal update computed by the synchronizer. Only
//! fields that actually differ are set, so an unchanged entity produces an
//! empty diff and no database write.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::entity::TaskInfo;
use super::newtypes::{AssetId, TrackingId};

/// Kind of document stored in the asset database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Project,
    Asset,
}

impl DocumentType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Project => "project",
            DocumentType::Asset => "asset",
        }
    }
}

/// The `data` section of a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetData {
    /// Parent asset; `None` for the project and for top-level assets
    #[serde(default)]
    pub visual_parent: Option<AssetId>,
    /// Ancestor names below the project, for fast path construction
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskInfo>,
    #[serde(default)]
    pub entity_type: String,
    /// Back-reference to the tracking entity
    #[serde(default)]
    pub ftrack_id: Option<TrackingId>,
    /// Project short code; project documents only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Tracked custom attribute values
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// A project or asset document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDocument {
    #[serde(rename = "_id")]
    pub id: AssetId,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub name: String,
    /// Owning project document; `None` for the project itself
    pub parent: Option<AssetId>,
    pub data: AssetData,
}

impl AssetDocument {
    /// Create a project document
    pub fn project(id: AssetId, name: impl Into<String>, data: AssetData) -> Self {
        Self {
            id,
            doc_type: DocumentType::Project,
            name: name.into(),
            parent: None,
            data,
        }
    }

    /// Create an asset document owned by `project_id`
    pub fn asset(id: AssetId, name: impl Into<String>, project_id: AssetId, data: AssetData) -> Self {
        Self {
            id,
            doc_type: DocumentType::Asset,
            name: name.into(),
            parent: Some(project_id),
            data,
        }
    }

    #[must_use]
    pub fn is_project(&self) -> bool {
        self.doc_type == DocumentType::Project
    }

    /// Slash-joined path below the project, including the document name
    #[must_use]
    pub fn path(&self) -> String {
        let mut parts: Vec<&str> = self.data.parents.iter().map(String::as_str).collect();
        parts.push(&self.name);
        parts.join("/")
    }
}

// ============================================================================
// Minimal update diff
// ============================================================================

/// Changed fields between a stored document and its desired state
///
/// `None` means "unchanged". Nullable fields use a nested `Option` so that a
/// value can be cleared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetDiff {
    pub name: Option<String>,
    pub visual_parent: Option<Option<AssetId>>,
    pub parents: Option<Vec<String>>,
    pub tasks: Option<BTreeMap<String, TaskInfo>>,
    pub entity_type: Option<String>,
    pub ftrack_id: Option<Option<TrackingId>>,
    pub code: Option<Option<String>>,
    pub attributes: Option<BTreeMap<String, serde_json::Value>>,
}

impl AssetDiff {
    /// Compute the fields of `desired` that differ from `current`
    ///
    /// Identity, document type and owning project are never part of a diff.
    #[must_use]
    pub fn between(current: &AssetDocument, desired: &AssetDocument) -> Self {
        fn changed<T: PartialEq + Clone>(current: &T, desired: &T) -> Option<T> {
            (current != desired).then(|| desired.clone())
        }

        let (cur, want) = (&current.data, &desired.data);
        Self {
            name: changed(&current.name, &desired.name),
            visual_parent: changed(&cur.visual_parent, &want.visual_parent),
            parents: changed(&cur.parents, &want.parents),
            tasks: changed(&cur.tasks, &want.tasks),
            entity_type: changed(&cur.entity_type, &want.entity_type),
            ftrack_id: changed(&cur.ftrack_id, &want.ftrack_id),
            code: changed(&cur.code, &want.code),
            attributes: changed(&cur.attributes, &want.attributes),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    /// Document paths of the changed fields, e.g. `["name", "data.tasks"]`
    #[must_use]
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.name.is_some() {
            fields.push("name");
        }
        if self.visual_parent.is_some() {
            fields.push("data.visualParent");
        }
        if self.parents.is_some() {
            fields.push("data.parents");
        }
        if self.tasks.is_some() {
            fields.push("data.tasks");
        }
        if self.entity_type.is_some() {
            fields.push("data.entityType");
        }
        if self.ftrack_id.is_some() {
            fields.push("data.ftrackId");
        }
        if self.code.is_some() {
            fields.push("data.code");
        }
        if self.attributes.is_some() {
            fields.push("data.attributes");
        }
        fields
    }

    /// Apply the diff to `doc` in place
    pub fn apply(&self, doc: &mut AssetDocument) {
        if let Some(name) = &self.name {
            doc.name = name.clone();
        }
        let data = &mut doc.data;
        if let Some(visual_parent) = &self.visual_parent {
            data.visual_parent = visual_parent.clone();
        }
        if let Some(parents) = &self.parents {
            data.parents = parents.clone();
        }
        if let Some(tasks) = &self.tasks {
            data.tasks = tasks.clone();
        }
        if let Some(entity_type) = &self.entity_type {
            data.entity_type = entity_type.clone();
        }
        if let Some(ftrack_id) = &self.ftrack_id {
            data.ftrack_id = ftrack_id.clone();
        }
        if let Some(code) = &self.code {
            data.code = code.clone();
        }
        if let Some(attributes) = &self.attributes {
            data.attributes = attributes.clone();
        }
    }
}
