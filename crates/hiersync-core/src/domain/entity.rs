//! Tracking-system entities
//!
//! A [`TrackingEntity`] is one node of the tracking system's project tree as
//! fetched at the start of a run. Entities are a read-only snapshot; the only
//! field the pipeline records afterwards is the `synced_id` write-back result.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::TrackingId;

/// Closed set of tracking entity types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    Project,
    Episode,
    Sequence,
    Shot,
    Folder,
    AssetBuild,
    Task,
    Milestone,
    Library,
}

impl EntityType {
    /// All variants, in declaration order
    pub const ALL: [EntityType; 9] = [
        EntityType::Project,
        EntityType::Episode,
        EntityType::Sequence,
        EntityType::Shot,
        EntityType::Folder,
        EntityType::AssetBuild,
        EntityType::Task,
        EntityType::Milestone,
        EntityType::Library,
    ];

    /// Canonical name, as stored in `data.entityType`
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            EntityType::Project => "Project",
            EntityType::Episode => "Episode",
            EntityType::Sequence => "Sequence",
            EntityType::Shot => "Shot",
            EntityType::Folder => "Folder",
            EntityType::AssetBuild => "AssetBuild",
            EntityType::Task => "Task",
            EntityType::Milestone => "Milestone",
            EntityType::Library => "Library",
        }
    }

    /// Parse a type name; spaces and case are ignored (`"Asset Build"` works)
    pub fn from_name(name: &str) -> Result<Self, DomainError> {
        let compact: String = name
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();

        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name().to_ascii_lowercase() == compact)
            .ok_or_else(|| DomainError::UnknownEntityType(name.to_string()))
    }

    #[must_use]
    pub fn is_project(&self) -> bool {
        matches!(self, EntityType::Project)
    }

    #[must_use]
    pub fn is_task(&self) -> bool {
        matches!(self, EntityType::Task)
    }
}

impl Display for EntityType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for EntityType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// A task attached to an entity, as stored in `data.tasks`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    #[serde(rename = "type")]
    pub task_type: String,
}

impl TaskInfo {
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
        }
    }
}

/// A node of the tracking system's project tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEntity {
    /// Stable external identity
    pub id: TrackingId,
    /// Entity name; for the project this is the full project name
    pub name: String,
    pub entity_type: EntityType,
    /// `None` only for the project root
    pub parent_id: Option<TrackingId>,
    /// Sub-classification selecting the custom attribute configuration
    pub object_type: String,
    /// Current value of the "mongo id" custom attribute
    pub synced_id: Option<String>,
    /// Ancestor names from the project root, excluding the entity itself
    pub link_path: Vec<String>,
    /// Explicit "ignore sync" flag; `None` inherits from the parent
    pub ignore_sync: Option<bool>,
    /// Tracked custom attribute values mirrored into the asset document
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Tasks folded in from child Task entities
    pub tasks: BTreeMap<String, TaskInfo>,
    /// Task type name; only set on Task entities
    pub task_type: Option<String>,
    /// Project short code; only set on the project root
    pub code: Option<String>,
}

impl TrackingEntity {
    /// Create an entity with no parent and the object type equal to the entity type
    pub fn new(id: TrackingId, name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            id,
            name: name.into(),
            entity_type,
            parent_id: None,
            object_type: entity_type.name().to_string(),
            synced_id: None,
            link_path: Vec::new(),
            ignore_sync: None,
            attributes: BTreeMap::new(),
            tasks: BTreeMap::new(),
            task_type: None,
            code: None,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id: TrackingId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    #[must_use]
    pub fn with_object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = object_type.into();
        self
    }

    #[must_use]
    pub fn with_synced_id(mut self, synced_id: impl Into<String>) -> Self {
        self.synced_id = Some(synced_id.into());
        self
    }

    #[must_use]
    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_ignore_sync(mut self, ignore: bool) -> Self {
        self.ignore_sync = Some(ignore);
        self
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.entity_type.is_project()
    }

    /// Non-empty `synced_id`, trimmed
    #[must_use]
    pub fn synced_id(&self) -> Option<&str> {
        self.synced_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Slash-joined path from the project root, including the entity name
    #[must_use]
    pub fn path(&self) -> String {
        let mut parts: Vec<&str> = self.link_path.iter().map(String::as_str).collect();
        parts.push(&self.name);
        parts.join("/")
    }
}
