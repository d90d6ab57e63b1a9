//! Synchronization report
//!
//! Every component of the pipeline pushes typed messages into a shared
//! [`ReportBuilder`]. The finished [`Report`] is immutable and is handed to
//! the invoking UI, which renders it grouped by [`ReportKind`].

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use super::document::AssetDocument;
use super::entity::TrackingEntity;
use super::newtypes::{AssetId, TrackingId};

/// Type of a report message
///
/// Declaration order is the rendering order of the groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    InvalidName,
    DuplicateName,
    MissingAttributeConfig,
    InvalidAttribute,
    WriteFailed,
    Info,
}

impl ReportKind {
    /// Machine-readable name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ReportKind::InvalidName => "invalid_name",
            ReportKind::DuplicateName => "duplicate_name",
            ReportKind::MissingAttributeConfig => "missing_attribute_config",
            ReportKind::InvalidAttribute => "invalid_attribute",
            ReportKind::WriteFailed => "write_failed",
            ReportKind::Info => "info",
        }
    }

    /// Group heading shown to the user
    #[must_use]
    pub fn heading(&self) -> &'static str {
        match self {
            ReportKind::InvalidName => "Entity names contain prohibited symbols",
            ReportKind::DuplicateName => "Duplicated entity names",
            ReportKind::MissingAttributeConfig => "Missing custom attribute configuration",
            ReportKind::InvalidAttribute => "Invalid custom attribute values",
            ReportKind::WriteFailed => "Failed writes",
            ReportKind::Info => "Information",
        }
    }

    /// Everything except `info` needs user action
    #[must_use]
    pub fn is_problem(&self) -> bool {
        !matches!(self, ReportKind::Info)
    }
}

impl Display for ReportKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The entity a message is about
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<TrackingId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_id: Option<AssetId>,
    /// Slash-joined entity path, enough to locate the entity at the source
    pub path: String,
}

impl EntityRef {
    pub fn tracking(entity: &TrackingEntity) -> Self {
        Self {
            tracking_id: Some(entity.id.clone()),
            database_id: None,
            path: entity.path(),
        }
    }

    pub fn document(doc: &AssetDocument) -> Self {
        Self {
            tracking_id: doc.data.ftrack_id.clone(),
            database_id: Some(doc.id.clone()),
            path: doc.path(),
        }
    }

    /// Reference that is not tied to a single entity, e.g. an object type
    pub fn named(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_database_id(mut self, id: Option<AssetId>) -> Self {
        self.database_id = id;
        self
    }
}

/// One report message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportItem {
    pub kind: ReportKind,
    pub entity: EntityRef,
    pub message: String,
}

/// Immutable report returned to the invoking UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    pub items: Vec<ReportItem>,
}

impl Report {
    /// Standard title for a project run
    #[must_use]
    pub fn title_for(project: &str) -> String {
        format!("Synchronization report ({project})")
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items grouped by kind, in rendering order; item order is preserved
    #[must_use]
    pub fn grouped(&self) -> BTreeMap<ReportKind, Vec<&ReportItem>> {
        let mut groups: BTreeMap<ReportKind, Vec<&ReportItem>> = BTreeMap::new();
        for item in &self.items {
            groups.entry(item.kind).or_default().push(item);
        }
        groups
    }

    #[must_use]
    pub fn count(&self, kind: ReportKind) -> usize {
        self.items.iter().filter(|i| i.kind == kind).count()
    }

    /// Number of items that need user action
    #[must_use]
    pub fn problem_count(&self) -> usize {
        self.items.iter().filter(|i| i.kind.is_problem()).count()
    }
}

/// Accumulates report items in the order they are produced
#[derive(Debug, Clone, Default)]
pub struct ReportBuilder {
    items: Vec<ReportItem>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: ReportKind, entity: EntityRef, message: impl Into<String>) {
        self.items.push(ReportItem {
            kind,
            entity,
            message: message.into(),
        });
    }

    pub fn info(&mut self, entity: EntityRef, message: impl Into<String>) {
        self.push(ReportKind::Info, entity, message);
    }

    pub fn write_failed(&mut self, entity: EntityRef, message: impl Into<String>) {
        self.push(ReportKind::WriteFailed, entity, message);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn items(&self) -> &[ReportItem] {
        &self.items
    }

    /// Finish the report
    #[must_use]
    pub fn build(self, title: impl Into<String>) -> Report {
        Report {
            title: title.into(),
            items: self.items,
        }
    }
}
