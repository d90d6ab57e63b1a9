//! Loaded hierarchies
//!
//! The entity tree loader returns one [`TrackingTree`] and one
//! [`DatabaseTree`] per run. Both keep the order in which the source
//! returned the nodes ("document order").

use super::document::AssetDocument;
use super::entity::TrackingEntity;

/// The tracking project and its non-task descendants
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingTree {
    pub project: TrackingEntity,
    /// Descendants in document order; Task entities are folded into their
    /// parent's `tasks`
    pub entities: Vec<TrackingEntity>,
}

impl TrackingTree {
    pub fn new(project: TrackingEntity, entities: Vec<TrackingEntity>) -> Self {
        Self { project, entities }
    }

    /// Project followed by every descendant
    pub fn iter(&self) -> impl Iterator<Item = &TrackingEntity> {
        std::iter::once(&self.project).chain(self.entities.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TrackingEntity> {
        std::iter::once(&mut self.project).chain(self.entities.iter_mut())
    }

    /// Number of entities including the project
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len() + 1
    }

    /// A tree always contains at least the project
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// The existing asset-database hierarchy of a project
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseTree {
    /// `None` on the first synchronization of a project
    pub project: Option<AssetDocument>,
    pub assets: Vec<AssetDocument>,
}

impl DatabaseTree {
    pub fn new(project: AssetDocument, assets: Vec<AssetDocument>) -> Self {
        Self {
            project: Some(project),
            assets,
        }
    }

    /// The database has no project document yet
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.project.is_none() && self.assets.is_empty()
    }
}
