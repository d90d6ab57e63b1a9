//! Asset database port
//!
//! Defines the interface to the pipeline's document store. Implemented by
//! `hiersync-store`.

use crate::domain::{AssetDiff, AssetDocument, AssetId};

/// Port trait for the asset database
#[async_trait::async_trait]
pub trait IAssetDatabase: Send + Sync {
    /// Finds the project document by project name
    ///
    /// # Returns
    /// `None` when the project has never been synchronized
    async fn find_project(&self, name: &str) -> anyhow::Result<Option<AssetDocument>>;

    /// Returns every asset document owned by a project, in insertion order
    async fn find_tree(&self, project_id: &AssetId) -> anyhow::Result<Vec<AssetDocument>>;

    /// Inserts a new document with the id it carries
    ///
    /// # Returns
    /// The id of the stored document
    ///
    /// # Errors
    /// Fails if the id is taken or if a sibling with the same name exists
    async fn insert(&self, document: &AssetDocument) -> anyhow::Result<AssetId>;

    /// Applies a minimal diff to an existing document
    ///
    /// # Errors
    /// Fails if the document does not exist
    async fn update(&self, id: &AssetId, diff: &AssetDiff) -> anyhow::Result<()>;
}
