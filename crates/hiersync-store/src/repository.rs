//! SQLite implementation of IAssetDatabase
//!
//! ## Column Mapping
//!
//! | Document field       | Column          | Strategy                          |
//! |----------------------|-----------------|-----------------------------------|
//! | `_id`                | `id`            | 24-char hex string                |
//! | `type`               | `doc_type`      | `"project"` / `"asset"`           |
//! | `parent`             | `project_id`    | The project's own id for projects |
//! | `name`               | `name`          | TEXT                              |
//! | `data.visualParent`  | `visual_parent` | Copied from `data` for indexing   |
//! | `data`               | `data`          | serde_json serialization          |
//!
//! Documents are returned in insertion order, which is the order the
//! synchronizer created them (parents before children).

use anyhow::Context;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use hiersync_core::domain::{AssetData, AssetDiff, AssetDocument, AssetId, DocumentType};
use hiersync_core::ports::IAssetDatabase;

use crate::StoreError;

/// SQLite-based asset database
pub struct SqliteAssetDatabase {
    pool: SqlitePool,
}

impl SqliteAssetDatabase {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetch one document by id
    pub async fn get(&self, id: &AssetId) -> Result<Option<AssetDocument>, StoreError> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    /// Number of writes applied to a document, starting at 1 on insert
    pub async fn revision(&self, id: &AssetId) -> Result<Option<i64>, StoreError> {
        let revision: Option<i64> = sqlx::query_scalar("SELECT revision FROM documents WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(revision)
    }

    /// Total number of documents, projects included
    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn document_from_row(row: &SqliteRow) -> Result<AssetDocument, StoreError> {
    let id_str: String = row.get("id");
    let project_id_str: String = row.get("project_id");
    let doc_type_str: String = row.get("doc_type");
    let name: String = row.get("name");
    let data_str: String = row.get("data");

    let id = AssetId::new(id_str.clone()).map_err(|e| {
        StoreError::SerializationError(format!("Invalid document id '{}': {}", id_str, e))
    })?;
    let data: AssetData = serde_json::from_str(&data_str).map_err(|e| {
        StoreError::SerializationError(format!("Invalid data of document {}: {}", id_str, e))
    })?;

    match doc_type_str.as_str() {
        "project" => Ok(AssetDocument::project(id, name, data)),
        "asset" => {
            let project_id = AssetId::new(project_id_str.clone()).map_err(|e| {
                StoreError::SerializationError(format!(
                    "Invalid project id '{}' on document {}: {}",
                    project_id_str, id_str, e
                ))
            })?;
            Ok(AssetDocument::asset(id, name, project_id, data))
        }
        other => Err(StoreError::SerializationError(format!(
            "Unknown document type '{}' on document {}",
            other, id_str
        ))),
    }
}

fn serialize_data(doc: &AssetDocument) -> Result<String, StoreError> {
    serde_json::to_string(&doc.data).map_err(|e| {
        StoreError::SerializationError(format!("Cannot serialize data of document {}: {}", doc.id, e))
    })
}

// ============================================================================
// IAssetDatabase implementation
// ============================================================================

#[async_trait::async_trait]
impl IAssetDatabase for SqliteAssetDatabase {
    async fn find_project(&self, name: &str) -> anyhow::Result<Option<AssetDocument>> {
        let row = sqlx::query("SELECT * FROM documents WHERE doc_type = 'project' AND name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to look up project document {}", name))?;

        Ok(row.as_ref().map(document_from_row).transpose()?)
    }

    async fn find_tree(&self, project_id: &AssetId) -> anyhow::Result<Vec<AssetDocument>> {
        let rows = sqlx::query(
            "SELECT * FROM documents WHERE project_id = ? AND doc_type = 'asset' ORDER BY rowid",
        )
        .bind(project_id.as_str())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to load assets of project {}", project_id))?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in &rows {
            documents.push(document_from_row(row)?);
        }
        tracing::debug!(project_id = %project_id, count = documents.len(), "Loaded asset tree");
        Ok(documents)
    }

    async fn insert(&self, document: &AssetDocument) -> anyhow::Result<AssetId> {
        let project_id = match (document.doc_type, &document.parent) {
            (DocumentType::Project, _) => document.id.clone(),
            (DocumentType::Asset, Some(project)) => project.clone(),
            (DocumentType::Asset, None) => {
                anyhow::bail!("Asset document {} has no owning project", document.id)
            }
        };
        let data = serialize_data(document)?;
        let visual_parent = document.data.visual_parent.as_ref().map(|p| p.as_str());

        sqlx::query(
            "INSERT INTO documents (id, project_id, doc_type, name, visual_parent, data) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(document.id.as_str())
        .bind(project_id.as_str())
        .bind(document.doc_type.as_str())
        .bind(&document.name)
        .bind(visual_parent)
        .bind(&data)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert document {} ({})", document.name, document.id))?;

        tracing::trace!(id = %document.id, name = %document.name, "Inserted document");
        Ok(document.id.clone())
    }

    async fn update(&self, id: &AssetId, diff: &AssetDiff) -> anyhow::Result<()> {
        if diff.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .with_context(|| format!("Failed to read document {}", id))?;
        let Some(row) = row else {
            return Err(StoreError::NotFound(id.to_string()).into());
        };

        let mut document = document_from_row(&row)?;
        diff.apply(&mut document);
        let data = serialize_data(&document)?;
        let visual_parent = document.data.visual_parent.as_ref().map(|p| p.as_str());

        sqlx::query(
            "UPDATE documents SET name = ?, visual_parent = ?, data = ?, \
             revision = revision + 1, updated_at = ? WHERE id = ?",
        )
        .bind(&document.name)
        .bind(visual_parent)
        .bind(&data)
        .bind(Utc::now().to_rfc3339())
        .bind(id.as_str())
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to update document {}", id))?;

        tx.commit().await.context("Failed to commit document update")?;

        tracing::trace!(id = %id, fields = ?diff.changed_fields(), "Updated document");
        Ok(())
    }
}
