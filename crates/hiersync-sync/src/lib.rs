//! HierSync Sync - Hierarchy synchronization engine
//!
//! Provides:
//! - Concurrent loading of the tracking and asset database trees
//! - Bulk resolution of custom attributes (stored ids, ignore flags,
//!   tracked values)
//! - Parent-before-child application of creates and minimal updates
//! - The sync action tying the stages to a Job record
//!
//! ## Modules
//!
//! - [`loader`] - Entity tree loader
//! - [`attributes`] - Custom attribute resolver
//! - [`synchronizer`] - Ordered writes and id write-back
//! - [`action`] - Run state machine and user-facing outcome

pub mod action;
pub mod attributes;
pub mod loader;
pub mod synchronizer;

use hiersync_conflict::ConflictError;
use thiserror::Error;

pub use action::{SyncAction, SyncOutcome};
pub use synchronizer::{SyncStats, Synchronizer};

/// Fatal errors of a synchronization run
///
/// Per-entity problems are never errors; they end up in the report.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The tracking system or the asset database could not be reached
    #[error("{context}")]
    ExternalService {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    /// The project does not exist in the tracking system
    #[error("Project \"{0}\" was not found in the tracking system")]
    ProjectNotFound(String),

    /// The project itself carries the ignore-sync flag
    #[error("Project \"{0}\" is marked to be ignored by synchronization")]
    ProjectIgnored(String),

    /// Cycle, dangling parent, or a project document that cannot be written
    #[error("Hierarchy integrity violated: {0}")]
    HierarchyIntegrity(String),

    /// The run was cancelled between sibling groups
    #[error("Synchronization was cancelled")]
    Cancelled,

    /// Settings that make the run impossible, e.g. an invalid naming pattern
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl SyncError {
    /// Builds a `map_err` adapter for port errors
    pub fn external(context: impl Into<String>) -> impl FnOnce(anyhow::Error) -> SyncError {
        let context = context.into();
        move |source| SyncError::ExternalService { context, source }
    }

    /// Short message shown to the user who triggered the run
    pub fn user_message(&self) -> String {
        match self {
            SyncError::ExternalService { context, .. } => {
                format!("Synchronization failed: {}. Check the service and try again.", context)
            }
            SyncError::Cancelled => "Synchronization was cancelled before it finished".to_string(),
            other => format!("Synchronization failed: {}", other),
        }
    }

    /// Full error chain, one cause per line
    pub fn traceback(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str("\ncaused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}

impl From<ConflictError> for SyncError {
    fn from(e: ConflictError) -> Self {
        match e {
            ConflictError::HierarchyIntegrity(msg) => SyncError::HierarchyIntegrity(msg),
            other => SyncError::Configuration(other.to_string()),
        }
    }
}
