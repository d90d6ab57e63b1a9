//! Domain entities and business logic
//!
//! This module contains the core domain types for HierSync:
//! - Newtypes for tracking-system and asset-database identifiers
//! - Tracking entities and the loaded tracking tree
//! - Asset documents and minimal update diffs
//! - Reconciliation pairs produced by the hierarchy differ
//! - The synchronization report
//! - Job and run state types
//! - Domain-specific error types

pub mod document;
pub mod entity;
pub mod errors;
pub mod job;
pub mod newtypes;
pub mod pair;
pub mod report;
pub mod tree;

// Re-export commonly used types
pub use document::{AssetData, AssetDiff, AssetDocument, DocumentType};
pub use entity::{EntityType, TaskInfo, TrackingEntity};
pub use errors::DomainError;
pub use job::{JobHandle, JobPayload, JobStatus, RunState, SyncRun};
pub use newtypes::*;
pub use pair::{MatchKind, PairStatus, SkipReason, SyncPair};
pub use report::{EntityRef, Report, ReportBuilder, ReportItem, ReportKind};
pub use tree::{DatabaseTree, TrackingTree};
