//! HierSync Conflict - Hierarchy reconciliation and conflict detection
//!
//! Provides:
//! - Structural validation of the tracking tree (dangling parents, cycles)
//! - Matching of tracking entities to asset documents by id, then by name
//! - Naming rules: invalid names and case/whitespace-insensitive duplicates
//! - The "ignore sync" filter stage
//!
//! Nothing in this crate performs I/O. Data-quality problems become
//! `conflict` pairs plus report entries; only structural violations are
//! returned as errors.

pub mod detector;
pub mod error;
pub mod filter;
pub mod hierarchy;
pub mod naming;

pub use detector::{HierarchyDiffer, Reconciliation};
pub use error::ConflictError;
pub use filter::IgnoreFilter;
pub use hierarchy::HierarchyIndex;
pub use naming::{normalize_name, NameViolation, NamingRules};
