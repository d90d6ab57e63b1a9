//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the synchronization
//! pipeline depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ITrackingSystem`] - Production tracking service (project tree, custom
//!   attributes, Job records)
//! - [`IAssetDatabase`] - Pipeline document store holding the asset hierarchy

pub mod asset_database;
pub mod tracking_system;

pub use asset_database::IAssetDatabase;
pub use tracking_system::{AttributeValues, ITrackingSystem};
