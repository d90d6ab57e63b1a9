//! HierSync Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `TrackingEntity`, `AssetDocument`, `SyncPair`, `Report`, `SyncRun`
//! - **Port definitions** - Traits for adapters: `ITrackingSystem`, `IAssetDatabase`
//! - **Configuration** - YAML-backed settings shared by every crate
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure data types with no I/O.
//! Ports define trait interfaces that adapter crates implement
//! (`hiersync-ftrack` for the tracking system, `hiersync-store` for the
//! asset database). The pipeline in `hiersync-sync` drives both through
//! these traits only.

pub mod config;
pub mod domain;
pub mod ports;
