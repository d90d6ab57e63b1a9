//! HierSync ftrack - ftrack REST API client
//!
//! Provides an async client for:
//! - Batched operations against `POST {server}/api`
//! - Project tree queries (one query per project)
//! - Bulk custom attribute reads and single-value writes
//! - Job records reporting sync progress to ftrack users
//!
//! ## Modules
//!
//! - [`client`] - HTTP client, authentication headers and 429 handling
//! - [`provider`] - `ITrackingSystem` implementation on top of the client

pub mod client;
pub mod provider;

use std::time::Duration;

use thiserror::Error;

pub use client::FtrackClient;
pub use provider::FtrackTrackingSystem;

/// Errors that can occur when talking to the ftrack API
#[derive(Debug, Error)]
pub enum FtrackError {
    /// The API key or user was rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// ftrack answered with an exception payload
    #[error("ftrack {exception}: {content}")]
    Server { exception: String, content: String },

    /// Rate limit still exceeded after all retries
    #[error("Too many requests, last retry-after {retry_after:?}")]
    TooManyRequests { retry_after: Duration },

    /// Non-success HTTP status other than 401/429
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The response could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
