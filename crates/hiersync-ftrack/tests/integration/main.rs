//! Integration tests for hiersync-ftrack
//!
//! Uses wiremock to simulate the ftrack `/api` endpoint and verifies the
//! operations sent by the client and the tracking system provider.

mod common;

mod test_jobs;
mod test_queries;
