//! Sync command - Synchronize a project hierarchy
//!
//! Provides the `hiersync sync <PROJECT>` CLI command which:
//! 1. Loads and validates the configuration
//! 2. Creates the ftrack and asset database adapters
//! 3. Runs the sync action, cancelled by Ctrl-C between sibling groups
//! 4. Renders the report grouped by kind

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hiersync_core::config::Config;
use hiersync_ftrack::{FtrackClient, FtrackTrackingSystem};
use hiersync_store::{DatabasePool, SqliteAssetDatabase};
use hiersync_sync::SyncAction;

use crate::output::{get_formatter, report_lines, OutputFormat};

/// Environment variable that overrides `tracking.api_key`
pub const API_KEY_ENV: &str = "FTRACK_API_KEY";

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Full name of the project in ftrack
    pub project: String,
}

impl SyncCommand {
    /// Execute the sync command
    ///
    /// Returns an error when the run fails so the process exits non-zero.
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);

        // Step 1: Load and validate config
        let config = Config::load_or_default(config_path);
        info!(config_path = %config_path.display(), "Loaded configuration");

        let errors = config.validate();
        if !errors.is_empty() {
            for error in &errors {
                formatter.error(&error.to_string());
            }
            anyhow::bail!(
                "Configuration has {} error{}; run 'hiersync config validate'",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            );
        }

        let api_key = resolve_api_key(std::env::var(API_KEY_ENV).ok(), &config).with_context(|| {
            format!("No ftrack API key: set {} or tracking.api_key", API_KEY_ENV)
        })?;

        // Step 2: Create adapters
        let client = FtrackClient::new(
            &config.tracking.server_url,
            &config.tracking.api_user,
            api_key,
        )
        .with_timeout(Duration::from_secs(config.tracking.timeout_secs))?;
        let tracking = Arc::new(FtrackTrackingSystem::new(client));

        let pool = DatabasePool::open(&config.database)
            .await
            .context("Failed to open asset database")?;
        let database = Arc::new(SqliteAssetDatabase::new(pool.pool().clone()));

        // Step 3: Ctrl-C cancels the run
        let token = CancellationToken::new();
        let interrupt = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current sibling group");
                interrupt.cancel();
            }
        });

        // Step 4: Run the sync action
        formatter.info(&format!("Synchronizing project {}...", self.project));
        let mut action = SyncAction::new(tracking, database, &config)?.with_cancellation(token);
        let outcome = action.run(&self.project).await;
        pool.close().await;

        // Step 5: Display results
        if format.is_json() {
            let json = serde_json::to_value(&outcome).context("Failed to serialize outcome")?;
            formatter.print_json(&json);
        } else {
            if outcome.success {
                formatter.success(&outcome.message);
            } else {
                formatter.error(&outcome.message);
            }
            if outcome.success {
                let stats = &outcome.stats;
                formatter.info(&format!(
                    "Unchanged: {}  Skipped: {}  Write-backs: {}  Removal candidates: {}",
                    stats.unchanged, stats.skipped, stats.write_backs, stats.removal_candidates
                ));
                if stats.write_back_failures > 0 {
                    formatter.warn(&format!(
                        "{} asset id{} could not be stored in ftrack; the next run retries",
                        stats.write_back_failures,
                        if stats.write_back_failures == 1 { "" } else { "s" }
                    ));
                }
            }
            if !outcome.report.is_empty() {
                formatter.info("");
                formatter.info(&outcome.report.title);
                for line in report_lines(&outcome.report) {
                    formatter.info(&line);
                }
            }
        }

        if !outcome.success {
            anyhow::bail!("Synchronization of {} failed", self.project);
        }
        Ok(())
    }
}

/// The environment value wins over the configured key; empty values are ignored
fn resolve_api_key(env_value: Option<String>, config: &Config) -> Option<String> {
    env_value
        .filter(|k| !k.trim().is_empty())
        .or_else(|| config.tracking.api_key.clone())
        .filter(|k| !k.trim().is_empty())
}
