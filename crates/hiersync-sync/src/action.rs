//! Sync action
//!
//! Entry point invoked from the UI. Runs the pipeline for one project:
//!
//! ```text
//! load trees -> resolve attributes -> reconcile -> filter -> apply
//! ```
//!
//! and mirrors the run in a Job record of the tracking system. The action is
//! the only place that turns a [`SyncError`] into a user-facing failure.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hiersync_conflict::{HierarchyDiffer, IgnoreFilter, NamingRules};
use hiersync_core::config::Config;
use hiersync_core::domain::{
    DomainError, EntityType, JobHandle, JobPayload, JobStatus, Report, ReportBuilder, SyncRun,
};
use hiersync_core::ports::{IAssetDatabase, ITrackingSystem};

use crate::attributes::AttributeResolver;
use crate::loader::{LoadedTrees, TreeLoader};
use crate::synchronizer::{SyncStats, Synchronizer};
use crate::SyncError;

/// Result returned to the invoking UI
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub message: String,
    pub report: Report,
    pub stats: SyncStats,
}

/// Synchronizes one project per [`SyncAction::run`] call
pub struct SyncAction {
    tracking: Arc<dyn ITrackingSystem + Send + Sync>,
    database: Arc<dyn IAssetDatabase + Send + Sync>,
    loader: TreeLoader,
    resolver: AttributeResolver,
    differ: HierarchyDiffer,
    id_attribute: String,
    cancel: CancellationToken,
    last_run: Option<SyncRun>,
}

impl SyncAction {
    /// Create an action from the loaded configuration
    ///
    /// # Errors
    /// `Configuration` if a naming pattern does not compile or an excluded
    /// entity type is unknown.
    pub fn new(
        tracking: Arc<dyn ITrackingSystem + Send + Sync>,
        database: Arc<dyn IAssetDatabase + Send + Sync>,
        config: &Config,
    ) -> Result<Self, SyncError> {
        let rules = NamingRules::from_config(&config.naming)?;
        let excluded = config
            .sync
            .excluded_entity_types
            .iter()
            .map(|name| EntityType::from_name(name))
            .collect::<Result<Vec<_>, DomainError>>()
            .map_err(|e| SyncError::Configuration(e.to_string()))?;

        Ok(Self {
            loader: TreeLoader::new(Arc::clone(&tracking), Arc::clone(&database))
                .with_excluded_types(excluded),
            resolver: AttributeResolver::new(Arc::clone(&tracking), &config.sync),
            differ: HierarchyDiffer::new(rules, config.sync.duplicate_tie_break),
            id_attribute: config.sync.id_attribute.clone(),
            cancel: CancellationToken::new(),
            last_run: None,
            tracking,
            database,
        })
    }

    /// Use `token` to cancel a run from another task
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// State of the most recent run
    pub fn last_run(&self) -> Option<&SyncRun> {
        self.last_run.as_ref()
    }

    /// Synchronize `project`
    ///
    /// Never fails: fatal errors become an unsuccessful outcome carrying the
    /// partial report.
    #[tracing::instrument(skip(self))]
    pub async fn run(&mut self, project: &str) -> SyncOutcome {
        let mut run = SyncRun::new(project);
        log_transition(run.start());
        let mut report = ReportBuilder::new();
        info!("Starting synchronization");

        // Step 1: Load both trees
        let loaded = self.loader.load(project).await;

        // Step 2: Create the Job record; a missing project gets none
        let job = match &loaded {
            Err(SyncError::ProjectNotFound(_)) => None,
            _ => self.create_job(project).await,
        };

        // Step 3: Resolve, reconcile, filter and write
        let result = match loaded {
            Ok(trees) => self.synchronize(trees, &mut report).await,
            Err(e) => Err(e),
        };

        // Step 4: Close the Job record and build the outcome
        let title = Report::title_for(project);
        let outcome = match result {
            Ok(stats) => {
                log_transition(run.finish());
                let message = format!(
                    "Synchronization of \"{}\" finished: {} created, {} updated, {} conflicts, {} failed",
                    project, stats.created, stats.updated, stats.conflicts, stats.failed
                );
                if let Some(job) = &job {
                    self.close_job(job, JobStatus::Done, JobPayload::new(message.clone()))
                        .await;
                }
                info!(
                    created = stats.created,
                    updated = stats.updated,
                    conflicts = stats.conflicts,
                    report_items = report.len(),
                    "Synchronization finished"
                );
                SyncOutcome {
                    success: true,
                    message,
                    report: report.build(title),
                    stats,
                }
            }
            Err(e) => {
                log_transition(run.fail(e.to_string()));
                let message = e.user_message();
                if let Some(job) = &job {
                    let payload = JobPayload::new(message.clone()).with_traceback(e.traceback());
                    self.close_job(job, JobStatus::Failed, payload).await;
                }
                warn!(error = %e, "Synchronization failed");
                SyncOutcome {
                    success: false,
                    message,
                    report: report.build(title),
                    stats: SyncStats::default(),
                }
            }
        };

        self.last_run = Some(run);
        outcome
    }

    async fn synchronize(
        &self,
        trees: LoadedTrees,
        report: &mut ReportBuilder,
    ) -> Result<SyncStats, SyncError> {
        let LoadedTrees {
            mut tracking,
            database,
        } = trees;

        let resolution = self.resolver.resolve(&mut tracking, report).await?;
        if tracking.project.ignore_sync == Some(true) {
            return Err(SyncError::ProjectIgnored(tracking.project.name.clone()));
        }

        let mut reconciliation = self.differ.reconcile(
            &tracking,
            &database,
            &resolution.excluded_object_types,
            report,
        )?;
        let ignored = IgnoreFilter::apply_flags(&mut reconciliation.pairs);
        debug!(ignored, "Applied ignore filter");

        let synchronizer = Synchronizer::new(
            Arc::clone(&self.tracking),
            Arc::clone(&self.database),
            self.id_attribute.clone(),
            self.cancel.clone(),
        );
        synchronizer.apply(&mut reconciliation.pairs, report).await
    }

    // ------------------------------------------------------------------------
    // Job record
    // ------------------------------------------------------------------------

    async fn create_job(&self, project: &str) -> Option<JobHandle> {
        let description = format!("Synchronizing project {}", project);
        match self.tracking.create_job(project, &description).await {
            Ok(job) => {
                debug!(job_id = %job.id, "Created job record");
                Some(job)
            }
            Err(e) => {
                warn!(error = %e, "Failed to create job record, continuing without one");
                None
            }
        }
    }

    async fn close_job(&self, job: &JobHandle, status: JobStatus, payload: JobPayload) {
        if let Err(e) = self.tracking.update_job_status(job, status, &payload).await {
            warn!(job_id = %job.id, status = status.as_str(), error = %e, "Failed to update job record");
        }
    }
}

fn log_transition(result: Result<(), DomainError>) {
    if let Err(e) = result {
        warn!(error = %e, "Unexpected run state transition");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hiersync_core::config::ConfigBuilder;
    use hiersync_core::domain::{AssetDiff, AssetDocument, AssetId, TrackingEntity, TrackingId};
    use hiersync_core::ports::AttributeValues;
    use std::collections::BTreeSet;

    struct Unused;

    #[async_trait::async_trait]
    impl ITrackingSystem for Unused {
        async fn find_project(&self, _: &str) -> anyhow::Result<Option<TrackingEntity>> {
            anyhow::bail!("unused")
        }
        async fn fetch_project_tree(&self, _: &TrackingId) -> anyhow::Result<Vec<TrackingEntity>> {
            anyhow::bail!("unused")
        }
        async fn fetch_custom_attribute_configs(
            &self,
            _: &str,
            _: &[String],
        ) -> anyhow::Result<BTreeSet<String>> {
            anyhow::bail!("unused")
        }
        async fn read_custom_attribute_bulk(
            &self,
            _: &[TrackingId],
            _: &str,
        ) -> anyhow::Result<AttributeValues> {
            anyhow::bail!("unused")
        }
        async fn write_custom_attribute(
            &self,
            _: &TrackingId,
            _: &str,
            _: &serde_json::Value,
        ) -> anyhow::Result<()> {
            anyhow::bail!("unused")
        }
        async fn create_job(&self, _: &str, _: &str) -> anyhow::Result<JobHandle> {
            anyhow::bail!("unused")
        }
        async fn update_job_status(
            &self,
            _: &JobHandle,
            _: JobStatus,
            _: &JobPayload,
        ) -> anyhow::Result<()> {
            anyhow::bail!("unused")
        }
    }

    #[async_trait::async_trait]
    impl IAssetDatabase for Unused {
        async fn find_project(&self, _: &str) -> anyhow::Result<Option<AssetDocument>> {
            anyhow::bail!("unused")
        }
        async fn find_tree(&self, _: &AssetId) -> anyhow::Result<Vec<AssetDocument>> {
            anyhow::bail!("unused")
        }
        async fn insert(&self, _: &AssetDocument) -> anyhow::Result<AssetId> {
            anyhow::bail!("unused")
        }
        async fn update(&self, _: &AssetId, _: &AssetDiff) -> anyhow::Result<()> {
            anyhow::bail!("unused")
        }
    }

    fn action(config: &Config) -> Result<SyncAction, SyncError> {
        SyncAction::new(Arc::new(Unused), Arc::new(Unused), config)
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        let config = ConfigBuilder::new().naming_asset_pattern("^[a-z").build();
        assert!(matches!(action(&config), Err(SyncError::Configuration(_))));
    }

    #[test]
    fn test_unknown_excluded_type_is_configuration_error() {
        let config = ConfigBuilder::new()
            .sync_excluded_entity_types(vec!["Spaceship".to_string()])
            .build();
        assert!(matches!(action(&config), Err(SyncError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_unreachable_tracking_fails_run() {
        let mut action = action(&Config::default()).unwrap();
        assert!(action.last_run().is_none());

        let outcome = action.run("Demo").await;
        assert!(!outcome.success);
        assert!(outcome.message.starts_with("Synchronization failed"));
        assert_eq!(outcome.report.title, "Synchronization report (Demo)");
        assert!(matches!(
            action.last_run().map(SyncRun::state),
            Some(hiersync_core::domain::RunState::Failed(_))
        ));
    }
}
