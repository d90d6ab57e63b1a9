//! Job records and run state
//!
//! The tracking system keeps a Job record per synchronization so that its
//! UI can show progress. [`SyncRun`] is the local state machine of one run:
//! `idle -> running -> (done | failed)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Handle to a Job record created in the tracking system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: String,
}

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Status values understood by the tracking system's Job entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Data attached to a Job status update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    pub description: String,
    /// Full error chain, retrievable from the Job for support escalation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl JobPayload {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            traceback: None,
        }
    }

    #[must_use]
    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }
}

/// State of a synchronization run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Done,
    Failed(String),
}

impl RunState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Done => "done",
            RunState::Failed(_) => "failed",
        }
    }

    /// Returns true for `done` and `failed`
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed(_))
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Failed(msg) => write!(f, "failed: {}", msg),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// One synchronization run of a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    project: String,
    state: RunState,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl SyncRun {
    /// Creates an idle run for `project`
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            state: RunState::Idle,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// `idle -> running`
    pub fn start(&mut self) -> Result<(), DomainError> {
        self.transition(RunState::Running, |s| matches!(s, RunState::Idle))?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// `running -> done`
    pub fn finish(&mut self) -> Result<(), DomainError> {
        self.transition(RunState::Done, |s| matches!(s, RunState::Running))?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// `idle | running -> failed`
    ///
    /// A run may fail before it started, e.g. when the Job record cannot be
    /// created.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.transition(RunState::Failed(reason.into()), |s| !s.is_finished())?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn transition(
        &mut self,
        to: RunState,
        allowed: impl Fn(&RunState) -> bool,
    ) -> Result<(), DomainError> {
        if !allowed(&self.state) {
            return Err(DomainError::InvalidState {
                from: self.state.name().to_string(),
                to: to.name().to_string(),
            });
        }
        self.state = to;
        Ok(())
    }
}
