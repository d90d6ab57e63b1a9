//! Reconciliation pairs
//!
//! The hierarchy differ produces one [`SyncPair`] per tracking entity and per
//! unmatched database document. The filter stage may flip a pair to
//! [`PairStatus::SkipIgnored`]; the synchronizer reads the status to decide
//! which write to perform.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use super::document::AssetDocument;
use super::entity::TrackingEntity;
use super::newtypes::{AssetId, TrackingId};
use super::report::EntityRef;

/// How a pair was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchKind {
    /// Stored id (or the document's tracking back-reference) matched
    ById,
    /// Matched by parent and name
    ByName,
    /// Tracking entity with no database counterpart
    UnmatchedTracking,
    /// Database document with no tracking counterpart
    UnmatchedDatabase,
}

/// What the synchronizer should do with a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PairStatus {
    Create,
    Update,
    SkipIgnored,
    Conflict,
    /// Unmatched database document; reported, never deleted automatically
    RemovalCandidate,
}

impl PairStatus {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            PairStatus::Create => "create",
            PairStatus::Update => "update",
            PairStatus::SkipIgnored => "skip-ignored",
            PairStatus::Conflict => "conflict",
            PairStatus::RemovalCandidate => "removal-candidate",
        }
    }
}

impl Display for PairStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Why a pair was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The entity or an ancestor has the ignore flag set
    IgnoreFlag,
    /// The entity type (or an ancestor's) lacks the id attribute configuration
    ExcludedType,
    /// An ancestor has an invalid name
    InvalidAncestor,
    /// An ancestor is a duplicate-name conflict
    ConflictingAncestor,
    /// The parent has no database id at write time
    UnsyncedParent,
}

/// Reconciliation result for one entity
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPair {
    pub tracking: Option<TrackingEntity>,
    pub database: Option<AssetDocument>,
    pub match_kind: MatchKind,
    pub status: PairStatus,
    pub skip_reason: Option<SkipReason>,
    /// The database id must be written back to the tracking attribute
    pub needs_write_back: bool,
}

impl SyncPair {
    /// Pair for a tracking entity
    pub fn tracked(
        tracking: TrackingEntity,
        database: Option<AssetDocument>,
        match_kind: MatchKind,
    ) -> Self {
        let status = if database.is_some() {
            PairStatus::Update
        } else {
            PairStatus::Create
        };
        Self {
            tracking: Some(tracking),
            database,
            match_kind,
            status,
            skip_reason: None,
            needs_write_back: false,
        }
    }

    /// Pair for a database document with no tracking counterpart
    pub fn orphan(database: AssetDocument) -> Self {
        Self {
            tracking: None,
            database: Some(database),
            match_kind: MatchKind::UnmatchedDatabase,
            status: PairStatus::RemovalCandidate,
            skip_reason: None,
            needs_write_back: false,
        }
    }

    #[must_use]
    pub fn tracking_id(&self) -> Option<&TrackingId> {
        self.tracking.as_ref().map(|t| &t.id)
    }

    #[must_use]
    pub fn database_id(&self) -> Option<&AssetId> {
        self.database.as_ref().map(|d| &d.id)
    }

    /// True for `create` and `update`
    #[must_use]
    pub fn is_writable(&self) -> bool {
        matches!(self.status, PairStatus::Create | PairStatus::Update)
    }

    /// Mark the pair as a conflict
    pub fn mark_conflict(&mut self) {
        self.status = PairStatus::Conflict;
        self.skip_reason = None;
    }

    /// Skip the pair unless it is a conflict or a removal candidate
    ///
    /// Returns true if the status changed.
    pub fn mark_skipped(&mut self, reason: SkipReason) -> bool {
        if !self.is_writable() {
            return false;
        }
        self.status = PairStatus::SkipIgnored;
        self.skip_reason = Some(reason);
        true
    }

    /// Reference used in report entries
    #[must_use]
    pub fn entity_ref(&self) -> EntityRef {
        match (&self.tracking, &self.database) {
            (Some(t), db) => EntityRef::tracking(t).with_database_id(db.as_ref().map(|d| d.id.clone())),
            (None, Some(d)) => EntityRef::document(d),
            (None, None) => EntityRef::default(),
        }
    }
}
