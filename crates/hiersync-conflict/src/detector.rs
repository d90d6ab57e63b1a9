//! Hierarchy differ and conflict detection
//!
//! Reconciles the tracking tree with the asset database tree:
//!
//! 1. Asset documents are indexed by id, by `(visualParent, name)` and by
//!    their tracking back-reference.
//! 2. Each tracking entity is matched by stored id first. A document that
//!    already points back at the entity also counts as an id match.
//! 3. Unmatched entities try `(resolved parent document, name)`; a miss
//!    means the entity will be created.
//! 4. Documents nobody claimed become removal candidates. One that holds
//!    the name a written sibling needs is also reported as a duplicate.
//! 5. Invalid names and duplicate siblings become conflicts; their subtrees
//!    are processed but forced to `skip-ignored`. Among duplicates an id
//!    match wins over a name match, which wins over a new entity.
//!
//! Entities are visited breadth-first from the project, so a parent's
//! database id is known before its children are matched by name.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use hiersync_core::config::DuplicateTieBreak;
use hiersync_core::domain::{
    AssetDocument, AssetId, DatabaseTree, EntityRef, MatchKind, PairStatus, ReportBuilder, ReportKind,
    SkipReason, SyncPair, TrackingEntity, TrackingTree,
};
use tracing::{debug, info, warn};

use crate::error::ConflictError;
use crate::hierarchy::HierarchyIndex;
use crate::naming::{normalize_name, NamingRules};

/// Output of a reconciliation
///
/// Pairs for tracking entities come first, in breadth-first order starting
/// with the project; removal candidates follow in database order.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub pairs: Vec<SyncPair>,
}

impl Reconciliation {
    /// Number of pairs with the given status
    #[must_use]
    pub fn count(&self, status: PairStatus) -> usize {
        self.pairs.iter().filter(|p| p.status == status).count()
    }

    /// Number of pairs with the given match kind
    #[must_use]
    pub fn count_matched(&self, kind: MatchKind) -> usize {
        self.pairs.iter().filter(|p| p.match_kind == kind).count()
    }

    /// The pair of the tracking project, always the first pair
    #[must_use]
    pub fn project_pair(&self) -> Option<&SyncPair> {
        self.pairs
            .first()
            .filter(|p| p.tracking.as_ref().is_some_and(TrackingEntity::is_root))
    }
}

// ============================================================================
// Document index
// ============================================================================

struct DocumentIndex<'a> {
    assets: &'a [AssetDocument],
    by_id: HashMap<&'a str, usize>,
    by_parent_name: HashMap<(Option<&'a str>, &'a str), usize>,
    by_tracking_id: HashMap<&'a str, usize>,
}

impl<'a> DocumentIndex<'a> {
    fn new(assets: &'a [AssetDocument]) -> Self {
        let mut by_id = HashMap::with_capacity(assets.len());
        let mut by_parent_name = HashMap::with_capacity(assets.len());
        let mut by_tracking_id = HashMap::new();
        for (idx, doc) in assets.iter().enumerate() {
            by_id.entry(doc.id.as_str()).or_insert(idx);
            let parent = doc.data.visual_parent.as_ref().map(|p| p.as_str());
            by_parent_name
                .entry((parent, doc.name.as_str()))
                .or_insert(idx);
            if let Some(tracking_id) = &doc.data.ftrack_id {
                by_tracking_id.entry(tracking_id.as_str()).or_insert(idx);
            }
        }
        Self {
            assets,
            by_id,
            by_parent_name,
            by_tracking_id,
        }
    }
}

// ============================================================================
// HierarchyDiffer
// ============================================================================

/// Matches tracking entities to asset documents and flags conflicts
#[derive(Debug, Clone)]
pub struct HierarchyDiffer {
    rules: NamingRules,
    tie_break: DuplicateTieBreak,
}

impl HierarchyDiffer {
    pub fn new(rules: NamingRules, tie_break: DuplicateTieBreak) -> Self {
        Self { rules, tie_break }
    }

    /// Reconcile both trees
    ///
    /// # Arguments
    /// * `tracking` - Loaded tracking tree with resolved custom attributes
    /// * `database` - Existing asset database tree
    /// * `excluded_object_types` - Object types without the id attribute
    ///   configuration; their entities are matched but never written
    /// * `report` - Receives `invalid_name`, `duplicate_name` and removal
    ///   candidate entries
    ///
    /// # Errors
    /// Only `HierarchyIntegrity`, before any pair is produced.
    #[tracing::instrument(skip_all, fields(project = %tracking.project.name))]
    pub fn reconcile(
        &self,
        tracking: &TrackingTree,
        database: &DatabaseTree,
        excluded_object_types: &BTreeSet<String>,
        report: &mut ReportBuilder,
    ) -> Result<Reconciliation, ConflictError> {
        let index = HierarchyIndex::build(tracking)?;
        let nodes: Vec<&TrackingEntity> = tracking.iter().collect();
        let docs = DocumentIndex::new(&database.assets);

        let mut slots = self.match_entities(&index, &nodes, database, &docs);
        self.assign_statuses(&index, &mut slots, excluded_object_types, report);
        let targets = write_targets(&index, &slots);

        let mut pairs: Vec<SyncPair> = index
            .order()
            .iter()
            .filter_map(|&idx| slots[idx].take())
            .collect();

        let claimed: HashSet<AssetId> = pairs
            .iter()
            .filter_map(|p| p.database_id().cloned())
            .collect();
        let orphans: Vec<&AssetDocument> = docs
            .assets
            .iter()
            .filter(|d| !claimed.contains(&d.id))
            .collect();
        for doc in orphans {
            let mut entity = EntityRef::document(doc);
            entity.path = format!("{}/{}", tracking.project.name, entity.path);
            report.info(
                entity.clone(),
                "Exists in the asset database but not in the tracking system; candidate for removal",
            );
            let key = (doc.data.visual_parent.clone(), normalize_name(&doc.name));
            if let Some(owner) = targets.get(&key) {
                warn!(document = %doc.id, owner = %owner.path, "Removal candidate blocks a sibling name");
                report.push(
                    ReportKind::DuplicateName,
                    entity,
                    format!(
                        "Shares its name with {}; remove the document from the asset database",
                        owner.path
                    ),
                );
            }
            pairs.push(SyncPair::orphan(doc.clone()));
        }

        let reconciliation = Reconciliation { pairs };
        info!(
            pairs = reconciliation.pairs.len(),
            create = reconciliation.count(PairStatus::Create),
            update = reconciliation.count(PairStatus::Update),
            conflicts = reconciliation.count(PairStatus::Conflict),
            skipped = reconciliation.count(PairStatus::SkipIgnored),
            removal_candidates = reconciliation.count(PairStatus::RemovalCandidate),
            "Hierarchy reconciled"
        );
        Ok(reconciliation)
    }

    // ------------------------------------------------------------------------
    // Matching
    // ------------------------------------------------------------------------

    /// Produce one pair per node, indexed by node position
    fn match_entities(
        &self,
        index: &HierarchyIndex,
        nodes: &[&TrackingEntity],
        database: &DatabaseTree,
        docs: &DocumentIndex<'_>,
    ) -> Vec<Option<SyncPair>> {
        let owners = claim_synced_ids(nodes, docs);
        let mut consumed = vec![false; docs.assets.len()];
        let mut slots: Vec<Option<SyncPair>> = vec![None; nodes.len()];

        for &idx in index.order() {
            let mut entity = nodes[idx].clone();
            entity.link_path = index.link_path(idx).to_vec();

            let pair = if idx == 0 {
                match_project(entity, database)
            } else {
                // Outer None: the parent has no database counterpart yet, so
                // name matching is impossible. Inner None: top-level asset.
                let parent_key: Option<Option<String>> = match index.parent(idx) {
                    Some(0) | None => Some(None),
                    Some(p) => slots[p]
                        .as_ref()
                        .and_then(|pair| pair.database_id())
                        .map(|id| Some(id.as_str().to_string())),
                };
                match_asset(entity, idx, &owners, parent_key, docs, &mut consumed)
            };

            debug!(
                entity = %pair.entity_ref().path,
                match_kind = ?pair.match_kind,
                status = %pair.status,
                "Matched entity"
            );
            slots[idx] = Some(pair);
        }
        slots
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    fn assign_statuses(
        &self,
        index: &HierarchyIndex,
        slots: &mut [Option<SyncPair>],
        excluded_object_types: &BTreeSet<String>,
        report: &mut ReportBuilder,
    ) {
        // Reason inherited by the descendants of each node
        let mut blocks: Vec<Option<SkipReason>> = vec![None; slots.len()];
        let mut invalid: Vec<bool> = vec![false; slots.len()];
        let mut duplicates: HashSet<usize> = HashSet::new();

        for &idx in index.order() {
            let Some(pair) = slots[idx].as_mut() else {
                continue;
            };
            let Some(entity) = pair.tracking.as_mut() else {
                continue;
            };

            self.filter_tasks(entity, report);

            let name_check = if idx == 0 {
                self.rules
                    .check_project(&entity.name, entity.code.as_deref())
            } else {
                self.rules.check_asset(&entity.name)
            };
            let excluded = excluded_object_types.contains(&entity.object_type);
            if let Err(violation) = name_check {
                invalid[idx] = true;
                report.push(
                    ReportKind::InvalidName,
                    pair.entity_ref(),
                    violation.to_string(),
                );
            }

            let inherited = index.parent(idx).and_then(|p| blocks[p]);

            if invalid[idx] {
                pair.mark_conflict();
                blocks[idx] = Some(inherited.unwrap_or(SkipReason::InvalidAncestor));
            } else if duplicates.contains(&idx) {
                pair.mark_conflict();
                blocks[idx] = Some(inherited.unwrap_or(SkipReason::ConflictingAncestor));
            } else if let Some(reason) = inherited {
                pair.mark_skipped(reason);
                blocks[idx] = Some(reason);
            } else if excluded {
                pair.mark_skipped(SkipReason::ExcludedType);
                blocks[idx] = Some(SkipReason::ExcludedType);
            }

            // Children are visited after this node; decide their duplicates now
            let losers = self.duplicate_losers(index.children(idx), slots, report);
            duplicates.extend(losers);
        }
    }

    /// Drop tasks with invalid names from an entity
    fn filter_tasks(&self, entity: &mut TrackingEntity, report: &mut ReportBuilder) {
        let mut rejected = Vec::new();
        for name in entity.tasks.keys() {
            if let Err(violation) = self.rules.check_task(name) {
                rejected.push((name.clone(), violation));
            }
        }
        for (name, violation) in rejected {
            entity.tasks.remove(&name);
            let mut reference = EntityRef::tracking(entity);
            reference.path = format!("{}/{}", reference.path, name);
            report.push(
                ReportKind::InvalidName,
                reference,
                format!("Task skipped: {}", violation),
            );
        }
    }

    /// Select the non-surviving members of each colliding sibling group
    ///
    /// Siblings with invalid names are already conflicts and do not take
    /// part. Returns node positions.
    fn duplicate_losers(
        &self,
        siblings: &[usize],
        slots: &[Option<SyncPair>],
        report: &mut ReportBuilder,
    ) -> Vec<usize> {
        let mut groups: BTreeMap<String, Vec<(usize, &TrackingEntity, u8)>> = BTreeMap::new();
        for &idx in siblings {
            let Some(pair) = slots[idx].as_ref() else {
                continue;
            };
            let Some(entity) = pair.tracking.as_ref() else {
                continue;
            };
            if self.rules.check_asset(&entity.name).is_err() {
                continue;
            }
            groups
                .entry(normalize_name(&entity.name))
                .or_default()
                .push((idx, entity, match_rank(pair.match_kind)));
        }

        let mut losers = Vec::new();
        for group in groups.values().filter(|g| g.len() > 1) {
            // A sibling that already owns a document keeps it
            let Some(best) = group.iter().map(|(_, _, rank)| *rank).min() else {
                continue;
            };
            let mut contenders = group.iter().filter(|(_, _, rank)| *rank == best);
            let winner = match self.tie_break {
                DuplicateTieBreak::InputOrder => contenders.min_by_key(|(idx, _, _)| *idx),
                DuplicateTieBreak::SmallestId => contenders.min_by(|a, b| a.1.id.cmp(&b.1.id)),
            };
            let Some(&(winner_idx, winner, _)) = winner else {
                continue;
            };
            for &(idx, entity, _) in group.iter().filter(|(idx, _, _)| *idx != winner_idx) {
                let mut reference = EntityRef::tracking(entity);
                reference.database_id = slots[idx]
                    .as_ref()
                    .and_then(|p| p.database_id().cloned());
                report.push(
                    ReportKind::DuplicateName,
                    reference,
                    format!(
                        "Name \"{}\" collides with sibling \"{}\" ({})",
                        entity.name, winner.name, winner.id
                    ),
                );
                losers.push(idx);
            }
        }
        losers
    }
}

// ============================================================================
// Matching helpers
// ============================================================================

/// Preference when siblings collide: id matches, then name matches
fn match_rank(kind: MatchKind) -> u8 {
    match kind {
        MatchKind::ById => 0,
        MatchKind::ByName => 1,
        MatchKind::UnmatchedTracking | MatchKind::UnmatchedDatabase => 2,
    }
}

/// Parent document and normalized name each writable asset will end up with
///
/// Entities whose parent has no document yet are left out; no existing
/// document can sit under them.
fn write_targets(
    index: &HierarchyIndex,
    slots: &[Option<SyncPair>],
) -> HashMap<(Option<AssetId>, String), EntityRef> {
    let mut targets = HashMap::new();
    for &idx in index.order().iter().skip(1) {
        let Some(pair) = slots[idx].as_ref().filter(|p| p.is_writable()) else {
            continue;
        };
        let Some(entity) = pair.tracking.as_ref() else {
            continue;
        };
        let parent_doc = match index.parent(idx) {
            Some(0) | None => None,
            Some(p) => match slots[p].as_ref().and_then(|parent| parent.database_id()) {
                Some(id) => Some(id.clone()),
                None => continue,
            },
        };
        targets
            .entry((parent_doc, normalize_name(&entity.name)))
            .or_insert_with(|| pair.entity_ref());
    }
    targets
}

/// Decide which node owns each document referenced by a `synced_id`
///
/// Copied entities share the same stored id. The owner is the node the
/// document points back at, otherwise the first one in document order.
/// Documents nobody references by id are reserved for the node they point
/// back at, so a same-named sibling cannot take them by name.
fn claim_synced_ids(nodes: &[&TrackingEntity], docs: &DocumentIndex<'_>) -> HashMap<usize, usize> {
    let mut owners: HashMap<usize, usize> = HashMap::new();
    for (idx, node) in nodes.iter().enumerate().skip(1) {
        let Some(&doc_idx) = node.synced_id().and_then(|sid| docs.by_id.get(sid)) else {
            continue;
        };
        let back_reference = docs.assets[doc_idx]
            .data
            .ftrack_id
            .as_ref()
            .map(|id| id.as_str());
        match owners.get(&doc_idx) {
            None => {
                owners.insert(doc_idx, idx);
            }
            Some(&current) => {
                let current_is_owner = back_reference == Some(nodes[current].id.as_str());
                if !current_is_owner && back_reference == Some(node.id.as_str()) {
                    owners.insert(doc_idx, idx);
                }
            }
        }
    }
    for (idx, node) in nodes.iter().enumerate().skip(1) {
        if let Some(&doc_idx) = docs.by_tracking_id.get(node.id.as_str()) {
            owners.entry(doc_idx).or_insert(idx);
        }
    }
    owners
}

fn match_project(entity: TrackingEntity, database: &DatabaseTree) -> SyncPair {
    let Some(doc) = database.project.as_ref() else {
        return SyncPair::tracked(entity, None, MatchKind::UnmatchedTracking);
    };

    let id_matches = entity.synced_id() == Some(doc.id.as_str());
    let back_reference = doc.data.ftrack_id.as_ref() == Some(&entity.id);
    let kind = if id_matches || back_reference {
        MatchKind::ById
    } else {
        MatchKind::ByName
    };
    let mut pair = SyncPair::tracked(entity, Some(doc.clone()), kind);
    pair.needs_write_back = !id_matches;
    pair
}

fn match_asset(
    entity: TrackingEntity,
    idx: usize,
    owners: &HashMap<usize, usize>,
    parent_key: Option<Option<String>>,
    docs: &DocumentIndex<'_>,
    consumed: &mut [bool],
) -> SyncPair {
    // A document claimed through another node's synced id is reserved for it
    let available = |d: &usize| !consumed[*d] && owners.get(d).map_or(true, |&o| o == idx);

    let by_synced_id = entity
        .synced_id()
        .and_then(|sid| docs.by_id.get(sid).copied())
        .filter(|d| owners.get(d) == Some(&idx) && !consumed[*d]);

    let (doc_idx, kind, write_back) = if let Some(doc_idx) = by_synced_id {
        (Some(doc_idx), MatchKind::ById, false)
    } else if let Some(doc_idx) = docs
        .by_tracking_id
        .get(entity.id.as_str())
        .copied()
        .filter(|d| available(d))
    {
        (Some(doc_idx), MatchKind::ById, true)
    } else if let Some(doc_idx) = parent_key.and_then(|parent| {
        docs.by_parent_name
            .get(&(parent.as_deref(), entity.name.as_str()))
            .copied()
            .filter(|d| available(d))
    }) {
        (Some(doc_idx), MatchKind::ByName, true)
    } else {
        (None, MatchKind::UnmatchedTracking, false)
    };

    if let Some(d) = doc_idx {
        consumed[d] = true;
    }
    let mut pair = SyncPair::tracked(entity, doc_idx.map(|d| docs.assets[d].clone()), kind);
    pair.needs_write_back = write_back;
    pair
}
