//! "Ignore sync" filter
//!
//! An entity is ignored when its own flag is true, or when it has no flag
//! of its own and its parent is ignored. An explicit `false` re-enables a
//! subtree under an ignored parent.

use std::collections::HashMap;

use hiersync_core::domain::{SkipReason, SyncPair, TrackingEntity, TrackingId};
use tracing::debug;

/// Marks `create`/`update` pairs of ignored entities as `skip-ignored`
pub struct IgnoreFilter;

impl IgnoreFilter {
    /// Apply the filter with a custom flag lookup
    ///
    /// `pairs` must list parents before children, as produced by
    /// [`crate::HierarchyDiffer::reconcile`]. Conflicts and removal
    /// candidates are left unchanged. Returns the number of pairs skipped.
    pub fn apply<F>(pairs: &mut [SyncPair], is_ignored: F) -> usize
    where
        F: Fn(&TrackingEntity) -> Option<bool>,
    {
        let mut effective: HashMap<TrackingId, bool> = HashMap::with_capacity(pairs.len());
        let mut skipped = 0;

        for pair in pairs.iter_mut() {
            let Some(entity) = pair.tracking.as_ref() else {
                continue;
            };
            let inherited = entity
                .parent_id
                .as_ref()
                .and_then(|p| effective.get(p).copied())
                .unwrap_or(false);
            let ignored = is_ignored(entity).unwrap_or(inherited);
            effective.insert(entity.id.clone(), ignored);

            if ignored && pair.mark_skipped(SkipReason::IgnoreFlag) {
                debug!(entity = %pair.entity_ref().path, "Skipping ignored entity");
                skipped += 1;
            }
        }
        skipped
    }

    /// Apply the filter using the resolved `ignore_sync` attribute
    pub fn apply_flags(pairs: &mut [SyncPair]) -> usize {
        Self::apply(pairs, |entity| entity.ignore_sync)
    }
}
