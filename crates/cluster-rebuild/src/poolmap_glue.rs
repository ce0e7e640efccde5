//! Pool-map-change glue (§4.4): turns a topology snapshot change into
//! scheduled rebuild tasks.

use cluster_types::{PoolMapSnapshot, RebuildOp};

use crate::coordinator::RebuildCoordinator;

/// Compares `new` against the previously seen snapshot (`old`, `None` on
/// first observation) and schedules a task for every target whose
/// `(state, version)` changed and whose state implies a rebuild op.
/// `Down`/`Drain` targets are skipped when `new.self_heal_enabled` is
/// false; `Reclaim` is never scheduled here; it is only ever queued as a
/// `Reint`/`Extend` follow-up (§4.2.3 step 7).
pub async fn reconcile_pool_map(coordinator: &RebuildCoordinator, old: Option<&PoolMapSnapshot>, new: &PoolMapSnapshot) {
    for (&rank, &(state, version)) in &new.targets {
        let changed = match old.and_then(|o| o.targets.get(&rank)) {
            Some(&(old_state, old_version)) => old_state != state || old_version != version,
            None => true,
        };
        if !changed {
            continue;
        }

        let Some(op) = state.rebuild_op() else { continue };
        if matches!(op, RebuildOp::Fail | RebuildOp::Drain) && !new.self_heal_enabled {
            continue;
        }

        coordinator.schedule(new.pool_id, version, [rank], op, 0).await;
    }
}
