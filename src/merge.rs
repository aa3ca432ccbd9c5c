//! Control-flow merge engine
//!
//! Reconciles binding states across branch joins and validates loop
//! back-edges. Branch arms are analyzed independently from the same
//! pre-state; at the join, a non-copyable binding is available afterwards
//! only if every arm leaves it in the same liveness: owned everywhere, or
//! dead (moved/consumed) everywhere. Loops must reach a fixpoint in one
//! iteration: the post-body state of every loop-carried binding equals its
//! pre-body state, so any number of iterations (including zero) is valid.

use crate::fir::VarId;
use crate::state::{BindingSnapshot, BindingState, BindingTracker, StateMap};
use tracing::debug;

/// Per-arm liveness used for join decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Liveness {
    Live,
    Dead,
    Absent,
}

fn liveness(snap: &BindingSnapshot) -> Liveness {
    match snap.state {
        BindingState::Owned | BindingState::Borrowed { .. } => Liveness::Live,
        BindingState::Moved { .. } | BindingState::Consumed { .. } => Liveness::Dead,
        BindingState::Uninitialized => Liveness::Absent,
    }
}

/// Join the arms of a branch
///
/// Returns the merged post-state and the bindings whose ownership the arms
/// disagree on (each is an `InconsistentBranchOwnership` at the join).
/// A missing `else` is an arm that leaves every binding untouched, so the
/// caller passes the pre-state itself as that arm's snapshot.
pub fn merge_branches(
    tracker: &BindingTracker,
    pre: &StateMap,
    arms: &[StateMap],
) -> (StateMap, Vec<VarId>) {
    debug_assert!(!arms.is_empty(), "a branch has at least one arm");

    let mut merged = StateMap::new();
    let mut conflicts = Vec::new();

    for (var, pre_snap) in pre {
        let entries: Vec<&BindingSnapshot> =
            arms.iter().map(|arm| arm.get(var).unwrap_or(pre_snap)).collect();
        let binding = tracker.binding(*var);

        if binding.discipline.allows_copy() {
            // Copyable bindings merge leniently: available if any arm kept
            // them available.
            let snap = entries
                .iter()
                .find(|e| liveness(e) == Liveness::Live)
                .copied()
                .or_else(|| entries.first().copied())
                .unwrap_or(pre_snap);
            merged.insert(*var, *snap);
            continue;
        }

        let first = liveness(entries[0]);
        let agree = entries.iter().all(|e| liveness(e) == first);
        if agree {
            // Prefer the most recent instance so later diagnostics point at
            // the right origin.
            let snap = entries
                .iter()
                .max_by_key(|e| e.generation)
                .copied()
                .unwrap_or(pre_snap);
            merged.insert(*var, *snap);
        } else {
            debug!(var = %var, name = %binding.name, "branch arms disagree on ownership");
            conflicts.push(*var);
            // Pessimistic result: treat as dead so one conflict does not
            // cascade into use-after-move noise downstream.
            let dead = entries
                .iter()
                .find(|e| liveness(e) == Liveness::Dead)
                .copied()
                .unwrap_or(pre_snap);
            merged.insert(*var, *dead);
        }
    }

    (merged, conflicts)
}

/// Validate a loop back-edge against the pre-body state
///
/// Returns the loop-carried bindings that are live on entry but dead at the
/// end of the body (each is a `LoopConsumesResource`).
pub fn check_loop(tracker: &BindingTracker, pre: &StateMap, post: &StateMap) -> Vec<VarId> {
    let mut conflicts = Vec::new();
    for (var, pre_snap) in pre {
        let binding = tracker.binding(*var);
        if binding.discipline.allows_copy() {
            continue;
        }
        let post_snap = post.get(var).unwrap_or(pre_snap);
        if liveness(pre_snap) == Liveness::Live && liveness(post_snap) != Liveness::Live {
            debug!(var = %var, name = %binding.name, "loop body leaves carried resource dead");
            conflicts.push(*var);
        }
    }
    conflicts
}
