//! Compile-time / run-time partitioning
//!
//! Classifies each sub-expression as statically evaluable (`Static`) or
//! deferred to run time (`Deferred`). Literals are static; a variable is
//! static while its current value is compile-time-known; a call is static
//! when the callee is a compile-time-evaluable routine and every argument
//! is static. Anything touching a run-time-only input — a non-comptime
//! parameter, a measurement outcome, a call into a deferred routine — is
//! deferred.
//!
//! Inside a region the front end requires to be fully static, the checker
//! relaxes move/alias/borrow restrictions for values that stay static, but
//! a linear resource crossing into a deferred operation still satisfies
//! the ordinary linearity obligations at the crossing point, and control
//! flow over a deferred value is rejected.

use crate::env::Env;
use crate::fir::{Expr, VarId};
use rustc_hash::FxHashSet;

/// Evaluation stage of a sub-expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Resolvable at analysis time
    Static,
    /// Depends on a run-time-only value
    Deferred,
}

impl Stage {
    pub fn both(self, other: Stage) -> Stage {
        if self == Stage::Static && other == Stage::Static {
            Stage::Static
        } else {
            Stage::Deferred
        }
    }

    pub fn is_static(self) -> bool {
        self == Stage::Static
    }
}

/// Tracks which bindings currently hold compile-time-known values
#[derive(Debug, Default)]
pub struct Partitioner {
    static_vars: FxHashSet<VarId>,
}

impl Partitioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a binding holds a compile-time-known value
    pub fn mark_static(&mut self, var: VarId) {
        self.static_vars.insert(var);
    }

    /// Record that a binding now holds a run-time value
    pub fn mark_deferred(&mut self, var: VarId) {
        self.static_vars.remove(&var);
    }

    pub fn is_static_var(&self, var: VarId) -> bool {
        self.static_vars.contains(&var)
    }

    /// Classify a sub-expression
    pub fn stage_of(&self, env: &Env, expr: &Expr) -> Stage {
        match expr {
            Expr::Literal { .. } => Stage::Static,
            Expr::Var { var, .. } | Expr::Borrow { var, .. } => {
                if self.is_static_var(*var) {
                    Stage::Static
                } else {
                    Stage::Deferred
                }
            }
            Expr::Call { callee, args, .. } => {
                let callee_static = env.signature(callee).is_some_and(|sig| sig.comptime);
                if !callee_static {
                    return Stage::Deferred;
                }
                args.iter()
                    .map(|a| self.stage_of(env, a))
                    .fold(Stage::Static, Stage::both)
            }
            Expr::Tuple { elems, .. } | Expr::Array { elems, .. } => elems
                .iter()
                .map(|e| self.stage_of(env, e))
                .fold(Stage::Static, Stage::both),
        }
    }

    /// Capture the current static-variable set (around branch arms)
    pub fn snapshot(&self) -> FxHashSet<VarId> {
        self.static_vars.clone()
    }

    pub fn restore(&mut self, snap: FxHashSet<VarId>) {
        self.static_vars = snap;
    }

    /// Join after a branch: a binding stays static only if every arm kept
    /// it static
    pub fn merge(&mut self, arms: &[FxHashSet<VarId>]) {
        self.static_vars
            .retain(|var| arms.iter().all(|arm| arm.contains(var)));
    }
}
