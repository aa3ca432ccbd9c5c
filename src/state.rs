//! Binding state tracking
//!
//! Maintains, per program point, the state of each local binding and
//! updates it on read, move, borrow, consume, and reassignment. States form
//! a small lattice:
//!
//! ```text
//! Uninitialized → Owned → { Moved | Borrowed(k) | Consumed }
//! ```
//!
//! `Moved` and `Consumed` are terminal for a logical binding instance; the
//! only way back is explicit reassignment, which starts a fresh instance
//! (tracked by a generation counter) shadowing the old one.

use crate::common::NodeId;
use crate::discipline::Discipline;
use crate::fir::VarId;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fmt;

/// State of one binding at a program point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// Declared but not yet initialized
    Uninitialized,
    /// Available, not borrowed
    Owned,
    /// Lent out; `origin` is the first live borrow's program point
    Borrowed { count: u32, origin: NodeId },
    /// Ownership transferred away at `at`
    Moved { at: NodeId },
    /// Ended by a destructive terminal operation at `at`
    Consumed { at: NodeId },
}

impl BindingState {
    /// Usable states: the value is present
    pub fn is_live(self) -> bool {
        matches!(self, BindingState::Owned | BindingState::Borrowed { .. })
    }

    /// Terminal states: the instance is permanently dead
    pub fn is_dead(self) -> bool {
        matches!(self, BindingState::Moved { .. } | BindingState::Consumed { .. })
    }

    /// Program point where the instance died, if dead
    pub fn dead_at(self) -> Option<NodeId> {
        match self {
            BindingState::Moved { at } | BindingState::Consumed { at } => Some(at),
            _ => None,
        }
    }
}

impl fmt::Display for BindingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingState::Uninitialized => write!(f, "uninitialized"),
            BindingState::Owned => write!(f, "owned"),
            BindingState::Borrowed { count, .. } => write!(f, "borrowed({count})"),
            BindingState::Moved { .. } => write!(f, "moved"),
            BindingState::Consumed { .. } => write!(f, "consumed"),
        }
    }
}

/// A tracked binding instance
#[derive(Debug, Clone)]
pub struct TrackedBinding {
    pub var: VarId,
    pub name: String,
    pub discipline: Discipline,
    pub state: BindingState,
    /// Program point where the current instance began
    pub origin: NodeId,
    /// Incremented on reassignment and retirement
    pub generation: u32,
    /// Binding backs a `Borrowed`-mode parameter: the caller keeps
    /// ownership, so moving or consuming it is illegal
    pub borrowed_param: bool,
}

/// Illegal transition detected by the tracker
///
/// The checker maps these onto the diagnostic taxonomy with full span
/// context; the tracker itself only knows states and program points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// Any use of a moved/consumed (or never-initialized) instance
    UseAfterMove { name: String, prior: NodeId },
    /// Second concurrent borrow of a non-copyable binding
    DoubleBorrow { name: String, first: NodeId },
    /// Move or consume attempted while a borrow is active
    MoveWhileBorrowed { name: String },
    /// Move or consume of a `Borrowed`-mode parameter
    BorrowedParamEscapes { name: String },
    /// Reassignment would silently lose a live linear value
    DiscardOnReassign { name: String, origin: NodeId },
}

/// Snapshot of one binding for merge decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingSnapshot {
    pub state: BindingState,
    pub generation: u32,
}

/// Ordered post-condition map used by the control-flow merge engine
pub type StateMap = BTreeMap<VarId, BindingSnapshot>;

/// Tracks the state of every binding in one function body
#[derive(Debug, Default)]
pub struct BindingTracker {
    bindings: FxHashMap<VarId, TrackedBinding>,
}

impl BindingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a local as declared-but-uninitialized
    pub fn register(&mut self, var: VarId, name: impl Into<String>, discipline: Discipline) {
        self.bindings.insert(
            var,
            TrackedBinding {
                var,
                name: name.into(),
                discipline,
                state: BindingState::Uninitialized,
                origin: NodeId::dummy(),
                generation: 0,
                borrowed_param: false,
            },
        );
    }

    /// Register a parameter as owned on entry
    pub fn declare_param(
        &mut self,
        var: VarId,
        name: impl Into<String>,
        discipline: Discipline,
        at: NodeId,
        borrowed_param: bool,
    ) {
        self.bindings.insert(
            var,
            TrackedBinding {
                var,
                name: name.into(),
                discipline,
                state: BindingState::Owned,
                origin: at,
                generation: 0,
                borrowed_param,
            },
        );
    }

    pub fn binding(&self, var: VarId) -> &TrackedBinding {
        &self.bindings[&var]
    }

    pub fn bindings(&self) -> impl Iterator<Item = &TrackedBinding> {
        self.bindings.values()
    }

    fn get_mut(&mut self, var: VarId) -> &mut TrackedBinding {
        self.bindings
            .get_mut(&var)
            .expect("binding registered before use")
    }

    /// First initialization: `Uninitialized → Owned`
    pub fn init(&mut self, var: VarId, at: NodeId) {
        let b = self.get_mut(var);
        b.state = BindingState::Owned;
        b.origin = at;
    }

    /// Explicit reassignment: retire the old instance, start a fresh one
    pub fn reassign(&mut self, var: VarId, at: NodeId) -> Result<(), AccessError> {
        let b = self.get_mut(var);
        let result = match b.state {
            BindingState::Borrowed { .. } => Err(AccessError::MoveWhileBorrowed {
                name: b.name.clone(),
            }),
            BindingState::Owned if b.discipline.must_consume() => {
                Err(AccessError::DiscardOnReassign {
                    name: b.name.clone(),
                    origin: b.origin,
                })
            }
            _ => Ok(()),
        };
        b.state = BindingState::Owned;
        b.origin = at;
        b.generation += 1;
        result
    }

    /// Non-destructive read; legal in any live state
    pub fn read(&mut self, var: VarId, _at: NodeId) -> Result<(), AccessError> {
        let b = self.get_mut(var);
        match b.state {
            BindingState::Owned | BindingState::Borrowed { .. } => Ok(()),
            BindingState::Uninitialized => Err(AccessError::UseAfterMove {
                name: b.name.clone(),
                prior: b.origin,
            }),
            BindingState::Moved { at } | BindingState::Consumed { at } => {
                Err(AccessError::UseAfterMove {
                    name: b.name.clone(),
                    prior: at,
                })
            }
        }
    }

    /// Transfer ownership out of the binding
    ///
    /// On a copyable binding this is an alias for `read`: copies are
    /// implicit and the source stays available.
    pub fn move_out(&mut self, var: VarId, at: NodeId) -> Result<(), AccessError> {
        if self.binding(var).discipline.allows_copy() {
            return self.read(var, at);
        }
        let b = self.get_mut(var);
        match b.state {
            BindingState::Owned if b.borrowed_param => Err(AccessError::BorrowedParamEscapes {
                name: b.name.clone(),
            }),
            BindingState::Owned => {
                b.state = BindingState::Moved { at };
                Ok(())
            }
            BindingState::Borrowed { .. } => Err(AccessError::MoveWhileBorrowed {
                name: b.name.clone(),
            }),
            BindingState::Uninitialized => Err(AccessError::UseAfterMove {
                name: b.name.clone(),
                prior: b.origin,
            }),
            BindingState::Moved { at } | BindingState::Consumed { at } => {
                Err(AccessError::UseAfterMove {
                    name: b.name.clone(),
                    prior: at,
                })
            }
        }
    }

    /// End the instance via a destructive terminal operation
    pub fn consume(&mut self, var: VarId, at: NodeId) -> Result<(), AccessError> {
        if self.binding(var).discipline.allows_copy() {
            return self.read(var, at);
        }
        let b = self.get_mut(var);
        match b.state {
            BindingState::Owned if b.borrowed_param => Err(AccessError::BorrowedParamEscapes {
                name: b.name.clone(),
            }),
            BindingState::Owned => {
                b.state = BindingState::Consumed { at };
                Ok(())
            }
            BindingState::Borrowed { .. } => Err(AccessError::MoveWhileBorrowed {
                name: b.name.clone(),
            }),
            BindingState::Uninitialized => Err(AccessError::UseAfterMove {
                name: b.name.clone(),
                prior: b.origin,
            }),
            BindingState::Moved { at } | BindingState::Consumed { at } => {
                Err(AccessError::UseAfterMove {
                    name: b.name.clone(),
                    prior: at,
                })
            }
        }
    }

    /// Open a borrow; at most one may be active on a non-copyable binding
    ///
    /// Borrows of copyable values are advisory and never recorded.
    pub fn borrow_begin(&mut self, var: VarId, at: NodeId) -> Result<(), AccessError> {
        if self.binding(var).discipline.allows_copy() {
            return self.read(var, at);
        }
        let b = self.get_mut(var);
        match b.state {
            BindingState::Owned => {
                b.state = BindingState::Borrowed { count: 1, origin: at };
                Ok(())
            }
            BindingState::Borrowed { origin, .. } => Err(AccessError::DoubleBorrow {
                name: b.name.clone(),
                first: origin,
            }),
            BindingState::Uninitialized => Err(AccessError::UseAfterMove {
                name: b.name.clone(),
                prior: b.origin,
            }),
            BindingState::Moved { at } | BindingState::Consumed { at } => {
                Err(AccessError::UseAfterMove {
                    name: b.name.clone(),
                    prior: at,
                })
            }
        }
    }

    /// Close a borrow, restoring eligibility for moves and new borrows
    pub fn borrow_end(&mut self, var: VarId) {
        if self.binding(var).discipline.allows_copy() {
            return;
        }
        let b = self.get_mut(var);
        if let BindingState::Borrowed { count, origin } = b.state {
            b.state = if count > 1 {
                BindingState::Borrowed {
                    count: count - 1,
                    origin,
                }
            } else {
                BindingState::Owned
            };
        }
    }

    /// Retire a binding at end-of-scope, returning it to `Uninitialized`
    /// so a later iteration of the enclosing loop can re-declare it
    pub fn retire(&mut self, var: VarId) {
        let b = self.get_mut(var);
        b.state = BindingState::Uninitialized;
        b.generation += 1;
    }

    /// Capture the post-condition state of every binding, ordered by var
    pub fn snapshot(&self) -> StateMap {
        self.bindings
            .iter()
            .map(|(var, b)| {
                (
                    *var,
                    BindingSnapshot {
                        state: b.state,
                        generation: b.generation,
                    },
                )
            })
            .collect()
    }

    /// Restore a previously captured snapshot
    pub fn restore(&mut self, snap: &StateMap) {
        for (var, entry) in snap {
            let b = self.get_mut(*var);
            b.state = entry.state;
            b.generation = entry.generation;
        }
    }

    /// Overwrite one binding's state (used by the merge engine)
    pub fn set_state(&mut self, var: VarId, state: BindingState) {
        self.get_mut(var).state = state;
    }
}
