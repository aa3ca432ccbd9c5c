//! Resource disciplines and the type classifier
//!
//! Every type is assigned a usage discipline:
//!
//! ```text
//! Discipline ::= Copyable   -- use any number of times
//!              | Affine     -- use at most once (droppable, not duplicable)
//!              | Linear     -- use exactly once (neither dropped nor duplicated)
//! ```
//!
//! Strictness order: `Copyable < Affine < Linear`. Containers inherit the
//! strictest discipline of their elements, so a tuple holding one qubit is
//! as linear as the qubit itself.

use crate::env::Env;
use crate::fir::Ty;
use rustc_hash::FxHashMap;
use std::fmt;

/// Usage discipline of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Discipline {
    /// Both weakening and contraction allowed
    #[default]
    Copyable,
    /// Weakening allowed (silent drop), no contraction
    Affine,
    /// Neither weakening nor contraction
    Linear,
}

impl Discipline {
    /// The stricter of two disciplines; containers fold their elements
    /// through this
    pub fn strictest(self, other: Discipline) -> Discipline {
        self.max(other)
    }

    /// Whether a value of this discipline may be silently dropped
    pub fn allows_discard(self) -> bool {
        matches!(self, Discipline::Copyable | Discipline::Affine)
    }

    /// Whether a value of this discipline may be duplicated
    pub fn allows_copy(self) -> bool {
        matches!(self, Discipline::Copyable)
    }

    /// Whether the value must be consumed or returned on every exit path
    pub fn must_consume(self) -> bool {
        matches!(self, Discipline::Linear)
    }

    /// Non-copyable values are subject to move/borrow tracking
    pub fn is_resource(self) -> bool {
        !self.allows_copy()
    }
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discipline::Copyable => write!(f, "copyable"),
            Discipline::Affine => write!(f, "affine"),
            Discipline::Linear => write!(f, "linear"),
        }
    }
}

/// Raised when a type descriptor references an undeclared aggregate
///
/// This is the checker's only structural error: analysis of the affected
/// function cannot proceed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown type `{name}`")]
pub struct UnknownTypeError {
    pub name: String,
}

/// Memoizing discipline classifier over type descriptors
///
/// Side-effect free apart from the memo table; safe to query repeatedly.
pub struct Classifier<'e> {
    env: &'e Env,
    memo: FxHashMap<Ty, Discipline>,
    visiting: Vec<String>,
}

impl<'e> Classifier<'e> {
    pub fn new(env: &'e Env) -> Self {
        Self {
            env,
            memo: FxHashMap::default(),
            visiting: Vec::new(),
        }
    }

    /// Classify a type, bottom-up, memoized
    pub fn classify(&mut self, ty: &Ty) -> Result<Discipline, UnknownTypeError> {
        if let Some(d) = self.memo.get(ty) {
            return Ok(*d);
        }

        let discipline = match ty {
            Ty::Unit | Ty::Bool | Ty::Int | Ty::Float => Discipline::Copyable,
            Ty::Qubit => Discipline::Linear,
            Ty::Array(elem, _) => self.classify(elem)?,
            Ty::Tuple(elems) => {
                let mut d = Discipline::Copyable;
                for elem in elems {
                    d = d.strictest(self.classify(elem)?);
                }
                d
            }
            Ty::Named(name) => {
                let Some(def) = self.env.struct_def(name) else {
                    return Err(UnknownTypeError { name: name.clone() });
                };
                // A struct mentioned while its own fields are being
                // classified contributes only its declared marker.
                if self.visiting.iter().any(|n| n == name) {
                    return Ok(def.declared.unwrap_or_default());
                }
                self.visiting.push(name.clone());
                let mut derived = def.declared.unwrap_or_default();
                let fields = def.fields.clone();
                let result = fields
                    .iter()
                    .try_for_each(|(_, field_ty)| -> Result<(), UnknownTypeError> {
                        derived = derived.strictest(self.classify(field_ty)?);
                        Ok(())
                    });
                self.visiting.pop();
                result?;
                derived
            }
        };

        self.memo.insert(ty.clone(), discipline);
        Ok(discipline)
    }
}
