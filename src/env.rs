//! Signature and declaration environment
//!
//! The environment is the only cross-function input the checker needs: an
//! immutable table of already-finalized callee signatures plus the struct
//! declarations referenced by `Ty::Named`. Recursive and mutually recursive
//! call graphs are handled for free, because a call site is checked against
//! the callee's signature, never its body.

use crate::discipline::Discipline;
use crate::fir::Ty;
use rustc_hash::FxHashMap;

/// Ownership annotation on a parameter
///
/// `Borrowed` is the default: the callee gets temporary access for the
/// duration of the call. `Owned` transfers the argument into the callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamMode {
    #[default]
    Borrowed,
    Owned,
}

/// One parameter of a finalized signature
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
    pub mode: ParamMode,
    /// Whether the argument value is known at analysis time
    pub comptime: bool,
}

impl Param {
    pub fn borrowed(name: impl Into<String>, ty: Ty) -> Self {
        Self {
            name: name.into(),
            ty,
            mode: ParamMode::Borrowed,
            comptime: false,
        }
    }

    pub fn owned(name: impl Into<String>, ty: Ty) -> Self {
        Self {
            name: name.into(),
            ty,
            mode: ParamMode::Owned,
            comptime: false,
        }
    }

    pub fn comptime(mut self) -> Self {
        self.comptime = true;
        self
    }
}

/// A finalized function signature
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Ty,
    /// Destructive terminal operation: owned arguments end their lifetime
    /// here (`Consumed`) instead of moving on (`Moved`)
    pub consumes: bool,
    /// Routine is evaluable at analysis time when all inputs are static
    pub comptime: bool,
}

impl Signature {
    pub fn new(name: impl Into<String>, params: Vec<Param>, ret: Ty) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
            consumes: false,
            comptime: false,
        }
    }

    pub fn consuming(mut self) -> Self {
        self.consumes = true;
        self
    }

    pub fn comptime(mut self) -> Self {
        self.comptime = true;
        self
    }
}

/// A user-declared immutable aggregate
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<(String, Ty)>,
    /// Explicit `linear` / `affine` declaration marker; the derived
    /// discipline never drops below this floor
    pub declared: Option<Discipline>,
}

impl StructDef {
    pub fn new(name: impl Into<String>, fields: Vec<(String, Ty)>) -> Self {
        Self {
            name: name.into(),
            fields,
            declared: None,
        }
    }

    pub fn linear(mut self) -> Self {
        self.declared = Some(Discipline::Linear);
        self
    }

    pub fn affine(mut self) -> Self {
        self.declared = Some(Discipline::Affine);
        self
    }
}

/// Immutable table of finalized signatures and struct declarations
///
/// Shared read-only across parallel function checks.
#[derive(Debug, Clone, Default)]
pub struct Env {
    signatures: FxHashMap<String, Signature>,
    structs: FxHashMap<String, StructDef>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment preloaded with the core quantum operations: allocation,
    /// the common borrowing gates, and the destructive terminals.
    pub fn quantum_prelude() -> Self {
        let mut env = Self::new();
        env.declare_fn(Signature::new("qubit", vec![], Ty::Qubit));
        env.declare_fn(Signature::new(
            "h",
            vec![Param::borrowed("q", Ty::Qubit)],
            Ty::Unit,
        ));
        env.declare_fn(Signature::new(
            "x",
            vec![Param::borrowed("q", Ty::Qubit)],
            Ty::Unit,
        ));
        env.declare_fn(Signature::new(
            "cx",
            vec![
                Param::borrowed("control", Ty::Qubit),
                Param::borrowed("target", Ty::Qubit),
            ],
            Ty::Unit,
        ));
        env.declare_fn(
            Signature::new("measure", vec![Param::owned("q", Ty::Qubit)], Ty::Bool).consuming(),
        );
        env.declare_fn(
            Signature::new("discard", vec![Param::owned("q", Ty::Qubit)], Ty::Unit).consuming(),
        );
        env
    }

    pub fn declare_fn(&mut self, sig: Signature) {
        self.signatures.insert(sig.name.clone(), sig);
    }

    pub fn declare_struct(&mut self, def: StructDef) {
        self.structs.insert(def.name.clone(), def);
    }

    pub fn signature(&self, name: &str) -> Option<&Signature> {
        self.signatures.get(name)
    }

    pub fn struct_def(&self, name: &str) -> Option<&StructDef> {
        self.structs.get(name)
    }
}
