//! Function intermediate representation consumed by the checker
//!
//! The front end hands the checker a typed, desugared body per function: a
//! closed algebraic set of statement and expression nodes with explicit
//! variable bindings. There is deliberately no open/dynamic tree here; the
//! checker pattern-matches these variants exhaustively.
//!
//! Every node carries a [`NodeId`] program point. Spans are optional
//! side-band data (`Body::spans`) used only to decorate diagnostics.

use crate::common::{IdGenerator, NodeId, Span};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a local binding within a [`Body`]
///
/// Parameters occupy the first slots, in signature order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub u32);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Type descriptor
///
/// A closed tree of primitive and container kinds. `Named` aggregates are
/// resolved through the environment; referencing an undeclared name is the
/// checker's one fatal error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ty {
    Unit,
    Bool,
    Int,
    Float,
    /// The non-duplicable resource primitive
    Qubit,
    /// Fixed-size array
    Array(Box<Ty>, usize),
    Tuple(Vec<Ty>),
    /// User-declared aggregate, looked up in the environment
    Named(String),
}

impl Ty {
    pub fn array(elem: Ty, len: usize) -> Self {
        Ty::Array(Box::new(elem), len)
    }

    pub fn tuple(elems: impl IntoIterator<Item = Ty>) -> Self {
        Ty::Tuple(elems.into_iter().collect())
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Unit => write!(f, "()"),
            Ty::Bool => write!(f, "bool"),
            Ty::Int => write!(f, "int"),
            Ty::Float => write!(f, "float"),
            Ty::Qubit => write!(f, "qubit"),
            Ty::Array(elem, n) => write!(f, "[{elem}; {n}]"),
            Ty::Tuple(elems) => {
                write!(f, "(")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, ")")
            }
            Ty::Named(name) => write!(f, "{name}"),
        }
    }
}

/// Literal constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
}

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal {
        id: NodeId,
        value: Literal,
        ty: Ty,
    },
    /// Use of a binding; whether it reads, copies, or moves depends on the
    /// binding's discipline and the position of the use
    Var {
        id: NodeId,
        var: VarId,
    },
    /// Explicit borrow of a binding; legal only as a call argument
    Borrow {
        id: NodeId,
        var: VarId,
    },
    /// Call to a resolved callee; overloads are resolved upstream, so each
    /// call site names exactly one signature in the environment
    Call {
        id: NodeId,
        callee: String,
        args: Vec<Expr>,
    },
    Tuple {
        id: NodeId,
        elems: Vec<Expr>,
    },
    Array {
        id: NodeId,
        elems: Vec<Expr>,
    },
}

impl Expr {
    pub fn id(&self) -> NodeId {
        match self {
            Expr::Literal { id, .. }
            | Expr::Var { id, .. }
            | Expr::Borrow { id, .. }
            | Expr::Call { id, .. }
            | Expr::Tuple { id, .. }
            | Expr::Array { id, .. } => *id,
        }
    }
}

/// Statement node
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// First initialization of a local
    Declare { id: NodeId, var: VarId, value: Expr },
    /// Reassignment; retires the old logical binding instance and starts a
    /// fresh one shadowing it
    Reassign { id: NodeId, var: VarId, value: Expr },
    /// Expression evaluated for effect
    Expr { id: NodeId, expr: Expr },
    If {
        id: NodeId,
        cond: Expr,
        then_arm: Block,
        else_arm: Option<Block>,
    },
    While {
        id: NodeId,
        cond: Expr,
        body: Block,
    },
    /// Iteration over an array; takes ownership of the iterable
    For {
        id: NodeId,
        var: VarId,
        iter: Expr,
        body: Block,
    },
    Return { id: NodeId, value: Option<Expr> },
    /// Region the front end requires to be fully compile-time-evaluated
    ComptimeRegion { id: NodeId, body: Block },
}

impl Stmt {
    pub fn id(&self) -> NodeId {
        match self {
            Stmt::Declare { id, .. }
            | Stmt::Reassign { id, .. }
            | Stmt::Expr { id, .. }
            | Stmt::If { id, .. }
            | Stmt::While { id, .. }
            | Stmt::For { id, .. }
            | Stmt::Return { id, .. }
            | Stmt::ComptimeRegion { id, .. } => *id,
        }
    }
}

/// A sequence of statements forming one lexical scope
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self { stmts }
    }
}

/// Declaration attributes of one local binding
#[derive(Debug, Clone, PartialEq)]
pub struct LocalDecl {
    pub name: String,
    pub ty: Ty,
}

/// A typed, desugared function body
#[derive(Debug, Clone)]
pub struct Body {
    pub name: String,
    /// Locals backing the parameters, in signature order
    pub params: Vec<VarId>,
    pub locals: Vec<LocalDecl>,
    pub block: Block,
    /// Optional source spans per program point
    pub spans: FxHashMap<NodeId, Span>,
}

impl Body {
    pub fn local(&self, var: VarId) -> &LocalDecl {
        &self.locals[var.0 as usize]
    }

    pub fn span_for(&self, id: NodeId) -> Span {
        self.spans.get(&id).copied().unwrap_or_else(Span::dummy)
    }
}

/// Builder used by front ends (and tests) to assemble a [`Body`]
///
/// Parameters must be added first, in signature order.
pub struct BodyBuilder {
    name: String,
    params: Vec<VarId>,
    locals: Vec<LocalDecl>,
    spans: FxHashMap<NodeId, Span>,
    ids: IdGenerator,
}

impl BodyBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            locals: Vec::new(),
            spans: FxHashMap::default(),
            ids: IdGenerator::new(),
        }
    }

    /// Add a parameter binding; call before any `local`
    pub fn param(&mut self, name: impl Into<String>, ty: Ty) -> VarId {
        let var = self.fresh_local(name, ty);
        self.params.push(var);
        var
    }

    /// Add a non-parameter local binding
    pub fn local(&mut self, name: impl Into<String>, ty: Ty) -> VarId {
        self.fresh_local(name, ty)
    }

    fn fresh_local(&mut self, name: impl Into<String>, ty: Ty) -> VarId {
        let var = VarId(self.locals.len() as u32);
        self.locals.push(LocalDecl {
            name: name.into(),
            ty,
        });
        var
    }

    /// Record a source span for a node
    pub fn set_span(&mut self, id: NodeId, span: Span) {
        self.spans.insert(id, span);
    }

    pub fn lit(&mut self, value: Literal, ty: Ty) -> Expr {
        Expr::Literal {
            id: self.ids.next(),
            value,
            ty,
        }
    }

    pub fn int(&mut self, value: i64) -> Expr {
        self.lit(Literal::Int(value), Ty::Int)
    }

    pub fn bool(&mut self, value: bool) -> Expr {
        self.lit(Literal::Bool(value), Ty::Bool)
    }

    pub fn var(&mut self, var: VarId) -> Expr {
        Expr::Var {
            id: self.ids.next(),
            var,
        }
    }

    pub fn borrow(&mut self, var: VarId) -> Expr {
        Expr::Borrow {
            id: self.ids.next(),
            var,
        }
    }

    pub fn call(&mut self, callee: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call {
            id: self.ids.next(),
            callee: callee.into(),
            args,
        }
    }

    pub fn tuple(&mut self, elems: Vec<Expr>) -> Expr {
        Expr::Tuple {
            id: self.ids.next(),
            elems,
        }
    }

    pub fn array(&mut self, elems: Vec<Expr>) -> Expr {
        Expr::Array {
            id: self.ids.next(),
            elems,
        }
    }

    pub fn declare(&mut self, var: VarId, value: Expr) -> Stmt {
        Stmt::Declare {
            id: self.ids.next(),
            var,
            value,
        }
    }

    pub fn reassign(&mut self, var: VarId, value: Expr) -> Stmt {
        Stmt::Reassign {
            id: self.ids.next(),
            var,
            value,
        }
    }

    pub fn expr_stmt(&mut self, expr: Expr) -> Stmt {
        Stmt::Expr {
            id: self.ids.next(),
            expr,
        }
    }

    pub fn if_(&mut self, cond: Expr, then_arm: Block, else_arm: Option<Block>) -> Stmt {
        Stmt::If {
            id: self.ids.next(),
            cond,
            then_arm,
            else_arm,
        }
    }

    pub fn while_(&mut self, cond: Expr, body: Block) -> Stmt {
        Stmt::While {
            id: self.ids.next(),
            cond,
            body,
        }
    }

    pub fn for_(&mut self, var: VarId, iter: Expr, body: Block) -> Stmt {
        Stmt::For {
            id: self.ids.next(),
            var,
            iter,
            body,
        }
    }

    pub fn return_(&mut self, value: Option<Expr>) -> Stmt {
        Stmt::Return {
            id: self.ids.next(),
            value,
        }
    }

    pub fn comptime(&mut self, body: Block) -> Stmt {
        Stmt::ComptimeRegion {
            id: self.ids.next(),
            body,
        }
    }

    pub fn finish(self, block: Block) -> Body {
        Body {
            name: self.name,
            params: self.params,
            locals: self.locals,
            block,
            spans: self.spans,
        }
    }
}
