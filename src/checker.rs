//! Ownership and linearity checking of one function body
//!
//! The checker walks the typed, desugared body once, threading the binding
//! state tracker, the borrow set, and the compile-time partitioner through
//! every statement. Branch arms and loop bodies are analyzed from snapshots
//! and reconciled by the merge engine. Ordinary violations accumulate;
//! `UnknownType` (an undeclared aggregate or callee) aborts the function's
//! analysis immediately.

use crate::borrow::{BorrowHandle, BorrowSet};
use crate::common::NodeId;
use crate::comptime::Partitioner;
use crate::diagnostics::{CheckError, CheckResult};
use crate::discipline::{Classifier, Discipline};
use crate::env::{Env, ParamMode, Signature};
use crate::fir::{Block, Body, Expr, Stmt, Ty, VarId};
use crate::merge;
use crate::state::{AccessError, BindingState, BindingTracker};
use tracing::{debug, trace};

/// How a use site treats the value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UseMode {
    /// Non-destructive read (conditions, copyable arguments)
    Read,
    /// Ownership leaves the binding (initializers, owned arguments, returns)
    Move,
}

/// Where a use occurs, for mapping tracker errors onto the taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UseCtx {
    Value,
    CallArg,
    ReturnValue,
}

/// Check one function body against its signature and environment
///
/// This is the checker's primary entry point. The environment holds the
/// finalized signatures of every callee (including the function itself, so
/// recursion is checked against the declared contract, not by reanalysis).
pub fn check(body: &Body, sig: &Signature, env: &Env) -> CheckResult {
    debug!(function = %body.name, "checking ownership and linearity");
    let mut checker = Checker {
        env,
        sig,
        body,
        classifier: Classifier::new(env),
        tracker: BindingTracker::new(),
        borrows: BorrowSet::new(),
        partitioner: Partitioner::new(),
        comptime_depth: 0,
        scopes: Vec::new(),
        diags: Vec::new(),
    };
    match checker.run() {
        Err(fatal) => Err(vec![fatal]),
        Ok(()) if checker.diags.is_empty() => Ok(()),
        Ok(()) => Err(checker.diags),
    }
}

struct Checker<'a> {
    env: &'a Env,
    sig: &'a Signature,
    body: &'a Body,
    classifier: Classifier<'a>,
    tracker: BindingTracker,
    borrows: BorrowSet,
    partitioner: Partitioner,
    comptime_depth: u32,
    /// Bindings declared per lexical block, innermost last
    scopes: Vec<Vec<VarId>>,
    diags: Vec<CheckError>,
}

impl<'a> Checker<'a> {
    /// Walk the whole body; `Err` carries the single fatal diagnostic
    fn run(&mut self) -> Result<(), CheckError> {
        self.enter_bindings()?;

        let body = self.body;
        let exit_point = body
            .block
            .stmts
            .last()
            .map(Stmt::id)
            .unwrap_or_else(NodeId::dummy);
        let diverged = self.check_block(&body.block, exit_point)?;
        if !diverged {
            self.exit_check(exit_point);
        }
        Ok(())
    }

    /// Classify every binding's type and seed the tracker
    ///
    /// Classification up front surfaces `UnknownType` before any dataflow
    /// runs, and caches the discipline for the rest of the walk.
    fn enter_bindings(&mut self) -> Result<(), CheckError> {
        debug_assert_eq!(
            self.body.params.len(),
            self.sig.params.len(),
            "body/signature parameter mismatch is a front-end bug"
        );

        let body = self.body;
        let sig = self.sig;
        for (var, param) in body.params.iter().zip(&sig.params) {
            let discipline = self.classify(&param.ty, NodeId::dummy())?;
            self.tracker.declare_param(
                *var,
                param.name.clone(),
                discipline,
                NodeId::dummy(),
                param.mode == ParamMode::Borrowed,
            );
            if param.comptime {
                self.partitioner.mark_static(*var);
            }
        }

        for (idx, local) in body.locals.iter().enumerate() {
            let var = VarId(idx as u32);
            if body.params.contains(&var) {
                continue;
            }
            let discipline = self.classify(&local.ty, NodeId::dummy())?;
            self.tracker.register(var, local.name.clone(), discipline);
        }
        Ok(())
    }

    fn classify(&mut self, ty: &Ty, at: NodeId) -> Result<Discipline, CheckError> {
        self.classifier
            .classify(ty)
            .map_err(|e| CheckError::UnknownType {
                name: e.name,
                point: at,
                span: self.body.span_for(at).into(),
            })
    }

    /// Analyze one lexical block; returns whether every path out of it
    /// ends in a `Return`
    fn check_block(&mut self, block: &Block, at: NodeId) -> Result<bool, CheckError> {
        self.scopes.push(Vec::new());
        let mut diverged = false;

        for stmt in &block.stmts {
            if diverged {
                // Unreachable after a return; nothing left to track.
                break;
            }
            diverged = self.check_stmt(stmt)?;
            self.sweep_statement();
        }

        let declared = self.scopes.pop().unwrap_or_default();
        if !diverged {
            self.scope_end_check(&declared, at);
        }
        for var in declared {
            self.tracker.retire(var);
        }
        Ok(diverged)
    }

    /// Report linear bindings a closing scope would silently drop
    fn scope_end_check(&mut self, declared: &[VarId], at: NodeId) {
        let mut vars: Vec<VarId> = declared.to_vec();
        vars.sort();
        for var in vars {
            let b = self.tracker.binding(var);
            if b.discipline.must_consume() && b.state.is_live() {
                self.diags.push(CheckError::ImplicitDiscard {
                    name: b.name.clone(),
                    point: at,
                    span: self.body.span_for(at).into(),
                    decl_span: self.body.span_for(b.origin).into(),
                });
            }
        }
    }

    /// Borrows may not survive the statement that created them
    fn sweep_statement(&mut self) {
        for leftover in self.borrows.sweep() {
            let name = self.tracker.binding(leftover.var).name.clone();
            self.diags.push(CheckError::BorrowEscapes {
                name,
                point: leftover.origin,
                span: self.body.span_for(leftover.origin).into(),
            });
            self.tracker.borrow_end(leftover.var);
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> Result<bool, CheckError> {
        trace!(stmt = ?stmt.id(), "checking statement");
        match stmt {
            Stmt::Declare { id, var, value } => {
                let is_static = self.partitioner.stage_of(self.env, value).is_static();
                self.check_expr(value, UseMode::Move, UseCtx::Value)?;
                self.tracker.init(*var, *id);
                if is_static {
                    self.partitioner.mark_static(*var);
                } else {
                    self.partitioner.mark_deferred(*var);
                }
                if let Some(scope) = self.scopes.last_mut() {
                    scope.push(*var);
                }
                Ok(false)
            }

            Stmt::Reassign { id, var, value } => {
                let is_static = self.partitioner.stage_of(self.env, value).is_static();
                self.check_expr(value, UseMode::Move, UseCtx::Value)?;
                if let Err(e) = self.tracker.reassign(*var, *id) {
                    self.report_access(e, *id, UseCtx::Value);
                }
                if is_static {
                    self.partitioner.mark_static(*var);
                } else {
                    self.partitioner.mark_deferred(*var);
                }
                Ok(false)
            }

            Stmt::Expr { id, expr } => {
                self.check_expr(expr, UseMode::Move, UseCtx::Value)?;
                self.check_discarded_result(expr, *id)?;
                Ok(false)
            }

            Stmt::If {
                id,
                cond,
                then_arm,
                else_arm,
            } => {
                self.require_static_condition(cond, *id);
                self.check_expr(cond, UseMode::Read, UseCtx::Value)?;

                let pre = self.tracker.snapshot();
                let pre_static = self.partitioner.snapshot();

                let then_diverged = self.check_block(then_arm, *id)?;
                let then_state = self.tracker.snapshot();
                let then_static = self.partitioner.snapshot();

                self.tracker.restore(&pre);
                self.partitioner.restore(pre_static.clone());

                let (else_diverged, else_state, else_static) = match else_arm {
                    Some(arm) => {
                        let d = self.check_block(arm, *id)?;
                        let s = self.tracker.snapshot();
                        let st = self.partitioner.snapshot();
                        self.tracker.restore(&pre);
                        self.partitioner.restore(pre_static.clone());
                        (d, s, st)
                    }
                    // A missing else is an arm that touches nothing.
                    None => (false, pre.clone(), pre_static.clone()),
                };

                match (then_diverged, else_diverged) {
                    (true, true) => Ok(true),
                    (true, false) => {
                        self.tracker.restore(&else_state);
                        self.partitioner.restore(else_static);
                        Ok(false)
                    }
                    (false, true) => {
                        self.tracker.restore(&then_state);
                        self.partitioner.restore(then_static);
                        Ok(false)
                    }
                    (false, false) => {
                        let (merged, conflicts) =
                            merge::merge_branches(&self.tracker, &pre, &[then_state, else_state]);
                        for var in conflicts {
                            let name = self.tracker.binding(var).name.clone();
                            self.diags.push(CheckError::InconsistentBranchOwnership {
                                name,
                                point: *id,
                                span: self.body.span_for(*id).into(),
                            });
                        }
                        self.tracker.restore(&merged);
                        self.partitioner.restore(then_static);
                        self.partitioner.merge(&[else_static]);
                        Ok(false)
                    }
                }
            }

            Stmt::While { id, cond, body } => {
                let cond_was_static = self.partitioner.stage_of(self.env, cond).is_static();
                self.require_static_condition(cond, *id);
                self.check_expr(cond, UseMode::Read, UseCtx::Value)?;

                let pre = self.tracker.snapshot();
                let pre_static = self.partitioner.snapshot();

                let diverged = self.check_block(body, *id)?;
                let mut post_static = None;
                if !diverged {
                    let post = self.tracker.snapshot();
                    for var in merge::check_loop(&self.tracker, &pre, &post) {
                        let name = self.tracker.binding(var).name.clone();
                        self.diags.push(CheckError::LoopConsumesResource {
                            name,
                            point: *id,
                            span: self.body.span_for(*id).into(),
                        });
                    }
                    post_static = Some(self.partitioner.snapshot());
                }

                // Zero iterations must also type-check, so the post-loop
                // state is the pre-loop state; a binding the body turned
                // run-time stays run-time, exactly like a branch join.
                self.tracker.restore(&pre);
                self.partitioner.restore(pre_static);
                if let Some(post) = post_static {
                    self.partitioner.merge(&[post]);
                    // Iterations after the first see the post-body staging,
                    // so the condition must stay static under it too.
                    if self.comptime_depth > 0
                        && cond_was_static
                        && !self.partitioner.stage_of(self.env, cond).is_static()
                    {
                        self.diags.push(CheckError::NonStaticControlFlow {
                            point: *id,
                            span: self.body.span_for(cond.id()).into(),
                        });
                    }
                }
                Ok(false)
            }

            Stmt::For {
                id,
                var,
                iter,
                body,
            } => {
                self.require_static_condition(iter, *id);
                // Array iteration takes ownership of the iterable.
                self.check_expr(iter, UseMode::Move, UseCtx::Value)?;
                let iter_static = self.partitioner.stage_of(self.env, iter).is_static();

                let pre = self.tracker.snapshot();
                let pre_static = self.partitioner.snapshot();

                self.tracker.init(*var, *id);
                if iter_static {
                    self.partitioner.mark_static(*var);
                } else {
                    self.partitioner.mark_deferred(*var);
                }

                let diverged = self.check_block(body, *id)?;
                let mut post_static = None;
                if !diverged {
                    // The element binding is fresh each iteration; leaving
                    // a linear element live leaks one value per pass.
                    let b = self.tracker.binding(*var);
                    if b.discipline.must_consume() && b.state.is_live() {
                        self.diags.push(CheckError::ImplicitDiscard {
                            name: b.name.clone(),
                            point: *id,
                            span: self.body.span_for(*id).into(),
                            decl_span: self.body.span_for(*id).into(),
                        });
                    }
                    self.tracker.retire(*var);

                    let post = self.tracker.snapshot();
                    for carried in merge::check_loop(&self.tracker, &pre, &post) {
                        if carried == *var {
                            continue;
                        }
                        let name = self.tracker.binding(carried).name.clone();
                        self.diags.push(CheckError::LoopConsumesResource {
                            name,
                            point: *id,
                            span: self.body.span_for(*id).into(),
                        });
                    }
                    post_static = Some(self.partitioner.snapshot());
                }

                self.tracker.restore(&pre);
                // A binding the body turned run-time stays run-time past
                // the loop, as at a branch join.
                self.partitioner.restore(pre_static);
                if let Some(post) = post_static {
                    self.partitioner.merge(&[post]);
                }
                Ok(false)
            }

            Stmt::Return { id, value } => {
                if let Some(v) = value {
                    self.check_expr(v, UseMode::Move, UseCtx::ReturnValue)?;
                }
                self.exit_check(*id);
                Ok(true)
            }

            Stmt::ComptimeRegion { id, body } => {
                self.comptime_depth += 1;
                let diverged = self.check_block(body, *id);
                self.comptime_depth -= 1;
                diverged
            }
        }
    }

    /// Inside a compile-time region, control flow may only depend on
    /// compile-time-known values
    fn require_static_condition(&mut self, cond: &Expr, at: NodeId) {
        if self.comptime_depth > 0 && !self.partitioner.stage_of(self.env, cond).is_static() {
            self.diags.push(CheckError::NonStaticControlFlow {
                point: at,
                span: self.body.span_for(cond.id()).into(),
            });
        }
    }

    fn check_expr(&mut self, expr: &Expr, mode: UseMode, ctx: UseCtx) -> Result<(), CheckError> {
        match expr {
            Expr::Literal { .. } => Ok(()),

            Expr::Var { id, var } => {
                let relaxed = self.comptime_depth > 0 && self.partitioner.is_static_var(*var);
                let result = if mode == UseMode::Read || relaxed {
                    self.tracker.read(*var, *id)
                } else {
                    self.tracker.move_out(*var, *id)
                };
                if let Err(e) = result {
                    self.report_access(e, *id, ctx);
                }
                Ok(())
            }

            Expr::Borrow { id, var } => {
                // A borrow outside a call argument has no operation to
                // bind its lifetime to. Open it anyway and leave it to the
                // boundary sweeps: the statement sweep reports it as an
                // escape, the exit sweep as a leak.
                if let Err(e) = self.tracker.borrow_begin(*var, *id) {
                    self.report_access(e, *id, ctx);
                } else {
                    self.borrows.open(*var, *id);
                }
                Ok(())
            }

            Expr::Call { id, callee, args } => self.check_call(*id, callee, args),

            Expr::Tuple { elems, .. } | Expr::Array { elems, .. } => {
                for elem in elems {
                    self.check_expr(elem, mode, ctx)?;
                }
                Ok(())
            }
        }
    }

    /// Validate a call site against the callee's declared signature
    fn check_call(&mut self, id: NodeId, callee: &str, args: &[Expr]) -> Result<(), CheckError> {
        let Some(sig) = self.env.signature(callee) else {
            // An unresolved callee is structural, like an undeclared type.
            return Err(CheckError::UnknownType {
                name: callee.to_string(),
                point: id,
                span: self.body.span_for(id).into(),
            });
        };
        let sig = sig.clone();

        if args.len() != sig.params.len() {
            self.diags.push(CheckError::OwnershipMismatch {
                name: callee.to_string(),
                reason: format!(
                    "call takes {} argument(s) but {} were supplied",
                    sig.params.len(),
                    args.len()
                ),
                point: id,
                span: self.body.span_for(id).into(),
            });
            for arg in args {
                self.check_expr(arg, UseMode::Read, UseCtx::Value)?;
            }
            return Ok(());
        }

        // A fully static call inside a compile-time region runs under the
        // host language's native semantics: aliasing and reuse permitted.
        if self.comptime_depth > 0
            && sig.comptime
            && args
                .iter()
                .all(|a| self.partitioner.stage_of(self.env, a).is_static())
        {
            for arg in args {
                self.check_expr(arg, UseMode::Read, UseCtx::Value)?;
            }
            return Ok(());
        }

        trace!(call = callee, point = ?id, "checking call site");
        let mut open: Vec<(BorrowHandle, VarId)> = Vec::new();

        for (param, arg) in sig.params.iter().zip(args) {
            match param.mode {
                ParamMode::Borrowed => {
                    let discipline = self.classify(&param.ty, arg.id())?;
                    if discipline.allows_copy() {
                        self.check_expr(arg, UseMode::Read, UseCtx::Value)?;
                        continue;
                    }
                    match arg {
                        Expr::Var { id: aid, var } | Expr::Borrow { id: aid, var } => {
                            match self.tracker.borrow_begin(*var, *aid) {
                                Ok(()) => open.push((self.borrows.open(*var, *aid), *var)),
                                Err(e) => self.report_access(e, *aid, UseCtx::CallArg),
                            }
                        }
                        other => {
                            self.diags.push(CheckError::OwnershipMismatch {
                                name: param.name.clone(),
                                reason: "a borrowed parameter needs a binding to return the \
                                         value to, not a temporary"
                                    .to_string(),
                                point: other.id(),
                                span: self.body.span_for(other.id()).into(),
                            });
                            self.check_expr(other, UseMode::Move, UseCtx::Value)?;
                        }
                    }
                }
                ParamMode::Owned => match arg {
                    Expr::Var { id: aid, var } => {
                        let result = if sig.consumes {
                            self.tracker.consume(*var, *aid)
                        } else {
                            self.tracker.move_out(*var, *aid)
                        };
                        if let Err(e) = result {
                            self.report_access(e, *aid, UseCtx::CallArg);
                        }
                    }
                    Expr::Borrow { id: aid, var } => {
                        let name = self.tracker.binding(*var).name.clone();
                        self.diags.push(CheckError::OwnershipMismatch {
                            name,
                            reason: "still-borrowed value passed as an owned argument".to_string(),
                            point: *aid,
                            span: self.body.span_for(*aid).into(),
                        });
                    }
                    // Temporaries transfer straight through; the callee's
                    // own obligations cover them from here.
                    other => self.check_expr(other, UseMode::Move, UseCtx::Value)?,
                },
            }
        }

        // Borrows end with the call that took them.
        for (handle, var) in open {
            self.borrows.close(handle);
            self.tracker.borrow_end(var);
        }
        Ok(())
    }

    /// An expression statement must not silently drop a linear result
    fn check_discarded_result(&mut self, expr: &Expr, at: NodeId) -> Result<(), CheckError> {
        if self.comptime_depth > 0 && self.partitioner.stage_of(self.env, expr).is_static() {
            return Ok(());
        }
        let Some(ty) = self.ty_of(expr) else {
            return Ok(());
        };
        let discipline = self.classify(&ty, at)?;
        if discipline.must_consume() {
            let name = match expr {
                Expr::Var { var, .. } => self.tracker.binding(*var).name.clone(),
                Expr::Call { callee, .. } => format!("result of `{callee}`"),
                _ => "temporary".to_string(),
            };
            self.diags.push(CheckError::ImplicitDiscard {
                name,
                point: at,
                span: self.body.span_for(at).into(),
                decl_span: self.body.span_for(expr.id()).into(),
            });
        }
        Ok(())
    }

    /// Result type of an expression, when derivable
    fn ty_of(&self, expr: &Expr) -> Option<Ty> {
        match expr {
            Expr::Literal { ty, .. } => Some(ty.clone()),
            Expr::Var { var, .. } => Some(self.body.local(*var).ty.clone()),
            // A borrow produces no owned value, so nothing can be discarded.
            Expr::Borrow { .. } => None,
            Expr::Call { callee, .. } => self.env.signature(callee).map(|s| s.ret.clone()),
            Expr::Tuple { elems, .. } => {
                let tys: Option<Vec<Ty>> = elems.iter().map(|e| self.ty_of(e)).collect();
                tys.map(Ty::Tuple)
            }
            Expr::Array { elems, .. } => {
                let first = self.ty_of(elems.first()?)?;
                Some(Ty::array(first, elems.len()))
            }
        }
    }

    /// Every exit path must leave no owned linear value and no open borrow
    fn exit_check(&mut self, at: NodeId) {
        for leftover in self.borrows.sweep() {
            let name = self.tracker.binding(leftover.var).name.clone();
            self.diags.push(CheckError::LeakedBorrow {
                name,
                point: leftover.origin,
                span: self.body.span_for(leftover.origin).into(),
            });
            self.tracker.borrow_end(leftover.var);
        }

        let mut bindings: Vec<VarId> = self.tracker.bindings().map(|b| b.var).collect();
        bindings.sort();
        for var in bindings {
            let b = self.tracker.binding(var);
            if b.state == BindingState::Owned && b.discipline.must_consume() && !b.borrowed_param {
                self.diags.push(CheckError::ImplicitDiscard {
                    name: b.name.clone(),
                    point: at,
                    span: self.body.span_for(at).into(),
                    decl_span: self.body.span_for(b.origin).into(),
                });
            }
        }
    }

    /// Map a tracker transition error onto the diagnostic taxonomy
    fn report_access(&mut self, err: AccessError, at: NodeId, ctx: UseCtx) {
        let span = self.body.span_for(at);
        let diag = match err {
            AccessError::UseAfterMove { name, prior } => CheckError::UseAfterMove {
                name,
                point: at,
                use_span: span.into(),
                moved_span: self.body.span_for(prior).into(),
            },
            AccessError::DoubleBorrow { name, first } => CheckError::DoubleBorrow {
                name,
                point: at,
                span: span.into(),
                first_span: self.body.span_for(first).into(),
            },
            AccessError::MoveWhileBorrowed { name } => CheckError::OwnershipMismatch {
                name,
                reason: "cannot take ownership while a borrow is active".to_string(),
                point: at,
                span: span.into(),
            },
            AccessError::BorrowedParamEscapes { name } => match ctx {
                UseCtx::ReturnValue => CheckError::BorrowEscapes {
                    name,
                    point: at,
                    span: span.into(),
                },
                _ => CheckError::OwnershipMismatch {
                    name,
                    reason: "parameter is borrowed from the caller and cannot be \
                             moved or consumed"
                        .to_string(),
                    point: at,
                    span: span.into(),
                },
            },
            AccessError::DiscardOnReassign { name, origin } => CheckError::ImplicitDiscard {
                name,
                point: at,
                span: span.into(),
                decl_span: self.body.span_for(origin).into(),
            },
        };
        self.diags.push(diag);
    }
}
