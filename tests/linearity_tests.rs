//! End-to-end linearity scenarios: allocation, gates, measurement,
//! branches, loops, and function boundaries.

use pretty_assertions::assert_eq;
use qlin::diagnostics::DiagnosticKind;
use qlin::env::{Env, Param, Signature, StructDef};
use qlin::fir::{Block, BodyBuilder, Ty};
use qlin::{check, CheckResult};

fn kinds(result: CheckResult) -> Vec<DiagnosticKind> {
    match result {
        Ok(()) => Vec::new(),
        Err(errs) => errs.iter().map(|e| e.kind()).collect(),
    }
}

fn unit_sig(name: &str) -> Signature {
    Signature::new(name, vec![], Ty::Unit)
}

#[test]
fn test_bell_pair_protocol_is_accepted() {
    // let q0 = qubit(); let q1 = qubit();
    // h(q0); cx(q0, q1);
    // measure(q0); measure(q1);
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("bell");
    let q0 = b.local("q0", Ty::Qubit);
    let q1 = b.local("q1", Ty::Qubit);

    let alloc0 = b.call("qubit", vec![]);
    let alloc1 = b.call("qubit", vec![]);
    let d0 = b.declare(q0, alloc0);
    let d1 = b.declare(q1, alloc1);
    let h_arg = b.var(q0);
    let h = b.call("h", vec![h_arg]);
    let s_h = b.expr_stmt(h);
    let cx_c = b.var(q0);
    let cx_t = b.var(q1);
    let cx = b.call("cx", vec![cx_c, cx_t]);
    let s_cx = b.expr_stmt(cx);
    let m0_arg = b.var(q0);
    let m0 = b.call("measure", vec![m0_arg]);
    let s_m0 = b.expr_stmt(m0);
    let m1_arg = b.var(q1);
    let m1 = b.call("measure", vec![m1_arg]);
    let s_m1 = b.expr_stmt(m1);

    let body = b.finish(Block::new(vec![d0, d1, s_h, s_cx, s_m0, s_m1]));
    assert_eq!(check(&body, &unit_sig("bell"), &env), Ok(()));
}

#[test]
fn test_same_qubit_twice_in_one_gate_is_double_borrow() {
    // cx(q, q) would alias the control and target.
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("alias");
    let q = b.local("q", Ty::Qubit);

    let alloc = b.call("qubit", vec![]);
    let d = b.declare(q, alloc);
    let a0 = b.var(q);
    let a1 = b.var(q);
    let cx = b.call("cx", vec![a0, a1]);
    let s_cx = b.expr_stmt(cx);
    let m_arg = b.var(q);
    let m = b.call("measure", vec![m_arg]);
    let s_m = b.expr_stmt(m);

    let body = b.finish(Block::new(vec![d, s_cx, s_m]));
    assert_eq!(
        kinds(check(&body, &unit_sig("alias"), &env)),
        vec![DiagnosticKind::DoubleBorrow]
    );
}

#[test]
fn test_unmeasured_qubit_is_implicit_discard() {
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("leak");
    let q = b.local("q", Ty::Qubit);

    let alloc = b.call("qubit", vec![]);
    let d = b.declare(q, alloc);

    let body = b.finish(Block::new(vec![d]));
    assert_eq!(
        kinds(check(&body, &unit_sig("leak"), &env)),
        vec![DiagnosticKind::ImplicitDiscard]
    );
}

#[test]
fn test_gate_after_measure_is_use_after_move() {
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("zombie");
    let q = b.local("q", Ty::Qubit);

    let alloc = b.call("qubit", vec![]);
    let d = b.declare(q, alloc);
    let m_arg = b.var(q);
    let m = b.call("measure", vec![m_arg]);
    let s_m = b.expr_stmt(m);
    let h_arg = b.var(q);
    let h = b.call("h", vec![h_arg]);
    let s_h = b.expr_stmt(h);

    let body = b.finish(Block::new(vec![d, s_m, s_h]));
    assert_eq!(
        kinds(check(&body, &unit_sig("zombie"), &env)),
        vec![DiagnosticKind::UseAfterMove]
    );
}

#[test]
fn test_measuring_in_one_branch_only_is_inconsistent() {
    // if flag { measure(q); }   // implicit else keeps q alive
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("half");
    let q = b.local("q", Ty::Qubit);

    let alloc = b.call("qubit", vec![]);
    let d = b.declare(q, alloc);
    let m_arg = b.var(q);
    let m = b.call("measure", vec![m_arg]);
    let s_m = b.expr_stmt(m);
    let cond = b.bool(true);
    let branch = b.if_(cond, Block::new(vec![s_m]), None);

    let body = b.finish(Block::new(vec![d, branch]));
    assert_eq!(
        kinds(check(&body, &unit_sig("half"), &env)),
        vec![DiagnosticKind::InconsistentBranchOwnership]
    );
}

#[test]
fn test_consuming_in_both_branches_is_accepted() {
    // if flag { measure(q); } else { discard(q); }
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("both");
    let q = b.local("q", Ty::Qubit);

    let alloc = b.call("qubit", vec![]);
    let d = b.declare(q, alloc);
    let m_arg = b.var(q);
    let m = b.call("measure", vec![m_arg]);
    let s_m = b.expr_stmt(m);
    let disc_arg = b.var(q);
    let disc = b.call("discard", vec![disc_arg]);
    let s_disc = b.expr_stmt(disc);
    let cond = b.bool(true);
    let branch = b.if_(cond, Block::new(vec![s_m]), Some(Block::new(vec![s_disc])));

    let body = b.finish(Block::new(vec![d, branch]));
    assert_eq!(check(&body, &unit_sig("both"), &env), Ok(()));
}

#[test]
fn test_both_branches_returning_is_accepted() {
    // if flag { return measure(q); } else { return measure(q); }
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("ret");
    let q = b.local("q", Ty::Qubit);

    let alloc = b.call("qubit", vec![]);
    let d = b.declare(q, alloc);
    let m0_arg = b.var(q);
    let m0 = b.call("measure", vec![m0_arg]);
    let r0 = b.return_(Some(m0));
    let m1_arg = b.var(q);
    let m1 = b.call("measure", vec![m1_arg]);
    let r1 = b.return_(Some(m1));
    let cond = b.bool(true);
    let branch = b.if_(cond, Block::new(vec![r0]), Some(Block::new(vec![r1])));

    let body = b.finish(Block::new(vec![d, branch]));
    let sig = Signature::new("ret", vec![], Ty::Bool);
    assert_eq!(check(&body, &sig, &env), Ok(()));
}

#[test]
fn test_loop_consuming_carried_qubit_is_rejected() {
    // while flag { measure(q); }   // second iteration would re-measure
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("drain");
    let q = b.local("q", Ty::Qubit);

    let alloc = b.call("qubit", vec![]);
    let d = b.declare(q, alloc);
    let m_arg = b.var(q);
    let m = b.call("measure", vec![m_arg]);
    let s_m = b.expr_stmt(m);
    let cond = b.bool(true);
    let w = b.while_(cond, Block::new(vec![s_m]));
    let m2_arg = b.var(q);
    let m2 = b.call("measure", vec![m2_arg]);
    let s_m2 = b.expr_stmt(m2);

    let body = b.finish(Block::new(vec![d, w, s_m2]));
    assert_eq!(
        kinds(check(&body, &unit_sig("drain"), &env)),
        vec![DiagnosticKind::LoopConsumesResource]
    );
}

#[test]
fn test_loop_borrowing_carried_qubit_is_accepted() {
    // while flag { h(q); } measure(q);
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("spin");
    let q = b.local("q", Ty::Qubit);

    let alloc = b.call("qubit", vec![]);
    let d = b.declare(q, alloc);
    let h_arg = b.var(q);
    let h = b.call("h", vec![h_arg]);
    let s_h = b.expr_stmt(h);
    let cond = b.bool(true);
    let w = b.while_(cond, Block::new(vec![s_h]));
    let m_arg = b.var(q);
    let m = b.call("measure", vec![m_arg]);
    let s_m = b.expr_stmt(m);

    let body = b.finish(Block::new(vec![d, w, s_m]));
    assert_eq!(check(&body, &unit_sig("spin"), &env), Ok(()));
}

#[test]
fn test_loop_consume_then_reallocate_is_accepted() {
    // while flag { measure(q); q = qubit(); } measure(q);
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("recycle");
    let q = b.local("q", Ty::Qubit);

    let alloc = b.call("qubit", vec![]);
    let d = b.declare(q, alloc);
    let m_arg = b.var(q);
    let m = b.call("measure", vec![m_arg]);
    let s_m = b.expr_stmt(m);
    let realloc = b.call("qubit", vec![]);
    let s_re = b.reassign(q, realloc);
    let cond = b.bool(true);
    let w = b.while_(cond, Block::new(vec![s_m, s_re]));
    let m2_arg = b.var(q);
    let m2 = b.call("measure", vec![m2_arg]);
    let s_m2 = b.expr_stmt(m2);

    let body = b.finish(Block::new(vec![d, w, s_m2]));
    assert_eq!(check(&body, &unit_sig("recycle"), &env), Ok(()));
}

#[test]
fn test_consuming_a_borrowed_parameter_is_ownership_mismatch() {
    // fn readout(q: &qubit) { measure(q); }
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("readout");
    let q = b.param("q", Ty::Qubit);

    let m_arg = b.var(q);
    let m = b.call("measure", vec![m_arg]);
    let s_m = b.expr_stmt(m);

    let body = b.finish(Block::new(vec![s_m]));
    let sig = Signature::new("readout", vec![Param::borrowed("q", Ty::Qubit)], Ty::Unit);
    assert_eq!(
        kinds(check(&body, &sig, &env)),
        vec![DiagnosticKind::OwnershipMismatch]
    );
}

#[test]
fn test_borrowed_parameter_may_be_lent_onward() {
    // fn flip(q: &qubit) { x(q); }
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("flip");
    let q = b.param("q", Ty::Qubit);

    let x_arg = b.var(q);
    let x = b.call("x", vec![x_arg]);
    let s_x = b.expr_stmt(x);

    let body = b.finish(Block::new(vec![s_x]));
    let sig = Signature::new("flip", vec![Param::borrowed("q", Ty::Qubit)], Ty::Unit);
    assert_eq!(check(&body, &sig, &env), Ok(()));
}

#[test]
fn test_owned_parameter_left_alive_is_implicit_discard() {
    // fn sink(q: qubit) { }
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("sink");
    let _q = b.param("q", Ty::Qubit);

    let body = b.finish(Block::default());
    let sig = Signature::new("sink", vec![Param::owned("q", Ty::Qubit)], Ty::Unit);
    assert_eq!(
        kinds(check(&body, &sig, &env)),
        vec![DiagnosticKind::ImplicitDiscard]
    );
}

#[test]
fn test_owned_parameter_returned_is_accepted() {
    // fn pass(q: qubit) -> qubit { return q; }
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("pass");
    let q = b.param("q", Ty::Qubit);

    let r_val = b.var(q);
    let r = b.return_(Some(r_val));

    let body = b.finish(Block::new(vec![r]));
    let sig = Signature::new("pass", vec![Param::owned("q", Ty::Qubit)], Ty::Qubit);
    assert_eq!(check(&body, &sig, &env), Ok(()));
}

#[test]
fn test_returning_a_borrowed_parameter_is_borrow_escapes() {
    // fn steal(q: &qubit) -> qubit { return q; }
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("steal");
    let q = b.param("q", Ty::Qubit);

    let r_val = b.var(q);
    let r = b.return_(Some(r_val));

    let body = b.finish(Block::new(vec![r]));
    let sig = Signature::new("steal", vec![Param::borrowed("q", Ty::Qubit)], Ty::Qubit);
    assert_eq!(
        kinds(check(&body, &sig, &env)),
        vec![DiagnosticKind::BorrowEscapes]
    );
}

#[test]
fn test_returning_a_fresh_borrow_is_leaked_borrow() {
    // fn lend(q: &qubit) -> qubit { return &q; }
    //
    // The borrow opened by `&q` is still live when the exit sweep runs.
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("lend");
    let q = b.param("q", Ty::Qubit);

    let borrow = b.borrow(q);
    let r = b.return_(Some(borrow));

    let body = b.finish(Block::new(vec![r]));
    let sig = Signature::new("lend", vec![Param::borrowed("q", Ty::Qubit)], Ty::Qubit);
    assert_eq!(
        kinds(check(&body, &sig, &env)),
        vec![DiagnosticKind::LeakedBorrow]
    );
}

#[test]
fn test_borrow_outside_call_position_escapes() {
    // A bare `&q` has nowhere to end before the statement does.
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("stray");
    let q = b.local("q", Ty::Qubit);

    let alloc = b.call("qubit", vec![]);
    let d = b.declare(q, alloc);
    let borrow = b.borrow(q);
    let s_b = b.expr_stmt(borrow);
    let m_arg = b.var(q);
    let m = b.call("measure", vec![m_arg]);
    let s_m = b.expr_stmt(m);

    let body = b.finish(Block::new(vec![d, s_b, s_m]));
    assert_eq!(
        kinds(check(&body, &unit_sig("stray"), &env)),
        vec![DiagnosticKind::BorrowEscapes]
    );
}

#[test]
fn test_reassigning_over_live_qubit_is_implicit_discard() {
    // q = qubit(); q = qubit();   // first allocation silently lost
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("clobber");
    let q = b.local("q", Ty::Qubit);

    let alloc0 = b.call("qubit", vec![]);
    let d = b.declare(q, alloc0);
    let alloc1 = b.call("qubit", vec![]);
    let re = b.reassign(q, alloc1);
    let m_arg = b.var(q);
    let m = b.call("measure", vec![m_arg]);
    let s_m = b.expr_stmt(m);

    let body = b.finish(Block::new(vec![d, re, s_m]));
    assert_eq!(
        kinds(check(&body, &unit_sig("clobber"), &env)),
        vec![DiagnosticKind::ImplicitDiscard]
    );
}

#[test]
fn test_copyable_values_may_be_used_freely() {
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("ints");
    let n = b.local("n", Ty::Int);
    let a = b.local("a", Ty::Int);
    let c = b.local("c", Ty::Int);

    let lit = b.int(7);
    let d_n = b.declare(n, lit);
    let use0 = b.var(n);
    let d_a = b.declare(a, use0);
    let use1 = b.var(n);
    let d_c = b.declare(c, use1);

    let body = b.finish(Block::new(vec![d_n, d_a, d_c]));
    assert_eq!(check(&body, &unit_sig("ints"), &env), Ok(()));
}

#[test]
fn test_qubit_array_inherits_linearity() {
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("register");
    let qs = b.local("qs", Ty::array(Ty::Qubit, 2));

    let a0 = b.call("qubit", vec![]);
    let a1 = b.call("qubit", vec![]);
    let arr = b.array(vec![a0, a1]);
    let d = b.declare(qs, arr);

    let body = b.finish(Block::new(vec![d]));
    assert_eq!(
        kinds(check(&body, &unit_sig("register"), &env)),
        vec![DiagnosticKind::ImplicitDiscard]
    );
}

#[test]
fn test_declared_affine_struct_may_be_dropped() {
    let mut env = Env::quantum_prelude();
    env.declare_struct(StructDef::new("Scratch", vec![("size".into(), Ty::Int)]).affine());
    env.declare_fn(Signature::new("scratch", vec![], Ty::Named("Scratch".into())));

    let mut b = BodyBuilder::new("tmp");
    let s = b.local("s", Ty::Named("Scratch".into()));
    let alloc = b.call("scratch", vec![]);
    let d = b.declare(s, alloc);

    let body = b.finish(Block::new(vec![d]));
    assert_eq!(check(&body, &unit_sig("tmp"), &env), Ok(()));
}

#[test]
fn test_declared_linear_struct_must_be_consumed() {
    let mut env = Env::quantum_prelude();
    env.declare_struct(StructDef::new("Token", vec![("seq".into(), Ty::Int)]).linear());
    env.declare_fn(Signature::new("token", vec![], Ty::Named("Token".into())));

    let mut b = BodyBuilder::new("mint");
    let t = b.local("t", Ty::Named("Token".into()));
    let alloc = b.call("token", vec![]);
    let d = b.declare(t, alloc);

    let body = b.finish(Block::new(vec![d]));
    assert_eq!(
        kinds(check(&body, &unit_sig("mint"), &env)),
        vec![DiagnosticKind::ImplicitDiscard]
    );
}

#[test]
fn test_undeclared_aggregate_is_fatal_and_alone() {
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("ghostly");
    let g = b.local("g", Ty::Named("Ghost".into()));
    // Other violations in the body must be suppressed by the fatal error.
    let q = b.local("q", Ty::Qubit);
    let alloc = b.call("qubit", vec![]);
    let d_q = b.declare(q, alloc);
    let _ = g;

    let body = b.finish(Block::new(vec![d_q]));
    let errs = check(&body, &unit_sig("ghostly"), &env).unwrap_err();
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].kind(), DiagnosticKind::UnknownType);
    assert!(errs[0].is_fatal());
}

#[test]
fn test_arity_mismatch_is_ownership_mismatch() {
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("lonely");
    let q = b.local("q", Ty::Qubit);

    let alloc = b.call("qubit", vec![]);
    let d = b.declare(q, alloc);
    let a0 = b.var(q);
    let cx = b.call("cx", vec![a0]);
    let s_cx = b.expr_stmt(cx);
    let m_arg = b.var(q);
    let m = b.call("measure", vec![m_arg]);
    let s_m = b.expr_stmt(m);

    let body = b.finish(Block::new(vec![d, s_cx, s_m]));
    assert_eq!(
        kinds(check(&body, &unit_sig("lonely"), &env)),
        vec![DiagnosticKind::OwnershipMismatch]
    );
}

#[test]
fn test_bare_allocation_result_is_implicit_discard() {
    // `qubit();` as a statement drops a fresh linear value on the floor.
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("fumble");
    let alloc = b.call("qubit", vec![]);
    let s = b.expr_stmt(alloc);

    let body = b.finish(Block::new(vec![s]));
    assert_eq!(
        kinds(check(&body, &unit_sig("fumble"), &env)),
        vec![DiagnosticKind::ImplicitDiscard]
    );
}

#[test]
fn test_recursive_function_checked_against_its_signature() {
    // fn relay(q: qubit) -> bool { return relay(q); }
    let mut env = Env::quantum_prelude();
    env.declare_fn(Signature::new(
        "relay",
        vec![Param::owned("q", Ty::Qubit)],
        Ty::Bool,
    ));

    let mut b = BodyBuilder::new("relay");
    let q = b.param("q", Ty::Qubit);
    let arg = b.var(q);
    let call = b.call("relay", vec![arg]);
    let r = b.return_(Some(call));

    let body = b.finish(Block::new(vec![r]));
    let sig = env.signature("relay").unwrap().clone();
    assert_eq!(check(&body, &sig, &env), Ok(()));
}

#[test]
fn test_all_violations_are_reported_in_program_order() {
    // Two independent mistakes: use-after-move, then a leaked qubit.
    let env = Env::quantum_prelude();
    let mut b = BodyBuilder::new("messy");
    let q0 = b.local("q0", Ty::Qubit);
    let q1 = b.local("q1", Ty::Qubit);

    let alloc0 = b.call("qubit", vec![]);
    let d0 = b.declare(q0, alloc0);
    let m_arg = b.var(q0);
    let m = b.call("measure", vec![m_arg]);
    let s_m = b.expr_stmt(m);
    let h_arg = b.var(q0);
    let h = b.call("h", vec![h_arg]);
    let s_h = b.expr_stmt(h);
    let alloc1 = b.call("qubit", vec![]);
    let d1 = b.declare(q1, alloc1);

    let body = b.finish(Block::new(vec![d0, s_m, s_h, d1]));
    assert_eq!(
        kinds(check(&body, &unit_sig("messy"), &env)),
        vec![
            DiagnosticKind::UseAfterMove,
            DiagnosticKind::ImplicitDiscard
        ]
    );
}
