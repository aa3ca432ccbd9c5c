//! Ownership and linearity checking for non-duplicable resources
//!
//! A static analysis that verifies programs manipulating quantum state
//! respect no-cloning: every linear resource is used exactly once along
//! every control-flow path, borrows never outlive their statement, and
//! nothing is silently duplicated or dropped.
//!
//! The checker consumes a typed, desugared function body ([`fir::Body`])
//! plus an environment of finalized signatures ([`env::Env`]) and either
//! accepts the function or reports every violation it can find, classified
//! by a ten-kind diagnostic taxonomy ([`diagnostics::CheckError`]).
//!
//! # Example
//!
//! ```
//! use qlin::env::{Env, Signature};
//! use qlin::fir::{Block, BodyBuilder, Ty};
//!
//! // fn bell() { let q0 = qubit(); let q1 = qubit();
//! //             h(q0); cx(q0, q1);
//! //             measure(q0); measure(q1); }
//! let env = Env::quantum_prelude();
//! let mut b = BodyBuilder::new("bell");
//! let q0 = b.local("q0", Ty::Qubit);
//! let q1 = b.local("q1", Ty::Qubit);
//!
//! let alloc0 = b.call("qubit", vec![]);
//! let alloc1 = b.call("qubit", vec![]);
//! let d0 = b.declare(q0, alloc0);
//! let d1 = b.declare(q1, alloc1);
//!
//! let h_arg = b.var(q0);
//! let h = b.call("h", vec![h_arg]);
//! let s_h = b.expr_stmt(h);
//! let cx_args = vec![b.var(q0), b.var(q1)];
//! let cx = b.call("cx", cx_args);
//! let s_cx = b.expr_stmt(cx);
//!
//! let m0_arg = b.var(q0);
//! let m0 = b.call("measure", vec![m0_arg]);
//! let s_m0 = b.expr_stmt(m0);
//! let m1_arg = b.var(q1);
//! let m1 = b.call("measure", vec![m1_arg]);
//! let s_m1 = b.expr_stmt(m1);
//!
//! let body = b.finish(Block::new(vec![d0, d1, s_h, s_cx, s_m0, s_m1]));
//! let sig = Signature::new("bell", vec![], Ty::Unit);
//! assert!(qlin::check(&body, &sig, &env).is_ok());
//! ```

pub mod borrow;
pub mod checker;
pub mod common;
pub mod comptime;
pub mod diagnostics;
pub mod discipline;
pub mod env;
pub mod fir;
pub mod merge;
pub mod state;

pub use checker::check;
pub use diagnostics::{CheckError, CheckResult, DiagnosticKind};
pub use discipline::Discipline;

use rayon::prelude::*;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Check every function of a module in parallel
///
/// The environment must already contain the finalized signature of every
/// function in `bodies` (and of everything they call). Results come back in
/// input order regardless of scheduling, so diagnostics are deterministic.
pub fn check_module<'a>(
    bodies: &'a [(fir::Body, env::Signature)],
    env: &env::Env,
) -> Vec<(&'a str, CheckResult)> {
    bodies
        .par_iter()
        .map(|(body, sig)| (body.name.as_str(), check(body, sig, env)))
        .collect()
}
