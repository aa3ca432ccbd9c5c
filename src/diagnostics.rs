//! Diagnostic taxonomy for ownership and linearity violations
//!
//! Every violation the checker can report is a variant of [`CheckError`].
//! Diagnostics carry abstract program points ([`NodeId`]) and byte spans;
//! mapping spans back to source text is the front end's job (attach the
//! source with `miette::Report::with_source_code` when rendering).
//!
//! All kinds except [`CheckError::UnknownType`] are accumulated per
//! function and returned as a batch; `UnknownType` is structural and
//! aborts analysis of the function immediately.

use crate::common::{NodeId, Span};
use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

/// Convert our Span to miette's SourceSpan
impl From<Span> for SourceSpan {
    fn from(span: Span) -> Self {
        SourceSpan::new(span.start.into(), span.len())
    }
}

/// Result of checking one function body
pub type CheckResult = Result<(), Vec<CheckError>>;

/// Discriminant-only view of the diagnostic taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    UseAfterMove,
    DoubleBorrow,
    BorrowEscapes,
    InconsistentBranchOwnership,
    LoopConsumesResource,
    OwnershipMismatch,
    ImplicitDiscard,
    LeakedBorrow,
    NonStaticControlFlow,
    UnknownType,
}

/// An ownership/linearity violation at a program point
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("use of moved value `{name}`")]
    #[diagnostic(
        code(linearity::use_after_move),
        help("a moved or consumed value is dead for the rest of its scope; reassign it to create a fresh value")
    )]
    UseAfterMove {
        name: String,
        point: NodeId,
        #[label("value used here after move")]
        use_span: SourceSpan,
        #[label("value moved or consumed here")]
        moved_span: SourceSpan,
    },

    #[error("cannot borrow `{name}` more than once at a time")]
    #[diagnostic(
        code(linearity::double_borrow),
        help("only one borrow of a non-copyable value may be active at the same time")
    )]
    DoubleBorrow {
        name: String,
        point: NodeId,
        #[label("second borrow here")]
        span: SourceSpan,
        #[label("first borrow is still active")]
        first_span: SourceSpan,
    },

    #[error("borrow of `{name}` escapes its statement")]
    #[diagnostic(
        code(linearity::borrow_escapes),
        help("a borrow lasts only for the call that takes it; it cannot be returned or stored")
    )]
    BorrowEscapes {
        name: String,
        point: NodeId,
        #[label("borrow would outlive this statement")]
        span: SourceSpan,
    },

    #[error("branches disagree on the ownership of `{name}`")]
    #[diagnostic(
        code(linearity::inconsistent_branch),
        help("every arm must leave the value in the same state: consumed in all arms, or in none")
    )]
    InconsistentBranchOwnership {
        name: String,
        point: NodeId,
        #[label("arms of this branch leave `{name}` in different states")]
        span: SourceSpan,
    },

    #[error("loop consumes `{name}` without restoring it")]
    #[diagnostic(
        code(linearity::loop_consumes),
        help("a value consumed inside a loop body must be reassigned before the next iteration")
    )]
    LoopConsumesResource {
        name: String,
        point: NodeId,
        #[label("this loop leaves `{name}` dead at the end of an iteration")]
        span: SourceSpan,
    },

    #[error("ownership mismatch for `{name}`: {reason}")]
    #[diagnostic(code(linearity::ownership_mismatch))]
    OwnershipMismatch {
        name: String,
        reason: String,
        point: NodeId,
        #[label("{reason}")]
        span: SourceSpan,
    },

    #[error("`{name}` is neither consumed nor returned")]
    #[diagnostic(
        code(linearity::implicit_discard),
        help("a linear value must be consumed by a terminal operation or moved into the result on every exit path")
    )]
    ImplicitDiscard {
        name: String,
        point: NodeId,
        #[label("`{name}` is still owned when this path leaves the function")]
        span: SourceSpan,
        #[label("value originates here")]
        decl_span: SourceSpan,
    },

    #[error("borrow of `{name}` is still active at function exit")]
    #[diagnostic(code(linearity::leaked_borrow))]
    LeakedBorrow {
        name: String,
        point: NodeId,
        #[label("borrow opened here never ends")]
        span: SourceSpan,
    },

    #[error("control flow depends on a run-time value inside a compile-time region")]
    #[diagnostic(
        code(comptime::non_static_control_flow),
        help("branches and loops inside a compile-time region may only depend on compile-time-known values")
    )]
    NonStaticControlFlow {
        point: NodeId,
        #[label("condition is not known at compile time")]
        span: SourceSpan,
    },

    #[error("unknown type `{name}`")]
    #[diagnostic(
        code(linearity::unknown_type),
        help("the environment has no declaration for this aggregate; analysis of the function cannot proceed")
    )]
    UnknownType {
        name: String,
        point: NodeId,
        #[label("referenced here")]
        span: SourceSpan,
    },
}

impl CheckError {
    /// The taxonomy entry this diagnostic belongs to
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            CheckError::UseAfterMove { .. } => DiagnosticKind::UseAfterMove,
            CheckError::DoubleBorrow { .. } => DiagnosticKind::DoubleBorrow,
            CheckError::BorrowEscapes { .. } => DiagnosticKind::BorrowEscapes,
            CheckError::InconsistentBranchOwnership { .. } => {
                DiagnosticKind::InconsistentBranchOwnership
            }
            CheckError::LoopConsumesResource { .. } => DiagnosticKind::LoopConsumesResource,
            CheckError::OwnershipMismatch { .. } => DiagnosticKind::OwnershipMismatch,
            CheckError::ImplicitDiscard { .. } => DiagnosticKind::ImplicitDiscard,
            CheckError::LeakedBorrow { .. } => DiagnosticKind::LeakedBorrow,
            CheckError::NonStaticControlFlow { .. } => DiagnosticKind::NonStaticControlFlow,
            CheckError::UnknownType { .. } => DiagnosticKind::UnknownType,
        }
    }

    /// The program point the diagnostic is anchored to
    pub fn point(&self) -> NodeId {
        match self {
            CheckError::UseAfterMove { point, .. }
            | CheckError::DoubleBorrow { point, .. }
            | CheckError::BorrowEscapes { point, .. }
            | CheckError::InconsistentBranchOwnership { point, .. }
            | CheckError::LoopConsumesResource { point, .. }
            | CheckError::OwnershipMismatch { point, .. }
            | CheckError::ImplicitDiscard { point, .. }
            | CheckError::LeakedBorrow { point, .. }
            | CheckError::NonStaticControlFlow { point, .. }
            | CheckError::UnknownType { point, .. } => *point,
        }
    }

    /// Whether this diagnostic aborts analysis of the function
    pub fn is_fatal(&self) -> bool {
        matches!(self, CheckError::UnknownType { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        let err = CheckError::UseAfterMove {
            name: "q".into(),
            point: NodeId(3),
            use_span: Span::new(10, 11).into(),
            moved_span: Span::new(4, 5).into(),
        };
        assert_eq!(err.kind(), DiagnosticKind::UseAfterMove);
        assert_eq!(err.point(), NodeId(3));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_unknown_type_is_fatal() {
        let err = CheckError::UnknownType {
            name: "Widget".into(),
            point: NodeId(1),
            span: Span::dummy().into(),
        };
        assert!(err.is_fatal());
    }

    #[test]
    fn test_display_names_the_binding() {
        let err = CheckError::ImplicitDiscard {
            name: "q1".into(),
            point: NodeId(7),
            span: Span::dummy().into(),
            decl_span: Span::dummy().into(),
        };
        assert!(err.to_string().contains("q1"));
    }
}
