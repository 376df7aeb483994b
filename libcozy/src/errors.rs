//! The crate's error types.
//!
//! Grounded on the teacher's `notwasm::type_checking::TypeCheckingError`
//! (a `thiserror`-derived enum, one variant per failure family, each
//! carrying the context needed to report a useful message) generalized to
//! the failure modes SPEC_FULL.md §7 names: type errors (plural, since
//! the checker accumulates rather than stops at the first), state-var
//! barrier violations, solver unavailability, and capture errors surfaced
//! while rewriting.

use thiserror::Error;

use crate::typecheck::TypeError;
use crate::wf::WfViolation;

#[derive(Debug, Error)]
pub enum CozyError {
    #[error("{} type error(s) in spec", .0.len())]
    TypeErrors(Vec<TypeError>),

    #[error(transparent)]
    IllegalStateVarBoundary(#[from] WfViolation),

    #[error("no solver backend is available: {0}")]
    SolverUnavailable(String),

    #[error("solver query failed: {0}")]
    SolverError(String),

    #[error("'{arg}' in '{method}' would be captured by a synthesized binder")]
    CaptureError { arg: String, method: String },

    #[error("query '{0}' is not declared in this spec")]
    UnknownQuery(String),

    #[error("{0}")]
    Other(String),
}
