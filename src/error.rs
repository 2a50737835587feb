//! Crate-wide error types.
//!
//! Follows the error taxonomy from spec.md §7: `UnificationFailure` and
//! `Saturated` are internal control-flow signals that never cross a public
//! API boundary (they are caught at the nearest `simplify`/`Aggregator`
//! entry point, see [`crate::rexpr::simplify`] and
//! [`crate::rexpr::aggregate`]). `EngineError` is what actually surfaces to
//! callers of [`crate::system::System`] and the query surface.

use crate::value::Value;

/// Raised when binding a variable would revoke or contradict an existing
/// binding. Always caught by the nearest `simplify` entry and converted to
/// `Terminal(0)`; never returned from a public function.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UnificationFailure;

/// Raised by [`crate::rexpr::aggregate::AggregatorOp::lift`] /
/// `combine` to short-circuit an in-progress aggregation once its fixed
/// point is known. Caught only by the `Aggregator` simplification step.
#[derive(Debug, Clone)]
pub(crate) struct Saturated(pub Value);

/// Errors that can surface to a caller of the engine: definition errors,
/// resource-limit violations, and incomplete-computation signals (spec.md
/// §7, "Definition errors" / "Incomplete computation").
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("relation {name}/{arity} is already defined")]
    TermAlreadyDefined { name: String, arity: usize },

    #[error("cannot merge into {name}/{arity}: aggregator operator mismatch")]
    AggregatorMismatch { name: String, arity: usize },

    #[error("cannot merge into {name}/{arity}: partition column ordering mismatch")]
    ColumnOrderMismatch { name: String, arity: usize },

    #[error("relation {name}/{arity} is not defined")]
    TermNotDefined { name: String, arity: usize },

    #[error("recursion limit of {limit} exceeded calling {name}/{arity}")]
    RecursionLimitExceeded {
        name: String,
        arity: usize,
        limit: usize,
    },

    #[error("resource limit exceeded at '{stage}': {actual} exceeds limit {limit}")]
    ResourceLimitExceeded {
        limit: usize,
        actual: usize,
        stage: String,
    },

    #[error("computation finished with an unresolved residue and no residue was requested")]
    IncompleteComputation,

    #[error("query was cancelled")]
    Cancelled,
}

pub type EngineResult<T> = Result<T, EngineError>;
