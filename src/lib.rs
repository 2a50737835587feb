//! # R-expression evaluation core
//!
//! A logic-programming/weighted-deduction kernel: an algebra of
//! R-expressions (`Terminal`, `Intersect`, `Partition`, `Unify`,
//! `BuildStructure`, `ReflectStructure`, `Evaluate`, `Aggregator`, `Call`,
//! `ModedOp`, `AssumptionWrapper`) over a binding [`Frame`], a
//! type-indexed simplification engine that rewrites an R-expression toward
//! a terminal form, and the partition/iterator machinery that enumerates
//! variable bindings to drive disjunctive search.
//!
//! ## Pipeline
//!
//! ```text
//! Query = R-expression + Frame
//!     -> simplify (type-indexed rewrite, §4.4)
//!     -> loop (iterator-driven enumeration over Partitions, §4.7)
//!     -> aggregate (fold terminals under an AggregatorOp, §4.5)
//!     -> Call inlines relation bodies on demand via the system context (§4.6)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dyna_core::config::EngineConfig;
//! use dyna_core::context::EngineCtx;
//! use dyna_core::system::System;
//! use dyna_core::rexpr::unify;
//! use dyna_core::variable::{Frame, Variable};
//! use dyna_core::value::Value;
//!
//! let system = System::new();
//! let config = EngineConfig::default();
//! let ctx = EngineCtx::new(&system, &config);
//! let mut frame = Frame::new();
//!
//! let a = Variable::named("A");
//! let b = Variable::constant(Value::Int(1));
//! let r = unify(a.clone(), b);
//! let result = dyna_core::rexpr::saturate(&r, &mut frame, ctx);
//! assert_eq!(a.get_value(&frame), Some(Value::Int(1)));
//! ```
//!
//! Verbose per-step tracing of `simplify`/`saturate` is hot-path and stays
//! off by default; set `DYNA_DEBUG=1` to enable `tracing::trace!` events
//! from the simplification engine.

pub mod cancellation;
pub mod config;
pub mod context;
pub mod error;
pub mod iter;
pub mod moded;
pub mod query;
pub mod rexpr;
pub mod system;
pub mod value;
pub mod variable;

pub use config::EngineConfig;
pub use context::EngineCtx;
pub use error::{EngineError, EngineResult};
pub use query::{query, QueryOutcome};
pub use system::System;
pub use value::Value;
pub use variable::{Frame, Variable};

/// Returns whether verbose per-step engine tracing is enabled for this
/// process (checked once; mirrors the teacher's own `DATALOG_DEBUG` ad hoc
/// debug switch).
pub fn debug_tracing_enabled() -> bool {
    static ENABLED: std::sync::OnceLock<bool> = std::sync::OnceLock::new();
    *ENABLED.get_or_init(|| std::env::var("DYNA_DEBUG").is_ok_and(|v| v != "0" && !v.is_empty()))
}
