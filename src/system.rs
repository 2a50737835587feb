//! The system context (spec.md §6, "External interfaces"): the boundary
//! object holding relation definitions and their assumption tokens.
//! `Clone + Send + Sync` even though `simplify`/`loop` run single-threaded
//! per call, grounded in `src/protocol/rest/mod.rs`'s `Arc<DashMap<...>>`
//! registry pattern for a handle shared across worker threads.

use crate::error::{EngineError, EngineResult};
use crate::rexpr::call::{Assumption, AssumptionHandle, CallTerm, RelationSystem};
use crate::rexpr::partition::Partition;
use crate::rexpr::RExpr;
use crate::variable::Variable;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Clone)]
struct TermEntry {
    body: RExpr,
    assumption: Arc<Assumption>,
}

/// The relation registry: `(name, arity) -> current definition + assumption`.
/// Mutation (`define_term`/`add_to_term`/`delete_term`) invalidates the
/// previous `Assumption` before installing the new one, so any
/// `AssumptionHandle` held by an in-flight computation observes staleness.
#[derive(Clone, Default)]
pub struct System {
    terms: Arc<DashMap<(Arc<str>, usize), TermEntry>>,
}

impl System {
    pub fn new() -> Self {
        System { terms: Arc::new(DashMap::new()) }
    }

    /// Installs `body` under `(name, arity)`. Errors if already defined
    /// (spec.md §6); use `add_to_term` to extend an aggregator definition.
    pub fn define_term(&self, name: &str, arity: usize, body: RExpr) -> EngineResult<()> {
        let key = (Arc::from(name), arity);
        if self.terms.contains_key(&key) {
            return Err(EngineError::TermAlreadyDefined { name: name.to_string(), arity });
        }
        tracing::debug!(name, arity, "term_defined");
        self.terms.insert(key, TermEntry { body, assumption: Assumption::new() });
        Ok(())
    }

    /// Merges `body` into an existing aggregator definition (spec.md §4.6,
    /// "Relation combine"): both definitions must be `Aggregator`s over the
    /// same op and the same column ordering; their `Partition` rows are
    /// unioned. Invalidates the current assumption either way.
    pub fn add_to_term(&self, name: &str, arity: usize, body: RExpr) -> EngineResult<()> {
        let key = (Arc::from(name), arity);
        let Some(mut entry) = self.terms.get_mut(&key) else {
            tracing::debug!(name, arity, "term_defined");
            self.terms.insert(key, TermEntry { body, assumption: Assumption::new() });
            return Ok(());
        };

        let merged = merge_aggregator_bodies(&entry.body, &body)
            .ok_or_else(|| EngineError::AggregatorMismatch { name: name.to_string(), arity })?;

        entry.assumption.invalidate();
        entry.assumption = Assumption::new();
        entry.body = merged;
        tracing::info!(name, arity, "term_redefined");
        Ok(())
    }

    /// Removes a definition and invalidates its assumption.
    pub fn delete_term(&self, name: &str, arity: usize) {
        let key: (Arc<str>, usize) = (Arc::from(name), arity);
        if let Some((_, entry)) = self.terms.remove(&key) {
            entry.assumption.invalidate();
            tracing::info!(name, arity, "term_deleted");
        }
    }

    /// A `Call` node suitable for composition (spec.md §6).
    pub fn call_term(&self, name: &str, ret: Variable, args: impl Into<Arc<[Variable]>>) -> RExpr {
        RExpr::Call(Arc::new(CallTerm::new(name, ret, args)))
    }

    /// The current assumption token for `(name, arity)`, minting a fresh
    /// (valid) one if the relation is currently undefined.
    pub fn term_assumption(&self, name: &str, arity: usize) -> AssumptionHandle {
        let key = (Arc::from(name), arity);
        match self.terms.get(&key) {
            Some(entry) => AssumptionHandle(entry.assumption.clone()),
            None => AssumptionHandle(Assumption::new()),
        }
    }

    /// Defers to an external agenda subsystem (spec.md §6). The core has
    /// no built-in agenda; this is a seam an embedder implements.
    pub fn run_agenda(&self) {}
}

impl RelationSystem for System {
    fn lookup_term(&self, name: &str, arity: usize) -> (AssumptionHandle, RExpr) {
        let key = (Arc::from(name), arity);
        match self.terms.get(&key) {
            Some(entry) => (AssumptionHandle(entry.assumption.clone()), entry.body.clone()),
            None => (AssumptionHandle(Assumption::new()), RExpr::Terminal(0)),
        }
    }
}

fn merge_aggregator_bodies(existing: &RExpr, incoming: &RExpr) -> Option<RExpr> {
    let (RExpr::Aggregator(a), RExpr::Aggregator(b)) = (existing, incoming) else { return None };
    if a.op != b.op {
        return None;
    }
    let (RExpr::Partition(pa), RExpr::Partition(pb)) = (&a.body, &b.body) else { return None };
    if pa.cols.as_ref() != pb.cols.as_ref() {
        return None;
    }
    let mut rows = pa.rows.clone();
    rows.extend(pb.rows.iter().cloned());
    let merged_partition = RExpr::Partition(Arc::new(Partition { cols: pa.cols.clone(), rows }));
    Some(RExpr::Aggregator(Arc::new(crate::rexpr::aggregate::AggregatorNode {
        result: a.result.clone(),
        head_vars: a.head_vars.clone(),
        body_res: a.body_res.clone(),
        op: a.op.clone(),
        body: merged_partition,
    })))
}
