//! `Call`, assumptions, and the recursion guard (spec.md §4.6).
//!
//! The `Assumption` token is modeled as a version-stamped, invalidatable
//! handle — grounded in `src/storage_engine/snapshot.rs`'s
//! `KnowledgeGraphSnapshot`, which publishes a new `Arc`-wrapped snapshot
//! and bumps an `AtomicU64` version counter on every mutation so that
//! holders of the previous `Arc` can detect staleness without a lock.

use super::{rename_vars_unique, RExpr};
use crate::context::EngineCtx;
use crate::error::EngineError;
use crate::value::Value;
use crate::variable::{CallFrame, Frame, Variable, VarKey};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A token whose invalidation forces dependent consumers to re-resolve
/// (spec.md glossary). One `Assumption` is minted per definition epoch of a
/// `(name, arity)` relation.
#[derive(Debug)]
pub struct Assumption {
    valid: AtomicBool,
}

impl Assumption {
    pub fn new() -> Arc<Assumption> {
        Arc::new(Assumption { valid: AtomicBool::new(true) })
    }

    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}

/// A cloneable, structurally-comparable (by identity) handle to an
/// `Assumption`.
#[derive(Debug, Clone)]
pub struct AssumptionHandle(pub Arc<Assumption>);

impl PartialEq for AssumptionHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl AssumptionHandle {
    pub fn is_valid(&self) -> bool {
        self.0.is_valid()
    }
}

/// The boundary a `Call` node uses to look up a relation's current
/// definition (spec.md §6, "System context"). Implemented by
/// [`crate::system::System`]; kept as a trait here so `rexpr` does not
/// depend on the concrete registry/storage types in `system.rs`.
pub trait RelationSystem: Send + Sync {
    /// Returns the current assumption for `(name, arity)` plus the
    /// relation's body, expressed over formal parameter variables
    /// `"0", "1", …, "Return"`. If undefined, returns `Terminal(0)` under a
    /// freshly minted (already-valid) assumption, so a later `define_term`
    /// invalidates it and forces re-lookup (spec.md §4.6 step 3).
    fn lookup_term(&self, name: &str, arity: usize) -> (AssumptionHandle, RExpr);
}

/// A deferred relation invocation (spec.md §3.3).
#[derive(Clone)]
pub struct CallTerm {
    pub name: Arc<str>,
    pub arity: usize,
    pub ret: Variable,
    pub args: Arc<[Variable]>,
    /// Ancestor calls currently being inlined: `(name, arity, bound value
    /// tuple)`. Consulted to detect unbounded recursive inlining (spec.md
    /// §4.6 step 2).
    pub parent_calls_blocker: Arc<[BlockerEntry]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockerEntry {
    pub name: Arc<str>,
    pub arity: usize,
    pub values: Vec<Option<Value>>,
}

impl fmt::Debug for CallTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallTerm")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("ret", &self.ret)
            .field("args", &self.args)
            .finish()
    }
}

impl PartialEq for CallTerm {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.arity == other.arity
            && self.ret == other.ret
            && self.args.as_ref() == other.args.as_ref()
            && self.parent_calls_blocker.as_ref() == other.parent_calls_blocker.as_ref()
    }
}

impl CallTerm {
    pub fn new(name: impl Into<Arc<str>>, ret: Variable, args: impl Into<Arc<[Variable]>>) -> CallTerm {
        let args = args.into();
        CallTerm { name: name.into(), arity: args.len(), ret, args, parent_calls_blocker: Arc::from(vec![]) }
    }

    pub fn vars(&self) -> Vec<Variable> {
        let mut v = vec![self.ret.clone()];
        v.extend(self.args.iter().cloned());
        v
    }

    pub fn rename_vars(&self, remap: &impl Fn(&Variable) -> Variable) -> CallTerm {
        let rv = |v: &Variable| match v {
            Variable::Named(_) => remap(v),
            other => other.clone(),
        };
        CallTerm {
            name: self.name.clone(),
            arity: self.arity,
            ret: rv(&self.ret),
            args: self.args.iter().map(rv).collect(),
            parent_calls_blocker: self.parent_calls_blocker.clone(),
        }
    }

    fn value_tuple(&self, frame: &Frame) -> Vec<Option<Value>> {
        self.args.iter().map(|v| v.get_value(frame)).collect()
    }
}

/// `simplify(Call, F)` (spec.md §4.6).
pub fn simplify_call(call: &CallTerm, frame: &mut Frame, ctx: EngineCtx) -> RExpr {
    let values = call.value_tuple(frame);

    // Step 2: recursion guard.
    let blocked = call.parent_calls_blocker.iter().any(|b| b.name == call.name && b.arity == call.arity && b.values == values);
    if blocked {
        return RExpr::Call(Arc::new(call.clone()));
    }

    if frame.call_stack.len() >= ctx.config.max_inline_depth {
        // Surfaced as a residue; the query surface turns an unresolved
        // residue at the top level into `EngineError::RecursionLimitExceeded`
        // (see `crate::query`).
        return RExpr::Call(Arc::new(call.clone()));
    }

    // Step 3: lookup. `lookup_term` always returns the current definition,
    // so there is no staleness to race against here — `AssumptionHandle`
    // only matters to residues that outlive this call (see
    // `AssumptionWrapper`'s simplify rule below).
    let (assumption, body) = ctx.system.lookup_term(&call.name, call.arity);
    inline(call, assumption, body, frame, ctx)
}

fn inline(call: &CallTerm, assumption: AssumptionHandle, body: RExpr, frame: &mut Frame, ctx: EngineCtx) -> RExpr {
    // Step 4: alpha-rename the formals (0, 1, …, Return) to the call's
    // actual variables; every other internal variable gets a fresh name.
    let mut remap: HashMap<VarKey, Variable> = HashMap::new();
    for (i, actual) in call.args.iter().enumerate() {
        remap.insert(VarKey::named(i.to_string()), actual.clone());
    }
    remap.insert(VarKey::named("Return"), call.ret.clone());
    let renamed = rename_vars_unique(&body, &remap);

    // Step 5: push this call as an ancestor for any nested Call nodes in
    // the freshly inlined body.
    let entry = BlockerEntry { name: call.name.clone(), arity: call.arity, values: call.value_tuple(frame) };
    let guarded = push_blocker(&renamed, &entry);

    frame.call_stack.push(CallFrame { name: call.name.clone(), arity: call.arity, bound_values: entry.values.clone() });
    let result = super::simplify::simplify(&guarded, frame, ctx);
    frame.call_stack.pop();

    let _ = assumption; // kept for future instrumentation; invalidation is observed by the next lookup_term call, not by this node.
    result
}

fn push_blocker(r: &RExpr, entry: &BlockerEntry) -> RExpr {
    match r {
        RExpr::Call(c) => {
            let mut blocker = c.parent_calls_blocker.to_vec();
            blocker.push(entry.clone());
            RExpr::Call(Arc::new(CallTerm { parent_calls_blocker: blocker.into(), ..c.as_ref().clone() }))
        }
        RExpr::Intersect(cs) => RExpr::Intersect(cs.iter().map(|c| push_blocker(c, entry)).collect()),
        RExpr::Partition(p) => {
            let rows = p
                .rows
                .iter()
                .map(|row| super::partition::PartitionRow { key: row.key.clone(), body: push_blocker(&row.body, entry) })
                .collect();
            RExpr::Partition(Arc::new(super::partition::Partition { cols: p.cols.clone(), rows }))
        }
        RExpr::Aggregator(a) => RExpr::Aggregator(Arc::new(super::aggregate::AggregatorNode {
            body: push_blocker(&a.body, entry),
            ..a.as_ref().clone()
        })),
        RExpr::AssumptionWrapper { assumption, child } => {
            RExpr::AssumptionWrapper { assumption: assumption.clone(), child: Box::new(push_blocker(child, entry)) }
        }
        other => other.clone(),
    }
}

pub fn recursion_limit_error(call: &CallTerm, limit: usize) -> EngineError {
    EngineError::RecursionLimitExceeded { name: call.name.to_string(), arity: call.arity, limit }
}
