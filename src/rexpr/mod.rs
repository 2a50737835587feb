//! The R-expression algebra (spec.md §3.3) and its smart constructors
//! (§4.3).
//!
//! `RExpr` is a tagged-variant tree, immutable, structurally hashable
//! (hashing is left to derive; nothing here caches it — the teacher's own
//! `ir::IRNode`/`ast::Term` enums don't cache hashes either, and this tree
//! is rebuilt wholesale on every simplify step rather than mutated, so a
//! cache would rarely pay for itself).

pub mod aggregate;
pub mod call;
pub mod partition;
pub mod simplify;

pub use aggregate::{AggregatorOp, AggregatorSpec};
pub use call::{Assumption, AssumptionHandle, CallTerm};
pub use partition::{PartitionRow, RowKey};
pub use simplify::{saturate, simplify};

use crate::variable::{Variable, VarKey};
use std::collections::HashMap;
use std::sync::Arc;

/// A node of the R-expression algebra (spec.md §3.3).
#[derive(Debug, Clone)]
pub enum RExpr {
    /// A leaf contributing `n` to aggregation. `n == 0` is empty/absorbing
    /// for intersection; `n == 1` is the unit.
    Terminal(u64),
    /// A semantic error leaf: behaves like `Terminal(0)` for emptiness but
    /// is preserved (not silently absorbed) until disproved.
    Error,
    /// Logical AND: the product of child multiplicities; empty if any
    /// child is empty.
    Intersect(Arc<[RExpr]>),
    /// Logical OR with optional per-branch ground restrictions on a set of
    /// column variables.
    Partition(Arc<partition::Partition>),
    /// Equality constraint `a == b`.
    Unify(Variable, Variable),
    /// The constraint `result = name(args…)`, bidirectional.
    BuildStructure {
        name: Arc<str>,
        result: Variable,
        args: Arc<[Variable]>,
    },
    /// Same relation reflected: exposes constructor name, arity, and
    /// argument list as logical variables.
    ReflectStructure {
        result: Variable,
        name_var: Variable,
        arity_var: Variable,
        list_var: Variable,
    },
    /// `*termvar`: `termvar` is a ground `name(args…)` term; rewrites to a
    /// `Call` on that name/arity.
    Evaluate {
        ret: Variable,
        term_var: Variable,
    },
    /// For each distinct binding of `head_vars` produced by `body`, combine
    /// `body_res` values under `op` and bind the combined value to
    /// `result`.
    Aggregator(Arc<aggregate::AggregatorNode>),
    /// A deferred relation invocation.
    Call(Arc<call::CallTerm>),
    /// A primitive predicate whose implementation is keyed by which of its
    /// variables are currently bound.
    ModedOp(Arc<crate::moded::ModedOpNode>),
    /// A child wrapped so that invalidation of `assumption` forces
    /// re-lookup on next simplification.
    AssumptionWrapper {
        assumption: AssumptionHandle,
        child: Box<RExpr>,
    },
}

impl PartialEq for RExpr {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RExpr::Terminal(a), RExpr::Terminal(b)) => a == b,
            (RExpr::Error, RExpr::Error) => true,
            (RExpr::Intersect(a), RExpr::Intersect(b)) => a.as_ref() == b.as_ref(),
            (RExpr::Partition(a), RExpr::Partition(b)) => a == b,
            (RExpr::Unify(a1, b1), RExpr::Unify(a2, b2)) => a1 == a2 && b1 == b2,
            (
                RExpr::BuildStructure { name: n1, result: r1, args: a1 },
                RExpr::BuildStructure { name: n2, result: r2, args: a2 },
            ) => n1 == n2 && r1 == r2 && a1.as_ref() == a2.as_ref(),
            (
                RExpr::ReflectStructure { result: r1, name_var: n1, arity_var: k1, list_var: l1 },
                RExpr::ReflectStructure { result: r2, name_var: n2, arity_var: k2, list_var: l2 },
            ) => r1 == r2 && n1 == n2 && k1 == k2 && l1 == l2,
            (
                RExpr::Evaluate { ret: r1, term_var: t1 },
                RExpr::Evaluate { ret: r2, term_var: t2 },
            ) => r1 == r2 && t1 == t2,
            (RExpr::Aggregator(a), RExpr::Aggregator(b)) => Arc::ptr_eq(a, b) || a == b,
            (RExpr::Call(a), RExpr::Call(b)) => Arc::ptr_eq(a, b) || a == b,
            (RExpr::ModedOp(a), RExpr::ModedOp(b)) => Arc::ptr_eq(a, b) || a == b,
            (
                RExpr::AssumptionWrapper { assumption: a1, child: c1 },
                RExpr::AssumptionWrapper { assumption: a2, child: c2 },
            ) => a1 == a2 && c1 == c2,
            _ => false,
        }
    }
}

/// Every free variable occurring directly in this node (not descending into
/// `Call`'s deferred body, which is only reachable through the system).
pub fn vars_of(r: &RExpr) -> Vec<Variable> {
    match r {
        RExpr::Terminal(_) | RExpr::Error => vec![],
        RExpr::Intersect(cs) => cs.iter().flat_map(vars_of).collect(),
        RExpr::Partition(p) => p.vars(),
        RExpr::Unify(a, b) => vec![a.clone(), b.clone()],
        RExpr::BuildStructure { result, args, .. } => {
            let mut v = vec![result.clone()];
            v.extend(args.iter().cloned());
            v
        }
        RExpr::ReflectStructure { result, name_var, arity_var, list_var } => {
            vec![result.clone(), name_var.clone(), arity_var.clone(), list_var.clone()]
        }
        RExpr::Evaluate { ret, term_var } => vec![ret.clone(), term_var.clone()],
        RExpr::Aggregator(a) => a.vars(),
        RExpr::Call(c) => c.vars(),
        RExpr::ModedOp(m) => m.vars(),
        RExpr::AssumptionWrapper { child, .. } => vars_of(child),
    }
}

/// Remaps every variable occurrence through `remap`. Constants and
/// `Unitary` pass through unchanged (they carry no identity to rename).
pub fn rename_vars(r: &RExpr, remap: &impl Fn(&Variable) -> Variable) -> RExpr {
    let rv = |v: &Variable| match v {
        Variable::Named(_) => remap(v),
        other => other.clone(),
    };
    match r {
        RExpr::Terminal(n) => RExpr::Terminal(*n),
        RExpr::Error => RExpr::Error,
        RExpr::Intersect(cs) => RExpr::Intersect(cs.iter().map(|c| rename_vars(c, remap)).collect()),
        RExpr::Partition(p) => RExpr::Partition(Arc::new(p.rename_vars(remap))),
        RExpr::Unify(a, b) => RExpr::Unify(rv(a), rv(b)),
        RExpr::BuildStructure { name, result, args } => RExpr::BuildStructure {
            name: name.clone(),
            result: rv(result),
            args: args.iter().map(rv).collect(),
        },
        RExpr::ReflectStructure { result, name_var, arity_var, list_var } => RExpr::ReflectStructure {
            result: rv(result),
            name_var: rv(name_var),
            arity_var: rv(arity_var),
            list_var: rv(list_var),
        },
        RExpr::Evaluate { ret, term_var } => RExpr::Evaluate { ret: rv(ret), term_var: rv(term_var) },
        RExpr::Aggregator(a) => RExpr::Aggregator(Arc::new(a.rename_vars(remap))),
        RExpr::Call(c) => RExpr::Call(Arc::new(c.rename_vars(remap))),
        RExpr::ModedOp(m) => RExpr::ModedOp(Arc::new(m.rename_vars(remap))),
        RExpr::AssumptionWrapper { assumption, child } => RExpr::AssumptionWrapper {
            assumption: assumption.clone(),
            child: Box::new(rename_vars(child, remap)),
        },
    }
}

/// As [`rename_vars`], but any variable for which `remap` returns `None`
/// receives a freshly generated unique name. This is the mechanism for
/// calling an R-expression "like a procedure" (spec.md §4.3): the caller
/// supplies a partial map for the formal positional parameters plus
/// `Return`, and every other internal variable is α-renamed fresh.
pub fn rename_vars_unique(r: &RExpr, remap: &HashMap<VarKey, Variable>) -> RExpr {
    // `rename_vars` takes a `Fn`, but generating fresh names on the fly
    // needs interior mutability for the memoisation cache; a `RefCell`
    // bridges the two without changing `rename_vars`'s public shape (it is
    // also used by callers with no need for caching).
    let cache = std::cell::RefCell::new(HashMap::<VarKey, Variable>::new());
    let remap_fn = |v: &Variable| -> Variable {
        let Variable::Named(k) = v else { return v.clone() };
        if let Some(mapped) = remap.get(k) {
            return mapped.clone();
        }
        cache
            .borrow_mut()
            .entry(k.clone())
            .or_insert_with(Variable::fresh)
            .clone()
    };
    rename_vars(r, &remap_fn)
}

/// `intersect(c…)`: multiplies `Terminal`s, short-circuits on an empty
/// child, drops `Terminal(1)` units, flattens a singleton child up.
pub fn intersect(children: impl IntoIterator<Item = RExpr>) -> RExpr {
    let mut mult: u64 = 1;
    let mut has_error = false;
    let mut rest = Vec::new();
    for c in children {
        match c {
            RExpr::Terminal(0) => return RExpr::Terminal(0),
            RExpr::Terminal(n) => mult = mult.saturating_mul(n),
            RExpr::Error => has_error = true,
            RExpr::Intersect(inner) => rest.extend(inner.iter().cloned()),
            other => rest.push(other),
        }
    }
    if has_error {
        // Error behaves like Terminal(0) for emptiness but must be
        // preserved until disproved: an Intersect containing it is only
        // fully absorbed by an actual Terminal(0), handled above.
        rest.push(RExpr::Error);
    }
    if mult == 0 {
        return RExpr::Terminal(0);
    }
    if rest.is_empty() {
        return RExpr::Terminal(mult);
    }
    if mult != 1 {
        rest.push(RExpr::Terminal(mult));
    }
    if rest.len() == 1 {
        return rest.into_iter().next().unwrap();
    }
    RExpr::Intersect(rest.into())
}

pub fn unify(a: Variable, b: Variable) -> RExpr {
    if a == b {
        return RExpr::Terminal(1);
    }
    if let (Variable::Constant(x), Variable::Constant(y)) = (&a, &b) {
        return RExpr::Terminal(if x.0 == y.0 { 1 } else { 0 });
    }
    RExpr::Unify(a, b)
}

pub fn build_structure(name: impl Into<Arc<str>>, result: Variable, args: impl Into<Arc<[Variable]>>) -> RExpr {
    RExpr::BuildStructure { name: name.into(), result, args: args.into() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn intersect_absorbs_zero() {
        let r = intersect(vec![RExpr::Terminal(1), RExpr::Terminal(0), RExpr::Terminal(5)]);
        assert_eq!(r, RExpr::Terminal(0));
    }

    #[test]
    fn intersect_multiplies_terminals() {
        let r = intersect(vec![RExpr::Terminal(2), RExpr::Terminal(3)]);
        assert_eq!(r, RExpr::Terminal(6));
    }

    #[test]
    fn intersect_drops_units_and_flattens_singleton() {
        let v = Variable::named("X");
        let r = intersect(vec![RExpr::Terminal(1), RExpr::Unify(v.clone(), v.clone())]);
        // Unify(X,X) itself collapses to Terminal(1) only via `unify()`, not
        // via the raw enum constructor, so this checks flattening instead.
        assert_eq!(r, RExpr::Unify(v.clone(), v));
    }

    #[test]
    fn unify_same_variable_is_unit() {
        let v = Variable::named("X");
        assert_eq!(unify(v.clone(), v), RExpr::Terminal(1));
    }

    #[test]
    fn unify_equal_constants_is_unit() {
        let a = Variable::constant(Value::Int(1));
        let b = Variable::constant(Value::Int(1));
        assert_eq!(unify(a, b), RExpr::Terminal(1));
    }

    #[test]
    fn unify_unequal_constants_is_zero() {
        let a = Variable::constant(Value::Int(1));
        let b = Variable::constant(Value::Int(2));
        assert_eq!(unify(a, b), RExpr::Terminal(0));
    }
}
