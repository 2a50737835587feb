//! The type-indexed rewriter (spec.md §4.4): `simplify` dispatches on the
//! `RExpr` variant and returns a new tree, possibly binding variables in
//! `F` along the way; `saturate` iterates `simplify` to a fixed point.
//! Grounded in the teacher's `ir`/`optimizer` visitor-dispatch style of one
//! function per node kind, matched here on `RExpr`'s variants instead of
//! `IRNode`'s.

use super::call::simplify_call;
use super::{aggregate::simplify_aggregator, partition::simplify_partition, RExpr};
use crate::context::EngineCtx;
use crate::value::{Term, Value};
use crate::variable::{Frame, Variable, VarKey};
use std::collections::HashMap;
use std::sync::Arc;

fn is_final(r: &RExpr) -> bool {
    matches!(r, RExpr::Terminal(_) | RExpr::Error)
}

/// `simplify(R, F)` (spec.md §4.4). Never propagates a unification-failure
/// past its own boundary: any `set_value` failure encountered while
/// rewriting a node collapses that node to `Terminal(0)`.
pub fn simplify(r: &RExpr, frame: &mut Frame, ctx: EngineCtx) -> RExpr {
    match r {
        RExpr::Terminal(n) => RExpr::Terminal(*n),
        RExpr::Error => RExpr::Error,

        RExpr::Intersect(children) => {
            let mut results = Vec::with_capacity(children.len());
            for c in children.iter() {
                let rc = simplify(c, frame, ctx);
                if rc == RExpr::Terminal(0) {
                    return RExpr::Terminal(0);
                }
                results.push(rc);
            }
            super::intersect(results)
        }

        RExpr::Unify(a, b) => simplify_unify(a, b, frame),

        RExpr::BuildStructure { name, result, args } => simplify_build_structure(name, result, args, frame),

        RExpr::ReflectStructure { result, name_var, arity_var, list_var } => {
            simplify_reflect_structure(result, name_var, arity_var, list_var, frame, ctx)
        }

        RExpr::Evaluate { ret, term_var } => simplify_evaluate(ret, term_var, frame, ctx),

        RExpr::Partition(p) => simplify_partition(p, frame, ctx),

        RExpr::Aggregator(a) => simplify_aggregator(a, frame, ctx),

        RExpr::Call(c) => simplify_call(c, frame, ctx),

        RExpr::ModedOp(m) => m.simplify(frame),

        RExpr::AssumptionWrapper { assumption, child } => {
            if assumption.is_valid() {
                let simplified = simplify(child, frame, ctx);
                if is_final(&simplified) {
                    simplified
                } else {
                    RExpr::AssumptionWrapper { assumption: assumption.clone(), child: Box::new(simplified) }
                }
            } else {
                // Stale: the definition changed underneath this cached
                // subtree. Re-simplify the pre-simplification child from
                // scratch so any embedded `Call` re-resolves via a fresh
                // `lookup_term`.
                simplify(child, frame, ctx)
            }
        }
    }
}

fn simplify_unify(a: &Variable, b: &Variable, frame: &mut Frame) -> RExpr {
    if let Some(v) = a.get_value(frame) {
        return match b.set_value(frame, v) {
            Ok(()) => RExpr::Terminal(1),
            Err(_) => RExpr::Terminal(0),
        };
    }
    if let Some(v) = b.get_value(frame) {
        return match a.set_value(frame, v) {
            Ok(()) => RExpr::Terminal(1),
            Err(_) => RExpr::Terminal(0),
        };
    }
    RExpr::Unify(a.clone(), b.clone())
}

fn simplify_build_structure(name: &Arc<str>, result: &Variable, args: &Arc<[Variable]>, frame: &mut Frame) -> RExpr {
    if let Some(v) = result.get_value(frame) {
        let Value::Term(t) = &v else { return RExpr::Terminal(0) };
        if t.name() != name.as_ref() || t.arity() != args.len() {
            return RExpr::Terminal(0);
        }
        for (arg, val) in args.iter().zip(t.args().iter()) {
            if arg.set_value(frame, val.clone()).is_err() {
                return RExpr::Terminal(0);
            }
        }
        return RExpr::Terminal(1);
    }
    if args.iter().all(|a| a.is_bound(frame)) {
        let values: Vec<Value> = args.iter().map(|a| a.get_value(frame).unwrap()).collect();
        let term = Value::Term(Term::new(name.clone(), values));
        return match result.set_value(frame, term) {
            Ok(()) => RExpr::Terminal(1),
            Err(_) => RExpr::Terminal(0),
        };
    }
    RExpr::BuildStructure { name: name.clone(), result: result.clone(), args: args.clone() }
}

fn simplify_reflect_structure(
    result: &Variable,
    name_var: &Variable,
    arity_var: &Variable,
    list_var: &Variable,
    frame: &mut Frame,
    ctx: EngineCtx,
) -> RExpr {
    if let Some(v) = result.get_value(frame) {
        let Value::Term(t) = &v else { return RExpr::Terminal(0) };
        let name_ok = name_var.set_value(frame, Value::Str(Arc::from(t.name())));
        let arity_ok = arity_var.set_value(frame, Value::Int(t.arity() as i64));
        let list = Value::Term(Term::fromlist(t.args().to_vec()));
        let list_ok = list_var.set_value(frame, list);
        if name_ok.is_err() || arity_ok.is_err() || list_ok.is_err() {
            return RExpr::Terminal(0);
        }
        return RExpr::Terminal(1);
    }

    if name_var.is_bound(frame) && list_var.is_bound(frame) {
        let Some(Value::Str(name)) = name_var.get_value(frame) else { return RExpr::Terminal(0) };
        let Some(Value::Term(list_term)) = list_var.get_value(frame) else { return RExpr::Terminal(0) };
        let Some(items) = list_term.aslist() else { return RExpr::Terminal(0) };
        if let Some(v) = arity_var.get_value(frame) {
            if v != Value::Int(items.len() as i64) {
                return RExpr::Terminal(0);
            }
        } else if arity_var.set_value(frame, Value::Int(items.len() as i64)).is_err() {
            return RExpr::Terminal(0);
        }
        let term = Value::Term(Term::new(name, items));
        return match result.set_value(frame, term) {
            Ok(()) => RExpr::Terminal(1),
            Err(_) => RExpr::Terminal(0),
        };
    }

    if name_var.is_bound(frame) && arity_var.is_bound(frame) && !list_var.is_bound(frame) {
        let Some(Value::Str(name)) = name_var.get_value(frame) else { return RExpr::Terminal(0) };
        let Some(Value::Int(arity)) = arity_var.get_value(frame) else { return RExpr::Terminal(0) };
        if arity < 0 {
            return RExpr::Terminal(0);
        }
        let fresh: Vec<Variable> = (0..arity).map(|_| Variable::fresh()).collect();
        let expanded = super::build_structure(name.clone(), result.clone(), fresh.clone());
        let list_rexpr = build_list_chain(&fresh, list_var);
        return simplify(&super::intersect(vec![expanded, list_rexpr]), frame, ctx);
    }

    RExpr::ReflectStructure {
        result: result.clone(),
        name_var: name_var.clone(),
        arity_var: arity_var.clone(),
        list_var: list_var.clone(),
    }
}

/// Builds `list_var = .(fresh[0], .(fresh[1], …, nil))` as a chain of
/// `BuildStructure` cons-cell constraints plus a final `Unify` on
/// `list_var`, per spec.md §4.4's ReflectStructure expansion rule.
fn build_list_chain(items: &[Variable], list_var: &Variable) -> RExpr {
    let mut cell = Variable::constant(Value::Term(Term::new("nil", [])));
    let mut parts = Vec::new();
    for item in items.iter().rev() {
        let next_cell = Variable::fresh();
        parts.push(super::build_structure(".", next_cell.clone(), vec![item.clone(), cell.clone()]));
        cell = next_cell;
    }
    parts.push(super::unify(list_var.clone(), cell));
    super::intersect(parts)
}

fn simplify_evaluate(ret: &Variable, term_var: &Variable, frame: &mut Frame, ctx: EngineCtx) -> RExpr {
    let Some(v) = term_var.get_value(frame) else {
        return RExpr::Evaluate { ret: ret.clone(), term_var: term_var.clone() };
    };
    // Open question 4: a type-mismatched Evaluate input is Terminal(0), not
    // a surfaced error (DESIGN.md).
    let Value::Term(t) = &v else { return RExpr::Terminal(0) };

    let (_assumption, body) = ctx.system.lookup_term(t.name(), t.arity());
    let mut remap: HashMap<VarKey, Variable> = HashMap::new();
    for (i, arg) in t.args().iter().enumerate() {
        remap.insert(VarKey::named(i.to_string()), Variable::constant(arg.clone()));
    }
    remap.insert(VarKey::named("Return"), ret.clone());
    let renamed = super::rename_vars_unique(&body, &remap);
    simplify(&renamed, frame, ctx)
}

/// `saturate(R, F)`: iterate `simplify` to a fixed point (structural
/// equality between successive rewrites).
pub fn saturate(r: &RExpr, frame: &mut Frame, ctx: EngineCtx) -> RExpr {
    let mut current = r.clone();
    loop {
        let next = simplify(&current, frame, ctx);
        if next == current {
            return next;
        }
        current = next;
    }
}
