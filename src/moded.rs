//! Moded primitives (spec.md §4.8): a uniform interface for built-in
//! predicates whose implementation depends on which of their variables are
//! currently bound. Arithmetic and comparison builtins are grounded in the
//! teacher's `ast::ArithOp`/`ast::BuiltinFunc` vocabulary
//! (`src/ast/mod.rs`); host-defined functions registered by an embedder
//! become moded operators with a single `(false, true, true, …)` mask
//! exactly as spec.md §4.8 describes.

use crate::error::UnificationFailure;
use crate::iter::{RangeIterator, VarIterator};
use crate::rexpr::RExpr;
use crate::value::Value;
use crate::variable::{Frame, Variable};
use std::fmt;
use std::sync::Arc;

/// One mode-specific implementation of a moded operator: applies when the
/// bound-mask of `vars` matches `mask()` exactly.
pub trait ModedImpl: Send + Sync + fmt::Debug {
    fn mask(&self) -> Vec<bool>;
    fn apply(&self, frame: &mut Frame, vars: &[Variable]) -> Result<RExpr, UnificationFailure>;
}

#[derive(Clone)]
pub struct ModedOpNode {
    pub name: Arc<str>,
    pub vars: Arc<[Variable]>,
    pub impls: Arc<[Arc<dyn ModedImpl>]>,
}

impl fmt::Debug for ModedOpNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModedOpNode").field("name", &self.name).field("vars", &self.vars).finish()
    }
}

impl PartialEq for ModedOpNode {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.vars.as_ref() == other.vars.as_ref()
    }
}

impl ModedOpNode {
    pub fn vars(&self) -> Vec<Variable> {
        self.vars.iter().cloned().collect()
    }

    pub fn rename_vars(&self, remap: &impl Fn(&Variable) -> Variable) -> ModedOpNode {
        let rv = |v: &Variable| match v {
            Variable::Named(_) => remap(v),
            other => other.clone(),
        };
        ModedOpNode {
            name: self.name.clone(),
            vars: self.vars.iter().map(rv).collect(),
            impls: self.impls.clone(),
        }
    }

    /// Looks up the implementation whose mask matches the current
    /// bound-mask of `vars` and runs it; leaves the node as residue if
    /// none matches (spec.md §4.8).
    pub fn simplify(&self, frame: &mut Frame) -> RExpr {
        let mask: Vec<bool> = self.vars.iter().map(|v| v.is_bound(frame)).collect();
        for imp in self.impls.iter() {
            if imp.mask() == mask {
                return match imp.apply(frame, &self.vars) {
                    Ok(r) => r,
                    Err(UnificationFailure) => RExpr::Terminal(0),
                };
            }
        }
        RExpr::ModedOp(Arc::new(self.clone()))
    }

    /// `range` is the one builtin that doubles as an iterator source for
    /// the loop driver: when neither a registered mode matches (the result
    /// variable is unbound) nor has it been inlined, `get_partitions`
    /// recognises it here rather than through a generic plugin mechanism.
    pub fn as_iterator(&self, frame: &Frame) -> Option<Box<dyn VarIterator>> {
        if self.name.as_ref() != "range" || self.vars.len() != 3 {
            return None;
        }
        let [lo, hi, out] = [&self.vars[0], &self.vars[1], &self.vars[2]];
        if out.is_bound(frame) {
            return None;
        }
        let (Value::Int(lo), Value::Int(hi)) = (lo.get_value(frame)?, hi.get_value(frame)?) else {
            return None;
        };
        Some(Box::new(RangeIterator { var: out.clone(), lo, hi }))
    }
}

#[derive(Debug)]
struct ArithBinary {
    mask: Vec<bool>,
    f: fn(i64, i64) -> i64,
}

impl ModedImpl for ArithBinary {
    fn mask(&self) -> Vec<bool> {
        self.mask.clone()
    }
    fn apply(&self, frame: &mut Frame, vars: &[Variable]) -> Result<RExpr, UnificationFailure> {
        let (Value::Int(a), Value::Int(b)) = (
            vars[0].get_value(frame).ok_or(UnificationFailure)?,
            vars[1].get_value(frame).ok_or(UnificationFailure)?,
        ) else {
            return Err(UnificationFailure);
        };
        let r = (self.f)(a, b);
        vars[2].set_value(frame, Value::Int(r))?;
        Ok(RExpr::Terminal(1))
    }
}

/// Builds a binary arithmetic moded op (`A op B = Result`), bound mode
/// `(true, true, false)` — the one mask spec.md §4.8's builtin scenario
/// (`add(7, 8) → 15`) exercises.
pub fn arith(name: &str, a: Variable, b: Variable, result: Variable, f: fn(i64, i64) -> i64) -> ModedOpNode {
    ModedOpNode {
        name: name.into(),
        vars: Arc::from(vec![a, b, result]),
        impls: Arc::from(vec![Arc::new(ArithBinary { mask: vec![true, true, false], f }) as Arc<dyn ModedImpl>]),
    }
}

#[derive(Debug)]
struct Compare {
    f: fn(i64, i64) -> bool,
}

impl ModedImpl for Compare {
    fn mask(&self) -> Vec<bool> {
        vec![true, true]
    }
    fn apply(&self, frame: &mut Frame, vars: &[Variable]) -> Result<RExpr, UnificationFailure> {
        let (Value::Int(a), Value::Int(b)) = (
            vars[0].get_value(frame).ok_or(UnificationFailure)?,
            vars[1].get_value(frame).ok_or(UnificationFailure)?,
        ) else {
            return Err(UnificationFailure);
        };
        Ok(RExpr::Terminal(if (self.f)(a, b) { 1 } else { 0 }))
    }
}

pub fn compare(name: &str, a: Variable, b: Variable, f: fn(i64, i64) -> bool) -> ModedOpNode {
    ModedOpNode {
        name: name.into(),
        vars: Arc::from(vec![a, b]),
        impls: Arc::from(vec![Arc::new(Compare { f }) as Arc<dyn ModedImpl>]),
    }
}

#[derive(Debug)]
struct RangeMembership;

impl ModedImpl for RangeMembership {
    fn mask(&self) -> Vec<bool> {
        vec![true, true, true]
    }
    fn apply(&self, frame: &mut Frame, vars: &[Variable]) -> Result<RExpr, UnificationFailure> {
        let (Value::Int(lo), Value::Int(hi), Value::Int(x)) = (
            vars[0].get_value(frame).ok_or(UnificationFailure)?,
            vars[1].get_value(frame).ok_or(UnificationFailure)?,
            vars[2].get_value(frame).ok_or(UnificationFailure)?,
        ) else {
            return Err(UnificationFailure);
        };
        Ok(RExpr::Terminal(if x >= lo && x < hi { 1 } else { 0 }))
    }
}

/// `range(Lo, Hi, X)`: generator when `X` is unbound (picked up by
/// [`ModedOpNode::as_iterator`]), membership check once `X` is bound too.
pub fn range_node(var: Variable, lo: i64, hi: i64) -> ModedOpNode {
    ModedOpNode {
        name: "range".into(),
        vars: Arc::from(vec![
            Variable::constant(Value::Int(lo)),
            Variable::constant(Value::Int(hi)),
            var,
        ]),
        impls: Arc::from(vec![Arc::new(RangeMembership) as Arc<dyn ModedImpl>]),
    }
}

/// As [`range_node`], but `lo`/`hi` are themselves variables bound at call
/// time rather than construction-time literals (e.g. a relation's own
/// formal parameters) — `as_iterator`/`RangeMembership` already read them
/// off the frame, so only the constructor needs to accept variables.
pub fn range(lo: Variable, hi: Variable, var: Variable) -> ModedOpNode {
    ModedOpNode {
        name: "range".into(),
        vars: Arc::from(vec![lo, hi, var]),
        impls: Arc::from(vec![Arc::new(RangeMembership) as Arc<dyn ModedImpl>]),
    }
}

/// Registers a host function under the single `(false, true, true, …)`
/// mask spec.md §4.8 calls out for user-registered host functions: the
/// result is unbound, every argument is bound.
pub fn host_function(
    name: &str,
    args: Vec<Variable>,
    result: Variable,
    f: Arc<dyn Fn(&[Value]) -> Value + Send + Sync>,
) -> ModedOpNode {
    #[derive(Debug)]
    struct HostImpl {
        arity: usize,
        f: Arc<dyn Fn(&[Value]) -> Value + Send + Sync>,
    }
    impl ModedImpl for HostImpl {
        fn mask(&self) -> Vec<bool> {
            let mut m = vec![true; self.arity];
            m.push(false);
            m
        }
        fn apply(&self, frame: &mut Frame, vars: &[Variable]) -> Result<RExpr, UnificationFailure> {
            let (args, result) = vars.split_at(vars.len() - 1);
            let values: Vec<Value> = args
                .iter()
                .map(|v| v.get_value(frame).ok_or(UnificationFailure))
                .collect::<Result<_, _>>()?;
            let r = (self.f)(&values);
            result[0].set_value(frame, r)?;
            Ok(RExpr::Terminal(1))
        }
    }
    let arity = args.len();
    let mut vars = args;
    vars.push(result);
    ModedOpNode {
        name: name.into(),
        vars: vars.into(),
        impls: Arc::from(vec![Arc::new(HostImpl { arity, f }) as Arc<dyn ModedImpl>]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_builtin_computes_when_both_bound() {
        let a = Variable::named("A");
        let b = Variable::named("B");
        let r = Variable::named("R");
        let mut frame = Frame::new();
        a.set_value(&mut frame, Value::Int(7)).unwrap();
        b.set_value(&mut frame, Value::Int(8)).unwrap();
        let node = arith("add", a, b, r.clone(), |x, y| x + y);
        let result = node.simplify(&mut frame);
        assert_eq!(result, RExpr::Terminal(1));
        assert_eq!(r.get_value(&frame), Some(Value::Int(15)));
    }

    #[test]
    fn add_builtin_is_residue_until_bound() {
        let a = Variable::named("A");
        let b = Variable::named("B");
        let r = Variable::named("R");
        let mut frame = Frame::new();
        a.set_value(&mut frame, Value::Int(7)).unwrap();
        let node = arith("add", a, b, r, |x, y| x + y);
        let result = node.simplify(&mut frame);
        assert!(matches!(result, RExpr::ModedOp(_)));
    }

    #[test]
    fn range_is_an_iterator_source_when_unbound() {
        let x = Variable::named("X");
        let node = range_node(x, 1, 4);
        let frame = Frame::new();
        let it = node.as_iterator(&frame).expect("range should be an iterator source");
        let values: Vec<_> = it.run(&frame).collect();
        assert_eq!(values, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }
}
