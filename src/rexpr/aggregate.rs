//! The aggregator protocol (spec.md §4.5, "Aggregator protocol") and the
//! built-in aggregators, grounded structurally in
//! `src/semiring_types.rs::DiffType` (an algebraic supertrait bundling
//! combine/identity/commutativity requirements for a differential-dataflow
//! diff type) and in the `AggregatorOpBase` hierarchy of
//! `examples/original_source/dyna/aggregators.py`, which this crate's
//! built-in table (`=`, `+=`, `*=`, `max=`, `min=`, `:-`/`|=`, `&=`, `:=`)
//! follows exactly, including the open-question resolutions recorded in
//! `DESIGN.md`.

use crate::context::EngineCtx;
use crate::error::{EngineError, Saturated};
use crate::iter::{loop_, LoopControl};
use crate::rexpr::RExpr;
use crate::value::{OrderedFloat, Term, Value};
use crate::variable::{Frame, Variable};
use std::fmt;
use std::sync::Arc;

/// `lift` / `combine` / `combine_multiplicity` / `lower`.
pub trait AggregatorOp: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Applied to a body-result before combining. Identity for most; may
    /// raise `Saturated` (e.g. `:-`/`|=` lifting a literal `true`).
    fn lift(&self, x: Value) -> Result<Value, Saturated> {
        Ok(x)
    }

    /// Associative; may raise `Saturated` to signal the fixed point is
    /// reached.
    fn combine(&self, a: Value, b: Value) -> Result<Value, Saturated>;

    /// Combines `x` into `acc` `n` times. Default iterates `combine`;
    /// overridden only where a closed form is cheaper.
    fn combine_multiplicity(&self, acc: Value, x: Value, n: u64) -> Result<Value, Saturated> {
        let mut acc = acc;
        for _ in 0..n {
            acc = self.combine(acc, x.clone())?;
        }
        Ok(acc)
    }

    /// Finalises the accumulated value. Returns `None` when there is
    /// nothing to bind (only `:=` with a `$null` payload does this — see
    /// `AggregatorColonEquals` below and `DESIGN.md`'s open-question 3).
    fn lower(&self, x: Value) -> Option<Value> {
        Some(x)
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorEqual;
impl AggregatorOp for AggregatorEqual {
    fn name(&self) -> &'static str {
        "="
    }
    fn combine(&self, _a: Value, _b: Value) -> Result<Value, Saturated> {
        // A second contribution is always a conflict, even if structurally
        // identical to the first (DESIGN.md open question 2).
        Ok(Value::error())
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorSum;
impl AggregatorOp for AggregatorSum {
    fn name(&self) -> &'static str {
        "+="
    }
    fn combine(&self, a: Value, b: Value) -> Result<Value, Saturated> {
        Ok(arith(a, b, |x, y| x + y, |x, y| x + y))
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorProduct;
impl AggregatorOp for AggregatorProduct {
    fn name(&self) -> &'static str {
        "*="
    }
    fn combine(&self, a: Value, b: Value) -> Result<Value, Saturated> {
        Ok(arith(a, b, |x, y| x * y, |x, y| x * y))
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorMax;
impl AggregatorOp for AggregatorMax {
    fn name(&self) -> &'static str {
        "max="
    }
    fn combine(&self, a: Value, b: Value) -> Result<Value, Saturated> {
        Ok(arith(a, b, i64::max, f64::max))
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorMin;
impl AggregatorOp for AggregatorMin {
    fn name(&self) -> &'static str {
        "min="
    }
    fn combine(&self, a: Value, b: Value) -> Result<Value, Saturated> {
        Ok(arith(a, b, i64::min, f64::min))
    }
}

fn arith(a: Value, b: Value, fi: fn(i64, i64) -> i64, ff: fn(f64, f64) -> f64) -> Value {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Value::Int(fi(x, y)),
        (Value::Float(x), Value::Float(y)) => Value::Float(OrderedFloat(ff(x.0, y.0))),
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => {
            Value::Float(OrderedFloat(ff(x as f64, y.0)))
        }
        _ => Value::error(),
    }
}

/// `:-` and `|=` are the same aggregator under two names: logical OR,
/// saturating at `true`. `&=` saturates at `false`. Per DESIGN.md open
/// question 1, truthiness (not a `Value::Bool` type requirement) decides
/// both the saturation check and the combine step, mirroring
/// `aggregators.py`'s generic `self.saturated == x` comparison over
/// whatever value `lift`/`combine` produced.
#[derive(Debug, Clone)]
pub struct AggregatorSaturatingBool {
    pub op_name: &'static str,
    pub saturated_value: bool,
    pub combine_fn: fn(bool, bool) -> bool,
}

impl AggregatorOp for AggregatorSaturatingBool {
    fn name(&self) -> &'static str {
        self.op_name
    }
    fn lift(&self, x: Value) -> Result<Value, Saturated> {
        if x.as_bool() == self.saturated_value {
            return Err(Saturated(Value::Bool(self.saturated_value)));
        }
        Ok(Value::Bool(x.as_bool()))
    }
    fn combine(&self, a: Value, b: Value) -> Result<Value, Saturated> {
        let r = (self.combine_fn)(a.as_bool(), b.as_bool());
        if r == self.saturated_value {
            return Err(Saturated(Value::Bool(r)));
        }
        Ok(Value::Bool(r))
    }
}

pub fn or_aggregator() -> AggregatorSaturatingBool {
    AggregatorSaturatingBool { op_name: "|=", saturated_value: true, combine_fn: |a, b| a || b }
}

pub fn and_aggregator() -> AggregatorSaturatingBool {
    AggregatorSaturatingBool { op_name: "&=", saturated_value: false, combine_fn: |a, b| a && b }
}

/// Latest-assignment: keeps the contributor tagged with the greater source
/// line; `$null` means no value (DESIGN.md open question 3 — ties favour
/// the later-combined, i.e. right-hand, operand since the source's
/// comparison is strict `>`).
#[derive(Debug, Clone)]
pub struct AggregatorColonEquals;

impl AggregatorColonEquals {
    pub fn wrap(line: i64, value: Value) -> Value {
        Value::Term(Term::new("$colon_line_tracking", vec![Value::Int(line), value]))
    }
}

impl AggregatorOp for AggregatorColonEquals {
    fn name(&self) -> &'static str {
        ":="
    }
    fn combine(&self, a: Value, b: Value) -> Result<Value, Saturated> {
        let (Value::Term(ta), Value::Term(tb)) = (&a, &b) else {
            return Ok(Value::error());
        };
        let (Value::Int(la), Value::Int(lb)) = (&ta.args()[0], &tb.args()[0]) else {
            return Ok(Value::error());
        };
        Ok(if la > lb { a } else { b })
    }
    fn lower(&self, x: Value) -> Option<Value> {
        let Value::Term(t) = &x else { return Some(x) };
        let inner = t.args().get(1)?.clone();
        if inner.is_null() {
            None
        } else {
            Some(inner)
        }
    }
}

/// A named handle over a boxed `AggregatorOp`, so `Aggregator` nodes can
/// carry an operator while still supporting structural equality/Debug
/// (trait objects compare by identity via `name()`, matching how the
/// built-in table is a fixed, named set rather than arbitrary closures).
#[derive(Clone)]
pub struct AggregatorSpec(pub Arc<dyn AggregatorOp>);

impl fmt::Debug for AggregatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AggregatorSpec({})", self.0.name())
    }
}

impl PartialEq for AggregatorSpec {
    fn eq(&self, other: &Self) -> bool {
        self.0.name() == other.0.name()
    }
}

pub fn builtin(name: &str) -> Option<AggregatorSpec> {
    let op: Arc<dyn AggregatorOp> = match name {
        "=" => Arc::new(AggregatorEqual),
        "+=" => Arc::new(AggregatorSum),
        "*=" => Arc::new(AggregatorProduct),
        "max=" => Arc::new(AggregatorMax),
        "min=" => Arc::new(AggregatorMin),
        ":-" | "|=" => Arc::new(or_aggregator()),
        "&=" => Arc::new(and_aggregator()),
        ":=" => Arc::new(AggregatorColonEquals),
        _ => return None,
    };
    Some(AggregatorSpec(op))
}

/// `Aggregator(result, head_vars, body_res, op, body)` (spec.md §3.3).
#[derive(Debug, Clone)]
pub struct AggregatorNode {
    pub result: Variable,
    pub head_vars: Arc<[Variable]>,
    pub body_res: Variable,
    pub op: AggregatorSpec,
    pub body: super::RExpr,
}

impl PartialEq for AggregatorNode {
    fn eq(&self, other: &Self) -> bool {
        self.result == other.result
            && self.head_vars.as_ref() == other.head_vars.as_ref()
            && self.body_res == other.body_res
            && self.op == other.op
            && self.body == other.body
    }
}

impl AggregatorNode {
    pub fn vars(&self) -> Vec<Variable> {
        let mut v = vec![self.result.clone(), self.body_res.clone()];
        v.extend(self.head_vars.iter().cloned());
        v.extend(super::vars_of(&self.body));
        v
    }

    pub fn rename_vars(&self, remap: &impl Fn(&Variable) -> Variable) -> AggregatorNode {
        let rv = |v: &Variable| match v {
            Variable::Named(_) => remap(v),
            other => other.clone(),
        };
        AggregatorNode {
            result: rv(&self.result),
            head_vars: self.head_vars.iter().map(rv).collect(),
            body_res: rv(&self.body_res),
            op: self.op.clone(),
            body: super::rename_vars(&self.body, remap),
        }
    }
}

/// `Aggregator` simplify (spec.md §4.5, "Aggregator simplify"). Infallible:
/// a resource-limit breach is recorded on `frame` (see
/// `Frame::set_pending_error`) rather than threaded through every
/// `simplify` signature, mirroring how unification-failure is already
/// absorbed locally — the query surface (`crate::query`) is what turns a
/// pending error into a surfaced `EngineError`.
pub fn simplify_aggregator(node: &AggregatorNode, frame: &mut Frame, ctx: EngineCtx) -> RExpr {
    let body = super::simplify::simplify(&node.body, frame, ctx);

    let head_bound = node.head_vars.iter().all(|v| v.is_bound(frame));
    if !head_bound {
        return RExpr::Aggregator(Arc::new(AggregatorNode { body, ..node.clone() }));
    }

    let mut acc: Option<Value> = None;
    let mut saturated: Option<Value> = None;
    let mut iterations: u64 = 0;
    let mut limit_hit = false;

    loop_(&body, frame, true, ctx, &mut |r, f| {
        if saturated.is_some() || limit_hit {
            return LoopControl::Stop;
        }
        let RExpr::Terminal(n) = r else {
            return LoopControl::Continue;
        };
        if *n == 0 {
            return LoopControl::Continue;
        }
        iterations += 1;
        if let Some(limit) = ctx.config.max_aggregation_iterations {
            if iterations > limit as u64 {
                limit_hit = true;
                return LoopControl::Stop;
            }
        }
        let v = node.body_res.get_value(f).unwrap_or_else(Value::null);
        let lifted = match node.op.0.lift(v) {
            Ok(x) => x,
            Err(Saturated(x)) => {
                saturated = Some(x);
                return LoopControl::Stop;
            }
        };
        acc = Some(match acc.take() {
            None => lifted,
            Some(prev) => match node.op.0.combine_multiplicity(prev, lifted, *n) {
                Ok(x) => x,
                Err(Saturated(x)) => {
                    saturated = Some(x);
                    return LoopControl::Stop;
                }
            },
        });
        LoopControl::Continue
    });

    if limit_hit {
        frame.set_pending_error(EngineError::ResourceLimitExceeded {
            limit: ctx.config.max_aggregation_iterations.unwrap_or(0),
            actual: iterations as usize,
            stage: "aggregator".to_string(),
        });
        return RExpr::Terminal(0);
    }

    let acc = saturated.or(acc);
    let Some(acc) = acc else {
        // No contributions at all: the empty aggregation is the aggregator
        // step itself finding zero branches, which simplify's caller sees
        // as `Terminal(0)` rather than a spurious bound result.
        return RExpr::Terminal(0);
    };

    match node.op.0.lower(acc) {
        Some(v) => {
            if node.result.set_value(frame, v).is_err() {
                return RExpr::Terminal(0);
            }
            RExpr::Terminal(1)
        }
        None => RExpr::Terminal(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_conflicts_on_second_contribution() {
        let op = AggregatorEqual;
        let v = op.combine(Value::Int(1), Value::Int(1)).unwrap();
        assert!(v.is_error());
    }

    #[test]
    fn sum_is_associative_over_permutations() {
        let op = AggregatorSum;
        let xs = [Value::Int(1), Value::Int(2), Value::Int(3)];
        let forward = xs.iter().cloned().reduce(|a, b| op.combine(a, b).unwrap()).unwrap();
        let backward =
            xs.iter().rev().cloned().reduce(|a, b| op.combine(a, b).unwrap()).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward, Value::Int(6));
    }

    #[test]
    fn or_saturates_at_true() {
        let op = or_aggregator();
        let r = op.combine(Value::Bool(true), Value::Bool(false));
        assert!(r.is_err());
    }

    #[test]
    fn and_saturates_at_false() {
        let op = and_aggregator();
        let r = op.combine(Value::Bool(false), Value::Bool(true));
        assert!(r.is_err());
    }

    #[test]
    fn colon_equals_prefers_greater_line_and_ties_go_to_second() {
        let op = AggregatorColonEquals;
        let a = AggregatorColonEquals::wrap(1, Value::Int(10));
        let b = AggregatorColonEquals::wrap(2, Value::Int(20));
        assert_eq!(op.combine(a.clone(), b.clone()).unwrap(), b.clone());

        let tie_a = AggregatorColonEquals::wrap(5, Value::Int(100));
        let tie_b = AggregatorColonEquals::wrap(5, Value::Int(200));
        assert_eq!(op.combine(tie_a, tie_b.clone()).unwrap(), tie_b);
    }

    #[test]
    fn colon_equals_lowers_null_to_none() {
        let op = AggregatorColonEquals;
        let wrapped = AggregatorColonEquals::wrap(1, Value::null());
        assert_eq!(op.lower(wrapped), None);
    }
}
