//! The query surface (spec.md §6, "Query surface"): turns a constructed
//! R-expression plus positional argument bindings into a final outcome,
//! applying the no-solution / single-solution / enumeration / incomplete
//! classification the core itself stays agnostic to.

use crate::context::EngineCtx;
use crate::error::EngineError;
use crate::iter::{loop_, LoopControl};
use crate::rexpr::{saturate, RExpr};
use crate::value::Value;
use crate::variable::{Frame, Variable};

/// The result of running a query to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// `Terminal(0)`: no solution.
    None,
    /// `Terminal(1)`: exactly one solution; carries `Return`'s bound value.
    One(Value),
    /// One binding of `Return` per enumerated solution (only reachable when
    /// the query had unbound positional slots).
    Many(Vec<Value>),
}

/// Runs `body` (an R-expression exposing a `ret` variable and a sequence of
/// positional parameter variables) against `args`: a ground value binds the
/// corresponding parameter, `None` leaves it as an unbound enumeration slot.
///
/// Returns `Ok(QueryOutcome)` on a fully classified result; returns
/// `Err(EngineError::IncompleteComputation)` when simplification lands on a
/// non-terminal residue and the caller did not opt into the residue itself
/// (there is no "opt in" path at this layer — an embedder wanting the raw
/// residue should call `saturate` directly instead of this helper).
pub fn query(
    body: &RExpr,
    ret: &Variable,
    params: &[Variable],
    args: &[Option<Value>],
    ctx: EngineCtx,
) -> Result<QueryOutcome, EngineError> {
    let mut frame = Frame::new();
    for (param, arg) in params.iter().zip(args.iter()) {
        if let Some(v) = arg {
            if param.set_value(&mut frame, v.clone()).is_err() {
                return Ok(QueryOutcome::None);
            }
        }
    }

    let has_unbound_slot = args.iter().any(|a| a.is_none());
    let result = saturate(body, &mut frame, ctx);

    if let Some(err) = frame.take_pending_error() {
        return Err(err);
    }

    match result {
        RExpr::Terminal(0) | RExpr::Error => Ok(QueryOutcome::None),
        RExpr::Terminal(_) => match ret.get_value(&frame) {
            Some(v) => Ok(QueryOutcome::One(v)),
            None => Ok(QueryOutcome::One(Value::null())),
        },
        _ if has_unbound_slot => {
            let mut solutions = Vec::new();
            loop_(&result, &frame, true, ctx, &mut |r, f| {
                if let RExpr::Terminal(n) = r {
                    if *n > 0 {
                        if let Some(v) = ret.get_value(f) {
                            solutions.push(v);
                        }
                    }
                }
                LoopControl::Continue
            });
            Ok(QueryOutcome::Many(solutions))
        }
        _ => Err(EngineError::IncompleteComputation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::system::System;

    #[test]
    fn query_with_no_solution_is_none() {
        let system = System::new();
        let config = EngineConfig::default();
        let ctx = EngineCtx::new(&system, &config);
        let outcome = query(&RExpr::Terminal(0), &Variable::named("Return"), &[], &[], ctx).unwrap();
        assert_eq!(outcome, QueryOutcome::None);
    }

    #[test]
    fn query_with_single_solution_binds_return() {
        let system = System::new();
        let config = EngineConfig::default();
        let ctx = EngineCtx::new(&system, &config);
        let ret = Variable::named("Return");
        let body = crate::rexpr::unify(ret.clone(), Variable::constant(Value::Int(42)));
        let outcome = query(&body, &ret, &[], &[], ctx).unwrap();
        assert_eq!(outcome, QueryOutcome::One(Value::Int(42)));
    }
}
