//! Iterators and the loop driver (spec.md §4.7).
//!
//! The loop driver enumerates variable bindings to drive disjunctive
//! search: it asks [`get_partitions`] for a candidate iterator, binds each
//! value the iterator yields into a cloned frame, re-saturates, and invokes
//! a callback per resulting branch. Concrete iterator kinds are a small
//! closed set (`SingleIterator`, `UnionIterator`, `RemapVarIterator`, plus
//! the lazy `RangeIterator` used by the `range` builtin for scenario (g)'s
//! unbounded-range saturation test) — grounded in the teacher's preference
//! for a small closed enum/trait-object hierarchy over generic iterator
//! chains when the variant shape is fixed (see `src/ir/mod.rs`'s `IRNode`).

use crate::context::EngineCtx;
use crate::rexpr::{simplify, RExpr};
use crate::variable::{Frame, Variable};

/// Whether the loop driver should keep enumerating further bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Stop,
}

/// An iterator binds a specific variable over a (possibly lazily produced)
/// set of values (spec.md §4.7).
pub trait VarIterator {
    /// The variable this iterator will bind.
    fn variable(&self) -> &Variable;

    /// Yields one binding per element. Must be lazy: callers may stop after
    /// the first few elements (scenario (g): a boolean aggregator over a
    /// huge range saturates long before the range is exhausted).
    fn run<'a>(&'a self, frame: &'a Frame) -> Box<dyn Iterator<Item = crate::value::Value> + 'a>;

    /// Whether this iterator would have emitted `x` for `variable()`. Used
    /// by `UnionIterator` to de-duplicate.
    fn bind(&self, frame: &Frame, x: &crate::value::Value) -> bool;

    /// Whether this iterator represents a fully materialised finite set.
    fn consolidated(&self) -> bool {
        true
    }
}

/// Emits `{var: value}` exactly once.
pub struct SingleIterator {
    pub var: Variable,
    pub value: crate::value::Value,
}

impl VarIterator for SingleIterator {
    fn variable(&self) -> &Variable {
        &self.var
    }
    fn run<'a>(&'a self, _frame: &'a Frame) -> Box<dyn Iterator<Item = crate::value::Value> + 'a> {
        Box::new(std::iter::once(self.value.clone()))
    }
    fn bind(&self, _frame: &Frame, x: &crate::value::Value) -> bool {
        &self.value == x
    }
}

/// The lazy integer range `[lo, hi)`, used by the `range` builtin moded
/// operator (`crate::moded`). Ties scenario (g)'s requirement that a
/// boolean aggregator over `[0, 10^20)` terminates without enumerating the
/// full range to this being a genuine Rust `Iterator`, not a materialised
/// `Vec`.
pub struct RangeIterator {
    pub var: Variable,
    pub lo: i64,
    pub hi: i64,
}

impl VarIterator for RangeIterator {
    fn variable(&self) -> &Variable {
        &self.var
    }
    fn run<'a>(&'a self, _frame: &'a Frame) -> Box<dyn Iterator<Item = crate::value::Value> + 'a> {
        Box::new((self.lo..self.hi).map(crate::value::Value::Int))
    }
    fn bind(&self, _frame: &Frame, x: &crate::value::Value) -> bool {
        matches!(x, crate::value::Value::Int(n) if *n >= self.lo && *n < self.hi)
    }
    fn consolidated(&self) -> bool {
        false
    }
}

/// Emits the set-union of its sub-iterators' outputs for `var`, de-duping
/// by querying earlier sub-iterators via `bind` — ties favour the earlier
/// sub-iterator (spec.md §5, "Ordering").
pub struct UnionIterator {
    pub var: Variable,
    pub subs: Vec<Box<dyn VarIterator>>,
}

impl VarIterator for UnionIterator {
    fn variable(&self) -> &Variable {
        &self.var
    }
    fn run<'a>(&'a self, frame: &'a Frame) -> Box<dyn Iterator<Item = crate::value::Value> + 'a> {
        Box::new(self.subs.iter().enumerate().flat_map(move |(i, sub)| {
            let earlier = &self.subs[..i];
            sub.run(frame)
                .filter(move |x| !earlier.iter().any(|e| e.bind(frame, x)))
        }))
    }
    fn bind(&self, frame: &Frame, x: &crate::value::Value) -> bool {
        self.subs.iter().any(|s| s.bind(frame, x))
    }
    fn consolidated(&self) -> bool {
        self.subs.iter().all(|s| s.consolidated())
    }
}

/// Wraps a child iterator so it appears to bind a different (renamed)
/// variable.
pub struct RemapVarIterator {
    pub var: Variable,
    pub inner: Box<dyn VarIterator>,
}

impl VarIterator for RemapVarIterator {
    fn variable(&self) -> &Variable {
        &self.var
    }
    fn run<'a>(&'a self, frame: &'a Frame) -> Box<dyn Iterator<Item = crate::value::Value> + 'a> {
        self.inner.run(frame)
    }
    fn bind(&self, frame: &Frame, x: &crate::value::Value) -> bool {
        self.inner.bind(frame, x)
    }
    fn consolidated(&self) -> bool {
        self.inner.consolidated()
    }
}

/// A visitor that yields a candidate iterator by descending into `R`'s
/// children (spec.md §4.7). Any choice among multiple valid candidates is
/// legal; this picks the first column of the first `Partition` reachable
/// without crossing a `Call`/`Aggregator` boundary (those introduce their
/// own enumeration scopes).
pub fn get_partitions(r: &RExpr, frame: &Frame) -> Option<Box<dyn VarIterator>> {
    match r {
        RExpr::Partition(p) => {
            for (j, col) in p.cols.iter().enumerate() {
                if col.is_bound(frame) {
                    continue;
                }
                let mut subs: Vec<Box<dyn VarIterator>> = Vec::new();
                let mut every_row_has_value = true;
                for row in &p.rows {
                    match &row.key[j] {
                        Some(v) => subs.push(Box::new(SingleIterator { var: col.clone(), value: v.clone() })),
                        None => {
                            if let Some(it) = get_partitions(&row.body, frame) {
                                if it.variable() == col {
                                    subs.push(it);
                                    continue;
                                }
                            }
                            every_row_has_value = false;
                            break;
                        }
                    }
                }
                if every_row_has_value && !subs.is_empty() {
                    return Some(Box::new(UnionIterator { var: col.clone(), subs }));
                }
            }
            None
        }
        RExpr::Intersect(cs) => cs.iter().find_map(|c| get_partitions(c, frame)),
        RExpr::AssumptionWrapper { child, .. } => get_partitions(child, frame),
        RExpr::ModedOp(m) => m.as_iterator(frame),
        _ => None,
    }
}

fn is_final(r: &RExpr) -> bool {
    matches!(r, RExpr::Terminal(_) | RExpr::Error)
}

/// `loop(R, F, cb, till_terminal?)` (spec.md §4.7). Frames are never
/// mutated in place here: every binding clones `frame` first, so the
/// caller's frame is untouched regardless of how many branches are
/// enumerated.
pub fn loop_(
    r: &RExpr,
    frame: &Frame,
    till_terminal: bool,
    ctx: EngineCtx,
    cb: &mut dyn FnMut(&RExpr, &Frame) -> LoopControl,
) -> LoopControl {
    if is_final(r) {
        return cb(r, frame);
    }
    let Some(it) = get_partitions(r, frame) else {
        return cb(r, frame);
    };
    for x in it.run(frame) {
        if ctx.cancellation.is_some_and(|c| c.is_cancelled()) {
            return LoopControl::Stop;
        }
        let mut f2 = frame.clone();
        if it.variable().set_value(&mut f2, x).is_err() {
            continue;
        }
        let r2 = simplify::saturate(r, &mut f2, ctx);
        let ctl = if till_terminal && !is_final(&r2) {
            loop_(&r2, &f2, true, ctx, cb)
        } else {
            cb(&r2, &f2)
        };
        if ctl == LoopControl::Stop {
            return LoopControl::Stop;
        }
    }
    LoopControl::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::rexpr::call::{AssumptionHandle, Assumption, RelationSystem};
    use crate::rexpr::partition::{Partition, PartitionRow};
    use crate::value::Value;
    use std::sync::Arc;

    struct NoSystem;
    impl RelationSystem for NoSystem {
        fn lookup_term(&self, _name: &str, _arity: usize) -> (AssumptionHandle, RExpr) {
            (AssumptionHandle(Assumption::new()), RExpr::Terminal(0))
        }
    }

    fn test_ctx<'a>(system: &'a NoSystem, config: &'a EngineConfig) -> EngineCtx<'a> {
        EngineCtx::new(system, config)
    }

    #[test]
    fn union_iterator_dedupes_favouring_earlier() {
        let v = Variable::named("X");
        let a = Box::new(SingleIterator { var: v.clone(), value: Value::Int(1) });
        let b = Box::new(SingleIterator { var: v.clone(), value: Value::Int(1) });
        let c = Box::new(SingleIterator { var: v.clone(), value: Value::Int(2) });
        let u = UnionIterator { var: v.clone(), subs: vec![a, b, c] };
        let frame = Frame::new();
        let got: Vec<_> = u.run(&frame).collect();
        assert_eq!(got, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn range_iterator_is_lazy() {
        let v = Variable::named("X");
        let r = RangeIterator { var: v, lo: 0, hi: i64::MAX };
        let frame = Frame::new();
        let first_three: Vec<_> = r.run(&frame).take(3).collect();
        assert_eq!(first_three, vec![Value::Int(0), Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn loop_enumerates_partition_rows() {
        let x = Variable::named("X");
        let cols: Arc<[Variable]> = Arc::from(vec![x.clone()]);
        let rows = vec![
            PartitionRow { key: vec![Some(Value::Int(1))], body: RExpr::Terminal(1) },
            PartitionRow { key: vec![Some(Value::Int(2))], body: RExpr::Terminal(1) },
        ];
        let r = RExpr::Partition(Arc::new(Partition { cols, rows }));
        let frame = Frame::new();
        let system = NoSystem;
        let config = EngineConfig::default();
        let mut seen = Vec::new();
        loop_(&r, &frame, true, test_ctx(&system, &config), &mut |_r, f| {
            seen.push(x.get_value(f));
            LoopControl::Continue
        });
        seen.sort_by_key(|v| format!("{v:?}"));
        assert_eq!(seen, vec![Some(Value::Int(1)), Some(Value::Int(2))]);
    }

    #[test]
    fn loop_stops_early_when_callback_requests() {
        let x = Variable::named("X");
        let r = RExpr::ModedOp(Arc::new(crate::moded::range_node(x.clone(), 0, i64::MAX)));
        let frame = Frame::new();
        let system = NoSystem;
        let config = EngineConfig::default();
        let mut count = 0;
        loop_(&r, &frame, true, test_ctx(&system, &config), &mut |_r, _f| {
            count += 1;
            if count >= 5 {
                LoopControl::Stop
            } else {
                LoopControl::Continue
            }
        });
        assert_eq!(count, 5);
    }
}
