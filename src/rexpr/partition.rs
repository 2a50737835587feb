//! `Partition` — logical OR with optional per-branch ground restrictions on
//! a tuple of column variables — and its simplify algorithm (spec.md §3.3,
//! §4.5 "Partition simplify").

use super::{intersect, rename_vars, RExpr};
use crate::context::EngineCtx;
use crate::value::Value;
use crate::variable::{Frame, Variable};
use std::collections::HashMap;
use std::sync::Arc;

/// A row's key: one slot per column, `None` standing for the unconstrained
/// placeholder `⊥`.
pub type RowKey = Vec<Option<Value>>;

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionRow {
    pub key: RowKey,
    pub body: RExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub cols: Arc<[Variable]>,
    pub rows: Vec<PartitionRow>,
}

impl Partition {
    pub fn vars(&self) -> Vec<Variable> {
        let mut v: Vec<Variable> = self.cols.iter().cloned().collect();
        for row in &self.rows {
            v.extend(super::vars_of(&row.body));
        }
        v
    }

    pub fn rename_vars(&self, remap: &impl Fn(&Variable) -> Variable) -> Partition {
        let rv = |v: &Variable| match v {
            Variable::Named(_) => remap(v),
            other => other.clone(),
        };
        Partition {
            cols: self.cols.iter().map(rv).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| PartitionRow { key: row.key.clone(), body: rename_vars(&row.body, remap) })
                .collect(),
        }
    }
}

/// `partition(cols, branches)`: if every branch is already a bare
/// `Terminal`, collapse immediately to `Terminal(sum)` (spec.md §4.3).
pub fn partition(cols: impl Into<Arc<[Variable]>>, rows: Vec<PartitionRow>) -> RExpr {
    let cols = cols.into();
    if rows.iter().all(|r| matches!(r.body, RExpr::Terminal(_))) {
        let sum: u64 = rows
            .iter()
            .map(|r| match r.body {
                RExpr::Terminal(n) => n,
                _ => unreachable!(),
            })
            .sum();
        return RExpr::Terminal(sum);
    }
    RExpr::Partition(Arc::new(Partition { cols, rows }))
}

/// The partition simplify algorithm (spec.md §4.5, "Partition simplify").
pub fn simplify_partition(p: &Partition, frame: &mut Frame, ctx: EngineCtx) -> RExpr {
    let ncols = p.cols.len();
    // Grouping key -> accumulated rows (multiplicities merged when the
    // bodies are both bare Terminals).
    let mut groups: Vec<(RowKey, Vec<RExpr>)> = Vec::new();
    let mut group_index: HashMap<RowKey, usize> = HashMap::new();

    'rows: for row in &p.rows {
        // Step 1: skip rows whose key conflicts with an already-bound
        // column.
        let mut bound_before = vec![false; ncols];
        for (j, col) in p.cols.iter().enumerate() {
            let Variable::Named(k) = col else { continue };
            bound_before[j] = frame.is_bound(k);
            if let Some(want) = &row.key[j] {
                if let Some(have) = frame.get(k) {
                    if have != want {
                        continue 'rows;
                    }
                }
            }
        }

        // Step 2: speculatively bind every column this row constrains.
        let mut failed = false;
        for (j, col) in p.cols.iter().enumerate() {
            if let Some(want) = &row.key[j] {
                if !bound_before[j] && col.set_value(frame, want.clone()).is_err() {
                    failed = true;
                    break;
                }
            }
        }

        if !failed {
            // Step 3.
            let result = super::simplify::simplify(&row.body, frame, ctx);

            // Step 4: record the new key from the (possibly now more
            // bound) columns.
            let mut new_key = Vec::with_capacity(ncols);
            for col in p.cols.iter() {
                new_key.push(col.get_value(frame));
            }

            // Step 6: drop empty results, group the rest.
            if result != RExpr::Terminal(0) {
                let idx = *group_index.entry(new_key.clone()).or_insert_with(|| {
                    groups.push((new_key, Vec::new()));
                    groups.len() - 1
                });
                groups[idx].1.push(result);
            }
        }

        // Step 5: restore every column that was not bound before step 2,
        // whether it was bound speculatively from the row's key or only as
        // a side effect of simplifying the row's body in step 3.
        for (j, col) in p.cols.iter().enumerate() {
            if !bound_before[j] {
                col.unset(frame);
            }
        }
    }

    if groups.is_empty() {
        return RExpr::Terminal(0);
    }

    // Merge Terminal rows within a group by summing multiplicities, and
    // otherwise keep the distinct bodies intersected... actually a group
    // with multiple distinct non-Terminal bodies sharing a key represents
    // alternative ways to reach that key, so they stay disjoined as
    // separate rows under the reconstructed Partition, merged only when
    // every body is a bare Terminal.
    let mut merged_rows: Vec<PartitionRow> = Vec::new();
    for (key, bodies) in groups {
        if bodies.iter().all(|b| matches!(b, RExpr::Terminal(_))) {
            let sum: u64 = bodies
                .iter()
                .map(|b| match b {
                    RExpr::Terminal(n) => *n,
                    _ => unreachable!(),
                })
                .sum();
            merged_rows.push(PartitionRow { key, body: RExpr::Terminal(sum) });
        } else {
            for body in bodies {
                merged_rows.push(PartitionRow { key: key.clone(), body });
            }
        }
    }

    // Compute the per-column common ground value: ⊥ unless every retained
    // row agrees.
    let mut common: Vec<Option<Value>> = vec![None; ncols];
    for j in 0..ncols {
        let mut agreed: Option<&Value> = None;
        let mut all_agree = true;
        for row in &merged_rows {
            match &row.key[j] {
                Some(v) => match agreed {
                    None => agreed = Some(v),
                    Some(prev) if prev == v => {}
                    Some(_) => {
                        all_agree = false;
                        break;
                    }
                },
                None => {
                    all_agree = false;
                    break;
                }
            }
        }
        if all_agree {
            common[j] = agreed.cloned();
        }
    }
    for (j, col) in p.cols.iter().enumerate() {
        if let Some(v) = &common[j] {
            // Safe: held on every retained branch.
            let _ = col.set_value(frame, v.clone());
        }
    }

    if merged_rows.len() == 1 {
        let row = &merged_rows[0];
        let implied = row.key.iter().enumerate().all(|(j, v)| v.is_none() || common[j].is_some());
        if implied {
            return row.body.clone();
        }
    }

    RExpr::Partition(Arc::new(Partition { cols: p.cols.clone(), rows: merged_rows }))
}

/// Builds an `Intersect` of a `Partition` row's ground-key constraints with
/// its body — used by callers that want a flattened "one branch" view
/// (e.g. the loop driver's `till_terminal` recursion).
pub fn row_as_rexpr(cols: &[Variable], row: &PartitionRow) -> RExpr {
    let mut parts = vec![row.body.clone()];
    for (col, key) in cols.iter().zip(row.key.iter()) {
        if let Some(v) = key {
            parts.push(super::unify(col.clone(), Variable::constant(v.clone())));
        }
    }
    intersect(parts)
}
