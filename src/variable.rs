//! Variable identity and the binding frame (spec.md §3.1, §3.2, §4.1).

use crate::error::UnificationFailure;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static FRESH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// An opaque identity for a [`Variable::Named`] variable. Stable across
/// renaming passes: two `VarKey`s are the same variable iff they compare
/// equal, regardless of which pass produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VarKey {
    Interned(Arc<str>),
    /// A freshly generated, process-unique identity — used by
    /// `rename_vars_unique` and by `ReflectStructure`'s expansion of an
    /// unknown-length argument list into fresh positional variables.
    Fresh(u64),
}

impl VarKey {
    pub fn named(name: impl Into<Arc<str>>) -> VarKey {
        VarKey::Interned(name.into())
    }

    pub fn fresh() -> VarKey {
        VarKey::Fresh(FRESH_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for VarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarKey::Interned(s) => write!(f, "{s}"),
            VarKey::Fresh(n) => write!(f, "_G{n}"),
        }
    }
}

/// A logical variable (spec.md §3.1).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Variable {
    /// Identity by key; binding looked up through the frame.
    Named(VarKey),
    /// Always bound to an immediate value; "setting" only succeeds against
    /// an equal value.
    Constant(ConstValue),
    /// Fresh, referenced once; never bound, never read, setting is a no-op.
    /// Used to discard an unused output (e.g. a call's `Return` the caller
    /// does not care about).
    Unitary,
}

/// `Value` does not implement `Eq`/`Hash` unconditionally for floats, but
/// constant variables need both to be usable as `Variable` hash-map keys in
/// e.g. `Partition` row identity — wrap it so the invariant is local to
/// this one spot.
#[derive(Debug, Clone)]
pub struct ConstValue(pub Value);

impl PartialEq for ConstValue {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for ConstValue {}
impl std::hash::Hash for ConstValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl Variable {
    pub fn named(name: impl Into<Arc<str>>) -> Variable {
        Variable::Named(VarKey::named(name))
    }

    pub fn fresh() -> Variable {
        Variable::Named(VarKey::fresh())
    }

    pub fn constant(v: Value) -> Variable {
        Variable::Constant(ConstValue(v))
    }

    pub fn is_bound(&self, frame: &Frame) -> bool {
        match self {
            Variable::Named(k) => frame.bindings.contains_key(k),
            Variable::Constant(_) => true,
            Variable::Unitary => false,
        }
    }

    pub fn get_value(&self, frame: &Frame) -> Option<Value> {
        match self {
            Variable::Named(k) => frame.bindings.get(k).cloned(),
            Variable::Constant(c) => Some(c.0.clone()),
            Variable::Unitary => None,
        }
    }

    /// Binds the variable to `x`. Fails with [`UnificationFailure`] if it is
    /// already bound to a different value (spec.md §4.1: "if bound and
    /// current ≠ x, fail").
    pub fn set_value(&self, frame: &mut Frame, x: Value) -> Result<(), UnificationFailure> {
        match self {
            Variable::Named(k) => match frame.bindings.get(k) {
                Some(existing) if *existing == x => Ok(()),
                Some(_) => Err(UnificationFailure),
                None => {
                    frame.bindings.insert(k.clone(), x);
                    Ok(())
                }
            },
            Variable::Constant(c) => {
                if c.0 == x {
                    Ok(())
                } else {
                    Err(UnificationFailure)
                }
            }
            Variable::Unitary => Ok(()),
        }
    }

    /// Removes a binding. Used only by the partition rewriter to roll back
    /// a column that was bound speculatively for one row (spec.md §4.5 step
    /// 5).
    pub fn unset(&self, frame: &mut Frame) {
        if let Variable::Named(k) = self {
            frame.bindings.remove(k);
        }
    }
}

/// The partial environment mapping variable identities to values, plus a
/// call stack used by the recursion guard (spec.md §3.2).
#[derive(Debug, Clone, Default)]
pub struct Frame {
    bindings: HashMap<VarKey, Value>,
    /// Ancestor calls currently being inlined, keyed by `(name, arity)` with
    /// the bound-argument value tuple observed at each ancestor. Consulted
    /// by `Call`'s recursion guard (spec.md §4.6 step 2).
    pub(crate) call_stack: Vec<CallFrame>,
    /// A definition/resource error recorded during simplification. Never
    /// set by a local unification-failure or aggregator saturation — only
    /// by conditions spec.md §7 classifies as "surfaced" errors. Checked by
    /// the query surface after `saturate` returns.
    pending_error: Option<crate::error::EngineError>,
}

#[derive(Debug, Clone)]
pub(crate) struct CallFrame {
    pub name: Arc<str>,
    pub arity: usize,
    pub bound_values: Vec<Option<Value>>,
}

impl Frame {
    pub fn new() -> Frame {
        Frame::default()
    }

    pub fn is_bound(&self, key: &VarKey) -> bool {
        self.bindings.contains_key(key)
    }

    pub fn get(&self, key: &VarKey) -> Option<&Value> {
        self.bindings.get(key)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Records a definition/resource error encountered during
    /// simplification. Does not overwrite an error already pending — the
    /// first cause wins.
    pub fn set_pending_error(&mut self, err: crate::error::EngineError) {
        if self.pending_error.is_none() {
            self.pending_error = Some(err);
        }
    }

    pub fn take_pending_error(&mut self) -> Option<crate::error::EngineError> {
        self.pending_error.take()
    }

    pub fn pending_error(&self) -> Option<&crate::error::EngineError> {
        self.pending_error.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_variable_binds_once() {
        let v = Variable::named("X");
        let mut f = Frame::new();
        assert!(!v.is_bound(&f));
        v.set_value(&mut f, Value::Int(1)).unwrap();
        assert!(v.is_bound(&f));
        assert_eq!(v.get_value(&f), Some(Value::Int(1)));
    }

    #[test]
    fn rebinding_to_same_value_succeeds() {
        let v = Variable::named("X");
        let mut f = Frame::new();
        v.set_value(&mut f, Value::Int(1)).unwrap();
        assert!(v.set_value(&mut f, Value::Int(1)).is_ok());
    }

    #[test]
    fn rebinding_to_different_value_fails() {
        let v = Variable::named("X");
        let mut f = Frame::new();
        v.set_value(&mut f, Value::Int(1)).unwrap();
        assert!(v.set_value(&mut f, Value::Int(2)).is_err());
    }

    #[test]
    fn constant_checks_equality() {
        let v = Variable::constant(Value::Int(5));
        let mut f = Frame::new();
        assert!(v.is_bound(&f));
        assert!(v.set_value(&mut f, Value::Int(5)).is_ok());
        assert!(v.set_value(&mut f, Value::Int(6)).is_err());
    }

    #[test]
    fn unitary_ignores_everything() {
        let v = Variable::Unitary;
        let mut f = Frame::new();
        assert!(!v.is_bound(&f));
        v.set_value(&mut f, Value::Int(1)).unwrap();
        assert!(!v.is_bound(&f));
        assert_eq!(v.get_value(&f), None);
    }

    #[test]
    fn unset_rolls_back_named_binding() {
        let v = Variable::named("X");
        let mut f = Frame::new();
        v.set_value(&mut f, Value::Int(1)).unwrap();
        v.unset(&mut f);
        assert!(!v.is_bound(&f));
    }

    #[test]
    fn same_key_is_same_identity_across_clones() {
        let a = VarKey::named("X");
        let b = VarKey::named("X");
        assert_eq!(a, b);
    }
}
