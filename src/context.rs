//! The execution context threaded through `simplify`/`saturate`/`loop_`:
//! the relation-lookup system plus resource limits. Grounded in spec.md §9
//! ("Global system object… represent as an explicit context value threaded
//! through construction and lookup; any 'active task' is a stack-local
//! value, not a process-global") — the opposite of the teacher's own
//! occasional reach for ambient globals, and closer to how the reference
//! interpreter's `context.py` threads a `dyna_system` argument explicitly.

use crate::cancellation::Cancellation;
use crate::config::EngineConfig;
use crate::rexpr::call::RelationSystem;

/// Bundles everything a simplification step might need beyond the frame
/// itself. Cheap to copy (three references); constructed once per query
/// and threaded through every recursive call.
#[derive(Clone, Copy)]
pub struct EngineCtx<'a> {
    pub system: &'a dyn RelationSystem,
    pub config: &'a EngineConfig,
    /// Opt-in cooperative cancellation, checked between `loop_` callback
    /// invocations. `None` means the query runs to completion unattended.
    pub cancellation: Option<&'a Cancellation>,
}

impl<'a> EngineCtx<'a> {
    pub fn new(system: &'a dyn RelationSystem, config: &'a EngineConfig) -> Self {
        EngineCtx { system, config, cancellation: None }
    }

    pub fn with_cancellation(mut self, cancellation: &'a Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }
}
