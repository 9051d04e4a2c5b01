use std::sync::Arc;

use crate::builtins::{BuiltinRegistry, EmptyBuiltins};
use crate::events::EventManager;
use crate::native::NativeExtension;
use crate::perf::PerformanceGovernor;
use crate::registry::DeclarationRegistry;
use crate::variables::{MemoryVariableStore, VariableStore};

mod callstack;
mod control_flow;
mod declare;
mod dispatch;
mod eval;
mod exec;

pub use control_flow::Flow;
pub use declare::LoadReport;
pub use dispatch::{DispatchReport, HandlerFailure};

pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;
pub const DEFAULT_MAX_LOOP_ITERATIONS: u64 = 1_000_000;

/// Services and limits an [`Interpreter`] is built from. Every service left
/// as `None` gets a fresh private instance.
#[derive(Clone, Default)]
pub struct InterpreterOptions {
    pub builtins: Option<Arc<dyn BuiltinRegistry>>,
    pub native: Option<Arc<dyn NativeExtension>>,
    pub variables: Option<Arc<dyn VariableStore>>,
    pub events: Option<Arc<EventManager>>,
    pub declarations: Option<Arc<DeclarationRegistry>>,
    pub governor: Option<Arc<PerformanceGovernor>>,
    pub max_call_depth: Option<usize>,
    pub max_loop_iterations: Option<u64>,
}

/// Tree-walking evaluator. It holds no per-run state: every load, handler
/// invocation and materialization gets its own
/// [`ExecutionContext`](crate::context::ExecutionContext).
pub struct Interpreter {
    builtins: Arc<dyn BuiltinRegistry>,
    native: Option<Arc<dyn NativeExtension>>,
    variables: Arc<dyn VariableStore>,
    events: Arc<EventManager>,
    declarations: Arc<DeclarationRegistry>,
    governor: Arc<PerformanceGovernor>,
    max_call_depth: usize,
    max_loop_iterations: u64,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(InterpreterOptions::default())
    }
}

impl Interpreter {
    pub fn new(options: InterpreterOptions) -> Self {
        Self {
            builtins: options
                .builtins
                .unwrap_or_else(|| Arc::new(EmptyBuiltins::default())),
            native: options.native,
            variables: options
                .variables
                .unwrap_or_else(|| Arc::new(MemoryVariableStore::new())),
            events: options.events.unwrap_or_default(),
            declarations: options.declarations.unwrap_or_default(),
            governor: options.governor.unwrap_or_default(),
            max_call_depth: options.max_call_depth.unwrap_or(DEFAULT_MAX_CALL_DEPTH),
            max_loop_iterations: options
                .max_loop_iterations
                .unwrap_or(DEFAULT_MAX_LOOP_ITERATIONS),
        }
    }

    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    pub fn declarations(&self) -> &Arc<DeclarationRegistry> {
        &self.declarations
    }

    pub fn governor(&self) -> &Arc<PerformanceGovernor> {
        &self.governor
    }

    pub fn variables(&self) -> &Arc<dyn VariableStore> {
        &self.variables
    }

    pub fn has_native(&self) -> bool {
        self.native.is_some()
    }
}
