pub mod builtins;
pub mod context;
pub mod events;
pub mod interpreter;
pub mod native;
pub mod perf;
pub mod registry;
pub mod scope;
pub mod unit;
pub mod variables;

pub use builtins::{expect_arity, BuiltinCall, BuiltinFn, BuiltinRegistry, BuiltinTable, EmptyBuiltins};
pub use context::{CallFrame, CallStack, ExecMode, ExecutionContext};
pub use events::{EventManager, HandlerRegistration, RemovedRegistration};
pub use interpreter::{
    DispatchReport, Flow, HandlerFailure, Interpreter, InterpreterOptions, LoadReport,
    DEFAULT_MAX_CALL_DEPTH, DEFAULT_MAX_LOOP_ITERATIONS,
};
pub use native::{NativeExtension, RhaiExtension};
pub use perf::{GovernorSettings, PerfNotice, PerformanceGovernor, ScriptStatistics};
pub use registry::{DeclarationEntry, DeclarationRegistry};
pub use scope::{ScopeArena, ScopeId};
pub use unit::ScriptUnit;
pub use variables::{MemoryVariableStore, StoreSnapshot, VariableStore};
