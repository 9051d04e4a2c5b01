pub mod config;
pub mod debounce;
mod error_map;
pub mod loader;
pub mod registry;
pub mod reload;
pub mod runtime;
pub mod state_store;
pub mod tasks;
pub mod watcher;

pub use config::{
    HotReloadConfig, InterpreterConfig, PerformanceConfig, RuntimeConfig, WorkersConfig,
};
pub use debounce::{DebounceHandle, Debouncer};
pub(crate) use error_map::{
    map_config_invalid, map_config_read, map_source_path, map_source_read, map_source_scan,
    map_state_invalid, map_state_read, map_state_write, map_watch, map_worker_start,
};
pub use loader::{
    discover_scripts, has_extension, read_source, resolve_scripts_dir, script_identity, ScriptSource,
};
pub use registry::{LoadedScript, ScriptRegistry};
pub use reload::{ChangeKind, ReloadOutcome};
pub use runtime::{LoadSummary, RuntimeNotification, ScriptRuntime};
pub use state_store::JsonVariableStore;
pub use tasks::{EventScheduler, MainTask, MainThreadQueue, TaskSender, WorkerPool};
pub use watcher::ScriptWatcher;
