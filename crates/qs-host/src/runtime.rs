use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use qs_core::{ScriptEvent, ScriptLangError, Value};
use qs_parser::{parse_script, DeclarationKind};
use qs_runtime::{
    expect_arity, BuiltinTable, DispatchReport, Interpreter, InterpreterOptions, LoadReport,
    MemoryVariableStore, NativeExtension, PerfNotice, PerformanceGovernor, RhaiExtension,
    ScriptStatistics, VariableStore,
};

use crate::config::RuntimeConfig;
use crate::debounce::Debouncer;
use crate::loader::{discover_scripts, read_source, resolve_scripts_dir, ScriptSource};
use crate::registry::{LoadedScript, ScriptRegistry};
use crate::state_store::JsonVariableStore;
use crate::tasks::{MainTask, MainThreadQueue, WorkerPool};
use crate::watcher::ScriptWatcher;

/// Something the host should know about, queued until
/// [`ScriptRuntime::drain_notifications`].
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeNotification {
    ScriptLoaded {
        script_id: String,
        handlers: usize,
    },
    LoadFailed {
        script_id: String,
        error: ScriptLangError,
    },
    ReloadSucceeded {
        script_id: String,
        handlers: usize,
    },
    /// The previous version stays in force.
    ReloadFailed {
        script_id: String,
        error: ScriptLangError,
    },
    ScriptUnloaded {
        script_id: String,
    },
    SlowExecution {
        script_id: String,
        duration: Duration,
    },
    Throttled {
        script_id: String,
        duration: Duration,
        until: Instant,
    },
    HandlerFailed {
        script_id: String,
        event_type: String,
        error: ScriptLangError,
    },
}

impl RuntimeNotification {
    pub fn script_id(&self) -> &str {
        match self {
            Self::ScriptLoaded { script_id, .. }
            | Self::LoadFailed { script_id, .. }
            | Self::ReloadSucceeded { script_id, .. }
            | Self::ReloadFailed { script_id, .. }
            | Self::ScriptUnloaded { script_id }
            | Self::SlowExecution { script_id, .. }
            | Self::Throttled { script_id, .. }
            | Self::HandlerFailed { script_id, .. } => script_id,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::LoadFailed { .. } | Self::ReloadFailed { .. } | Self::HandlerFailed { .. }
        )
    }
}

impl fmt::Display for RuntimeNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScriptLoaded {
                script_id,
                handlers,
            } => write!(f, "loaded {} ({} handlers)", script_id, handlers),
            Self::LoadFailed { script_id, error } => {
                write!(f, "load failed {}: {}", script_id, error.diagnostic())
            }
            Self::ReloadSucceeded {
                script_id,
                handlers,
            } => write!(f, "reloaded {} ({} handlers)", script_id, handlers),
            Self::ReloadFailed { script_id, error } => write!(
                f,
                "reload failed {}, keeping previous version: {}",
                script_id,
                error.diagnostic()
            ),
            Self::ScriptUnloaded { script_id } => write!(f, "unloaded {}", script_id),
            Self::SlowExecution {
                script_id,
                duration,
            } => write!(f, "slow {} ({} ms)", script_id, duration.as_millis()),
            Self::Throttled {
                script_id, until, ..
            } => write!(
                f,
                "throttled {} for {} ms",
                script_id,
                until.saturating_duration_since(Instant::now()).as_millis()
            ),
            Self::HandlerFailed {
                script_id,
                event_type,
                error,
            } => write!(
                f,
                "handler for {} in {} failed: {}",
                event_type,
                script_id,
                error.diagnostic()
            ),
        }
    }
}

/// Result of scanning and loading the scripts directory.
#[derive(Debug, Clone, Default)]
pub struct LoadSummary {
    pub loaded: Vec<String>,
    pub failed: Vec<(String, ScriptLangError)>,
}

/// Owns every service of a running script host. All semantic work (loads,
/// reloads, dispatch) happens on the thread that calls into this value;
/// background threads only feed its queues.
pub struct ScriptRuntime {
    config: RuntimeConfig,
    root: PathBuf,
    interpreter: Interpreter,
    pub(crate) scripts: ScriptRegistry,
    debouncer: Option<Debouncer>,
    watcher: Option<ScriptWatcher>,
    tasks: MainThreadQueue,
    workers: WorkerPool,
    notifications: Vec<RuntimeNotification>,
}

impl ScriptRuntime {
    /// Builds the runtime from `config`. `builtins` is the host capability
    /// table; `schedule(ms, event, data?)` is added to it.
    pub fn new(config: RuntimeConfig, mut builtins: BuiltinTable) -> Result<Self, ScriptLangError> {
        config.validate()?;
        let root = resolve_scripts_dir(&config.scripts_dir)?;
        let tasks = MainThreadQueue::new();
        let workers = WorkerPool::new(config.workers.threads)?;

        let scheduler = workers.scheduler(tasks.sender());
        builtins.register("schedule", move |args, call| {
            expect_arity("schedule", args, 2, 3)?;
            let delay = args[0]
                .as_number()
                .filter(|ms| ms.is_finite() && *ms >= 0.0)
                .ok_or_else(|| {
                    ScriptLangError::new(
                        "RUNTIME_TYPE_MISMATCH",
                        "schedule() expects a delay in milliseconds.",
                    )
                })?;
            let event_type = args[1].as_string().ok_or_else(|| {
                ScriptLangError::new(
                    "RUNTIME_TYPE_MISMATCH",
                    "schedule() expects an event name.",
                )
            })?;
            let mut event = ScriptEvent::new(event_type);
            match args.get(2) {
                None | Some(Value::Null) => {}
                Some(Value::Object(data)) => event.data = data.clone(),
                Some(other) => {
                    return Err(ScriptLangError::new(
                        "RUNTIME_TYPE_MISMATCH",
                        format!("schedule() data must be an object, got {}.", other.type_name()),
                    ))
                }
            }
            event.actor = call.actor.map(ToString::to_string);
            scheduler.schedule(Duration::from_millis(delay as u64), event);
            Ok(Value::Null)
        });

        let variables: Arc<dyn VariableStore> = match &config.variable_store {
            Some(path) => Arc::new(JsonVariableStore::open(path)?),
            None => Arc::new(MemoryVariableStore::new()),
        };
        let native: Option<Arc<dyn NativeExtension>> = if config.interpreter.native_code {
            Some(Arc::new(RhaiExtension::default()))
        } else {
            None
        };
        let interpreter = Interpreter::new(InterpreterOptions {
            builtins: Some(Arc::new(builtins)),
            native,
            variables: Some(variables),
            governor: Some(Arc::new(PerformanceGovernor::new(config.governor_settings()))),
            max_call_depth: Some(config.interpreter.max_call_depth),
            max_loop_iterations: Some(config.interpreter.max_loop_iterations),
            ..InterpreterOptions::default()
        });

        tracing::info!(
            target: "scripting",
            root = %root.display(),
            native = interpreter.has_native(),
            "script runtime ready"
        );
        Ok(Self {
            config,
            root,
            interpreter,
            scripts: ScriptRegistry::new(),
            debouncer: None,
            watcher: None,
            tasks,
            workers,
            notifications: Vec::new(),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Canonical scripts directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn scripts(&self) -> &ScriptRegistry {
        &self.scripts
    }

    /// Loads every script under the root in identity order. A script that
    /// fails is reported and skipped; the rest still load.
    pub fn load_all(&mut self) -> Result<LoadSummary, ScriptLangError> {
        let sources = discover_scripts(&self.root, &self.config.extension)?;
        let mut summary = LoadSummary::default();
        for source in sources {
            match self.load_file(&source) {
                Ok(_) => summary.loaded.push(source.id),
                Err(error) => summary.failed.push((source.id, error)),
            }
        }
        tracing::info!(
            target: "scripting",
            loaded = summary.loaded.len(),
            failed = summary.failed.len(),
            "scripts directory loaded"
        );
        Ok(summary)
    }

    pub(crate) fn load_file(&mut self, source: &ScriptSource) -> Result<LoadReport, ScriptLangError> {
        let result = read_source(&source.path)
            .map_err(|error| error.in_script(&source.id))
            .and_then(|text| self.install(&source.id, &source.path, &text));
        match &result {
            Ok(report) => self.notify(RuntimeNotification::ScriptLoaded {
                script_id: source.id.clone(),
                handlers: report.handlers,
            }),
            Err(error) => {
                tracing::warn!(
                    target: "scripting",
                    script = %source.id,
                    "{}",
                    error.diagnostic()
                );
                self.notify(RuntimeNotification::LoadFailed {
                    script_id: source.id.clone(),
                    error: error.clone(),
                });
            }
        }
        result
    }

    /// Loads `text` under `script_id`. An already-loaded script is replaced
    /// the same way a hot reload replaces it.
    pub fn load_source(
        &mut self,
        script_id: &str,
        path: impl Into<PathBuf>,
        text: &str,
    ) -> Result<LoadReport, ScriptLangError> {
        let path = path.into();
        if self.scripts.contains(script_id) {
            return self.replace_script(script_id, &path, Ok(text.to_string()));
        }
        let result = self.install(script_id, &path, text);
        match &result {
            Ok(report) => self.notify(RuntimeNotification::ScriptLoaded {
                script_id: script_id.to_string(),
                handlers: report.handlers,
            }),
            Err(error) => self.notify(RuntimeNotification::LoadFailed {
                script_id: script_id.to_string(),
                error: error.clone(),
            }),
        }
        result
    }

    /// Parses and runs `text`, then records it as the current version.
    /// Nothing is recorded when either step fails.
    pub(crate) fn install(
        &mut self,
        script_id: &str,
        path: &Path,
        text: &str,
    ) -> Result<LoadReport, ScriptLangError> {
        let program = parse_script(text, script_id)?;
        let report = self.interpreter.load(script_id, &program)?;
        self.scripts.install(LoadedScript {
            id: script_id.to_string(),
            path: path.to_path_buf(),
            program: Arc::new(program),
            unit: Arc::clone(&report.unit),
            loaded_at: SystemTime::now(),
        });
        Ok(report)
    }

    /// Drops a script and everything it registered. Statistics are kept.
    pub fn unload_script(&mut self, script_id: &str) -> bool {
        let removed = self.scripts.remove(script_id).is_some();
        let handlers = self.interpreter.events().unregister_script(script_id).len();
        self.interpreter.declarations().remove_script(script_id);
        if removed {
            tracing::info!(
                target: "scripting",
                script = script_id,
                handlers,
                "script unloaded"
            );
            self.notify(RuntimeNotification::ScriptUnloaded {
                script_id: script_id.to_string(),
            });
        }
        removed
    }

    /// Starts the file watcher and its debouncer. Does nothing when hot
    /// reload is disabled or already running.
    pub fn start_watching(&mut self) -> Result<(), ScriptLangError> {
        if !self.config.hot_reload.enabled {
            tracing::info!(target: "watch", "hot reload disabled");
            return Ok(());
        }
        if self.watcher.is_some() {
            return Ok(());
        }
        let debouncer = Debouncer::new(self.config.debounce_window())?;
        let watcher = ScriptWatcher::start(&self.root, &self.config.extension, debouncer.handle())?;
        self.debouncer = Some(debouncer);
        self.watcher = Some(watcher);
        Ok(())
    }

    pub fn stop_watching(&mut self) -> Result<(), ScriptLangError> {
        let result = match self.watcher.take() {
            Some(watcher) => watcher.stop(),
            None => Ok(()),
        };
        self.debouncer = None;
        result
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Per-tick main-thread work: debounced reloads first, then queued
    /// tasks. Returns how many items were processed.
    pub fn tick(&mut self) -> usize {
        let ready = self
            .debouncer
            .as_ref()
            .map(Debouncer::drain_ready)
            .unwrap_or_default();
        let mut processed = 0;
        for path in ready {
            if self.reload_path(&path).is_some() {
                processed += 1;
            }
        }
        for task in self.tasks.drain() {
            processed += 1;
            match task {
                MainTask::FireEvent(event) => {
                    self.fire_event(event);
                }
                MainTask::Run(run) => run(&self.interpreter),
            }
        }
        processed
    }

    /// Dispatches `event` and turns its timing and failures into
    /// notifications.
    pub fn fire_event(&mut self, event: ScriptEvent) -> DispatchReport {
        let report = self.interpreter.fire_event(event);
        for notice in &report.notices {
            let notification = match notice {
                PerfNotice::Slow {
                    script_id,
                    duration,
                } => RuntimeNotification::SlowExecution {
                    script_id: script_id.clone(),
                    duration: *duration,
                },
                PerfNotice::Throttled {
                    script_id,
                    duration,
                    until,
                } => RuntimeNotification::Throttled {
                    script_id: script_id.clone(),
                    duration: *duration,
                    until: *until,
                },
            };
            self.notify(notification);
        }
        for failure in &report.failures {
            self.notify(RuntimeNotification::HandlerFailed {
                script_id: failure.script_id.clone(),
                event_type: failure.event_type.clone(),
                error: failure.error.clone(),
            });
        }
        report
    }

    /// Runs `work` on the worker pool; `on_main` receives its result during
    /// a later [`tick`](Self::tick).
    pub fn spawn_work<T, W, R>(&self, work: W, on_main: R)
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        R: FnOnce(T, &Interpreter) + Send + 'static,
    {
        self.workers.spawn_work(self.tasks.sender(), work, on_main);
    }

    /// Scheduled events and worker jobs not yet handed back.
    pub fn pending_work(&self) -> usize {
        self.workers.in_flight()
    }

    pub fn materialize(&self, kind: DeclarationKind, name: &str) -> Result<Value, ScriptLangError> {
        self.interpreter.materialize(kind, name)
    }

    pub fn call_function(
        &self,
        script_id: &str,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, ScriptLangError> {
        let script = self.scripts.get(script_id).ok_or_else(|| {
            ScriptLangError::new(
                "HOST_SCRIPT_NOT_LOADED",
                format!("Script \"{}\" is not loaded.", script_id),
            )
        })?;
        self.interpreter.invoke_function(&script.unit, name, args)
    }

    pub fn drain_notifications(&mut self) -> Vec<RuntimeNotification> {
        std::mem::take(&mut self.notifications)
    }

    pub(crate) fn notify(&mut self, notification: RuntimeNotification) {
        self.notifications.push(notification);
    }

    pub fn statistics(&self, script_id: &str) -> Option<ScriptStatistics> {
        self.interpreter.governor().statistics(script_id)
    }

    pub fn all_statistics(&self) -> Vec<(String, ScriptStatistics)> {
        self.interpreter.governor().all_statistics()
    }

    pub fn throttled_scripts(&self) -> Vec<String> {
        self.interpreter.governor().throttled_scripts()
    }

    pub fn unthrottle(&self, script_id: &str) -> bool {
        self.interpreter.governor().unthrottle(script_id)
    }

    pub fn reset_statistics(&self, script_id: Option<&str>) {
        self.interpreter.governor().reset_statistics(script_id);
    }

    pub fn flush_variables(&self) -> Result<(), ScriptLangError> {
        self.interpreter.variables().flush()
    }

    /// Stops watching, lets workers wind down and persists variables.
    pub fn shutdown(mut self) -> Result<(), ScriptLangError> {
        let watch_result = self.stop_watching();
        let flush_result = self.flush_variables();
        let Self { workers, .. } = self;
        workers.shutdown();
        tracing::info!(target: "scripting", "script runtime stopped");
        watch_result.and(flush_result)
    }
}

impl fmt::Debug for ScriptRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptRuntime")
            .field("root", &self.root)
            .field("scripts", &self.scripts.ids())
            .field("watching", &self.is_watching())
            .field("workers", &self.workers)
            .finish()
    }
}
