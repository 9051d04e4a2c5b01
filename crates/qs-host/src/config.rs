use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use qs_core::ScriptLangError;
use qs_runtime::{GovernorSettings, DEFAULT_MAX_CALL_DEPTH, DEFAULT_MAX_LOOP_ITERATIONS};
use serde::{Deserialize, Serialize};

use crate::{map_config_invalid, map_config_read};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotReloadConfig {
    pub enabled: bool,
    pub debounce_ms: u64,
}

impl Default for HotReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub warn_threshold_ms: u64,
    pub throttle_threshold_ms: u64,
    pub consecutive_limit: u32,
    pub throttle_duration_ms: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            warn_threshold_ms: 50,
            throttle_threshold_ms: 200,
            consecutive_limit: 3,
            throttle_duration_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    pub max_call_depth: usize,
    pub max_loop_iterations: u64,
    /// Run `<% ... %>` blocks through the Rhai extension.
    pub native_code: bool,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_loop_iterations: DEFAULT_MAX_LOOP_ITERATIONS,
            native_code: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub threads: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self { threads: 2 }
    }
}

/// Host settings, usually read from `questscript.toml`. Every field has a
/// default so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub scripts_dir: PathBuf,
    /// Script file extension without the dot.
    pub extension: String,
    pub hot_reload: HotReloadConfig,
    pub performance: PerformanceConfig,
    pub interpreter: InterpreterConfig,
    pub workers: WorkersConfig,
    /// JSON file backing the variable store. In-memory only when absent.
    pub variable_store: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            scripts_dir: PathBuf::from("scripts"),
            extension: "qs".to_string(),
            hot_reload: HotReloadConfig::default(),
            performance: PerformanceConfig::default(),
            interpreter: InterpreterConfig::default(),
            workers: WorkersConfig::default(),
            variable_store: None,
            log_file: None,
        }
    }
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> Result<Self, ScriptLangError> {
        let raw = fs::read_to_string(path).map_err(map_config_read)?;
        let config = Self::from_toml_str(&raw)?;
        tracing::info!(target: "scripting", path = %path.display(), "loaded runtime config");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ScriptLangError> {
        let config: Self = toml::from_str(raw).map_err(map_config_invalid)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_scripts_dir(mut self, scripts_dir: impl Into<PathBuf>) -> Self {
        self.scripts_dir = scripts_dir.into();
        self
    }

    pub fn validate(&self) -> Result<(), ScriptLangError> {
        let performance = &self.performance;
        if performance.throttle_threshold_ms < performance.warn_threshold_ms {
            return Err(invalid(format!(
                "performance.throttle_threshold_ms ({}) must not be below warn_threshold_ms ({}).",
                performance.throttle_threshold_ms, performance.warn_threshold_ms
            )));
        }
        if performance.consecutive_limit == 0 {
            return Err(invalid(
                "performance.consecutive_limit must be at least 1.".to_string(),
            ));
        }
        if self.workers.threads == 0 {
            return Err(invalid("workers.threads must be at least 1.".to_string()));
        }
        if self.hot_reload.debounce_ms == 0 {
            return Err(invalid(
                "hot_reload.debounce_ms must be greater than 0.".to_string(),
            ));
        }
        if self.interpreter.max_call_depth == 0 || self.interpreter.max_loop_iterations == 0 {
            return Err(invalid(
                "interpreter limits must be greater than 0.".to_string(),
            ));
        }
        if self.extension.is_empty() || self.extension.starts_with('.') {
            return Err(invalid(format!(
                "extension must be given without a leading dot, got \"{}\".",
                self.extension
            )));
        }
        Ok(())
    }

    pub fn governor_settings(&self) -> GovernorSettings {
        GovernorSettings {
            warn_threshold: Duration::from_millis(self.performance.warn_threshold_ms),
            throttle_threshold: Duration::from_millis(self.performance.throttle_threshold_ms),
            consecutive_limit: self.performance.consecutive_limit,
            throttle_duration: Duration::from_millis(self.performance.throttle_duration_ms),
        }
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.hot_reload.debounce_ms)
    }
}

fn invalid(message: String) -> ScriptLangError {
    ScriptLangError::new("CONFIG_INVALID", message)
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_gives_defaults() {
        let config = RuntimeConfig::from_toml_str("").expect("empty config is valid");
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.debounce_window(), Duration::from_millis(300));
        assert_eq!(
            config.governor_settings(),
            GovernorSettings::default()
        );
    }

    #[test]
    fn sections_override_defaults() {
        let config = RuntimeConfig::from_toml_str(
            r#"
scripts_dir = "content"
variable_store = "state/vars.json"

[hot_reload]
enabled = false
debounce_ms = 120

[performance]
warn_threshold_ms = 5
throttle_threshold_ms = 20

[interpreter]
native_code = false
"#,
        )
        .expect("config parses");
        assert_eq!(config.scripts_dir, PathBuf::from("content"));
        assert_eq!(config.extension, "qs");
        assert!(!config.hot_reload.enabled);
        assert_eq!(config.hot_reload.debounce_ms, 120);
        assert_eq!(config.performance.warn_threshold_ms, 5);
        assert_eq!(config.performance.consecutive_limit, 3);
        assert!(!config.interpreter.native_code);
        assert_eq!(config.interpreter.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
        assert_eq!(config.variable_store, Some(PathBuf::from("state/vars.json")));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cases = [
            "[performance]\nwarn_threshold_ms = 100\nthrottle_threshold_ms = 10",
            "[performance]\nconsecutive_limit = 0",
            "[workers]\nthreads = 0",
            "[hot_reload]\ndebounce_ms = 0",
            "extension = \".qs\"",
            "scripts_dir = 5",
        ];
        for raw in cases {
            let error = RuntimeConfig::from_toml_str(raw).expect_err(raw);
            assert_eq!(error.code, "CONFIG_INVALID", "{}", raw);
        }
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = RuntimeConfig::load(&dir.path().join("absent.toml")).expect_err("missing");
        assert_eq!(error.code, "CONFIG_READ");
    }
}
