use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use qs_parser::Program;
use qs_runtime::ScriptUnit;

/// A script that parsed and loaded. Replaced wholesale on reload.
#[derive(Debug, Clone)]
pub struct LoadedScript {
    pub id: String,
    pub path: PathBuf,
    pub program: Arc<Program>,
    pub unit: Arc<ScriptUnit>,
    pub loaded_at: SystemTime,
}

/// Loaded scripts keyed by identity.
#[derive(Debug, Default)]
pub struct ScriptRegistry {
    scripts: DashMap<String, Arc<LoadedScript>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the version that was replaced, if any.
    pub fn install(&self, script: LoadedScript) -> Option<Arc<LoadedScript>> {
        self.scripts.insert(script.id.clone(), Arc::new(script))
    }

    pub fn get(&self, id: &str) -> Option<Arc<LoadedScript>> {
        self.scripts.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.scripts.contains_key(id)
    }

    pub fn remove(&self, id: &str) -> Option<Arc<LoadedScript>> {
        self.scripts.remove(id).map(|(_, script)| script)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids = self
            .scripts
            .iter()
            .map(|entry| entry.key().clone())
            .collect::<Vec<_>>();
        ids.sort();
        ids
    }

    pub fn find_by_path(&self, path: &Path) -> Option<Arc<LoadedScript>> {
        self.scripts
            .iter()
            .find(|entry| entry.value().path == path)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}
