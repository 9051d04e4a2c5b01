use std::fs;
use std::path::{Path, PathBuf};

use qs_core::{ScriptLangError, Value};
use qs_runtime::{MemoryVariableStore, StoreSnapshot, VariableStore};

use crate::{map_state_invalid, map_state_read, map_state_write};

/// Variable store persisted as one JSON document. Reads and writes go to
/// memory; the file is only touched by [`VariableStore::flush`].
#[derive(Debug)]
pub struct JsonVariableStore {
    path: PathBuf,
    inner: MemoryVariableStore,
}

impl JsonVariableStore {
    /// Opens `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ScriptLangError> {
        let path = path.into();
        let snapshot = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(map_state_read)?;
            serde_json::from_str::<StoreSnapshot>(&raw).map_err(map_state_invalid)?
        } else {
            StoreSnapshot::default()
        };
        tracing::debug!(
            target: "scripting",
            path = %path.display(),
            globals = snapshot.globals.len(),
            actors = snapshot.actors.len(),
            "variable store opened"
        );
        Ok(Self {
            path,
            inner: MemoryVariableStore::from_snapshot(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VariableStore for JsonVariableStore {
    fn get(&self, actor: Option<&str>, name: &str) -> Option<Value> {
        self.inner.get(actor, name)
    }

    fn set(&self, actor: Option<&str>, name: &str, value: Value) {
        self.inner.set(actor, name, value);
    }

    fn snapshot(&self) -> StoreSnapshot {
        self.inner.snapshot()
    }

    fn flush(&self) -> Result<(), ScriptLangError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(map_state_write)?;
            }
        }
        let raw = serde_json::to_string_pretty(&self.inner.snapshot()).map_err(map_state_invalid)?;
        fs::write(&self.path, raw).map_err(map_state_write)
    }
}

#[cfg(test)]
mod state_store_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn flushed_values_survive_reopening() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state/vars.json");

        let store = JsonVariableStore::open(&path).expect("fresh store");
        assert_eq!(store.get(None, "day"), None);
        store.set(None, "day", Value::from(4_i64));
        store.set(Some("guard"), "mood", Value::from("grumpy"));
        store.flush().expect("flush");

        let reopened = JsonVariableStore::open(&path).expect("reopen");
        assert_eq!(reopened.get(None, "day"), Some(Value::from(4_i64)));
        assert_eq!(
            reopened.get(Some("guard"), "mood"),
            Some(Value::from("grumpy"))
        );
        assert_eq!(reopened.snapshot(), store.snapshot());
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vars.json");
        fs::write(&path, "{ not json").expect("write");
        let error = JsonVariableStore::open(&path).expect_err("invalid json");
        assert_eq!(error.code, "HOST_STATE_INVALID");
    }
}
