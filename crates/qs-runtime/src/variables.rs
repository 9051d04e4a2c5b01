use std::collections::BTreeMap;

use dashmap::DashMap;
use qs_core::{ScriptLangError, Value};
use serde::{Deserialize, Serialize};

/// Named runtime state kept outside any script. Keys are the actor identity
/// (absent for globals) and the variable name, so reloads never touch it.
pub trait VariableStore: Send + Sync {
    fn get(&self, actor: Option<&str>, name: &str) -> Option<Value>;
    fn set(&self, actor: Option<&str>, name: &str, value: Value);
    fn snapshot(&self) -> StoreSnapshot;

    fn flush(&self) -> Result<(), ScriptLangError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub globals: BTreeMap<String, Value>,
    #[serde(default)]
    pub actors: BTreeMap<String, BTreeMap<String, Value>>,
}

#[derive(Debug, Default)]
pub struct MemoryVariableStore {
    globals: DashMap<String, Value>,
    actors: DashMap<String, BTreeMap<String, Value>>,
}

impl MemoryVariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let store = Self::new();
        for (name, value) in snapshot.globals {
            store.globals.insert(name, value);
        }
        for (actor, values) in snapshot.actors {
            store.actors.insert(actor, values);
        }
        store
    }
}

impl VariableStore for MemoryVariableStore {
    fn get(&self, actor: Option<&str>, name: &str) -> Option<Value> {
        match actor {
            Some(actor) => self
                .actors
                .get(actor)
                .and_then(|values| values.get(name).cloned()),
            None => self.globals.get(name).map(|value| value.clone()),
        }
    }

    fn set(&self, actor: Option<&str>, name: &str, value: Value) {
        match actor {
            Some(actor) => {
                self.actors
                    .entry(actor.to_string())
                    .or_default()
                    .insert(name.to_string(), value);
            }
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            globals: self
                .globals
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
            actors: self
                .actors
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod variables_tests {
    use super::*;

    #[test]
    fn actor_and_global_namespaces_are_separate() {
        let store = MemoryVariableStore::new();
        store.set(None, "day", Value::from(3_i64));
        store.set(Some("player"), "day", Value::from("monday"));

        assert_eq!(store.get(None, "day"), Some(Value::from(3_i64)));
        assert_eq!(store.get(Some("player"), "day"), Some(Value::from("monday")));
        assert_eq!(store.get(Some("guard"), "day"), None);
    }

    #[test]
    fn snapshot_round_trips_through_a_new_store() {
        let store = MemoryVariableStore::new();
        store.set(Some("player"), "gold", Value::from(12_i64));
        store.set(None, "weather", Value::from("rain"));

        let restored = MemoryVariableStore::from_snapshot(store.snapshot());
        assert_eq!(restored.snapshot(), store.snapshot());
        assert!(restored.flush().is_ok());
    }
}
