use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use qs_core::Value;
use qs_parser::FunctionDecl;

/// Load-time state one script shares between all of its handlers: its
/// functions and its script-level variables.
#[derive(Debug, Default)]
pub struct ScriptUnit {
    script_id: String,
    functions: RwLock<BTreeMap<String, Arc<FunctionDecl>>>,
    globals: RwLock<BTreeMap<String, Value>>,
}

impl ScriptUnit {
    pub fn new(script_id: impl Into<String>) -> Self {
        Self {
            script_id: script_id.into(),
            ..Self::default()
        }
    }

    pub fn script_id(&self) -> &str {
        &self.script_id
    }

    pub fn define_function(&self, function: Arc<FunctionDecl>) {
        self.functions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(function.name.clone(), function);
    }

    pub fn function(&self, name: &str) -> Option<Arc<FunctionDecl>> {
        self.functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn function_names(&self) -> Vec<String> {
        self.functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn globals(&self) -> BTreeMap<String, Value> {
        self.globals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace_globals(&self, globals: BTreeMap<String, Value>) {
        *self.globals.write().unwrap_or_else(PoisonError::into_inner) = globals;
    }

    /// Writes back values for names the script declared at load. Locals a
    /// handler introduced at its top level are not promoted.
    pub fn merge_globals(&self, updated: BTreeMap<String, Value>) {
        let mut globals = self.globals.write().unwrap_or_else(PoisonError::into_inner);
        for (name, value) in updated {
            if let Some(slot) = globals.get_mut(&name) {
                *slot = value;
            }
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn merge_only_updates_known_globals() {
        let unit = ScriptUnit::new("a");
        unit.replace_globals(BTreeMap::from([("count".to_string(), Value::from(1_i64))]));
        unit.merge_globals(BTreeMap::from([
            ("count".to_string(), Value::from(2_i64)),
            ("temp".to_string(), Value::Null),
        ]));
        let globals = unit.globals();
        assert_eq!(globals.get("count"), Some(&Value::from(2_i64)));
        assert!(!globals.contains_key("temp"));
    }
}
