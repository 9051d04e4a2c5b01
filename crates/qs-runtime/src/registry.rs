use std::sync::Arc;

use dashmap::DashMap;
use qs_parser::{Declaration, DeclarationKind};

use crate::unit::ScriptUnit;

#[derive(Debug, Clone)]
pub struct DeclarationEntry {
    pub script_id: String,
    pub declaration: Arc<Declaration>,
    pub unit: Arc<ScriptUnit>,
}

/// Content declarations (actors, dialogues, quests, top-level nodes) keyed by
/// kind and name. A later declaration with the same key replaces the earlier
/// one, even across scripts.
#[derive(Debug, Default)]
pub struct DeclarationRegistry {
    entries: DashMap<(DeclarationKind, String), DeclarationEntry>,
}

impl DeclarationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, entry: DeclarationEntry) -> Option<DeclarationEntry> {
        let key = (entry.declaration.kind, entry.declaration.name.clone());
        let replaced = self.entries.insert(key, entry);
        if let Some(previous) = &replaced {
            tracing::warn!(
                target: "scripting",
                kind = previous.declaration.kind.label(),
                name = %previous.declaration.name,
                previous_script = %previous.script_id,
                "declaration replaced"
            );
        }
        replaced
    }

    pub fn get(&self, kind: DeclarationKind, name: &str) -> Option<DeclarationEntry> {
        self.entries
            .get(&(kind, name.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn contains(&self, kind: DeclarationKind, name: &str) -> bool {
        self.entries.contains_key(&(kind, name.to_string()))
    }

    /// Sorted names of every declaration of `kind`.
    pub fn names(&self, kind: DeclarationKind) -> Vec<String> {
        let mut names = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == kind)
            .map(|entry| entry.key().1.clone())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn for_script(&self, script_id: &str) -> Vec<(DeclarationKind, String)> {
        let mut keys = self
            .entries
            .iter()
            .filter(|entry| entry.value().script_id == script_id)
            .map(|entry| entry.key().clone())
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }

    pub fn remove_script(&self, script_id: &str) -> Vec<DeclarationEntry> {
        let keys = self.for_script(script_id);
        keys.into_iter()
            .filter_map(|key| self.entries.remove(&key).map(|(_, entry)| entry))
            .collect()
    }

    pub fn restore(&self, entries: Vec<DeclarationEntry>) {
        for entry in entries {
            let key = (entry.declaration.kind, entry.declaration.name.clone());
            self.entries.insert(key, entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
