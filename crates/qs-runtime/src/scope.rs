use std::collections::BTreeMap;

use qs_core::Value;

/// Index of a scope record inside a [`ScopeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(usize);

impl ScopeId {
    pub const GLOBAL: ScopeId = ScopeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Default)]
struct ScopeRecord {
    parent: Option<ScopeId>,
    bindings: BTreeMap<String, Value>,
}

/// Scopes addressed by index. Records are allocated and released strictly
/// last-in first-out, so a popped id is never observed again.
#[derive(Debug, Clone)]
pub struct ScopeArena {
    records: Vec<ScopeRecord>,
}

impl Default for ScopeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeArena {
    pub fn new() -> Self {
        Self {
            records: vec![ScopeRecord::default()],
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.records.len());
        self.records.push(ScopeRecord {
            parent: Some(parent),
            bindings: BTreeMap::new(),
        });
        id
    }

    /// Releases `id` with all its bindings. Only the newest scope can be
    /// released and the global scope is never released.
    pub fn pop(&mut self, id: ScopeId) -> bool {
        if id == ScopeId::GLOBAL || id.0 + 1 != self.records.len() {
            return false;
        }
        self.records.pop();
        true
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.records.get(id.0).and_then(|record| record.parent)
    }

    pub fn declare(&mut self, id: ScopeId, name: &str, value: Value) {
        if let Some(record) = self.records.get_mut(id.0) {
            record.bindings.insert(name.to_string(), value);
        }
    }

    /// Nearest scope, starting at `id`, that binds `name`.
    pub fn resolve(&self, id: ScopeId, name: &str) -> Option<ScopeId> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let record = self.records.get(current.0)?;
            if record.bindings.contains_key(name) {
                return Some(current);
            }
            cursor = record.parent;
        }
        None
    }

    pub fn lookup(&self, id: ScopeId, name: &str) -> Option<&Value> {
        let owner = self.resolve(id, name)?;
        self.records[owner.0].bindings.get(name)
    }

    pub fn lookup_mut(&mut self, id: ScopeId, name: &str) -> Option<&mut Value> {
        let owner = self.resolve(id, name)?;
        self.records[owner.0].bindings.get_mut(name)
    }

    /// Updates the nearest existing binding. Returns false when `name` is
    /// bound nowhere in the chain.
    pub fn assign(&mut self, id: ScopeId, name: &str, value: Value) -> bool {
        match self.lookup_mut(id, name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn bindings(&self, id: ScopeId) -> Option<&BTreeMap<String, Value>> {
        self.records.get(id.0).map(|record| &record.bindings)
    }

    /// Every binding visible from `id`, inner bindings shadowing outer ones.
    pub fn visible(&self, id: ScopeId) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(record) = self.records.get(current.0) else {
                break;
            };
            for (name, value) in &record.bindings {
                out.entry(name.clone()).or_insert_with(|| value.clone());
            }
            cursor = record.parent;
        }
        out
    }
}

#[cfg(test)]
mod scope_tests {
    use super::*;

    #[test]
    fn lookup_walks_parents_and_respects_shadowing() {
        let mut arena = ScopeArena::new();
        arena.declare(ScopeId::GLOBAL, "hp", Value::from(10_i64));
        let inner = arena.push(ScopeId::GLOBAL);
        assert_eq!(arena.lookup(inner, "hp"), Some(&Value::from(10_i64)));

        arena.declare(inner, "hp", Value::from(3_i64));
        assert_eq!(arena.lookup(inner, "hp"), Some(&Value::from(3_i64)));
        assert_eq!(arena.lookup(ScopeId::GLOBAL, "hp"), Some(&Value::from(10_i64)));
        assert_eq!(arena.visible(inner).get("hp"), Some(&Value::from(3_i64)));
    }

    #[test]
    fn assign_updates_the_defining_scope() {
        let mut arena = ScopeArena::new();
        arena.declare(ScopeId::GLOBAL, "count", Value::from(0_i64));
        let block = arena.push(ScopeId::GLOBAL);
        let nested = arena.push(block);

        assert!(arena.assign(nested, "count", Value::from(5_i64)));
        assert_eq!(
            arena.bindings(ScopeId::GLOBAL).and_then(|b| b.get("count")),
            Some(&Value::from(5_i64))
        );
        assert!(arena.bindings(nested).is_some_and(|b| b.is_empty()));
        assert!(!arena.assign(nested, "missing", Value::Null));
    }

    #[test]
    fn pop_is_lifo_and_discards_bindings() {
        let mut arena = ScopeArena::new();
        let outer = arena.push(ScopeId::GLOBAL);
        let inner = arena.push(outer);
        arena.declare(inner, "temp", Value::Bool(true));

        assert!(!arena.pop(outer));
        assert!(arena.pop(inner));
        assert!(arena.pop(outer));
        assert!(!arena.pop(ScopeId::GLOBAL));
        assert_eq!(arena.len(), 1);

        let reused = arena.push(ScopeId::GLOBAL);
        assert_eq!(arena.lookup(reused, "temp"), None);
    }
}
