use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use qs_parser::EventHandlerDecl;

use crate::unit::ScriptUnit;

/// One `on EVENT { ... }` block installed by a script.
#[derive(Debug, Clone)]
pub struct HandlerRegistration {
    pub event_type: String,
    pub script_id: String,
    /// `kind:name` of the content declaration the handler sits in.
    pub owner: Option<String>,
    pub handler: Arc<EventHandlerDecl>,
    pub unit: Arc<ScriptUnit>,
}

/// A registration taken out of the table together with its former position,
/// so it can be put back exactly where it was.
#[derive(Debug, Clone)]
pub struct RemovedRegistration {
    pub index: usize,
    pub registration: Arc<HandlerRegistration>,
}

/// Event type to ordered handler list. Registration order is dispatch order
/// and nothing is deduplicated.
#[derive(Debug, Default)]
pub struct EventManager {
    handlers: DashMap<String, Vec<Arc<HandlerRegistration>>>,
    stopped: DashSet<String>,
    dispatch_depth: AtomicUsize,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, registration: HandlerRegistration) -> Arc<HandlerRegistration> {
        let registration = Arc::new(registration);
        tracing::debug!(
            target: "scripting",
            event = %registration.event_type,
            script = %registration.script_id,
            "handler registered"
        );
        self.handlers
            .entry(registration.event_type.clone())
            .or_default()
            .push(Arc::clone(&registration));
        registration
    }

    /// Snapshot of the handlers for `event_type`. Dispatch iterates the
    /// snapshot, so handlers may register or fire events re-entrantly.
    pub fn handlers_for(&self, event_type: &str) -> Vec<Arc<HandlerRegistration>> {
        self.handlers
            .get(event_type)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn unregister(&self, event_type: &str, script_id: &str) -> Vec<RemovedRegistration> {
        let mut removed = Vec::new();
        if let Some(mut entry) = self.handlers.get_mut(event_type) {
            removed = take_script(entry.value_mut(), script_id);
        }
        self.handlers.remove_if(event_type, |_, list| list.is_empty());
        removed
    }

    pub fn unregister_script(&self, script_id: &str) -> Vec<RemovedRegistration> {
        let mut removed = Vec::new();
        for mut entry in self.handlers.iter_mut() {
            removed.extend(take_script(entry.value_mut(), script_id));
        }
        self.handlers.retain(|_, list| !list.is_empty());
        if !removed.is_empty() {
            tracing::debug!(
                target: "scripting",
                script = script_id,
                count = removed.len(),
                "handlers unregistered"
            );
        }
        removed
    }

    /// Puts previously removed registrations back at their old positions.
    pub fn restore(&self, removed: Vec<RemovedRegistration>) {
        let mut by_event = BTreeMap::<String, Vec<RemovedRegistration>>::new();
        for item in removed {
            by_event
                .entry(item.registration.event_type.clone())
                .or_default()
                .push(item);
        }
        for (event_type, mut items) in by_event {
            items.sort_by_key(|item| item.index);
            let mut list = self.handlers.entry(event_type).or_default();
            for item in items {
                let index = item.index.min(list.len());
                list.insert(index, item.registration);
            }
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn count_for_script(&self, script_id: &str) -> usize {
        self.handlers
            .iter()
            .map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|registration| registration.script_id == script_id)
                    .count()
            })
            .sum()
    }

    pub fn event_types(&self) -> Vec<String> {
        let mut types = self
            .handlers
            .iter()
            .map(|entry| entry.key().clone())
            .collect::<Vec<_>>();
        types.sort();
        types
    }

    /// Suppresses dispatch to `script_id` until [`EventManager::resume_script`].
    pub fn stop_script(&self, script_id: &str) {
        self.stopped.insert(script_id.to_string());
    }

    pub fn resume_script(&self, script_id: &str) {
        self.stopped.remove(script_id);
    }

    pub fn is_stopped(&self, script_id: &str) -> bool {
        self.stopped.contains(script_id)
    }

    pub fn is_dispatching(&self) -> bool {
        self.dispatch_depth.load(Ordering::SeqCst) > 0
    }

    pub(crate) fn enter_dispatch(&self) -> DispatchGuard<'_> {
        self.dispatch_depth.fetch_add(1, Ordering::SeqCst);
        DispatchGuard { manager: self }
    }
}

pub(crate) struct DispatchGuard<'a> {
    manager: &'a EventManager,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.manager.dispatch_depth.fetch_sub(1, Ordering::SeqCst);
    }
}

fn take_script(
    list: &mut Vec<Arc<HandlerRegistration>>,
    script_id: &str,
) -> Vec<RemovedRegistration> {
    let mut removed = Vec::new();
    let mut kept = Vec::with_capacity(list.len());
    for (index, registration) in list.drain(..).enumerate() {
        if registration.script_id == script_id {
            removed.push(RemovedRegistration {
                index,
                registration,
            });
        } else {
            kept.push(registration);
        }
    }
    *list = kept;
    removed
}
