use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use qs_core::ScriptLangError;

use crate::debounce::DebounceHandle;
use crate::loader::has_extension;
use crate::map_watch;

/// Watches the scripts directory on notify's own thread and forwards every
/// relevant script path to the debouncer.
pub struct ScriptWatcher {
    watcher: RecommendedWatcher,
    root: PathBuf,
}

impl ScriptWatcher {
    pub fn start(
        root: &Path,
        extension: &str,
        debounce: DebounceHandle,
    ) -> Result<Self, ScriptLangError> {
        let extension = extension.to_string();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    if !is_relevant(&event.kind) {
                        return;
                    }
                    for path in event.paths {
                        if has_extension(&path, &extension) {
                            debounce.schedule(path);
                        }
                    }
                }
                Err(error) => tracing::warn!(target: "watch", "script watcher error: {}", error),
            }
        })
        .map_err(map_watch)?;
        watcher
            .configure(
                NotifyConfig::default()
                    .with_compare_contents(false)
                    .with_poll_interval(Duration::from_millis(300)),
            )
            .map_err(map_watch)?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(map_watch)?;
        tracing::info!(target: "watch", root = %root.display(), "watching scripts");
        Ok(Self {
            watcher,
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stop(mut self) -> Result<(), ScriptLangError> {
        self.watcher.unwatch(&self.root).map_err(map_watch)
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Create(_)
            | EventKind::Remove(_)
    )
}

#[cfg(test)]
mod watcher_tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};

    #[test]
    fn content_and_lifecycle_changes_are_relevant() {
        assert!(is_relevant(&EventKind::Create(CreateKind::File)));
        assert!(is_relevant(&EventKind::Remove(RemoveKind::File)));
        assert!(is_relevant(&EventKind::Modify(ModifyKind::Data(
            DataChange::Content
        ))));
        assert!(!is_relevant(&EventKind::Access(AccessKind::Read)));
        assert!(!is_relevant(&EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::WriteTime
        ))));
    }
}
