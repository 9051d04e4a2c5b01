use std::path::Path;

use qs_core::ScriptLangError;
use qs_runtime::LoadReport;

use crate::loader::{has_extension, read_source, script_identity, ScriptSource};
use crate::runtime::{RuntimeNotification, ScriptRuntime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// What a debounced change did.
#[derive(Debug, Clone, PartialEq)]
pub struct ReloadOutcome {
    pub script_id: String,
    pub change: ChangeKind,
    pub error: Option<ScriptLangError>,
}

impl ReloadOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

impl ScriptRuntime {
    /// Applies one debounced change notification. Returns `None` when the
    /// path is not a script under the root, or it appeared and vanished
    /// within the window.
    pub fn reload_path(&mut self, path: &Path) -> Option<ReloadOutcome> {
        if !has_extension(path, &self.config().extension) {
            return None;
        }
        let script_id = match script_identity(self.root(), path) {
            Ok(script_id) => script_id,
            Err(error) => {
                tracing::debug!(target: "watch", path = %path.display(), "ignoring change: {}", error);
                return None;
            }
        };

        let change = match (path.is_file(), self.scripts.contains(&script_id)) {
            (true, true) => ChangeKind::Modified,
            (true, false) => ChangeKind::Created,
            (false, true) => ChangeKind::Deleted,
            (false, false) => return None,
        };
        tracing::info!(
            target: "scripting",
            script = %script_id,
            change = ?change,
            "applying script change"
        );

        let error = match change {
            ChangeKind::Created => {
                let source = ScriptSource {
                    id: script_id.clone(),
                    path: path.to_path_buf(),
                };
                self.load_file(&source).err()
            }
            ChangeKind::Modified => {
                let text = read_source(path).map_err(|error| error.in_script(&script_id));
                self.replace_script(&script_id, path, text).err()
            }
            ChangeKind::Deleted => {
                self.unload_script(&script_id);
                None
            }
        };
        Some(ReloadOutcome {
            script_id,
            change,
            error,
        })
    }

    /// Swaps in a new version of a loaded script. The old handlers and
    /// declarations come out first and go back at their original positions
    /// if the new text cannot be read, parsed or run.
    pub(crate) fn replace_script(
        &mut self,
        script_id: &str,
        path: &Path,
        text: Result<String, ScriptLangError>,
    ) -> Result<LoadReport, ScriptLangError> {
        let events = std::sync::Arc::clone(self.interpreter().events());
        let declarations = std::sync::Arc::clone(self.interpreter().declarations());

        events.stop_script(script_id);
        let removed_handlers = events.unregister_script(script_id);
        let removed_declarations = declarations.remove_script(script_id);

        let result = text.and_then(|text| self.install(script_id, path, &text));
        match &result {
            Ok(report) => {
                self.interpreter().governor().unthrottle(script_id);
                tracing::info!(
                    target: "scripting",
                    script = script_id,
                    previous_handlers = removed_handlers.len(),
                    handlers = report.handlers,
                    "script reloaded"
                );
                self.notify(RuntimeNotification::ReloadSucceeded {
                    script_id: script_id.to_string(),
                    handlers: report.handlers,
                });
            }
            Err(error) => {
                events.restore(removed_handlers);
                declarations.restore(removed_declarations);
                tracing::warn!(
                    target: "scripting",
                    script = script_id,
                    "reload failed, previous version kept: {}",
                    error.diagnostic()
                );
                self.notify(RuntimeNotification::ReloadFailed {
                    script_id: script_id.to_string(),
                    error: error.clone(),
                });
            }
        }
        events.resume_script(script_id);
        result
    }
}
