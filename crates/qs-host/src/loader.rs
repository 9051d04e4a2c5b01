use std::fs;
use std::path::{Path, PathBuf};

use qs_core::ScriptLangError;
use walkdir::WalkDir;

use crate::{map_source_path, map_source_read, map_source_scan};

/// A script file found on disk, not yet parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    pub id: String,
    pub path: PathBuf,
}

/// Identity of `path` below `root`: relative path, extension stripped,
/// `/` separators. `npcs\guard.qs` under the root becomes `npcs/guard`.
pub fn script_identity(root: &Path, path: &Path) -> Result<String, ScriptLangError> {
    let relative = path.strip_prefix(root).map_err(map_source_path)?;
    let relative = relative.with_extension("");
    Ok(relative.to_string_lossy().replace('\\', "/"))
}

pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == extension)
}

/// Absolute, canonical form of the configured scripts directory.
pub fn resolve_scripts_dir(scripts_dir: &Path) -> Result<PathBuf, ScriptLangError> {
    let absolute = if scripts_dir.is_absolute() {
        scripts_dir.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(map_source_read)?
            .join(scripts_dir)
    };

    if !absolute.exists() {
        return Err(ScriptLangError::new(
            "HOST_SOURCE_NOT_FOUND",
            format!("scripts directory does not exist: {}", absolute.display()),
        ));
    }
    if !absolute.is_dir() {
        return Err(ScriptLangError::new(
            "HOST_SOURCE_NOT_DIR",
            format!("scripts path is not a directory: {}", absolute.display()),
        ));
    }
    fs::canonicalize(&absolute).map_err(map_source_read)
}

/// Every script under `root`, sorted by identity.
pub fn discover_scripts(root: &Path, extension: &str) -> Result<Vec<ScriptSource>, ScriptLangError> {
    let mut sources = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(map_source_scan)?;
        if !entry.file_type().is_file() || !has_extension(entry.path(), extension) {
            continue;
        }
        sources.push(ScriptSource {
            id: script_identity(root, entry.path())?,
            path: entry.path().to_path_buf(),
        });
    }
    sources.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(sources)
}

pub fn read_source(path: &Path) -> Result<String, ScriptLangError> {
    fs::read_to_string(path).map_err(map_source_read)
}

#[cfg(test)]
mod loader_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parent should be created");
        }
        fs::write(path, content).expect("file should be written");
    }

    #[test]
    fn identity_strips_root_and_extension() {
        let root = Path::new("/game/scripts");
        assert_eq!(
            script_identity(root, Path::new("/game/scripts/npcs/guard.qs")).expect("inside root"),
            "npcs/guard"
        );
        assert_eq!(
            script_identity(root, Path::new("/game/scripts/intro.qs")).expect("inside root"),
            "intro"
        );
        let error = script_identity(root, Path::new("/elsewhere/x.qs")).expect_err("outside");
        assert_eq!(error.code, "HOST_SOURCE_PATH");
    }

    #[test]
    fn discovery_filters_by_extension_and_sorts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        write_file(&root.join("quests/zeta.qs"), "");
        write_file(&root.join("alpha.qs"), "");
        write_file(&root.join("quests/notes.txt"), "");
        write_file(&root.join("npcs/guard.qs"), "");

        let ids = discover_scripts(root, "qs")
            .expect("scan")
            .into_iter()
            .map(|source| source.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["alpha", "npcs/guard", "quests/zeta"]);
    }

    #[test]
    fn scripts_dir_must_exist_and_be_a_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = resolve_scripts_dir(&dir.path().join("missing")).expect_err("missing");
        assert_eq!(error.code, "HOST_SOURCE_NOT_FOUND");

        let file = dir.path().join("plain.qs");
        write_file(&file, "");
        let error = resolve_scripts_dir(&file).expect_err("file");
        assert_eq!(error.code, "HOST_SOURCE_NOT_DIR");

        let resolved = resolve_scripts_dir(dir.path()).expect("dir resolves");
        assert!(resolved.is_absolute());
    }
}
