use qs_core::ScriptLangError;
use std::fmt::Display;

fn map_error(code: &'static str, error: impl Display) -> ScriptLangError {
    ScriptLangError::new(code, error.to_string())
}

pub(crate) fn map_source_read(error: std::io::Error) -> ScriptLangError {
    map_error("HOST_SOURCE_READ", error)
}

pub(crate) fn map_source_scan(error: walkdir::Error) -> ScriptLangError {
    map_error("HOST_SOURCE_SCAN", error)
}

pub(crate) fn map_source_path(error: std::path::StripPrefixError) -> ScriptLangError {
    map_error("HOST_SOURCE_PATH", error)
}

pub(crate) fn map_config_read(error: std::io::Error) -> ScriptLangError {
    map_error("CONFIG_READ", error)
}

pub(crate) fn map_config_invalid(error: toml::de::Error) -> ScriptLangError {
    map_error("CONFIG_INVALID", error)
}

pub(crate) fn map_watch(error: notify::Error) -> ScriptLangError {
    map_error("HOST_WATCH", error)
}

pub(crate) fn map_worker_start(error: std::io::Error) -> ScriptLangError {
    map_error("HOST_WORKER_START", error)
}

pub(crate) fn map_state_read(error: std::io::Error) -> ScriptLangError {
    map_error("HOST_STATE_READ", error)
}

pub(crate) fn map_state_write(error: std::io::Error) -> ScriptLangError {
    map_error("HOST_STATE_WRITE", error)
}

pub(crate) fn map_state_invalid(error: serde_json::Error) -> ScriptLangError {
    map_error("HOST_STATE_INVALID", error)
}
