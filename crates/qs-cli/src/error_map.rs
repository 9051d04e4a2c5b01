use qs_core::ScriptLangError;
use std::fmt::Display;

fn map_error(code: &'static str, error: impl Display) -> ScriptLangError {
    ScriptLangError::new(code, error.to_string())
}

pub(crate) fn emit_error(error: ScriptLangError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    println!(
        "ERROR_MSG_JSON:{}",
        serde_json::to_string(&error.diagnostic()).unwrap_or_default()
    );
    1
}

pub(crate) fn map_tui_io(error: std::io::Error) -> ScriptLangError {
    map_error("TUI_IO", error)
}

pub(crate) fn map_log_init(error: std::io::Error) -> ScriptLangError {
    map_error("CLI_LOG_INIT", error)
}

pub(crate) fn map_cli_data(error: impl Display) -> ScriptLangError {
    map_error("CLI_DATA_INVALID", error)
}

#[cfg(test)]
mod error_map_tests {
    use super::*;

    #[test]
    fn emit_error_returns_non_zero_exit_code() {
        let code = emit_error(ScriptLangError::new("ERR", "failed"));
        assert_eq!(code, 1);
    }

    #[test]
    fn mapping_helpers_keep_error_codes() {
        assert_eq!(map_tui_io(std::io::Error::other("io")).code, "TUI_IO");
        assert_eq!(
            map_log_init(std::io::Error::other("log")).code,
            "CLI_LOG_INIT"
        );
        assert_eq!(map_cli_data("bad pair").code, "CLI_DATA_INVALID");
    }
}
