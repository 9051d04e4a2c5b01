use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::Path;

use qs_core::ScriptLangError;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::map_log_init;

const MAX_LOG_SIZE: u64 = 1024 * 1024;

/// Where log lines go. Stdout is reserved for the result protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Console {
    Stderr,
    /// The terminal belongs to the monitor.
    Off,
}

/// Installs the global subscriber. Keep the returned guard alive until exit
/// or buffered file output is lost.
pub(crate) fn init_logging(
    verbose: bool,
    console: Console,
    log_file: Option<&Path>,
) -> Result<Option<WorkerGuard>, ScriptLangError> {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let console_layer = (console == Console::Stderr).then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_ansi(false)
            .with_target(true)
    });

    let Some(log_path) = log_file else {
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .try_init();
        return Ok(None);
    };

    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(map_log_init)?;
        }
    }
    truncate_if_needed(log_path)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(map_log_init)?;
    let (non_blocking_file, guard) = tracing_appender::non_blocking(BufWriter::new(file));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(
            fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init();
    tracing::info!("logging to file: {}", log_path.display());
    Ok(Some(guard))
}

fn truncate_if_needed(log_path: &Path) -> Result<(), ScriptLangError> {
    if log_path.exists() {
        let metadata = fs::metadata(log_path).map_err(map_log_init)?;
        if metadata.len() > MAX_LOG_SIZE {
            File::create(log_path).map_err(map_log_init)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod logging_tests {
    use super::*;

    #[test]
    fn oversized_log_files_are_truncated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("qs.log");
        fs::write(&path, vec![b'x'; (MAX_LOG_SIZE + 1) as usize]).expect("write log");
        truncate_if_needed(&path).expect("truncate");
        assert_eq!(fs::metadata(&path).expect("metadata").len(), 0);

        fs::write(&path, "small").expect("write log");
        truncate_if_needed(&path).expect("keep");
        assert_eq!(fs::metadata(&path).expect("metadata").len(), 5);
    }
}
