use std::ffi::OsString;
use std::time::Duration;

use clap::Parser;
use qs_core::ScriptLangError;
use qs_host::{RuntimeConfig, ScriptRuntime};

mod cli_args;
mod commands;
mod error_map;
mod logging;
mod monitor;

pub(crate) use cli_args::{CheckArgs, Cli, FmtArgs, Mode, RunArgs, WatchArgs};
pub(crate) use error_map::{emit_error, map_cli_data, map_log_init, map_tui_io};

const WATCH_TICK: Duration = Duration::from_millis(50);

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> Result<i32, ScriptLangError> {
    let config = commands::load_config(cli.config.as_deref())?;
    let console = match &cli.command {
        Mode::Watch(args) if args.monitor => logging::Console::Off,
        _ => logging::Console::Stderr,
    };
    let _log_guard = logging::init_logging(cli.verbose, console, config.log_file.as_deref())?;

    match cli.command {
        Mode::Check(args) => commands::run_check(&config, args),
        Mode::Fmt(args) => commands::run_fmt(args),
        Mode::Run(args) => commands::run_events(config, args),
        Mode::Watch(args) => run_watch(config, args),
    }
}

fn run_watch(config: RuntimeConfig, args: WatchArgs) -> Result<i32, ScriptLangError> {
    let config = commands::with_scripts_dir(config, args.scripts_dir);
    let mut runtime = ScriptRuntime::new(config, commands::host_builtins())?;
    runtime.load_all()?;
    runtime.start_watching()?;

    if args.monitor {
        let code = monitor::run_monitor(&mut runtime, WATCH_TICK)?;
        runtime.shutdown()?;
        return Ok(code);
    }

    println!("WATCHING:{}", runtime.root().display());
    commands::emit_notifications(runtime.drain_notifications());
    let mut ticks = 0u64;
    while args.ticks.map_or(true, |limit| ticks < limit) {
        runtime.tick();
        commands::emit_notifications(runtime.drain_notifications());
        ticks += 1;
        std::thread::sleep(WATCH_TICK);
    }
    runtime.shutdown()?;
    println!("RESULT:OK");
    Ok(0)
}
