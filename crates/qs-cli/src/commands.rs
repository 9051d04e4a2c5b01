use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use qs_core::{ScriptEvent, ScriptLangError, Value};
use qs_host::{
    discover_scripts, read_source, resolve_scripts_dir, RuntimeConfig, RuntimeNotification,
    ScriptRuntime,
};
use qs_parser::{parse_program, parse_script, print_program};
use qs_runtime::BuiltinTable;

use crate::{map_cli_data, CheckArgs, FmtArgs, RunArgs};

const TICK: Duration = Duration::from_millis(10);

pub(crate) fn run_check(config: &RuntimeConfig, args: CheckArgs) -> Result<i32, ScriptLangError> {
    let scripts_dir = args.scripts_dir.unwrap_or_else(|| config.scripts_dir.clone());
    let root = resolve_scripts_dir(&scripts_dir)?;
    let sources = discover_scripts(&root, &config.extension)?;
    let mut failed = 0usize;
    for source in &sources {
        match read_source(&source.path).and_then(|text| parse_script(&text, &source.id)) {
            Ok(program) => println!("OK {} ({} statements)", source.id, program.statements.len()),
            Err(error) => {
                failed += 1;
                println!("FAIL {}", error.diagnostic());
            }
        }
    }
    if failed > 0 {
        return Err(ScriptLangError::new(
            "CLI_CHECK_FAILED",
            format!("{} of {} scripts failed to parse", failed, sources.len()),
        ));
    }
    println!("RESULT:OK");
    Ok(0)
}

pub(crate) fn run_fmt(args: FmtArgs) -> Result<i32, ScriptLangError> {
    let text = read_source(&args.file)?;
    let program = parse_program(&text)?;
    print!("{}", print_program(&program));
    Ok(0)
}

pub(crate) fn run_events(config: RuntimeConfig, args: RunArgs) -> Result<i32, ScriptLangError> {
    let config = with_scripts_dir(config, args.scripts_dir);
    let data = parse_data_pairs(&args.data)?;
    let mut runtime = ScriptRuntime::new(config, host_builtins())?;
    runtime.load_all()?;
    emit_notifications(runtime.drain_notifications());

    for event_type in &args.events {
        let mut event = ScriptEvent::new(event_type.as_str());
        event.data = data.clone();
        event.actor = args.actor.clone();
        let report = runtime.fire_event(event);
        println!(
            "EVENT:{}",
            serde_json::to_string(&report.event).unwrap_or_default()
        );
        println!("HANDLERS:{}", report.invoked);
        emit_notifications(runtime.drain_notifications());
    }

    // Let scheduled events land before exiting.
    let deadline = Instant::now() + Duration::from_millis(args.wait_ms);
    loop {
        let idle = runtime.pending_work() == 0;
        let processed = runtime.tick();
        emit_notifications(runtime.drain_notifications());
        if (idle && processed == 0) || Instant::now() >= deadline {
            break;
        }
        if processed == 0 {
            std::thread::sleep(TICK);
        }
    }

    runtime.shutdown()?;
    println!("RESULT:OK");
    Ok(0)
}

pub(crate) fn with_scripts_dir(config: RuntimeConfig, scripts_dir: Option<PathBuf>) -> RuntimeConfig {
    match scripts_dir {
        Some(scripts_dir) => config.with_scripts_dir(scripts_dir),
        None => config,
    }
}

pub(crate) fn load_config(path: Option<&Path>) -> Result<RuntimeConfig, ScriptLangError> {
    match path {
        Some(path) => RuntimeConfig::load(path),
        None => Ok(RuntimeConfig::default()),
    }
}

/// Capabilities the stock runner offers scripts.
pub(crate) fn host_builtins() -> BuiltinTable {
    BuiltinTable::new()
        .with("print", |args, _| {
            let line = args
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            println!("PRINT:{}", line);
            Ok(Value::Null)
        })
        .with("say", |args, call| {
            let text = args.iter().map(ToString::to_string).collect::<String>();
            println!("SAY:{}:{}", call.actor.unwrap_or("-"), text);
            Ok(Value::Null)
        })
}

pub(crate) fn emit_notifications(notifications: Vec<RuntimeNotification>) {
    for notification in notifications {
        println!("NOTICE:{}", notification);
    }
}

pub(crate) fn parse_data_pairs(pairs: &[String]) -> Result<BTreeMap<String, Value>, ScriptLangError> {
    let mut data = BTreeMap::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            return Err(map_cli_data(format!("expected key=value, got \"{}\"", pair)));
        };
        if key.is_empty() {
            return Err(map_cli_data(format!("empty key in \"{}\"", pair)));
        }
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::from(raw));
        data.insert(key.to_string(), value);
    }
    Ok(data)
}

#[cfg(test)]
mod commands_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn data_pairs_read_json_values_and_fall_back_to_strings() {
        let data = parse_data_pairs(&[
            "damage=12".to_string(),
            "crit=true".to_string(),
            "target=orc".to_string(),
            "tags=[\"a\"]".to_string(),
        ])
        .expect("pairs parse");
        assert_eq!(data.get("damage"), Some(&Value::from(12_i64)));
        assert_eq!(data.get("crit"), Some(&Value::Bool(true)));
        assert_eq!(data.get("target"), Some(&Value::from("orc")));
        assert_eq!(
            data.get("tags"),
            Some(&Value::Array(vec![Value::from("a")]))
        );

        let error = parse_data_pairs(&["nonsense".to_string()]).expect_err("no '='");
        assert_eq!(error.code, "CLI_DATA_INVALID");
    }

    #[test]
    fn scripts_dir_argument_overrides_config() {
        let config = with_scripts_dir(RuntimeConfig::default(), Some(PathBuf::from("game")));
        assert_eq!(config.scripts_dir, PathBuf::from("game"));
        let config = with_scripts_dir(config, None);
        assert_eq!(config.scripts_dir, PathBuf::from("game"));
    }
}
