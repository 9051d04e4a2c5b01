use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use qs_core::{ScriptEvent, Value};
use qs_host::{ChangeKind, RuntimeConfig, RuntimeNotification, ScriptRuntime};
use qs_runtime::BuiltinTable;

fn runtime_for(dir: &Path, debounce_ms: u64) -> ScriptRuntime {
    let mut config = RuntimeConfig::default().with_scripts_dir(dir);
    config.hot_reload.debounce_ms = debounce_ms;
    ScriptRuntime::new(config, BuiltinTable::new()).expect("runtime should start")
}

fn handler_scripts(runtime: &ScriptRuntime, event_type: &str) -> Vec<String> {
    runtime
        .interpreter()
        .events()
        .handlers_for(event_type)
        .iter()
        .map(|registration| registration.script_id.clone())
        .collect()
}

fn global(runtime: &ScriptRuntime, script_id: &str, name: &str) -> Option<Value> {
    runtime
        .scripts()
        .get(script_id)
        .and_then(|script| script.unit.globals().get(name).cloned())
}

#[test]
fn syntax_error_edit_keeps_previous_registrations_then_valid_edit_replaces_them() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut runtime = runtime_for(dir.path(), 300);
    let path = runtime.root().join("guard.qs");
    fs::write(
        &path,
        "var greeted = 0; on player_near { greeted = greeted + 1; } on alarm { }",
    )
    .expect("write guard");
    runtime.load_all().expect("load");
    runtime.drain_notifications();

    fs::write(&path, "on player_near { greeted = ").expect("broken edit");
    let outcome = runtime.reload_path(&path).expect("change applies");
    assert_eq!(outcome.change, ChangeKind::Modified);
    assert!(!outcome.succeeded());
    assert!(matches!(
        runtime.drain_notifications().as_slice(),
        [RuntimeNotification::ReloadFailed { script_id, .. }] if script_id == "guard"
    ));
    assert_eq!(handler_scripts(&runtime, "player_near"), vec!["guard"]);
    assert_eq!(handler_scripts(&runtime, "alarm"), vec!["guard"]);
    runtime.fire_event(ScriptEvent::new("player_near"));
    assert_eq!(global(&runtime, "guard", "greeted"), Some(Value::from(1_i64)));

    fs::write(&path, "var waved = true; on player_wave { }").expect("valid edit");
    let outcome = runtime.reload_path(&path).expect("change applies");
    assert!(outcome.succeeded());
    assert!(handler_scripts(&runtime, "player_near").is_empty());
    assert!(handler_scripts(&runtime, "alarm").is_empty());
    assert_eq!(handler_scripts(&runtime, "player_wave"), vec!["guard"]);
    assert_eq!(global(&runtime, "guard", "waved"), Some(Value::Bool(true)));
    assert!(matches!(
        runtime.drain_notifications().as_slice(),
        [RuntimeNotification::ReloadSucceeded { handlers: 1, .. }]
    ));
}

#[test]
fn deleting_a_script_unloads_it_and_variables_survive() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut runtime = runtime_for(dir.path(), 300);
    let path = runtime.root().join("npcs/smith.qs");
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(&path, r#"on forge { set_var("swords", 2); } npc smith { trade: true; }"#)
        .expect("write smith");
    runtime.load_all().expect("load");
    assert!(runtime.scripts().contains("npcs/smith"));

    runtime.fire_event(ScriptEvent::new("forge").with_actor("smith"));
    fs::remove_file(&path).expect("delete");
    let outcome = runtime.reload_path(&path).expect("change applies");
    assert_eq!(outcome.change, ChangeKind::Deleted);
    assert!(!runtime.scripts().contains("npcs/smith"));
    assert!(handler_scripts(&runtime, "forge").is_empty());
    assert!(runtime
        .materialize(qs_parser::DeclarationKind::Actor, "smith")
        .is_err());
    assert_eq!(
        runtime.interpreter().variables().get(Some("smith"), "swords"),
        Some(Value::from(2_i64))
    );
}

#[test]
fn watcher_bursts_coalesce_into_one_reload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut runtime = runtime_for(dir.path(), 150);
    let path = runtime.root().join("door.qs");
    fs::write(&path, "on open { }").expect("write door");
    runtime.load_all().expect("load");
    runtime.drain_notifications();
    runtime.start_watching().expect("watch");
    std::thread::sleep(Duration::from_millis(100));

    for step in 0..5 {
        fs::write(&path, format!("var step = {}; on open {{ }} on close {{ }}", step))
            .expect("rewrite");
        std::thread::sleep(Duration::from_millis(10));
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut notifications = Vec::new();
    while Instant::now() < deadline {
        runtime.tick();
        notifications.extend(runtime.drain_notifications());
        if !notifications.is_empty() {
            std::thread::sleep(Duration::from_millis(400));
            runtime.tick();
            notifications.extend(runtime.drain_notifications());
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    assert_eq!(notifications.len(), 1, "{:?}", notifications);
    assert!(matches!(
        &notifications[0],
        RuntimeNotification::ReloadSucceeded { handlers: 2, .. }
    ));
    assert_eq!(global(&runtime, "door", "step"), Some(Value::from(4_i64)));
    runtime.shutdown().expect("clean shutdown");
}
