use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

fn village_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("demos")
        .join("village")
}

fn qs(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_qs"))
        .args(args)
        .output()
        .expect("cli should execute")
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn assert_success(output: &Output) -> String {
    let stdout = stdout_of(output);
    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        stdout,
        String::from_utf8_lossy(&output.stderr)
    );
    stdout
}

#[test]
fn check_accepts_the_village_demo() {
    let village = village_dir();
    let stdout = assert_success(&qs(&["check", village.to_str().expect("utf-8 path")]));
    assert!(stdout.contains("OK main"));
    assert!(stdout.contains("OK npcs/guard"));
    assert!(stdout.contains("OK quests/herbs"));
    assert!(stdout.contains("RESULT:OK"));
}

#[test]
fn check_reports_syntax_errors_with_location() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("fine.qs"), "var a = 1;").expect("write fine");
    fs::write(dir.path().join("broken.qs"), "var a = ;").expect("write broken");

    let output = qs(&["check", dir.path().to_str().expect("utf-8 path")]);
    assert_eq!(output.status.code(), Some(1));
    let stdout = stdout_of(&output);
    assert!(stdout.contains("OK fine"));
    assert!(stdout.contains("FAIL broken:1:9"), "{}", stdout);
    assert!(stdout.contains("RESULT:ERROR"));
    assert!(stdout.contains("ERROR_CODE:CLI_CHECK_FAILED"));
}

#[test]
fn run_fires_events_in_registration_order() {
    let village = village_dir();
    let stdout = assert_success(&qs(&[
        "run",
        village.to_str().expect("utf-8 path"),
        "--event",
        "player.join",
        "--data",
        "name=\"ayla\"",
    ]));
    assert!(stdout.contains("SAY:-:Welcome, ayla!"), "{}", stdout);
    assert!(stdout.contains("PRINT:quest offered: gather_herbs"));
    assert!(stdout.contains("HANDLERS:3"));
    assert!(stdout.contains("PRINT:bell rings 1"), "{}", stdout);
    assert!(stdout.contains("RESULT:OK"));
}

#[test]
fn run_stops_dispatch_when_a_handler_cancels() {
    let village = village_dir();
    let stdout = assert_success(&qs(&[
        "run",
        village.to_str().expect("utf-8 path"),
        "--event",
        "player.join",
        "--data",
        "name=thief",
    ]));
    assert!(stdout.contains("SAY:-:Halt! You are not welcome here."));
    assert!(stdout.contains("HANDLERS:2"));
    assert!(stdout.contains("\"cancelled\":true"));
    assert!(!stdout.contains("quest offered"));
}

#[test]
fn run_executes_foreign_blocks() {
    let village = village_dir();
    let stdout = assert_success(&qs(&[
        "run",
        village.to_str().expect("utf-8 path"),
        "--event",
        "item.picked",
        "--data",
        "count=7",
        "--actor",
        "ayla",
    ]));
    assert!(stdout.contains("PRINT:quest complete: gather_herbs"), "{}", stdout);
    assert!(!stdout.contains("NOTICE:handler"), "{}", stdout);
}

#[test]
fn fmt_prints_source_that_checks_again() {
    let dir = tempfile::tempdir().expect("tempdir");
    let guard = village_dir().join("npcs").join("guard.qs");
    let stdout = assert_success(&qs(&["fmt", guard.to_str().expect("utf-8 path")]));
    assert!(stdout.contains("npc guard"));
    assert!(stdout.contains("on player.join"));

    fs::write(dir.path().join("guard.qs"), &stdout).expect("write formatted");
    let recheck = assert_success(&qs(&["check", dir.path().to_str().expect("utf-8 path")]));
    assert!(recheck.contains("OK guard"));
}

#[test]
fn watch_runs_for_a_bounded_number_of_ticks() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("idle.qs"), "on never { }").expect("write idle");
    let stdout = assert_success(&qs(&[
        "watch",
        dir.path().to_str().expect("utf-8 path"),
        "--ticks",
        "2",
    ]));
    assert!(stdout.contains("WATCHING:"));
    assert!(stdout.contains("NOTICE:loaded idle (1 handlers)"));
    assert!(stdout.contains("RESULT:OK"));
}

#[test]
fn missing_scripts_dir_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("nope");
    let output = qs(&["run", missing.to_str().expect("utf-8 path")]);
    assert_eq!(output.status.code(), Some(1));
    let stdout = stdout_of(&output);
    assert!(stdout.contains("ERROR_CODE:HOST_SOURCE_NOT_FOUND"));
}
