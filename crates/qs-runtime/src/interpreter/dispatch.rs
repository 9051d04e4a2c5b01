use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use qs_core::{ScriptEvent, ScriptLangError, Value};

use super::Interpreter;
use crate::context::{ExecMode, ExecutionContext};
use crate::events::HandlerRegistration;
use crate::perf::PerfNotice;

const EVENT_BINDING: &str = "event";
const RESERVED_FIELDS: [&str; 3] = ["type", "cancelled", "actor"];

/// A handler that raised an error. Dispatch carried on without it.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerFailure {
    pub script_id: String,
    pub event_type: String,
    pub error: ScriptLangError,
}

#[derive(Debug, Clone)]
pub struct DispatchReport {
    /// The event as the last handler left it.
    pub event: ScriptEvent,
    pub invoked: usize,
    /// Scripts passed over because they were stopped or throttled.
    pub skipped: Vec<String>,
    pub failures: Vec<HandlerFailure>,
    pub notices: Vec<PerfNotice>,
}

impl DispatchReport {
    pub fn cancelled(&self) -> bool {
        self.event.cancelled
    }
}

impl Interpreter {
    /// Runs every handler registered for the event type in registration
    /// order, each in its own context. Stops early once a handler cancels.
    pub fn fire_event(&self, event: ScriptEvent) -> DispatchReport {
        let _dispatching = self.events.enter_dispatch();
        let handlers = self.events.handlers_for(&event.event_type);
        let mut report = DispatchReport {
            event: event.clone(),
            invoked: 0,
            skipped: Vec::new(),
            failures: Vec::new(),
            notices: Vec::new(),
        };
        if event.cancelled {
            return report;
        }

        tracing::debug!(
            target: "scripting",
            event = %event.event_type,
            handlers = handlers.len(),
            "dispatching event"
        );

        let mut payload = event_value(&event);
        for registration in handlers {
            let script_id = registration.script_id.as_str();
            if self.events.is_stopped(script_id) || self.governor.is_throttled(script_id) {
                report.skipped.push(script_id.to_string());
                continue;
            }

            let started = Instant::now();
            let outcome = self.run_handler(&registration, payload.clone(), event.actor.clone());
            report
                .notices
                .extend(self.governor.record(script_id, started.elapsed()));
            report.invoked += 1;

            match outcome {
                Ok(updated) => payload = updated,
                Err(error) => {
                    self.governor.record_error(script_id);
                    tracing::warn!(
                        target: "scripting",
                        script = script_id,
                        event = %event.event_type,
                        "handler failed: {}",
                        error.diagnostic()
                    );
                    report.failures.push(HandlerFailure {
                        script_id: script_id.to_string(),
                        event_type: event.event_type.clone(),
                        error,
                    });
                }
            }

            if payload.member("cancelled").is_truthy() {
                tracing::debug!(
                    target: "scripting",
                    event = %event.event_type,
                    script = script_id,
                    "event cancelled"
                );
                break;
            }
        }

        report.event = event_from_value(&event, payload);
        report
    }

    /// Returns the event value as the handler left it.
    fn run_handler(
        &self,
        registration: &Arc<HandlerRegistration>,
        payload: Value,
        actor: Option<String>,
    ) -> Result<Value, ScriptLangError> {
        let unit = &registration.unit;
        let mut ctx =
            ExecutionContext::for_unit(Arc::clone(unit), ExecMode::Handler).with_actor(actor);
        for (name, value) in unit.globals() {
            ctx.declare_global(&name, value);
        }
        ctx.declare_global(EVENT_BINDING, payload);

        self.exec_block(&mut ctx, &registration.handler.body)
            .map_err(|error| ctx.decorate(error))?;

        let mut globals = ctx.globals();
        let payload = globals.remove(EVENT_BINDING).unwrap_or_default();
        unit.merge_globals(globals);
        Ok(payload)
    }
}

fn event_value(event: &ScriptEvent) -> Value {
    let mut fields = event.data.clone();
    fields.insert("type".to_string(), Value::from(event.event_type.as_str()));
    fields.insert("cancelled".to_string(), Value::Bool(event.cancelled));
    if let Some(actor) = &event.actor {
        fields.insert("actor".to_string(), Value::from(actor.as_str()));
    }
    Value::Object(fields)
}

fn event_from_value(original: &ScriptEvent, payload: Value) -> ScriptEvent {
    let cancelled = payload.member("cancelled").is_truthy();
    let data: BTreeMap<String, Value> = match payload {
        Value::Object(fields) => fields
            .into_iter()
            .filter(|(key, _)| !RESERVED_FIELDS.contains(&key.as_str()))
            .collect(),
        _ => original.data.clone(),
    };
    ScriptEvent {
        event_type: original.event_type.clone(),
        data,
        actor: original.actor.clone(),
        cancelled,
    }
}

#[cfg(test)]
mod dispatch_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use qs_core::{ScriptEvent, Value};

    use super::super::runtime_test_support::{interpreter_with, load_ok, RecordingBuiltins};
    use super::super::{Interpreter, InterpreterOptions};
    use crate::perf::{GovernorSettings, PerformanceGovernor};

    #[test]
    fn cancellation_stops_later_handlers_for_that_firing_only() {
        let builtins = Arc::new(RecordingBuiltins::new());
        let interpreter = interpreter_with(Arc::clone(&builtins));
        load_ok(
            &interpreter,
            "h1",
            r#"on E { record("H1"); if (event.block) { event.cancelled = true; } }"#,
        );
        load_ok(&interpreter, "h2", r#"on E { record("H2"); }"#);
        load_ok(&interpreter, "h3", r#"on E { record("H3"); }"#);

        let report = interpreter.fire_event(ScriptEvent::new("E").with_data("block", true));
        assert!(report.cancelled());
        assert_eq!(report.invoked, 1);
        assert_eq!(builtins.recorded(), vec![Value::from("H1")]);

        let report = interpreter.fire_event(ScriptEvent::new("E"));
        assert!(!report.cancelled());
        assert_eq!(report.invoked, 3);
        assert_eq!(
            builtins.recorded(),
            vec![
                Value::from("H1"),
                Value::from("H1"),
                Value::from("H2"),
                Value::from("H3"),
            ]
        );
    }

    #[test]
    fn cancel_builtin_works_from_nested_calls() {
        let builtins = Arc::new(RecordingBuiltins::new());
        let interpreter = interpreter_with(Arc::clone(&builtins));
        load_ok(
            &interpreter,
            "guard",
            "function stop() { cancel(); } on door.open { stop(); } on door.open { record(1); }",
        );
        let report = interpreter.fire_event(ScriptEvent::new("door.open"));
        assert!(report.cancelled());
        assert!(builtins.recorded().is_empty());
    }

    #[test]
    fn a_failing_handler_does_not_stop_its_siblings() {
        let builtins = Arc::new(RecordingBuiltins::new());
        let interpreter = interpreter_with(Arc::clone(&builtins));
        load_ok(&interpreter, "broken", "on ping { record(missing_name); }");
        load_ok(&interpreter, "healthy", "on ping { record(\"pong\"); }");

        let report = interpreter.fire_event(ScriptEvent::new("ping"));
        assert_eq!(report.invoked, 2);
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.script_id, "broken");
        assert_eq!(failure.error.code, "RUNTIME_UNDEFINED_VARIABLE");
        assert_eq!(failure.error.script.as_deref(), Some("broken"));
        assert_eq!(builtins.recorded(), vec![Value::from("pong")]);
        assert_eq!(
            interpreter.governor().statistics("broken").map(|stats| stats.errors),
            Some(1)
        );
    }

    #[test]
    fn payload_edits_reach_later_handlers_and_the_report() {
        let builtins = Arc::new(RecordingBuiltins::new());
        let interpreter = interpreter_with(Arc::clone(&builtins));
        load_ok(
            &interpreter,
            "first",
            "on damage { event.amount = event.amount * 2; event.note = \"doubled\"; }",
        );
        load_ok(
            &interpreter,
            "second",
            "on damage { record(event.amount, event.type, actor()); }",
        );

        let report = interpreter.fire_event(
            ScriptEvent::new("damage")
                .with_data("amount", 4_i64)
                .with_actor("orc"),
        );
        assert_eq!(
            builtins.recorded(),
            vec![Value::from(8_i64), Value::from("damage"), Value::from("orc")]
        );
        assert_eq!(report.event.data.get("amount"), Some(&Value::from(8_i64)));
        assert_eq!(report.event.data.get("note"), Some(&Value::from("doubled")));
        assert!(!report.event.data.contains_key("type"));
        assert_eq!(report.event.actor.as_deref(), Some("orc"));
    }

    #[test]
    fn handler_writes_persist_in_script_globals() {
        let builtins = Arc::new(RecordingBuiltins::new());
        let interpreter = interpreter_with(Arc::clone(&builtins));
        let report = load_ok(
            &interpreter,
            "counter",
            "var hits = 0; on hit { hits = hits + 1; var scratch = 1; record(hits); }",
        );
        interpreter.fire_event(ScriptEvent::new("hit"));
        interpreter.fire_event(ScriptEvent::new("hit"));
        assert_eq!(
            builtins.recorded(),
            vec![Value::from(1_i64), Value::from(2_i64)]
        );
        let globals = report.unit.globals();
        assert_eq!(globals.get("hits"), Some(&Value::from(2_i64)));
        assert!(!globals.contains_key("scratch"));
    }

    #[test]
    fn stopped_and_throttled_scripts_are_skipped() {
        let builtins = Arc::new(RecordingBuiltins::new());
        let governor = Arc::new(PerformanceGovernor::new(GovernorSettings {
            consecutive_limit: 1,
            ..GovernorSettings::default()
        }));
        let interpreter = Interpreter::new(InterpreterOptions {
            builtins: Some(Arc::clone(&builtins) as _),
            governor: Some(Arc::clone(&governor)),
            ..InterpreterOptions::default()
        });
        load_ok(&interpreter, "slow", "on tick { record(\"slow\"); }");
        load_ok(&interpreter, "paused", "on tick { record(\"paused\"); }");
        load_ok(&interpreter, "fine", "on tick { record(\"fine\"); }");

        governor.record("slow", Duration::from_secs(1));
        interpreter.events().stop_script("paused");

        let report = interpreter.fire_event(ScriptEvent::new("tick"));
        assert_eq!(report.skipped, vec!["slow".to_string(), "paused".to_string()]);
        assert_eq!(builtins.recorded(), vec![Value::from("fine")]);
        assert!(!interpreter.events().is_dispatching());
    }
}
