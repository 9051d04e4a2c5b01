use std::collections::BTreeMap;
use std::sync::Arc;

use qs_core::{ScriptLangError, SourceSpan, Value};
use qs_parser::{
    collect_declarations, Block, Declaration, DeclarationKind, EventHandlerDecl, FunctionDecl,
    Program, StmtKind,
};

use super::Interpreter;
use crate::context::{ExecMode, ExecutionContext};
use crate::events::HandlerRegistration;
use crate::registry::DeclarationEntry;
use crate::unit::ScriptUnit;

/// What a successful [`Interpreter::load`] installed.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub script_id: String,
    pub unit: Arc<ScriptUnit>,
    pub handlers: usize,
    pub declarations: Vec<(DeclarationKind, String)>,
    pub functions: Vec<String>,
    pub globals: BTreeMap<String, Value>,
}

impl Interpreter {
    /// Runs a parsed script top to bottom. Functions are hoisted first;
    /// declarations register themselves instead of running.
    ///
    /// On failure every registration made under `script_id` is dropped and
    /// declarations it took over from other scripts are put back. Callers
    /// replacing a script must unregister the old version first and restore
    /// it themselves if they want it back.
    pub fn load(&self, script_id: &str, program: &Program) -> Result<LoadReport, ScriptLangError> {
        let unit = Arc::new(ScriptUnit::new(script_id));
        let summary = collect_declarations(program);
        for function in &summary.functions {
            unit.define_function(Arc::clone(&function.item));
        }

        let mut ctx = ExecutionContext::for_unit(Arc::clone(&unit), ExecMode::Load);
        if let Err(error) = self.exec_statements(&mut ctx, &program.statements) {
            let error = ctx.decorate(error);
            let removed = self.events.unregister_script(script_id).len();
            self.declarations.remove_script(script_id);
            let displaced = ctx.take_displaced();
            let restored = displaced.len();
            self.declarations.restore(displaced);
            tracing::warn!(
                target: "scripting",
                script = script_id,
                dropped_handlers = removed,
                restored_declarations = restored,
                "load failed: {}",
                error.diagnostic()
            );
            return Err(error);
        }

        let globals = ctx.globals();
        unit.replace_globals(globals.clone());
        let report = LoadReport {
            script_id: script_id.to_string(),
            handlers: self.events.count_for_script(script_id),
            declarations: self.declarations.for_script(script_id),
            functions: unit.function_names(),
            globals,
            unit,
        };
        tracing::info!(
            target: "scripting",
            script = script_id,
            handlers = report.handlers,
            declarations = report.declarations.len(),
            "script loaded"
        );
        Ok(report)
    }

    pub(super) fn declare_function(
        &self,
        ctx: &mut ExecutionContext,
        function: &Arc<FunctionDecl>,
        span: &SourceSpan,
    ) -> Result<(), ScriptLangError> {
        if self.ensure_declarations_allowed(ctx, "function", span)? {
            ctx.unit().define_function(Arc::clone(function));
        }
        Ok(())
    }

    pub(super) fn declare_handler(
        &self,
        ctx: &mut ExecutionContext,
        handler: &Arc<EventHandlerDecl>,
        owner: Option<String>,
        span: &SourceSpan,
    ) -> Result<(), ScriptLangError> {
        if self.ensure_declarations_allowed(ctx, "event handler", span)? {
            self.register_handler(ctx, handler, owner);
        }
        Ok(())
    }

    pub(super) fn declare_content(
        &self,
        ctx: &mut ExecutionContext,
        decl: &Arc<Declaration>,
        span: &SourceSpan,
    ) -> Result<(), ScriptLangError> {
        if ctx.mode() == ExecMode::Materialize {
            let value = self.materialize_body(ctx, &decl.body)?;
            ctx.set_property(&decl.name, value);
            return Ok(());
        }
        if !self.ensure_declarations_allowed(ctx, decl.kind.label(), span)? {
            return Ok(());
        }

        let previous = self.declarations.register(DeclarationEntry {
            script_id: ctx.script_id().to_string(),
            declaration: Arc::clone(decl),
            unit: Arc::clone(ctx.unit()),
        });
        if let Some(previous) = previous {
            if previous.script_id != ctx.script_id() {
                tracing::warn!(
                    target: "scripting",
                    kind = decl.kind.label(),
                    name = %decl.name,
                    previous = %previous.script_id,
                    script = ctx.script_id(),
                    "declaration taken over by another script"
                );
                ctx.record_displaced(previous);
            }
        }
        self.register_nested(ctx, decl);
        Ok(())
    }

    /// Installs the handlers found in a declaration body, descending into
    /// nested nodes. Functions were already hoisted at load.
    fn register_nested(&self, ctx: &ExecutionContext, decl: &Declaration) {
        let owner = format!("{}:{}", decl.kind.label(), decl.name);
        for stmt in &decl.body.statements {
            match &stmt.kind {
                StmtKind::EventHandler(handler) => {
                    self.register_handler(ctx, handler, Some(owner.clone()));
                }
                StmtKind::Declaration(nested) => self.register_nested(ctx, nested),
                _ => {}
            }
        }
    }

    fn register_handler(
        &self,
        ctx: &ExecutionContext,
        handler: &Arc<EventHandlerDecl>,
        owner: Option<String>,
    ) {
        self.events.register(HandlerRegistration {
            event_type: handler.event.clone(),
            script_id: ctx.script_id().to_string(),
            owner,
            handler: Arc::clone(handler),
            unit: Arc::clone(ctx.unit()),
        });
    }

    /// Evaluates a registered declaration body into an object of its
    /// properties. Nested declarations become nested objects.
    pub fn materialize(&self, kind: DeclarationKind, name: &str) -> Result<Value, ScriptLangError> {
        let Some(entry) = self.declarations.get(kind, name) else {
            return Err(ScriptLangError::new(
                "RUNTIME_UNKNOWN_DECLARATION",
                format!("No {} named \"{}\" is registered.", kind.label(), name),
            ));
        };

        let mut ctx = ExecutionContext::for_unit(Arc::clone(&entry.unit), ExecMode::Materialize);
        for (key, value) in entry.unit.globals() {
            ctx.declare_global(&key, value);
        }
        self.materialize_body(&mut ctx, &entry.declaration.body)
            .map_err(|error| ctx.decorate(error))
    }

    fn materialize_body(
        &self,
        ctx: &mut ExecutionContext,
        body: &Block,
    ) -> Result<Value, ScriptLangError> {
        ctx.begin_properties();
        ctx.push_scope();
        let result = self.exec_statements(ctx, &body.statements);
        ctx.pop_scope();
        let properties = ctx.end_properties();
        result?;
        Ok(Value::Object(properties))
    }
}

#[cfg(test)]
mod declare_tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use qs_core::{ScriptEvent, Value};
    use qs_parser::DeclarationKind;

    use super::super::runtime_test_support::{interpreter_with, load, load_ok, RecordingBuiltins};
    use super::super::Interpreter;

    #[test]
    fn empty_actor_registers_under_its_kind() {
        let interpreter = Interpreter::default();
        let report = load_ok(&interpreter, "npcs/a", "npc a { }");
        assert_eq!(report.declarations, vec![(DeclarationKind::Actor, "a".to_string())]);
        assert_eq!(report.handlers, 0);
        assert!(interpreter.declarations().contains(DeclarationKind::Actor, "a"));
    }

    #[test]
    fn materialize_builds_nested_objects() {
        let interpreter = Interpreter::default();
        load_ok(
            &interpreter,
            "dialogue/intro",
            r#"
var greeting = "Hello";
dialogue intro {
    speaker: "guard";
    node start {
        text: greeting + ", traveller";
        var reward = 5;
        gold: reward * 2;
    }
    node leave { text: "Bye"; }
}
"#,
        );
        let value = interpreter
            .materialize(DeclarationKind::Dialogue, "intro")
            .expect("dialogue materializes");
        assert_eq!(value.member("speaker"), Value::from("guard"));
        assert_eq!(
            value.member("start").member("text"),
            Value::from("Hello, traveller")
        );
        assert_eq!(value.member("start").member("gold"), Value::from(10_i64));
        assert_eq!(value.member("leave").member("text"), Value::from("Bye"));

        let error = interpreter
            .materialize(DeclarationKind::Quest, "intro")
            .expect_err("no quest named intro");
        assert_eq!(error.code, "RUNTIME_UNKNOWN_DECLARATION");
    }

    #[test]
    fn handlers_inside_declarations_know_their_owner() {
        let interpreter = Interpreter::default();
        let report = load_ok(
            &interpreter,
            "guard",
            r#"
on tick { }
actor guard {
    on player.near { }
    node alert { on alarm { } }
}
"#,
        );
        assert_eq!(report.handlers, 3);
        let owners = |event: &str| {
            interpreter
                .events()
                .handlers_for(event)
                .iter()
                .map(|registration| registration.owner.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(owners("tick"), vec![None]);
        assert_eq!(owners("player.near"), vec![Some("actor:guard".to_string())]);
        assert_eq!(owners("alarm"), vec![Some("node:alert".to_string())]);
    }

    #[test]
    fn failed_load_drops_partial_registrations() {
        let interpreter = Interpreter::default();
        let error = load(
            &interpreter,
            "half",
            "on start { } quest q { } var x = undefined_thing;",
        )
        .expect_err("load fails");
        assert_eq!(error.code, "RUNTIME_UNDEFINED_VARIABLE");
        assert_eq!(interpreter.events().count_for_script("half"), 0);
        assert!(interpreter.declarations().for_script("half").is_empty());
    }

    #[test]
    fn failed_load_gives_back_declarations_it_took_over() {
        let interpreter = Interpreter::default();
        load_ok(&interpreter, "b", "quest q { reward: 1; }");

        let error = load(
            &interpreter,
            "c",
            "quest q { reward: 2; } var bad = missing;",
        )
        .expect_err("load fails");
        assert_eq!(error.code, "RUNTIME_UNDEFINED_VARIABLE");

        let entry = interpreter
            .declarations()
            .get(DeclarationKind::Quest, "q")
            .expect("quest q is still registered");
        assert_eq!(entry.script_id, "b");
        let quest = interpreter
            .materialize(DeclarationKind::Quest, "q")
            .expect("quest materializes");
        assert_eq!(quest.member("reward"), Value::from(1_i64));
    }

    #[test]
    fn declarations_inside_handlers_are_rejected() {
        let builtins = Arc::new(RecordingBuiltins::new());
        let interpreter = interpreter_with(Arc::clone(&builtins));
        load_ok(&interpreter, "nested", "on start { on later { } }");
        let report = interpreter.fire_event(ScriptEvent::new("start"));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].error.code, "RUNTIME_NESTED_DECLARATION");
        assert_eq!(interpreter.events().handler_count(), 1);
    }
}
