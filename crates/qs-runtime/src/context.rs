use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use qs_core::{ScriptLangError, SourceSpan, Value};

use crate::registry::DeclarationEntry;
use crate::scope::{ScopeArena, ScopeId};
use crate::unit::ScriptUnit;

/// What an execution context was created for. Decides how declaration and
/// property statements behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// First run of a script: declarations register themselves.
    Load,
    /// An event handler invocation.
    Handler,
    /// A content declaration body evaluated into an object.
    Materialize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    pub function: String,
    pub call_site: SourceSpan,
    pub script_id: String,
}

impl fmt::Display for CallFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}:{})",
            self.function, self.script_id, self.call_site.start
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallStack {
    frames: Vec<CallFrame>,
}

impl CallStack {
    pub fn push(&mut self, frame: CallFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<CallFrame> {
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    /// Innermost frame first.
    pub fn render(&self) -> Vec<String> {
        self.frames.iter().rev().map(ToString::to_string).collect()
    }
}

/// Mutable state of one top-level run, handler invocation or
/// materialization. Dropped when that execution completes.
#[derive(Debug)]
pub struct ExecutionContext {
    scopes: ScopeArena,
    active: Vec<ScopeId>,
    call_stack: CallStack,
    unit: Arc<ScriptUnit>,
    actor: Option<String>,
    mode: ExecMode,
    properties: Vec<BTreeMap<String, Value>>,
    displaced: Vec<DeclarationEntry>,
}

impl ExecutionContext {
    pub fn new(script_id: impl Into<String>, mode: ExecMode) -> Self {
        Self::for_unit(Arc::new(ScriptUnit::new(script_id)), mode)
    }

    pub fn for_unit(unit: Arc<ScriptUnit>, mode: ExecMode) -> Self {
        Self {
            scopes: ScopeArena::new(),
            active: vec![ScopeId::GLOBAL],
            call_stack: CallStack::default(),
            unit,
            actor: None,
            mode,
            properties: Vec::new(),
            displaced: Vec::new(),
        }
    }

    pub fn with_actor(mut self, actor: Option<String>) -> Self {
        self.actor = actor;
        self
    }

    pub fn script_id(&self) -> &str {
        self.unit.script_id()
    }

    pub fn unit(&self) -> &Arc<ScriptUnit> {
        &self.unit
    }

    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    pub fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    pub fn current_scope(&self) -> ScopeId {
        self.active.last().copied().unwrap_or(ScopeId::GLOBAL)
    }

    pub fn scope_depth(&self) -> usize {
        self.active.len()
    }

    /// Opens a block scope nested in the current one.
    pub fn push_scope(&mut self) -> ScopeId {
        let id = self.scopes.push(self.current_scope());
        self.active.push(id);
        id
    }

    /// Opens a function-call scope. Functions see script globals, never the
    /// caller's locals.
    pub fn push_call_scope(&mut self, frame: CallFrame) -> ScopeId {
        let id = self.scopes.push(ScopeId::GLOBAL);
        self.active.push(id);
        self.call_stack.push(frame);
        id
    }

    pub fn pop_scope(&mut self) {
        if self.active.len() > 1 {
            if let Some(id) = self.active.pop() {
                self.scopes.pop(id);
            }
        }
    }

    pub fn pop_call_scope(&mut self) {
        self.pop_scope();
        self.call_stack.pop();
    }

    pub fn declare(&mut self, name: &str, value: Value) {
        let scope = self.current_scope();
        self.scopes.declare(scope, name, value);
    }

    pub fn declare_global(&mut self, name: &str, value: Value) {
        self.scopes.declare(ScopeId::GLOBAL, name, value);
    }

    pub fn lookup(&self, name: &str, span: &SourceSpan) -> Result<Value, ScriptLangError> {
        self.scopes
            .lookup(self.current_scope(), name)
            .cloned()
            .ok_or_else(|| undefined_variable(name, span))
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.scopes.resolve(self.current_scope(), name).is_some()
    }

    pub fn assign(
        &mut self,
        name: &str,
        value: Value,
        span: &SourceSpan,
    ) -> Result<(), ScriptLangError> {
        let scope = self.current_scope();
        if self.scopes.assign(scope, name, value) {
            Ok(())
        } else {
            Err(undefined_variable(name, span))
        }
    }

    pub fn binding_mut(
        &mut self,
        name: &str,
        span: &SourceSpan,
    ) -> Result<&mut Value, ScriptLangError> {
        let scope = self.current_scope();
        self.scopes
            .lookup_mut(scope, name)
            .ok_or_else(|| undefined_variable(name, span))
    }

    pub fn globals(&self) -> BTreeMap<String, Value> {
        self.scopes
            .bindings(ScopeId::GLOBAL)
            .cloned()
            .unwrap_or_default()
    }

    pub fn visible_bindings(&self) -> BTreeMap<String, Value> {
        self.scopes.visible(self.current_scope())
    }

    /// Keeps another script's declaration that this load replaced, so a
    /// failed load can put it back.
    pub fn record_displaced(&mut self, entry: DeclarationEntry) {
        self.displaced.push(entry);
    }

    pub fn take_displaced(&mut self) -> Vec<DeclarationEntry> {
        std::mem::take(&mut self.displaced)
    }

    pub fn begin_properties(&mut self) {
        self.properties.push(BTreeMap::new());
    }

    pub fn end_properties(&mut self) -> BTreeMap<String, Value> {
        self.properties.pop().unwrap_or_default()
    }

    /// Returns false when no content declaration is being materialized.
    pub fn set_property(&mut self, name: &str, value: Value) -> bool {
        match self.properties.last_mut() {
            Some(target) => {
                target.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Attaches script identity and the current call stack to an error.
    pub fn decorate(&self, error: ScriptLangError) -> ScriptLangError {
        error
            .in_script(self.unit.script_id())
            .with_trace(self.call_stack.render())
    }
}

fn undefined_variable(name: &str, span: &SourceSpan) -> ScriptLangError {
    ScriptLangError::with_span(
        "RUNTIME_UNDEFINED_VARIABLE",
        format!("Variable \"{}\" is not defined.", name),
        span.clone(),
    )
}

#[cfg(test)]
mod context_tests {
    use super::*;

    fn span() -> SourceSpan {
        SourceSpan::point(1, 1)
    }

    #[test]
    fn block_scopes_see_outer_bindings_and_forget_their_own() {
        let mut ctx = ExecutionContext::new("test", ExecMode::Handler);
        ctx.declare("outer", Value::from(1_i64));

        ctx.push_scope();
        ctx.declare("inner", Value::from(2_i64));
        ctx.assign("outer", Value::from(7_i64), &span())
            .expect("outer should be assignable");
        assert_eq!(ctx.lookup("inner", &span()), Ok(Value::from(2_i64)));
        ctx.pop_scope();

        assert_eq!(ctx.lookup("outer", &span()), Ok(Value::from(7_i64)));
        let error = ctx.lookup("inner", &span()).expect_err("inner is gone");
        assert_eq!(error.code, "RUNTIME_UNDEFINED_VARIABLE");
        let error = ctx
            .assign("never", Value::Null, &span())
            .expect_err("undeclared assignment");
        assert_eq!(error.code, "RUNTIME_UNDEFINED_VARIABLE");
    }

    #[test]
    fn call_scopes_hide_caller_locals_and_track_frames() {
        let mut ctx = ExecutionContext::new("quests/intro", ExecMode::Handler);
        ctx.declare_global("shared", Value::Bool(true));
        ctx.push_scope();
        ctx.declare("local", Value::Null);

        ctx.push_call_scope(CallFrame {
            function: "greet".to_string(),
            call_site: SourceSpan::point(4, 2),
            script_id: "quests/intro".to_string(),
        });
        assert!(ctx.is_defined("shared"));
        assert!(!ctx.is_defined("local"));
        assert_eq!(ctx.call_stack().render(), vec!["greet (quests/intro:4:2)"]);

        let error = ctx.decorate(ScriptLangError::new("E", "boom"));
        assert_eq!(error.script.as_deref(), Some("quests/intro"));
        assert_eq!(error.trace.len(), 1);

        ctx.pop_call_scope();
        assert!(ctx.is_defined("local"));
        assert_eq!(ctx.call_stack().depth(), 0);
    }

    #[test]
    fn global_scope_is_never_popped() {
        let mut ctx = ExecutionContext::new("test", ExecMode::Load);
        ctx.declare("x", Value::from(1_i64));
        ctx.pop_scope();
        assert_eq!(ctx.scope_depth(), 1);
        assert_eq!(ctx.globals().get("x"), Some(&Value::from(1_i64)));
    }

    #[test]
    fn properties_collect_into_the_innermost_target() {
        let mut ctx = ExecutionContext::new("test", ExecMode::Materialize);
        assert!(!ctx.set_property("name", Value::from("x")));
        ctx.begin_properties();
        assert!(ctx.set_property("name", Value::from("x")));
        let props = ctx.end_properties();
        assert_eq!(props.get("name"), Some(&Value::from("x")));
    }
}
