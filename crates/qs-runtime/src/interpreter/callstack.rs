use std::sync::Arc;

use qs_core::{ScriptLangError, SourceSpan, Value};
use qs_parser::{Expr, ExprKind, FunctionDecl};

use super::{Flow, Interpreter};
use crate::builtins::{expect_arity, unknown_builtin, BuiltinCall};
use crate::context::{CallFrame, ExecMode, ExecutionContext};
use crate::unit::ScriptUnit;

/// Functions the interpreter answers itself, before the host table.
const INTRINSICS: &[&str] = &[
    "len",
    "str",
    "num",
    "keys",
    "push",
    "type_of",
    "log",
    "cancel",
    "actor",
    "get_var",
    "set_var",
    "get_global",
    "set_global",
];

impl Interpreter {
    pub(super) fn eval_call(
        &self,
        ctx: &mut ExecutionContext,
        callee: &Expr,
        args: &[Expr],
        span: &SourceSpan,
    ) -> Result<Value, ScriptLangError> {
        let Some(name) = callee_name(callee) else {
            return Err(ScriptLangError::with_span(
                "RUNTIME_NOT_CALLABLE",
                "Only named functions can be called.",
                callee.span.clone(),
            ));
        };

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(ctx, arg)?);
        }

        if let Some(function) = ctx.unit().function(&name) {
            return self.call_function(ctx, &function, values, span);
        }
        if INTRINSICS.contains(&name.as_str()) {
            return self.call_intrinsic(ctx, &name, &values);
        }
        if self.builtins.names().iter().any(|known| *known == name) {
            let call = BuiltinCall {
                script_id: ctx.script_id(),
                actor: ctx.actor(),
            };
            return self.builtins.call(&name, &values, &call);
        }
        Err(unknown_builtin(&name))
    }

    pub(super) fn call_function(
        &self,
        ctx: &mut ExecutionContext,
        function: &Arc<FunctionDecl>,
        args: Vec<Value>,
        call_site: &SourceSpan,
    ) -> Result<Value, ScriptLangError> {
        if ctx.call_stack().depth() >= self.max_call_depth {
            return Err(ctx.decorate(ScriptLangError::with_span(
                "RUNTIME_STACK_OVERFLOW",
                format!(
                    "Call depth exceeded {} while calling \"{}\".",
                    self.max_call_depth, function.name
                ),
                call_site.clone(),
            )));
        }

        ctx.push_call_scope(CallFrame {
            function: function.name.clone(),
            call_site: call_site.clone(),
            script_id: ctx.script_id().to_string(),
        });
        let mut args = args.into_iter();
        for param in &function.params {
            ctx.declare(param, args.next().unwrap_or_default());
        }

        let result = self
            .exec_statements(ctx, &function.body.statements)
            .map_err(|error| ctx.decorate(error));
        ctx.pop_call_scope();

        Ok(match result? {
            Flow::Return(value) => value,
            Flow::Normal(_) => Value::Null,
        })
    }

    /// Calls a script function from the host. Script globals are seeded
    /// into the call and written back when it succeeds.
    pub fn invoke_function(
        &self,
        unit: &Arc<ScriptUnit>,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, ScriptLangError> {
        let Some(function) = unit.function(name) else {
            return Err(unknown_builtin(name).in_script(unit.script_id()));
        };
        let mut ctx = ExecutionContext::for_unit(Arc::clone(unit), ExecMode::Handler);
        for (key, value) in unit.globals() {
            ctx.declare_global(&key, value);
        }
        let span = function.span.clone();
        let value = self
            .call_function(&mut ctx, &function, args, &span)
            .map_err(|error| ctx.decorate(error))?;
        unit.merge_globals(ctx.globals());
        Ok(value)
    }

    fn call_intrinsic(
        &self,
        ctx: &mut ExecutionContext,
        name: &str,
        args: &[Value],
    ) -> Result<Value, ScriptLangError> {
        match name {
            "len" => {
                expect_arity(name, args, 1, 1)?;
                match &args[0] {
                    Value::Array(items) => Ok(Value::Number(items.len() as f64)),
                    Value::Object(entries) => Ok(Value::Number(entries.len() as f64)),
                    Value::String(text) => Ok(Value::Number(text.chars().count() as f64)),
                    Value::Null => Ok(Value::Number(0.0)),
                    other => Err(ScriptLangError::new(
                        "RUNTIME_TYPE_MISMATCH",
                        format!("len() does not accept a {}.", other.type_name()),
                    )),
                }
            }
            "str" => {
                expect_arity(name, args, 1, 1)?;
                Ok(Value::String(args[0].to_string()))
            }
            "num" => {
                expect_arity(name, args, 1, 1)?;
                Ok(match &args[0] {
                    Value::Number(number) => Value::Number(*number),
                    Value::Bool(flag) => Value::Number(if *flag { 1.0 } else { 0.0 }),
                    Value::String(text) => text
                        .trim()
                        .parse::<f64>()
                        .map(Value::Number)
                        .unwrap_or_default(),
                    _ => Value::Null,
                })
            }
            "keys" => {
                expect_arity(name, args, 1, 1)?;
                let Some(entries) = args[0].as_object() else {
                    return Err(ScriptLangError::new(
                        "RUNTIME_TYPE_MISMATCH",
                        format!("keys() needs an object, got {}.", args[0].type_name()),
                    ));
                };
                Ok(Value::Array(
                    entries.keys().cloned().map(Value::String).collect(),
                ))
            }
            "push" => {
                expect_arity(name, args, 2, 2)?;
                let Value::Array(items) = &args[0] else {
                    return Err(ScriptLangError::new(
                        "RUNTIME_TYPE_MISMATCH",
                        format!("push() needs an array, got {}.", args[0].type_name()),
                    ));
                };
                let mut items = items.clone();
                items.push(args[1].clone());
                Ok(Value::Array(items))
            }
            "type_of" => {
                expect_arity(name, args, 1, 1)?;
                Ok(Value::from(args[0].type_name()))
            }
            "log" => {
                let line = args
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                tracing::info!(target: "scripting", script = ctx.script_id(), "{}", line);
                Ok(Value::Null)
            }
            "cancel" => {
                expect_arity(name, args, 0, 0)?;
                match ctx.binding_mut("event", &SourceSpan::synthetic()) {
                    Ok(Value::Object(event)) => {
                        event.insert("cancelled".to_string(), Value::Bool(true));
                        Ok(Value::Null)
                    }
                    _ => Err(ScriptLangError::new(
                        "RUNTIME_NO_EVENT",
                        "cancel() can only be called while handling an event.",
                    )),
                }
            }
            "actor" => {
                expect_arity(name, args, 0, 0)?;
                Ok(ctx.actor().map(Value::from).unwrap_or_default())
            }
            "get_var" | "get_global" => {
                expect_arity(name, args, 1, 2)?;
                let key = variable_name(name, &args[0])?;
                let owner = if name == "get_var" { ctx.actor() } else { None };
                Ok(self
                    .variables
                    .get(owner, key)
                    .or_else(|| args.get(1).cloned())
                    .unwrap_or_default())
            }
            "set_var" | "set_global" => {
                expect_arity(name, args, 2, 2)?;
                let key = variable_name(name, &args[0])?;
                let owner = if name == "set_var" { ctx.actor() } else { None };
                self.variables.set(owner, key, args[1].clone());
                Ok(args[1].clone())
            }
            _ => Err(unknown_builtin(name)),
        }
    }
}

/// `greet` or a dotted path such as `ui.show`.
fn callee_name(callee: &Expr) -> Option<String> {
    match &callee.kind {
        ExprKind::Identifier(name) => Some(name.clone()),
        ExprKind::Member { object, property } => {
            callee_name(object).map(|prefix| format!("{}.{}", prefix, property))
        }
        _ => None,
    }
}

fn variable_name<'a>(function: &str, value: &'a Value) -> Result<&'a str, ScriptLangError> {
    value.as_string().ok_or_else(|| {
        ScriptLangError::new(
            "RUNTIME_TYPE_MISMATCH",
            format!(
                "{}() needs a string name, got {}.",
                function,
                value.type_name()
            ),
        )
    })
}
