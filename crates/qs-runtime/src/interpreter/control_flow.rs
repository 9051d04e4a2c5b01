use qs_core::{ScriptLangError, Value};
use qs_parser::{Block, Expr, Stmt};

use super::Interpreter;
use crate::context::ExecutionContext;

/// Outcome of executing a statement. `Return` unwinds to the nearest
/// function-call boundary; errors travel separately in the `Result`.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Carries the value of the last expression statement, if any.
    Normal(Value),
    Return(Value),
}

impl Flow {
    pub fn into_value(self) -> Value {
        match self {
            Flow::Normal(value) | Flow::Return(value) => value,
        }
    }
}

impl Interpreter {
    pub(super) fn exec_if(
        &self,
        ctx: &mut ExecutionContext,
        condition: &Expr,
        then_branch: &Block,
        else_branch: Option<&Stmt>,
    ) -> Result<Flow, ScriptLangError> {
        if self.eval(ctx, condition)?.is_truthy() {
            return self.exec_block(ctx, then_branch);
        }
        match else_branch {
            Some(stmt) => self.exec_stmt(ctx, stmt),
            None => Ok(Flow::Normal(Value::Null)),
        }
    }

    pub(super) fn exec_for_in(
        &self,
        ctx: &mut ExecutionContext,
        variable: &str,
        iterable: &Expr,
        body: &Block,
    ) -> Result<Flow, ScriptLangError> {
        let items = match self.eval(ctx, iterable)? {
            Value::Array(items) => items,
            Value::Object(entries) => entries.into_keys().map(Value::String).collect(),
            Value::String(text) => text.chars().map(|ch| Value::String(ch.to_string())).collect(),
            other => {
                return Err(ScriptLangError::with_span(
                    "RUNTIME_NOT_ITERABLE",
                    format!("Cannot iterate over a {}.", other.type_name()),
                    iterable.span.clone(),
                ))
            }
        };

        for item in items {
            ctx.push_scope();
            ctx.declare(variable, item);
            let flow = self.exec_statements(ctx, &body.statements);
            ctx.pop_scope();
            if let Flow::Return(value) = flow? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal(Value::Null))
    }

    pub(super) fn exec_for(
        &self,
        ctx: &mut ExecutionContext,
        init: Option<&Stmt>,
        condition: Option<&Expr>,
        update: Option<&Expr>,
        body: &Block,
    ) -> Result<Flow, ScriptLangError> {
        ctx.push_scope();
        let flow = self.run_for(ctx, init, condition, update, body);
        ctx.pop_scope();
        flow
    }

    fn run_for(
        &self,
        ctx: &mut ExecutionContext,
        init: Option<&Stmt>,
        condition: Option<&Expr>,
        update: Option<&Expr>,
        body: &Block,
    ) -> Result<Flow, ScriptLangError> {
        if let Some(init) = init {
            self.exec_stmt(ctx, init)?;
        }
        let mut iterations = 0_u64;
        loop {
            if let Some(condition) = condition {
                if !self.eval(ctx, condition)?.is_truthy() {
                    break;
                }
            }
            self.count_iteration(&mut iterations, body)?;
            if let Flow::Return(value) = self.exec_block(ctx, body)? {
                return Ok(Flow::Return(value));
            }
            if let Some(update) = update {
                self.eval(ctx, update)?;
            }
        }
        Ok(Flow::Normal(Value::Null))
    }

    pub(super) fn exec_while(
        &self,
        ctx: &mut ExecutionContext,
        condition: &Expr,
        body: &Block,
    ) -> Result<Flow, ScriptLangError> {
        let mut iterations = 0_u64;
        while self.eval(ctx, condition)?.is_truthy() {
            self.count_iteration(&mut iterations, body)?;
            if let Flow::Return(value) = self.exec_block(ctx, body)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal(Value::Null))
    }

    fn count_iteration(&self, iterations: &mut u64, body: &Block) -> Result<(), ScriptLangError> {
        *iterations += 1;
        if *iterations > self.max_loop_iterations {
            return Err(ScriptLangError::with_span(
                "RUNTIME_LOOP_LIMIT",
                format!(
                    "Loop exceeded {} iterations.",
                    self.max_loop_iterations
                ),
                body.span.clone(),
            ));
        }
        Ok(())
    }
}
