use qs_core::{ScriptLangError, SourceSpan, Value};
use qs_parser::{Block, Stmt, StmtKind};

use super::{Flow, Interpreter};
use crate::context::{ExecMode, ExecutionContext};

impl Interpreter {
    pub(crate) fn exec_block(
        &self,
        ctx: &mut ExecutionContext,
        block: &Block,
    ) -> Result<Flow, ScriptLangError> {
        ctx.push_scope();
        let flow = self.exec_statements(ctx, &block.statements);
        ctx.pop_scope();
        flow
    }

    pub(crate) fn exec_statements(
        &self,
        ctx: &mut ExecutionContext,
        statements: &[Stmt],
    ) -> Result<Flow, ScriptLangError> {
        let mut last = Value::Null;
        for stmt in statements {
            match self.exec_stmt(ctx, stmt)? {
                Flow::Normal(value) => last = value,
                Flow::Return(value) => return Ok(Flow::Return(value)),
            }
        }
        Ok(Flow::Normal(last))
    }

    pub(crate) fn exec_stmt(
        &self,
        ctx: &mut ExecutionContext,
        stmt: &Stmt,
    ) -> Result<Flow, ScriptLangError> {
        self.exec_stmt_kind(ctx, stmt)
            .map_err(|error| error.at(&stmt.span))
    }

    fn exec_stmt_kind(
        &self,
        ctx: &mut ExecutionContext,
        stmt: &Stmt,
    ) -> Result<Flow, ScriptLangError> {
        match &stmt.kind {
            StmtKind::Var { name, value } => {
                let value = self.eval(ctx, value)?;
                ctx.declare(name, value);
                Ok(Flow::Normal(Value::Null))
            }
            StmtKind::Function(function) => {
                self.declare_function(ctx, function, &stmt.span)?;
                Ok(Flow::Normal(Value::Null))
            }
            StmtKind::Declaration(decl) => {
                self.declare_content(ctx, decl, &stmt.span)?;
                Ok(Flow::Normal(Value::Null))
            }
            StmtKind::EventHandler(handler) => {
                self.declare_handler(ctx, handler, None, &stmt.span)?;
                Ok(Flow::Normal(Value::Null))
            }
            StmtKind::Block(block) => self.exec_block(ctx, block),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.exec_if(ctx, condition, then_branch, else_branch.as_deref()),
            StmtKind::ForIn {
                variable,
                iterable,
                body,
            } => self.exec_for_in(ctx, variable, iterable, body),
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => self.exec_for(
                ctx,
                init.as_deref(),
                condition.as_ref(),
                update.as_ref(),
                body,
            ),
            StmtKind::While { condition, body } => self.exec_while(ctx, condition, body),
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(ctx, expr)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            StmtKind::Property { name, value } => {
                let value = self.eval(ctx, value)?;
                if !ctx.set_property(name, value) {
                    return Err(ScriptLangError::with_span(
                        "RUNTIME_PROPERTY_OUTSIDE_DECLARATION",
                        format!(
                            "Property \"{}\" can only be set inside a content declaration.",
                            name
                        ),
                        stmt.span.clone(),
                    ));
                }
                Ok(Flow::Normal(Value::Null))
            }
            StmtKind::Expression(expr) => Ok(Flow::Normal(self.eval(ctx, expr)?)),
            StmtKind::ForeignCode(code) => self
                .exec_foreign(ctx, code, &stmt.span)
                .map(Flow::Normal),
        }
    }

    /// Runs a foreign block through the native extension with every visible
    /// binding in view, then writes changed bindings back.
    fn exec_foreign(
        &self,
        ctx: &mut ExecutionContext,
        code: &str,
        span: &SourceSpan,
    ) -> Result<Value, ScriptLangError> {
        let Some(native) = &self.native else {
            return Err(ScriptLangError::with_span(
                "NATIVE_UNAVAILABLE",
                "Foreign code blocks are disabled in this runtime.",
                span.clone(),
            ));
        };

        let before = ctx.visible_bindings();
        let mut bindings = before.clone();
        let result = native.execute(code, &mut bindings).map_err(|error| {
            tracing::warn!(
                target: "scripting",
                script = ctx.script_id(),
                extension = native.name(),
                line = span.start.line,
                "foreign block failed: {}",
                error.message
            );
            error
        })?;

        for (name, value) in bindings {
            if before.get(&name) != Some(&value) {
                ctx.assign(&name, value, span)?;
            }
        }
        Ok(result)
    }

    pub(super) fn ensure_declarations_allowed(
        &self,
        ctx: &ExecutionContext,
        what: &str,
        span: &SourceSpan,
    ) -> Result<bool, ScriptLangError> {
        match ctx.mode() {
            ExecMode::Load if ctx.call_stack().is_empty() => Ok(true),
            ExecMode::Materialize => Ok(false),
            _ => Err(ScriptLangError::with_span(
                "RUNTIME_NESTED_DECLARATION",
                format!(
                    "A {} can only be declared at script level or inside a content block.",
                    what
                ),
                span.clone(),
            )),
        }
    }
}
