use std::collections::BTreeSet;
use std::sync::Arc;

use crate::ast::{
    Block, Declaration, EventHandlerDecl, Expr, ExprKind, FunctionDecl, Program,
    Stmt, StmtKind,
};

/// Read-only traversal over the tree. Override a method to intercept a node
/// and call the matching `walk_*` function to keep descending.
pub trait Visitor {
    fn visit_program(&mut self, program: &Program) {
        walk_program(self, program);
    }

    fn visit_block(&mut self, block: &Block) {
        walk_block(self, block);
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }
}

pub fn walk_program<V: Visitor + ?Sized>(visitor: &mut V, program: &Program) {
    for stmt in &program.statements {
        visitor.visit_stmt(stmt);
    }
}

pub fn walk_block<V: Visitor + ?Sized>(visitor: &mut V, block: &Block) {
    for stmt in &block.statements {
        visitor.visit_stmt(stmt);
    }
}

pub fn walk_stmt<V: Visitor + ?Sized>(visitor: &mut V, stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::Var { value, .. } | StmtKind::Property { value, .. } => visitor.visit_expr(value),
        StmtKind::Function(function) => visitor.visit_block(&function.body),
        StmtKind::Declaration(decl) => visitor.visit_block(&decl.body),
        StmtKind::EventHandler(handler) => visitor.visit_block(&handler.body),
        StmtKind::Block(block) => visitor.visit_block(block),
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            visitor.visit_expr(condition);
            visitor.visit_block(then_branch);
            if let Some(else_branch) = else_branch {
                visitor.visit_stmt(else_branch);
            }
        }
        StmtKind::ForIn { iterable, body, .. } => {
            visitor.visit_expr(iterable);
            visitor.visit_block(body);
        }
        StmtKind::For {
            init,
            condition,
            update,
            body,
        } => {
            if let Some(init) = init {
                visitor.visit_stmt(init);
            }
            if let Some(condition) = condition {
                visitor.visit_expr(condition);
            }
            if let Some(update) = update {
                visitor.visit_expr(update);
            }
            visitor.visit_block(body);
        }
        StmtKind::While { condition, body } => {
            visitor.visit_expr(condition);
            visitor.visit_block(body);
        }
        StmtKind::Return(value) => {
            if let Some(value) = value {
                visitor.visit_expr(value);
            }
        }
        StmtKind::Expression(expr) => visitor.visit_expr(expr),
        StmtKind::ForeignCode(_) => {}
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(visitor: &mut V, expr: &Expr) {
    match &expr.kind {
        ExprKind::Literal(_) | ExprKind::Identifier(_) => {}
        ExprKind::Binary { left, right, .. } => {
            visitor.visit_expr(left);
            visitor.visit_expr(right);
        }
        ExprKind::Unary { operand, .. } => visitor.visit_expr(operand),
        ExprKind::Call { callee, args } => {
            visitor.visit_expr(callee);
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        ExprKind::Member { object, .. } => visitor.visit_expr(object),
        ExprKind::Index { object, index } => {
            visitor.visit_expr(object);
            visitor.visit_expr(index);
        }
        ExprKind::Assign { target, value } => {
            visitor.visit_expr(target);
            visitor.visit_expr(value);
        }
        ExprKind::Array(elements) => {
            for element in elements {
                visitor.visit_expr(element);
            }
        }
        ExprKind::Object(entries) => {
            for (_, value) in entries {
                visitor.visit_expr(value);
            }
        }
    }
}

/// A declaration found in the tree together with the content block that
/// encloses it, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Owned<T> {
    pub item: Arc<T>,
    /// `kind:name` of the innermost enclosing content declaration.
    pub owner: Option<String>,
}

/// Everything a script contributes at load time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclarationSummary {
    pub variables: Vec<String>,
    pub functions: Vec<Owned<FunctionDecl>>,
    pub handlers: Vec<Owned<EventHandlerDecl>>,
    /// Top-level content declarations. Nested nodes stay inside their parent.
    pub declarations: Vec<Arc<Declaration>>,
    pub foreign_blocks: usize,
}

impl DeclarationSummary {
    pub fn event_types(&self) -> BTreeSet<&str> {
        self.handlers
            .iter()
            .map(|handler| handler.item.event.as_str())
            .collect()
    }
}

/// Collects the load-time surface of a program. Content declaration bodies
/// are searched for handlers and functions; function and handler bodies are
/// not, since their contents only exist while they run.
pub fn collect_declarations(program: &Program) -> DeclarationSummary {
    let mut collector = DeclarationCollector {
        summary: DeclarationSummary::default(),
        owners: Vec::new(),
        depth: 0,
    };
    collector.visit_program(program);
    collector.summary
}

struct DeclarationCollector {
    summary: DeclarationSummary,
    owners: Vec<String>,
    depth: usize,
}

impl Visitor for DeclarationCollector {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Var { name, .. } if self.depth == 0 => {
                self.summary.variables.push(name.clone());
            }
            StmtKind::Function(function) => self.summary.functions.push(Owned {
                item: Arc::clone(function),
                owner: self.owners.last().cloned(),
            }),
            StmtKind::EventHandler(handler) => self.summary.handlers.push(Owned {
                item: Arc::clone(handler),
                owner: self.owners.last().cloned(),
            }),
            StmtKind::Declaration(decl) => {
                if self.depth == 0 {
                    self.summary.declarations.push(Arc::clone(decl));
                }
                self.owners
                    .push(format!("{}:{}", decl.kind.label(), decl.name));
                self.depth += 1;
                walk_block(self, &decl.body);
                self.depth -= 1;
                self.owners.pop();
            }
            StmtKind::ForeignCode(_) => self.summary.foreign_blocks += 1,
            _ => {}
        }
    }
}
