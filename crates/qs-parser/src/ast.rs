use std::sync::Arc;

use qs_core::SourceSpan;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Var {
        name: String,
        value: Expr,
    },
    Function(Arc<FunctionDecl>),
    Declaration(Arc<Declaration>),
    EventHandler(Arc<EventHandlerDecl>),
    Block(Block),
    If {
        condition: Expr,
        then_branch: Block,
        /// Either a `Block` or a chained `If` statement.
        else_branch: Option<Box<Stmt>>,
    },
    ForIn {
        variable: String,
        iterable: Expr,
        body: Block,
    },
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        update: Option<Expr>,
        body: Block,
    },
    While {
        condition: Expr,
        body: Block,
    },
    Return(Option<Expr>),
    Property {
        name: String,
        value: Expr,
    },
    Expression(Expr),
    ForeignCode(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeclarationKind {
    Actor,
    Dialogue,
    Quest,
    Node,
}

impl DeclarationKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Actor => "actor",
            Self::Dialogue => "dialogue",
            Self::Quest => "quest",
            Self::Node => "node",
        }
    }
}

/// A named content block: actors, dialogues, quests and dialogue nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub kind: DeclarationKind,
    /// The introducing word as written (`npc`, `actor`, ...).
    pub keyword: String,
    pub name: String,
    pub body: Block,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventHandlerDecl {
    pub event: String,
    pub body: Block,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Identifier(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
        }
    }

    /// Binding strength, higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Equal | Self::NotEqual => 3,
            Self::Less | Self::LessEqual | Self::Greater | Self::GreaterEqual => 4,
            Self::Add | Self::Subtract => 5,
            Self::Multiply | Self::Divide | Self::Modulo => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Not => "!",
            Self::Negate => "-",
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind, span: SourceSpan) -> Self {
        Self { kind, span }
    }

    /// Name at the root of an assignable path (`a`, `a.b`, `a[0].c`).
    pub fn assignment_root(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            ExprKind::Member { object, .. } | ExprKind::Index { object, .. } => {
                object.assignment_root()
            }
            _ => None,
        }
    }
}

impl Stmt {
    pub fn new(kind: StmtKind, span: SourceSpan) -> Self {
        Self { kind, span }
    }

    /// Short label used in diagnostics and shape comparisons.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            StmtKind::Var { .. } => "var",
            StmtKind::Function(_) => "function",
            StmtKind::Declaration(decl) => decl.kind.label(),
            StmtKind::EventHandler(_) => "on",
            StmtKind::Block(_) => "block",
            StmtKind::If { .. } => "if",
            StmtKind::ForIn { .. } => "for-in",
            StmtKind::For { .. } => "for",
            StmtKind::While { .. } => "while",
            StmtKind::Return(_) => "return",
            StmtKind::Property { .. } => "property",
            StmtKind::Expression(_) => "expression",
            StmtKind::ForeignCode(_) => "foreign",
        }
    }

    pub fn is_declaration(&self) -> bool {
        matches!(
            self.kind,
            StmtKind::Var { .. }
                | StmtKind::Function(_)
                | StmtKind::Declaration(_)
                | StmtKind::EventHandler(_)
        )
    }
}
