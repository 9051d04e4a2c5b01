use std::collections::VecDeque;
use std::sync::Arc;

use qs_core::{ScriptLangError, SourceSpan};

use crate::ast::{
    BinaryOp, Block, Declaration, DeclarationKind, EventHandlerDecl, Expr, ExprKind,
    FunctionDecl, Literal, Program, Stmt, StmtKind, UnaryOp,
};
use crate::lexer::Lexer;
use crate::token::{Keyword, Token, TokenKind};

pub fn parse_program(source: &str) -> Result<Program, ScriptLangError> {
    Parser::new(source).parse_program()
}

/// Parses `source` and tags any error with the script identity.
pub fn parse_script(source: &str, script_id: &str) -> Result<Program, ScriptLangError> {
    parse_program(source).map_err(|error| error.in_script(script_id))
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: VecDeque<Token>,
    previous_span: SourceSpan,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            lexer: Lexer::new(source),
            lookahead: VecDeque::new(),
            previous_span: SourceSpan::synthetic(),
        }
    }

    pub fn parse_program(&mut self) -> Result<Program, ScriptLangError> {
        let mut statements = Vec::new();
        while !self.at(&TokenKind::Eof)? {
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> Result<Stmt, ScriptLangError> {
        let first = self.peek_kind(0)?;
        let second = self.peek_kind(1)?;

        match (&first, &second) {
            (TokenKind::Keyword(Keyword::Var), _) if second.as_name().is_some() => {
                self.parse_var_declaration()
            }
            (TokenKind::Keyword(Keyword::Function), _) if second.as_name().is_some() => {
                self.parse_function_declaration()
            }
            (TokenKind::Keyword(keyword), _)
                if declaration_kind(*keyword).is_some() && second.as_name().is_some() =>
            {
                self.parse_content_declaration()
            }
            (TokenKind::Keyword(Keyword::On), _)
                if second.as_name().is_some() || matches!(second, TokenKind::String(_)) =>
            {
                self.parse_event_handler()
            }
            (TokenKind::Keyword(Keyword::If), TokenKind::LParen) => self.parse_if(),
            (TokenKind::Keyword(Keyword::For), TokenKind::LParen) => self.parse_c_style_for(),
            (TokenKind::Keyword(Keyword::For), _) if second.as_name().is_some() => {
                self.parse_for_in()
            }
            (TokenKind::Keyword(Keyword::While), TokenKind::LParen) => self.parse_while(),
            (TokenKind::Keyword(Keyword::Return), _) => self.parse_return(),
            (TokenKind::LBrace, _) => {
                let block = self.parse_block()?;
                let span = block.span.clone();
                Ok(Stmt::new(StmtKind::Block(block), span))
            }
            (TokenKind::ForeignCode(_), _) => self.parse_foreign_code(),
            (_, TokenKind::Colon) if first.as_name().is_some() => self.parse_property(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_var_declaration(&mut self) -> Result<Stmt, ScriptLangError> {
        let start = self.advance()?.span;
        let name = self.expect_name("variable name")?;
        self.expect(&TokenKind::Equal, "'=' after variable name")?;
        let value = self.parse_expression()?;
        self.expect(&TokenKind::Semicolon, "';' after variable declaration")?;
        Ok(Stmt::new(
            StmtKind::Var { name, value },
            start.to(&self.previous_span),
        ))
    }

    fn parse_function_declaration(&mut self) -> Result<Stmt, ScriptLangError> {
        let start = self.advance()?.span;
        let name = self.expect_name("function name")?;
        self.expect(&TokenKind::LParen, "'(' after function name")?;
        let mut params = Vec::new();
        if !self.at(&TokenKind::RParen)? {
            loop {
                params.push(self.expect_name("parameter name")?);
                if !self.eat(&TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')' after parameters")?;
        let body = self.parse_block()?;
        let span = start.to(&self.previous_span);
        Ok(Stmt::new(
            StmtKind::Function(Arc::new(FunctionDecl {
                name,
                params,
                body,
                span: span.clone(),
            })),
            span,
        ))
    }

    fn parse_content_declaration(&mut self) -> Result<Stmt, ScriptLangError> {
        let keyword_token = self.advance()?;
        let TokenKind::Keyword(keyword) = keyword_token.kind else {
            return Err(self.unexpected(&keyword_token, "declaration keyword"));
        };
        let Some(kind) = declaration_kind(keyword) else {
            return Err(self.unexpected(&keyword_token, "declaration keyword"));
        };
        let name = self.expect_name("declaration name")?;
        let body = self.parse_block()?;
        let span = keyword_token.span.to(&self.previous_span);
        Ok(Stmt::new(
            StmtKind::Declaration(Arc::new(Declaration {
                kind,
                keyword: keyword.as_str().to_string(),
                name,
                body,
                span: span.clone(),
            })),
            span,
        ))
    }

    fn parse_event_handler(&mut self) -> Result<Stmt, ScriptLangError> {
        let start = self.advance()?.span;
        let event = match self.peek_kind(0)? {
            TokenKind::String(value) => {
                self.advance()?;
                value
            }
            _ => {
                let mut name = self.expect_name("event name")?;
                while self.eat(&TokenKind::Dot)? {
                    name.push('.');
                    name.push_str(&self.expect_name("event name segment")?);
                }
                name
            }
        };
        let body = self.parse_block()?;
        let span = start.to(&self.previous_span);
        Ok(Stmt::new(
            StmtKind::EventHandler(Arc::new(EventHandlerDecl {
                event,
                body,
                span: span.clone(),
            })),
            span,
        ))
    }

    fn parse_if(&mut self) -> Result<Stmt, ScriptLangError> {
        let start = self.advance()?.span;
        self.expect(&TokenKind::LParen, "'(' after 'if'")?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RParen, "')' after if condition")?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.eat(&TokenKind::Keyword(Keyword::Else))? {
            if self.at(&TokenKind::Keyword(Keyword::If))? {
                Some(Box::new(self.parse_if()?))
            } else {
                let block = self.parse_block()?;
                let span = block.span.clone();
                Some(Box::new(Stmt::new(StmtKind::Block(block), span)))
            }
        } else {
            None
        };
        Ok(Stmt::new(
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            start.to(&self.previous_span),
        ))
    }

    fn parse_for_in(&mut self) -> Result<Stmt, ScriptLangError> {
        let start = self.advance()?.span;
        let variable = self.expect_name("loop variable")?;
        self.expect(&TokenKind::Keyword(Keyword::In), "'in' after loop variable")?;
        let iterable = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(Stmt::new(
            StmtKind::ForIn {
                variable,
                iterable,
                body,
            },
            start.to(&self.previous_span),
        ))
    }

    fn parse_c_style_for(&mut self) -> Result<Stmt, ScriptLangError> {
        let start = self.advance()?.span;
        self.expect(&TokenKind::LParen, "'(' after 'for'")?;

        let init = if self.eat(&TokenKind::Semicolon)? {
            None
        } else if self.at(&TokenKind::Keyword(Keyword::Var))? {
            Some(Box::new(self.parse_var_declaration()?))
        } else {
            Some(Box::new(self.parse_expression_statement()?))
        };

        let condition = if self.at(&TokenKind::Semicolon)? {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon, "';' after loop condition")?;

        let update = if self.at(&TokenKind::RParen)? {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::RParen, "')' after for clauses")?;

        let body = self.parse_block()?;
        Ok(Stmt::new(
            StmtKind::For {
                init,
                condition,
                update,
                body,
            },
            start.to(&self.previous_span),
        ))
    }

    fn parse_while(&mut self) -> Result<Stmt, ScriptLangError> {
        let start = self.advance()?.span;
        self.expect(&TokenKind::LParen, "'(' after 'while'")?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RParen, "')' after while condition")?;
        let body = self.parse_block()?;
        Ok(Stmt::new(
            StmtKind::While { condition, body },
            start.to(&self.previous_span),
        ))
    }

    fn parse_return(&mut self) -> Result<Stmt, ScriptLangError> {
        let start = self.advance()?.span;
        let value = if self.at(&TokenKind::Semicolon)? {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon, "';' after return")?;
        Ok(Stmt::new(
            StmtKind::Return(value),
            start.to(&self.previous_span),
        ))
    }

    fn parse_property(&mut self) -> Result<Stmt, ScriptLangError> {
        let start = self.peek(0)?.span.clone();
        let name = self.expect_name("property name")?;
        self.expect(&TokenKind::Colon, "':' after property name")?;
        let value = self.parse_expression()?;
        // The last property of a block may omit its terminator.
        if !self.at(&TokenKind::RBrace)? {
            self.expect(&TokenKind::Semicolon, "';' after property")?;
        }
        Ok(Stmt::new(
            StmtKind::Property { name, value },
            start.to(&self.previous_span),
        ))
    }

    fn parse_foreign_code(&mut self) -> Result<Stmt, ScriptLangError> {
        let token = self.advance()?;
        let TokenKind::ForeignCode(code) = token.kind else {
            return Err(self.unexpected(&token, "foreign code block"));
        };
        self.eat(&TokenKind::Semicolon)?;
        Ok(Stmt::new(StmtKind::ForeignCode(code), token.span))
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, ScriptLangError> {
        let expr = self.parse_expression()?;
        self.expect(&TokenKind::Semicolon, "';' after expression")?;
        let span = expr.span.to(&self.previous_span);
        Ok(Stmt::new(StmtKind::Expression(expr), span))
    }

    fn parse_block(&mut self) -> Result<Block, ScriptLangError> {
        let start = self.expect(&TokenKind::LBrace, "'{' to open block")?.span;
        let mut statements = Vec::new();
        while !self.at(&TokenKind::RBrace)? {
            if self.at(&TokenKind::Eof)? {
                let token = self.peek(0)?.clone();
                return Err(self.unexpected(&token, "'}' to close block"));
            }
            statements.push(self.parse_statement()?);
        }
        self.advance()?;
        Ok(Block {
            statements,
            span: start.to(&self.previous_span),
        })
    }

    pub fn parse_expression(&mut self) -> Result<Expr, ScriptLangError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, ScriptLangError> {
        let target = self.parse_or()?;
        if !self.at(&TokenKind::Equal)? {
            return Ok(target);
        }
        let equals = self.advance()?;
        if target.assignment_root().is_none() {
            return Err(ScriptLangError::with_span(
                "PARSE_INVALID_ASSIGN_TARGET",
                "Assignment target must be a variable name or a member of one.",
                equals.span,
            ));
        }
        let value = self.parse_assignment()?;
        let span = target.span.to(&value.span);
        Ok(Expr::new(
            ExprKind::Assign {
                target: Box::new(target),
                value: Box::new(value),
            },
            span,
        ))
    }

    fn parse_or(&mut self) -> Result<Expr, ScriptLangError> {
        let mut expr = self.parse_and()?;
        loop {
            let op = match self.peek_kind(0)? {
                TokenKind::PipePipe | TokenKind::Keyword(Keyword::Or) => BinaryOp::Or,
                _ => return Ok(expr),
            };
            self.advance()?;
            let right = self.parse_and()?;
            expr = binary(op, expr, right);
        }
    }

    fn parse_and(&mut self) -> Result<Expr, ScriptLangError> {
        let mut expr = self.parse_equality()?;
        loop {
            let op = match self.peek_kind(0)? {
                TokenKind::AmpAmp | TokenKind::Keyword(Keyword::And) => BinaryOp::And,
                _ => return Ok(expr),
            };
            self.advance()?;
            let right = self.parse_equality()?;
            expr = binary(op, expr, right);
        }
    }

    fn parse_equality(&mut self) -> Result<Expr, ScriptLangError> {
        let mut expr = self.parse_comparison()?;
        loop {
            let op = match self.peek_kind(0)? {
                TokenKind::EqualEqual => BinaryOp::Equal,
                TokenKind::BangEqual => BinaryOp::NotEqual,
                _ => return Ok(expr),
            };
            self.advance()?;
            let right = self.parse_comparison()?;
            expr = binary(op, expr, right);
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ScriptLangError> {
        let mut expr = self.parse_additive()?;
        loop {
            let op = match self.peek_kind(0)? {
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEqual => BinaryOp::LessEqual,
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                _ => return Ok(expr),
            };
            self.advance()?;
            let right = self.parse_additive()?;
            expr = binary(op, expr, right);
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ScriptLangError> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind(0)? {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Subtract,
                _ => return Ok(expr),
            };
            self.advance()?;
            let right = self.parse_multiplicative()?;
            expr = binary(op, expr, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ScriptLangError> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek_kind(0)? {
                TokenKind::Star => BinaryOp::Multiply,
                TokenKind::Slash => BinaryOp::Divide,
                TokenKind::Percent => BinaryOp::Modulo,
                _ => return Ok(expr),
            };
            self.advance()?;
            let right = self.parse_unary()?;
            expr = binary(op, expr, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ScriptLangError> {
        let op = match self.peek_kind(0)? {
            TokenKind::Bang | TokenKind::Keyword(Keyword::Not) => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Negate,
            _ => return self.parse_postfix(),
        };
        let start = self.advance()?.span;
        let operand = self.parse_unary()?;
        let span = start.to(&operand.span);
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn parse_postfix(&mut self) -> Result<Expr, ScriptLangError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind(0)? {
                TokenKind::LParen => {
                    self.advance()?;
                    let mut args = Vec::new();
                    if !self.at(&TokenKind::RParen)? {
                        loop {
                            args.push(self.parse_expression()?);
                            if !self.eat(&TokenKind::Comma)? || self.at(&TokenKind::RParen)? {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RParen, "')' after arguments")?;
                    let span = expr.span.to(&self.previous_span);
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                TokenKind::Dot => {
                    self.advance()?;
                    let property = self.expect_name("member name after '.'")?;
                    let span = expr.span.to(&self.previous_span);
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.advance()?;
                    let index = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket, "']' after index")?;
                    let span = expr.span.to(&self.previous_span);
                    expr = Expr::new(
                        ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ScriptLangError> {
        let token = self.advance()?;
        let span = token.span.clone();
        let kind = match token.kind {
            TokenKind::Number(value) => ExprKind::Literal(Literal::Number(value)),
            TokenKind::String(ref value) => ExprKind::Literal(Literal::String(value.clone())),
            TokenKind::True => ExprKind::Literal(Literal::Bool(true)),
            TokenKind::False => ExprKind::Literal(Literal::Bool(false)),
            TokenKind::Null => ExprKind::Literal(Literal::Null),
            TokenKind::LParen => {
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::RParen, "')' after expression")?;
                return Ok(Expr::new(inner.kind, span.to(&self.previous_span)));
            }
            TokenKind::LBracket => return self.parse_array_literal(span),
            TokenKind::LBrace => return self.parse_object_literal(span),
            ref other => match other.as_name() {
                Some(name) => ExprKind::Identifier(name),
                None => return Err(self.unexpected(&token, "expression")),
            },
        };
        Ok(Expr::new(kind, span))
    }

    fn parse_array_literal(&mut self, start: SourceSpan) -> Result<Expr, ScriptLangError> {
        let mut elements = Vec::new();
        while !self.at(&TokenKind::RBracket)? {
            elements.push(self.parse_expression()?);
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(&TokenKind::RBracket, "']' to close array literal")?;
        Ok(Expr::new(
            ExprKind::Array(elements),
            start.to(&self.previous_span),
        ))
    }

    /// Accepts `{a: 1, b: 2}` as well as `{a: 1; b: 2;}`.
    fn parse_object_literal(&mut self, start: SourceSpan) -> Result<Expr, ScriptLangError> {
        let mut entries = Vec::new();
        while !self.at(&TokenKind::RBrace)? {
            let key_token = self.advance()?;
            let key = match &key_token.kind {
                TokenKind::String(value) => value.clone(),
                other => match other.as_name() {
                    Some(name) => name,
                    None => return Err(self.unexpected(&key_token, "object key")),
                },
            };
            self.expect(&TokenKind::Colon, "':' after object key")?;
            let value = self.parse_expression()?;
            entries.push((key, value));
            if !(self.eat(&TokenKind::Comma)? || self.eat(&TokenKind::Semicolon)?) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "'}' to close object literal")?;
        Ok(Expr::new(
            ExprKind::Object(entries),
            start.to(&self.previous_span),
        ))
    }

    fn expect_name(&mut self, what: &str) -> Result<String, ScriptLangError> {
        let token = self.advance()?;
        match token.kind.as_name() {
            Some(name) => Ok(name),
            None => Err(self.unexpected(&token, what)),
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ScriptLangError> {
        if self.at(kind)? {
            return self.advance();
        }
        let token = self.peek(0)?.clone();
        Err(self.unexpected(&token, what))
    }

    fn unexpected(&self, token: &Token, expected: &str) -> ScriptLangError {
        ScriptLangError::with_span(
            "PARSE_EXPECTED",
            format!("Expected {}, found {}.", expected, token.kind.describe()),
            token.span.clone(),
        )
    }

    fn eat(&mut self, kind: &TokenKind) -> Result<bool, ScriptLangError> {
        if self.at(kind)? {
            self.advance()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn at(&mut self, kind: &TokenKind) -> Result<bool, ScriptLangError> {
        Ok(&self.peek(0)?.kind == kind)
    }

    fn peek_kind(&mut self, n: usize) -> Result<TokenKind, ScriptLangError> {
        Ok(self.peek(n)?.kind.clone())
    }

    fn peek(&mut self, n: usize) -> Result<&Token, ScriptLangError> {
        while self.lookahead.len() <= n {
            if matches!(self.lookahead.back(), Some(token) if token.kind == TokenKind::Eof) {
                break;
            }
            let token = self.lexer.next_token()?;
            self.lookahead.push_back(token);
        }
        let index = n.min(self.lookahead.len() - 1);
        Ok(&self.lookahead[index])
    }

    fn advance(&mut self) -> Result<Token, ScriptLangError> {
        self.peek(0)?;
        let token = match self.lookahead.front() {
            Some(token) if token.kind == TokenKind::Eof => token.clone(),
            _ => self
                .lookahead
                .pop_front()
                .ok_or_else(|| ScriptLangError::new("PARSE_INTERNAL", "Token buffer is empty."))?,
        };
        self.previous_span = token.span.clone();
        Ok(token)
    }
}

fn declaration_kind(keyword: Keyword) -> Option<DeclarationKind> {
    match keyword {
        Keyword::Npc | Keyword::Actor => Some(DeclarationKind::Actor),
        Keyword::Dialogue => Some(DeclarationKind::Dialogue),
        Keyword::Quest => Some(DeclarationKind::Quest),
        Keyword::Node => Some(DeclarationKind::Node),
        _ => None,
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let span = left.span.to(&right.span);
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}
