use crate::ast::{Block, Expr, ExprKind, Literal, Program, Stmt, StmtKind};
use crate::lexer::{FOREIGN_CLOSE, FOREIGN_OPEN};
use crate::token::Keyword;

const INDENT: &str = "    ";

const PREC_ASSIGN: u8 = 0;
const PREC_UNARY: u8 = 7;
const PREC_POSTFIX: u8 = 8;

/// Renders a program back to source text. Parsing the output yields a tree
/// of the same shape.
pub fn print_program(program: &Program) -> String {
    let mut printer = Printer::default();
    printer.print_statements(&program.statements, true);
    printer.output
}

pub fn print_expr(expr: &Expr) -> String {
    let mut printer = Printer::default();
    printer.expr(expr, PREC_ASSIGN);
    printer.output
}

#[derive(Default)]
struct Printer {
    indent_level: usize,
    output: String,
}

impl Printer {
    fn print_statements(&mut self, statements: &[Stmt], top_level: bool) {
        for (index, stmt) in statements.iter().enumerate() {
            if top_level && index > 0 && (stmt.is_block_like() || statements[index - 1].is_block_like())
            {
                self.newline();
            }
            self.write_indent();
            self.stmt(stmt);
            self.newline();
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Var { name, value } => {
                self.write("var ");
                self.write(name);
                self.write(" = ");
                self.expr(value, PREC_ASSIGN);
                self.write(";");
            }
            StmtKind::Function(function) => {
                self.write("function ");
                self.write(&function.name);
                self.write("(");
                self.write(&function.params.join(", "));
                self.write(") ");
                self.block(&function.body);
            }
            StmtKind::Declaration(decl) => {
                self.write(&decl.keyword);
                self.write(" ");
                self.write(&decl.name);
                self.write(" ");
                self.block(&decl.body);
            }
            StmtKind::EventHandler(handler) => {
                self.write("on ");
                if is_dotted_name(&handler.event) {
                    self.write(&handler.event);
                } else {
                    self.string_literal(&handler.event);
                }
                self.write(" ");
                self.block(&handler.body);
            }
            StmtKind::Block(block) => self.block(block),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.write("if (");
                self.expr(condition, PREC_ASSIGN);
                self.write(") ");
                self.block(then_branch);
                if let Some(else_branch) = else_branch {
                    self.write(" else ");
                    self.stmt(else_branch);
                }
            }
            StmtKind::ForIn {
                variable,
                iterable,
                body,
            } => {
                self.write("for ");
                self.write(variable);
                self.write(" in ");
                self.expr(iterable, PREC_ASSIGN);
                self.write(" ");
                self.block(body);
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                self.write("for (");
                match init {
                    Some(init) => self.stmt(init),
                    None => self.write(";"),
                }
                if let Some(condition) = condition {
                    self.write(" ");
                    self.expr(condition, PREC_ASSIGN);
                }
                self.write(";");
                if let Some(update) = update {
                    self.write(" ");
                    self.expr(update, PREC_ASSIGN);
                }
                self.write(") ");
                self.block(body);
            }
            StmtKind::While { condition, body } => {
                self.write("while (");
                self.expr(condition, PREC_ASSIGN);
                self.write(") ");
                self.block(body);
            }
            StmtKind::Return(value) => {
                self.write("return");
                if let Some(value) = value {
                    self.write(" ");
                    self.expr(value, PREC_ASSIGN);
                }
                self.write(";");
            }
            StmtKind::Property { name, value } => {
                self.write(name);
                self.write(": ");
                self.expr(value, PREC_ASSIGN);
                self.write(";");
            }
            StmtKind::Expression(expr) => {
                // A leading `{` would reopen as a block statement.
                if starts_with_object(expr) {
                    self.write("(");
                    self.expr(expr, PREC_ASSIGN);
                    self.write(")");
                } else {
                    self.expr(expr, PREC_ASSIGN);
                }
                self.write(";");
            }
            StmtKind::ForeignCode(code) => {
                self.write(FOREIGN_OPEN);
                self.write(code);
                self.write(FOREIGN_CLOSE);
            }
        }
    }

    fn block(&mut self, block: &Block) {
        if block.statements.is_empty() {
            self.write("{}");
            return;
        }
        self.write("{");
        self.newline();
        self.indent();
        self.print_statements(&block.statements, false);
        self.dedent();
        self.write_indent();
        self.write("}");
    }

    fn expr(&mut self, expr: &Expr, min_prec: u8) {
        match &expr.kind {
            ExprKind::Literal(literal) => self.literal(literal),
            ExprKind::Identifier(name) => self.write(name),
            ExprKind::Binary { op, left, right } => {
                let prec = op.precedence();
                let wrap = prec < min_prec;
                if wrap {
                    self.write("(");
                }
                self.expr(left, prec);
                self.write(" ");
                self.write(op.symbol());
                self.write(" ");
                self.expr(right, prec + 1);
                if wrap {
                    self.write(")");
                }
            }
            ExprKind::Unary { op, operand } => {
                let wrap = PREC_UNARY < min_prec;
                if wrap {
                    self.write("(");
                }
                self.write(op.symbol());
                self.expr(operand, PREC_UNARY);
                if wrap {
                    self.write(")");
                }
            }
            ExprKind::Call { callee, args } => {
                self.expr(callee, PREC_POSTFIX);
                self.write("(");
                self.comma_separated(args);
                self.write(")");
            }
            ExprKind::Member { object, property } => {
                self.expr(object, PREC_POSTFIX);
                self.write(".");
                self.write(property);
            }
            ExprKind::Index { object, index } => {
                self.expr(object, PREC_POSTFIX);
                self.write("[");
                self.expr(index, PREC_ASSIGN);
                self.write("]");
            }
            ExprKind::Assign { target, value } => {
                let wrap = PREC_ASSIGN < min_prec;
                if wrap {
                    self.write("(");
                }
                self.expr(target, PREC_POSTFIX);
                self.write(" = ");
                self.expr(value, PREC_ASSIGN);
                if wrap {
                    self.write(")");
                }
            }
            ExprKind::Array(elements) => {
                self.write("[");
                self.comma_separated(elements);
                self.write("]");
            }
            ExprKind::Object(entries) => {
                self.write("{");
                for (index, (key, value)) in entries.iter().enumerate() {
                    if index > 0 {
                        self.write(", ");
                    }
                    if is_plain_name(key) {
                        self.write(key);
                    } else {
                        self.string_literal(key);
                    }
                    self.write(": ");
                    self.expr(value, PREC_ASSIGN);
                }
                self.write("}");
            }
        }
    }

    fn comma_separated(&mut self, exprs: &[Expr]) {
        for (index, expr) in exprs.iter().enumerate() {
            if index > 0 {
                self.write(", ");
            }
            self.expr(expr, PREC_ASSIGN);
        }
    }

    fn literal(&mut self, literal: &Literal) {
        match literal {
            Literal::Null => self.write("null"),
            Literal::Bool(value) => self.write(if *value { "true" } else { "false" }),
            Literal::Number(value) => {
                let text = if value.fract() == 0.0 && value.abs() < 1e15 {
                    format!("{}", *value as i64)
                } else {
                    format!("{}", value)
                };
                self.write(&text);
            }
            Literal::String(value) => self.string_literal(value),
        }
    }

    fn string_literal(&mut self, value: &str) {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('"');
        for ch in value.chars() {
            match ch {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                '\r' => out.push_str("\\r"),
                '\0' => out.push_str("\\0"),
                other => out.push(other),
            }
        }
        out.push('"');
        self.write(&out);
    }

    fn write(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent_level {
            self.output.push_str(INDENT);
        }
    }

    fn newline(&mut self) {
        self.output.push('\n');
    }

    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }
}

impl Stmt {
    fn is_block_like(&self) -> bool {
        matches!(
            self.kind,
            StmtKind::Function(_) | StmtKind::Declaration(_) | StmtKind::EventHandler(_)
        )
    }
}

fn starts_with_object(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Object(_) => true,
        ExprKind::Binary { left: inner, .. }
        | ExprKind::Call { callee: inner, .. }
        | ExprKind::Member { object: inner, .. }
        | ExprKind::Index { object: inner, .. }
        | ExprKind::Assign { target: inner, .. } => starts_with_object(inner),
        _ => false,
    }
}

fn is_plain_name(text: &str) -> bool {
    let mut chars = text.chars();
    let starts_well = chars
        .next()
        .is_some_and(|ch| ch.is_alphabetic() || ch == '_');
    starts_well
        && chars.all(|ch| ch.is_alphanumeric() || ch == '_')
        && !matches!(text, "true" | "false" | "null")
        && !Keyword::from_word(text).is_some_and(Keyword::is_operator_word)
}

fn is_dotted_name(text: &str) -> bool {
    text.split('.').all(is_plain_name)
}

#[cfg(test)]
mod printer_tests {
    use super::*;
    use crate::parser::parse_program;
    use pretty_assertions::assert_eq;

    fn reprint(source: &str) -> String {
        print_program(&parse_program(source).expect("parse should pass"))
    }

    #[test]
    fn formats_declarations_and_blocks() {
        let printed = reprint(
            "var x=10+5;npc guard{name:'Guard';node idle{text:\"a\\\"b\"}on player.talk{if(x>1){log(x);}else if(x<0){}else{return;}}}",
        );
        assert_eq!(
            printed,
            r#"var x = 10 + 5;

npc guard {
    name: "Guard";
    node idle {
        text: "a\"b";
    }
    on player.talk {
        if (x > 1) {
            log(x);
        } else if (x < 0) {} else {
            return;
        }
    }
}
"#
        );
    }

    #[test]
    fn parentheses_follow_precedence() {
        let printed = reprint("var a = (1 + 2) * 3; var b = a - (b - c); var c = -(a + b); var d = !(x && y) || z; var e = (a = 1) + 2;");
        assert_eq!(
            printed,
            "var a = (1 + 2) * 3;\nvar b = a - (b - c);\nvar c = -(a + b);\nvar d = !(x && y) || z;\nvar e = (a = 1) + 2;\n"
        );
    }

    #[test]
    fn printing_is_stable_across_a_round_trip() {
        let source = r#"
function add(a, b) { return a + b * 2 % 3; }
on "odd event name" { event.cancelled = true; }
on world.tick {
    for (var i = 0; i < 3; i = i + 1) { items[i] = {name: "n", "two words": [1, 2.5, null]}; }
    for (;;) { return; }
    for item in items { while (not done) { done = item.ready and true; } }
    ({a: 1}).a;
    <% let x = 1; %>
}
quest q {}
"#;
        let first = reprint(source);
        let second = reprint(&first);
        assert_eq!(first, second);
        assert!(first.contains("on \"odd event name\" {"));
        assert!(first.contains("for (;;) {"));
        assert!(first.contains("({a: 1}.a);"));
        assert!(first.contains("<% let x = 1; %>"));
        assert!(first.contains("while (!done) {"));

        let reparsed = parse_program(&first).expect("printed output should parse");
        let original = parse_program(source).expect("parse should pass");
        let shape = |program: &Program| {
            program
                .statements
                .iter()
                .map(Stmt::kind_name)
                .collect::<Vec<_>>()
        };
        assert_eq!(shape(&reparsed), shape(&original));
    }

    #[test]
    fn expressions_print_standalone() {
        let program = parse_program("f(a.b[0], \"t\\n\");").expect("parse should pass");
        let StmtKind::Expression(expr) = &program.statements[0].kind else {
            panic!("expected expression");
        };
        assert_eq!(print_expr(expr), "f(a.b[0], \"t\\n\")");
    }
}
