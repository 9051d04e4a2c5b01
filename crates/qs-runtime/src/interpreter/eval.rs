use std::cmp::Ordering;
use std::collections::BTreeMap;

use qs_core::{ScriptLangError, SourceSpan, Value};
use qs_parser::{BinaryOp, Expr, ExprKind, Literal, UnaryOp};

use super::Interpreter;
use crate::context::ExecutionContext;

enum PathSegment {
    Key(String),
    Index(Value),
}

impl Interpreter {
    pub(crate) fn eval(
        &self,
        ctx: &mut ExecutionContext,
        expr: &Expr,
    ) -> Result<Value, ScriptLangError> {
        self.eval_kind(ctx, expr).map_err(|error| error.at(&expr.span))
    }

    fn eval_kind(&self, ctx: &mut ExecutionContext, expr: &Expr) -> Result<Value, ScriptLangError> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(literal_value(literal)),
            ExprKind::Identifier(name) => ctx.lookup(name, &expr.span),
            ExprKind::Binary { op, left, right } => match op {
                BinaryOp::And => {
                    let left = self.eval(ctx, left)?;
                    if !left.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                    Ok(Value::Bool(self.eval(ctx, right)?.is_truthy()))
                }
                BinaryOp::Or => {
                    let left = self.eval(ctx, left)?;
                    if left.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                    Ok(Value::Bool(self.eval(ctx, right)?.is_truthy()))
                }
                _ => {
                    let left = self.eval(ctx, left)?;
                    let right = self.eval(ctx, right)?;
                    binary_op(*op, left, right, &expr.span)
                }
            },
            ExprKind::Unary { op, operand } => {
                let value = self.eval(ctx, operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Negate => match value {
                        Value::Number(number) => Ok(Value::Number(-number)),
                        other => Err(type_mismatch(
                            format!("Cannot negate a {}.", other.type_name()),
                            &expr.span,
                        )),
                    },
                }
            }
            ExprKind::Call { callee, args } => self.eval_call(ctx, callee, args, &expr.span),
            ExprKind::Member { object, property } => {
                let object = self.eval(ctx, object)?;
                Ok(read_member(&object, property))
            }
            ExprKind::Index { object, index } => {
                let object = self.eval(ctx, object)?;
                let index = self.eval(ctx, index)?;
                read_index(&object, &index, &expr.span)
            }
            ExprKind::Assign { target, value } => {
                let value = self.eval(ctx, value)?;
                self.assign(ctx, target, value.clone())?;
                Ok(value)
            }
            ExprKind::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval(ctx, element)?);
                }
                Ok(Value::Array(values))
            }
            ExprKind::Object(entries) => {
                let mut values = BTreeMap::new();
                for (key, value) in entries {
                    let value = self.eval(ctx, value)?;
                    values.insert(key.clone(), value);
                }
                Ok(Value::Object(values))
            }
        }
    }

    fn assign(
        &self,
        ctx: &mut ExecutionContext,
        target: &Expr,
        value: Value,
    ) -> Result<(), ScriptLangError> {
        let mut path = Vec::new();
        let mut cursor = target;
        let root = loop {
            match &cursor.kind {
                ExprKind::Identifier(name) => break name,
                ExprKind::Member { object, property } => {
                    path.push(PathSegment::Key(property.clone()));
                    cursor = object;
                }
                ExprKind::Index { object, index } => {
                    path.push(PathSegment::Index(self.eval(ctx, index)?));
                    cursor = object;
                }
                _ => {
                    return Err(ScriptLangError::with_span(
                        "RUNTIME_INVALID_ASSIGN_TARGET",
                        "Only variables and their members can be assigned.",
                        target.span.clone(),
                    ))
                }
            }
        };

        if path.is_empty() {
            return ctx.assign(root, value, &target.span);
        }
        path.reverse();

        let mut slot = ctx.binding_mut(root, &target.span)?;
        let last = path.len() - 1;
        for (position, segment) in path.into_iter().enumerate() {
            if position == last {
                return write_segment(slot, segment, value, &target.span);
            }
            slot = child_mut(slot, segment, &target.span)?;
        }
        Ok(())
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Bool(value) => Value::Bool(*value),
        Literal::Number(value) => Value::Number(*value),
        Literal::String(value) => Value::String(value.clone()),
    }
}

fn binary_op(
    op: BinaryOp,
    left: Value,
    right: Value,
    span: &SourceSpan,
) -> Result<Value, ScriptLangError> {
    match op {
        BinaryOp::Equal => Ok(Value::Bool(left == right)),
        BinaryOp::NotEqual => Ok(Value::Bool(left != right)),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            let ordering = compare(&left, &right, span)?;
            let result = match op {
                BinaryOp::Less => ordering == Ordering::Less,
                BinaryOp::LessEqual => ordering != Ordering::Greater,
                BinaryOp::Greater => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(a), b) => Ok(Value::String(format!("{}{}", a, b))),
            (a, Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
            (Value::Array(mut a), Value::Array(b)) => {
                a.extend(b);
                Ok(Value::Array(a))
            }
            (a, b) => Err(type_mismatch(
                format!("Cannot add {} and {}.", a.type_name(), b.type_name()),
                span,
            )),
        },
        BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
            let (Value::Number(a), Value::Number(b)) = (&left, &right) else {
                return Err(type_mismatch(
                    format!(
                        "Operator \"{}\" needs numbers, got {} and {}.",
                        op.symbol(),
                        left.type_name(),
                        right.type_name()
                    ),
                    span,
                ));
            };
            let (a, b) = (*a, *b);
            match op {
                BinaryOp::Subtract => Ok(Value::Number(a - b)),
                BinaryOp::Multiply => Ok(Value::Number(a * b)),
                _ if b == 0.0 => Err(ScriptLangError::with_span(
                    "RUNTIME_DIVISION_BY_ZERO",
                    "Division by zero.",
                    span.clone(),
                )),
                BinaryOp::Divide => Ok(Value::Number(a / b)),
                _ => Ok(Value::Number(a % b)),
            }
        }
        BinaryOp::And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOp::Or => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
    }
}

fn compare(left: &Value, right: &Value, span: &SourceSpan) -> Result<Ordering, ScriptLangError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b).ok_or_else(|| {
            type_mismatch("Cannot compare NaN.".to_string(), span)
        }),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (a, b) => Err(type_mismatch(
            format!("Cannot compare {} with {}.", a.type_name(), b.type_name()),
            span,
        )),
    }
}

/// Missing members read as null. Arrays and strings expose `length`.
fn read_member(object: &Value, property: &str) -> Value {
    match (object, property) {
        (Value::Array(items), "length") => Value::Number(items.len() as f64),
        (Value::String(text), "length") => Value::Number(text.chars().count() as f64),
        _ => object.member(property),
    }
}

fn read_index(
    object: &Value,
    index: &Value,
    span: &SourceSpan,
) -> Result<Value, ScriptLangError> {
    match (object, index) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Array(items), Value::Number(_)) => Ok(array_position(index)
            .and_then(|position| items.get(position).cloned())
            .unwrap_or_default()),
        (Value::String(text), Value::Number(_)) => Ok(array_position(index)
            .and_then(|position| text.chars().nth(position))
            .map(|ch| Value::String(ch.to_string()))
            .unwrap_or_default()),
        (Value::Object(_), Value::String(key)) => Ok(object.member(key)),
        (object, index) => Err(type_mismatch(
            format!(
                "Cannot index a {} with a {}.",
                object.type_name(),
                index.type_name()
            ),
            span,
        )),
    }
}

fn array_position(index: &Value) -> Option<usize> {
    let number = index.as_number()?;
    if number < 0.0 || number.fract() != 0.0 {
        return None;
    }
    Some(number as usize)
}

fn child_mut<'v>(
    slot: &'v mut Value,
    segment: PathSegment,
    span: &SourceSpan,
) -> Result<&'v mut Value, ScriptLangError> {
    let type_name = slot.type_name();
    match (slot, segment) {
        (Value::Object(entries), PathSegment::Key(key))
        | (Value::Object(entries), PathSegment::Index(Value::String(key))) => {
            entries.get_mut(&key).ok_or_else(|| {
                type_mismatch(format!("Cannot write through missing member \"{}\".", key), span)
            })
        }
        (Value::Array(items), PathSegment::Index(index)) => {
            let len = items.len();
            array_position(&index)
                .and_then(|position| items.get_mut(position))
                .ok_or_else(|| index_out_of_range(&index, len, span))
        }
        _ => Err(type_mismatch(
            format!("Cannot write into a {}.", type_name),
            span,
        )),
    }
}

fn write_segment(
    slot: &mut Value,
    segment: PathSegment,
    value: Value,
    span: &SourceSpan,
) -> Result<(), ScriptLangError> {
    let type_name = slot.type_name();
    match (slot, segment) {
        (Value::Object(entries), PathSegment::Key(key))
        | (Value::Object(entries), PathSegment::Index(Value::String(key))) => {
            entries.insert(key, value);
            Ok(())
        }
        (Value::Array(items), PathSegment::Index(index)) => {
            let len = items.len();
            match array_position(&index) {
                Some(position) if position < len => {
                    items[position] = value;
                    Ok(())
                }
                Some(position) if position == len => {
                    items.push(value);
                    Ok(())
                }
                _ => Err(index_out_of_range(&index, len, span)),
            }
        }
        (_, PathSegment::Key(key)) => Err(type_mismatch(
            format!("Cannot set member \"{}\" on a {}.", key, type_name),
            span,
        )),
        (_, PathSegment::Index(index)) => Err(type_mismatch(
            format!(
                "Cannot set index {} on a {}.",
                index,
                type_name
            ),
            span,
        )),
    }
}

fn index_out_of_range(index: &Value, len: usize, span: &SourceSpan) -> ScriptLangError {
    ScriptLangError::with_span(
        "RUNTIME_INDEX_OUT_OF_RANGE",
        format!("Index {} is out of range for an array of length {}.", index, len),
        span.clone(),
    )
}

fn type_mismatch(message: String, span: &SourceSpan) -> ScriptLangError {
    ScriptLangError::with_span("RUNTIME_TYPE_MISMATCH", message, span.clone())
}

#[cfg(test)]
mod eval_tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use qs_core::Value;

    use super::super::runtime_test_support::{interpreter_with, load, load_ok, RecordingBuiltins};
    use super::super::Interpreter;

    fn globals_of(source: &str) -> std::collections::BTreeMap<String, Value> {
        let interpreter = Interpreter::default();
        load_ok(&interpreter, "eval", source).unit.globals()
    }

    #[test]
    fn arithmetic_strings_and_comparison() {
        let globals = globals_of(
            r#"
var a = 7 % 4 + 10 / 4;
var b = "lvl " + 3;
var c = [1] + [2, 3];
var d = "abc" < "abd";
var e = -a;
var f = not (1 == 1) or null;
"#,
        );
        assert_eq!(globals["a"], Value::Number(5.5));
        assert_eq!(globals["b"], Value::from("lvl 3"));
        assert_eq!(
            globals["c"],
            Value::Array(vec![Value::from(1_i64), Value::from(2_i64), Value::from(3_i64)])
        );
        assert_eq!(globals["d"], Value::Bool(true));
        assert_eq!(globals["e"], Value::Number(-5.5));
        assert_eq!(globals["f"], Value::Bool(false));
    }

    #[test]
    fn short_circuit_skips_the_right_operand() {
        let builtins = Arc::new(RecordingBuiltins::new());
        let interpreter = interpreter_with(Arc::clone(&builtins));
        load_ok(&interpreter, "sc", "var a = false && record(1); var b = true || record(2);");
        assert!(builtins.calls().is_empty());
    }

    #[test]
    fn members_are_lenient_but_variables_are_strict() {
        let globals = globals_of(
            r#"
var hero = {name: "Ada", bag: ["rope"]};
var missing = hero.title;
var deep = hero.title.first;
var count = hero.bag.length;
var first = hero["bag"][0];
var outside = hero.bag[5];
"#,
        );
        assert_eq!(globals["missing"], Value::Null);
        assert_eq!(globals["deep"], Value::Null);
        assert_eq!(globals["count"], Value::from(1_i64));
        assert_eq!(globals["first"], Value::from("rope"));
        assert_eq!(globals["outside"], Value::Null);

        let interpreter = Interpreter::default();
        let error = load(&interpreter, "strict", "var v = nobody.name;").expect_err("strict");
        assert_eq!(error.code, "RUNTIME_UNDEFINED_VARIABLE");
        assert_eq!(error.span.map(|s| (s.start.line, s.start.column)), Some((1, 9)));
    }

    #[test]
    fn member_and_index_assignment() {
        let globals = globals_of(
            r#"
var hero = {stats: {hp: 1}, bag: []};
hero.stats.hp = 10;
hero["name"] = "Ada";
hero.bag[0] = "rope";
hero.bag[1] = "lamp";
hero.bag[0] = "torch";
"#,
        );
        let hero = globals["hero"].as_object().expect("object").clone();
        assert_eq!(hero["stats"].member("hp"), Value::from(10_i64));
        assert_eq!(hero["name"], Value::from("Ada"));
        assert_eq!(
            hero["bag"],
            Value::Array(vec![Value::from("torch"), Value::from("lamp")])
        );
    }

    #[test]
    fn runtime_type_errors() {
        let interpreter = Interpreter::default();
        let cases = [
            ("var a = 1 / 0;", "RUNTIME_DIVISION_BY_ZERO"),
            ("var a = 5 % 0;", "RUNTIME_DIVISION_BY_ZERO"),
            ("var a = true - 1;", "RUNTIME_TYPE_MISMATCH"),
            ("var a = 1 < \"2\";", "RUNTIME_TYPE_MISMATCH"),
            ("var a = 5[0];", "RUNTIME_TYPE_MISMATCH"),
            ("var a = -\"x\";", "RUNTIME_TYPE_MISMATCH"),
            ("var a = 1; a.b = 2;", "RUNTIME_TYPE_MISMATCH"),
            ("var a = []; a[3] = 1;", "RUNTIME_INDEX_OUT_OF_RANGE"),
            ("var a = {}; a.b.c = 1;", "RUNTIME_TYPE_MISMATCH"),
        ];
        for (source, code) in cases {
            let error = load(&interpreter, "types", source).expect_err(source);
            assert_eq!(error.code, code, "{}", source);
        }
    }
}
