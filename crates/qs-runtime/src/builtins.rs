use std::collections::BTreeMap;
use std::sync::Arc;

use qs_core::{ScriptLangError, Value};

/// Who is calling a builtin.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinCall<'a> {
    pub script_id: &'a str,
    pub actor: Option<&'a str>,
}

/// Host capability table. The interpreter resolves script functions and its
/// own intrinsics first and then falls back to this table.
pub trait BuiltinRegistry: Send + Sync {
    fn call(
        &self,
        name: &str,
        args: &[Value],
        call: &BuiltinCall<'_>,
    ) -> Result<Value, ScriptLangError>;
    fn names(&self) -> &[String];
}

#[derive(Debug, Default)]
pub struct EmptyBuiltins {
    names: Vec<String>,
}

impl BuiltinRegistry for EmptyBuiltins {
    fn call(
        &self,
        name: &str,
        _args: &[Value],
        _call: &BuiltinCall<'_>,
    ) -> Result<Value, ScriptLangError> {
        Err(unknown_builtin(name))
    }

    fn names(&self) -> &[String] {
        &self.names
    }
}

pub type BuiltinFn =
    Arc<dyn Fn(&[Value], &BuiltinCall<'_>) -> Result<Value, ScriptLangError> + Send + Sync>;

/// Closure-backed table the host fills at startup.
#[derive(Default, Clone)]
pub struct BuiltinTable {
    functions: BTreeMap<String, BuiltinFn>,
    names: Vec<String>,
}

impl BuiltinTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, function: F) -> &mut Self
    where
        F: Fn(&[Value], &BuiltinCall<'_>) -> Result<Value, ScriptLangError> + Send + Sync + 'static,
    {
        let name = name.into();
        self.functions.insert(name, Arc::new(function));
        self.names = self.functions.keys().cloned().collect();
        self
    }

    pub fn with<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[Value], &BuiltinCall<'_>) -> Result<Value, ScriptLangError> + Send + Sync + 'static,
    {
        self.register(name, function);
        self
    }
}

impl BuiltinRegistry for BuiltinTable {
    fn call(
        &self,
        name: &str,
        args: &[Value],
        call: &BuiltinCall<'_>,
    ) -> Result<Value, ScriptLangError> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| unknown_builtin(name))?;
        function(args, call)
    }

    fn names(&self) -> &[String] {
        &self.names
    }
}

pub(crate) fn unknown_builtin(name: &str) -> ScriptLangError {
    ScriptLangError::new(
        "RUNTIME_BUILTIN_UNKNOWN",
        format!("Function \"{}\" is not defined.", name),
    )
}

/// Checks that a builtin received between `min` and `max` arguments.
pub fn expect_arity(
    name: &str,
    args: &[Value],
    min: usize,
    max: usize,
) -> Result<(), ScriptLangError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{}..{}", min, max)
        };
        return Err(ScriptLangError::new(
            "RUNTIME_BUILTIN_ARITY",
            format!(
                "Function \"{}\" expects {} argument(s), got {}.",
                name,
                expected,
                args.len()
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod builtins_tests {
    use super::*;

    const CALL: BuiltinCall<'static> = BuiltinCall {
        script_id: "test",
        actor: Some("player"),
    };

    #[test]
    fn table_dispatches_by_name_and_lists_names_sorted() {
        let table = BuiltinTable::new()
            .with("spawn", |args, _| Ok(Value::from(args.len() as i64)))
            .with("actor_name", |_, call| {
                Ok(call.actor.map(Value::from).unwrap_or_default())
            });

        assert_eq!(table.names(), &["actor_name".to_string(), "spawn".to_string()]);
        assert_eq!(
            table.call("spawn", &[Value::Null, Value::Null], &CALL),
            Ok(Value::from(2_i64))
        );
        assert_eq!(
            table.call("actor_name", &[], &CALL),
            Ok(Value::from("player"))
        );
        let error = table.call("missing", &[], &CALL).expect_err("unknown");
        assert_eq!(error.code, "RUNTIME_BUILTIN_UNKNOWN");
    }

    #[test]
    fn empty_registry_rejects_everything() {
        let error = EmptyBuiltins::default()
            .call("play_sound", &[], &CALL)
            .expect_err("empty registry");
        assert_eq!(error.code, "RUNTIME_BUILTIN_UNKNOWN");
        assert!(error.message.contains("play_sound"));
    }

    #[test]
    fn arity_reports_expected_range() {
        assert!(expect_arity("f", &[Value::Null], 1, 2).is_ok());
        let error = expect_arity("f", &[], 1, 2).expect_err("too few");
        assert_eq!(error.message, "Function \"f\" expects 1..2 argument(s), got 0.");
    }
}
