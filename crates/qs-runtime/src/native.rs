use std::collections::BTreeMap;

use qs_core::{ScriptLangError, Value};
use rhai::{Array, Dynamic, Engine, ImmutableString, Map, Scope, FLOAT, INT};

/// Optional capability that runs embedded foreign-code blocks.
pub trait NativeExtension: Send + Sync {
    fn name(&self) -> &str;

    /// Runs `code` with `bindings` in view. Changed bindings are written
    /// back into the map; the block's final value is returned.
    fn execute(
        &self,
        code: &str,
        bindings: &mut BTreeMap<String, Value>,
    ) -> Result<Value, ScriptLangError>;
}

/// Evaluates foreign blocks as Rhai. A fresh engine is built per block so
/// nothing leaks between scripts.
#[derive(Debug, Clone)]
pub struct RhaiExtension {
    max_operations: u64,
}

impl Default for RhaiExtension {
    fn default() -> Self {
        Self {
            max_operations: 100_000,
        }
    }
}

impl RhaiExtension {
    pub fn with_max_operations(max_operations: u64) -> Self {
        Self { max_operations }
    }
}

impl NativeExtension for RhaiExtension {
    fn name(&self) -> &str {
        "rhai"
    }

    fn execute(
        &self,
        code: &str,
        bindings: &mut BTreeMap<String, Value>,
    ) -> Result<Value, ScriptLangError> {
        let mut scope = Scope::new();
        for (name, value) in bindings.iter() {
            scope.push_dynamic(name.clone(), value_to_dynamic(value));
        }

        let mut engine = Engine::new();
        engine.set_strict_variables(true);
        engine.set_max_operations(self.max_operations);

        let result = engine
            .eval_with_scope::<Dynamic>(&mut scope, code)
            .map_err(|error| {
                ScriptLangError::new("NATIVE_EXEC", format!("Foreign block failed: {}", error))
            })?;

        for (name, slot) in bindings.iter_mut() {
            if let Some(after) = scope.get_value::<Dynamic>(name) {
                *slot = dynamic_to_value(after)?;
            }
        }
        dynamic_to_value(result)
    }
}

pub(crate) fn value_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(value) => Dynamic::from_bool(*value),
        Value::Number(value) => {
            if value.fract() == 0.0 && value.abs() < INT::MAX as f64 {
                Dynamic::from_int(*value as INT)
            } else {
                Dynamic::from_float(*value as FLOAT)
            }
        }
        Value::String(value) => Dynamic::from(value.clone()),
        Value::Array(values) => {
            Dynamic::from_array(values.iter().map(value_to_dynamic).collect::<Array>())
        }
        Value::Object(entries) => {
            let mut map = Map::new();
            for (key, value) in entries {
                map.insert(key.as_str().into(), value_to_dynamic(value));
            }
            Dynamic::from_map(map)
        }
    }
}

pub(crate) fn dynamic_to_value(value: Dynamic) -> Result<Value, ScriptLangError> {
    if value.is_unit() {
        return Ok(Value::Null);
    }
    if value.is::<bool>() {
        return Ok(Value::Bool(value.cast::<bool>()));
    }
    if value.is::<INT>() {
        return Ok(Value::Number(value.cast::<INT>() as f64));
    }
    if value.is::<FLOAT>() {
        return Ok(Value::Number(value.cast::<FLOAT>()));
    }
    if value.is::<ImmutableString>() {
        return Ok(Value::String(value.cast::<ImmutableString>().to_string()));
    }
    if value.is::<char>() {
        return Ok(Value::String(value.cast::<char>().to_string()));
    }
    if value.is::<Array>() {
        let array = value.cast::<Array>();
        let mut out = Vec::with_capacity(array.len());
        for item in array {
            out.push(dynamic_to_value(item)?);
        }
        return Ok(Value::Array(out));
    }
    if value.is::<Map>() {
        let map = value.cast::<Map>();
        let mut out = BTreeMap::new();
        for (key, value) in map {
            out.insert(key.to_string(), dynamic_to_value(value)?);
        }
        return Ok(Value::Object(out));
    }

    Err(ScriptLangError::new(
        "NATIVE_VALUE_UNSUPPORTED",
        format!("Foreign value of type \"{}\" has no script equivalent.", value.type_name()),
    ))
}

#[cfg(test)]
mod native_tests {
    use super::*;

    #[test]
    fn rhai_block_reads_and_writes_bindings() {
        let mut bindings = BTreeMap::from([
            ("gold".to_string(), Value::from(10_i64)),
            ("name".to_string(), Value::from("Ada")),
        ]);
        let result = RhaiExtension::default()
            .execute("gold += 5; name + \"!\"", &mut bindings)
            .expect("block should run");

        assert_eq!(result, Value::from("Ada!"));
        assert_eq!(bindings.get("gold"), Some(&Value::from(15_i64)));
    }

    #[test]
    fn rhai_errors_map_to_native_exec() {
        let mut bindings = BTreeMap::new();
        let error = RhaiExtension::default()
            .execute("undefined_thing + 1", &mut bindings)
            .expect_err("strict variables");
        assert_eq!(error.code, "NATIVE_EXEC");

        let error = RhaiExtension::with_max_operations(50)
            .execute("loop { }", &mut bindings)
            .expect_err("operation limit");
        assert_eq!(error.code, "NATIVE_EXEC");
    }

    #[test]
    fn conversions_cover_nested_values() {
        let value = Value::Object(BTreeMap::from([
            (
                "items".to_string(),
                Value::Array(vec![Value::from(1_i64), Value::Number(2.5), Value::Null]),
            ),
            ("ok".to_string(), Value::Bool(true)),
        ]));
        let back = dynamic_to_value(value_to_dynamic(&value)).expect("round trip");
        assert_eq!(back, value);
    }
}
