use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(value) => *value,
            Self::Number(value) => *value != 0.0,
            Self::String(value) => !value.is_empty(),
            Self::Array(_) | Self::Object(_) => true,
        }
    }

    /// Reads `key` leniently: anything that is not an object yields null.
    pub fn member(&self, key: &str) -> Value {
        match self {
            Self::Object(entries) => entries.get(key).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(value) => write!(f, "{}", value),
            Self::Number(value) => {
                if value.fract().abs() < f64::EPSILON && value.abs() < 1e15 {
                    write!(f, "{}", *value as i64)
                } else {
                    write!(f, "{}", value)
                }
            }
            Self::String(value) => write!(f, "{}", value),
            Self::Array(values) => {
                write!(f, "[")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
            Self::Object(entries) => {
                write!(f, "{{")?;
                for (index, (key, value)) in entries.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Self::Array(values)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self::Object(entries)
    }
}

#[cfg(test)]
mod value_tests {
    use super::*;

    #[test]
    fn truthiness_follows_scripting_rules() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(Value::String("x".to_string()).is_truthy());
        assert!(Value::Array(Vec::new()).is_truthy());
    }

    #[test]
    fn display_prints_integral_numbers_without_fraction() {
        assert_eq!(Value::Number(15.0).to_string(), "15");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        let object = Value::Object(BTreeMap::from([
            ("a".to_string(), Value::Number(1.0)),
            ("b".to_string(), Value::Array(vec![Value::Null, Value::Bool(true)])),
        ]));
        assert_eq!(object.to_string(), "{a: 1, b: [null, true]}");
    }

    #[test]
    fn member_read_is_lenient() {
        assert_eq!(Value::Null.member("x"), Value::Null);
        let object = Value::Object(BTreeMap::from([("x".to_string(), Value::Bool(true))]));
        assert_eq!(object.member("x"), Value::Bool(true));
        assert_eq!(object.member("y"), Value::Null);
    }

    #[test]
    fn json_shape_is_untagged() {
        let value = Value::Object(BTreeMap::from([
            ("n".to_string(), Value::Null),
            ("s".to_string(), Value::String("hi".to_string())),
        ]));
        let json = serde_json::to_string(&value).expect("serialize");
        assert_eq!(json, r#"{"n":null,"s":"hi"}"#);
        let back: Value = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, value);
    }
}
