//! Caller-supplied parameter values

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Named parameter values for one execution request
pub type Params = BTreeMap<String, ParamValue>;

/// A scalar parameter value
///
/// Only null, booleans, numbers and strings are accepted. Arrays and objects
/// are rejected while deserializing, before any template is touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub enum ParamValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl ParamValue {
    /// Name of the value's type, used in logs and diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl TryFrom<serde_json::Value> for ParamValue {
    type Error = String;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Bool(b) => Ok(Self::Bool(b)),
            serde_json::Value::Number(n) => Ok(Self::Number(n)),
            serde_json::Value::String(s) => Ok(Self::String(s)),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                Err("parameter values must be null, boolean, number or string".to_string())
            }
        }
    }
}

impl From<ParamValue> for serde_json::Value {
    fn from(value: ParamValue) -> Self {
        match value {
            ParamValue::Null => serde_json::Value::Null,
            ParamValue::Bool(b) => serde_json::Value::Bool(b),
            ParamValue::Number(n) => serde_json::Value::Number(n),
            ParamValue::String(s) => serde_json::Value::String(s),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl ParamValue {
    /// Build a number value from a float. Non-finite floats become null.
    pub fn float(value: f64) -> Self {
        serde_json::Number::from_f64(value)
            .map(Self::Number)
            .unwrap_or(Self::Null)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_values_deserialize() {
        let params: Params =
            serde_json::from_str(r#"{"a": null, "b": true, "c": 42, "d": 1.5, "e": "x"}"#).unwrap();

        assert_eq!(params["a"], ParamValue::Null);
        assert_eq!(params["b"], ParamValue::Bool(true));
        assert_eq!(params["c"], ParamValue::from(42));
        assert_eq!(params["d"], ParamValue::float(1.5));
        assert_eq!(params["e"], ParamValue::from("x"));
    }

    #[test]
    fn composite_values_rejected() {
        assert!(serde_json::from_str::<ParamValue>("[1, 2]").is_err());
        assert!(serde_json::from_str::<ParamValue>(r#"{"nested": 1}"#).is_err());
        assert!(serde_json::from_str::<Params>(r#"{"a": [1]}"#).is_err());
    }

    #[test]
    fn non_finite_float_is_null() {
        assert!(ParamValue::float(f64::NAN).is_null());
    }
}
