//! Conversion of raw JSON argument payloads into scalar argument maps.

use super::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A scalar argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    String(String),
    Number(f64),
    Bool(bool),
}

impl ArgValue {
    /// Type a JSON value. `null` has no scalar form; arrays and objects are
    /// kept as their serialized text.
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Array(_) | Value::Object(_) => Some(Self::String(value.to_string())),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Arguments of a tool call, keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolArguments(BTreeMap<String, ArgValue>);

impl ToolArguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Type every field of a JSON object, skipping the given keys.
    pub fn from_object(object: &Map<String, Value>, skip: &[&str]) -> Self {
        let fields = object
            .iter()
            .filter(|(key, _)| !skip.contains(&key.as_str()))
            .filter_map(|(key, value)| ArgValue::from_json(value).map(|v| (key.clone(), v)))
            .collect();
        Self(fields)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ArgValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.get(name)
    }

    /// Look up a parameter as a string. Numbers and booleans are rendered as
    /// text, so `5551234` and `"5551234"` read the same.
    pub fn string(&self, name: &str) -> Option<String> {
        self.0.get(name).map(ArgValue::to_string)
    }

    /// Like [`ToolArguments::string`], failing when the parameter is absent.
    pub fn require_string(&self, name: &str) -> Result<String, ToolError> {
        self.string(name)
            .ok_or_else(|| ToolError::InvalidInput(format!("missing required parameter `{name}`")))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Serialize back to a JSON object string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Parse a serialized JSON object into typed scalar arguments.
///
/// An empty payload is treated as an empty object; some servers send `""`
/// for parameterless functions.
pub fn extract(raw: &str) -> Result<ToolArguments, ToolError> {
    if raw.trim().is_empty() {
        return Ok(ToolArguments::new());
    }
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ToolError::MalformedArguments(e.to_string()))?;
    match value {
        Value::Object(object) => Ok(ToolArguments::from_object(&object, &[])),
        other => Err(ToolError::MalformedArguments(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_scalar_fields() {
        let args = extract(r#"{"a":"x","b":5,"c":true}"#).unwrap();
        assert_eq!(args.get("a"), Some(&ArgValue::String("x".into())));
        assert_eq!(args.get("b"), Some(&ArgValue::Number(5.0)));
        assert_eq!(args.get("c"), Some(&ArgValue::Bool(true)));
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn reserializes_field_names_and_values() {
        let args = extract(r#"{"b":5,"a":"x","c":true}"#).unwrap();
        let back: Value = serde_json::from_str(&args.to_json()).unwrap();
        assert_eq!(back, serde_json::json!({"a": "x", "b": 5.0, "c": true}));
    }

    #[test]
    fn null_fields_are_omitted() {
        let args = extract(r#"{"location":"Boston, MA","unit":null}"#).unwrap();
        assert_eq!(args.len(), 1);
        assert!(args.get("unit").is_none());
    }

    #[test]
    fn nested_values_are_kept_as_text() {
        let args = extract(r#"{"list":[1,2],"obj":{"k":"v"}}"#).unwrap();
        assert_eq!(args.get("list"), Some(&ArgValue::String("[1,2]".into())));
        assert_eq!(args.get("obj"), Some(&ArgValue::String(r#"{"k":"v"}"#.into())));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = extract("not json").unwrap_err();
        assert!(matches!(err, ToolError::MalformedArguments(_)));
    }

    #[test]
    fn non_object_is_malformed() {
        let err = extract("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, ToolError::MalformedArguments(_)));
    }

    #[test]
    fn empty_payload_is_empty_object() {
        assert!(extract("  ").unwrap().is_empty());
    }

    #[test]
    fn string_renders_numbers_without_fraction() {
        let args = extract(r#"{"phoneNumber":5550100}"#).unwrap();
        assert_eq!(args.string("phoneNumber").as_deref(), Some("5550100"));
        assert!(matches!(
            args.require_string("message"),
            Err(ToolError::InvalidInput(_))
        ));
    }
}
