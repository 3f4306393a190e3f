//! Action parameter schema.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    Number,
    String,
    Boolean,
    Object,
    Array,
    #[serde(other)]
    Unknown,
}

impl ParameterType {
    pub fn as_str(self) -> &'static str {
        match self {
            ParameterType::Number => "number",
            ParameterType::String => "string",
            ParameterType::Boolean => "boolean",
            ParameterType::Object => "object",
            ParameterType::Array => "array",
            ParameterType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    #[serde(default)]
    pub required: bool,
}

impl ActionParameter {
    /// Convert a raw command-line value into the JSON type this parameter expects.
    ///
    /// Numbers and booleans that fail to parse are kept as strings and left
    /// for the backend to reject.
    pub fn coerce(&self, raw: &str) -> Value {
        match self.kind {
            ParameterType::Number => raw
                .parse::<i64>()
                .map(Value::from)
                .or_else(|_| raw.parse::<f64>().map(Value::from))
                .unwrap_or_else(|_| Value::String(raw.to_string())),
            ParameterType::Boolean => match raw {
                "true" | "yes" | "1" => Value::Bool(true),
                "false" | "no" | "0" => Value::Bool(false),
                _ => Value::String(raw.to_string()),
            },
            ParameterType::Object | ParameterType::Array => {
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
            }
            ParameterType::String | ParameterType::Unknown => Value::String(raw.to_string()),
        }
    }
}

/// Parameters a named action expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSchema {
    pub action: String,
    #[serde(default)]
    pub parameters: Vec<ActionParameter>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ActionSchema {
    /// Names of required parameters absent from `params`.
    pub fn missing_required<'a>(&'a self, params: &Map<String, Value>) -> Vec<&'a str> {
        self.parameters
            .iter()
            .filter(|p| p.required && !params.contains_key(&p.name))
            .map(|p| p.name.as_str())
            .collect()
    }

    pub fn parameter(&self, name: &str) -> Option<&ActionParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factorial_schema() -> ActionSchema {
        let json = r#"{"action": "factorial", "parameters": [{"name": "num1", "type": "number", "required": true}], "description": "Execute factorial operation"}"#;
        serde_json::from_str(json).expect("parse schema")
    }

    #[test]
    fn test_parse_schema() {
        let schema = factorial_schema();
        assert_eq!(schema.parameters.len(), 1);
        assert_eq!(schema.parameters[0].kind, ParameterType::Number);
        assert_eq!(schema.description.as_deref(), Some("Execute factorial operation"));
    }

    #[test]
    fn test_missing_required() {
        let schema = factorial_schema();
        assert_eq!(schema.missing_required(&Map::new()), vec!["num1"]);

        let mut params = Map::new();
        params.insert("num1".to_string(), Value::from(5));
        assert!(schema.missing_required(&params).is_empty());
    }

    #[test]
    fn test_coerce_values() {
        let schema = factorial_schema();
        let num = schema.parameter("num1").unwrap();
        assert_eq!(num.coerce("5"), Value::from(5));
        assert_eq!(num.coerce("2.5"), Value::from(2.5));
        assert_eq!(num.coerce("five"), Value::from("five"));

        let flag = ActionParameter { name: "verbose".into(), kind: ParameterType::Boolean, required: false };
        assert_eq!(flag.coerce("yes"), Value::Bool(true));

        let code = ActionParameter { name: "code".into(), kind: ParameterType::String, required: true };
        assert_eq!(code.coerce("print(1)"), Value::from("print(1)"));
    }

    #[test]
    fn test_unknown_parameter_type() {
        let param: ActionParameter =
            serde_json::from_str(r#"{"name": "file", "type": "binary", "required": false}"#).expect("parse parameter");
        assert_eq!(param.kind, ParameterType::Unknown);
    }
}
