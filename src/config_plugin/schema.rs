//! # Config Schemas
//!
//! Declared config types for plugins and the evaluator that checks a raw config
//! value against them.
//!
//! Evaluation never stops at the first problem: every field-level error is
//! collected so a misconfigured plugin can be fixed in one pass.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A declared config type
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigType {
    Any,
    Bool,
    Int,
    Float,
    String,
    List(Box<ConfigType>),
    /// A named mapping with a fixed set of fields
    Dict {
        name: String,
        fields: BTreeMap<String, Field>,
    },
}

/// One field of a [`ConfigType::Dict`]
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub config_type: ConfigType,
    pub is_optional: bool,
    pub default_value: Option<Value>,
}

impl Field {
    /// A required field
    pub fn new(config_type: ConfigType) -> Self {
        Self {
            config_type,
            is_optional: false,
            default_value: None,
        }
    }

    /// An optional field with no default
    pub fn optional(config_type: ConfigType) -> Self {
        Self {
            config_type,
            is_optional: true,
            default_value: None,
        }
    }

    /// An optional field filled with `default_value` when absent
    pub fn with_default(config_type: ConfigType, default_value: Value) -> Self {
        Self {
            config_type,
            is_optional: true,
            default_value: Some(default_value),
        }
    }

    fn is_required(&self) -> bool {
        !self.is_optional && self.default_value.is_none()
    }
}

impl ConfigType {
    pub fn named_dict<N, I, K>(name: N, fields: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (K, Field)>,
        K: Into<String>,
    {
        Self::Dict {
            name: name.into(),
            fields: fields.into_iter().map(|(k, f)| (k.into(), f)).collect(),
        }
    }

    pub fn list(inner: ConfigType) -> Self {
        Self::List(Box::new(inner))
    }

    /// Human-readable type name used in error messages
    pub fn type_name(&self) -> String {
        match self {
            Self::Any => "Any".to_string(),
            Self::Bool => "Bool".to_string(),
            Self::Int => "Int".to_string(),
            Self::Float => "Float".to_string(),
            Self::String => "String".to_string(),
            Self::List(inner) => format!("List[{}]", inner.type_name()),
            Self::Dict { name, .. } => name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvaluationErrorReason {
    RuntimeTypeMismatch,
    MissingRequiredField,
    FieldNotDefined,
}

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationError {
    /// Path from the config root to the offending value
    pub stack: Vec<String>,
    pub reason: EvaluationErrorReason,
    pub message: String,
}

impl EvaluationError {
    /// Dotted path to the offending value, `root` for the top level.
    pub fn path(&self) -> String {
        if self.stack.is_empty() {
            "root".to_string()
        } else {
            format!("root.{}", self.stack.join("."))
        }
    }
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at {})", self.message, self.path())
    }
}

/// Evaluate `value` against `config_type`.
///
/// On success returns the validated value with defaults of absent optional fields
/// filled in. On failure returns every error found.
pub fn evaluate_config(
    config_type: &ConfigType,
    value: &Value,
) -> Result<Value, Vec<EvaluationError>> {
    let mut errors = Vec::new();
    let mut stack = Vec::new();
    let evaluated = evaluate(config_type, value, &mut stack, &mut errors);

    if errors.is_empty() {
        Ok(evaluated)
    } else {
        Err(errors)
    }
}

fn evaluate(
    config_type: &ConfigType,
    value: &Value,
    stack: &mut Vec<String>,
    errors: &mut Vec<EvaluationError>,
) -> Value {
    let matches_scalar = match config_type {
        ConfigType::Any => true,
        ConfigType::Bool => value.is_boolean(),
        ConfigType::Int => value.is_i64() || value.is_u64(),
        ConfigType::Float => value.is_number(),
        ConfigType::String => value.is_string(),
        ConfigType::List(inner) => {
            return match value {
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .enumerate()
                        .map(|(index, item)| {
                            stack.push(index.to_string());
                            let evaluated = evaluate(inner, item, stack, errors);
                            stack.pop();
                            evaluated
                        })
                        .collect(),
                ),
                _ => {
                    errors.push(type_mismatch(config_type, value, stack));
                    value.clone()
                }
            };
        }
        ConfigType::Dict { fields, .. } => {
            return match value {
                Value::Object(map) => evaluate_dict(fields, map, stack, errors),
                // An absent config block is an empty mapping
                Value::Null => evaluate_dict(fields, &Map::new(), stack, errors),
                _ => {
                    errors.push(type_mismatch(config_type, value, stack));
                    value.clone()
                }
            };
        }
    };

    if !matches_scalar {
        errors.push(type_mismatch(config_type, value, stack));
    }
    value.clone()
}

fn evaluate_dict(
    fields: &BTreeMap<String, Field>,
    map: &Map<String, Value>,
    stack: &mut Vec<String>,
    errors: &mut Vec<EvaluationError>,
) -> Value {
    let mut evaluated = Map::new();

    for (name, field) in fields {
        match map.get(name) {
            Some(field_value) => {
                stack.push(name.clone());
                let value = evaluate(&field.config_type, field_value, stack, errors);
                stack.pop();
                evaluated.insert(name.clone(), value);
            }
            None if field.is_required() => {
                stack.push(name.clone());
                errors.push(EvaluationError {
                    stack: stack.clone(),
                    reason: EvaluationErrorReason::MissingRequiredField,
                    message: format!(
                        "Missing required field \"{name}\" of type {}",
                        field.config_type.type_name()
                    ),
                });
                stack.pop();
            }
            None => {
                if let Some(default_value) = &field.default_value {
                    evaluated.insert(name.clone(), default_value.clone());
                }
            }
        }
    }

    for name in map.keys().filter(|name| !fields.contains_key(*name)) {
        stack.push(name.clone());
        errors.push(EvaluationError {
            stack: stack.clone(),
            reason: EvaluationErrorReason::FieldNotDefined,
            message: format!("Undefined field \"{name}\""),
        });
        stack.pop();
    }

    Value::Object(evaluated)
}

fn type_mismatch(config_type: &ConfigType, value: &Value, stack: &[String]) -> EvaluationError {
    EvaluationError {
        stack: stack.to_vec(),
        reason: EvaluationErrorReason::RuntimeTypeMismatch,
        message: format!(
            "Value {value} is not valid for type {}",
            config_type.type_name()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn storage_schema() -> ConfigType {
        ConfigType::named_dict(
            "StorageConfig",
            [
                ("base_dir", Field::new(ConfigType::String)),
                ("pool_size", Field::with_default(ConfigType::Int, json!(5))),
                ("label", Field::optional(ConfigType::String)),
            ],
        )
    }

    #[test]
    fn test_valid_config_fills_defaults() {
        let evaluated = evaluate_config(&storage_schema(), &json!({"base_dir": "/tmp"})).unwrap();
        assert_eq!(evaluated, json!({"base_dir": "/tmp", "pool_size": 5}));
    }

    #[test]
    fn test_collects_all_errors() {
        let errors = evaluate_config(
            &storage_schema(),
            &json!({"pool_size": "five", "unexpected": true}),
        )
        .unwrap_err();

        let reasons: Vec<_> = errors.iter().map(|e| e.reason).collect();
        assert_eq!(errors.len(), 3);
        assert!(reasons.contains(&EvaluationErrorReason::MissingRequiredField));
        assert!(reasons.contains(&EvaluationErrorReason::RuntimeTypeMismatch));
        assert!(reasons.contains(&EvaluationErrorReason::FieldNotDefined));

        let missing = errors
            .iter()
            .find(|e| e.reason == EvaluationErrorReason::MissingRequiredField)
            .unwrap();
        assert_eq!(missing.stack, vec!["base_dir".to_string()]);
        assert_eq!(missing.path(), "root.base_dir");
    }

    #[test]
    fn test_null_dict_is_empty_mapping() {
        let schema = ConfigType::named_dict("Empty", [("flag", Field::optional(ConfigType::Bool))]);
        assert_eq!(evaluate_config(&schema, &Value::Null).unwrap(), json!({}));

        let errors = evaluate_config(&storage_schema(), &Value::Null).unwrap_err();
        assert_eq!(errors[0].reason, EvaluationErrorReason::MissingRequiredField);
    }

    #[test]
    fn test_list_errors_carry_index() {
        let schema = ConfigType::named_dict(
            "Tags",
            [("names", Field::new(ConfigType::list(ConfigType::String)))],
        );
        let errors = evaluate_config(&schema, &json!({"names": ["a", 2]})).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].stack, vec!["names".to_string(), "1".to_string()]);
    }

    #[test]
    fn test_float_accepts_integers_but_int_rejects_floats() {
        assert!(evaluate_config(&ConfigType::Float, &json!(3)).is_ok());
        assert!(evaluate_config(&ConfigType::Int, &json!(3.5)).is_err());
    }
}
