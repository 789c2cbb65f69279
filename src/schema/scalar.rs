//! Scalar schema node: `string | number | boolean | literal(v)`.

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::value::{type_name, StateValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    String,
    Number,
    Boolean,
    Literal(StateValue),
}

/// Post-apply validators for scalar values (Rule 9: `min/max/regex/int/positive`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScalarValidator {
    Min(f64),
    Max(f64),
    /// A `regex`-style substring/prefix check kept dependency-free: the
    /// crate does not carry a regex engine (see `DESIGN.md`), so this
    /// validator matches a literal substring rather than a full pattern.
    Contains(String),
    Int,
    Positive,
}

impl ScalarValidator {
    fn check(&self, value: &StateValue) -> Result<(), SchemaError> {
        match self {
            ScalarValidator::Min(min) => match value.as_f64() {
                Some(n) if n >= *min => Ok(()),
                Some(n) => Err(SchemaError::Refinement {
                    reason: format!("value {n} is below minimum {min}"),
                }),
                None => Err(SchemaError::TypeMismatch {
                    expected: "number".into(),
                    actual: type_name(value).into(),
                }),
            },
            ScalarValidator::Max(max) => match value.as_f64() {
                Some(n) if n <= *max => Ok(()),
                Some(n) => Err(SchemaError::Refinement {
                    reason: format!("value {n} is above maximum {max}"),
                }),
                None => Err(SchemaError::TypeMismatch {
                    expected: "number".into(),
                    actual: type_name(value).into(),
                }),
            },
            ScalarValidator::Contains(needle) => match value.as_str() {
                Some(s) if s.contains(needle.as_str()) => Ok(()),
                Some(_) => Err(SchemaError::Refinement {
                    reason: format!("value does not contain '{needle}'"),
                }),
                None => Err(SchemaError::TypeMismatch {
                    expected: "string".into(),
                    actual: type_name(value).into(),
                }),
            },
            ScalarValidator::Int => match value.as_f64() {
                Some(n) if n.fract() == 0.0 => Ok(()),
                Some(n) => Err(SchemaError::Refinement {
                    reason: format!("value {n} is not an integer"),
                }),
                None => Err(SchemaError::TypeMismatch {
                    expected: "number".into(),
                    actual: type_name(value).into(),
                }),
            },
            ScalarValidator::Positive => match value.as_f64() {
                Some(n) if n > 0.0 => Ok(()),
                Some(n) => Err(SchemaError::Refinement {
                    reason: format!("value {n} is not positive"),
                }),
                None => Err(SchemaError::TypeMismatch {
                    expected: "number".into(),
                    actual: type_name(value).into(),
                }),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarSchema {
    pub kind: ScalarKind,
    pub required: bool,
    pub default: Option<StateValue>,
    pub validators: Vec<ScalarValidator>,
}

impl ScalarSchema {
    pub fn string() -> Self {
        ScalarSchema {
            kind: ScalarKind::String,
            required: false,
            default: None,
            validators: Vec::new(),
        }
    }

    pub fn number() -> Self {
        ScalarSchema {
            kind: ScalarKind::Number,
            required: false,
            default: None,
            validators: Vec::new(),
        }
    }

    pub fn boolean() -> Self {
        ScalarSchema {
            kind: ScalarKind::Boolean,
            required: false,
            default: None,
            validators: Vec::new(),
        }
    }

    pub fn literal(v: StateValue) -> Self {
        ScalarSchema {
            kind: ScalarKind::Literal(v),
            required: false,
            default: None,
            validators: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: StateValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_validator(mut self, v: ScalarValidator) -> Self {
        self.validators.push(v);
        self
    }

    pub fn initial_state(&self) -> Option<StateValue> {
        match (&self.default, &self.kind) {
            (Some(d), _) => Some(d.clone()),
            (None, ScalarKind::Literal(v)) => Some(v.clone()),
            (None, _) => None,
        }
    }

    /// Type-check `payload` against this scalar's kind. `literal.set`
    /// rejects any payload not equal to the literal (Rule 2).
    pub fn check_type(&self, payload: &StateValue) -> Result<(), SchemaError> {
        match &self.kind {
            ScalarKind::String => {
                if payload.is_string() {
                    Ok(())
                } else {
                    Err(SchemaError::TypeMismatch {
                        expected: "string".into(),
                        actual: type_name(payload).into(),
                    })
                }
            }
            ScalarKind::Number => {
                if payload.is_number() {
                    Ok(())
                } else {
                    Err(SchemaError::TypeMismatch {
                        expected: "number".into(),
                        actual: type_name(payload).into(),
                    })
                }
            }
            ScalarKind::Boolean => {
                if payload.is_boolean() {
                    Ok(())
                } else {
                    Err(SchemaError::TypeMismatch {
                        expected: "boolean".into(),
                        actual: type_name(payload).into(),
                    })
                }
            }
            ScalarKind::Literal(expected) => {
                if payload == expected {
                    Ok(())
                } else {
                    Err(SchemaError::LiteralMismatch {
                        expected: expected.to_string(),
                        actual: payload.to_string(),
                    })
                }
            }
        }
    }

    pub fn apply_set(&self, payload: &StateValue) -> Result<StateValue, SchemaError> {
        self.check_type(payload)?;
        Ok(payload.clone())
    }

    pub fn validate(&self, state: &StateValue) -> Result<(), SchemaError> {
        if state.is_null() {
            if self.required {
                return Err(SchemaError::MissingRequiredField {
                    field: String::new(),
                });
            }
            return Ok(());
        }
        self.check_type(state)?;
        for validator in &self.validators {
            validator.check(state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_rejects_non_matching_payload() {
        let schema = ScalarSchema::literal(StateValue::from("card"));
        assert!(schema.apply_set(&StateValue::from("card")).is_ok());
        assert!(schema.apply_set(&StateValue::from("note")).is_err());
    }

    #[test]
    fn validators_run_after_type_check() {
        let schema = ScalarSchema::number().with_validator(ScalarValidator::Positive);
        assert!(schema.validate(&StateValue::from(5)).is_ok());
        assert!(schema.validate(&StateValue::from(-5)).is_err());
        assert!(schema.validate(&StateValue::from("nope")).is_err());
    }

    #[test]
    fn default_feeds_initial_state() {
        let schema = ScalarSchema::string().with_default(StateValue::from("hi"));
        assert_eq!(schema.initial_state(), Some(StateValue::from("hi")));
        assert_eq!(ScalarSchema::string().initial_state(), None);
    }
}
