//! Tagged-union schema node: a named discriminator selects one of a
//! closed set of variant schemas.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::error::SchemaError;
use crate::op::OpKind;
use crate::path::Path;
use crate::value::StateValue;

use super::Schema;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedSchema {
    pub discriminator_field: String,
    pub variants: BTreeMap<String, Arc<Schema>>,
    pub default_variant: Option<String>,
}

impl TaggedSchema {
    pub fn new(discriminator_field: impl Into<String>) -> Self {
        TaggedSchema {
            discriminator_field: discriminator_field.into(),
            variants: BTreeMap::new(),
            default_variant: None,
        }
    }

    pub fn variant(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.variants.insert(name.into(), Arc::new(schema));
        self
    }

    pub fn with_default_variant(mut self, name: impl Into<String>) -> Self {
        self.default_variant = Some(name.into());
        self
    }

    pub fn initial_state(&self) -> StateValue {
        match &self.default_variant {
            Some(name) => {
                let schema = self.variants.get(name).expect("default variant must exist");
                let mut obj = Map::new();
                obj.insert("variant".into(), StateValue::from(name.clone()));
                obj.insert("value".into(), schema.initial_state());
                StateValue::Object(obj)
            }
            None => StateValue::Null,
        }
    }

    pub fn apply_op(
        &self,
        path: &Path,
        kind: OpKind,
        payload: &StateValue,
        state: &StateValue,
    ) -> Result<StateValue, SchemaError> {
        let current_variant = state
            .as_object()
            .and_then(|o| o.get("variant"))
            .and_then(StateValue::as_str)
            .map(str::to_string);

        if path.is_empty() && kind == OpKind::TaggedSet {
            let obj = payload.as_object().ok_or_else(|| SchemaError::MalformedPayload {
                reason: "tagged.set payload must be an object".into(),
            })?;
            let variant = obj
                .get("variant")
                .and_then(StateValue::as_str)
                .ok_or_else(|| SchemaError::MalformedPayload {
                    reason: "tagged.set payload missing 'variant'".into(),
                })?
                .to_string();
            let schema = self
                .variants
                .get(&variant)
                .ok_or_else(|| SchemaError::UnknownVariant { discriminator: variant.clone() })?;
            let value = obj.get("value").cloned().unwrap_or_else(|| schema.initial_state());
            schema.validate(&value)?;

            let mut result = Map::new();
            result.insert("variant".into(), StateValue::from(variant));
            result.insert("value".into(), value);
            return Ok(StateValue::Object(result));
        }

        let variant = current_variant.ok_or(SchemaError::UndefinedUnionState)?;
        let schema = self
            .variants
            .get(&variant)
            .ok_or_else(|| SchemaError::UnknownVariant { discriminator: variant.clone() })?;
        let inner = state
            .as_object()
            .and_then(|o| o.get("value"))
            .cloned()
            .unwrap_or(StateValue::Null);
        let new_inner = schema.apply_op(path, kind, payload, &inner)?;

        let mut result = Map::new();
        result.insert("variant".into(), StateValue::from(variant));
        result.insert("value".into(), new_inner);
        Ok(StateValue::Object(result))
    }

    pub fn validate(&self, state: &StateValue) -> Result<(), SchemaError> {
        if state.is_null() {
            return Ok(());
        }
        let obj = state.as_object().ok_or_else(|| SchemaError::MalformedPayload {
            reason: "tagged union state must be an object".into(),
        })?;
        let variant = obj
            .get("variant")
            .and_then(StateValue::as_str)
            .ok_or(SchemaError::UndefinedUnionState)?;
        let schema = self
            .variants
            .get(variant)
            .ok_or_else(|| SchemaError::UnknownVariant { discriminator: variant.to_string() })?;
        let value = obj.get("value").cloned().unwrap_or(StateValue::Null);
        schema.validate(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::scalar::ScalarSchema;
    use crate::value::json;

    fn schema() -> TaggedSchema {
        TaggedSchema::new("type")
            .variant("text", Schema::Scalar(ScalarSchema::string()))
            .variant("number", Schema::Scalar(ScalarSchema::number()))
    }

    #[test]
    fn set_unknown_variant_is_rejected() {
        let tagged = schema();
        let state = tagged.initial_state();
        let err = tagged
            .apply_op(&Path::empty(), OpKind::TaggedSet, &json!({"variant": "nope", "value": 1}), &state)
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownVariant { .. }));
    }

    #[test]
    fn recursing_into_undefined_state_errors() {
        let tagged = schema();
        let state = StateValue::Null;
        let err = tagged
            .apply_op(&Path::empty(), OpKind::ScalarSet, &json!("x"), &state)
            .unwrap_err();
        assert!(matches!(err, SchemaError::UndefinedUnionState));
    }

    #[test]
    fn set_then_recurse_into_variant_payload() {
        let tagged = schema();
        let mut state = tagged.initial_state();
        state = tagged
            .apply_op(&Path::empty(), OpKind::TaggedSet, &json!({"variant": "text", "value": "hi"}), &state)
            .unwrap();
        assert_eq!(state["value"], json!("hi"));
    }
}
