//! Sum schema node: an untagged alternation of candidate schemas,
//! resolved by which candidate accepts the value (first match wins).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::op::OpKind;
use crate::path::Path;
use crate::value::StateValue;

use super::Schema;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SumSchema {
    pub variants: Vec<Arc<Schema>>,
}

impl SumSchema {
    pub fn new(variants: Vec<Schema>) -> Self {
        SumSchema {
            variants: variants.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn initial_state(&self) -> StateValue {
        StateValue::Null
    }

    fn resolve(&self, value: &StateValue) -> Option<&Arc<Schema>> {
        self.variants.iter().find(|schema| schema.validate(value).is_ok())
    }

    pub fn apply_op(
        &self,
        path: &Path,
        kind: OpKind,
        payload: &StateValue,
        state: &StateValue,
    ) -> Result<StateValue, SchemaError> {
        if path.is_empty() && kind == OpKind::SumSet {
            let variant = self
                .resolve(payload)
                .ok_or_else(|| SchemaError::MalformedPayload {
                    reason: "payload does not match any sum variant".into(),
                })?;
            variant.validate(payload)?;
            return Ok(payload.clone());
        }

        let variant = self.resolve(state).ok_or(SchemaError::UndefinedUnionState)?;
        variant.apply_op(path, kind, payload, state)
    }

    pub fn validate(&self, state: &StateValue) -> Result<(), SchemaError> {
        if state.is_null() {
            return Ok(());
        }
        if self.resolve(state).is_some() {
            Ok(())
        } else {
            Err(SchemaError::MalformedPayload {
                reason: "value does not match any sum variant".into(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::scalar::ScalarSchema;
    use crate::value::json;

    fn schema() -> SumSchema {
        SumSchema::new(vec![
            Schema::Scalar(ScalarSchema::string()),
            Schema::Scalar(ScalarSchema::number()),
        ])
    }

    #[test]
    fn resolves_by_first_matching_variant() {
        let sum = schema();
        let state = sum.initial_state();
        let after = sum.apply_op(&Path::empty(), OpKind::SumSet, &json!("hi"), &state).unwrap();
        assert_eq!(after, json!("hi"));
        let after = sum.apply_op(&Path::empty(), OpKind::SumSet, &json!(5), &after).unwrap();
        assert_eq!(after, json!(5));
    }

    #[test]
    fn non_matching_payload_is_rejected() {
        let sum = schema();
        let state = sum.initial_state();
        assert!(sum.apply_op(&Path::empty(), OpKind::SumSet, &json!(true), &state).is_err());
    }
}
