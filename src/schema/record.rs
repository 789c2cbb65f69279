//! Record schema node: a fixed set of named, independently-typed fields.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::error::SchemaError;
use crate::op::OpKind;
use crate::path::Path;
use crate::value::{StateValue, StateValueExt};

use super::Schema;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordField {
    pub schema: Arc<Schema>,
    pub optional: bool,
}

impl RecordField {
    pub fn new(schema: Schema) -> Self {
        RecordField {
            schema: Arc::new(schema),
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecordSchema {
    pub fields: BTreeMap<String, RecordField>,
}

impl RecordSchema {
    pub fn new() -> Self {
        RecordSchema::default()
    }

    pub fn field(mut self, name: impl Into<String>, field: RecordField) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn initial_state(&self) -> StateValue {
        let mut obj = Map::new();
        for (name, field) in &self.fields {
            let child = field.schema.initial_state();
            if !child.is_null() || !field.optional {
                obj.insert(name.clone(), child);
            }
        }
        StateValue::Object(obj)
    }

    pub fn apply_op(
        &self,
        path: &Path,
        kind: OpKind,
        payload: &StateValue,
        state: &StateValue,
    ) -> Result<StateValue, SchemaError> {
        let mut obj = state.as_object_or_empty();

        if path.is_empty() {
            return match kind {
                OpKind::RecordSet => {
                    let incoming = payload.expect_object().map_err(|reason| {
                        SchemaError::MalformedPayload { reason }
                    })?;
                    for key in incoming.keys() {
                        if !self.fields.contains_key(key) {
                            return Err(SchemaError::UnknownField { field: key.clone() });
                        }
                    }
                    let mut next = Map::new();
                    for (name, field) in &self.fields {
                        let value = incoming
                            .get(name)
                            .cloned()
                            .unwrap_or_else(|| field.schema.initial_state());
                        if !value.is_null() || !field.optional {
                            next.insert(name.clone(), value);
                        }
                    }
                    let result = StateValue::Object(next);
                    self.validate(&result)?;
                    Ok(result)
                }
                other => Err(SchemaError::UnsupportedKind { kind: other }),
            };
        }

        let token = path.head().expect("path non-empty checked above").to_string();
        let rest = path.shift();
        let field = self
            .fields
            .get(&token)
            .ok_or_else(|| SchemaError::UnknownField { field: token.clone() })?;

        if rest.is_empty() && kind == OpKind::RecordUnset {
            if !field.optional && field.schema.initial_state().is_null() {
                return Err(SchemaError::CannotUnsetRequired { field: token });
            }
            obj.remove(&token);
            return Ok(StateValue::Object(obj));
        }

        let child_state = obj
            .get(&token)
            .cloned()
            .unwrap_or_else(|| field.schema.initial_state());
        let new_child = field.schema.apply_op(&rest, kind, payload, &child_state)?;
        obj.insert(token, new_child);
        Ok(StateValue::Object(obj))
    }

    pub fn validate(&self, state: &StateValue) -> Result<(), SchemaError> {
        let obj = state.expect_object().map_err(|reason| SchemaError::MalformedPayload { reason })?;
        for key in obj.keys() {
            if !self.fields.contains_key(key) {
                return Err(SchemaError::UnknownField { field: key.clone() });
            }
        }
        for (name, field) in &self.fields {
            match obj.get(name) {
                Some(value) => field.schema.validate(value)?,
                None if field.optional => {}
                None => {
                    let default = field.schema.initial_state();
                    if default.is_null() {
                        return Err(SchemaError::MissingRequiredField { field: name.clone() });
                    }
                }
            }
        }
        Ok(())
    }
}
