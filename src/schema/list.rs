//! List schema node: an ordered, densely-keyed sequence of elements.
//!
//! Entries are stored as `{id, key, value}` triples sorted by `key`
//! (lexicographic `OrderKey` order). The schema does not generate keys
//! itself — the caller supplies `key` on `list.insert`/`list.move`,
//! keeping key generation an external, swappable capability (see
//! `order_key.rs`).

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::error::SchemaError;
use crate::op::OpKind;
use crate::order_key::OrderKey;
use crate::path::Path;
use crate::value::{type_name, StateValue};

use super::Schema;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSchema {
    pub element: std::sync::Arc<Schema>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}

impl ListSchema {
    pub fn new(element: Schema) -> Self {
        ListSchema {
            element: std::sync::Arc::new(element),
            min_length: None,
            max_length: None,
        }
    }

    pub fn with_min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn with_max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn initial_state(&self) -> StateValue {
        StateValue::Array(Vec::new())
    }

    fn entries(state: &StateValue) -> Result<Vec<Map<String, StateValue>>, SchemaError> {
        match state {
            StateValue::Null => Ok(Vec::new()),
            StateValue::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_object()
                        .cloned()
                        .ok_or_else(|| SchemaError::MalformedPayload {
                            reason: format!("list entry is not an object, got {}", type_name(item)),
                        })
                })
                .collect(),
            other => Err(SchemaError::TypeMismatch {
                expected: "array".into(),
                actual: type_name(other).into(),
            }),
        }
    }

    fn entry_id(entry: &Map<String, StateValue>) -> Option<&str> {
        entry.get("id").and_then(StateValue::as_str)
    }

    fn entry_key(entry: &Map<String, StateValue>) -> Option<OrderKey> {
        entry
            .get("key")
            .and_then(StateValue::as_str)
            .map(OrderKey::new)
    }

    fn sort_entries(entries: &mut [Map<String, StateValue>]) {
        entries.sort_by(|a, b| Self::entry_key(a).cmp(&Self::entry_key(b)));
    }

    fn serialize(entries: Vec<Map<String, StateValue>>) -> StateValue {
        StateValue::Array(entries.into_iter().map(StateValue::Object).collect())
    }

    pub fn apply_op(
        &self,
        path: &Path,
        kind: OpKind,
        payload: &StateValue,
        state: &StateValue,
    ) -> Result<StateValue, SchemaError> {
        let mut entries = Self::entries(state)?;

        if path.is_empty() {
            return match kind {
                OpKind::ListInsert => {
                    let obj = payload.as_object().ok_or_else(|| SchemaError::MalformedPayload {
                        reason: "list.insert payload must be an object".into(),
                    })?;
                    let id = obj
                        .get("id")
                        .and_then(StateValue::as_str)
                        .ok_or_else(|| SchemaError::MalformedPayload {
                            reason: "list.insert payload missing 'id'".into(),
                        })?
                        .to_string();
                    let key = obj
                        .get("key")
                        .and_then(StateValue::as_str)
                        .ok_or_else(|| SchemaError::MalformedPayload {
                            reason: "list.insert payload missing 'key'".into(),
                        })?
                        .to_string();
                    let value = obj.get("value").cloned().unwrap_or(StateValue::Null);

                    if entries.iter().any(|e| Self::entry_id(e) == Some(id.as_str())) {
                        return Err(SchemaError::Refinement {
                            reason: format!("duplicate list entry id '{id}'"),
                        });
                    }
                    if let Some(max) = self.max_length {
                        if entries.len() >= max {
                            return Err(SchemaError::Refinement {
                                reason: format!("list already at max length {max}"),
                            });
                        }
                    }
                    self.element.validate(&value)?;

                    let mut entry = Map::new();
                    entry.insert("id".into(), StateValue::from(id));
                    entry.insert("key".into(), StateValue::from(key));
                    entry.insert("value".into(), value);
                    entries.push(entry);
                    Self::sort_entries(&mut entries);
                    Ok(Self::serialize(entries))
                }
                OpKind::ListSet => {
                    let incoming = payload.as_array().ok_or_else(|| SchemaError::MalformedPayload {
                        reason: "list.set payload must be an array".into(),
                    })?;
                    let mut replaced = Vec::with_capacity(incoming.len());
                    let mut seen_ids = std::collections::HashSet::new();
                    for item in incoming {
                        let obj = item.as_object().ok_or_else(|| SchemaError::MalformedPayload {
                            reason: "list.set entry must be an object".into(),
                        })?;
                        let id = obj
                            .get("id")
                            .and_then(StateValue::as_str)
                            .ok_or_else(|| SchemaError::MalformedPayload {
                                reason: "list.set entry missing 'id'".into(),
                            })?
                            .to_string();
                        if !seen_ids.insert(id.clone()) {
                            return Err(SchemaError::Refinement {
                                reason: format!("duplicate list entry id '{id}'"),
                            });
                        }
                        obj.get("key").and_then(StateValue::as_str).ok_or_else(|| {
                            SchemaError::MalformedPayload { reason: "list.set entry missing 'key'".into() }
                        })?;
                        let value = obj.get("value").cloned().unwrap_or(StateValue::Null);
                        self.element.validate(&value)?;
                        replaced.push(obj.clone());
                    }
                    if let Some(min) = self.min_length {
                        if replaced.len() < min {
                            return Err(SchemaError::Refinement {
                                reason: format!("list has fewer than {min} entries"),
                            });
                        }
                    }
                    if let Some(max) = self.max_length {
                        if replaced.len() > max {
                            return Err(SchemaError::Refinement {
                                reason: format!("list has more than {max} entries"),
                            });
                        }
                    }
                    Self::sort_entries(&mut replaced);
                    Ok(Self::serialize(replaced))
                }
                other => Err(SchemaError::UnsupportedKind { kind: other }),
            };
        }

        let id = path.head().expect("path non-empty checked above").to_string();
        let rest = path.shift();
        let idx = entries
            .iter()
            .position(|e| Self::entry_id(e) == Some(id.as_str()))
            .ok_or_else(|| SchemaError::ListEntryNotFound { id: id.clone() })?;

        if rest.is_empty() && kind == OpKind::ListRemove {
            entries.remove(idx);
            if let Some(min) = self.min_length {
                if entries.len() < min {
                    return Err(SchemaError::Refinement {
                        reason: format!("list would fall below min length {min}"),
                    });
                }
            }
        } else if rest.is_empty() && kind == OpKind::ListMove {
            let new_key = payload
                .get("key")
                .and_then(StateValue::as_str)
                .ok_or_else(|| SchemaError::MalformedPayload {
                    reason: "list.move payload missing 'key'".into(),
                })?
                .to_string();
            entries[idx].insert("key".into(), StateValue::from(new_key));
            Self::sort_entries(&mut entries);
        } else {
            // Every other kind — including the container's own Set aimed at
            // this one entry — belongs to the element, not the list.
            let current_value = entries[idx].get("value").cloned().unwrap_or(StateValue::Null);
            let new_value = self.element.apply_op(&rest, kind, payload, &current_value)?;
            entries[idx].insert("value".into(), new_value);
        }

        Ok(Self::serialize(entries))
    }

    pub fn validate(&self, state: &StateValue) -> Result<(), SchemaError> {
        let entries = Self::entries(state)?;
        if let Some(min) = self.min_length {
            if entries.len() < min {
                return Err(SchemaError::Refinement {
                    reason: format!("list has fewer than {min} entries"),
                });
            }
        }
        if let Some(max) = self.max_length {
            if entries.len() > max {
                return Err(SchemaError::Refinement {
                    reason: format!("list has more than {max} entries"),
                });
            }
        }
        for entry in &entries {
            let value = entry.get("value").cloned().unwrap_or(StateValue::Null);
            self.element.validate(&value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::scalar::ScalarSchema;
    use crate::value::json;

    fn schema() -> ListSchema {
        ListSchema::new(Schema::Scalar(ScalarSchema::string()))
    }

    #[test]
    fn insert_keeps_entries_sorted_by_key() {
        let list = schema();
        let mut state = list.initial_state();
        state = list
            .apply_op(&Path::empty(), OpKind::ListInsert, &json!({"id": "b", "key": "m", "value": "B"}), &state)
            .unwrap();
        state = list
            .apply_op(&Path::empty(), OpKind::ListInsert, &json!({"id": "a", "key": "a", "value": "A"}), &state)
            .unwrap();
        let arr = state.as_array().unwrap();
        assert_eq!(arr[0]["id"], json!("a"));
        assert_eq!(arr[1]["id"], json!("b"));
    }

    #[test]
    fn remove_missing_id_is_an_error() {
        let list = schema();
        let state = list.initial_state();
        let err = list
            .apply_op(&Path::from_tokens(vec!["nope"]), OpKind::ListRemove, &StateValue::Null, &state)
            .unwrap_err();
        assert!(matches!(err, SchemaError::ListEntryNotFound { .. }));
    }

    #[test]
    fn move_updates_key_and_resorts() {
        let list = schema();
        let mut state = list.initial_state();
        state = list
            .apply_op(&Path::empty(), OpKind::ListInsert, &json!({"id": "a", "key": "a", "value": "A"}), &state)
            .unwrap();
        state = list
            .apply_op(&Path::empty(), OpKind::ListInsert, &json!({"id": "b", "key": "b", "value": "B"}), &state)
            .unwrap();
        state = list
            .apply_op(&Path::from_tokens(vec!["a"]), OpKind::ListMove, &json!({"key": "z"}), &state)
            .unwrap();
        let arr = state.as_array().unwrap();
        assert_eq!(arr[0]["id"], json!("b"));
        assert_eq!(arr[1]["id"], json!("a"));
    }

    #[test]
    fn whole_list_set_replaces_and_sorts() {
        let list = schema();
        let state = list.initial_state();
        let replacement = json!([
            {"id": "b", "key": "m", "value": "B"},
            {"id": "a", "key": "a", "value": "A"},
        ]);
        let state = list.apply_op(&Path::empty(), OpKind::ListSet, &replacement, &state).unwrap();
        let arr = state.as_array().unwrap();
        assert_eq!(arr[0]["id"], json!("a"));
        assert_eq!(arr[1]["id"], json!("b"));
    }

    #[test]
    fn whole_list_set_rejects_duplicate_ids() {
        let list = schema();
        let state = list.initial_state();
        let replacement = json!([
            {"id": "a", "key": "a", "value": "A"},
            {"id": "a", "key": "b", "value": "A2"},
        ]);
        let err = list.apply_op(&Path::empty(), OpKind::ListSet, &replacement, &state).unwrap_err();
        assert!(matches!(err, SchemaError::Refinement { .. }));
    }

    #[test]
    fn entry_set_by_id_delegates_to_element() {
        let list = schema();
        let mut state = list.initial_state();
        state = list
            .apply_op(&Path::empty(), OpKind::ListInsert, &json!({"id": "a", "key": "a", "value": "A"}), &state)
            .unwrap();
        state = list
            .apply_op(&Path::from_tokens(vec!["a"]), OpKind::ScalarSet, &json!("A2"), &state)
            .unwrap();
        let arr = state.as_array().unwrap();
        assert_eq!(arr[0]["value"], json!("A2"));
    }
}
