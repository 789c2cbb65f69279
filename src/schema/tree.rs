//! Tree schema node: a single-rooted hierarchy of typed nodes, each
//! positioned among its siblings by an `OrderKey`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::error::SchemaError;
use crate::op::OpKind;
use crate::order_key::OrderKey;
use crate::path::Path;
use crate::value::{type_name, StateValue};

use super::Schema;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNodeType {
    pub allowed_children: Vec<String>,
    pub data_schema: Arc<Schema>,
}

impl TreeNodeType {
    pub fn new(data_schema: Schema) -> Self {
        TreeNodeType {
            allowed_children: Vec::new(),
            data_schema: Arc::new(data_schema),
        }
    }

    pub fn allowing_children(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_children = types.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSchema {
    pub root_type: String,
    pub node_types: HashMap<String, TreeNodeType>,
}

impl TreeSchema {
    pub fn new(root_type: impl Into<String>) -> Self {
        TreeSchema {
            root_type: root_type.into(),
            node_types: HashMap::new(),
        }
    }

    pub fn node_type(mut self, name: impl Into<String>, node_type: TreeNodeType) -> Self {
        self.node_types.insert(name.into(), node_type);
        self
    }

    pub fn initial_state(&self) -> StateValue {
        StateValue::Object(Map::new())
    }

    fn nodes(state: &StateValue) -> Result<Map<String, StateValue>, SchemaError> {
        match state {
            StateValue::Null => Ok(Map::new()),
            StateValue::Object(obj) => Ok(obj.clone()),
            other => Err(SchemaError::TypeMismatch {
                expected: "object".into(),
                actual: type_name(other).into(),
            }),
        }
    }

    fn node_field<'a>(node: &'a StateValue, field: &str) -> Option<&'a str> {
        node.as_object().and_then(|o| o.get(field)).and_then(StateValue::as_str)
    }

    fn resolve_node_type(&self, name: &str) -> Result<&TreeNodeType, SchemaError> {
        self.node_types
            .get(name)
            .ok_or_else(|| SchemaError::UnknownNodeType { node_type: name.to_string() })
    }

    /// True if `candidate` is `ancestor` or a descendant of it.
    fn is_descendant_or_self(nodes: &Map<String, StateValue>, candidate: &str, ancestor: &str) -> bool {
        let mut current = Some(candidate.to_string());
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = nodes.get(&id).and_then(|n| Self::node_field(n, "parent")).map(str::to_string);
        }
        false
    }

    pub fn apply_op(
        &self,
        path: &Path,
        kind: OpKind,
        payload: &StateValue,
        state: &StateValue,
    ) -> Result<StateValue, SchemaError> {
        let mut nodes = Self::nodes(state)?;

        if path.is_empty() {
            return match kind {
                OpKind::TreeInsert => {
                    let obj = payload.as_object().ok_or_else(|| SchemaError::MalformedPayload {
                        reason: "tree.insert payload must be an object".into(),
                    })?;
                    let id = obj
                        .get("id")
                        .and_then(StateValue::as_str)
                        .ok_or_else(|| SchemaError::MalformedPayload { reason: "tree.insert missing 'id'".into() })?
                        .to_string();
                    let node_type_name = obj
                        .get("type")
                        .and_then(StateValue::as_str)
                        .ok_or_else(|| SchemaError::MalformedPayload { reason: "tree.insert missing 'type'".into() })?
                        .to_string();
                    let parent = obj.get("parent").and_then(StateValue::as_str).map(str::to_string);
                    let key = obj
                        .get("key")
                        .and_then(StateValue::as_str)
                        .ok_or_else(|| SchemaError::MalformedPayload { reason: "tree.insert missing 'key'".into() })?
                        .to_string();
                    let data = obj.get("data").cloned().unwrap_or(StateValue::Null);

                    if nodes.contains_key(&id) {
                        return Err(SchemaError::DuplicateNodeId { id });
                    }
                    let node_type = self.resolve_node_type(&node_type_name)?;

                    match &parent {
                        None => {
                            if node_type_name != self.root_type {
                                return Err(SchemaError::DisallowedChildType {
                                    node_type: node_type_name,
                                    parent_type: "<root>".into(),
                                });
                            }
                            if nodes.values().any(|n| Self::node_field(n, "parent").is_none()) {
                                return Err(SchemaError::DuplicateRoot);
                            }
                        }
                        Some(parent_id) => {
                            let parent_node = nodes
                                .get(parent_id)
                                .ok_or_else(|| SchemaError::TreeNodeNotFound { id: parent_id.clone() })?;
                            let parent_type_name = Self::node_field(parent_node, "type")
                                .expect("stored nodes always carry a type")
                                .to_string();
                            let parent_type = self.resolve_node_type(&parent_type_name)?;
                            if !parent_type.allowed_children.iter().any(|t| t == &node_type_name) {
                                return Err(SchemaError::DisallowedChildType {
                                    node_type: node_type_name,
                                    parent_type: parent_type_name,
                                });
                            }
                        }
                    }

                    node_type.data_schema.validate(&data)?;

                    let mut node = Map::new();
                    node.insert("type".into(), StateValue::from(node_type_name));
                    node.insert("parent".into(), parent.map(StateValue::from).unwrap_or(StateValue::Null));
                    node.insert("key".into(), StateValue::from(key));
                    node.insert("data".into(), data);
                    nodes.insert(id, StateValue::Object(node));
                    Ok(StateValue::Object(nodes))
                }
                OpKind::TreeSet => {
                    let incoming = payload.as_object().ok_or_else(|| SchemaError::MalformedPayload {
                        reason: "tree.set payload must be an object of id -> node".into(),
                    })?;
                    for (id, node) in incoming {
                        let type_name_ = Self::node_field(node, "type").ok_or_else(|| {
                            SchemaError::MalformedPayload { reason: format!("node '{id}' missing type") }
                        })?;
                        if !node.as_object().map(|o| o.contains_key("key")).unwrap_or(false) {
                            return Err(SchemaError::MalformedPayload {
                                reason: format!("node '{id}' missing key"),
                            });
                        }
                        self.resolve_node_type(type_name_)?;
                    }
                    let replacement = StateValue::Object(incoming.clone());
                    self.validate(&replacement)?;
                    Ok(replacement)
                }
                other => Err(SchemaError::UnsupportedKind { kind: other }),
            };
        }

        let id = path.head().expect("path non-empty checked above").to_string();
        let rest = path.shift();
        if !nodes.contains_key(&id) {
            return Err(SchemaError::TreeNodeNotFound { id });
        }

        if rest.is_empty() && !matches!(kind, OpKind::TreeRemove | OpKind::TreeMove) {
            // Every other kind — including the container's own Set aimed at
            // this one node's data — belongs to the node's data schema.
            let node_type_name = Self::node_field(&nodes[&id], "type")
                .expect("stored nodes always carry a type")
                .to_string();
            let node_type = self.resolve_node_type(&node_type_name)?;
            let current_data = nodes[&id]
                .as_object()
                .and_then(|o| o.get("data"))
                .cloned()
                .unwrap_or(StateValue::Null);
            let new_data = node_type.data_schema.apply_op(&rest, kind, payload, &current_data)?;
            let node = nodes.get_mut(&id).expect("checked above");
            node.as_object_mut().expect("nodes are objects").insert("data".into(), new_data);
        } else if rest.is_empty() {
            match kind {
                OpKind::TreeRemove => {
                    if nodes.values().any(|n| Self::node_field(n, "parent") == Some(id.as_str())) {
                        return Err(SchemaError::Refinement {
                            reason: format!("tree node '{id}' still has children"),
                        });
                    }
                    nodes.remove(&id);
                }
                OpKind::TreeMove => {
                    let obj = payload.as_object().ok_or_else(|| SchemaError::MalformedPayload {
                        reason: "tree.move payload must be an object".into(),
                    })?;
                    let new_parent = obj
                        .get("parent")
                        .and_then(StateValue::as_str)
                        .ok_or_else(|| SchemaError::MalformedPayload { reason: "tree.move missing 'parent'".into() })?
                        .to_string();
                    let new_key = obj
                        .get("key")
                        .and_then(StateValue::as_str)
                        .ok_or_else(|| SchemaError::MalformedPayload { reason: "tree.move missing 'key'".into() })?
                        .to_string();

                    if new_parent == id || Self::is_descendant_or_self(&nodes, &new_parent, &id) {
                        return Err(SchemaError::CycleDetected { id: id.clone(), new_parent });
                    }
                    let parent_node = nodes
                        .get(&new_parent)
                        .ok_or_else(|| SchemaError::TreeNodeNotFound { id: new_parent.clone() })?;
                    let parent_type_name = Self::node_field(parent_node, "type")
                        .expect("stored nodes always carry a type")
                        .to_string();
                    let node_type_name = Self::node_field(&nodes[&id], "type")
                        .expect("stored nodes always carry a type")
                        .to_string();
                    let parent_type = self.resolve_node_type(&parent_type_name)?;
                    if !parent_type.allowed_children.iter().any(|t| t == &node_type_name) {
                        return Err(SchemaError::DisallowedChildType {
                            node_type: node_type_name,
                            parent_type: parent_type_name,
                        });
                    }

                    let node = nodes.get_mut(&id).expect("checked above");
                    let node_obj = node.as_object_mut().expect("nodes are always objects");
                    node_obj.insert("parent".into(), StateValue::from(new_parent));
                    node_obj.insert("key".into(), StateValue::from(new_key));
                }
                _ => unreachable!("filtered to TreeRemove | TreeMove above"),
            }
        } else {
            let node_type_name = Self::node_field(&nodes[&id], "type")
                .expect("stored nodes always carry a type")
                .to_string();
            let node_type = self.resolve_node_type(&node_type_name)?;
            let current_data = nodes[&id]
                .as_object()
                .and_then(|o| o.get("data"))
                .cloned()
                .unwrap_or(StateValue::Null);
            let new_data = node_type.data_schema.apply_op(&rest, kind, payload, &current_data)?;
            let node = nodes.get_mut(&id).expect("checked above");
            node.as_object_mut().expect("nodes are objects").insert("data".into(), new_data);
        }

        Ok(StateValue::Object(nodes))
    }

    pub fn validate(&self, state: &StateValue) -> Result<(), SchemaError> {
        let nodes = Self::nodes(state)?;
        let root_count = nodes.values().filter(|n| Self::node_field(n, "parent").is_none()).count();
        if root_count > 1 {
            return Err(SchemaError::DuplicateRoot);
        }
        for (id, node) in &nodes {
            let type_name_ = Self::node_field(node, "type")
                .ok_or_else(|| SchemaError::MalformedPayload { reason: format!("node '{id}' missing type") })?;
            let node_type = self.resolve_node_type(type_name_)?;
            let data = node.as_object().and_then(|o| o.get("data")).cloned().unwrap_or(StateValue::Null);
            node_type.data_schema.validate(&data)?;
            if let Some(parent_id) = Self::node_field(node, "parent") {
                if !nodes.contains_key(parent_id) {
                    return Err(SchemaError::TreeNodeNotFound { id: parent_id.to_string() });
                }
            }
        }
        Ok(())
    }

    #[allow(dead_code)]
    fn order_key_of(node: &StateValue) -> Option<OrderKey> {
        Self::node_field(node, "key").map(OrderKey::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::scalar::ScalarSchema;
    use crate::value::json;

    fn schema() -> TreeSchema {
        TreeSchema::new("folder")
            .node_type("folder", TreeNodeType::new(Schema::Scalar(ScalarSchema::string())).allowing_children(["folder", "item"]))
            .node_type("item", TreeNodeType::new(Schema::Scalar(ScalarSchema::string())))
    }

    #[test]
    fn insert_root_then_child() {
        let tree = schema();
        let mut state = tree.initial_state();
        state = tree
            .apply_op(&Path::empty(), OpKind::TreeInsert, &json!({"id": "root", "type": "folder", "key": "a", "data": "root"}), &state)
            .unwrap();
        state = tree
            .apply_op(&Path::empty(), OpKind::TreeInsert, &json!({"id": "child", "type": "item", "parent": "root", "key": "a", "data": "leaf"}), &state)
            .unwrap();
        assert!(state.as_object().unwrap().contains_key("child"));
    }

    #[test]
    fn second_root_is_rejected() {
        let tree = schema();
        let mut state = tree.initial_state();
        state = tree
            .apply_op(&Path::empty(), OpKind::TreeInsert, &json!({"id": "root", "type": "folder", "key": "a", "data": "root"}), &state)
            .unwrap();
        let err = tree
            .apply_op(&Path::empty(), OpKind::TreeInsert, &json!({"id": "root2", "type": "folder", "key": "b", "data": "root"}), &state)
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateRoot));
    }

    #[test]
    fn move_into_own_descendant_is_a_cycle() {
        let tree = schema();
        let mut state = tree.initial_state();
        state = tree
            .apply_op(&Path::empty(), OpKind::TreeInsert, &json!({"id": "root", "type": "folder", "key": "a", "data": "root"}), &state)
            .unwrap();
        state = tree
            .apply_op(&Path::empty(), OpKind::TreeInsert, &json!({"id": "child", "type": "folder", "parent": "root", "key": "a", "data": "c"}), &state)
            .unwrap();
        let err = tree
            .apply_op(&Path::from_tokens(vec!["root"]), OpKind::TreeMove, &json!({"parent": "child", "key": "a"}), &state)
            .unwrap_err();
        assert!(matches!(err, SchemaError::CycleDetected { .. }));
    }

    #[test]
    fn disallowed_child_type_rejected() {
        let tree = schema();
        let state = tree.initial_state();
        let state = tree
            .apply_op(&Path::empty(), OpKind::TreeInsert, &json!({"id": "root", "type": "folder", "key": "a", "data": "root"}), &state)
            .unwrap();
        let state = tree
            .apply_op(&Path::empty(), OpKind::TreeInsert, &json!({"id": "leaf", "type": "item", "parent": "root", "key": "a", "data": "x"}), &state)
            .unwrap();
        let result = tree.apply_op(
            &Path::empty(),
            OpKind::TreeInsert,
            &json!({"id": "bad", "type": "item", "parent": "leaf", "key": "a", "data": "x"}),
            &state,
        );
        assert!(matches!(result, Err(SchemaError::DisallowedChildType { .. })));
    }

    #[test]
    fn whole_tree_set_replaces_nodes() {
        let tree = schema();
        let state = tree.initial_state();
        let replacement = json!({
            "root": {"type": "folder", "parent": null, "key": "a", "data": "root"},
        });
        let state = tree.apply_op(&Path::empty(), OpKind::TreeSet, &replacement, &state).unwrap();
        assert!(state.as_object().unwrap().contains_key("root"));
    }

    #[test]
    fn whole_tree_set_rejects_second_root() {
        let tree = schema();
        let state = tree.initial_state();
        let replacement = json!({
            "root": {"type": "folder", "parent": null, "key": "a", "data": "root"},
            "root2": {"type": "folder", "parent": null, "key": "b", "data": "root"},
        });
        let err = tree.apply_op(&Path::empty(), OpKind::TreeSet, &replacement, &state).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateRoot));
    }

    #[test]
    fn node_set_by_id_delegates_to_data_schema() {
        let tree = schema();
        let mut state = tree.initial_state();
        state = tree
            .apply_op(&Path::empty(), OpKind::TreeInsert, &json!({"id": "root", "type": "folder", "key": "a", "data": "root"}), &state)
            .unwrap();
        state = tree
            .apply_op(&Path::from_tokens(vec!["root"]), OpKind::ScalarSet, &json!("renamed"), &state)
            .unwrap();
        assert_eq!(state["root"]["data"], json!("renamed"));
    }
}
