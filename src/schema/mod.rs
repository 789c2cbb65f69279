//! Recursive schema definitions: the typed shape a document's state must
//! conform to, and the dispatch table operations are checked and applied
//! against.
//!
//! Each node kind lives in its own file (`scalar.rs`, `record.rs`,
//! `list.rs`, `tagged.rs`, `sum.rs`, `tree.rs`), the way the teacher
//! crate splits storage concerns across `storage/{transaction,
//! transaction_log, graph_registry}.rs`. [`Schema`] is the dispatch enum
//! that routes `initial_state`/`apply_op`/`validate` to the right node
//! implementation; nested schemas are shared via `Arc` so the same
//! sub-schema (e.g. a reused "tag" record) can appear in multiple places
//! without cloning.

pub mod list;
pub mod record;
pub mod scalar;
pub mod sum;
pub mod tagged;
pub mod tree;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::op::OpKind;
use crate::path::Path;
use crate::value::StateValue;

pub use list::ListSchema;
pub use record::{RecordField, RecordSchema};
pub use scalar::{ScalarKind, ScalarSchema, ScalarValidator};
pub use sum::SumSchema;
pub use tagged::TaggedSchema;
pub use tree::{TreeNodeType, TreeSchema};

/// The typed shape of a document node. Composite variants hold `Arc`ed
/// sub-schemas so a schema graph can share nodes and describe
/// recursive shapes (a tree's node type referencing the same tree).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Schema {
    Scalar(ScalarSchema),
    Record(RecordSchema),
    List(ListSchema),
    Tagged(TaggedSchema),
    Sum(SumSchema),
    Tree(TreeSchema),
}

impl Schema {
    /// The value a freshly-created document (or field, or element) takes
    /// before any operation has touched it.
    pub fn initial_state(&self) -> StateValue {
        match self {
            Schema::Scalar(s) => s.initial_state().unwrap_or(StateValue::Null),
            Schema::Record(s) => s.initial_state(),
            Schema::List(s) => s.initial_state(),
            Schema::Tagged(s) => s.initial_state(),
            Schema::Sum(s) => s.initial_state(),
            Schema::Tree(s) => s.initial_state(),
        }
    }

    /// Apply one operation to `state`, returning the new state or the
    /// schema-level reason it was rejected. Never mutates in place and
    /// never leaves partially-applied state on error: the caller
    /// discards the `Err` and keeps the previous state.
    pub fn apply_op(
        &self,
        path: &Path,
        kind: OpKind,
        payload: &StateValue,
        state: &StateValue,
    ) -> Result<StateValue, SchemaError> {
        match self {
            Schema::Scalar(s) => {
                if !path.is_empty() {
                    return Err(SchemaError::UnknownField { field: path.tokens()[0].clone() });
                }
                match kind {
                    OpKind::ScalarSet => s.apply_set(payload),
                    other => Err(SchemaError::UnsupportedKind { kind: other }),
                }
            }
            Schema::Record(s) => s.apply_op(path, kind, payload, state),
            Schema::List(s) => s.apply_op(path, kind, payload, state),
            Schema::Tagged(s) => s.apply_op(path, kind, payload, state),
            Schema::Sum(s) => s.apply_op(path, kind, payload, state),
            Schema::Tree(s) => s.apply_op(path, kind, payload, state),
        }
    }

    /// Structural + refinement validation of a whole state tree,
    /// independent of any particular operation. Used after whole-state
    /// replacement (`record.set` at the root) and in tests.
    pub fn validate(&self, state: &StateValue) -> Result<(), SchemaError> {
        match self {
            Schema::Scalar(s) => s.validate(state),
            Schema::Record(s) => s.validate(state),
            Schema::List(s) => s.validate(state),
            Schema::Tagged(s) => s.validate(state),
            Schema::Sum(s) => s.validate(state),
            Schema::Tree(s) => s.validate(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::json;

    #[test]
    fn scalar_rejects_nonempty_path() {
        let schema = Schema::Scalar(ScalarSchema::string());
        let path = Path::from_tokens(vec!["nope"]);
        let err = schema
            .apply_op(&path, OpKind::ScalarSet, &json!("x"), &StateValue::Null)
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownField { .. }));
    }

    #[test]
    fn scalar_set_then_validate_round_trips() {
        let schema = Schema::Scalar(ScalarSchema::string().required());
        let state = schema
            .apply_op(&Path::empty(), OpKind::ScalarSet, &json!("hello"), &StateValue::Null)
            .unwrap();
        assert!(schema.validate(&state).is_ok());
    }

    #[test]
    fn nested_record_routes_through_child_schema() {
        let schema = Schema::Record(
            RecordSchema::new().field("title", RecordField::new(Schema::Scalar(ScalarSchema::string()))),
        );
        let state = schema.initial_state();
        let path = Path::from_tokens(vec!["title"]);
        let state = schema.apply_op(&path, OpKind::ScalarSet, &json!("hi"), &state).unwrap();
        assert_eq!(state["title"], json!("hi"));
    }
}
