//! Operation and Transaction: the unit of mutation and the unit of
//! commit/dedup/broadcast.
//!
//! Grounded on `storage/transaction_log.rs`'s `Operation`/`Transaction`
//! pair — there `Operation` is a closed Rust enum matched to one PKM
//! action; here `OpKind` plays the same role but names the closed set of
//! kinds defined by `spec.md` §3/§4.4, since a generic schema-typed
//! engine can't enumerate payload shapes as enum variants the way a
//! single-purpose knowledge graph can.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::path::Path;
use crate::value::StateValue;

/// The closed set of operation kinds a schema node family can handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    ScalarSet,
    RecordSet,
    RecordUnset,
    ListSet,
    ListInsert,
    ListRemove,
    ListMove,
    TaggedSet,
    SumSet,
    TreeSet,
    TreeInsert,
    TreeRemove,
    TreeMove,
}

impl OpKind {
    /// `*.set` kinds collapse within a pending buffer — see `spec.md`
    /// Rule 10.
    pub fn is_deduplicable(self) -> bool {
        matches!(
            self,
            OpKind::ScalarSet
                | OpKind::RecordSet
                | OpKind::ListSet
                | OpKind::TaggedSet
                | OpKind::SumSet
                | OpKind::TreeSet
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::ScalarSet => "scalar.set",
            OpKind::RecordSet => "record.set",
            OpKind::RecordUnset => "record.unset",
            OpKind::ListSet => "list.set",
            OpKind::ListInsert => "list.insert",
            OpKind::ListRemove => "list.remove",
            OpKind::ListMove => "list.move",
            OpKind::TaggedSet => "tagged.set",
            OpKind::SumSet => "sum.set",
            OpKind::TreeSet => "tree.set",
            OpKind::TreeInsert => "tree.insert",
            OpKind::TreeRemove => "tree.remove",
            OpKind::TreeMove => "tree.move",
        }
    }
}

/// `{kind, path, payload}` — a single state edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op {
    pub kind: OpKind,
    pub path: Path,
    pub payload: StateValue,
}

impl Op {
    pub fn new(kind: OpKind, path: Path, payload: StateValue) -> Self {
        Op { kind, path, payload }
    }

    /// `(encoded_path, kind)` — the dedup key used by the pending buffer.
    pub fn dedup_key(&self) -> (String, OpKind) {
        (self.path.encode(), self.kind)
    }
}

/// `{id, ops, timestamp}` — the unit of commit, dedup, and broadcast.
/// `id` is globally unique; two transactions with the same id are the
/// same logical event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub ops: Vec<Op>,
    pub timestamp: i64,
}

impl Transaction {
    /// Construct a transaction with a fresh id and the given ops.
    pub fn new(ops: Vec<Op>, timestamp: i64) -> Self {
        Transaction {
            id: Uuid::new_v4().to_string(),
            ops,
            timestamp,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_key_matches_only_path_and_kind() {
        let op_a = Op::new(OpKind::ScalarSet, Path::from_tokens(vec!["title"]), StateValue::from("a"));
        let op_b = Op::new(OpKind::ScalarSet, Path::from_tokens(vec!["title"]), StateValue::from("b"));
        assert_eq!(op_a.dedup_key(), op_b.dedup_key());

        let op_c = Op::new(OpKind::ScalarSet, Path::from_tokens(vec!["other"]), StateValue::from("a"));
        assert_ne!(op_a.dedup_key(), op_c.dedup_key());
    }

    #[test]
    fn set_kinds_are_deduplicable_others_are_not() {
        assert!(OpKind::ScalarSet.is_deduplicable());
        assert!(OpKind::TreeSet.is_deduplicable());
        assert!(!OpKind::ListInsert.is_deduplicable());
        assert!(!OpKind::TreeMove.is_deduplicable());
    }

    #[test]
    fn empty_transaction_is_invalid_marker() {
        let tx = Transaction::new(vec![], 0);
        assert!(tx.is_empty());
    }

    #[test]
    fn op_path_serializes_as_an_encoded_string_on_the_wire() {
        let op = Op::new(OpKind::ScalarSet, Path::from_tokens(vec!["a", "b"]), StateValue::from("x"));
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["path"], serde_json::Value::String(op.path.encode()));
        assert!(json["path"].is_string());
        let back: Op = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }
}
