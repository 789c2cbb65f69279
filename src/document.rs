//! Document: schema-typed state plus the local pending-op buffer used
//! to build up a `Transaction` before it is sent anywhere.
//!
//! `Document` itself knows nothing about networking, persistence, or
//! confirmation — it is the in-memory state machine `ServerDocument`
//! and `DocumentInstance` build on. Grounded on the overall shape of
//! `storage/transaction.rs`'s `execute_with_transaction`: a scoped unit
//! of work that either commits in full or rolls the state back, never
//! leaving a partial edit visible.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::error::{NestedTransactionError, OperationError, SchemaError};
use crate::op::{Op, OpKind, Transaction};
use crate::path::Path;
use crate::schema::Schema;
use crate::value::StateValue;

/// Failure mode of [`Document::transaction`]: either the transaction
/// machinery itself refused to run (nesting), or the closure's own
/// edits were rejected by the schema.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error(transparent)]
    Nested(#[from] NestedTransactionError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Schema-typed, locally-mutable document state plus a pending-op
/// buffer. `*.set` ops collapse in the buffer by `(path, kind)` per
/// `spec.md` Rule 10 — only the most recent set to a given location is
/// ever worth sending.
pub struct Document {
    schema: Arc<Schema>,
    current_state: StateValue,
    pending_ops: Vec<Op>,
    pending_index: HashMap<(String, OpKind), usize>,
    in_transaction: bool,
    tx_snapshot: Option<StateValue>,
}

impl Document {
    /// A fresh document at its schema's initial state.
    pub fn new(schema: Arc<Schema>) -> Self {
        let current_state = schema.initial_state();
        Document {
            schema,
            current_state,
            pending_ops: Vec::new(),
            pending_index: HashMap::new(),
            in_transaction: false,
            tx_snapshot: None,
        }
    }

    /// Reconstruct a document at an already-known state (e.g. loaded
    /// from a cold snapshot and replayed against the hot log).
    pub fn from_state(schema: Arc<Schema>, state: StateValue) -> Self {
        Document {
            schema,
            current_state: state,
            pending_ops: Vec::new(),
            pending_index: HashMap::new(),
            in_transaction: false,
            tx_snapshot: None,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn state(&self) -> &StateValue {
        &self.current_state
    }

    pub fn pending_len(&self) -> usize {
        self.pending_ops.len()
    }

    fn enqueue_pending(&mut self, op: Op) {
        let key = op.dedup_key();
        if op.kind.is_deduplicable() {
            if let Some(&idx) = self.pending_index.get(&key) {
                self.pending_ops[idx] = op;
                return;
            }
        }
        self.pending_index.insert(key, self.pending_ops.len());
        self.pending_ops.push(op);
    }

    /// Apply one op immediately against `current_state` and buffer it
    /// for the next `flush`. Outside of `transaction`, each call is its
    /// own implicit one-op unit: on schema rejection, `current_state`
    /// is left untouched.
    pub fn apply_op(&mut self, kind: OpKind, path: Path, payload: StateValue) -> Result<(), SchemaError> {
        let op = Op::new(kind, path, payload);
        let new_state = self.schema.apply_op(&op.path, op.kind, &op.payload, &self.current_state)?;
        self.current_state = new_state;
        self.enqueue_pending(op);
        Ok(())
    }

    /// Apply a whole batch of already-confirmed ops atomically: either
    /// every op lands, or `current_state` is unchanged. Used for
    /// replaying WAL entries and applying committed remote
    /// transactions — the ops are not re-added to the pending buffer,
    /// since they are, by construction, already accounted for.
    pub fn apply(&mut self, ops: &[Op]) -> Result<(), OperationError> {
        let mut state = self.current_state.clone();
        for op in ops {
            state = self.schema.apply_op(&op.path, op.kind, &op.payload, &state)?;
        }
        self.current_state = state;
        Ok(())
    }

    /// Run `f` as a single transactional unit: every op issued through
    /// `self.apply_op` inside the closure is captured, and on success
    /// is returned as a fresh `Transaction`. On failure, `current_state`
    /// is rolled back to what it was before the closure ran and no ops
    /// are buffered. Transactions do not nest.
    pub fn transaction<F>(&mut self, timestamp: i64, f: F) -> Result<Transaction, TransactionError>
    where
        F: FnOnce(&mut Document) -> Result<(), SchemaError>,
    {
        if self.in_transaction {
            return Err(NestedTransactionError.into());
        }
        self.in_transaction = true;
        self.tx_snapshot = Some(self.current_state.clone());
        let pending_mark = self.pending_ops.len();

        let result = f(self);
        self.in_transaction = false;

        match result {
            Ok(()) => {
                self.tx_snapshot = None;
                let ops: Vec<Op> = self.pending_ops.split_off(pending_mark);
                self.pending_index.retain(|_, idx| *idx < pending_mark);
                Ok(Transaction::new(ops, timestamp))
            }
            Err(e) => {
                self.current_state = self.tx_snapshot.take().expect("set at transaction entry");
                self.pending_ops.truncate(pending_mark);
                self.pending_index.retain(|_, idx| *idx < pending_mark);
                Err(e.into())
            }
        }
    }

    /// Drain the pending buffer into a `Transaction`, independent of
    /// any `transaction` call — used when ops were issued one at a
    /// time outside a closure and are now ready to send.
    pub fn flush(&mut self, timestamp: i64) -> Transaction {
        let ops = std::mem::take(&mut self.pending_ops);
        self.pending_index.clear();
        Transaction::new(ops, timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RecordField, RecordSchema, ScalarSchema};
    use crate::value::json;

    fn doc() -> Document {
        let schema = Schema::Record(
            RecordSchema::new()
                .field("title", RecordField::new(Schema::Scalar(ScalarSchema::string())))
                .field("count", RecordField::new(Schema::Scalar(ScalarSchema::number()))),
        );
        Document::new(Arc::new(schema))
    }

    #[test]
    fn apply_op_mutates_state_and_buffers_pending() {
        let mut d = doc();
        d.apply_op(OpKind::ScalarSet, Path::from_tokens(vec!["title"]), json!("hi")).unwrap();
        assert_eq!(d.state()["title"], json!("hi"));
        assert_eq!(d.pending_len(), 1);
    }

    #[test]
    fn repeated_set_to_same_path_dedups_in_pending_buffer() {
        let mut d = doc();
        d.apply_op(OpKind::ScalarSet, Path::from_tokens(vec!["title"]), json!("a")).unwrap();
        d.apply_op(OpKind::ScalarSet, Path::from_tokens(vec!["title"]), json!("b")).unwrap();
        assert_eq!(d.pending_len(), 1);
        let tx = d.flush(0);
        assert_eq!(tx.ops.len(), 1);
        assert_eq!(tx.ops[0].payload, json!("b"));
    }

    #[test]
    fn transaction_rolls_back_on_schema_error() {
        let mut d = doc();
        let before = d.state().clone();
        let result = d.transaction(0, |doc| {
            doc.apply_op(OpKind::ScalarSet, Path::from_tokens(vec!["title"]), json!("ok"))?;
            doc.apply_op(OpKind::ScalarSet, Path::from_tokens(vec!["title"]), json!(5))?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(d.state(), &before);
        assert_eq!(d.pending_len(), 0);
    }

    #[test]
    fn transaction_returns_exactly_its_own_ops() {
        let mut d = doc();
        let tx = d
            .transaction(0, |doc| {
                doc.apply_op(OpKind::ScalarSet, Path::from_tokens(vec!["title"]), json!("hi"))?;
                doc.apply_op(OpKind::ScalarSet, Path::from_tokens(vec!["count"]), json!(1))?;
                Ok(())
            })
            .unwrap();
        assert_eq!(tx.ops.len(), 2);
        assert_eq!(d.pending_len(), 0);
    }

    #[test]
    fn nested_transaction_is_rejected() {
        let mut d = doc();
        let result = d.transaction(0, |doc| {
            let nested = doc.transaction(0, |_| Ok(()));
            assert!(nested.is_err());
            Ok(())
        });
        assert!(result.is_ok());
    }

    #[test]
    fn apply_batch_is_all_or_nothing() {
        let mut d = doc();
        let ops = vec![
            Op::new(OpKind::ScalarSet, Path::from_tokens(vec!["title"]), json!("hi")),
            Op::new(OpKind::ScalarSet, Path::from_tokens(vec!["count"]), json!("not a number")),
        ];
        let before = d.state().clone();
        assert!(d.apply(&ops).is_err());
        assert_eq!(d.state(), &before);
    }
}
