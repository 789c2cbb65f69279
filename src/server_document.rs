//! ServerDocument: a `Document` plus the bookkeeping an authoritative
//! server needs — a monotonic version counter and a bounded window of
//! already-processed transaction ids for idempotent retries.
//!
//! The bounded processed-transaction window mirrors
//! `storage/transaction_log.rs`'s hash-index tree, which exists for the
//! same reason: let a client safely resend a transaction it's unsure
//! landed, without the server reapplying it or growing an unbounded
//! dedup set.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::error::{OperationError, SchemaError, SubmitRejection};
use crate::op::Transaction;
use crate::schema::Schema;
use crate::value::StateValue;

pub struct ServerDocument {
    document: crate::document::Document,
    version: u64,
    processed_order: VecDeque<String>,
    processed_set: HashSet<String>,
    max_history: usize,
}

impl ServerDocument {
    pub fn new(schema: Arc<Schema>, max_history: usize) -> Self {
        ServerDocument {
            document: crate::document::Document::new(schema),
            version: 0,
            processed_order: VecDeque::new(),
            processed_set: HashSet::new(),
            max_history,
        }
    }

    pub fn from_state(schema: Arc<Schema>, state: StateValue, version: u64, max_history: usize) -> Self {
        ServerDocument {
            document: crate::document::Document::from_state(schema, state),
            version,
            processed_order: VecDeque::new(),
            processed_set: HashSet::new(),
            max_history,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn state(&self) -> &StateValue {
        self.document.state()
    }

    pub fn has_processed(&self, tx_id: &str) -> bool {
        self.processed_set.contains(tx_id)
    }

    fn mark_processed(&mut self, tx_id: String) {
        if self.processed_set.insert(tx_id.clone()) {
            self.processed_order.push_back(tx_id);
            while self.processed_order.len() > self.max_history {
                if let Some(evicted) = self.processed_order.pop_front() {
                    self.processed_set.remove(&evicted);
                }
            }
        }
    }

    /// Dry-run a transaction's ops against the current state without
    /// mutating anything. Used to validate before a WAL append.
    pub fn validate(&self, tx: &Transaction) -> Result<(), SchemaError> {
        let mut probe = crate::document::Document::from_state(
            self.document.schema().clone(),
            self.document.state().clone(),
        );
        probe.apply(&tx.ops).map_err(|e| e.0)
    }

    /// Apply an already-validated, already-durable transaction: bump
    /// the version and record it as processed. Callers are expected to
    /// have called `validate` (and appended to the hot store) first —
    /// see `instance.rs`'s two-phase commit.
    pub fn apply(&mut self, tx: &Transaction) -> Result<(), OperationError> {
        self.document.apply(&tx.ops)?;
        self.version += 1;
        self.mark_processed(tx.id.clone());
        Ok(())
    }

    /// Convenience wrapper combining the idempotency check, emptiness
    /// check, validation, and application in one call. Bare/test use
    /// only — `DocumentInstance::submit` never calls this, since it
    /// needs to interleave a WAL append between validate and apply.
    pub fn submit(&mut self, tx: Transaction) -> Result<(), SubmitRejection> {
        if tx.is_empty() {
            return Err(SubmitRejection::empty());
        }
        if self.has_processed(&tx.id) {
            return Err(SubmitRejection::already_processed());
        }
        self.validate(&tx).map_err(|e| SubmitRejection::validation(&e))?;
        self.apply(&tx).map_err(|e| SubmitRejection::validation(&e.0))?;
        Ok(())
    }

    pub fn snapshot(&self) -> (StateValue, u64) {
        (self.document.state().clone(), self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{Op, OpKind};
    use crate::path::Path;
    use crate::schema::{RecordField, RecordSchema, ScalarSchema};
    use crate::value::json;

    fn server() -> ServerDocument {
        let schema = Schema::Record(
            RecordSchema::new().field("title", RecordField::new(Schema::Scalar(ScalarSchema::string()))),
        );
        ServerDocument::new(Arc::new(schema), 4)
    }

    fn tx(payload: &str) -> Transaction {
        Transaction::new(
            vec![Op::new(OpKind::ScalarSet, Path::from_tokens(vec!["title"]), json!(payload))],
            0,
        )
    }

    #[test]
    fn submit_applies_and_bumps_version() {
        let mut s = server();
        s.submit(tx("hi")).unwrap();
        assert_eq!(s.version(), 1);
        assert_eq!(s.state()["title"], json!("hi"));
    }

    #[test]
    fn resubmitting_same_transaction_id_is_idempotent() {
        let mut s = server();
        let t = tx("hi");
        let id = t.id.clone();
        s.submit(t).unwrap();
        let replay = Transaction { id, ops: vec![], timestamp: 0 };
        let err = s.submit(replay).unwrap_err();
        // empty-ops check runs first; use a non-empty replay to hit the dedup path
        assert_eq!(err.as_str(), SubmitRejection::EMPTY);
    }

    #[test]
    fn resubmitting_same_transaction_id_with_ops_is_rejected() {
        let mut s = server();
        let t = tx("hi");
        let id = t.id.clone();
        s.submit(t).unwrap();
        let replay = Transaction { id, ops: vec![Op::new(OpKind::ScalarSet, Path::from_tokens(vec!["title"]), json!("again"))], timestamp: 1 };
        let err = s.submit(replay).unwrap_err();
        assert_eq!(err.as_str(), SubmitRejection::ALREADY_PROCESSED);
        assert_eq!(s.version(), 1);
    }

    #[test]
    fn empty_transaction_is_rejected() {
        let mut s = server();
        let err = s.submit(Transaction::new(vec![], 0)).unwrap_err();
        assert_eq!(err.as_str(), SubmitRejection::EMPTY);
    }

    #[test]
    fn processed_history_is_bounded() {
        let mut s = server();
        let mut ids = Vec::new();
        for i in 0..8 {
            let t = tx(&format!("v{i}"));
            ids.push(t.id.clone());
            s.submit(t).unwrap();
        }
        assert!(!s.has_processed(&ids[0]));
        assert!(s.has_processed(ids.last().unwrap()));
    }
}
