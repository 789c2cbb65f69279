//! DocumentInstance: one document's live, in-memory authoritative copy,
//! wired to its cold snapshot and hot WAL, plus the broadcast channel
//! its subscribers watch.
//!
//! The restore-then-replay lifecycle and the two-phase submit (append
//! to the WAL, then apply) are grounded on `storage/transaction.rs`'s
//! `execute_with_transaction` — begin, do the work, commit or abort —
//! adapted so "begin" means "append the op durably" rather than
//! "register an in-flight marker", since here the WAL append itself
//! *is* the durability boundary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::warn;

use crate::config::DocumentConfig;
use crate::error::SubmitRejection;
use crate::op::Transaction;
use crate::server_document::ServerDocument;
use crate::storage::{ColdStore, HotStore, StoredDoc, WalEntry};
use crate::value::StateValue;

const BROADCAST_CAPACITY: usize = 256;

struct Gate {
    document: ServerDocument,
    last_snapshot_version: u64,
    transactions_since_snapshot: u64,
    last_snapshot_time: Instant,
}

pub struct DocumentInstance {
    doc_id: String,
    cold: Arc<dyn ColdStore>,
    hot: Arc<dyn HotStore>,
    snapshot_transaction_threshold: u64,
    snapshot_interval: Duration,
    gate: Mutex<Gate>,
    broadcast_tx: broadcast::Sender<Transaction>,
    last_touch: std::sync::Mutex<Instant>,
    presence: RwLock<HashMap<String, StateValue>>,
    presence_tx: broadcast::Sender<(String, StateValue)>,
    replay_gap_count: AtomicU64,
}

impl DocumentInstance {
    /// Restore a document: load its last cold snapshot (or seed a fresh
    /// one from `config.initial`), then replay every hot-log entry
    /// since that snapshot's version.
    pub async fn restore(
        doc_id: String,
        config: &DocumentConfig,
        cold: Arc<dyn ColdStore>,
        hot: Arc<dyn HotStore>,
    ) -> Result<Self, RestoreError> {
        let stored = cold.load(&doc_id).await.map_err(RestoreError::Cold)?;
        let (state, version) = match stored {
            Some(doc) => (doc.state, doc.version),
            None => {
                let state = config.initial.resolve(&doc_id);
                let fresh = StoredDoc {
                    state: state.clone(),
                    version: 0,
                    schema_version: 1,
                    saved_at: Utc::now(),
                };
                cold.save(&doc_id, &fresh).await.map_err(RestoreError::Cold)?;
                (state, 0)
            }
        };

        let mut document =
            ServerDocument::from_state(config.schema.clone(), state, version, config.max_transaction_history);

        let entries = hot.get_since(&doc_id, version).await.map_err(RestoreError::Hot)?;
        let mut replay_gap_count = 0u64;
        let mut transactions_since_snapshot = 0u64;
        for entry in entries {
            if entry.version != document.version() + 1 {
                warn!(
                    doc_id = %doc_id,
                    expected = document.version() + 1,
                    actual = entry.version,
                    "gap in write-ahead log during replay"
                );
                replay_gap_count += 1;
            }
            document
                .apply(&entry.transaction)
                .map_err(|e| RestoreError::Replay { doc_id: doc_id.clone(), source: e })?;
            transactions_since_snapshot += 1;
        }

        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (presence_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        Ok(DocumentInstance {
            doc_id,
            cold,
            hot,
            snapshot_transaction_threshold: config.snapshot.transaction_threshold,
            snapshot_interval: config.snapshot.interval,
            gate: Mutex::new(Gate {
                document,
                last_snapshot_version: version,
                transactions_since_snapshot,
                last_snapshot_time: Instant::now(),
            }),
            broadcast_tx,
            last_touch: std::sync::Mutex::new(Instant::now()),
            presence: RwLock::new(HashMap::new()),
            presence_tx,
            replay_gap_count: AtomicU64::new(replay_gap_count),
        })
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn replay_gap_count(&self) -> u64 {
        self.replay_gap_count.load(Ordering::Relaxed)
    }

    pub fn touch(&self) {
        *self.last_touch.lock().expect("last_touch mutex poisoned") = Instant::now();
    }

    pub fn idle_for(&self) -> std::time::Duration {
        self.last_touch.lock().expect("last_touch mutex poisoned").elapsed()
    }

    pub async fn version(&self) -> u64 {
        self.gate.lock().await.document.version()
    }

    pub async fn state(&self) -> StateValue {
        self.gate.lock().await.document.state().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Transaction> {
        self.broadcast_tx.subscribe()
    }

    /// Validate, durably append, apply, and broadcast one transaction.
    /// Never routes through `ServerDocument::submit`: that convenience
    /// wrapper validates-then-applies with no durability step in
    /// between, which is only safe for bare/local use, not here.
    pub async fn submit(&self, tx: Transaction) -> Result<u64, SubmitRejection> {
        self.touch();
        if tx.is_empty() {
            return Err(SubmitRejection::empty());
        }

        let mut gate = self.gate.lock().await;
        if gate.document.has_processed(&tx.id) {
            return Err(SubmitRejection::already_processed());
        }
        gate.document.validate(&tx).map_err(|e| SubmitRejection::validation(&e))?;

        let next_version = gate.document.version() + 1;
        let entry = WalEntry {
            transaction: tx.clone(),
            version: next_version,
            timestamp: tx.timestamp,
        };
        self.hot
            .append_checked(&self.doc_id, entry)
            .await
            .map_err(|_| SubmitRejection::storage_unavailable())?;

        gate.document
            .apply(&tx)
            .expect("a transaction that passed validate() must apply cleanly");
        gate.transactions_since_snapshot += 1;
        let should_snapshot = gate.transactions_since_snapshot >= self.snapshot_transaction_threshold
            || gate.last_snapshot_time.elapsed() >= self.snapshot_interval;
        let version = gate.document.version();
        drop(gate);

        let _ = self.broadcast_tx.send(tx);

        if should_snapshot {
            if let Err(e) = self.save_snapshot().await {
                warn!(doc_id = %self.doc_id, error = %e, "snapshot after submit failed");
            }
        }

        Ok(version)
    }

    /// Persist the current state to the cold store and truncate the
    /// hot log behind it. Re-checks `last_snapshot_version` under the
    /// same lock that produced the state being saved, so a concurrent
    /// snapshot (e.g. triggered by idle eviction racing a submit) never
    /// truncates entries a later snapshot still needs.
    pub async fn save_snapshot(&self) -> Result<(), crate::error::ColdError> {
        let mut gate = self.gate.lock().await;
        let (state, version) = gate.document.snapshot();
        if version <= gate.last_snapshot_version {
            return Ok(());
        }

        let stored = StoredDoc {
            state,
            version,
            schema_version: 1,
            saved_at: Utc::now(),
        };
        self.cold.save(&self.doc_id, &stored).await?;
        if let Err(e) = self.hot.truncate_upto(&self.doc_id, version).await {
            warn!(doc_id = %self.doc_id, error = %e, "WAL truncate after snapshot failed; log will just be longer than necessary");
        }
        gate.last_snapshot_version = version;
        gate.transactions_since_snapshot = 0;
        gate.last_snapshot_time = Instant::now();
        Ok(())
    }

    pub async fn set_presence(&self, peer_id: String, state: StateValue) {
        self.presence.write().await.insert(peer_id.clone(), state.clone());
        let _ = self.presence_tx.send((peer_id, state));
    }

    pub async fn get_presence(&self, peer_id: &str) -> Option<StateValue> {
        self.presence.read().await.get(peer_id).cloned()
    }

    pub async fn remove_presence(&self, peer_id: &str) {
        self.presence.write().await.remove(peer_id);
    }

    pub fn subscribe_presence(&self) -> broadcast::Receiver<(String, StateValue)> {
        self.presence_tx.subscribe()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("loading cold snapshot failed: {0}")]
    Cold(crate::error::ColdError),
    #[error("loading hot log failed: {0}")]
    Hot(crate::error::HotError),
    #[error("replaying hot log for '{doc_id}' failed: {source}")]
    Replay {
        doc_id: String,
        source: crate::error::OperationError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{Op, OpKind};
    use crate::path::Path;
    use crate::schema::{RecordField, RecordSchema, ScalarSchema};
    use crate::storage::{JsonFileColdStore, SledHotStore};
    use crate::value::json;
    use crate::Schema;

    fn config() -> DocumentConfig {
        let schema = Schema::Record(
            RecordSchema::new().field("title", RecordField::new(Schema::Scalar(ScalarSchema::string()))),
        );
        DocumentConfig::new(schema, json!({"title": "untitled"}))
    }

    fn tx(title: &str) -> Transaction {
        Transaction::new(
            vec![Op::new(OpKind::ScalarSet, Path::from_tokens(vec!["title"]), json!(title))],
            0,
        )
    }

    async fn backends() -> (Arc<dyn ColdStore>, Arc<dyn HotStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cold: Arc<dyn ColdStore> = Arc::new(JsonFileColdStore::new(dir.path().join("cold")));
        let db = sled::open(dir.path().join("hot")).unwrap();
        let hot: Arc<dyn HotStore> = Arc::new(SledHotStore::new(&db).unwrap());
        (cold, hot, dir)
    }

    #[tokio::test]
    async fn fresh_restore_uses_configured_initial_state() {
        let (cold, hot, _dir) = backends().await;
        let instance = DocumentInstance::restore("doc-1".into(), &config(), cold, hot).await.unwrap();
        assert_eq!(instance.state().await["title"], json!("untitled"));
        assert_eq!(instance.version().await, 0);
    }

    #[tokio::test]
    async fn submit_persists_to_hot_log_and_bumps_version() {
        let (cold, hot, _dir) = backends().await;
        let instance = DocumentInstance::restore("doc-1".into(), &config(), cold, hot.clone()).await.unwrap();
        let version = instance.submit(tx("hello")).await.unwrap();
        assert_eq!(version, 1);
        assert_eq!(instance.state().await["title"], json!("hello"));
        assert_eq!(hot.get_since("doc-1", 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn restore_replays_hot_log_after_restart() {
        let (cold, hot, _dir) = backends().await;
        {
            let instance = DocumentInstance::restore("doc-1".into(), &config(), cold.clone(), hot.clone()).await.unwrap();
            instance.submit(tx("hello")).await.unwrap();
            instance.submit(tx("world")).await.unwrap();
        }
        let instance = DocumentInstance::restore("doc-1".into(), &config(), cold, hot).await.unwrap();
        assert_eq!(instance.version().await, 2);
        assert_eq!(instance.state().await["title"], json!("world"));
    }

    #[tokio::test]
    async fn snapshot_truncates_hot_log() {
        let (cold, hot, _dir) = backends().await;
        let instance = DocumentInstance::restore("doc-1".into(), &config(), cold.clone(), hot.clone()).await.unwrap();
        instance.submit(tx("hello")).await.unwrap();
        instance.save_snapshot().await.unwrap();
        assert_eq!(hot.get_since("doc-1", 0).await.unwrap().len(), 0);

        let reloaded = cold.load("doc-1").await.unwrap().unwrap();
        assert_eq!(reloaded.version, 1);
    }

    #[tokio::test]
    async fn duplicate_transaction_id_is_rejected() {
        let (cold, hot, _dir) = backends().await;
        let instance = DocumentInstance::restore("doc-1".into(), &config(), cold, hot).await.unwrap();
        let t = tx("hello");
        let id = t.id.clone();
        instance.submit(t).await.unwrap();
        let replay = Transaction { id, ops: vec![Op::new(OpKind::ScalarSet, Path::from_tokens(vec!["title"]), json!("again"))], timestamp: 1 };
        let err = instance.submit(replay).await.unwrap_err();
        assert_eq!(err.as_str(), SubmitRejection::ALREADY_PROCESSED);
    }
}
