//! HotStore: the append-only write-ahead log of transactions applied
//! since the last cold snapshot.
//!
//! Grounded on `storage/transaction_log.rs`'s sled-backed log, adapted
//! from "one log of heterogeneous graph operations" to "one log per
//! document, keyed by the document's own monotonic version". The
//! teacher's three-tree split (transactions / hash index / pending)
//! becomes a two-tree split here: `entries` holds the WAL proper, keyed
//! by `doc_id` + big-endian version so a document's entries sort and
//! range-scan in version order; `meta` holds each document's last
//! stored version for an O(1) gap check on append, the same role the
//! teacher's hash-index tree plays for O(1) duplicate detection.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{HotError, HotOp};
use crate::op::Transaction;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub transaction: Transaction,
    pub version: u64,
    pub timestamp: i64,
}

/// Capability contract for the write-ahead log. `append_checked`
/// enforces the gap invariant (`spec.md` §4.7): a document's versions
/// in the hot store must be contiguous starting one past the last
/// snapshot, so replay never silently skips a transaction.
#[async_trait]
pub trait HotStore: Send + Sync {
    async fn get_since(&self, doc_id: &str, version: u64) -> Result<Vec<WalEntry>, HotError>;
    async fn append_checked(&self, doc_id: &str, entry: WalEntry) -> Result<(), HotError>;
    async fn truncate_upto(&self, doc_id: &str, version: u64) -> Result<(), HotError>;
}

fn entry_key(doc_id: &str, version: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(doc_id.len() + 1 + 8);
    key.extend_from_slice(doc_id.as_bytes());
    key.push(0); // NUL separator: doc ids never contain it, keeps keys bijective
    key.extend_from_slice(&version.to_be_bytes());
    key
}

fn doc_prefix(doc_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(doc_id.len() + 1);
    key.extend_from_slice(doc_id.as_bytes());
    key.push(0);
    key
}

fn backend_error(doc_id: &str, op: HotOp, cause: impl std::error::Error + Send + Sync + 'static) -> HotError {
    HotError::Backend {
        doc_id: doc_id.to_string(),
        op,
        cause: Box::new(cause),
    }
}

pub struct SledHotStore {
    entries: sled::Tree,
    meta: sled::Tree,
}

impl SledHotStore {
    pub fn new(db: &sled::Db) -> Result<Self, sled::Error> {
        Ok(SledHotStore {
            entries: db.open_tree("wal_entries")?,
            meta: db.open_tree("wal_meta")?,
        })
    }

    async fn last_version(&self, doc_id: &str) -> Result<Option<u64>, HotError> {
        let raw = self
            .meta
            .get(doc_id)
            .map_err(|e| backend_error(doc_id, HotOp::Append, e))?;
        Ok(raw.map(|ivec| u64::from_be_bytes(ivec.as_ref().try_into().expect("meta value is 8 bytes"))))
    }
}

#[async_trait]
impl HotStore for SledHotStore {
    async fn get_since(&self, doc_id: &str, version: u64) -> Result<Vec<WalEntry>, HotError> {
        let start = entry_key(doc_id, version + 1);
        let prefix = doc_prefix(doc_id);
        let mut out = Vec::new();
        for item in self.entries.range(start..) {
            let (key, value) = item.map_err(|e| backend_error(doc_id, HotOp::GetSince, e))?;
            if !key.starts_with(&prefix) {
                break;
            }
            let entry: WalEntry =
                serde_json::from_slice(&value).map_err(|e| backend_error(doc_id, HotOp::GetSince, e))?;
            out.push(entry);
        }
        Ok(out)
    }

    async fn append_checked(&self, doc_id: &str, entry: WalEntry) -> Result<(), HotError> {
        let last = self.last_version(doc_id).await?;
        let expected = last.map(|v| v + 1).unwrap_or(1);
        if entry.version != expected {
            return Err(HotError::VersionGap {
                doc_id: doc_id.to_string(),
                expected,
                actual_previous: last,
            });
        }
        let key = entry_key(doc_id, entry.version);
        let value = serde_json::to_vec(&entry).map_err(|e| backend_error(doc_id, HotOp::Append, e))?;
        self.entries
            .insert(key, value)
            .map_err(|e| backend_error(doc_id, HotOp::Append, e))?;
        self.meta
            .insert(doc_id, &entry.version.to_be_bytes())
            .map_err(|e| backend_error(doc_id, HotOp::Append, e))?;
        self.entries
            .flush_async()
            .await
            .map_err(|e| backend_error(doc_id, HotOp::Append, e))?;
        Ok(())
    }

    async fn truncate_upto(&self, doc_id: &str, version: u64) -> Result<(), HotError> {
        let start = doc_prefix(doc_id);
        let end = entry_key(doc_id, version + 1);
        let keys: Vec<_> = self
            .entries
            .range(start..end)
            .map(|item| item.map(|(k, _)| k).map_err(|e| backend_error(doc_id, HotOp::Truncate, e)))
            .collect::<Result<_, _>>()?;
        for key in keys {
            self.entries
                .remove(key)
                .map_err(|e| backend_error(doc_id, HotOp::Truncate, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Transaction;

    fn entry(version: u64) -> WalEntry {
        WalEntry {
            transaction: Transaction::new(vec![], 0),
            version,
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn append_enforces_contiguous_versions() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let store = SledHotStore::new(&db).unwrap();

        store.append_checked("doc-1", entry(1)).await.unwrap();
        store.append_checked("doc-1", entry(2)).await.unwrap();
        let err = store.append_checked("doc-1", entry(4)).await.unwrap_err();
        assert!(matches!(err, HotError::VersionGap { .. }));
    }

    #[tokio::test]
    async fn get_since_returns_only_newer_entries() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let store = SledHotStore::new(&db).unwrap();

        for v in 1..=5 {
            store.append_checked("doc-1", entry(v)).await.unwrap();
        }
        let since = store.get_since("doc-1", 3).await.unwrap();
        assert_eq!(since.len(), 2);
        assert_eq!(since[0].version, 4);
        assert_eq!(since[1].version, 5);
    }

    #[tokio::test]
    async fn truncate_drops_entries_up_to_version() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let store = SledHotStore::new(&db).unwrap();

        for v in 1..=5 {
            store.append_checked("doc-1", entry(v)).await.unwrap();
        }
        store.truncate_upto("doc-1", 3).await.unwrap();
        let remaining = store.get_since("doc-1", 0).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].version, 4);
    }

    #[tokio::test]
    async fn separate_documents_do_not_interfere() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let store = SledHotStore::new(&db).unwrap();

        store.append_checked("doc-a", entry(1)).await.unwrap();
        store.append_checked("doc-b", entry(1)).await.unwrap();
        assert_eq!(store.get_since("doc-a", 0).await.unwrap().len(), 1);
        assert_eq!(store.get_since("doc-b", 0).await.unwrap().len(), 1);
    }
}
