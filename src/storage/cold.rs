//! ColdStore: point-in-time document snapshots.
//!
//! Grounded on `graph_manager.rs`'s save-to-JSON routine and
//! `graph_registry.rs`'s atomic-write-then-rename pattern for registry
//! persistence — both write a full structure to a temp path and rename
//! over the destination so a crash mid-write never corrupts the
//! previous snapshot.

use std::path::{Path as FsPath, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ColdError, ColdOp};
use crate::value::StateValue;

/// A persisted snapshot of a document's state at a given version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDoc {
    pub state: StateValue,
    pub version: u64,
    pub schema_version: u32,
    pub saved_at: DateTime<Utc>,
}

/// Capability contract for durable, point-in-time document storage.
/// Implementations need not be transactional beyond "a save either
/// lands whole or not at all" — the hot store's WAL is what provides
/// durability for everything since the last snapshot.
#[async_trait]
pub trait ColdStore: Send + Sync {
    async fn load(&self, doc_id: &str) -> Result<Option<StoredDoc>, ColdError>;
    async fn save(&self, doc_id: &str, doc: &StoredDoc) -> Result<(), ColdError>;
    async fn delete(&self, doc_id: &str) -> Result<(), ColdError>;
}

fn backend_error(doc_id: &str, op: ColdOp, cause: impl std::error::Error + Send + Sync + 'static) -> ColdError {
    ColdError::Backend {
        doc_id: doc_id.to_string(),
        op,
        cause: Box::new(cause),
    }
}

/// File-per-document JSON cold store. One `<doc_id>.json` file per
/// document under `root`, written atomically via a `.tmp` sibling and
/// `rename`, matching `graph_registry.rs`'s `save_registry`.
pub struct JsonFileColdStore {
    root: PathBuf,
}

impl JsonFileColdStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JsonFileColdStore { root: root.into() }
    }

    fn path_for(&self, doc_id: &str) -> PathBuf {
        self.root.join(format!("{doc_id}.json"))
    }

    fn tmp_path_for(&self, doc_id: &str) -> PathBuf {
        self.root.join(format!("{doc_id}.json.tmp"))
    }

    async fn ensure_root(&self) -> Result<(), std::io::Error> {
        tokio::fs::create_dir_all(&self.root).await
    }
}

#[async_trait]
impl ColdStore for JsonFileColdStore {
    async fn load(&self, doc_id: &str) -> Result<Option<StoredDoc>, ColdError> {
        let path = self.path_for(doc_id);
        if !FsPath::new(&path).exists() {
            return Ok(None);
        }
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| backend_error(doc_id, ColdOp::Load, e))?;
        let doc = serde_json::from_slice(&bytes)
            .map_err(|e| backend_error(doc_id, ColdOp::Load, e))?;
        Ok(Some(doc))
    }

    async fn save(&self, doc_id: &str, doc: &StoredDoc) -> Result<(), ColdError> {
        self.ensure_root().await.map_err(|e| backend_error(doc_id, ColdOp::Save, e))?;
        let tmp = self.tmp_path_for(doc_id);
        let bytes = serde_json::to_vec_pretty(doc).map_err(|e| backend_error(doc_id, ColdOp::Save, e))?;
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| backend_error(doc_id, ColdOp::Save, e))?;
        tokio::fs::rename(&tmp, self.path_for(doc_id))
            .await
            .map_err(|e| backend_error(doc_id, ColdOp::Save, e))?;
        debug!(doc_id, version = doc.version, "saved cold snapshot");
        Ok(())
    }

    async fn delete(&self, doc_id: &str) -> Result<(), ColdError> {
        let path = self.path_for(doc_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(backend_error(doc_id, ColdOp::Delete, e)),
        }
    }
}

/// sled-backed cold store, one value per document keyed by id, useful
/// when the hot store already pulls in `sled` and a second storage
/// dependency isn't worth carrying.
pub struct SledColdStore {
    tree: sled::Tree,
}

impl SledColdStore {
    pub fn new(db: &sled::Db) -> Result<Self, sled::Error> {
        Ok(SledColdStore {
            tree: db.open_tree("cold_snapshots")?,
        })
    }
}

#[async_trait]
impl ColdStore for SledColdStore {
    async fn load(&self, doc_id: &str) -> Result<Option<StoredDoc>, ColdError> {
        let bytes = self
            .tree
            .get(doc_id)
            .map_err(|e| backend_error(doc_id, ColdOp::Load, e))?;
        match bytes {
            Some(ivec) => {
                let doc = serde_json::from_slice(&ivec).map_err(|e| backend_error(doc_id, ColdOp::Load, e))?;
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, doc_id: &str, doc: &StoredDoc) -> Result<(), ColdError> {
        let bytes = serde_json::to_vec(doc).map_err(|e| backend_error(doc_id, ColdOp::Save, e))?;
        self.tree
            .insert(doc_id, bytes)
            .map_err(|e| backend_error(doc_id, ColdOp::Save, e))?;
        self.tree
            .flush_async()
            .await
            .map_err(|e| backend_error(doc_id, ColdOp::Save, e))?;
        Ok(())
    }

    async fn delete(&self, doc_id: &str) -> Result<(), ColdError> {
        self.tree
            .remove(doc_id)
            .map_err(|e| backend_error(doc_id, ColdOp::Delete, e))?;
        Ok(())
    }
}
