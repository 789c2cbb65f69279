//! Engine: the registry of live [`DocumentInstance`]s for one or more
//! document types, plus idle eviction.
//!
//! Grounded on `app_state.rs`'s `AppState` — a top-level
//! `Arc<RwLock<HashMap<String, RwLock<_>>>>` registry with a
//! double-checked-locking `get_or_create` and a `cleanup_and_save` pass
//! over everything loaded. `Engine` plays the same role for documents
//! that `AppState` plays for graphs, generalized to many document
//! *types* (each with its own [`DocumentConfig`]) rather than one fixed
//! kind of managed resource.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use crate::config::DocumentConfig;
use crate::error::SubmitRejection;
use crate::instance::{DocumentInstance, RestoreError};
use crate::op::Transaction;
use crate::storage::{ColdStore, HotStore};
use crate::value::StateValue;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown document type '{0}'")]
    UnknownDocumentType(String),
    #[error("failed to restore document '{doc_id}': {source}")]
    Restore { doc_id: String, source: RestoreError },
}

/// One document type's configuration plus the shared stores its
/// instances persist through.
struct DocumentTypeEntry {
    config: DocumentConfig,
    cold: Arc<dyn ColdStore>,
    hot: Arc<dyn HotStore>,
}

/// Registry of live documents across every registered document type.
/// `doc_id`s are namespaced by document type at the call site (the
/// engine itself only ever sees the bare id), matching the teacher's
/// one-flat-map-per-resource-kind layout rather than nesting a map of
/// maps.
pub struct Engine {
    types: RwLock<HashMap<String, DocumentTypeEntry>>,
    instances: Arc<RwLock<HashMap<String, (String, Arc<DocumentInstance>)>>>,
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            types: RwLock::new(HashMap::new()),
            instances: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a document type under `type_name`, giving every
    /// document of that type the same schema, snapshot policy, and
    /// storage backends.
    pub async fn register_type(
        &self,
        type_name: impl Into<String>,
        config: DocumentConfig,
        cold: Arc<dyn ColdStore>,
        hot: Arc<dyn HotStore>,
    ) {
        self.types
            .write()
            .await
            .insert(type_name.into(), DocumentTypeEntry { config, cold, hot });
    }

    /// Return the live instance for `doc_id` under `type_name`,
    /// restoring it from storage on first access. Double-checked
    /// locking avoids two concurrent callers racing to restore the
    /// same document twice.
    pub async fn get_or_restore(&self, type_name: &str, doc_id: &str) -> Result<Arc<DocumentInstance>, EngineError> {
        let instances = self.instances.read().await;
        if let Some((_, instance)) = instances.get(doc_id) {
            return Ok(instance.clone());
        }
        drop(instances);

        let mut instances = self.instances.write().await;
        if let Some((_, instance)) = instances.get(doc_id) {
            return Ok(instance.clone());
        }

        let types = self.types.read().await;
        let entry = types
            .get(type_name)
            .ok_or_else(|| EngineError::UnknownDocumentType(type_name.to_string()))?;

        let instance = DocumentInstance::restore(doc_id.to_string(), &entry.config, entry.cold.clone(), entry.hot.clone())
            .await
            .map_err(|source| EngineError::Restore { doc_id: doc_id.to_string(), source })?;
        drop(types);

        let instance = Arc::new(instance);
        instances.insert(doc_id.to_string(), (type_name.to_string(), instance.clone()));
        info!(doc_id, "restored document into engine");
        Ok(instance)
    }

    pub async fn submit(&self, type_name: &str, doc_id: &str, tx: Transaction) -> Result<u64, EngineSubmitError> {
        let instance = self.get_or_restore(type_name, doc_id).await?;
        instance.submit(tx).await.map_err(EngineSubmitError::Rejected)
    }

    pub async fn snapshot(&self, type_name: &str, doc_id: &str) -> Result<(), EngineError> {
        let instance = self.get_or_restore(type_name, doc_id).await?;
        if let Err(e) = instance.save_snapshot().await {
            warn!(doc_id, error = %e, "manual snapshot request failed");
        }
        Ok(())
    }

    pub async fn state(&self, type_name: &str, doc_id: &str) -> Result<StateValue, EngineError> {
        Ok(self.get_or_restore(type_name, doc_id).await?.state().await)
    }

    pub async fn subscribe(&self, type_name: &str, doc_id: &str) -> Result<broadcast::Receiver<Transaction>, EngineError> {
        Ok(self.get_or_restore(type_name, doc_id).await?.subscribe())
    }

    pub async fn set_presence(&self, type_name: &str, doc_id: &str, peer_id: String, state: StateValue) -> Result<(), EngineError> {
        let instance = self.get_or_restore(type_name, doc_id).await?;
        instance.set_presence(peer_id, state).await;
        Ok(())
    }

    pub async fn get_presence(&self, type_name: &str, doc_id: &str, peer_id: &str) -> Result<Option<StateValue>, EngineError> {
        Ok(self.get_or_restore(type_name, doc_id).await?.get_presence(peer_id).await)
    }

    pub async fn remove_presence(&self, type_name: &str, doc_id: &str, peer_id: &str) -> Result<(), EngineError> {
        let instance = self.get_or_restore(type_name, doc_id).await?;
        instance.remove_presence(peer_id).await;
        Ok(())
    }

    pub async fn subscribe_presence(&self, type_name: &str, doc_id: &str) -> Result<broadcast::Receiver<(String, StateValue)>, EngineError> {
        Ok(self.get_or_restore(type_name, doc_id).await?.subscribe_presence())
    }

    /// Evict instances that have been idle longer than their
    /// document type's `max_idle_time`, snapshotting each one first on
    /// a best-effort basis so eviction never loses durable writes that
    /// happen to sit behind the snapshot threshold.
    pub async fn evict_idle(&self) {
        let types = self.types.read().await;
        let mut instances = self.instances.write().await;
        let mut to_drop = Vec::new();

        for (doc_id, (type_name, instance)) in instances.iter() {
            let max_idle = types
                .get(type_name)
                .map(|e| e.config.max_idle_time)
                .unwrap_or(std::time::Duration::from_secs(300));
            if instance.idle_for() >= max_idle {
                to_drop.push(doc_id.clone());
            }
        }

        for doc_id in &to_drop {
            if let Some((_, instance)) = instances.get(doc_id) {
                if let Err(e) = instance.save_snapshot().await {
                    warn!(doc_id, error = %e, "snapshot before idle eviction failed; evicting anyway");
                }
            }
            instances.remove(doc_id);
            info!(doc_id, "evicted idle document from engine");
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineSubmitError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("{0}")]
    Rejected(SubmitRejection),
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

    async fn engine_with_backends() -> (Engine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cold: Arc<dyn ColdStore> = Arc::new(JsonFileColdStore::new(dir.path().join("cold")));
        let db = sled::open(dir.path().join("hot")).unwrap();
        let hot: Arc<dyn HotStore> = Arc::new(SledHotStore::new(&db).unwrap());
        let engine = Engine::new();
        engine.register_type("note", config(), cold, hot).await;
        (engine, dir)
    }

    #[tokio::test]
    async fn get_or_restore_reuses_the_same_instance() {
        let (engine, _dir) = engine_with_backends().await;
        let a = engine.get_or_restore("note", "doc-1").await.unwrap();
        let b = engine.get_or_restore("note", "doc-1").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn unknown_document_type_is_rejected() {
        let (engine, _dir) = engine_with_backends().await;
        let err = engine.get_or_restore("missing", "doc-1").await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownDocumentType(_)));
    }

    #[tokio::test]
    async fn submit_through_engine_updates_state() {
        let (engine, _dir) = engine_with_backends().await;
        let tx = Transaction::new(
            vec![Op::new(OpKind::ScalarSet, Path::from_tokens(vec!["title"]), json!("hi"))],
            0,
        );
        engine.submit("note", "doc-1", tx).await.unwrap();
        let state = engine.state("note", "doc-1").await.unwrap();
        assert_eq!(state["title"], json!("hi"));
    }

    #[tokio::test]
    async fn presence_is_scoped_per_document() {
        let (engine, _dir) = engine_with_backends().await;
        engine.set_presence("note", "doc-1", "peer-a".into(), json!({"cursor": 3})).await.unwrap();
        let presence = engine.get_presence("note", "doc-1", "peer-a").await.unwrap();
        assert_eq!(presence, Some(json!({"cursor": 3})));
        assert_eq!(engine.get_presence("note", "doc-2", "peer-a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn evict_idle_removes_instances_past_max_idle_time() {
        let (engine, _dir) = engine_with_backends().await;
        {
            let mut types = engine.types.write().await;
            types.get_mut("note").unwrap().config.max_idle_time = std::time::Duration::from_millis(1);
        }
        engine.get_or_restore("note", "doc-1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        engine.evict_idle().await;
        assert!(engine.instances.read().await.get("doc-1").is_none());
    }
}
