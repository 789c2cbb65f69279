//! Per-document configuration: schema, initial state, idle eviction,
//! and snapshot policy.
//!
//! Unlike the teacher's `Config`, this crate carries no file-based or
//! CLI-driven loader (CLI and configuration loading are explicitly out
//! of scope, see `spec.md` §1) — `DocumentConfig` is built
//! programmatically by the embedding application, one per document
//! type, in the same `Default`-plus-builder style the teacher uses for
//! `BackendConfig`/`SyncConfig`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::schema::Schema;
use crate::value::StateValue;

/// How a document's initial state is produced: either a fixed value
/// shared by every document of this type, or a function of the
/// document's id (e.g. seeding a title from a slug).
#[derive(Clone)]
pub enum Initial {
    Value(StateValue),
    ByDocId(Arc<dyn Fn(&str) -> StateValue + Send + Sync>),
}

impl Initial {
    pub fn resolve(&self, doc_id: &str) -> StateValue {
        match self {
            Initial::Value(v) => v.clone(),
            Initial::ByDocId(f) => f(doc_id),
        }
    }
}

impl std::fmt::Debug for Initial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Initial::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Initial::ByDocId(_) => f.write_str("ByDocId(<fn>)"),
        }
    }
}

impl From<StateValue> for Initial {
    fn from(v: StateValue) -> Self {
        Initial::Value(v)
    }
}

/// When `DocumentInstance` should trigger a cold snapshot and truncate
/// the hot log behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPolicy {
    #[serde(default = "default_snapshot_interval_secs", with = "duration_secs")]
    pub interval: Duration,
    #[serde(default = "default_snapshot_transaction_threshold")]
    pub transaction_threshold: u64,
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

fn default_snapshot_interval_secs() -> Duration {
    Duration::from_secs(300)
}

fn default_snapshot_transaction_threshold() -> u64 {
    500
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        SnapshotPolicy {
            interval: default_snapshot_interval_secs(),
            transaction_threshold: default_snapshot_transaction_threshold(),
        }
    }
}

/// Configuration for one document type, handed to `Engine` when
/// registering it.
#[derive(Clone)]
pub struct DocumentConfig {
    pub schema: Arc<Schema>,
    pub initial: Initial,
    pub max_idle_time: Duration,
    pub max_transaction_history: usize,
    pub snapshot: SnapshotPolicy,
}

impl DocumentConfig {
    pub fn new(schema: Schema, initial: impl Into<Initial>) -> Self {
        DocumentConfig {
            schema: Arc::new(schema),
            initial: initial.into(),
            max_idle_time: default_max_idle_time(),
            max_transaction_history: default_max_transaction_history(),
            snapshot: SnapshotPolicy::default(),
        }
    }

    pub fn with_max_idle_time(mut self, d: Duration) -> Self {
        self.max_idle_time = d;
        self
    }

    pub fn with_max_transaction_history(mut self, n: usize) -> Self {
        self.max_transaction_history = n;
        self
    }

    pub fn with_snapshot_policy(mut self, policy: SnapshotPolicy) -> Self {
        self.snapshot = policy;
        self
    }
}

fn default_max_idle_time() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_max_transaction_history() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ScalarSchema;
    use crate::value::json;

    #[test]
    fn defaults_match_documented_policy() {
        let config = DocumentConfig::new(Schema::Scalar(ScalarSchema::string()), json!("x"));
        assert_eq!(config.max_idle_time, Duration::from_secs(300));
        assert_eq!(config.max_transaction_history, 1000);
        assert_eq!(config.snapshot.interval, Duration::from_secs(300));
        assert_eq!(config.snapshot.transaction_threshold, 500);
    }

    #[test]
    fn initial_by_doc_id_is_invoked_with_the_id() {
        let initial = Initial::ByDocId(Arc::new(|id: &str| json!(format!("doc:{id}"))));
        assert_eq!(initial.resolve("abc"), json!("doc:abc"));
    }
}
