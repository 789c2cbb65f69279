//! `docengine`: an authoritative server-side engine for collaborative,
//! schema-typed documents. Clients build up local edits as `Transaction`s
//! against a typed `Schema`; the server reconciles concurrent
//! transactions with an operational transform and persists confirmed
//! history across a two-tier cold-snapshot/hot-log storage layer.

pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod instance;
pub mod logging;
pub mod op;
pub mod order_key;
pub mod path;
pub mod schema;
pub mod server_document;
pub mod storage;
pub mod transform;
pub mod value;

pub use config::{DocumentConfig, Initial, SnapshotPolicy};
pub use document::{Document, TransactionError};
pub use engine::{Engine, EngineError, EngineSubmitError};
pub use error::{
    ColdError, ColdOp, HotError, HotOp, NestedTransactionError, OperationError, SchemaError, SubmitRejection,
};
pub use instance::{DocumentInstance, RestoreError};
pub use op::{Op, OpKind, Transaction};
pub use order_key::{FractionalIndexGenerator, OrderKey, OrderKeyGenerator};
pub use path::Path;
pub use schema::{
    ListSchema, RecordField, RecordSchema, Schema, ScalarKind, ScalarSchema, ScalarValidator, SumSchema,
    TaggedSchema, TreeNodeType, TreeSchema,
};
pub use server_document::ServerDocument;
pub use storage::{ColdStore, HotStore, JsonFileColdStore, SledColdStore, SledHotStore, StoredDoc, WalEntry};
pub use transform::{transform, transform_ops, Transformed};
pub use value::{json, StateValue, StateValueExt};
