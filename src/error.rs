//! Crate-wide error types.
//!
//! One `thiserror`-derived enum per subsystem, in the style the teacher
//! crate uses throughout its storage layer (`storage/transaction_log.rs`,
//! `storage/transaction.rs`, `storage/graph_registry.rs`) rather than a
//! single catch-all error or `Box<dyn Error>`.

use thiserror::Error;

/// A schema- or invariant-level rejection of an operation. Never leaves
/// state partially applied: the caller (`Document`/`ServerDocument`)
/// rolls back on any `SchemaError`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("unknown field '{field}' on record")]
    UnknownField { field: String },

    #[error("required field '{field}' is missing")]
    MissingRequiredField { field: String },

    #[error("cannot unset required field '{field}' (no default)")]
    CannotUnsetRequired { field: String },

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("literal mismatch: expected {expected}, got {actual}")]
    LiteralMismatch { expected: String, actual: String },

    #[error("unknown variant discriminator '{discriminator}'")]
    UnknownVariant { discriminator: String },

    #[error("cannot route into undefined tagged/sum state")]
    UndefinedUnionState,

    #[error("list entry '{id}' not found")]
    ListEntryNotFound { id: String },

    #[error("tree node '{id}' not found")]
    TreeNodeNotFound { id: String },

    #[error("tree already has a root node")]
    DuplicateRoot,

    #[error("tree node id '{id}' is not unique")]
    DuplicateNodeId { id: String },

    #[error("node type '{node_type}' is not allowed under parent type '{parent_type}'")]
    DisallowedChildType { node_type: String, parent_type: String },

    #[error("unknown node type '{node_type}'")]
    UnknownNodeType { node_type: String },

    #[error("moving node '{id}' under '{new_parent}' would create a cycle")]
    CycleDetected { id: String, new_parent: String },

    #[error("validation failed: {reason}")]
    Refinement { reason: String },

    #[error("unsupported operation kind {kind:?} at this schema node")]
    UnsupportedKind { kind: crate::op::OpKind },

    #[error("malformed payload: {reason}")]
    MalformedPayload { reason: String },
}

/// Raised synchronously by `Document::transaction` when a transaction is
/// opened while one is already active on the same document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("a transaction is already active on this document")]
pub struct NestedTransactionError;

/// `Document::apply` failed applying an already-confirmed op. Fatal for
/// that document's caller — see `spec.md` §7.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("operation failed: {0}")]
pub struct OperationError(#[from] pub SchemaError);

/// Cold (snapshot) store transport/storage failure.
#[derive(Error, Debug)]
pub enum ColdError {
    #[error("cold store error during {op} for document '{doc_id}': {cause}")]
    Backend {
        doc_id: String,
        op: ColdOp,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColdOp {
    Load,
    Save,
    Delete,
}

impl std::fmt::Display for ColdOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ColdOp::Load => "load",
            ColdOp::Save => "save",
            ColdOp::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

/// Hot (WAL) store transport/storage failure, including the gap-check
/// invariant violation.
#[derive(Error, Debug)]
pub enum HotError {
    #[error("hot store error during {op} for document '{doc_id}': {cause}")]
    Backend {
        doc_id: String,
        op: HotOp,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("version gap for document '{doc_id}': expected {expected}, last stored {actual_previous:?}")]
    VersionGap {
        doc_id: String,
        expected: u64,
        actual_previous: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotOp {
    Append,
    GetSince,
    Truncate,
}

impl std::fmt::Display for HotOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HotOp::Append => "append_checked",
            HotOp::GetSince => "get_since",
            HotOp::Truncate => "truncate_upto",
        };
        write!(f, "{s}")
    }
}

/// The reason string a `submit` caller receives on rejection. Reasons
/// that the spec fixes verbatim (`spec.md` §7/§8) are exposed as
/// associated constants so callers and tests can match on them exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRejection(pub String);

impl SubmitRejection {
    pub const ALREADY_PROCESSED: &'static str = "Transaction has already been processed";
    pub const EMPTY: &'static str = "Transaction is empty";
    pub const STORAGE_UNAVAILABLE: &'static str = "Storage unavailable. Please retry.";

    pub fn already_processed() -> Self {
        SubmitRejection(Self::ALREADY_PROCESSED.to_string())
    }

    pub fn empty() -> Self {
        SubmitRejection(Self::EMPTY.to_string())
    }

    pub fn storage_unavailable() -> Self {
        SubmitRejection(Self::STORAGE_UNAVAILABLE.to_string())
    }

    pub fn validation(err: &SchemaError) -> Self {
        SubmitRejection(err.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubmitRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
