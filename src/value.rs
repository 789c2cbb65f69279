//! The dynamic value representation used for operation payloads and
//! document state.
//!
//! Per the Design Notes (`spec.md` §9, "Operation payload as 'unknown'
//! JSON value"), payloads and state are represented with a tagged dynamic
//! value rather than schema-specific Rust types. This crate uses
//! `serde_json::Value` directly for that role (aliased `StateValue`),
//! matching the teacher crate's own habit of threading `serde_json::Value`
//! through command payloads and properties (`server/kg_api.rs`,
//! `server/websocket.rs`).

pub use serde_json::Value as StateValue;
pub use serde_json::json;

/// Convenience accessors used throughout schema node implementations.
pub trait StateValueExt {
    fn as_object_or_empty(&self) -> serde_json::Map<String, StateValue>;
    fn expect_object(&self) -> Result<&serde_json::Map<String, StateValue>, String>;
}

impl StateValueExt for StateValue {
    fn as_object_or_empty(&self) -> serde_json::Map<String, StateValue> {
        self.as_object().cloned().unwrap_or_default()
    }

    fn expect_object(&self) -> Result<&serde_json::Map<String, StateValue>, String> {
        self.as_object()
            .ok_or_else(|| format!("expected a JSON object, got {}", type_name(self)))
    }
}

pub fn type_name(v: &StateValue) -> &'static str {
    match v {
        StateValue::Null => "null",
        StateValue::Bool(_) => "boolean",
        StateValue::Number(_) => "number",
        StateValue::String(_) => "string",
        StateValue::Array(_) => "array",
        StateValue::Object(_) => "object",
    }
}
