//! Editor delta payloads.
//!
//! The editor emits operation groups as JSON (`{"ops": [{"insert": …} |
//! {"delete": …} | {"retain": …}]}`). The core carries them verbatim —
//! they enter chain hashes exactly as received — and only the authorship
//! analyzer looks inside, through the narrow inspector here. Unknown keys
//! and shapes pass through untouched.

use serde_json::Value;

/// One opaque operation group as produced by the editor.
pub type DeltaGroup = Value;

/// Decoded view of a single editor operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOp {
    /// Inserted text.
    Insert(String),
    /// Number of characters removed.
    Delete(u64),
    /// Cursor movement over existing content.
    Retain(u64),
}

impl DeltaOp {
    /// Characters contributed by this operation, zero unless an insert.
    pub fn insert_len(&self) -> usize {
        match self {
            DeltaOp::Insert(text) => text.chars().count(),
            _ => 0,
        }
    }
}

/// Flattens a sequence of operation groups into recognized operations,
/// in order. Groups may nest one level (a group that is itself a list of
/// delta objects); anything unrecognized is skipped.
pub fn flatten_ops(groups: &[DeltaGroup]) -> Vec<DeltaOp> {
    let mut ops = Vec::new();
    for group in groups {
        collect_group(group, &mut ops);
    }
    ops
}

fn collect_group(value: &Value, ops: &mut Vec<DeltaOp>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_group(item, ops);
            }
        }
        Value::Object(map) => {
            if let Some(Value::Array(list)) = map.get("ops") {
                for op in list {
                    collect_op(op, ops);
                }
            }
        }
        _ => {}
    }
}

fn collect_op(op: &Value, ops: &mut Vec<DeltaOp>) {
    if let Some(text) = op.get("insert").and_then(Value::as_str) {
        ops.push(DeltaOp::Insert(text.to_string()));
    } else if let Some(n) = op.get("delete").and_then(Value::as_u64) {
        ops.push(DeltaOp::Delete(n));
    } else if let Some(n) = op.get("retain").and_then(Value::as_u64) {
        ops.push(DeltaOp::Retain(n));
    }
}

/// Builds a single-insert operation group. Test and demo convenience.
pub fn insert_group(text: &str) -> DeltaGroup {
    serde_json::json!({ "ops": [{ "insert": text }] })
}
