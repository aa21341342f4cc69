//! Diff-based audit history: snapshot, diff, and replay.
//!
//! A record's history starts with one full snapshot of the record (minus the
//! history itself) followed by one diff entry per mutation. Replaying the
//! entries over the snapshot must reproduce the record's current state, which
//! is what makes the history trustworthy as an audit trail.

use chrono::Utc;
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::transaction::TxRecord;

/// Kind of change a diff op records
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Add,
    Replace,
    Remove,
}

/// One structural change at a dot-separated path such as `txParams.gasPrice`
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DiffOp {
    pub op: OpKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// All ops produced by one mutation, with its audit note and timestamp
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DiffEntry {
    pub ops: Vec<DiffOp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub timestamp: i64,
}

/// Entry in a record's history: the first is a full snapshot, every later
/// one is a diff.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum HistoryEntry {
    // Diff must come first: Snapshot matches any JSON value
    Diff(DiffEntry),
    Snapshot(Value),
}

impl HistoryEntry {
    pub fn is_snapshot(&self) -> bool {
        matches!(self, HistoryEntry::Snapshot(_))
    }

    pub fn as_diff(&self) -> Option<&DiffEntry> {
        match self {
            HistoryEntry::Diff(entry) => Some(entry),
            HistoryEntry::Snapshot(_) => None,
        }
    }
}

/// Deep copy of a record as a JSON value, with the audit history left out
pub fn snapshot(record: &TxRecord) -> Result<Value> {
    let mut value = serde_json::to_value(record)?;
    if let Some(map) = value.as_object_mut() {
        map.remove("history");
    }
    Ok(value)
}

/// Structural diff from `previous` to `current`.
///
/// Objects are walked recursively and produce dot-separated paths; arrays
/// and scalars are leaves compared whole. Keys present only in `previous`
/// come out as removes, keys present only in `current` as adds, changed
/// leaves as replaces.
pub fn diff(previous: &Value, current: &Value) -> Vec<DiffOp> {
    let mut ops = Vec::new();
    diff_into(previous, current, "", &mut ops);
    ops
}

fn diff_into(previous: &Value, current: &Value, prefix: &str, ops: &mut Vec<DiffOp>) {
    match (previous.as_object(), current.as_object()) {
        (Some(prev), Some(cur)) => {
            for (key, prev_value) in prev {
                let path = join_path(prefix, key);
                match cur.get(key) {
                    None => ops.push(DiffOp {
                        op: OpKind::Remove,
                        path,
                        value: None,
                    }),
                    Some(cur_value) => {
                        if prev_value.is_object() && cur_value.is_object() {
                            diff_into(prev_value, cur_value, &path, ops);
                        } else if prev_value != cur_value {
                            ops.push(DiffOp {
                                op: OpKind::Replace,
                                path,
                                value: Some(cur_value.clone()),
                            });
                        }
                    }
                }
            }
            for (key, cur_value) in cur {
                if !prev.contains_key(key) {
                    ops.push(DiffOp {
                        op: OpKind::Add,
                        path: join_path(prefix, key),
                        value: Some(cur_value.clone()),
                    });
                }
            }
        }
        _ => {
            if previous != current {
                ops.push(DiffOp {
                    op: OpKind::Replace,
                    path: prefix.to_string(),
                    value: Some(current.clone()),
                });
            }
        }
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

/// Diff two snapshots into a history entry carrying the audit note.
/// An unchanged state still yields an entry, just with no ops.
pub fn generate_entry(previous: &Value, current: &Value, note: Option<&str>) -> DiffEntry {
    DiffEntry {
        ops: diff(previous, current),
        note: note.map(|n| n.to_string()),
        timestamp: Utc::now().timestamp_millis(),
    }
}

/// Rebuild the latest state by applying every diff entry, in order, to the
/// leading snapshot. Logs that do not start with a snapshot, carry a second
/// snapshot, or walk paths that do not exist are rejected.
pub fn replay(history: &[HistoryEntry]) -> Result<Value> {
    let mut entries = history.iter();
    let mut state = match entries.next() {
        Some(HistoryEntry::Snapshot(value)) => value.clone(),
        Some(HistoryEntry::Diff(_)) => {
            return Err(StoreError::HistoryError(
                "history must start with a full snapshot".to_string(),
            ))
        }
        None => return Err(StoreError::HistoryError("history is empty".to_string())),
    };
    for entry in entries {
        match entry {
            HistoryEntry::Diff(diff) => {
                for op in &diff.ops {
                    apply_op(&mut state, op)?;
                }
            }
            HistoryEntry::Snapshot(_) => {
                return Err(StoreError::HistoryError(
                    "unexpected snapshot after the first entry".to_string(),
                ))
            }
        }
    }
    Ok(state)
}

fn apply_op(state: &mut Value, op: &DiffOp) -> Result<()> {
    // An empty path addresses the document root
    if op.path.is_empty() {
        return match op.op {
            OpKind::Add | OpKind::Replace => {
                *state = required_value(op)?;
                Ok(())
            }
            OpKind::Remove => Err(StoreError::HistoryError(
                "cannot remove the document root".to_string(),
            )),
        };
    }

    let segments: Vec<&str> = op.path.split('.').collect();
    let (leaf, parents) = match segments.split_last() {
        Some(split) => split,
        None => return Err(dangling(&op.path)),
    };

    let mut target = &mut *state;
    for segment in parents {
        target = target
            .as_object_mut()
            .and_then(|map| map.get_mut(*segment))
            .ok_or_else(|| dangling(&op.path))?;
    }
    let map = target.as_object_mut().ok_or_else(|| dangling(&op.path))?;

    match op.op {
        OpKind::Add => {
            map.insert(leaf.to_string(), required_value(op)?);
        }
        OpKind::Replace => {
            if !map.contains_key(*leaf) {
                return Err(dangling(&op.path));
            }
            map.insert(leaf.to_string(), required_value(op)?);
        }
        OpKind::Remove => {
            if map.remove(*leaf).is_none() {
                return Err(dangling(&op.path));
            }
        }
    }
    Ok(())
}

fn required_value(op: &DiffOp) -> Result<Value> {
    op.value
        .clone()
        .ok_or_else(|| StoreError::HistoryError(format!("op at {} carries no value", op.path)))
}

fn dangling(path: &str) -> StoreError {
    StoreError::HistoryError(format!("dangling path: {}", path))
}
