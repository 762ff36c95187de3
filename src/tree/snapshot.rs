//! Serde representation of a tree node as stored in session files.
//!
//! Keys are single letters (`t` fragment, `h` history, `c` children) and
//! history entries are `[payload, epoch_seconds]` pairs.

use chrono::{DateTime, Local, Utc};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

use super::HistoricalPayload;

/// Remaining stack below which serialization switches to a fresh segment.
const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_SEGMENT: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NodeSnapshot {
    #[serde(rename = "t")]
    pub fragment: String,
    #[serde(rename = "h")]
    pub history: Vec<(String, f64)>,
    #[serde(rename = "c")]
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    pub fn new(fragment: &str, history: &[HistoricalPayload], children: Vec<NodeSnapshot>) -> Self {
        Self {
            fragment: fragment.to_string(),
            history: history
                .iter()
                .map(|entry| (entry.payload.clone(), to_epoch_seconds(&entry.timestamp)))
                .collect(),
            children,
        }
    }

    pub(crate) fn history_entries(&self) -> Vec<HistoricalPayload> {
        self.history
            .iter()
            .map(|(payload, seconds)| HistoricalPayload::new(payload.clone(), from_epoch_seconds(*seconds)))
            .collect()
    }

    /// Total history entries in this snapshot and all nested children.
    pub fn count_history_entries(&self) -> usize {
        self.iter().map(|node| node.history.len()).sum()
    }

    /// Number of nodes below this one.
    pub fn count_descendants(&self) -> usize {
        self.iter().count() - 1
    }

    /// Pre-order walk over this node and everything below it.
    pub fn iter(&self) -> impl Iterator<Item = &NodeSnapshot> + '_ {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

impl Serialize for NodeSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || {
            let mut node = serializer.serialize_struct("NodeSnapshot", 3)?;
            node.serialize_field("t", &self.fragment)?;
            node.serialize_field("h", &self.history)?;
            node.serialize_field("c", &self.children)?;
            node.end()
        })
    }
}

// Deep chains would otherwise be dropped one stack frame per level.
impl Drop for NodeSnapshot {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut child) = pending.pop() {
            pending.append(&mut child.children);
        }
    }
}

/// Seconds since the epoch with microsecond resolution.
pub fn to_epoch_seconds(timestamp: &DateTime<Local>) -> f64 {
    timestamp.timestamp_micros() as f64 / 1_000_000.0
}

/// Inverse of [`to_epoch_seconds`]. Values outside chrono's range clamp to the epoch.
pub fn from_epoch_seconds(seconds: f64) -> DateTime<Local> {
    let micros = (seconds * 1_000_000.0).round() as i64;
    DateTime::<Utc>::from_timestamp_micros(micros)
        .unwrap_or_default()
        .with_timezone(&Local)
}
