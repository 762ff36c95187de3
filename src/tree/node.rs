use chrono::{DateTime, Local};
use std::fmt;

/// Index of a node inside the [`TopicTree`](super::TopicTree) arena.
///
/// Ids are only meaningful for the tree that issued them. Nodes are never
/// removed during a session, so an id stays valid for the lifetime of its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The implicit root of every tree.
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A payload as it was received at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricalPayload {
    pub payload: String,
    pub timestamp: DateTime<Local>,
}

impl HistoricalPayload {
    pub fn new(payload: impl Into<String>, timestamp: DateTime<Local>) -> Self {
        Self {
            payload: payload.into(),
            timestamp,
        }
    }
}

/// One vertex of the topic tree.
///
/// Children are referenced by id and owned by the arena; `parent` is a plain
/// lookup link back up the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNode {
    fragment: String,
    payload: String,
    history: Vec<HistoricalPayload>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
}

impl TopicNode {
    pub(crate) fn new(fragment: impl Into<String>, parent: Option<NodeId>) -> Self {
        Self {
            fragment: fragment.into(),
            payload: String::new(),
            history: Vec::new(),
            children: Vec::new(),
            parent,
        }
    }

    /// Rebuilds a node from stored history. The payload is always derived from
    /// the last history entry.
    pub(crate) fn with_history(
        fragment: impl Into<String>,
        parent: Option<NodeId>,
        history: Vec<HistoricalPayload>,
    ) -> Self {
        let payload = history
            .last()
            .map(|entry| entry.payload.clone())
            .unwrap_or_default();
        Self {
            fragment: fragment.into(),
            payload,
            history,
            children: Vec::new(),
            parent,
        }
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn history(&self) -> &[HistoricalPayload] {
        &self.history
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// A node counts as a leaf for `leaves_only` counting once it carries a payload.
    pub fn has_payload(&self) -> bool {
        !self.payload.is_empty()
    }

    /// Stores `payload` if it differs from the current one.
    ///
    /// Returns `true` when a history entry was appended. Repeating the current
    /// payload leaves both the payload and the history untouched.
    pub fn record_payload(&mut self, payload: impl Into<String>, timestamp: DateTime<Local>) -> bool {
        let payload = payload.into();
        if payload == self.payload {
            return false;
        }
        self.history
            .push(HistoricalPayload::new(payload.clone(), timestamp));
        self.payload = payload;
        true
    }
}
