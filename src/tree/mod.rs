//! # Topic Tree
//!
//! Hierarchical model of every topic seen on the broker. Topics are split on
//! `/` into fragments and each fragment becomes one [`TopicNode`].
//!
//! ## Ownership
//!
//! All nodes live in a single arena (`Vec<TopicNode>`) owned by the tree.
//! A parent lists its children by [`NodeId`]; a child only keeps the id of its
//! parent for lookups. There are no reference-counted links, so the tree can be
//! cloned cheaply into a consistent snapshot for readers on other threads.
//!
//! ## Module Layout
//!
//! ```text
//! tree/
//! ├── node.rs      - TopicNode, NodeId, HistoricalPayload
//! ├── snapshot.rs  - serde representation used by session files
//! └── query.rs     - row addressing, search filter, node details for views
//! ```

pub mod node;
pub mod query;
pub mod snapshot;


pub use node::{HistoricalPayload, NodeId, TopicNode};
pub use snapshot::NodeSnapshot;

use std::collections::HashSet;

use chrono::{DateTime, Local};
use tracing::debug;

/// Errors raised by structural tree operations.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// A sibling with the same fragment already exists below `parent`.
    #[error("Node {parent} already has a child named '{fragment}'")]
    DuplicateChild { parent: NodeId, fragment: String },

    /// The id does not belong to this tree.
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),
}

/// Arena-backed topic tree with an implicit root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicTree {
    nodes: Vec<TopicNode>,
}

impl Default for TopicTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits a topic into its fragments. Empty fragments (`a//b`, leading or
/// trailing `/`) are kept as zero-length fragments.
pub fn split_topic(topic: &str) -> Vec<&str> {
    topic.split('/').collect()
}

impl TopicTree {
    /// Creates a tree that only contains the root.
    pub fn new() -> Self {
        Self {
            nodes: vec![TopicNode::new("", None)],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Number of nodes including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` when nothing but the root exists.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    /// Borrow a node.
    ///
    /// # Panics
    ///
    /// Panics if `id` was issued by another tree. Use [`TopicTree::get`] for
    /// ids of unknown origin.
    pub fn node(&self, id: NodeId) -> &TopicNode {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&TopicNode> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut TopicNode> {
        self.nodes.get_mut(id.0)
    }

    /// Number of direct children, or only those carrying a payload.
    pub fn child_count(&self, id: NodeId, leaves_only: bool) -> usize {
        let node = self.node(id);
        if !leaves_only {
            return node.children.len();
        }
        node.children
            .iter()
            .filter(|child| self.node(**child).has_payload())
            .count()
    }

    /// Counts every descendant of `id` (optionally only those with a payload).
    pub fn recursive_child_count(&self, id: NodeId, leaves_only: bool) -> usize {
        self.iter_depth_first(id)
            .skip(1)
            .filter(|node| !leaves_only || self.node(*node).has_payload())
            .count()
    }

    /// History entries of `id` and all of its descendants.
    pub fn recursive_message_count(&self, id: NodeId) -> usize {
        self.iter_depth_first(id)
            .map(|node| self.node(node).history().len())
            .sum()
    }

    /// First direct child of `id` whose fragment equals `fragment`.
    pub fn find_child(&self, id: NodeId, fragment: &str) -> Option<NodeId> {
        self.node(id)
            .children
            .iter()
            .copied()
            .find(|child| self.node(*child).fragment() == fragment)
    }

    /// Appends a new, payload-less child below `id`.
    pub fn append_child(&mut self, id: NodeId, fragment: &str) -> Result<NodeId, TreeError> {
        if !self.contains(id) {
            return Err(TreeError::UnknownNode(id));
        }
        if self.find_child(id, fragment).is_some() {
            return Err(TreeError::DuplicateChild {
                parent: id,
                fragment: fragment.to_string(),
            });
        }
        Ok(self.push_child(id, TopicNode::new(fragment, Some(id))))
    }

    pub(crate) fn push_child(&mut self, parent: NodeId, node: TopicNode) -> NodeId {
        let child = NodeId(self.nodes.len());
        self.nodes.push(node);
        self.nodes[parent.0].children.push(child);
        child
    }

    /// See [`TopicNode::record_payload`].
    pub fn record_payload(&mut self, id: NodeId, payload: impl Into<String>, timestamp: DateTime<Local>) -> bool {
        self.nodes[id.0].record_payload(payload, timestamp)
    }

    /// Full slash-separated topic of `id`. The root yields an empty string.
    pub fn full_topic(&self, id: NodeId) -> String {
        let mut fragments: Vec<&str> = self
            .ancestors_inclusive(id)
            .filter(|node| !self.node(*node).is_root())
            .map(|node| self.node(node).fragment())
            .collect();
        fragments.reverse();
        fragments.join("/")
    }

    /// Iterates from `id` up to and including the root.
    pub fn ancestors_inclusive(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |current| self.node(*current).parent)
    }

    /// Walks down from the root following `fragments` and creates whatever is
    /// missing. Returns the deepest node and how many nodes were created.
    pub fn find_or_create_path<S: AsRef<str>>(&mut self, fragments: &[S]) -> (NodeId, usize) {
        let mut node = NodeId::ROOT;
        let mut created = 0;

        for fragment in fragments {
            let fragment = fragment.as_ref();
            node = match self.find_child(node, fragment) {
                Some(existing) => existing,
                None => {
                    created += 1;
                    self.push_child(node, TopicNode::new(fragment, Some(node)))
                }
            };
        }

        if created > 0 {
            debug!(
                "Created {} node(s) for topic '{}'",
                created,
                self.full_topic(node)
            );
        }
        (node, created)
    }

    /// Looks up the node at `fragments` without modifying the tree.
    pub fn node_for_path<S: AsRef<str>>(&self, fragments: &[S]) -> Option<NodeId> {
        fragments
            .iter()
            .try_fold(NodeId::ROOT, |node, fragment| {
                self.find_child(node, fragment.as_ref())
            })
    }

    /// Convenience wrapper around [`TopicTree::node_for_path`] for a full topic.
    pub fn node_for_topic(&self, topic: &str) -> Option<NodeId> {
        self.node_for_path(&split_topic(topic))
    }

    /// Pre-order traversal, children in first-seen order. Starts with `id`.
    pub fn iter_depth_first(&self, id: NodeId) -> DepthFirst<'_> {
        DepthFirst {
            tree: self,
            stack: vec![id],
        }
    }

    /// Full topics of every node that is not the root, in pre-order.
    pub fn topics(&self) -> Vec<String> {
        self.iter_depth_first(NodeId::ROOT)
            .skip(1)
            .map(|id| self.full_topic(id))
            .collect()
    }

    /// Snapshot of the whole tree starting at the implicit root.
    ///
    /// Built bottom-up without recursion, so arbitrarily deep topics are fine.
    pub fn serialize(&self) -> NodeSnapshot {
        let order: Vec<NodeId> = self.iter_depth_first(NodeId::ROOT).collect();
        let mut built: Vec<Option<NodeSnapshot>> = vec![None; self.nodes.len()];

        // Reverse pre-order visits every child before its parent.
        for id in order.into_iter().rev() {
            let node = self.node(id);
            let children = node
                .children
                .iter()
                .filter_map(|child| built[child.0].take())
                .collect();
            built[id.0] = Some(NodeSnapshot::new(node.fragment(), node.history(), children));
        }

        built[NodeId::ROOT.0]
            .take()
            .unwrap_or_else(|| NodeSnapshot::new("", &[], Vec::new()))
    }

    /// Rebuilds a tree from a snapshot produced by [`TopicTree::serialize`].
    ///
    /// The snapshot's own fragment and history describe the root and are
    /// ignored; every other node gets its payload from its last history entry.
    /// Siblings sharing a fragment are rejected with
    /// [`TreeError::DuplicateChild`].
    pub fn deserialize(snapshot: &NodeSnapshot) -> Result<Self, TreeError> {
        let mut tree = Self::new();
        check_unique_fragments(NodeId::ROOT, &snapshot.children)?;
        let mut pending: Vec<(NodeId, &NodeSnapshot)> = snapshot
            .children
            .iter()
            .rev()
            .map(|child| (NodeId::ROOT, child))
            .collect();

        while let Some((parent, current)) = pending.pop() {
            let node = TopicNode::with_history(
                current.fragment.clone(),
                Some(parent),
                current.history_entries(),
            );
            let id = tree.push_child(parent, node);
            check_unique_fragments(id, &current.children)?;
            pending.extend(current.children.iter().rev().map(|child| (id, child)));
        }

        Ok(tree)
    }
}

fn check_unique_fragments(parent: NodeId, children: &[NodeSnapshot]) -> Result<(), TreeError> {
    let mut seen = HashSet::with_capacity(children.len());
    for child in children {
        if !seen.insert(child.fragment.as_str()) {
            return Err(TreeError::DuplicateChild {
                parent,
                fragment: child.fragment.clone(),
            });
        }
    }
    Ok(())
}

/// Pre-order iterator returned by [`TopicTree::iter_depth_first`].
pub struct DepthFirst<'a> {
    tree: &'a TopicTree,
    stack: Vec<NodeId>,
}

impl Iterator for DepthFirst<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.node(id).children.iter().rev().copied());
        Some(id)
    }
}
