use tokio::sync::mpsc;

use crate::tree::{NodeId, TopicTree};

/// Columns a tree view shows per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Topic,
    Payload,
    /// Aggregate message count of the node's subtree.
    Messages,
}

/// Receives change notifications from the [`TreeModel`](super::TreeModel).
///
/// All callbacks run on the task that owns the model, right after the tree
/// was mutated, so implementations may query `tree` freely.
pub trait TreeObserver {
    /// Nodes were inserted somewhere below `subtree_root`.
    fn on_structural_change(&mut self, _tree: &TopicTree, _subtree_root: NodeId) {}

    /// Values shown in `columns` changed for `node`.
    fn on_data_changed(&mut self, _tree: &TopicTree, _node: NodeId, _columns: &[Column]) {}

    /// A message arrived for `node`, whether or not its payload changed.
    fn on_node_updated(&mut self, _tree: &TopicTree, _node: NodeId) {}
}

/// Owned form of the observer callbacks, for consumers behind a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelNotification {
    StructuralChange { subtree_root: NodeId },
    DataChanged { node: NodeId, columns: Vec<Column> },
    NodeUpdated { node: NodeId },
}

// A closed receiver just means nobody is listening anymore.
impl TreeObserver for mpsc::UnboundedSender<ModelNotification> {
    fn on_structural_change(&mut self, _tree: &TopicTree, subtree_root: NodeId) {
        let _ = self.send(ModelNotification::StructuralChange { subtree_root });
    }

    fn on_data_changed(&mut self, _tree: &TopicTree, node: NodeId, columns: &[Column]) {
        let _ = self.send(ModelNotification::DataChanged {
            node,
            columns: columns.to_vec(),
        });
    }

    fn on_node_updated(&mut self, _tree: &TopicTree, node: NodeId) {
        let _ = self.send(ModelNotification::NodeUpdated { node });
    }
}
