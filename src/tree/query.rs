//! Read-only queries used by views on top of the tree: row addressing for
//! item models, the search filter and the per-node detail pane.

use chrono::{DateTime, Local};
use serde_json::Value;

use super::{HistoricalPayload, NodeId, TopicTree};

impl TopicTree {
    /// Position of `id` among its siblings. The root is row 0.
    pub fn row(&self, id: NodeId) -> usize {
        match self.node(id).parent() {
            Some(parent) => self
                .node(parent)
                .children()
                .iter()
                .position(|child| *child == id)
                .unwrap_or(0),
            None => 0,
        }
    }

    /// Child of `id` at `row`, if any.
    pub fn child_at(&self, id: NodeId, row: usize) -> Option<NodeId> {
        self.node(id).children().get(row).copied()
    }

    /// Rows from the root down to `id`. Empty for the root itself.
    pub fn index_path(&self, id: NodeId) -> Vec<usize> {
        let mut rows: Vec<usize> = self
            .ancestors_inclusive(id)
            .filter(|node| !self.node(*node).is_root())
            .map(|node| self.row(node))
            .collect();
        rows.reverse();
        rows
    }

    /// Resolves a row path produced by [`TopicTree::index_path`].
    pub fn node_at_index_path(&self, rows: &[usize]) -> Option<NodeId> {
        rows.iter()
            .try_fold(NodeId::ROOT, |node, row| self.child_at(node, *row))
    }

    /// Nodes that stay visible for a case-insensitive search on fragment and
    /// payload. A node is kept when it, or anything below it, matches.
    ///
    /// An empty search keeps every node. The root is never part of the result.
    pub fn filter(&self, text: &str) -> Vec<NodeId> {
        let needle = text.to_lowercase();
        let mut visible = Vec::new();
        for child in self.node(NodeId::ROOT).children() {
            self.collect_matches(*child, &needle, &mut visible);
        }
        visible
    }

    fn collect_matches(&self, id: NodeId, needle: &str, visible: &mut Vec<NodeId>) -> bool {
        let node = self.node(id);
        let own_match = needle.is_empty()
            || node.fragment().to_lowercase().contains(needle)
            || node.payload().to_lowercase().contains(needle);

        let slot = visible.len();
        visible.push(id);

        let mut descendant_match = false;
        for child in node.children() {
            descendant_match |= self.collect_matches(*child, needle, visible);
        }

        if own_match || descendant_match {
            true
        } else {
            visible.truncate(slot);
            false
        }
    }
}

/// Min/max of a numeric series, used to fit chart axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartBounds {
    pub min_x: i64,
    pub max_x: i64,
    pub min_y: f64,
    pub max_y: f64,
}

impl ChartBounds {
    /// `None` when there are no points.
    pub fn fit(points: &[(i64, f64)]) -> Option<Self> {
        let (first_x, first_y) = *points.first()?;
        let init = ChartBounds {
            min_x: first_x,
            max_x: first_x,
            min_y: first_y,
            max_y: first_y,
        };
        Some(points.iter().fold(init, |bounds, (x, y)| ChartBounds {
            min_x: bounds.min_x.min(*x),
            max_x: bounds.max_x.max(*x),
            min_y: bounds.min_y.min(*y),
            max_y: bounds.max_y.max(*y),
        }))
    }
}

/// Everything a detail pane shows for the selected node.
#[derive(Debug, Clone)]
pub struct NodeDetails {
    pub id: NodeId,
    pub full_topic: String,
    pub payload: String,
    /// Parsed payload when it is a JSON object or array.
    pub json: Option<Value>,
    pub history: Vec<HistoricalPayload>,
    /// `(epoch_millis, value)` for each history entry that parses as a number.
    pub series: Vec<(i64, f64)>,
    pub bounds: Option<ChartBounds>,
}

impl NodeDetails {
    pub fn for_node(tree: &TopicTree, id: NodeId) -> Self {
        let node = tree.node(id);
        let series = numeric_series(node.history());
        let bounds = ChartBounds::fit(&series);
        Self {
            id,
            full_topic: tree.full_topic(id),
            payload: node.payload().to_string(),
            json: parse_json_payload(node.payload()),
            history: node.history().to_vec(),
            series,
            bounds,
        }
    }

    /// History entries newer than the first `known` ones, for incremental
    /// table/chart updates.
    pub fn history_since(&self, known: usize) -> &[HistoricalPayload] {
        self.history.get(known..).unwrap_or(&[])
    }
}

/// Structured view of a payload; scalars and invalid JSON yield `None`.
pub fn parse_json_payload(payload: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(payload) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}

pub fn numeric_series(history: &[HistoricalPayload]) -> Vec<(i64, f64)> {
    history
        .iter()
        .filter_map(|entry| {
            let value = entry.payload.trim().parse::<f64>().ok()?;
            value
                .is_finite()
                .then(|| (epoch_millis(&entry.timestamp), value))
        })
        .collect()
}

fn epoch_millis(timestamp: &DateTime<Local>) -> i64 {
    timestamp.timestamp_millis()
}
