//! # Tree Model / Update Engine
//!
//! Turns listener events into tree mutations and change notifications.
//!
//! ## Message Ingestion
//!
//! For every message the engine splits the topic, materializes the missing
//! part of the path, decodes the payload and records it on the target node.
//! It then tells observers what changed:
//!
//! ```text
//! new nodes created      → on_structural_change(insertion point)
//! payload changed        → on_data_changed(node, [Payload, Messages])
//!                          on_data_changed(ancestor, [Messages]) up to the root
//! always                 → on_node_updated(node)
//! ```
//!
//! Structural notifications are coarse: one per message, covering the whole
//! subtree below the deepest node that already existed.
//!
//! ## Threading
//!
//! The model is single-owner. Listener events reach it through
//! [`bridge::EventBridge`]; [`TreeModel::run`] or [`TreeModel::drain_pending`]
//! must be called from the task that owns the model.
//!
//! ## Failure Behavior
//!
//! Nothing in the ingestion path returns an error. Payloads that are not
//! valid UTF-8 are shown as an escaped byte string instead.

pub mod bridge;
pub mod observer;


pub use bridge::{EventBridge, EventReceiver};
pub use observer::{Column, ModelNotification, TreeObserver};

use std::borrow::Cow;

use chrono::{DateTime, Local, SubsecRound};
use tracing::{debug, info, warn};

use crate::mqtt::{BrokerLink, DeliveryHandle, IncomingMessage, ListenerError, ListenerEvent};
use crate::mqtt::{MqttListener, MqttListenerConfig};
use crate::session::{self, SessionSnapshot};
use crate::tree::query::NodeDetails;
use crate::tree::{split_topic, NodeId, TopicTree};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Session is not connected to a broker")]
    Offline,

    #[error("Publish failed: {0}")]
    Listener(#[from] ListenerError),
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// Counters for a status bar.
#[derive(Clone, Debug, Default)]
pub struct ModelStats {
    pub messages_received: usize,
    /// Messages that repeated the node's current payload.
    pub messages_unchanged: usize,
    pub decode_fallbacks: usize,
    pub messages_sent: usize,
    pub last_activity: Option<DateTime<Local>>,
    pub last_error: Option<String>,
}

/// Decodes a payload as UTF-8, falling back to an escaped byte string such as
/// `b"\xff\xfe"`. The fallback keeps every byte recoverable.
pub fn decode_payload(payload: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(payload) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(format!("b\"{}\"", payload.escape_ascii())),
    }
}

/// Owns the topic tree of one session and keeps it in sync with the broker.
pub struct TreeModel<L = MqttListener> {
    tree: TopicTree,
    link: Option<L>,
    offline_config: MqttListenerConfig,
    observers: Vec<Box<dyn TreeObserver>>,
    state: ConnectionState,
    stats: ModelStats,
}

impl TreeModel {
    /// A model for a saved session with no broker attached. Publishing fails
    /// with [`EngineError::Offline`].
    pub fn offline(tree: TopicTree, config: MqttListenerConfig) -> Self {
        Self::build(tree, None, config)
    }
}

impl<L: BrokerLink> TreeModel<L> {
    /// A model fed by `link`, starting from `tree` (empty or restored).
    pub fn new(tree: TopicTree, link: L) -> Self {
        let config = link.to_config();
        Self::build(tree, Some(link), config)
    }

    fn build(tree: TopicTree, link: Option<L>, offline_config: MqttListenerConfig) -> Self {
        Self {
            tree,
            link,
            offline_config,
            observers: Vec::new(),
            state: ConnectionState::default(),
            stats: ModelStats::default(),
        }
    }

    pub fn tree(&self) -> &TopicTree {
        &self.tree
    }

    pub fn has_mqtt(&self) -> bool {
        self.link.is_some()
    }

    pub fn link(&self) -> Option<&L> {
        self.link.as_ref()
    }

    pub fn link_mut(&mut self) -> Option<&mut L> {
        self.link.as_mut()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn stats(&self) -> &ModelStats {
        &self.stats
    }

    pub fn add_observer(&mut self, observer: impl TreeObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Asks the link to connect. The result is reported through
    /// [`TreeModel::handle_event`].
    pub fn connect(&mut self) -> Result<(), EngineError> {
        let link = self.link.as_mut().ok_or(EngineError::Offline)?;
        link.connect()?;
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(link) = self.link.as_mut() {
            link.disconnect();
        }
    }

    /// Applies one event coming from the listener bridge.
    pub fn handle_event(&mut self, event: ListenerEvent) {
        match event {
            ListenerEvent::Connected => {
                info!("Broker connection established");
                self.state = ConnectionState::Connected;
            }
            ListenerEvent::ConnectFailed { reason } => {
                warn!("Broker connection failed: {}", reason);
                self.state = ConnectionState::Failed;
                self.stats.last_error = Some(reason);
            }
            ListenerEvent::Disconnected { reason } => {
                info!("Broker connection closed");
                self.state = ConnectionState::Disconnected;
                self.stats.last_error = reason;
            }
            ListenerEvent::Message(message) => {
                self.on_message(&message);
            }
        }
    }

    /// Ingests one message and notifies observers. Returns the target node.
    pub fn on_message(&mut self, message: &IncomingMessage) -> NodeId {
        self.on_message_at(message, Local::now().trunc_subsecs(6))
    }

    pub(crate) fn on_message_at(&mut self, message: &IncomingMessage, received: DateTime<Local>) -> NodeId {
        let fragments = split_topic(&message.topic);
        let (node, created) = self.tree.find_or_create_path(&fragments);

        let payload = decode_payload(&message.payload);
        if let Cow::Owned(_) = payload {
            debug!(
                "Payload on '{}' is not UTF-8, showing escaped bytes",
                message.topic
            );
            self.stats.decode_fallbacks += 1;
        }
        let changed = self.tree.record_payload(node, payload, received);

        self.stats.messages_received += 1;
        self.stats.last_activity = Some(received);
        if !changed {
            self.stats.messages_unchanged += 1;
        }

        if created > 0 {
            let insertion_point = self
                .tree
                .ancestors_inclusive(node)
                .nth(created)
                .unwrap_or(NodeId::ROOT);
            self.notify(|observer, tree| observer.on_structural_change(tree, insertion_point));
        } else if changed {
            self.notify(|observer, tree| {
                observer.on_data_changed(tree, node, &[Column::Payload, Column::Messages])
            });
            let ancestors: Vec<NodeId> = self.tree.ancestors_inclusive(node).skip(1).collect();
            for ancestor in ancestors {
                self.notify(|observer, tree| {
                    observer.on_data_changed(tree, ancestor, &[Column::Messages])
                });
            }
        }
        self.notify(|observer, tree| observer.on_node_updated(tree, node));

        node
    }

    fn notify(&mut self, mut call: impl FnMut(&mut dyn TreeObserver, &TopicTree)) {
        for observer in self.observers.iter_mut() {
            call(observer.as_mut(), &self.tree);
        }
    }

    /// Forwards a message to the broker. The tree only changes if the broker
    /// echoes the message back.
    pub fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: u8,
        retain: bool,
    ) -> Result<DeliveryHandle, EngineError> {
        let link = self.link.as_ref().ok_or(EngineError::Offline)?;
        match link.publish(topic, payload, qos, retain) {
            Ok(handle) => {
                self.stats.messages_sent += 1;
                Ok(handle)
            }
            Err(e) => {
                warn!("Publish to '{}' failed: {}", topic, e);
                self.stats.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Processes events until every sender is gone.
    pub async fn run(&mut self, events: &mut EventReceiver) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        debug!("Listener bridge closed");
    }

    /// Processes whatever is queued without waiting. Returns how many events
    /// were handled.
    pub fn drain_pending(&mut self, events: &mut EventReceiver) -> usize {
        let mut handled = 0;
        while let Ok(event) = events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Connection parameters for this session.
    pub fn session_config(&self) -> MqttListenerConfig {
        self.link
            .as_ref()
            .map(BrokerLink::to_config)
            .unwrap_or_else(|| self.offline_config.clone())
    }

    pub fn snapshot_session(&self) -> SessionSnapshot {
        session::save(&self.tree, &self.session_config())
    }

    pub fn details(&self, node: NodeId) -> NodeDetails {
        NodeDetails::for_node(&self.tree, node)
    }

    /// Visible nodes for a search string; see [`TopicTree::filter`].
    pub fn filter(&self, text: &str) -> Vec<NodeId> {
        self.tree.filter(text)
    }
}
