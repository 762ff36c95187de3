//! # MQTT Listener Adapter
//!
//! Decouples the tree model from the transport. The adapter owns a `rumqttc`
//! client, subscribes to every topic once the broker accepts the connection
//! and re-emits transport events to any number of registered handlers.
//!
//! ```text
//! mqtt/
//! ├── config.rs    - persisted connection parameters
//! ├── message.rs   - normalized events, delivery receipts, QoS mapping
//! └── listener.rs  - MqttListener and the BrokerLink seam used by the engine
//! ```
//!
//! Delivery confirmation, retries and reconnects are left to the caller: a
//! failed connection is reported once through the connect-fail handlers and
//! the event loop stops.

pub mod config;
pub mod listener;
pub mod message;

#[cfg(test)]
mod tests;

pub use config::MqttListenerConfig;
pub use listener::{BrokerLink, ListenerError, ListenerOptions, MqttListener, ALL_TOPICS};
pub use message::{DeliveryHandle, IncomingMessage, ListenerEvent};
