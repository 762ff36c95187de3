//! # MQTT Navigator
//!
//! Core of a topic-tree browser for MQTT brokers. Every message seen on the
//! broker is filed into a tree keyed by topic fragments, each node keeps the
//! history of distinct payloads it received, and whole sessions can be
//! written to disk and reopened later without a broker.
//!
//! ## Data Flow
//!
//! ```text
//! rumqttc event loop ──► MqttListener handlers ──► EventBridge (mpsc)
//!                                                        │
//!                        TreeObserver(s) ◄── TreeModel ◄─┘
//!                                               │
//!                                          TopicTree ──► session JSON
//! ```
//!
//! ## Module Layout
//!
//! ```text
//! src/
//! ├── tree/      - arena topic tree, history, queries, snapshots
//! ├── mqtt/      - listener adapter around rumqttc
//! ├── engine/    - update engine, observers, listener bridge
//! ├── session/   - session file codec
//! ├── config.rs  - application settings (TOML)
//! └── logging.rs - tracing subscriber setup
//! ```

pub mod config;
pub mod engine;
pub mod logging;
pub mod mqtt;
pub mod session;
pub mod tree;

pub use engine::{EngineError, TreeModel, TreeObserver};
pub use mqtt::{MqttListener, MqttListenerConfig};
pub use session::{SessionError, SessionSnapshot};
pub use tree::{NodeId, TopicTree};
