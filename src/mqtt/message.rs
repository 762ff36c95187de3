use rumqttc::QoS;
use std::fmt;

/// A message as delivered by the broker, before any decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl IncomingMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

impl fmt::Display for IncomingMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.topic, self.payload.len())
    }
}

/// Normalized transport events, in the order the transport produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    Connected,
    ConnectFailed { reason: String },
    Disconnected { reason: Option<String> },
    Message(IncomingMessage),
}

/// Receipt for a queued publish. Delivery itself is not tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryHandle {
    pub id: u64,
    pub topic: String,
}

/// Maps the numeric QoS level used by callers onto the transport's enum.
pub fn qos_from_level(level: u8) -> Option<QoS> {
    match level {
        0 => Some(QoS::AtMostOnce),
        1 => Some(QoS::AtLeastOnce),
        2 => Some(QoS::ExactlyOnce),
        _ => None,
    }
}
