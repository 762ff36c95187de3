//! Hand-off from the transport task to the task owning the tree.
//!
//! Listener handlers run wherever `rumqttc` polls its event loop. The bridge
//! registers one handler per event kind that only forwards the event into an
//! unbounded channel, so the tree is never touched from the transport side and
//! the transport never waits on the model.

use tokio::sync::mpsc;
use tracing::debug;

use crate::mqtt::{ListenerEvent, MqttListener};

pub type EventReceiver = mpsc::UnboundedReceiver<ListenerEvent>;

pub struct EventBridge;

impl EventBridge {
    /// Registers forwarding handlers on `listener` and returns the receiving
    /// end. The channel closes once the listener (and with it every handler)
    /// is dropped.
    pub fn attach(listener: &MqttListener) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();

        let sender = tx.clone();
        listener.add_connect_listener(move || forward(&sender, ListenerEvent::Connected));

        let sender = tx.clone();
        listener.add_connect_fail_listener(move |reason| {
            forward(
                &sender,
                ListenerEvent::ConnectFailed {
                    reason: reason.to_string(),
                },
            )
        });

        let sender = tx.clone();
        listener.add_disconnect_listener(move |reason| {
            forward(
                &sender,
                ListenerEvent::Disconnected {
                    reason: reason.map(str::to_string),
                },
            )
        });

        listener.add_message_listener(move |message| {
            forward(&tx, ListenerEvent::Message(message.clone()))
        });

        rx
    }
}

fn forward(sender: &mpsc::UnboundedSender<ListenerEvent>, event: ListenerEvent) {
    if sender.send(event).is_err() {
        debug!("Tree model is gone, dropping listener event");
    }
}
