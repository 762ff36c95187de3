use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::MqttListenerConfig;
use super::message::{qos_from_level, DeliveryHandle, IncomingMessage, ListenerEvent};

/// Wildcard subscribed on every successful connect.
pub const ALL_TOPICS: &str = "#";

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("No tokio runtime available to drive the MQTT event loop")]
    NoRuntime,

    #[error("Listener is already connected or connecting")]
    AlreadyConnected,

    #[error("Listener is not connected")]
    NotConnected,

    #[error("Invalid QoS level: {0}")]
    InvalidQos(u8),

    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// The part of a broker connection the update engine relies on.
///
/// Keeping the engine behind this trait lets it run against a test double.
pub trait BrokerLink {
    /// Queues a message without waiting for delivery.
    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: u8,
        retain: bool,
    ) -> Result<DeliveryHandle, ListenerError>;

    /// Connection parameters to persist with a session.
    fn to_config(&self) -> MqttListenerConfig;

    /// Starts connecting; the outcome arrives as a listener event.
    fn connect(&mut self) -> Result<(), ListenerError>;

    fn disconnect(&mut self);
}

/// Transport settings that are not part of the persisted connection config.
#[derive(Debug, Clone)]
pub struct ListenerOptions {
    pub client_id: String,
    pub keep_alive: Duration,
    pub channel_capacity: usize,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            client_id: format!("mqtt-navigator-{}", std::process::id()),
            keep_alive: Duration::from_secs(5),
            channel_capacity: 100,
        }
    }
}

type ConnectHandler = Box<dyn Fn() + Send + Sync>;
type ConnectFailHandler = Box<dyn Fn(&str) + Send + Sync>;
type DisconnectHandler = Box<dyn Fn(Option<&str>) + Send + Sync>;
type MessageHandler = Box<dyn Fn(&IncomingMessage) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Handlers {
    connect: Vec<ConnectHandler>,
    connect_fail: Vec<ConnectFailHandler>,
    disconnect: Vec<DisconnectHandler>,
    message: Vec<MessageHandler>,
}

impl Handlers {
    /// Invokes every handler registered for `event`, in registration order.
    pub(crate) fn dispatch(&self, event: &ListenerEvent) {
        match event {
            ListenerEvent::Connected => self.connect.iter().for_each(|handler| handler()),
            ListenerEvent::ConnectFailed { reason } => {
                self.connect_fail.iter().for_each(|handler| handler(reason))
            }
            ListenerEvent::Disconnected { reason } => self
                .disconnect
                .iter()
                .for_each(|handler| handler(reason.as_deref())),
            ListenerEvent::Message(message) => {
                self.message.iter().for_each(|handler| handler(message))
            }
        }
    }
}

/// Wraps one broker connection and fans its events out to registered handlers.
///
/// Handlers run on the transport task, not on the caller's thread. Anything
/// touching the topic tree must be forwarded through
/// [`EventBridge`](crate::engine::bridge::EventBridge) first.
pub struct MqttListener {
    config: MqttListenerConfig,
    options: ListenerOptions,
    handlers: Arc<RwLock<Handlers>>,
    client: Option<AsyncClient>,
    task: Option<JoinHandle<()>>,
    next_delivery: AtomicU64,
}

impl MqttListener {
    pub fn new(config: MqttListenerConfig, options: ListenerOptions) -> Self {
        Self {
            config,
            options,
            handlers: Arc::new(RwLock::new(Handlers::default())),
            client: None,
            task: None,
            next_delivery: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: MqttListenerConfig) -> Self {
        Self::new(config, ListenerOptions::default())
    }

    /// Parameters the listener was built from, password included.
    pub fn to_config(&self) -> MqttListenerConfig {
        self.config.clone()
    }

    pub fn add_connect_listener(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.with_handlers(|handlers| handlers.connect.push(Box::new(handler)));
    }

    pub fn add_connect_fail_listener(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        self.with_handlers(|handlers| handlers.connect_fail.push(Box::new(handler)));
    }

    pub fn add_disconnect_listener(
        &self,
        handler: impl Fn(Option<&str>) + Send + Sync + 'static,
    ) {
        self.with_handlers(|handlers| handlers.disconnect.push(Box::new(handler)));
    }

    pub fn add_message_listener(
        &self,
        handler: impl Fn(&IncomingMessage) + Send + Sync + 'static,
    ) {
        self.with_handlers(|handlers| handlers.message.push(Box::new(handler)));
    }

    #[cfg(test)]
    pub(crate) fn emit(&self, event: &ListenerEvent) {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .dispatch(event);
    }

    fn with_handlers(&self, register: impl FnOnce(&mut Handlers)) {
        let mut guard = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        register(&mut guard);
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Starts connecting in the background. The outcome is reported through
    /// the connect / connect-fail handlers.
    pub fn connect(&mut self) -> Result<(), ListenerError> {
        if self.is_running() {
            return Err(ListenerError::AlreadyConnected);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ListenerError::NoRuntime)?;

        let mut mqtt_options = MqttOptions::new(
            self.options.client_id.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        mqtt_options.set_keep_alive(self.options.keep_alive);
        if let Some((user, password)) = self.config.credentials() {
            mqtt_options.set_credentials(user, password);
        }

        let (client, eventloop) = AsyncClient::new(mqtt_options, self.options.channel_capacity);
        info!(
            "Connecting to {}:{} as {}",
            self.config.host, self.config.port, self.options.client_id
        );

        let handlers = self.handlers.clone();
        let loop_client = client.clone();
        self.task = Some(runtime.spawn(run_event_loop(eventloop, loop_client, handlers)));
        self.client = Some(client);
        Ok(())
    }

    /// Requests a clean disconnect. The event loop ends once the broker
    /// acknowledges it or the connection drops.
    pub fn disconnect(&mut self) {
        let Some(client) = self.client.take() else {
            debug!("Disconnect requested on idle listener");
            return;
        };
        if let Err(e) = client.try_disconnect() {
            warn!("Clean disconnect failed, stopping event loop: {}", e);
            if let Some(task) = self.task.take() {
                task.abort();
            }
        }
    }

    /// Waits for the event loop to finish, e.g. after [`MqttListener::disconnect`].
    pub async fn closed(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("MQTT event loop panicked: {}", e);
                }
            }
        }
    }
}

impl BrokerLink for MqttListener {
    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: u8,
        retain: bool,
    ) -> Result<DeliveryHandle, ListenerError> {
        let level = qos_from_level(qos).ok_or(ListenerError::InvalidQos(qos))?;
        let client = self.client.as_ref().ok_or(ListenerError::NotConnected)?;

        client.try_publish(topic, level, retain, payload.to_vec())?;
        let id = self.next_delivery.fetch_add(1, Ordering::Relaxed);
        debug!("Queued publish #{} on '{}' (qos {}, retain {})", id, topic, qos, retain);

        Ok(DeliveryHandle {
            id,
            topic: topic.to_string(),
        })
    }

    fn to_config(&self) -> MqttListenerConfig {
        self.config.clone()
    }

    fn connect(&mut self) -> Result<(), ListenerError> {
        MqttListener::connect(self)
    }

    fn disconnect(&mut self) {
        MqttListener::disconnect(self)
    }
}

impl Drop for MqttListener {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// What the event loop does with one poll result.
#[derive(Debug, PartialEq)]
pub(crate) enum LoopStep {
    /// The broker accepted the session; subscribe before reporting it.
    Subscribe,
    Emit(ListenerEvent),
    /// Report the event, then end the loop.
    Stop(ListenerEvent),
    Ignore,
}

pub(crate) fn next_step(polled: Result<Event, ConnectionError>, connected: bool) -> LoopStep {
    match polled {
        Ok(Event::Incoming(Packet::ConnAck(_))) => LoopStep::Subscribe,
        Ok(Event::Incoming(Packet::Publish(publish))) => LoopStep::Emit(ListenerEvent::Message(
            IncomingMessage::new(publish.topic, publish.payload.to_vec()),
        )),
        Ok(Event::Incoming(Packet::Disconnect)) => {
            info!("Broker closed the session");
            LoopStep::Stop(ListenerEvent::Disconnected {
                reason: Some("broker sent disconnect".to_string()),
            })
        }
        Ok(Event::Outgoing(Outgoing::Disconnect)) => {
            info!("Disconnected");
            LoopStep::Stop(ListenerEvent::Disconnected { reason: None })
        }
        Ok(_) => LoopStep::Ignore,
        Err(ConnectionError::ConnectionRefused(code)) => {
            warn!("Broker refused connection: {:?}", code);
            LoopStep::Stop(ListenerEvent::ConnectFailed {
                reason: format!("connection refused: {:?}", code),
            })
        }
        Err(e) if connected => {
            warn!("Connection lost: {}", e);
            LoopStep::Stop(ListenerEvent::Disconnected {
                reason: Some(e.to_string()),
            })
        }
        Err(e) => {
            warn!("Connection failed: {}", e);
            LoopStep::Stop(ListenerEvent::ConnectFailed {
                reason: e.to_string(),
            })
        }
    }
}

/// Connect is only reported once the wildcard subscription is queued.
pub(crate) fn after_subscribe<E: std::fmt::Display>(result: Result<(), E>) -> LoopStep {
    match result {
        Ok(()) => {
            info!("Connected, subscribed to '{}'", ALL_TOPICS);
            LoopStep::Emit(ListenerEvent::Connected)
        }
        Err(e) => {
            error!("Failed to subscribe to '{}': {}", ALL_TOPICS, e);
            LoopStep::Stop(ListenerEvent::ConnectFailed {
                reason: format!("subscribe to '{}' failed: {}", ALL_TOPICS, e),
            })
        }
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    handlers: Arc<RwLock<Handlers>>,
) {
    let dispatch = |event: ListenerEvent| {
        handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .dispatch(&event);
    };
    let mut connected = false;

    loop {
        let mut step = next_step(eventloop.poll().await, connected);
        if step == LoopStep::Subscribe {
            step = after_subscribe(client.try_subscribe(ALL_TOPICS, QoS::AtMostOnce));
            connected = matches!(step, LoopStep::Emit(_));
        }

        match step {
            LoopStep::Emit(event) => dispatch(event),
            LoopStep::Stop(event) => {
                dispatch(event);
                break;
            }
            LoopStep::Subscribe | LoopStep::Ignore => {}
        }
    }
}
