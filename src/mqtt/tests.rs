use super::listener::{after_subscribe, next_step, Handlers, LoopStep};
use super::message::qos_from_level;
use super::*;
use rumqttc::{ConnAck, ConnectReturnCode, ConnectionError, Event, Packet, QoS};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

fn closed_port_config() -> MqttListenerConfig {
    // Port 1 on loopback refuses connections on any sane test machine.
    MqttListenerConfig::new("127.0.0.1", 1)
}

#[test]
fn to_config_returns_construction_parameters() {
    let config = MqttListenerConfig::new("broker.local", 1884).with_credentials("user", "secret");
    let listener = MqttListener::from_config(config.clone());
    assert_eq!(listener.to_config(), config);
    assert_eq!(listener.to_config().password.as_deref(), Some("secret"));
}

#[test]
fn debug_output_hides_password() {
    let config = MqttListenerConfig::new("broker.local", 1883).with_credentials("user", "secret");
    let printed = format!("{:?}", config);
    assert!(printed.contains("user"));
    assert!(!printed.contains("secret"));
}

#[test]
fn credentials_require_username() {
    let mut config = MqttListenerConfig::default();
    assert_eq!(config.port, 1883);
    assert!(config.credentials().is_none());

    config.username = Some(String::new());
    assert!(config.credentials().is_none());

    config.username = Some("me".to_string());
    assert_eq!(config.credentials(), Some(("me", "")));
}

#[test]
fn qos_levels_map_to_transport() {
    assert_eq!(qos_from_level(0), Some(QoS::AtMostOnce));
    assert_eq!(qos_from_level(1), Some(QoS::AtLeastOnce));
    assert_eq!(qos_from_level(2), Some(QoS::ExactlyOnce));
    assert_eq!(qos_from_level(3), None);
}

#[test]
fn publish_without_connection_fails() {
    let listener = MqttListener::from_config(MqttListenerConfig::default());
    assert!(matches!(
        listener.publish("a/b", b"1", 0, false),
        Err(ListenerError::NotConnected)
    ));
    assert!(matches!(
        listener.publish("a/b", b"1", 7, false),
        Err(ListenerError::InvalidQos(7))
    ));
}

#[test]
fn connect_outside_runtime_is_rejected() {
    let mut listener = MqttListener::from_config(MqttListenerConfig::default());
    assert!(matches!(listener.connect(), Err(ListenerError::NoRuntime)));
    assert!(!listener.is_running());
}

#[test]
fn handlers_run_in_registration_order() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let listener = MqttListener::from_config(MqttListenerConfig::default());

    for name in ["first", "second"] {
        let calls = calls.clone();
        listener.add_message_listener(move |message| {
            calls.lock().unwrap().push(format!("{}:{}", name, message.topic));
        });
    }
    let log = calls.clone();
    listener.add_connect_listener(move || log.lock().unwrap().push("connected".to_string()));
    let log = calls.clone();
    listener.add_disconnect_listener(move |reason| {
        log.lock()
            .unwrap()
            .push(format!("disconnected:{}", reason.unwrap_or("clean")));
    });

    listener.emit(&ListenerEvent::Connected);
    listener.emit(&ListenerEvent::Message(IncomingMessage::new("a/b", "1")));
    listener.emit(&ListenerEvent::ConnectFailed {
        reason: "nobody listening".to_string(),
    });
    listener.emit(&ListenerEvent::Disconnected { reason: None });

    assert_eq!(
        *calls.lock().unwrap(),
        vec!["connected", "first:a/b", "second:a/b", "disconnected:clean"]
    );
}

#[test]
fn empty_handler_lists_ignore_events() {
    let handlers = Handlers::default();
    handlers.dispatch(&ListenerEvent::Message(IncomingMessage::new("x", vec![0xff])));
}

#[tokio::test]
async fn refused_connection_reports_connect_failure() {
    let mut listener = MqttListener::from_config(closed_port_config());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let connected = tx.clone();
    listener.add_connect_listener(move || {
        let _ = connected.send(Err(()));
    });
    listener.add_connect_fail_listener(move |reason| {
        let _ = tx.send(Ok(reason.to_string()));
    });

    listener.connect().unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("connect outcome in time")
        .expect("handler called");
    assert!(outcome.is_ok(), "expected connect failure");

    listener.closed().await;
    assert!(!listener.is_running());
}

#[test]
fn connack_waits_for_subscription() {
    let ack = ConnAck {
        session_present: false,
        code: ConnectReturnCode::Success,
    };
    assert_eq!(
        next_step(Ok(Event::Incoming(Packet::ConnAck(ack))), false),
        LoopStep::Subscribe
    );
    assert_eq!(
        after_subscribe::<&str>(Ok(())),
        LoopStep::Emit(ListenerEvent::Connected)
    );
}

#[test]
fn failed_subscription_is_a_connect_failure() {
    match after_subscribe(Err("request queue full")) {
        LoopStep::Stop(ListenerEvent::ConnectFailed { reason }) => {
            assert!(reason.contains(ALL_TOPICS));
            assert!(reason.contains("request queue full"));
        }
        other => panic!("unexpected step: {:?}", other),
    }
}

#[test]
fn refused_connack_stops_with_connect_failure() {
    let refused = ConnectionError::ConnectionRefused(ConnectReturnCode::NotAuthorized);
    match next_step(Err(refused), false) {
        LoopStep::Stop(ListenerEvent::ConnectFailed { reason }) => {
            assert!(reason.contains("NotAuthorized"), "reason: {}", reason);
        }
        other => panic!("unexpected step: {:?}", other),
    }
}

#[test]
fn errors_after_connect_are_disconnects() {
    let refused = ConnectionError::ConnectionRefused(ConnectReturnCode::NotAuthorized);
    assert!(matches!(
        next_step(Err(refused), true),
        LoopStep::Stop(ListenerEvent::ConnectFailed { .. })
    ));
    assert!(matches!(
        next_step(Err(ConnectionError::RequestsDone), true),
        LoopStep::Stop(ListenerEvent::Disconnected { reason: Some(_) })
    ));
    assert!(matches!(
        next_step(Err(ConnectionError::RequestsDone), false),
        LoopStep::Stop(ListenerEvent::ConnectFailed { .. })
    ));
}
