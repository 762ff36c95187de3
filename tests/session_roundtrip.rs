use mqtt_navigator::engine::{EventBridge, ModelNotification, TreeModel};
use mqtt_navigator::mqtt::{IncomingMessage, MqttListener, MqttListenerConfig};
use mqtt_navigator::session;
use mqtt_navigator::tree::TopicTree;
use tempfile::tempdir;
use tokio::sync::mpsc;

fn ingest(model: &mut TreeModel<MqttListener>, messages: &[(&str, &[u8])]) {
    for (topic, payload) in messages {
        model.on_message(&IncomingMessage::new(*topic, payload.to_vec()));
    }
}

#[tokio::test]
async fn saved_session_reopens_offline() {
    let config = MqttListenerConfig::new("broker.example", 1883).with_credentials("nav", "pw");
    let listener = MqttListener::from_config(config.clone());
    let _events = EventBridge::attach(&listener);
    let mut model = TreeModel::new(TopicTree::new(), listener);

    let (tx, mut rx) = mpsc::unbounded_channel();
    model.add_observer(tx);

    ingest(
        &mut model,
        &[
            ("a/b", &b"1"[..]),
            ("a/b", &b"1"[..]),
            ("a/c", &b"2"[..]),
            ("bin", &b"\xff\xfe"[..]),
        ],
    );
    let a = model.tree().node_for_topic("a").unwrap();
    assert_eq!(model.tree().recursive_message_count(a), 2);

    let mut structural = 0;
    while let Ok(notification) = rx.try_recv() {
        if matches!(notification, ModelNotification::StructuralChange { .. }) {
            structural += 1;
        }
    }
    assert_eq!(structural, 3);

    let dir = tempdir().unwrap();
    let path = session::default_file_name(dir.path());
    session::save_to_path(&model.snapshot_session(), &path)
        .await
        .unwrap();

    let preview = session::preview_file(&path).await.unwrap();
    assert_eq!(preview.host, "broker.example");
    assert_eq!(preview.topics, 4);
    assert_eq!(preview.history_entries, 3);

    let (tree, restored_config) = session::load_from_path(&path).await.unwrap();
    assert_eq!(restored_config, config);
    assert_eq!(tree.topics(), model.tree().topics());

    let offline = TreeModel::offline(tree, restored_config);
    let bin = offline.tree().node_for_topic("bin").unwrap();
    assert_eq!(offline.tree().node(bin).payload(), r#"b"\xff\xfe""#);
    assert_eq!(offline.snapshot_session().state.count_history_entries(), 3);
}
