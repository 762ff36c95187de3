use super::*;
use chrono::{Local, TimeZone};
use tempfile::tempdir;

fn sample_tree() -> TopicTree {
    let mut tree = TopicTree::new();
    let ts = |secs| Local.timestamp_opt(secs, 0).unwrap();

    let (temp, _) = tree.find_or_create_path(&["home", "kitchen", "temp"]);
    tree.record_payload(temp, "20.5", ts(1_700_000_000));
    tree.record_payload(temp, "21.0", ts(1_700_000_060));
    let (door, _) = tree.find_or_create_path(&["home", "door"]);
    tree.record_payload(door, "closed", ts(1_700_000_010));
    tree
}

#[test]
fn save_then_load_restores_tree_and_config() {
    let tree = sample_tree();
    let config = MqttListenerConfig::new("broker.local", 1884);

    let snapshot = save(&tree, &config);
    let (restored, restored_config) = load(&snapshot).unwrap();

    assert_eq!(restored, tree);
    assert_eq!(restored_config, config);
    assert_eq!(count_history_entries(&snapshot.state), 3);
}

#[test]
fn json_layout_uses_short_keys() {
    let snapshot = save(&sample_tree(), &MqttListenerConfig::default());
    let value: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();

    assert_eq!(value["config"]["host"], "localhost");
    assert_eq!(value["config"]["port"], 1883);
    assert!(value["config"]["username"].is_null());
    assert_eq!(value["state"]["t"], "");
    assert_eq!(value["state"]["h"], serde_json::json!([]));
    assert_eq!(value["state"]["c"][0]["t"], "home");
    assert_eq!(
        value["state"]["c"][0]["c"][1],
        serde_json::json!({"t": "door", "h": [["closed", 1_700_000_010.0]], "c": []})
    );
}

#[test]
fn from_json_accepts_handwritten_session() {
    let json = r#"{
        "config": {"host": "10.0.0.2", "port": 1883, "username": "u", "password": "p"},
        "state": {"t": "", "h": [], "c": [
            {"t": "a", "h": [], "c": [
                {"t": "b", "h": [["1", 1700000000.25], ["2", 1700000001.5]], "c": []}
            ]}
        ]}
    }"#;

    let (tree, config) = from_json(json).unwrap();
    assert_eq!(config.credentials(), Some(("u", "p")));

    let b = tree.node_for_topic("a/b").unwrap();
    assert_eq!(tree.node(b).payload(), "2");
    assert_eq!(tree.node(b).history().len(), 2);
    assert_eq!(tree.node(b).history()[0].timestamp.timestamp_millis(), 1_700_000_000_250);
}

#[test]
fn missing_config_is_malformed() {
    let json = r#"{"state": {"t": "", "h": [], "c": []}}"#;
    assert!(matches!(from_json(json), Err(SessionError::Malformed(_))));
}

#[test]
fn wrong_shapes_are_malformed() {
    let cases = [
        "not json",
        r#"{"config": {"host": "h", "port": 1883, "username": null, "password": null}}"#,
        r#"{"config": {"host": "h", "port": "x", "username": null, "password": null},
            "state": {"t": "", "h": [], "c": []}}"#,
        r#"{"config": {"host": "h", "port": 1883, "username": null, "password": null},
            "state": {"t": "", "h": [["only-payload"]], "c": []}}"#,
        r#"{"config": {"host": "h", "port": 1883, "username": null, "password": null},
            "state": {"topic": "", "h": [], "c": []}}"#,
    ];
    for json in cases {
        assert!(
            matches!(parse(json), Err(SessionError::Malformed(_))),
            "accepted: {json}"
        );
    }
}

#[test]
fn deep_session_reopens() {
    let topic = (0..150)
        .map(|level| level.to_string())
        .collect::<Vec<_>>()
        .join("/");
    let mut tree = TopicTree::new();
    let (leaf, _) = tree.find_or_create_path(&crate::tree::split_topic(&topic));
    tree.record_payload(leaf, "deep", Local.timestamp_opt(1_700_000_000, 0).unwrap());

    let json = save(&tree, &MqttListenerConfig::default()).to_json().unwrap();
    let (restored, _) = from_json(&json).unwrap();

    let restored_leaf = restored.node_for_topic(&topic).unwrap();
    assert_eq!(restored.full_topic(restored_leaf), topic);
    assert_eq!(restored.node(restored_leaf).payload(), "deep");
    assert_eq!(restored, tree);
}

#[test]
fn duplicate_siblings_are_rejected() {
    let json = r#"{
        "config": {"host": "h", "port": 1883, "username": null, "password": null},
        "state": {"t": "", "h": [], "c": [
            {"t": "a", "h": [["1", 1.0]], "c": []},
            {"t": "a", "h": [["2", 2.0]], "c": []}
        ]}
    }"#;

    match from_json(json) {
        Err(SessionError::InvalidTree(TreeError::DuplicateChild { parent, fragment })) => {
            assert_eq!(parent, crate::tree::NodeId::ROOT);
            assert_eq!(fragment, "a");
        }
        other => panic!("expected duplicate child, got {:?}", other.map(|(tree, _)| tree.len())),
    }
}

#[test]
fn trailing_garbage_is_malformed() {
    let json = r#"{"config": {"host": "h", "port": 1883, "username": null, "password": null},
        "state": {"t": "", "h": [], "c": []}} extra"#;
    assert!(matches!(parse(json), Err(SessionError::Malformed(_))));
}

#[test]
fn preview_counts_without_building_tree() {
    let snapshot = save(&sample_tree(), &MqttListenerConfig::new("preview.local", 8883));
    let preview = SessionPreview::from(&snapshot);
    assert_eq!(
        preview,
        SessionPreview {
            host: "preview.local".to_string(),
            port: 8883,
            topics: 4,
            history_entries: 3,
        }
    );
}

#[test]
fn default_file_name_has_session_extension() {
    let path = default_file_name(Path::new("/tmp/sessions"));
    assert_eq!(path.parent(), Some(Path::new("/tmp/sessions")));
    assert_eq!(
        path.extension().and_then(|ext| ext.to_str()),
        Some(SESSION_EXTENSION)
    );
    let name = path.file_name().unwrap().to_string_lossy();
    assert!(name.starts_with("session-"));
}

#[tokio::test]
async fn file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("saved.mqtt-navigator");
    let tree = sample_tree();
    let config = MqttListenerConfig::new("file.local", 1883).with_credentials("user", "secret");

    save_to_path(&save(&tree, &config), &path).await.unwrap();
    let written = tokio::fs::read_to_string(&path).await.unwrap();
    assert!(!written.contains('\n'));

    let (restored, restored_config) = load_from_path(&path).await.unwrap();
    assert_eq!(restored, tree);
    assert_eq!(restored_config, config);

    let preview = preview_file(&path).await.unwrap();
    assert_eq!(preview.host, "file.local");
    assert_eq!(preview.history_entries, 3);
}

#[tokio::test]
async fn missing_file_reports_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.mqtt-navigator");

    match load_from_path(&path).await {
        Err(SessionError::Io { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("unexpected result: {:?}", other.map(|(tree, _)| tree.len())),
    }
}
