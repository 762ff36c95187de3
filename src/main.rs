use std::path::PathBuf;

use color_eyre::Result;
use mqtt_navigator::config::{self, AppConfig};
use mqtt_navigator::engine::{ConnectionState, EventBridge, TreeModel, TreeObserver};
use mqtt_navigator::logging;
use mqtt_navigator::mqtt::MqttListener;
use mqtt_navigator::session;
use mqtt_navigator::tree::{NodeId, TopicTree};
use tracing::{debug, info, warn};

/// Logs every tree change at debug level.
struct UpdateLog;

impl TreeObserver for UpdateLog {
    fn on_structural_change(&mut self, tree: &TopicTree, subtree_root: NodeId) {
        debug!(
            "New topics below '{}' ({} nodes total)",
            tree.full_topic(subtree_root),
            tree.len() - 1
        );
    }

    fn on_node_updated(&mut self, tree: &TopicTree, node: NodeId) {
        debug!("{} = {}", tree.full_topic(node), tree.node(node).payload());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = setup().await?;
    let session_path = std::env::args().nth(1).map(PathBuf::from);

    let (tree, broker) = match &session_path {
        Some(path) => session::load_from_path(path).await?,
        None => (TopicTree::new(), config.broker.clone()),
    };

    let listener = MqttListener::new(broker, config.listener_options());
    let mut events = EventBridge::attach(&listener);
    let mut model = TreeModel::new(tree, listener);
    model.add_observer(UpdateLog);
    model.connect()?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => model.handle_event(event),
                None => break,
            },
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Shutting down");
                break;
            }
        }

        if matches!(
            model.connection_state(),
            ConnectionState::Disconnected | ConnectionState::Failed
        ) {
            break;
        }
    }

    if matches!(
        model.connection_state(),
        ConnectionState::Connected | ConnectionState::Connecting
    ) {
        model.disconnect();
    }
    if let Some(listener) = model.link_mut() {
        listener.closed().await;
    }
    model.drain_pending(&mut events);

    let stats = model.stats();
    info!(
        "Received {} messages on {} topics",
        stats.messages_received,
        model.tree().len() - 1
    );

    if model.tree().is_empty() {
        info!("Nothing received, not saving a session");
        return Ok(());
    }
    let path = session::default_file_name(&config.session_dir);
    session::save_to_path(&model.snapshot_session(), &path).await?;

    Ok(())
}

async fn setup() -> Result<AppConfig> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;

    config::ensure_default_config().await?;
    let config = AppConfig::load().await?;

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", &config.log_level)
    }
    logging::init();
    info!("Using config {}", config::config_path().display());
    Ok(config)
}
