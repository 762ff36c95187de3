//! # Session Files
//!
//! A session is the broker configuration plus a full snapshot of the topic
//! tree, stored as compact JSON:
//!
//! ```text
//! {
//!   "config": {"host": "...", "port": 1883, "username": null, "password": null},
//!   "state":  {"t": "", "h": [], "c": [{"t": "home", "h": [["on", 1718000000.5]], "c": []}]}
//! }
//! ```
//!
//! `state` is the implicit root. Parsing is fully typed, so a file with a
//! missing or wrongly shaped key is rejected before any tree is built.
//!
//! Passwords are written in cleartext. [`save`] logs a warning when that
//! happens.

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::mqtt::MqttListenerConfig;
use crate::tree::{NodeSnapshot, TopicTree, TreeError};

/// Extension used for session files.
pub const SESSION_EXTENSION: &str = "mqtt-navigator";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Malformed session data: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode session: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Invalid session tree: {0}")]
    InvalidTree(#[from] TreeError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub config: MqttListenerConfig,
    pub state: NodeSnapshot,
}

impl SessionSnapshot {
    pub fn to_json(&self) -> Result<String, SessionError> {
        serde_json::to_string(self).map_err(SessionError::Encode)
    }
}

/// Summary shown before a session is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPreview {
    pub host: String,
    pub port: u16,
    /// Nodes below the root.
    pub topics: usize,
    pub history_entries: usize,
}

impl From<&SessionSnapshot> for SessionPreview {
    fn from(snapshot: &SessionSnapshot) -> Self {
        Self {
            host: snapshot.config.host.clone(),
            port: snapshot.config.port,
            topics: snapshot.state.count_descendants(),
            history_entries: count_history_entries(&snapshot.state),
        }
    }
}

pub fn save(tree: &TopicTree, config: &MqttListenerConfig) -> SessionSnapshot {
    if config.password.as_deref().is_some_and(|password| !password.is_empty()) {
        warn!("Session for {} contains the broker password in cleartext", config.host);
    }
    SessionSnapshot {
        config: config.clone(),
        state: tree.serialize(),
    }
}

/// Rebuilds the tree of a parsed session. Fails with
/// [`SessionError::InvalidTree`] when siblings share a fragment.
pub fn load(snapshot: &SessionSnapshot) -> Result<(TopicTree, MqttListenerConfig), SessionError> {
    let tree = TopicTree::deserialize(&snapshot.state)?;
    Ok((tree, snapshot.config.clone()))
}

/// Parses session JSON of any nesting depth. Each topic level adds two JSON
/// levels; the stack grows on demand while parsing.
pub fn parse(json: &str) -> Result<SessionSnapshot, SessionError> {
    let mut deserializer = serde_json::Deserializer::from_str(json);
    deserializer.disable_recursion_limit();
    let snapshot = SessionSnapshot::deserialize(serde_stacker::Deserializer::new(&mut deserializer))
        .map_err(SessionError::Malformed)?;
    deserializer.end().map_err(SessionError::Malformed)?;
    Ok(snapshot)
}

pub fn from_json(json: &str) -> Result<(TopicTree, MqttListenerConfig), SessionError> {
    let snapshot = parse(json)?;
    load(&snapshot)
}

/// History entries in a snapshot, without building a tree.
pub fn count_history_entries(state: &NodeSnapshot) -> usize {
    state.count_history_entries()
}

pub async fn save_to_path(snapshot: &SessionSnapshot, path: &Path) -> Result<(), SessionError> {
    let content = snapshot.to_json()?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| io_error(parent, source))?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|source| io_error(path, source))?;

    info!(
        "Session saved to {} ({} history entries)",
        path.display(),
        count_history_entries(&snapshot.state)
    );
    Ok(())
}

pub async fn read_snapshot(path: &Path) -> Result<SessionSnapshot, SessionError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| io_error(path, source))?;
    debug!("Read {} bytes from {}", content.len(), path.display());
    parse(&content)
}

pub async fn load_from_path(path: &Path) -> Result<(TopicTree, MqttListenerConfig), SessionError> {
    let snapshot = read_snapshot(path).await?;
    let (tree, config) = load(&snapshot)?;
    info!(
        "Loaded session {} with {} nodes",
        path.display(),
        tree.len() - 1
    );
    Ok((tree, config))
}

pub async fn preview_file(path: &Path) -> Result<SessionPreview, SessionError> {
    let snapshot = read_snapshot(path).await?;
    Ok(SessionPreview::from(&snapshot))
}

/// `<dir>/session-YYYYmmdd-HHMMSS.mqtt-navigator`
pub fn default_file_name(dir: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    dir.join(format!("session-{}.{}", stamp, SESSION_EXTENSION))
}

fn io_error(path: &Path, source: std::io::Error) -> SessionError {
    SessionError::Io {
        path: path.to_path_buf(),
        source,
    }
}
