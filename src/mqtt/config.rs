use serde::{Deserialize, Serialize};
use std::fmt;

/// Default plain-text MQTT port.
pub const DEFAULT_PORT: u16 = 1883;

/// Connection parameters of a listener.
///
/// The same structure is written into session files. `password` is stored in
/// cleartext there.
#[derive(Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct MqttListenerConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl MqttListenerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Credentials are only applied when a non-empty username is set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match self.username.as_deref() {
            Some(user) if !user.is_empty() => {
                Some((user, self.password.as_deref().unwrap_or_default()))
            }
            _ => None,
        }
    }
}

impl Default for MqttListenerConfig {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

// Keeps the password out of log lines.
impl fmt::Debug for MqttListenerConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MqttListenerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}
