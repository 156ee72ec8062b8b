//! Node configuration.
//!
//! Loaded once at startup from a TOML file; every section has workable defaults so a
//! standalone node (in-memory triple store, no peer relay) starts with an empty file.

use serde::Deserialize;
use std::fmt;
use std::path::Path;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "Configuration file error: {}", err),
            ConfigError::Parse(msg) => write!(f, "Configuration parse error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Parse(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub peer: PeerSection,
    #[serde(default)]
    pub triplestore: TripleStoreSection,
    #[serde(default)]
    pub observer: ObserverSection,
    #[serde(default)]
    pub retention: RetentionSection,
    #[serde(default)]
    pub webhook: WebhookSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSection {
    /// Distinguished-name identity of this node, e.g. `O=Acme,L=Rotterdam,C=NL`.
    #[serde(default = "default_identity")]
    pub identity: String,
    #[serde(default = "default_listen")]
    pub listen_addr: String,
    /// Pre-shared key expected on the inbound peer message endpoint. `None` disables the check.
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PeerSection {
    /// Message endpoint of the peer relay. `None` makes every delivery fail visibly.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Pre-shared key sent as `x-api-key` on outbound deliveries.
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TripleStoreSection {
    /// Repository URL of the external SPARQL store. `None` selects the in-memory store.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_millis: u64,
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_millis: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObserverSection {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionSection {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct WebhookSection {
    /// PEM-encoded RSA private key used to sign client-assertion JWTs
    /// when acquiring webhook access tokens.
    #[serde(default)]
    pub signing_key: Option<String>,
}

fn default_identity() -> String {
    "O=Hermes,L=Local,C=XX".to_string()
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_connect_timeout() -> u64 {
    5_000
}

fn default_socket_timeout() -> u64 {
    30_000
}

fn default_poll_interval() -> u64 {
    60
}

fn default_initial_delay() -> u64 {
    15
}

fn default_page_size() -> usize {
    500
}

fn default_sweep_interval() -> u64 {
    86_400
}

impl Default for NodeSection {
    fn default() -> Self {
        NodeSection { identity: default_identity(), listen_addr: default_listen(), api_key: None }
    }
}

impl Default for TripleStoreSection {
    fn default() -> Self {
        TripleStoreSection {
            endpoint: None,
            connect_timeout_millis: default_connect_timeout(),
            socket_timeout_millis: default_socket_timeout(),
        }
    }
}

impl Default for ObserverSection {
    fn default() -> Self {
        ObserverSection {
            poll_interval_secs: default_poll_interval(),
            initial_delay_secs: default_initial_delay(),
            page_size: default_page_size(),
        }
    }
}

impl Default for RetentionSection {
    fn default() -> Self {
        RetentionSection { sweep_interval_secs: default_sweep_interval() }
    }
}

impl NodeConfig {
    /// Load the configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = NodeConfig::from_toml("").unwrap();
        assert_eq!(config.observer.poll_interval_secs, 60);
        assert_eq!(config.observer.initial_delay_secs, 15);
        assert_eq!(config.retention.sweep_interval_secs, 86_400);
        assert!(config.peer.endpoint.is_none());
        assert!(config.triplestore.endpoint.is_none());
    }

    #[test]
    fn sections_override_defaults() {
        let raw = r#"
            [node]
            identity = "O=Acme,L=Rotterdam,C=NL"

            [peer]
            endpoint = "http://relay.example/api/message"
            api_key = "secret"

            [observer]
            poll_interval_secs = 5
        "#;
        let config = NodeConfig::from_toml(raw).unwrap();
        assert_eq!(config.node.identity, "O=Acme,L=Rotterdam,C=NL");
        assert_eq!(config.peer.endpoint.as_deref(), Some("http://relay.example/api/message"));
        assert_eq!(config.observer.poll_interval_secs, 5);
        assert_eq!(config.observer.page_size, 500);
    }
}
