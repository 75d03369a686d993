use std::path::Path;

use serde::Deserialize;

use crate::common::{Result, SyncError};

pub const DEFAULT_PEERS: [&str; 3] = ["localhost:8000", "localhost:8001", "localhost:8002"];

/// Identity and peer set for one node. The peer list may contain the node's
/// own address; protocols skip it.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub address: String,
    #[serde(default = "default_peers")]
    pub peers: Vec<String>,
}

fn default_peers() -> Vec<String> {
    DEFAULT_PEERS.iter().map(|peer| peer.to_string()).collect()
}

impl NodeConfig {
    pub fn new(name: impl Into<String>, address: impl Into<String>, peers: Vec<String>) -> Self {
        NodeConfig {
            name: name.into(),
            address: address.into(),
            peers,
        }
    }

    /// `Node_<port>` listening on `localhost:<port>`.
    pub fn for_port(port: u16, peers: Option<Vec<String>>) -> Self {
        NodeConfig {
            name: format!("Node_{}", port),
            address: format!("localhost:{}", port),
            peers: peers.unwrap_or_else(default_peers),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: NodeConfig = toml::from_str(raw).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    /// Peers other than this node.
    pub fn remote_peers(&self) -> impl Iterator<Item = &str> {
        self.peers
            .iter()
            .map(String::as_str)
            .filter(move |peer| *peer != self.address)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SyncError::Config("node name is empty".to_string()));
        }
        if !self.address.contains(':') {
            return Err(SyncError::Config(format!("address {:?} is not host:port", self.address)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_port_uses_default_peers() {
        let config = NodeConfig::for_port(8001, None);
        assert_eq!(config.name, "Node_8001");
        assert_eq!(config.address, "localhost:8001");
        assert_eq!(config.peers.len(), 3);

        let remote: Vec<&str> = config.remote_peers().collect();
        assert_eq!(remote, vec!["localhost:8000", "localhost:8002"]);
    }

    #[test]
    fn test_from_toml_str() {
        let raw = r#"
            name = "alpha"
            address = "127.0.0.1:9000"
            peers = ["127.0.0.1:9000", "127.0.0.1:9001"]
        "#;
        let config = NodeConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.name, "alpha");
        assert_eq!(config.remote_peers().collect::<Vec<_>>(), vec!["127.0.0.1:9001"]);
    }

    #[test]
    fn test_from_toml_str_defaults_peers() {
        let config = NodeConfig::from_toml_str("name = \"a\"\naddress = \"localhost:8000\"\n").unwrap();
        assert_eq!(config.peers, default_peers());
    }

    #[test]
    fn test_from_toml_str_rejects_bad_address() {
        let err = NodeConfig::from_toml_str("name = \"a\"\naddress = \"nowhere\"\n").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_from_file_missing() {
        let err = NodeConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
