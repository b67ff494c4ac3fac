//! Client configuration with defaults.

use serde::{Deserialize, Serialize};

use crate::error::MpdError;

/// How the client reaches the MPD server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
  /// TCP connection to host:port.
  Network,
  /// Local stream socket (Unix domain socket).
  Ipc,
}

/// MPD connection configuration. Every field has a default, so callers
/// only set what differs from a stock local server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MpdConfig {
  /// Connection type: network (TCP) or ipc (socket path).
  #[serde(default = "default_kind", rename = "type")]
  pub kind: ConnectionKind,

  /// Path to the Unix domain socket for ipc connections.
  #[serde(default = "default_ipc")]
  pub ipc: String,

  /// Server host for network connections.
  #[serde(default = "default_host")]
  pub host: String,

  /// Server TCP port for network connections.
  #[serde(default = "default_port")]
  pub port: u16,

  /// Enable TCP keep-alive (network connections only).
  #[serde(default)]
  pub keep_alive: bool,

  /// Delay between reconnection attempts, in milliseconds.
  #[serde(default = "default_reconnect_interval_ms")]
  pub reconnect_interval_ms: u64,
}

fn default_kind() -> ConnectionKind {
  ConnectionKind::Network
}

fn default_ipc() -> String {
  "/var/run/mpd/socket".to_string()
}

fn default_host() -> String {
  "localhost".to_string()
}

fn default_port() -> u16 {
  6600
}

fn default_reconnect_interval_ms() -> u64 {
  5000
}

impl Default for MpdConfig {
  fn default() -> Self {
    Self {
      kind: default_kind(),
      ipc: default_ipc(),
      host: default_host(),
      port: default_port(),
      keep_alive: false,
      reconnect_interval_ms: default_reconnect_interval_ms(),
    }
  }
}

impl MpdConfig {
  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), MpdError> {
    match self.kind {
      ConnectionKind::Network => {
        if self.host.trim().is_empty() {
          return Err(MpdError::InvalidConfig("host cannot be empty".to_string()));
        }
        if self.port == 0 {
          return Err(MpdError::InvalidConfig("port cannot be zero".to_string()));
        }
      }
      ConnectionKind::Ipc => {
        if self.ipc.trim().is_empty() {
          return Err(MpdError::InvalidConfig(
            "ipc socket path cannot be empty".to_string(),
          ));
        }
      }
    }
    if self.reconnect_interval_ms == 0 {
      return Err(MpdError::InvalidConfig(
        "reconnect interval cannot be zero".to_string(),
      ));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = MpdConfig::default();
    assert_eq!(config.kind, ConnectionKind::Network);
    assert_eq!(config.host, "localhost");
    assert_eq!(config.port, 6600);
    assert_eq!(config.ipc, "/var/run/mpd/socket");
    assert!(!config.keep_alive);
    assert_eq!(config.reconnect_interval_ms, 5000);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_partial_options_merge_with_defaults() {
    let config: MpdConfig =
      serde_json::from_str(r#"{ "type": "ipc", "ipc": "/tmp/mpd.sock" }"#).unwrap();
    assert_eq!(config.kind, ConnectionKind::Ipc);
    assert_eq!(config.ipc, "/tmp/mpd.sock");
    assert_eq!(config.host, "localhost");
    assert_eq!(config.port, 6600);
  }

  #[test]
  fn test_unknown_type_is_rejected() {
    let parsed = serde_json::from_str::<MpdConfig>(r#"{ "type": "serial" }"#);
    assert!(parsed.is_err());
  }

  #[test]
  fn test_validate_rejects_bad_values() {
    let config = MpdConfig {
      host: " ".to_string(),
      ..Default::default()
    };
    assert!(config.validate().is_err());

    let config = MpdConfig {
      kind: ConnectionKind::Ipc,
      ipc: String::new(),
      ..Default::default()
    };
    assert!(config.validate().is_err());
  }
}
