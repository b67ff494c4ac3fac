//! MPD client error types.

use thiserror::Error;

/// Errors that can occur when talking to an MPD server.
#[derive(Debug, Error)]
pub enum MpdError {
  #[error("Connection failed: {0}")]
  ConnectionFailed(String),

  #[error("Transport error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Unexpected greeting message: '{0}'")]
  Greeting(String),

  #[error("Bad status '{status}' returned for command '{command}'")]
  CommandFailed { status: String, command: String },

  #[error("Received unknown message during idle: {0}")]
  UnknownIdleMessage(String),

  #[error("Unknown response line: '{0}'")]
  KvpParse(String),

  #[error("Disconnected")]
  Disconnected,

  #[error("Invalid configuration: {0}")]
  InvalidConfig(String),
}

impl MpdError {
  /// Whether the error invalidates the whole connection (forces a
  /// reconnect cycle) as opposed to failing a single command or refresh.
  pub fn is_connection_fatal(&self) -> bool {
    matches!(
      self,
      MpdError::ConnectionFailed(_)
        | MpdError::Io(_)
        | MpdError::Greeting(_)
        | MpdError::UnknownIdleMessage(_)
        | MpdError::Disconnected
    )
  }
}
