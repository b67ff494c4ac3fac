//! High-level MPD client.
//!
//! One supervisor task owns the connection lifecycle. Inside a session the
//! protocol is strictly sequential: the loop parks the connection in idle
//! mode, and every wakeup (a caller's command or a server notification)
//! runs to completion before the next one is looked at. That single
//! dispatch path is what keeps command responses from ever being confused
//! with idle notifications.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::MpdConfig;
use crate::connection::Connection;
use crate::error::MpdError;
use crate::protocol::{
  check_response_status, parse_changed, parse_kvp, parse_status_value, ServerInfo, StatusValue,
};
use crate::song::{parse_playlist, parse_song_list, Song};

const CMD_IDLE: &str = "idle";
const CMD_NOIDLE: &str = "noidle";
const CMD_STATUS: &str = "status";
const CMD_LIST_ALL_INFO: &str = "listallinfo";
const CMD_PLAYLIST_INFO: &str = "playlistinfo";

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Events published over [`MpdClient::events`].
#[derive(Debug)]
pub enum MpdEvent {
  /// Connected, greeting validated and initial state fetched. Carries the
  /// initial status snapshot; all snapshots are also readable through the
  /// client getters from this point on.
  Ready {
    status: HashMap<String, StatusValue>,
    server: ServerInfo,
  },
  /// A subsystem refresh finished after an idle notification.
  Update(String),
  /// Companion to [`MpdEvent::Update`]: a fresh snapshot for the named
  /// subsystem is available.
  Status(String),
  /// A failure was observed; per-command failures are returned to the
  /// caller instead and never show up here.
  Error(MpdError),
  /// The connection dropped; the supervisor is scheduling reconnects.
  Disconnected,
}

/// A queued command with the channel that resolves its caller.
struct Request {
  line: String,
  reply: oneshot::Sender<Result<String, MpdError>>,
}

/// Derived server state, replaced by the refreshers and read by getters.
#[derive(Default)]
struct SharedState {
  status: HashMap<String, StatusValue>,
  playlist: Vec<Option<Song>>,
  songs: Vec<Song>,
  server: Option<ServerInfo>,
  connected: bool,
}

/// Handle to a supervised MPD connection. Cheap to clone; all clones share
/// the same connection and state.
#[derive(Clone)]
pub struct MpdClient {
  command_tx: mpsc::Sender<Request>,
  events: async_channel::Receiver<MpdEvent>,
  state: Arc<RwLock<SharedState>>,
  cancel: CancellationToken,
}

/// Generates the no-argument convenience commands as thin forwarders.
macro_rules! generic_commands {
  ($($name:ident => $cmd:literal),* $(,)?) => {
    $(
      #[doc = concat!("Send the `", $cmd, "` command.")]
      pub async fn $name(&self) -> Result<(), MpdError> {
        self.command($cmd, &[]).await
      }
    )*
  };
}

impl MpdClient {
  /// Start supervising a connection with the given configuration. Returns
  /// immediately; listen for [`MpdEvent::Ready`] to learn when the first
  /// connection is usable.
  pub fn connect(config: MpdConfig) -> Result<MpdClient, MpdError> {
    config.validate()?;
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (event_tx, events) = async_channel::unbounded();
    let state = Arc::new(RwLock::new(SharedState::default()));
    let cancel = CancellationToken::new();

    let supervisor = Supervisor {
      config,
      command_rx,
      event_tx,
      state: state.clone(),
      cancel: cancel.clone(),
    };
    tokio::spawn(supervisor.run());

    Ok(MpdClient {
      command_tx,
      events,
      state,
      cancel,
    })
  }

  /// Event stream receiver. Clones share one queue: each event is
  /// delivered to a single receiver, so use one subscriber per client
  /// unless fan-out by competition is what you want.
  pub fn events(&self) -> async_channel::Receiver<MpdEvent> {
    self.events.clone()
  }

  /// Stop the supervisor and tear the connection down. Commands still in
  /// the queue are discarded; their callers see `Disconnected`.
  pub fn disconnect(&self) {
    log::info!("mpd client disconnect requested");
    self.cancel.cancel();
  }

  /// Whether a connection is currently established and ready.
  pub fn is_connected(&self) -> bool {
    self.state.read().connected
  }

  /// Alias of [`MpdClient::is_connected`].
  pub fn alive(&self) -> bool {
    self.is_connected()
  }

  /// Last reported status, typed per key.
  pub fn status(&self) -> HashMap<String, StatusValue> {
    self.state.read().status.clone()
  }

  /// Current queue, indexed by server-reported position.
  pub fn playlist(&self) -> Vec<Option<Song>> {
    self.state.read().playlist.clone()
  }

  /// Full song catalog from the server database.
  pub fn songs(&self) -> Vec<Song> {
    self.state.read().songs.clone()
  }

  /// Server identity from the greeting, if connected at least once.
  pub fn server_info(&self) -> Option<ServerInfo> {
    self.state.read().server.clone()
  }

  /// Send a command and return its raw response payload (everything up to
  /// and including the terminator line).
  pub async fn send_command(&self, command: &str, args: &[&str]) -> Result<String, MpdError> {
    self.submit(build_command_line(command, args)).await
  }

  /// Send a command and require a bare `OK` response.
  pub async fn command(&self, command: &str, args: &[&str]) -> Result<(), MpdError> {
    let line = build_command_line(command, args);
    let response = self.submit(line.clone()).await?;
    check_response_status(&response, &line)
  }

  generic_commands! {
    play => "play",
    stop => "stop",
    pause => "pause",
    next => "next",
    previous => "previous",
    toggle => "toggle",
    clear => "clear",
  }

  /// Add a song to the queue by URI.
  pub async fn add(&self, uri: &str) -> Result<(), MpdError> {
    self.command("add", &[uri]).await
  }

  /// Start playback of the song at the given queue position.
  pub async fn play_id(&self, id: u32) -> Result<(), MpdError> {
    self.command("play", &[&id.to_string()]).await
  }

  /// Remove the song at the given queue position.
  pub async fn delete_id(&self, id: u32) -> Result<(), MpdError> {
    self.command("delete", &[&id.to_string()]).await
  }

  /// Set the output volume (0-100).
  pub async fn set_volume(&self, volume: u8) -> Result<(), MpdError> {
    self.command("setvol", &[&volume.to_string()]).await
  }

  /// Enable or disable repeat mode.
  pub async fn repeat(&self, enabled: bool) -> Result<(), MpdError> {
    self.command("repeat", &[if enabled { "1" } else { "0" }]).await
  }

  /// Set the crossfade duration in seconds.
  pub async fn crossfade(&self, seconds: u32) -> Result<(), MpdError> {
    self.command("crossfade", &[&seconds.to_string()]).await
  }

  /// Seek within the song at the given queue position.
  pub async fn seek(&self, song_id: u32, time: u32) -> Result<(), MpdError> {
    self
      .command("seek", &[&song_id.to_string(), &time.to_string()])
      .await
  }

  /// Search the database and add matches to the queue. Pairs are
  /// alternating filter tag and value, e.g. `[("artist", "Tool")]`.
  pub async fn search_add(&self, filter: &[(&str, &str)]) -> Result<(), MpdError> {
    let mut args = Vec::with_capacity(filter.len() * 2);
    for (tag, value) in filter {
      args.push(*tag);
      args.push(*value);
    }
    self.command("searchadd", &args).await
  }

  /// Trigger a database update. The server confirms with an
  /// `updating_db` line before the terminator; only the terminator is
  /// validated here.
  pub async fn update_songs(&self) -> Result<(), MpdError> {
    let line = build_command_line("update", &[]);
    let response = self.submit(line.clone()).await?;
    let status = response.lines().nth(1).unwrap_or_default();
    check_response_status(status, &line)
  }

  async fn submit(&self, line: String) -> Result<String, MpdError> {
    if !self.is_connected() {
      return Err(MpdError::Disconnected);
    }
    let (reply, rx) = oneshot::channel();
    self
      .command_tx
      .send(Request { line, reply })
      .await
      .map_err(|_| MpdError::Disconnected)?;
    // A dropped reply sender means the queue was flushed on disconnect.
    rx.await.map_err(|_| MpdError::Disconnected)?
  }
}

/// Build a protocol command line with each argument wrapped in quotes.
fn build_command_line(command: &str, args: &[&str]) -> String {
  let mut line = String::from(command);
  for arg in args {
    line.push_str(" \"");
    line.push_str(arg);
    line.push('"');
  }
  line
}

/// What woke the session loop out of idle mode.
enum Wake {
  Shutdown,
  Command(Option<Request>),
  Frame(Option<String>),
}

/// Owns the connection lifecycle: runs one session at a time and retries
/// on a fixed interval after any connection-scoped failure.
struct Supervisor {
  config: MpdConfig,
  command_rx: mpsc::Receiver<Request>,
  event_tx: async_channel::Sender<MpdEvent>,
  state: Arc<RwLock<SharedState>>,
  cancel: CancellationToken,
}

impl Supervisor {
  async fn run(mut self) {
    let retry = Duration::from_millis(self.config.reconnect_interval_ms);
    loop {
      let end = self.run_session().await;
      self.state.write().connected = false;
      match end {
        Ok(()) => break,
        Err(e) => {
          log::warn!("mpd session ended: {e}");
          // A clean server-side close is not an error, just a disconnect.
          if !matches!(e, MpdError::Disconnected) {
            let _ = self.event_tx.send(MpdEvent::Error(e)).await;
          }
        }
      }
      let _ = self.event_tx.send(MpdEvent::Disconnected).await;
      self.flush_pending();
      tokio::select! {
        _ = self.cancel.cancelled() => break,
        _ = tokio::time::sleep(retry) => {}
      }
    }
    self.flush_pending();
    log::info!("mpd supervisor stopped");
  }

  /// Discard queued requests; their reply channels close, so waiting
  /// callers resolve with `Disconnected`.
  fn flush_pending(&mut self) {
    while self.command_rx.try_recv().is_ok() {}
  }

  /// One full connection lifetime. `Ok` means a deliberate stop (cancel
  /// token or every client handle dropped); `Err` triggers a retry.
  async fn run_session(&mut self) -> Result<(), MpdError> {
    let mut conn = tokio::select! {
      _ = self.cancel.cancelled() => return Ok(()),
      conn = Connection::open(&self.config) => conn?,
    };
    self.state.write().server = Some(conn.server.clone());

    self.refresh_status(&mut conn).await?;
    self.refresh_songs(&mut conn).await?;
    self.refresh_playlist(&mut conn).await?;

    let status = {
      let mut state = self.state.write();
      state.connected = true;
      state.status.clone()
    };
    let server = conn.server.clone();
    log::info!("mpd ready: {} {}", server.name, server.version);
    let _ = self.event_tx.send(MpdEvent::Ready { status, server }).await;

    loop {
      // Drain queued commands before parking the connection in idle mode.
      while let Ok(request) = self.command_rx.try_recv() {
        self.dispatch(&mut conn, request).await?;
      }
      conn.write_line(CMD_IDLE).await?;

      let wake = tokio::select! {
        _ = self.cancel.cancelled() => Wake::Shutdown,
        request = self.command_rx.recv() => Wake::Command(request),
        frame = conn.frames.recv() => Wake::Frame(frame),
      };
      match wake {
        Wake::Shutdown | Wake::Command(None) => return Ok(()),
        Wake::Command(Some(request)) => {
          // Leave idle: the real command must not be written until the
          // server's idle-cancel acknowledgment has been consumed, or the
          // response framing would attribute it to the wrong request.
          conn.write_line(CMD_NOIDLE).await?;
          let _ack = conn.next_frame().await?;
          self.dispatch(&mut conn, request).await?;
        }
        Wake::Frame(None) => return Err(MpdError::Disconnected),
        Wake::Frame(Some(message)) => {
          if let Err(e) = self.on_idle_message(&mut conn, &message).await {
            if e.is_connection_fatal() {
              return Err(e);
            }
            log::error!("idle refresh failed: {e}");
            let _ = self.event_tx.send(MpdEvent::Error(e)).await;
          }
        }
      }
    }
  }

  /// Write one queued command and resolve its caller with the response.
  async fn dispatch(&mut self, conn: &mut Connection, request: Request) -> Result<(), MpdError> {
    log::debug!("dispatching: {}", request.line);
    if let Err(e) = conn.write_line(&request.line).await {
      let _ = request.reply.send(Err(MpdError::Disconnected));
      return Err(e);
    }
    match conn.next_frame().await {
      Ok(response) => {
        // The caller may have gone away; the response is still consumed
        // here so the stream stays aligned.
        let _ = request.reply.send(Ok(response));
        Ok(())
      }
      Err(e) => {
        let _ = request.reply.send(Err(MpdError::Disconnected));
        Err(e)
      }
    }
  }

  /// React to one complete message received while idle.
  async fn on_idle_message(
    &mut self,
    conn: &mut Connection,
    message: &str,
  ) -> Result<(), MpdError> {
    // A bare OK is the server acknowledging idle with nothing changed.
    if message.trim_start().starts_with("OK") {
      return Ok(());
    }
    let updates = parse_changed(message);
    if updates.is_empty() {
      return Err(MpdError::UnknownIdleMessage(message.to_string()));
    }
    for update in updates {
      let refreshed = match update.as_str() {
        "mixer" | "player" | "options" => {
          self.refresh_status(conn).await?;
          true
        }
        "playlist" => {
          self.refresh_playlist(conn).await?;
          true
        }
        "database" => {
          self.refresh_songs(conn).await?;
          true
        }
        _ => {
          log::debug!("ignoring idle update for subsystem '{update}'");
          false
        }
      };
      if refreshed {
        let _ = self.event_tx.send(MpdEvent::Update(update.clone())).await;
        let _ = self.event_tx.send(MpdEvent::Status(update)).await;
      }
    }
    Ok(())
  }

  /// Write an internal command and await its response frame. Only called
  /// from positions where no request is in flight.
  async fn exec(&mut self, conn: &mut Connection, line: &str) -> Result<String, MpdError> {
    conn.write_line(line).await?;
    conn.next_frame().await
  }

  async fn refresh_status(&mut self, conn: &mut Connection) -> Result<(), MpdError> {
    let response = self.exec(conn, CMD_STATUS).await?;
    let mut parsed = Vec::new();
    for line in response.lines() {
      if line.trim() == "OK" {
        continue;
      }
      let kvp = parse_kvp(line).ok_or_else(|| MpdError::KvpParse(line.to_string()))?;
      let value = parse_status_value(&kvp);
      parsed.push((kvp.key, value));
    }
    // Merge per key only after the whole response parsed cleanly.
    let mut state = self.state.write();
    for (key, value) in parsed {
      state.status.insert(key, value);
    }
    Ok(())
  }

  async fn refresh_songs(&mut self, conn: &mut Connection) -> Result<(), MpdError> {
    let response = self.exec(conn, CMD_LIST_ALL_INFO).await?;
    let songs = parse_song_list(&response, CMD_LIST_ALL_INFO)?;
    log::debug!("song catalog refreshed: {} songs", songs.len());
    self.state.write().songs = songs;
    Ok(())
  }

  async fn refresh_playlist(&mut self, conn: &mut Connection) -> Result<(), MpdError> {
    let response = self.exec(conn, CMD_PLAYLIST_INFO).await?;
    let playlist = parse_playlist(&response, CMD_PLAYLIST_INFO)?;
    log::debug!("playlist refreshed: {} positions", playlist.len());
    self.state.write().playlist = playlist;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_build_command_line_quotes_arguments() {
    assert_eq!(build_command_line("play", &[]), "play");
    assert_eq!(build_command_line("setvol", &["50"]), "setvol \"50\"");
    assert_eq!(
      build_command_line("seek", &["2", "120"]),
      "seek \"2\" \"120\""
    );
  }

  #[test]
  fn test_connect_rejects_invalid_config() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();
    let config = MpdConfig {
      host: String::new(),
      ..Default::default()
    };
    assert!(MpdClient::connect(config).is_err());
  }
}
