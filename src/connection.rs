//! Transport connection to the MPD server.
//!
//! Owns the socket (TCP or Unix domain), performs the greeting handshake
//! and splits the inbound byte stream into complete response frames. A
//! spawned reader task buffers lines until `protocol::find_return` sees a
//! terminator, then hands the whole response over a channel; the frame
//! channel closing is how connection loss surfaces to the session loop.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{ConnectionKind, MpdConfig};
use crate::error::MpdError;
use crate::protocol::{find_return, parse_greeting, ServerInfo};

const FRAME_CHANNEL_CAPACITY: usize = 16;

/// One established connection. Dropped on any connection-scoped failure;
/// the supervisor opens a fresh one.
pub(crate) struct Connection {
  writer: Box<dyn AsyncWrite + Send + Unpin>,
  /// Complete response frames, trimmed, in arrival order.
  pub(crate) frames: mpsc::Receiver<String>,
  pub(crate) server: ServerInfo,
  reader_handle: JoinHandle<()>,
}

impl Connection {
  /// Connect per the configuration and consume the greeting line.
  pub(crate) async fn open(config: &MpdConfig) -> Result<Connection, MpdError> {
    match config.kind {
      ConnectionKind::Network => {
        let addr = format!("{}:{}", config.host, config.port);
        let resolved = tokio::net::lookup_host(&addr)
          .await?
          .next()
          .ok_or_else(|| MpdError::ConnectionFailed(format!("cannot resolve {addr}")))?;
        let socket = match resolved {
          std::net::SocketAddr::V4(_) => tokio::net::TcpSocket::new_v4()?,
          std::net::SocketAddr::V6(_) => tokio::net::TcpSocket::new_v6()?,
        };
        if config.keep_alive {
          socket.set_keepalive(true)?;
        }
        let stream = socket.connect(resolved).await?;
        log::debug!("connected to mpd at {resolved}");
        Self::setup(stream).await
      }
      #[cfg(unix)]
      ConnectionKind::Ipc => {
        let stream = tokio::net::UnixStream::connect(&config.ipc).await?;
        log::debug!("connected to mpd at {}", config.ipc);
        Self::setup(stream).await
      }
      #[cfg(not(unix))]
      ConnectionKind::Ipc => Err(MpdError::ConnectionFailed(
        "ipc connections require a Unix platform".to_string(),
      )),
    }
  }

  async fn setup<S>(stream: S) -> Result<Connection, MpdError>
  where
    S: AsyncRead + AsyncWrite + Send + 'static,
  {
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let mut greeting = String::new();
    let n = reader.read_line(&mut greeting).await?;
    if n == 0 {
      return Err(MpdError::ConnectionFailed(
        "connection closed before greeting".to_string(),
      ));
    }
    let server =
      parse_greeting(&greeting).ok_or_else(|| MpdError::Greeting(greeting.trim().to_string()))?;
    log::info!("mpd greeting: {} {}", server.name, server.version);

    let (frame_tx, frames) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
    let reader_handle = tokio::spawn(reader_loop(reader, frame_tx));

    Ok(Connection {
      writer: Box::new(write_half),
      frames,
      server,
      reader_handle,
    })
  }

  /// Write one newline-terminated protocol line.
  pub(crate) async fn write_line(&mut self, line: &str) -> Result<(), MpdError> {
    self.writer.write_all(line.as_bytes()).await?;
    self.writer.write_all(b"\n").await?;
    self.writer.flush().await?;
    Ok(())
  }

  /// Next complete response frame; `Disconnected` once the stream ends.
  pub(crate) async fn next_frame(&mut self) -> Result<String, MpdError> {
    self.frames.recv().await.ok_or(MpdError::Disconnected)
  }
}

impl Drop for Connection {
  fn drop(&mut self) {
    self.reader_handle.abort();
  }
}

/// Accumulate inbound lines and emit one message per response terminator.
/// Returns (closing the frame channel) on EOF or read error.
async fn reader_loop<R>(mut reader: BufReader<ReadHalf<R>>, frame_tx: mpsc::Sender<String>)
where
  R: AsyncRead,
{
  let mut buffer = String::new();
  let mut line = String::new();
  // Byte offset of the first line not yet checked for a terminator, so a
  // long response is not rescanned from the start on every read.
  let mut scanned = 0;
  loop {
    while let Some(end) = find_return(&buffer[scanned..]) {
      let end = scanned + end;
      let frame = buffer[..end].trim().to_string();
      buffer.drain(..end);
      scanned = 0;
      if frame_tx.send(frame).await.is_err() {
        return;
      }
    }
    scanned = buffer.rfind('\n').map_or(0, |i| i + 1);
    line.clear();
    match reader.read_line(&mut line).await {
      Ok(0) => {
        log::debug!("mpd closed the connection");
        return;
      }
      Ok(_) => buffer.push_str(&line),
      Err(e) => {
        log::warn!("mpd read error: {e}");
        return;
      }
    }
  }
}
