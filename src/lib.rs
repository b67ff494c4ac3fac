//! Async client for the MPD (Music Player Daemon) line protocol.
//!
//! Maintains one supervised connection over TCP or a Unix domain socket,
//! serializes commands against it, and parks it in MPD's idle mode between
//! commands so server-side changes stream in as events. Playback status,
//! the queue and the song catalog are kept as local snapshots, refreshed
//! whenever the server reports the matching subsystem changed.
//!
//! ```no_run
//! use mpdc::{MpdClient, MpdConfig, MpdEvent};
//!
//! # async fn run() -> Result<(), mpdc::MpdError> {
//! let client = MpdClient::connect(MpdConfig::default())?;
//! let events = client.events();
//! while let Ok(event) = events.recv().await {
//!   if let MpdEvent::Ready { server, .. } = event {
//!     println!("connected to {} {}", server.name, server.version);
//!     client.play().await?;
//!     break;
//!   }
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod connection;
mod error;
pub mod protocol;
mod song;

pub use client::{MpdClient, MpdEvent};
pub use config::{ConnectionKind, MpdConfig};
pub use error::MpdError;
pub use protocol::{Kvp, ServerInfo, StatusValue};
pub use song::Song;
