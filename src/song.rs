//! Song records and multi-song response segmentation.
//!
//! Database and playlist listings come back as one flat response: each
//! entry is a block of `KEY: VALUE` lines opened by a `file:` line. The
//! segmenters here split the line stream into blocks; framing (finding the
//! end of the whole response) stays in the connection layer.

use crate::error::MpdError;
use crate::protocol::{check_response_status, parse_kvp};

const FILE_LINE_START: &str = "file:";
const POS_LINE_START: &str = "Pos";
const RES_OK: &str = "OK";

/// One song from the database or the queue. Fields the server did not
/// report stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Song {
  pub file: Option<String>,
  pub time: Option<String>,
  pub date: Option<String>,
  pub genre: Option<String>,
  pub title: Option<String>,
  pub album: Option<String>,
  pub track: Option<String>,
  pub artist: Option<String>,
  pub last_modified: Option<String>,
}

impl Song {
  /// Build a song from one block of response lines. Unknown keys are
  /// ignored; a line that fails KVP parsing fails the whole block.
  pub fn from_lines(lines: &[&str]) -> Result<Song, MpdError> {
    let mut song = Song::default();
    for line in lines.iter().copied() {
      if line.trim() == RES_OK {
        continue;
      }
      let kvp = parse_kvp(line).ok_or_else(|| MpdError::KvpParse(line.to_string()))?;
      let field = match kvp.key.as_str() {
        "file" => &mut song.file,
        "Time" => &mut song.time,
        "Date" => &mut song.date,
        "Genre" => &mut song.genre,
        "Title" => &mut song.title,
        "Album" => &mut song.album,
        "Track" => &mut song.track,
        "Artist" => &mut song.artist,
        "Last-Modified" => &mut song.last_modified,
        _ => continue,
      };
      *field = Some(kvp.val);
    }
    Ok(song)
  }
}

/// Split a `listallinfo` response into songs, in server order. The final
/// line must be the `OK` terminator.
pub fn parse_song_list(message: &str, command: &str) -> Result<Vec<Song>, MpdError> {
  let lines: Vec<&str> = message.lines().collect();
  let (status, body) = split_status_line(&lines, command)?;
  check_response_status(status, command)?;

  let mut songs = Vec::new();
  let mut block: Vec<&str> = Vec::new();
  for (i, line) in body.iter().copied().enumerate() {
    if i != 0 && line.starts_with(FILE_LINE_START) {
      songs.push(Song::from_lines(&block)?);
      block.clear();
    }
    block.push(line);
  }
  if !block.is_empty() {
    songs.push(Song::from_lines(&block)?);
  }
  Ok(songs)
}

/// Split a `playlistinfo` response into songs assigned by their reported
/// `Pos` value rather than by append order. Positions the server never
/// reported stay `None`.
pub fn parse_playlist(message: &str, command: &str) -> Result<Vec<Option<Song>>, MpdError> {
  let lines: Vec<&str> = message.lines().collect();
  let (status, body) = split_status_line(&lines, command)?;
  check_response_status(status, command)?;

  let mut playlist: Vec<Option<Song>> = Vec::new();
  let mut block: Vec<&str> = Vec::new();
  let mut pos: Option<usize> = None;
  for (i, line) in body.iter().copied().enumerate() {
    if i != 0 && line.starts_with(FILE_LINE_START) {
      assign_at(&mut playlist, pos.take(), Song::from_lines(&block)?);
      block.clear();
    }
    if line.starts_with(POS_LINE_START) {
      pos = line.split(':').nth(1).and_then(|v| v.trim().parse().ok());
    } else {
      block.push(line);
    }
  }
  if !block.is_empty() {
    assign_at(&mut playlist, pos, Song::from_lines(&block)?);
  }
  Ok(playlist)
}

fn assign_at(playlist: &mut Vec<Option<Song>>, pos: Option<usize>, song: Song) {
  let Some(pos) = pos else { return };
  if pos >= playlist.len() {
    playlist.resize(pos + 1, None);
  }
  playlist[pos] = Some(song);
}

fn split_status_line<'a>(
  lines: &'a [&'a str],
  command: &str,
) -> Result<(&'a str, &'a [&'a str]), MpdError> {
  match lines.split_last() {
    Some((status, body)) => Ok((*status, body)),
    None => Err(MpdError::CommandFailed {
      status: String::new(),
      command: command.to_string(),
    }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_song_from_lines() {
    let lines = [
      "OK",
      "Time: 60",
      "Date: date",
      "file: song.mp3",
      "Title: song title",
      "Track: song track",
      "Genre: song genre",
      "Artist: song artist",
      "Last-Modified: lastModified",
    ];
    let song = Song::from_lines(&lines).unwrap();
    assert_eq!(song.file.as_deref(), Some("song.mp3"));
    assert_eq!(song.time.as_deref(), Some("60"));
    assert_eq!(song.title.as_deref(), Some("song title"));
    assert_eq!(song.artist.as_deref(), Some("song artist"));
    assert_eq!(song.last_modified.as_deref(), Some("lastModified"));
  }

  #[test]
  fn test_song_from_lines_rejects_bad_kvp() {
    assert!(Song::from_lines(&["OK", "QWERTY", ""]).is_err());
  }

  #[test]
  fn test_song_from_lines_ignores_unknown_keys() {
    let song = Song::from_lines(&["file: a.mp3", "Composer: someone"]).unwrap();
    assert_eq!(song.file.as_deref(), Some("a.mp3"));
  }

  #[test]
  fn test_parse_song_list() {
    let message = "file: a.mp3\nTitle: first\nfile: b.mp3\nTitle: second\nOK";
    let songs = parse_song_list(message, "listallinfo").unwrap();
    assert_eq!(songs.len(), 2);
    assert_eq!(songs[0].file.as_deref(), Some("a.mp3"));
    assert_eq!(songs[1].title.as_deref(), Some("second"));
  }

  #[test]
  fn test_parse_song_list_empty_database() {
    let songs = parse_song_list("OK", "listallinfo").unwrap();
    assert!(songs.is_empty());
  }

  #[test]
  fn test_parse_song_list_rejects_error_terminator() {
    let message = "file: a.mp3\nACK [50@0] {listallinfo} failed";
    assert!(parse_song_list(message, "listallinfo").is_err());
  }

  #[test]
  fn test_parse_playlist_assigns_by_position() {
    let message = "file: a.mp3\nTitle: first\nPos: 1\nfile: b.mp3\nTitle: second\nPos: 0\nOK";
    let playlist = parse_playlist(message, "playlistinfo").unwrap();
    assert_eq!(playlist.len(), 2);
    assert_eq!(
      playlist[0].as_ref().unwrap().title.as_deref(),
      Some("second")
    );
    assert_eq!(playlist[1].as_ref().unwrap().title.as_deref(), Some("first"));
  }

  #[test]
  fn test_parse_playlist_sparse_positions() {
    let message = "file: a.mp3\nPos: 2\nOK";
    let playlist = parse_playlist(message, "playlistinfo").unwrap();
    assert_eq!(playlist.len(), 3);
    assert!(playlist[0].is_none());
    assert!(playlist[1].is_none());
    assert_eq!(playlist[2].as_ref().unwrap().file.as_deref(), Some("a.mp3"));
  }

  #[test]
  fn test_parse_playlist_drops_block_without_position() {
    let message = "file: a.mp3\nTitle: no pos\nOK";
    let playlist = parse_playlist(message, "playlistinfo").unwrap();
    assert!(playlist.is_empty());
  }
}
