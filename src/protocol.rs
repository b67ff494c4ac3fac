//! MPD line protocol parsing.
//!
//! Pure, stateless helpers shared by the connection framing layer and the
//! state refreshers. The protocol is newline-terminated text: a greeting on
//! connect, then per command zero or more `KEY: VALUE` lines closed by a
//! terminal `OK` line, or a single `ACK [..@..] {..} ..` error line.
//!
//! Reference: https://mpd.readthedocs.io/en/latest/protocol.html

use crate::error::MpdError;

/// One `KEY: VALUE` line from a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kvp {
  pub key: String,
  pub val: String,
}

/// Server identity from the connect greeting (`OK MPD 0.20.2`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
  pub name: String,
  pub version: String,
}

/// Parse a single `NAME: VALUE` line. The name must not contain embedded
/// whitespace; the value is the remainder, trimmed. Returns `None` when the
/// line does not match.
pub fn parse_kvp(line: &str) -> Option<Kvp> {
  let (key, val) = line.split_once(':')?;
  let key = key.trim();
  let val = val.trim();
  if key.is_empty() || val.is_empty() || key.contains(char::is_whitespace) {
    return None;
  }
  Some(Kvp {
    key: key.to_string(),
    val: val.to_string(),
  })
}

/// Parse the greeting line sent right after the socket is accepted.
pub fn parse_greeting(line: &str) -> Option<ServerInfo> {
  let rest = line.trim().strip_prefix("OK ")?;
  let (name, version) = rest.rsplit_once(char::is_whitespace)?;
  let name = name.trim();
  if name.is_empty() || version.is_empty() {
    return None;
  }
  Some(ServerInfo {
    name: name.to_string(),
    version: version.to_string(),
  })
}

/// Whether a line is the protocol error terminator:
/// `ACK [<code>@<index>] {<command>} <message>`.
fn is_ack_line(line: &str) -> bool {
  let Some(rest) = line.trim_start().strip_prefix("ACK") else {
    return false;
  };
  let rest = rest.trim_start();
  let Some(rest) = rest.strip_prefix('[') else {
    return false;
  };
  let Some((code, rest)) = rest.split_once('@') else {
    return false;
  };
  if !code.chars().all(|c| c.is_ascii_digit()) {
    return false;
  }
  let Some((index, rest)) = rest.split_once(']') else {
    return false;
  };
  if !index.chars().all(|c| c.is_ascii_digit()) {
    return false;
  }
  let rest = rest.trim_start();
  match rest.strip_prefix('{') {
    Some(rest) => rest.contains('}'),
    None => false,
  }
}

fn is_ok_line(line: &str) -> bool {
  line.trim() == "OK"
}

/// Offset just past the first line the matcher accepts, or `None`.
fn scan_lines(buffer: &str, matches: fn(&str) -> bool) -> Option<usize> {
  let mut offset = 0;
  for line in buffer.split_inclusive('\n') {
    offset += line.len();
    if matches(line.trim_end_matches('\n')) {
      return Some(offset);
    }
  }
  None
}

/// Scan a receive buffer for the end of one complete response.
///
/// Two terminal patterns are tried in order: a line consisting of `OK`
/// (success), then an `ACK` error line. Returns the byte offset just past
/// the first terminator found, or `None` when the buffer does not yet hold
/// a full response and the caller must keep reading.
pub fn find_return(buffer: &str) -> Option<usize> {
  scan_lines(buffer, is_ok_line).or_else(|| scan_lines(buffer, is_ack_line))
}

/// Extract the changed subsystem names from an idle notification, in the
/// order the server reported them. Lines not starting with `changed:` are
/// ignored.
pub fn parse_changed(message: &str) -> Vec<String> {
  message
    .lines()
    .filter_map(|line| line.strip_prefix("changed:"))
    .map(|rest| rest.trim().to_string())
    .collect()
}

/// Validate a command's terminal status line. Anything but a bare `OK`
/// fails, naming both the offending line and the command that produced it.
pub fn check_response_status(line: &str, command: &str) -> Result<(), MpdError> {
  if line.trim() == "OK" {
    Ok(())
  } else {
    Err(MpdError::CommandFailed {
      status: line.to_string(),
      command: command.to_string(),
    })
  }
}

/// A typed value from the `status` response.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusValue {
  Bool(bool),
  Int(i64),
  Fraction(f64),
  /// The `time` key: elapsed and total seconds, kept as reported.
  Time { elapsed: String, length: String },
  Text(String),
}

/// Leading decimal digits of a value, ignoring a trailing `%` and anything
/// else after the number.
fn leading_int(val: &str) -> Option<i64> {
  let digits: String = val
    .trim()
    .chars()
    .take_while(|c| c.is_ascii_digit())
    .collect();
  digits.parse().ok()
}

/// Coerce a raw `status` KVP into its typed form. Keys with no coercion
/// rule (including `error`) pass through as text, as do values that fail
/// to parse as the expected type.
pub fn parse_status_value(kvp: &Kvp) -> StatusValue {
  match kvp.key.as_str() {
    "repeat" | "single" | "random" | "consume" => StatusValue::Bool(kvp.val.trim() == "1"),
    "song" | "xfade" | "bitrate" | "playlist" | "playlistlength" => match leading_int(&kvp.val) {
      Some(n) => StatusValue::Int(n),
      None => StatusValue::Text(kvp.val.clone()),
    },
    "volume" => match leading_int(&kvp.val) {
      Some(n) => StatusValue::Fraction(n as f64 / 100.0),
      None => StatusValue::Text(kvp.val.clone()),
    },
    "time" => match kvp.val.split_once(':') {
      Some((elapsed, length)) => StatusValue::Time {
        elapsed: elapsed.trim().to_string(),
        length: length.trim().to_string(),
      },
      None => StatusValue::Text(kvp.val.clone()),
    },
    _ => StatusValue::Text(kvp.val.clone()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_kvp() {
    let kvp = parse_kvp("vol: 42").unwrap();
    assert_eq!(kvp.key, "vol");
    assert_eq!(kvp.val, "42");
  }

  #[test]
  fn test_parse_kvp_value_keeps_whitespace() {
    let kvp = parse_kvp("Artist: Various Artists").unwrap();
    assert_eq!(kvp.val, "Various Artists");
    let kvp = parse_kvp("Title: Lazy fox jumps.").unwrap();
    assert_eq!(kvp.val, "Lazy fox jumps.");
  }

  #[test]
  fn test_parse_kvp_rejects_non_matching() {
    assert!(parse_kvp("").is_none());
    assert!(parse_kvp("no kvp").is_none());
    assert!(parse_kvp("key:").is_none());
    assert!(parse_kvp("two words: value").is_none());
  }

  #[test]
  fn test_parse_greeting() {
    let server = parse_greeting("OK MPD 0.20.2").unwrap();
    assert_eq!(server.name, "MPD");
    assert_eq!(server.version, "0.20.2");
  }

  #[test]
  fn test_parse_greeting_rejects_non_matching() {
    assert!(parse_greeting("").is_none());
    assert!(parse_greeting("Failed greetings").is_none());
    assert!(parse_greeting("OK").is_none());
  }

  #[test]
  fn test_find_return_ok() {
    let message = "foo: bar\nOK";
    assert_eq!(find_return(message), Some(message.len()));
    let message = "volume: 80\nOK\ntrailing";
    assert_eq!(find_return(message), Some("volume: 80\nOK\n".len()));
  }

  #[test]
  fn test_find_return_ack() {
    let message = "ACK [5@5] {current_command} message_text";
    assert_eq!(find_return(message), Some(message.len()));
  }

  #[test]
  fn test_find_return_incomplete() {
    assert_eq!(find_return("Some test message"), None);
    assert_eq!(find_return("volume: 80\n"), None);
    assert_eq!(find_return(""), None);
  }

  #[test]
  fn test_find_return_does_not_match_payload_lines() {
    assert_eq!(find_return("OK MPD 0.20.2\n"), None);
    assert_eq!(find_return("Album: HOOK\n"), None);
  }

  #[test]
  fn test_parse_changed() {
    let message = "changed:playlist\nchanged:mixer";
    assert_eq!(parse_changed(message), vec!["playlist", "mixer"]);
  }

  #[test]
  fn test_parse_changed_trims_and_ignores_other_lines() {
    let message = "changed: player\nOK\n";
    assert_eq!(parse_changed(message), vec!["player"]);
    assert!(parse_changed("").is_empty());
    assert!(parse_changed("OK").is_empty());
  }

  #[test]
  fn test_check_response_status() {
    assert!(check_response_status("OK", "status").is_ok());
    assert!(check_response_status("OK\n", "status").is_ok());
    let err = check_response_status("ACK [50@0] {play} error", "play").unwrap_err();
    let text = err.to_string();
    assert!(text.contains("ACK [50@0] {play} error"));
    assert!(text.contains("play"));
  }

  #[test]
  fn test_status_value_booleans() {
    let kvp = parse_kvp("repeat: 1").unwrap();
    assert_eq!(parse_status_value(&kvp), StatusValue::Bool(true));
    let kvp = parse_kvp("random: 0").unwrap();
    assert_eq!(parse_status_value(&kvp), StatusValue::Bool(false));
  }

  #[test]
  fn test_status_value_integers() {
    let kvp = parse_kvp("playlistlength: 24").unwrap();
    assert_eq!(parse_status_value(&kvp), StatusValue::Int(24));
    let kvp = parse_kvp("bitrate: junk").unwrap();
    assert_eq!(
      parse_status_value(&kvp),
      StatusValue::Text("junk".to_string())
    );
  }

  #[test]
  fn test_status_value_volume_fraction() {
    let kvp = parse_kvp("volume: 50%").unwrap();
    assert_eq!(parse_status_value(&kvp), StatusValue::Fraction(0.5));
    let kvp = parse_kvp("volume: 80").unwrap();
    assert_eq!(parse_status_value(&kvp), StatusValue::Fraction(0.8));
  }

  #[test]
  fn test_status_value_time_pair() {
    let kvp = parse_kvp("time: 10:15").unwrap();
    assert_eq!(
      parse_status_value(&kvp),
      StatusValue::Time {
        elapsed: "10".to_string(),
        length: "15".to_string(),
      }
    );
  }

  #[test]
  fn test_status_value_passthrough() {
    let kvp = parse_kvp("error: problems decoding").unwrap();
    assert_eq!(
      parse_status_value(&kvp),
      StatusValue::Text("problems decoding".to_string())
    );
    let kvp = parse_kvp("state: play").unwrap();
    assert_eq!(parse_status_value(&kvp), StatusValue::Text("play".to_string()));
  }
}
