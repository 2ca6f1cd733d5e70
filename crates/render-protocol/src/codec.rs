//! Newline-delimited JSON framing.

use serde::de::DeserializeOwned;
use serde::Serialize;

use scenesync_common::error::{SyncError, SyncResult};

/// Encode a message as one line, trailing newline included.
pub fn encode_line<T: Serialize>(message: &T) -> SyncResult<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Decode one line. Blank lines decode to `None`.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> SyncResult<Option<T>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| SyncError::protocol(format!("malformed message: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ClientMessage, ServerMessage};

    #[test]
    fn test_encoded_line_is_single_line() {
        let line = encode_line(&ClientMessage::SetCurrentFrame { frame: 2.5 }).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_blank_line_is_skipped() {
        assert!(decode_line::<ServerMessage>("   \n").unwrap().is_none());
    }

    #[test]
    fn test_malformed_line_is_protocol_error() {
        let err = decode_line::<ServerMessage>("{\"type\":\"nope\"}").unwrap_err();
        assert!(matches!(err, SyncError::Protocol { .. }));
    }

    #[test]
    fn test_decode_log() {
        let msg: ServerMessage =
            decode_line(r#"{"type":"log","level":15000,"message":"slow"}"#)
                .unwrap()
                .unwrap();
        assert_eq!(
            msg,
            ServerMessage::Log {
                level: 15000,
                message: "slow".into()
            }
        );
    }
}
