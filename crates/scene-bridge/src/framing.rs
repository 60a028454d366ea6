//! Wire framing for bridge messages.
//!
//! Each message is an ASCII decimal byte length, a `:` delimiter, then a
//! UTF-8 JSON payload of exactly that many bytes:
//!
//! ```text
//! [ASCII digits: len]:[UTF-8 JSON bytes of len]
//! ```
//!
//! The length counts bytes, not characters. Frames are self-delimiting, so
//! consecutive messages need no separator between them. Any framing
//! violation poisons the connection it occurred on; there is no resync.

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::config::WireConfig;
use crate::error::{BridgeError, Result};

/// Read one framed message from an async reader.
///
/// Returns `None` on clean EOF (peer closed between messages). EOF anywhere
/// inside a frame is an error, as is a header that is not a bounded run of
/// digits or a payload that does not parse as JSON.
pub async fn read_message<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Value>> {
    let mut header = String::with_capacity(WireConfig::MAX_LENGTH_DIGITS);
    let mut started = false;

    loop {
        let byte = match reader.read_u8().await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                if started {
                    return Err(BridgeError::framing("stream closed inside length header"));
                }
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        started = true;

        match byte {
            b':' => break,
            b'0'..=b'9' => {
                if header.len() == WireConfig::MAX_LENGTH_DIGITS {
                    return Err(BridgeError::framing(format!(
                        "length header exceeds {} digits",
                        WireConfig::MAX_LENGTH_DIGITS
                    )));
                }
                header.push(byte as char);
            }
            other => {
                return Err(BridgeError::framing(format!(
                    "invalid byte 0x{other:02x} in length header"
                )));
            }
        }
    }

    if header.is_empty() {
        return Err(BridgeError::framing("empty length header"));
    }

    // At most MAX_LENGTH_DIGITS digits, so this always fits in a u64.
    let declared: u64 = header
        .parse()
        .map_err(|_| BridgeError::framing(format!("unparseable length header {header:?}")))?;
    if declared > WireConfig::MAX_PAYLOAD_BYTES as u64 {
        return Err(BridgeError::framing(format!(
            "message length {} exceeds maximum {}",
            declared,
            WireConfig::MAX_PAYLOAD_BYTES
        )));
    }
    let len = declared as usize;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            BridgeError::framing(format!("stream closed before {len}-byte payload completed"))
        } else {
            BridgeError::from(e)
        }
    })?;

    match serde_json::from_slice(&payload) {
        Ok(value) => Ok(Some(value)),
        Err(e) => Err(BridgeError::framing(format!("payload is not valid JSON: {e}"))),
    }
}

/// Write one framed message to an async writer.
pub async fn write_message<W: AsyncWriteExt + Unpin>(writer: &mut W, message: &Value) -> Result<()> {
    let payload = serde_json::to_vec(message)?;
    if payload.len() > WireConfig::MAX_PAYLOAD_BYTES {
        return Err(BridgeError::framing(format!(
            "message length {} exceeds maximum {}",
            payload.len(),
            WireConfig::MAX_PAYLOAD_BYTES
        )));
    }

    writer
        .write_all(format!("{}:", payload.len()).as_bytes())
        .await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    async fn encode(message: &Value) -> Vec<u8> {
        let mut buf = Vec::new();
        write_message(&mut buf, message).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_message_roundtrip() {
        let message = json!({"action": "call_tool", "tool": "create_object", "arguments": {}});
        let buf = encode(&message).await;

        let mut cursor = Cursor::new(buf);
        let read_back = read_message(&mut cursor).await.unwrap();

        assert_eq!(read_back, Some(message));
    }

    #[tokio::test]
    async fn test_wire_bytes_are_length_colon_payload() {
        let buf = encode(&json!({"a": 1})).await;
        assert_eq!(buf, b"7:{\"a\":1}");
    }

    #[tokio::test]
    async fn test_length_counts_bytes_not_chars() {
        // "Tü" is two chars but three bytes; the header must say three.
        let buf = encode(&json!("Tü")).await;
        assert_eq!(buf, "5:\"Tü\"".as_bytes());

        let mut cursor = Cursor::new(buf);
        let read_back = read_message(&mut cursor).await.unwrap();
        assert_eq!(read_back, Some(json!("Tü")));
    }

    #[tokio::test]
    async fn test_read_empty_stream_returns_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let result = read_message(&mut cursor).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_read_eof_inside_header_is_error() {
        let mut cursor = Cursor::new(b"12".to_vec());
        assert!(read_message(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn test_read_non_digit_header_is_error() {
        let mut cursor = Cursor::new(b"xx:{}".to_vec());
        assert!(read_message(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn test_read_negative_length_is_error() {
        let mut cursor = Cursor::new(b"-5:{}".to_vec());
        assert!(read_message(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn test_read_empty_header_is_error() {
        let mut cursor = Cursor::new(b":{}".to_vec());
        assert!(read_message(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn test_read_header_digit_overflow_is_error() {
        // Eleven digits, one more than the header budget allows.
        let mut cursor = Cursor::new(b"99999999999:".to_vec());
        assert!(read_message(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn test_read_oversized_length_is_error() {
        let mut buf = format!("{}:", WireConfig::MAX_PAYLOAD_BYTES + 1).into_bytes();
        buf.extend_from_slice(&[b'x'; 8]); // some bytes but not enough
        let mut cursor = Cursor::new(buf);
        assert!(read_message(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn test_read_truncated_anywhere_is_error() {
        let buf = encode(&json!({"name": "cube"})).await;

        // Cutting at zero is a clean EOF; every other prefix is a violation.
        for cut in 1..buf.len() {
            let mut cursor = Cursor::new(buf[..cut].to_vec());
            let result = read_message(&mut cursor).await;
            assert!(result.is_err(), "prefix of {cut} bytes should not parse");
        }

        let mut cursor = Cursor::new(buf);
        assert!(read_message(&mut cursor).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_read_rejects_invalid_json_payload() {
        let mut cursor = Cursor::new(b"5:hello".to_vec());
        assert!(read_message(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn test_read_rejects_zero_length_payload() {
        // Zero bytes is never valid JSON.
        let mut cursor = Cursor::new(b"0:".to_vec());
        assert!(read_message(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn test_two_messages_back_to_back() {
        let first = json!({"seq": 1});
        let second = json!({"seq": 2});
        let mut buf = encode(&first).await;
        buf.extend(encode(&second).await);

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_message(&mut cursor).await.unwrap(), Some(first));
        assert_eq!(read_message(&mut cursor).await.unwrap(), Some(second));
        assert_eq!(read_message(&mut cursor).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_rejects_oversized_payload() {
        let body = "a".repeat(WireConfig::MAX_PAYLOAD_BYTES);
        let mut buf = Vec::new();
        let result = write_message(&mut buf, &json!(body)).await;
        assert!(result.is_err());
        assert!(buf.is_empty(), "nothing may reach the wire on rejection");
    }
}
