//! Frame encoding and decoding.
//!
//! Wire format of one frame:
//!
//! ```text
//! ┌──────────────┬──────────────┬────────────────┬───────────────────┐
//! │ version: u16 │ kind: u16    │ payload_len:u32│ JSON body         │
//! │ (BE)         │ (BE)         │ (BE)           │ payload_len bytes │
//! └──────────────┴──────────────┴────────────────┴───────────────────┘
//! ```
//!
//! Readers check the version and the length against the configured
//! maximum before allocating the body buffer.

use crate::error::ProxyError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Frame header size in bytes.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Protocol version written into every header.
pub const PROTOCOL_VERSION: u16 = 1;

/// Frame kind discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FrameKind {
    /// Client to server.
    Request = 0x01,
    /// Server answer to one request.
    Reply = 0x02,
    /// Unsolicited server message (heartbeat, event).
    Push = 0x03,
}

impl FrameKind {
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x01 => Some(Self::Request),
            0x02 => Some(Self::Reply),
            0x03 => Some(Self::Push),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u16,
    pub kind: FrameKind,
    pub payload_len: u32,
}

impl FrameHeader {
    #[must_use]
    pub const fn new(kind: FrameKind, payload_len: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            kind,
            payload_len,
        }
    }

    /// Encodes the header to bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.version.to_be_bytes());
        buf[2..4].copy_from_slice(&self.kind.as_u16().to_be_bytes());
        buf[4..8].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }

    /// Decodes a header, rejecting foreign versions and unknown kinds.
    pub fn decode(bytes: &[u8; FRAME_HEADER_SIZE]) -> Result<Self, ProxyError> {
        let version = u16::from_be_bytes([bytes[0], bytes[1]]);
        if version != PROTOCOL_VERSION {
            return Err(ProxyError::UnsupportedVersion(version));
        }
        let raw_kind = u16::from_be_bytes([bytes[2], bytes[3]]);
        let kind = FrameKind::from_u16(raw_kind).ok_or(ProxyError::UnknownFrameKind(raw_kind))?;
        let payload_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Ok(Self {
            version,
            kind,
            payload_len,
        })
    }

    /// Rejects bodies larger than `max` bytes.
    pub fn validate_payload_len(&self, max: u32) -> Result<(), ProxyError> {
        if self.payload_len > max {
            return Err(ProxyError::FrameTooLarge {
                size: self.payload_len as usize,
                max: max as usize,
            });
        }
        Ok(())
    }
}

/// Serializes `body` into a complete frame.
pub fn encode_frame<T: Serialize>(kind: FrameKind, body: &T, max: u32) -> Result<Vec<u8>, ProxyError> {
    let json = serde_json::to_vec(body).map_err(|e| ProxyError::malformed(e.to_string()))?;
    let len = u32::try_from(json.len()).map_err(|_| ProxyError::FrameTooLarge {
        size: json.len(),
        max: max as usize,
    })?;
    let header = FrameHeader::new(kind, len);
    header.validate_payload_len(max)?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + json.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(&json);
    Ok(frame)
}

/// Deserializes a frame body.
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ProxyError> {
    serde_json::from_slice(body).map_err(|e| ProxyError::malformed(e.to_string()))
}

/// Reads one frame from an async stream.
///
/// Returns `Ok(None)` when the peer closed the stream between frames.
pub async fn read_frame<R>(reader: &mut R, max: u32) -> Result<Option<(FrameKind, Vec<u8>)>, ProxyError>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; FRAME_HEADER_SIZE];
    match reader.read_exact(&mut header_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let header = FrameHeader::decode(&header_buf)?;
    header.validate_payload_len(max)?;

    let mut body = vec![0u8; header.payload_len as usize];
    reader.read_exact(&mut body).await?;
    Ok(Some((header.kind, body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn header_layout_is_big_endian() {
        let header = FrameHeader::new(FrameKind::Push, 0x0102_0304);
        assert_eq!(header.encode(), [0, 1, 0, 3, 1, 2, 3, 4]);
        assert_eq!(FrameHeader::decode(&header.encode()).expect("decode"), header);
    }

    #[test]
    fn foreign_version_rejected() {
        let bytes = [0, 9, 0, 1, 0, 0, 0, 0];
        assert!(matches!(
            FrameHeader::decode(&bytes),
            Err(ProxyError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn unknown_kind_rejected() {
        let bytes = [0, 1, 0, 7, 0, 0, 0, 0];
        assert!(matches!(
            FrameHeader::decode(&bytes),
            Err(ProxyError::UnknownFrameKind(7))
        ));
    }

    #[tokio::test]
    async fn oversized_body_rejected_before_read() {
        let frame = encode_frame(FrameKind::Request, &json!({"pad": "x".repeat(100)}), 1024)
            .expect("encode");
        let err = read_frame(&mut frame.as_slice(), 16).await.expect_err("too large");
        assert!(matches!(err, ProxyError::FrameTooLarge { max: 16, .. }));
    }

    #[test]
    fn encode_respects_max() {
        let err = encode_frame(FrameKind::Reply, &json!("x".repeat(64)), 8).expect_err("limit");
        assert!(matches!(err, ProxyError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn reads_back_to_back_frames() {
        let mut bytes = encode_frame(FrameKind::Request, &json!({"n": 1}), 1024).expect("first");
        bytes.extend(encode_frame(FrameKind::Push, &json!({"n": 2}), 1024).expect("second"));
        let mut reader = bytes.as_slice();

        let (kind, body) = read_frame(&mut reader, 1024).await.expect("first").expect("frame");
        assert_eq!(kind, FrameKind::Request);
        assert_eq!(decode_body::<Value>(&body).expect("json"), json!({"n": 1}));

        let (kind, _) = read_frame(&mut reader, 1024).await.expect("second").expect("frame");
        assert_eq!(kind, FrameKind::Push);

        assert!(read_frame(&mut reader, 1024).await.expect("eof").is_none());
    }

    #[tokio::test]
    async fn truncated_body_is_an_io_error() {
        let frame = encode_frame(FrameKind::Reply, &json!({"n": 1}), 1024).expect("encode");
        let mut reader = &frame[..frame.len() - 2];
        let err = read_frame(&mut reader, 1024).await.expect_err("truncated");
        assert!(matches!(err, ProxyError::Io(_)), "{err}");
    }

    #[tokio::test]
    async fn async_read_reports_clean_eof() {
        let bytes = encode_frame(FrameKind::Reply, &json!([1, 2]), 1024).expect("encode");
        let mut reader = bytes.as_slice();
        let (kind, body) = read_frame(&mut reader, 1024)
            .await
            .expect("read")
            .expect("frame");
        assert_eq!(kind, FrameKind::Reply);
        assert_eq!(decode_body::<Value>(&body).expect("json"), json!([1, 2]));
        assert!(read_frame(&mut reader, 1024).await.expect("eof").is_none());
    }

    #[test]
    fn garbage_body_is_malformed() {
        let err = decode_body::<Value>(b"{not json").expect_err("malformed");
        assert_eq!(err.wire_code(), "PROXY_MALFORMED_FRAME");
    }
}
