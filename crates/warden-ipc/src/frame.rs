//! # Frame Codec
//!
//! Wire framing for the dispatcher channel: a 4-byte unsigned big-endian
//! length prefix followed by exactly that many bytes of UTF-8 JSON.
//!
//! ```text
//!  ┌──────────────┬───────────────────────────────┐
//!  │ len: u32 BE  │ payload: len bytes of JSON    │
//!  └──────────────┴───────────────────────────────┘
//! ```
//!
//! The decoder keeps partial input in the connection's read buffer and
//! emits nothing until a frame is complete, so concatenated frames decode
//! to exactly their payload sequence with no loss or reordering.
//!
//! Framing errors are not recoverable: a declared length at or beyond the
//! 10 MiB cap poisons the stream and the connection must be dropped.
//! Whether the *payload* parses as JSON is the dispatcher's concern (it
//! answers a parse error over the still-healthy framing), so the decoder
//! item is the raw payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Frames at or above this length abort the connection.
pub const MAX_FRAME_LEN: usize = 10 * 1024 * 1024;

/// Length prefix size.
const HEADER_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame length {0} exceeds maximum {MAX_FRAME_LEN}")]
    Oversize(usize),

    #[error("frame io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame payload is not serializable: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Length-prefixed frame codec.
///
/// Decodes to raw payload [`Bytes`]; encodes any `serde_json` value.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Pending declared length, once the header has been consumed.
    pending: Option<usize>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        let len = match self.pending {
            Some(len) => len,
            None => {
                if src.len() < HEADER_LEN {
                    return Ok(None);
                }
                let mut header = [0u8; HEADER_LEN];
                header.copy_from_slice(&src[..HEADER_LEN]);
                let len = u32::from_be_bytes(header) as usize;
                if len >= MAX_FRAME_LEN {
                    return Err(FrameError::Oversize(len));
                }
                src.advance(HEADER_LEN);
                self.pending = Some(len);
                len
            }
        };

        if src.len() < len {
            // Reserve what the rest of the frame needs so the next read
            // can complete it in one pass.
            src.reserve(len - src.len());
            return Ok(None);
        }

        self.pending = None;
        Ok(Some(src.split_to(len).freeze()))
    }
}

impl Encoder<&serde_json::Value> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, value: &serde_json::Value, dst: &mut BytesMut) -> Result<(), FrameError> {
        let payload = serde_json::to_vec(value)?;
        if payload.len() >= MAX_FRAME_LEN {
            return Err(FrameError::Oversize(payload.len()));
        }
        dst.reserve(HEADER_LEN + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);
        Ok(())
    }
}

/// Encode one value to a standalone frame buffer.
///
/// Convenience for agents and tests that write frames without a codec
/// stream.
pub fn encode_frame(value: &serde_json::Value) -> Result<Vec<u8>, FrameError> {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::new();
    codec.encode(value, &mut buf)?;
    Ok(buf.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_all(input: &[u8]) -> Vec<serde_json::Value> {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            out.push(serde_json::from_slice(&frame).unwrap());
        }
        out
    }

    #[test]
    fn test_round_trip_single() {
        let value = json!({"action": "memory_read", "key": "notes"});
        let encoded = encode_frame(&value).unwrap();
        assert_eq!(decode_all(&encoded), vec![value]);
    }

    #[test]
    fn test_concatenated_frames_in_order() {
        let values = vec![json!({"a": 1}), json!("two"), json!([3, 3, 3])];
        let mut stream = Vec::new();
        for v in &values {
            stream.extend(encode_frame(v).unwrap());
        }
        assert_eq!(decode_all(&stream), values);
    }

    #[test]
    fn test_truncated_frame_emits_nothing_until_complete() {
        let value = json!({"action": "skill_list"});
        let encoded = encode_frame(&value).unwrap();

        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        // Feed byte by byte: no emission before the final byte.
        for (i, byte) in encoded.iter().enumerate() {
            buf.put_u8(*byte);
            let decoded = codec.decode(&mut buf).unwrap();
            if i + 1 < encoded.len() {
                assert!(decoded.is_none(), "premature emission at byte {}", i);
            } else {
                assert_eq!(
                    serde_json::from_slice::<serde_json::Value>(&decoded.unwrap()).unwrap(),
                    value
                );
            }
        }
    }

    #[test]
    fn test_split_across_reads_preserves_tail() {
        let a = json!({"first": true});
        let b = json!({"second": true});
        let mut stream = encode_frame(&a).unwrap();
        stream.extend(encode_frame(&b).unwrap());

        let cut = stream.len() / 2;
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&stream[..cut]);
        let mut out = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            out.push(serde_json::from_slice::<serde_json::Value>(&frame).unwrap());
        }
        buf.extend_from_slice(&stream[cut..]);
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            out.push(serde_json::from_slice::<serde_json::Value>(&frame).unwrap());
        }
        assert_eq!(out, vec![a, b]);
    }

    #[test]
    fn test_oversize_length_aborts() {
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_FRAME_LEN as u32);
        let mut codec = FrameCodec::new();
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::Oversize(_))
        ));
    }

    #[test]
    fn test_empty_payload_frame() {
        // A zero-length frame is valid framing; the payload just fails
        // JSON parsing downstream.
        let mut buf = BytesMut::new();
        buf.put_u32(0);
        let mut codec = FrameCodec::new();
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert!(frame.is_empty());
    }
}
