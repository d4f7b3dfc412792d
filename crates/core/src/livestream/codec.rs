//! Livestream wire format.
//!
//! Client hello: 4-byte magic, 4-byte big-endian period in milliseconds,
//! then the check UUID as 36 bytes of hyphenated text. After the hello the
//! daemon pushes `[u32 BE length][UTF-8 payload]` frames until either side
//! closes.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use super::LivestreamError;

pub const LIVESTREAM_MAGIC: [u8; 4] = [0xfa, 0x57, 0xfe, 0xed];

const HEADER_LEN: usize = 4;

/// Encode the client hello.
pub fn encode_hello(uuid: &Uuid, period_ms: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(LIVESTREAM_MAGIC.len() + 4 + uuid::fmt::Hyphenated::LENGTH);
    buf.extend_from_slice(&LIVESTREAM_MAGIC);
    buf.extend_from_slice(&period_ms.to_be_bytes());
    buf.extend_from_slice(uuid.hyphenated().to_string().as_bytes());
    buf
}

/// Write the client hello to `io`.
pub async fn handshake<W>(io: &mut W, uuid: &Uuid, period_ms: u32) -> Result<(), LivestreamError>
where
    W: AsyncWrite + Unpin,
{
    io.write_all(&encode_hello(uuid, period_ms)).await?;
    io.flush().await?;
    Ok(())
}

enum Phase {
    /// Waiting for a 4-byte length header.
    Header,
    /// Waiting for a payload of the given length.
    Body(usize),
}

/// Incremental two-phase frame decoder.
pub struct FrameDecoder {
    phase: Phase,
    max_frame: usize,
}

impl FrameDecoder {
    pub fn new(max_frame: usize) -> Self {
        Self {
            phase: Phase::Header,
            max_frame,
        }
    }

    /// Take the next complete frame out of `buf`, if one is buffered.
    ///
    /// Consumes only what it decodes; partial input stays in `buf` for the
    /// next call.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, LivestreamError> {
        loop {
            match self.phase {
                Phase::Header => {
                    if buf.len() < HEADER_LEN {
                        return Ok(None);
                    }
                    let len = buf.get_u32() as usize;
                    if len > self.max_frame {
                        return Err(LivestreamError::FrameTooLarge {
                            len,
                            max: self.max_frame,
                        });
                    }
                    self.phase = Phase::Body(len);
                }
                Phase::Body(len) => {
                    if buf.len() < len {
                        buf.reserve(len - buf.len());
                        return Ok(None);
                    }
                    let payload = buf.split_to(len);
                    self.phase = Phase::Header;
                    return String::from_utf8(payload.to_vec())
                        .map(Some)
                        .map_err(|e| LivestreamError::InvalidUtf8(e.utf8_error()));
                }
            }
        }
    }

    /// Whether the decoder sits between frames with nothing pending.
    pub fn at_boundary(&self, buf: &BytesMut) -> bool {
        matches!(self.phase, Phase::Header) && buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = (payload.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_decodes_consecutive_frames() {
        let mut decoder = FrameDecoder::new(1024);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0, 0, 0, 5]);
        buf.extend_from_slice(b"hello");
        buf.extend_from_slice(&[0, 0, 0, 3]);
        buf.extend_from_slice(b"abc");

        assert_eq!(decoder.decode(&mut buf).unwrap().as_deref(), Some("hello"));
        assert_eq!(decoder.decode(&mut buf).unwrap().as_deref(), Some("abc"));
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        assert!(decoder.at_boundary(&buf));
    }

    #[test]
    fn test_frame_split_across_reads() {
        let bytes = frame("sample payload".as_bytes());
        let mut decoder = FrameDecoder::new(1024);
        let mut buf = BytesMut::new();

        for (i, byte) in bytes.iter().enumerate() {
            buf.extend_from_slice(&[*byte]);
            let decoded = decoder.decode(&mut buf).unwrap();
            if i + 1 < bytes.len() {
                assert_eq!(decoded, None);
                assert!(!decoder.at_boundary(&buf));
            } else {
                assert_eq!(decoded.as_deref(), Some("sample payload"));
            }
        }
    }

    #[test]
    fn test_empty_frame() {
        let mut decoder = FrameDecoder::new(16);
        let mut buf = BytesMut::from(&[0u8, 0, 0, 0][..]);
        assert_eq!(decoder.decode(&mut buf).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_oversized_frame_is_rejected() {
        let mut decoder = FrameDecoder::new(4);
        let mut buf = BytesMut::from(&frame(b"too long")[..]);
        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(matches!(err, LivestreamError::FrameTooLarge { len: 8, max: 4 }));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let mut decoder = FrameDecoder::new(16);
        let mut buf = BytesMut::from(&frame(&[0xff, 0xfe])[..]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(LivestreamError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn test_hello_layout() {
        let uuid = Uuid::parse_str("edc4760b-5bdb-45d6-ab82-34160eda8187").unwrap();
        let hello = encode_hello(&uuid, 768);

        assert_eq!(&hello[..4], &[0xfa, 0x57, 0xfe, 0xed]);
        assert_eq!(&hello[4..8], &[0, 0, 3, 0]);
        assert_eq!(&hello[8..], b"edc4760b-5bdb-45d6-ab82-34160eda8187");
    }

    #[tokio::test]
    async fn test_handshake_writes_hello() {
        let uuid = Uuid::parse_str("edc4760b-5bdb-45d6-ab82-34160eda8187").unwrap();
        let mut io = tokio_test::io::Builder::new()
            .write(&encode_hello(&uuid, 60_000))
            .build();

        handshake(&mut io, &uuid, 60_000).await.unwrap();
    }
}
