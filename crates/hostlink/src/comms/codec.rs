//! Delimiter framing codec.
//!
//! Every message is terminated by exactly one delimiter byte. The encoder
//! trims the payload and refuses payloads that contain the delimiter; the
//! decoder accumulates until the delimiter and rejects frames that exceed
//! the buffer limit, carrying the partial content in the error instead of
//! truncating silently.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::error::CommsError;

/// Default end-of-message delimiter.
pub const DEFAULT_DELIMITER: u8 = b'\n';

/// Default maximum buffered message length in bytes.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 1024;

/// Delimiter-terminated text frame codec.
#[derive(Debug, Clone, Copy)]
pub struct DelimitedCodec {
    delimiter: u8,
    max_length: usize,
}

impl DelimitedCodec {
    /// Creates a codec with the given delimiter and buffer limit.
    #[must_use]
    pub const fn new(delimiter: u8, max_length: usize) -> Self {
        Self {
            delimiter,
            max_length,
        }
    }

    fn oversized(&self, src: &mut BytesMut) -> CommsError {
        let partial = String::from_utf8_lossy(&src[..self.max_length]).into_owned();
        src.clear();
        CommsError::Oversized {
            partial,
            limit: self.max_length,
        }
    }
}

impl Default for DelimitedCodec {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER, DEFAULT_MAX_MESSAGE_LEN)
    }
}

impl Decoder for DelimitedCodec {
    type Item = String;
    type Error = CommsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, CommsError> {
        if let Some(pos) = src.iter().position(|&b| b == self.delimiter) {
            if pos > self.max_length {
                // Resynchronize at the delimiter so the next frame survives.
                let err = CommsError::Oversized {
                    partial: String::from_utf8_lossy(&src[..self.max_length]).into_owned(),
                    limit: self.max_length,
                };
                src.advance(pos + 1);
                return Err(err);
            }
            let frame = src.split_to(pos + 1);
            let message = std::str::from_utf8(&frame[..pos])
                .map_err(|_| CommsError::InvalidUtf8)?
                .to_owned();
            return Ok(Some(message));
        }

        if src.len() > self.max_length {
            return Err(self.oversized(src));
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, CommsError> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => {
                // Peer closed with an unfinished frame in flight. Surfacing
                // this as an error (rather than spinning on empty reads) is
                // deliberate.
                let partial = String::from_utf8_lossy(src).into_owned();
                src.clear();
                Err(CommsError::Incomplete { partial })
            }
        }
    }
}

impl<T: AsRef<str>> Encoder<T> for DelimitedCodec {
    type Error = CommsError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), CommsError> {
        let message = item.as_ref().trim();
        if message.as_bytes().contains(&self.delimiter) {
            return Err(CommsError::DelimiterInPayload);
        }
        dst.reserve(message.len() + 1);
        dst.put_slice(message.as_bytes());
        dst.put_u8(self.delimiter);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut DelimitedCodec, src: &mut BytesMut) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(message) = codec.decode(src).unwrap() {
            out.push(message);
        }
        out
    }

    #[test]
    fn encode_appends_delimiter_and_trims() {
        let mut codec = DelimitedCodec::default();
        let mut dst = BytesMut::new();

        codec.encode("  hello  ", &mut dst).unwrap();
        assert_eq!(&dst[..], b"hello\n");
    }

    #[test]
    fn encode_rejects_delimiter_in_payload() {
        let mut codec = DelimitedCodec::default();
        let mut dst = BytesMut::new();

        let err = codec.encode("a\nb", &mut dst).unwrap_err();
        assert!(matches!(err, CommsError::DelimiterInPayload));
        assert!(dst.is_empty());
    }

    #[test]
    fn decode_round_trip() {
        let mut codec = DelimitedCodec::default();
        let mut src = BytesMut::from(&b"hello\n"[..]);

        assert_eq!(codec.decode(&mut src).unwrap(), Some("hello".to_string()));
        assert_eq!(codec.decode(&mut src).unwrap(), None);
    }

    #[test]
    fn decode_multiple_frames_in_one_buffer() {
        let mut codec = DelimitedCodec::default();
        let mut src = BytesMut::from(&b"a\nbb\nccc\n"[..]);

        assert_eq!(decode_all(&mut codec, &mut src), vec!["a", "bb", "ccc"]);
    }

    #[test]
    fn decode_waits_for_delimiter() {
        let mut codec = DelimitedCodec::default();
        let mut src = BytesMut::from(&b"hel"[..]);

        assert_eq!(codec.decode(&mut src).unwrap(), None);
        src.extend_from_slice(b"lo\n");
        assert_eq!(codec.decode(&mut src).unwrap(), Some("hello".to_string()));
    }

    #[test]
    fn oversized_without_delimiter_carries_partial() {
        let mut codec = DelimitedCodec::new(b'\n', 4);
        let mut src = BytesMut::from(&b"abcdefgh"[..]);

        match codec.decode(&mut src).unwrap_err() {
            CommsError::Oversized { partial, limit } => {
                assert_eq!(partial, "abcd");
                assert_eq!(limit, 4);
            }
            other => panic!("expected oversized, got {other}"),
        }
    }

    #[test]
    fn oversized_frame_resynchronizes_at_delimiter() {
        let mut codec = DelimitedCodec::new(b'\n', 4);
        let mut src = BytesMut::from(&b"toolongframe\nok\n"[..]);

        assert!(matches!(
            codec.decode(&mut src),
            Err(CommsError::Oversized { .. })
        ));
        assert_eq!(codec.decode(&mut src).unwrap(), Some("ok".to_string()));
    }

    #[test]
    fn frame_of_exactly_max_length_is_accepted() {
        let mut codec = DelimitedCodec::new(b'\n', 4);
        let mut src = BytesMut::from(&b"abcd\n"[..]);

        assert_eq!(codec.decode(&mut src).unwrap(), Some("abcd".to_string()));
    }

    #[test]
    fn eof_with_unfinished_frame_is_incomplete() {
        let mut codec = DelimitedCodec::default();
        let mut src = BytesMut::from(&b"abc"[..]);

        match codec.decode_eof(&mut src).unwrap_err() {
            CommsError::Incomplete { partial } => assert_eq!(partial, "abc"),
            other => panic!("expected incomplete, got {other}"),
        }
    }

    #[test]
    fn eof_with_empty_buffer_is_end_of_stream() {
        let mut codec = DelimitedCodec::default();
        let mut src = BytesMut::new();

        assert_eq!(codec.decode_eof(&mut src).unwrap(), None);
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        let mut codec = DelimitedCodec::default();
        let mut src = BytesMut::from(&[0xff, 0xfe, b'\n'][..]);

        assert!(matches!(
            codec.decode(&mut src),
            Err(CommsError::InvalidUtf8)
        ));
    }

    #[test]
    fn custom_delimiter() {
        let mut codec = DelimitedCodec::new(b'\0', 16);
        let mut src = BytesMut::from(&b"ping\0"[..]);

        assert_eq!(codec.decode(&mut src).unwrap(), Some("ping".to_string()));
    }
}
