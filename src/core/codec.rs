//! Length-prefixed word framing for the management channel.
//!
//! Each word is preceded by its byte length in a variable-width prefix; a
//! zero-length word terminates the sentence.
//!
//! | length            | prefix                          |
//! |-------------------|---------------------------------|
//! | `< 0x80`          | 1 byte                          |
//! | `< 0x4000`        | 2 bytes, `len \| 0x8000`        |
//! | `< 0x20_0000`     | 3 bytes, `len \| 0xC0_0000`     |
//! | `< 0x1000_0000`   | 4 bytes, `len \| 0xE000_0000`   |
//! | otherwise         | `0xF0` followed by `u32` BE     |
use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::core::sentence::Sentence;

/// Largest word accepted from the wire
pub const MAX_WORD_LEN: usize = 16 * 1024 * 1024;

/// Framing errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// First byte of a length prefix is a reserved control byte
    #[error("invalid length prefix byte 0x{0:02x}")]
    InvalidPrefix(u8),

    #[error("word of {0} bytes exceeds the {MAX_WORD_LEN} byte limit")]
    WordTooLong(usize),
}

/// Append the length prefix for a word of `len` bytes
pub fn encode_length(len: usize, dst: &mut BytesMut) {
    if len < 0x80 {
        dst.put_u8(len as u8);
    } else if len < 0x4000 {
        dst.put_u16((len as u16) | 0x8000);
    } else if len < 0x20_0000 {
        let v = (len as u32) | 0xC0_0000;
        dst.put_slice(&v.to_be_bytes()[1..]);
    } else if len < 0x1000_0000 {
        dst.put_u32((len as u32) | 0xE000_0000);
    } else {
        dst.put_u8(0xF0);
        dst.put_u32(len as u32);
    }
}

/// Decode a length prefix at the start of `src`.
///
/// Returns `(word_len, prefix_len)`, or `None` when more bytes are needed.
pub fn decode_length(src: &[u8]) -> Result<Option<(usize, usize)>, CodecError> {
    let Some(&first) = src.first() else {
        return Ok(None);
    };

    let (prefix_len, mut value) = if first & 0x80 == 0x00 {
        (1, u32::from(first))
    } else if first & 0xC0 == 0x80 {
        (2, u32::from(first & 0x3F))
    } else if first & 0xE0 == 0xC0 {
        (3, u32::from(first & 0x1F))
    } else if first & 0xF0 == 0xE0 {
        (4, u32::from(first & 0x0F))
    } else if first == 0xF0 {
        (5, 0)
    } else {
        return Err(CodecError::InvalidPrefix(first));
    };

    if src.len() < prefix_len {
        return Ok(None);
    }
    for &b in &src[1..prefix_len] {
        value = (value << 8) | u32::from(b);
    }
    Ok(Some((value as usize, prefix_len)))
}

/// Codec turning a byte stream into [`Sentence`]s and back.
///
/// Words of a partially received sentence are buffered in the codec so the
/// read buffer is consumed word by word.
#[derive(Debug, Default)]
pub struct SentenceCodec {
    pending: Vec<String>,
}

impl SentenceCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for SentenceCodec {
    type Item = Sentence;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Sentence>, CodecError> {
        loop {
            let Some((len, prefix_len)) = decode_length(src)? else {
                return Ok(None);
            };
            if len > MAX_WORD_LEN {
                return Err(CodecError::WordTooLong(len));
            }
            if src.len() < prefix_len + len {
                src.reserve(prefix_len + len - src.len());
                return Ok(None);
            }

            src.advance(prefix_len);
            if len == 0 {
                return Ok(Some(Sentence::new(std::mem::take(&mut self.pending))));
            }
            let word = src.split_to(len);
            self.pending
                .push(String::from_utf8_lossy(&word).into_owned());
        }
    }
}

impl Encoder<Sentence> for SentenceCodec {
    type Error = CodecError;

    fn encode(&mut self, sentence: Sentence, dst: &mut BytesMut) -> Result<(), CodecError> {
        for word in sentence.words() {
            let bytes = word.as_bytes();
            encode_length(bytes.len(), dst);
            dst.put_slice(bytes);
        }
        dst.put_u8(0);
        Ok(())
    }
}
