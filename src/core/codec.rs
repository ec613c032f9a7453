//! Binary wire codec
//!
//! Fixed-width big-endian integers and fixed-size byte fields. Hashes are
//! only reproducible if encoding round-trips bit for bit, so decoding is
//! strict: truncated input and (for top-level values) trailing bytes are
//! errors.

use crate::crypto::MerkleError;
use thiserror::Error;

/// Decoding errors for malformed wire bytes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input while reading {field}: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
    #[error("invalid transaction list: {0}")]
    EmptyBlock(#[from] MerkleError),
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

/// Values with a canonical wire encoding
pub trait Encode {
    fn encode_to(&self, out: &mut Vec<u8>);

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_to(&mut out);
        out
    }

    fn encoded_len(&self) -> usize;
}

/// Values decodable from their wire encoding
pub trait Decode: Sized {
    fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError>;

    /// Decode a complete value, rejecting trailing bytes
    fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(bytes);
        let value = Self::decode_from(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }

    fn decode_hex(hex_str: &str) -> Result<Self, DecodeError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|e| DecodeError::InvalidHex(e.to_string()))?;
        Self::decode(&bytes)
    }
}

pub(crate) fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Length prefixes are 4 bytes on the wire
///
/// Callers encode lengths of values that fit a block, which the consensus
/// size limit keeps far below `u32::MAX`; a larger length is a caller bug.
pub(crate) fn put_len(out: &mut Vec<u8>, len: usize) {
    debug_assert!(
        u32::try_from(len).is_ok(),
        "length {} does not fit a u32 prefix",
        len
    );
    put_u32(out, len as u32);
}

/// Cursor over a byte slice
#[derive(Debug)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    pub fn position(&self) -> usize {
        self.offset
    }

    pub fn take(&mut self, field: &'static str, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEnd {
                field,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    pub fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(field, N)?);
        Ok(out)
    }

    pub fn u32(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        self.array::<4>(field).map(u32::from_be_bytes)
    }

    pub fn u64(&mut self, field: &'static str) -> Result<u64, DecodeError> {
        self.array::<8>(field).map(u64::from_be_bytes)
    }

    /// Fail if any input is left over
    pub fn finish(&self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_integers() {
        let mut out = Vec::new();
        put_u32(&mut out, 0x0102_0304);
        put_u64(&mut out, 0x0506_0708_090a_0b0c);
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);

        let mut reader = ByteReader::new(&out);
        assert_eq!(reader.u32("a").unwrap(), 0x0102_0304);
        assert_eq!(reader.u64("b").unwrap(), 0x0506_0708_090a_0b0c);
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn test_truncated_input() {
        let mut reader = ByteReader::new(&[0, 1, 2]);
        let err = reader.u32("height").unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnexpectedEnd {
                field: "height",
                needed: 4,
                remaining: 3
            }
        );
        // failed reads do not consume input
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_length_prefix() {
        let mut out = Vec::new();
        put_len(&mut out, 2048);
        assert_eq!(out, vec![0, 0, 8, 0]);
    }

    #[cfg(all(debug_assertions, target_pointer_width = "64"))]
    #[test]
    #[should_panic(expected = "does not fit a u32 prefix")]
    fn test_length_prefix_overflow() {
        put_len(&mut Vec::new(), u32::MAX as usize + 1);
    }

    #[test]
    fn test_trailing_bytes() {
        let mut reader = ByteReader::new(&[0, 0, 0, 1, 9]);
        reader.u32("value").unwrap();
        assert_eq!(reader.finish(), Err(DecodeError::TrailingBytes(1)));
    }
}
