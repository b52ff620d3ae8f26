//! Variable-length integer encoding utilities.
//!
//! LEB128-style: 7 bits per byte with a continuation bit. Used by the
//! byte-oriented side files (dictionary, chunk layouts); the posting bit
//! stream uses Exp-Golomb codes instead (see [`crate::util::bits`]).

use std::io::{Read, Write};

use byteorder::ReadBytesExt;

use crate::error::{DiskIndexError, Result};

/// Encode a u64 value using variable-length encoding.
pub fn encode_u64(value: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(10);
    let mut val = value;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;

        if val != 0 {
            byte |= 0x80; // Set continuation bit
        }

        bytes.push(byte);

        if val == 0 {
            break;
        }
    }

    bytes
}

/// Decode a u64 value from variable-length encoding.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0;
    let mut bytes_read = 0;

    for &byte in bytes {
        bytes_read += 1;

        if shift >= 64 {
            return Err(DiskIndexError::index("VarInt overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok((result, bytes_read));
        }

        shift += 7;
    }

    Err(DiskIndexError::index("Incomplete VarInt"))
}

/// Number of bytes `value` occupies when varint encoded.
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

/// Write a variable-length encoded u64 to a writer.
pub fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<usize> {
    let bytes = encode_u64(value);
    writer.write_all(&bytes)?;
    Ok(bytes.len())
}

/// Read a variable-length encoded u64 from a reader.
pub fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0;

    loop {
        let byte = reader.read_u8()?;

        if shift >= 64 {
            return Err(DiskIndexError::index("VarInt overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok(result);
        }

        shift += 7;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_encode_decode_u64() {
        let test_values = [0, 1, 127, 128, 255, 256, 16383, 16384, u64::MAX];

        for &value in &test_values {
            let encoded = encode_u64(value);
            let (decoded, bytes_read) = decode_u64(&encoded).unwrap();

            assert_eq!(value, decoded);
            assert_eq!(encoded.len(), bytes_read);
            assert_eq!(encoded.len(), encoded_len(value));
        }
    }

    #[test]
    fn test_write_read_u64() {
        let mut buffer = Vec::new();
        let value = 123456789012345u64;

        let bytes_written = write_u64(&mut buffer, value).unwrap();
        assert_eq!(bytes_written, buffer.len());

        let mut cursor = Cursor::new(buffer);
        let decoded = read_u64(&mut cursor).unwrap();

        assert_eq!(value, decoded);
    }

    #[test]
    fn test_encoding_efficiency() {
        assert_eq!(encode_u64(0).len(), 1);
        assert_eq!(encode_u64(127).len(), 1);
        assert_eq!(encode_u64(128).len(), 2);
        assert_eq!(encode_u64(16383).len(), 2);
        assert_eq!(encode_u64(16384).len(), 3);
        assert_eq!(encode_u64(u64::MAX).len(), 10);
    }

    #[test]
    fn test_incomplete_varint() {
        // Continuation bit set but no more data
        let incomplete = vec![0x80];
        assert!(decode_u64(&incomplete).is_err());
    }
}
