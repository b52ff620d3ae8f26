//! Bit-level encoding for the posting stream.
//!
//! Values are written as order-k Exp-Golomb codes on top of `bitstream-io`
//! in big-endian bit order. Writers and readers count bits themselves so the
//! posting encoder can report exact bit lengths per term and chunk.

use std::io::{Read, Write};

use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter};

use crate::error::{DiskIndexError, Result};

/// Largest order accepted for Exp-Golomb codes.
pub const MAX_EXP_GOLOMB_K: u32 = 32;

/// Number of bits needed to store `value` (0 for 0).
#[inline]
pub fn bit_width(value: u64) -> u32 {
    64 - value.leading_zeros()
}

/// Length in bits of the order-`k` Exp-Golomb code for `value`.
#[inline]
pub fn exp_golomb_len(value: u64, k: u32) -> u64 {
    let x = value + (1u64 << k);
    let n = bit_width(x) as u64;
    2 * n - 1 - k as u64
}

/// Map a signed value onto the unsigned range (0, -1, 1, -2, ...).
#[inline]
pub fn zigzag_encode(value: i32) -> u64 {
    ((value << 1) ^ (value >> 31)) as u32 as u64
}

/// Inverse of [`zigzag_encode`].
#[inline]
pub fn zigzag_decode(value: u64) -> i32 {
    let value = value as u32;
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Bit writer that keeps track of how many bits it has emitted.
pub struct BitEncoder<W: Write> {
    writer: BitWriter<W, BigEndian>,
    bits_written: u64,
}

impl<W: Write> BitEncoder<W> {
    pub fn new(writer: W) -> Self {
        BitEncoder {
            writer: BitWriter::endian(writer, BigEndian),
            bits_written: 0,
        }
    }

    /// Bits written so far, not counting alignment padding.
    pub fn bits_written(&self) -> u64 {
        self.bits_written
    }

    pub fn write_bit(&mut self, bit: bool) -> Result<()> {
        self.writer.write_bit(bit)?;
        self.bits_written += 1;
        Ok(())
    }

    /// Write the low `bits` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u64, bits: u32) -> Result<()> {
        if bits == 0 {
            return Ok(());
        }
        if bits < 64 && value >> bits != 0 {
            return Err(DiskIndexError::other(format!(
                "value {value} does not fit in {bits} bits"
            )));
        }
        self.writer.write(bits, value)?;
        self.bits_written += bits as u64;
        Ok(())
    }

    /// Write `value` as an order-`k` Exp-Golomb code.
    pub fn write_exp_golomb(&mut self, value: u64, k: u32) -> Result<()> {
        if k > MAX_EXP_GOLOMB_K {
            return Err(DiskIndexError::other(format!(
                "Exp-Golomb order {k} out of range"
            )));
        }
        let x = value.checked_add(1u64 << k).ok_or_else(|| {
            DiskIndexError::other(format!("value {value} too large for Exp-Golomb k={k}"))
        })?;
        let n = bit_width(x);
        self.write_bits(0, n - 1 - k)?;
        self.write_bits(x, n)
    }

    /// Pad to a byte boundary and hand back the underlying writer.
    pub fn finish(mut self) -> Result<(W, u64)> {
        self.writer.byte_align()?;
        Ok((self.writer.into_writer(), self.bits_written))
    }
}

/// Destination for Exp-Golomb codes: either a real [`BitEncoder`] or a
/// [`BitCounter`] that only measures.
pub trait BitSink {
    fn put_exp_golomb(&mut self, value: u64, k: u32) -> Result<()>;

    /// Bits accepted so far.
    fn bits(&self) -> u64;
}

impl<W: Write> BitSink for BitEncoder<W> {
    fn put_exp_golomb(&mut self, value: u64, k: u32) -> Result<()> {
        self.write_exp_golomb(value, k)
    }

    fn bits(&self) -> u64 {
        self.bits_written
    }
}

/// Counts the bits an encoding would take without writing anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitCounter {
    bits: u64,
}

impl BitCounter {
    pub fn new() -> Self {
        BitCounter::default()
    }
}

impl BitSink for BitCounter {
    fn put_exp_golomb(&mut self, value: u64, k: u32) -> Result<()> {
        self.bits += exp_golomb_len(value, k);
        Ok(())
    }

    fn bits(&self) -> u64 {
        self.bits
    }
}

/// Bit reader counterpart of [`BitEncoder`].
pub struct BitDecoder<R: Read> {
    reader: BitReader<R, BigEndian>,
    bits_read: u64,
}

impl<R: Read> BitDecoder<R> {
    pub fn new(reader: R) -> Self {
        BitDecoder {
            reader: BitReader::endian(reader, BigEndian),
            bits_read: 0,
        }
    }

    pub fn bits_read(&self) -> u64 {
        self.bits_read
    }

    pub fn skip_bits(&mut self, mut bits: u64) -> Result<()> {
        while bits > 0 {
            let step = bits.min(u32::MAX as u64) as u32;
            self.reader.skip(step)?;
            self.bits_read += step as u64;
            bits -= step as u64;
        }
        Ok(())
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        let bit = self.reader.read_bit()?;
        self.bits_read += 1;
        Ok(bit)
    }

    pub fn read_bits(&mut self, bits: u32) -> Result<u64> {
        if bits == 0 {
            return Ok(0);
        }
        let value = self.reader.read::<u64>(bits)?;
        self.bits_read += bits as u64;
        Ok(value)
    }

    pub fn read_exp_golomb(&mut self, k: u32) -> Result<u64> {
        let mut zeros = 0u32;
        while !self.read_bit()? {
            zeros += 1;
            if zeros + k >= 64 {
                return Err(DiskIndexError::index("corrupt Exp-Golomb code"));
            }
        }
        let n = zeros + k + 1;
        let rest = self.read_bits(n - 1)?;
        let x = (1u64 << (n - 1)) | rest;
        Ok(x - (1u64 << k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_counter_matches_encoder() {
        let values = [(0u64, 0u32), (7, 0), (1000, 3), (1 << 40, 12), (5, 2)];
        let mut counter = BitCounter::new();
        let mut encoder = BitEncoder::new(Vec::new());
        for (value, k) in values {
            counter.put_exp_golomb(value, k).unwrap();
            encoder.put_exp_golomb(value, k).unwrap();
        }
        assert_eq!(counter.bits(), encoder.bits());
    }

    #[test]
    fn test_exp_golomb_lengths() {
        // Order 0: 0 -> "1", 1 -> "010", 2 -> "011", 3 -> "00100"
        assert_eq!(exp_golomb_len(0, 0), 1);
        assert_eq!(exp_golomb_len(1, 0), 3);
        assert_eq!(exp_golomb_len(2, 0), 3);
        assert_eq!(exp_golomb_len(3, 0), 5);
        // Order 2: values 0..4 fit in 3 bits
        assert_eq!(exp_golomb_len(0, 2), 3);
        assert_eq!(exp_golomb_len(3, 2), 3);
        assert_eq!(exp_golomb_len(4, 2), 5);
    }

    #[test]
    fn test_encoder_counts_match_lengths() {
        let values = [(0u64, 0u32), (1, 0), (17, 3), (1000, 5), (u32::MAX as u64, 8)];
        let mut encoder = BitEncoder::new(Vec::new());
        let mut expected = 0;
        for &(value, k) in &values {
            encoder.write_exp_golomb(value, k).unwrap();
            expected += exp_golomb_len(value, k);
            assert_eq!(encoder.bits_written(), expected);
        }

        let (bytes, bits) = encoder.finish().unwrap();
        assert_eq!(bits, expected);
        assert_eq!(bytes.len() as u64, expected.div_ceil(8));

        let mut decoder = BitDecoder::new(Cursor::new(bytes));
        for &(value, k) in &values {
            assert_eq!(decoder.read_exp_golomb(k).unwrap(), value);
        }
        assert_eq!(decoder.bits_read(), expected);
    }

    #[test]
    fn test_unaligned_skip() {
        let mut encoder = BitEncoder::new(Vec::new());
        encoder.write_bits(0b101, 3).unwrap();
        encoder.write_exp_golomb(42, 1).unwrap();
        let (bytes, _) = encoder.finish().unwrap();

        let mut decoder = BitDecoder::new(Cursor::new(bytes));
        decoder.skip_bits(3).unwrap();
        assert_eq!(decoder.read_exp_golomb(1).unwrap(), 42);
    }

    #[test]
    fn test_write_bits_rejects_wide_values() {
        let mut encoder = BitEncoder::new(Vec::new());
        assert!(encoder.write_bits(8, 3).is_err());
        assert_eq!(encoder.bits_written(), 0);
    }

    #[test]
    fn test_zigzag() {
        for value in [0, -1, 1, -2, 2, i32::MAX, i32::MIN] {
            assert_eq!(zigzag_decode(zigzag_encode(value)), value);
        }
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
    }
}
