use crate::bitwriter::RICE_PREFIX_CUTOFF;
use crate::error::{CodecError, Result};

/// MSB-first reader over a byte slice, the inverse of
/// [`BitWriter`](crate::bitwriter::BitWriter).
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining_bits(&self) -> usize {
        self.data.len() * 8 - self.pos
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        let byte = *self.data.get(self.pos >> 3).ok_or(CodecError::Truncated("bit"))?;
        let bit = (byte >> (7 - (self.pos & 7))) & 1 == 1;
        self.pos += 1;
        Ok(bit)
    }

    pub fn read_bits(&mut self, n: u8) -> Result<u64> {
        debug_assert!(n <= 64);
        let mut value = 0u64;
        for _ in 0..n {
            value = (value << 1) | self.read_bit()? as u64;
        }
        Ok(value)
    }

    pub fn byte_align(&mut self) {
        self.pos = (self.pos + 7) & !7;
    }

    /// Reads `n` whole bytes; the reader must be byte aligned.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        debug_assert_eq!(self.pos & 7, 0);
        let start = self.pos >> 3;
        let bytes = self.data.get(start..start + n).ok_or(CodecError::Truncated("bytes"))?;
        self.pos += n * 8;
        Ok(bytes)
    }

    pub fn read_unary_max(&mut self, max: u32) -> Result<u32> {
        let mut value = 0;
        while value < max && self.read_bit()? {
            value += 1;
        }
        Ok(value)
    }

    pub fn read_exp_golomb(&mut self, mut k: u32) -> Result<u32> {
        let mut value = 0u32;
        while self.read_bit()? {
            value += 1 << k;
            k += 1;
            if k > 31 {
                return Err(CodecError::Malformed("exp-golomb prefix too long".into()));
            }
        }
        Ok(value + self.read_bits(k as u8)? as u32)
    }

    pub fn read_golomb_rice(&mut self, k: u32) -> Result<u32> {
        let prefix = self.read_unary_max(RICE_PREFIX_CUTOFF)?;
        if prefix < RICE_PREFIX_CUTOFF {
            Ok((prefix << k) + self.read_bits(k as u8)? as u32)
        } else {
            Ok((RICE_PREFIX_CUTOFF << k) + self.read_exp_golomb(k + 1)?)
        }
    }

    pub fn read_signed_exp_golomb(&mut self, k: u32) -> Result<i32> {
        let mag = self.read_exp_golomb(k)? as i32;
        if mag != 0 && self.read_bit()? {
            Ok(-mag)
        } else {
            Ok(mag)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitwriter::{BitSink, BitWriter};
    use proptest::prelude::*;

    #[test]
    fn reads_msb_first() {
        let mut r = BitReader::new(&[0xA0]);
        assert!(r.read_bit().unwrap());
        assert!(!r.read_bit().unwrap());
        assert_eq!(r.read_bits(2).unwrap(), 0b10);
        assert_eq!(r.remaining_bits(), 4);
    }

    #[test]
    fn truncated_stream_errors() {
        let mut r = BitReader::new(&[0xFF]);
        assert_eq!(r.read_bits(8).unwrap(), 0xFF);
        assert_eq!(r.read_bit(), Err(CodecError::Truncated("bit")));
        let mut r = BitReader::new(&[0xFF]);
        assert!(r.read_exp_golomb(0).is_err());
    }

    #[test]
    fn aligned_bytes() {
        let mut w = BitWriter::new();
        w.write_bits(0b1, 1);
        w.byte_align();
        w.write_bytes(b"ok");
        let data = w.finalize();
        let mut r = BitReader::new(&data);
        assert!(r.read_bit().unwrap());
        r.byte_align();
        assert_eq!(r.read_bytes(2).unwrap(), b"ok");
        assert!(r.read_bytes(1).is_err());
    }

    proptest! {
        #[test]
        fn codes_round_trip(values in prop::collection::vec((0u32..100_000, 0u32..5, -5000i32..5000), 1..40)) {
            let mut w = BitWriter::new();
            for &(v, k, s) in &values {
                w.write_exp_golomb(v, k);
                w.write_golomb_rice(v, k);
                w.write_signed_exp_golomb(s, k);
                w.write_unary_max(k, 4);
            }
            let data = w.finalize();
            let mut r = BitReader::new(&data);
            for &(v, k, s) in &values {
                prop_assert_eq!(r.read_exp_golomb(k).unwrap(), v);
                prop_assert_eq!(r.read_golomb_rice(k).unwrap(), v);
                prop_assert_eq!(r.read_signed_exp_golomb(k).unwrap(), s);
                prop_assert_eq!(r.read_unary_max(4).unwrap(), k);
            }
        }
    }
}
