/// Destination of written bits: a real byte buffer or a counter used for
/// rate estimation.
pub trait BitSink {
    fn write_bit(&mut self, bit: bool);

    fn num_bits(&self) -> u64;

    fn write_bits(&mut self, value: u64, n: u8) {
        debug_assert!(n <= 64);
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    /// `value` ones followed by a terminating zero, which is omitted when
    /// `value == max`.
    fn write_unary_max(&mut self, value: u32, max: u32) {
        debug_assert!(value <= max);
        for _ in 0..value {
            self.write_bit(true);
        }
        if value < max {
            self.write_bit(false);
        }
    }

    /// Exp-Golomb code of order `k`.
    fn write_exp_golomb(&mut self, mut value: u32, mut k: u32) {
        while value >= (1 << k) {
            self.write_bit(true);
            value -= 1 << k;
            k += 1;
        }
        self.write_bit(false);
        self.write_bits(value as u64, k as u8);
    }

    /// Golomb-Rice code with parameter `k`; prefixes longer than
    /// [`RICE_PREFIX_CUTOFF`] escape to an Exp-Golomb code of order `k + 1`.
    fn write_golomb_rice(&mut self, value: u32, k: u32) {
        let prefix = value >> k;
        if prefix < RICE_PREFIX_CUTOFF {
            self.write_unary_max(prefix, RICE_PREFIX_CUTOFF);
            self.write_bits((value & ((1 << k) - 1)) as u64, k as u8);
        } else {
            for _ in 0..RICE_PREFIX_CUTOFF {
                self.write_bit(true);
            }
            self.write_exp_golomb(value - (RICE_PREFIX_CUTOFF << k), k + 1);
        }
    }

    fn write_signed_exp_golomb(&mut self, value: i32, k: u32) {
        self.write_exp_golomb(value.unsigned_abs(), k);
        if value != 0 {
            self.write_bit(value < 0);
        }
    }
}

pub const RICE_PREFIX_CUTOFF: u32 = 4;

#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    current_byte: u8,
    bits_in_current: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn byte_align(&mut self) {
        if self.bits_in_current > 0 {
            self.current_byte <<= 8 - self.bits_in_current;
            self.buf.push(self.current_byte);
            self.current_byte = 0;
            self.bits_in_current = 0;
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.bits_in_current == 0 {
            self.buf.extend_from_slice(bytes);
        } else {
            for &b in bytes {
                self.write_bits(b as u64, 8);
            }
        }
    }

    pub fn finalize(mut self) -> Vec<u8> {
        self.byte_align();
        self.buf
    }
}

impl BitSink for BitWriter {
    fn write_bit(&mut self, bit: bool) {
        self.current_byte = (self.current_byte << 1) | (bit as u8);
        self.bits_in_current += 1;
        if self.bits_in_current == 8 {
            self.buf.push(self.current_byte);
            self.current_byte = 0;
            self.bits_in_current = 0;
        }
    }

    fn num_bits(&self) -> u64 {
        self.buf.len() as u64 * 8 + self.bits_in_current as u64
    }
}

/// Counts bits without storing them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitCounter {
    bits: u64,
}

impl BitCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BitSink for BitCounter {
    #[inline]
    fn write_bit(&mut self, _bit: bool) {
        self.bits += 1;
    }

    #[inline]
    fn write_bits(&mut self, _value: u64, n: u8) {
        self.bits += n as u64;
    }

    fn num_bits(&self) -> u64 {
        self.bits
    }
}
