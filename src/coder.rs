//! Arithmetic encoder and decoder with 32-bit interval state.
//!
//! Both sides share the same interval update and renormalization logic; the
//! encoder carries a count of pending straddle bits while the decoder carries
//! a 32-bit code register fed from the bit stream. Interval products are
//! computed in `u64` so the `range * count / total` terms never truncate.

use crate::bitstream::{BitReader, BitWriter};
use crate::quantizer::CumulativeTable;

/// Interval precision in bits.
pub const NUM_STATE_BITS: u32 = 32;
/// All-ones 32-bit state mask.
pub const STATE_MASK: u64 = (1u64 << NUM_STATE_BITS) - 1;
/// Top of the lower half-interval.
pub const HALF: u64 = 1u64 << (NUM_STATE_BITS - 1);
/// Top of the first quarter-interval.
pub const QUARTER: u64 = 1u64 << (NUM_STATE_BITS - 2);
/// Bottom of the last quarter-interval.
pub const THREE_QUARTERS: u64 = 3 * QUARTER;

/// Arithmetic encoder over an owned bit stream.
pub struct ArithEncoder {
    low: u64,
    high: u64,
    pending: u32,
    writer: BitWriter,
}

impl Default for ArithEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArithEncoder {
    pub fn new() -> Self {
        Self {
            low: 0,
            high: STATE_MASK,
            pending: 0,
            writer: BitWriter::new(),
        }
    }

    /// Emit a resolved MSB followed by any pending complementary bits.
    #[inline]
    fn emit_bit_plus_pending(&mut self, bit: u8) {
        self.writer.write_bit(bit);
        let opposite = bit ^ 1;
        for _ in 0..self.pending {
            self.writer.write_bit(opposite);
        }
        self.pending = 0;
    }

    /// Narrow the interval to `symbol`'s range and renormalize.
    ///
    /// Out-of-range symbols are a programmer error and panic.
    pub fn encode(&mut self, symbol: usize, table: &CumulativeTable) {
        assert!(
            symbol < table.num_symbols(),
            "symbol {symbol} out of range for alphabet of {}",
            table.num_symbols()
        );
        let (c_lo, c_hi) = table.symbol_range(symbol);
        let total = table.total() as u64;
        // Totals must stay below a quarter interval or precision collapses.
        debug_assert!(total < QUARTER);

        let range = self.high - self.low + 1;
        self.high = self.low + range * c_hi as u64 / total - 1;
        self.low += range * c_lo as u64 / total;

        loop {
            if self.high < HALF {
                self.emit_bit_plus_pending(0);
            } else if self.low >= HALF {
                self.emit_bit_plus_pending(1);
                self.low -= HALF;
                self.high -= HALF;
            } else if self.low >= QUARTER && self.high < THREE_QUARTERS {
                // Straddle: defer the bit until the MSB resolves.
                self.pending += 1;
                self.low -= QUARTER;
                self.high -= QUARTER;
            } else {
                break;
            }
            self.low = (self.low << 1) & STATE_MASK;
            self.high = ((self.high << 1) & STATE_MASK) | 1;
        }
    }

    /// Terminate the stream and return the flushed payload bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.pending += 1;
        if self.low < QUARTER {
            self.emit_bit_plus_pending(0);
        } else {
            self.emit_bit_plus_pending(1);
        }
        self.writer.flush();
        self.writer.into_bytes()
    }

    /// Number of payload bits emitted so far (excluding pending bits).
    pub fn bit_len(&self) -> usize {
        self.writer.bit_len()
    }
}

/// Arithmetic decoder over a borrowed payload.
pub struct ArithDecoder<'a> {
    low: u64,
    high: u64,
    code: u64,
    reader: BitReader<'a>,
}

impl<'a> ArithDecoder<'a> {
    /// Prime the code register with the first 32 bits of `payload`.
    pub fn new(payload: &'a [u8]) -> Self {
        let mut reader = BitReader::new(payload);
        let mut code = 0u64;
        for _ in 0..NUM_STATE_BITS {
            code = (code << 1) | reader.read_bit() as u64;
        }
        Self {
            low: 0,
            high: STATE_MASK,
            code,
            reader,
        }
    }

    /// Decode the next symbol under `table` and renormalize.
    pub fn decode(&mut self, table: &CumulativeTable) -> usize {
        let total = table.total() as u64;
        debug_assert!(total < QUARTER);
        let range = self.high - self.low + 1;

        let target = ((self.code - self.low + 1) * total - 1) / range;
        let symbol = table.find_symbol(target as u32);

        let (c_lo, c_hi) = table.symbol_range(symbol);
        self.high = self.low + range * c_hi as u64 / total - 1;
        self.low += range * c_lo as u64 / total;

        loop {
            if self.high < HALF {
                // MSB resolved to 0, nothing to subtract.
            } else if self.low >= HALF {
                self.low -= HALF;
                self.high -= HALF;
                self.code -= HALF;
            } else if self.low >= QUARTER && self.high < THREE_QUARTERS {
                self.low -= QUARTER;
                self.high -= QUARTER;
                self.code -= QUARTER;
            } else {
                break;
            }
            self.low = (self.low << 1) & STATE_MASK;
            self.high = ((self.high << 1) & STATE_MASK) | 1;
            self.code = ((self.code << 1) & STATE_MASK) | self.reader.read_bit() as u64;
        }

        symbol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_table(n: usize) -> CumulativeTable {
        CumulativeTable::from_probabilities(&vec![1.0 / n as f32; n])
    }

    #[test]
    fn test_uniform_roundtrip() {
        let table = uniform_table(4);
        let symbols = [0usize, 1, 2, 3, 0, 1];

        let mut encoder = ArithEncoder::new();
        for &s in &symbols {
            encoder.encode(s, &table);
        }
        let payload = encoder.finish();

        let mut decoder = ArithDecoder::new(&payload);
        for &expected in &symbols {
            assert_eq!(decoder.decode(&table), expected);
        }
    }

    #[test]
    fn test_single_symbol() {
        let table = uniform_table(8);
        let mut encoder = ArithEncoder::new();
        encoder.encode(5, &table);
        let payload = encoder.finish();

        let mut decoder = ArithDecoder::new(&payload);
        assert_eq!(decoder.decode(&table), 5);
    }

    #[test]
    fn test_skewed_fixed_distribution() {
        let table = CumulativeTable::from_probabilities(&[0.9, 0.05, 0.03, 0.02]);
        let symbols: Vec<usize> = (0..200).map(|i| if i % 17 == 0 { i % 4 } else { 0 }).collect();

        let mut encoder = ArithEncoder::new();
        for &s in &symbols {
            encoder.encode(s, &table);
        }
        let payload = encoder.finish();

        let mut decoder = ArithDecoder::new(&payload);
        for &expected in &symbols {
            assert_eq!(decoder.decode(&table), expected);
        }
    }

    #[test]
    fn test_varying_distributions() {
        // Encoder and decoder observe the same per-step distribution sequence.
        let mut state = 0x1234_5678u64;
        let mut next_probs = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let n = 2 + (state >> 59) as usize % 7;
            let probs: Vec<f32> = (0..n)
                .map(|i| ((state >> (i * 5)) & 0x1F) as f32 + 1.0)
                .collect();
            let sum: f32 = probs.iter().sum();
            probs.into_iter().map(|p| p / sum).collect::<Vec<f32>>()
        };

        let mut enc_probs = Vec::new();
        let mut symbols = Vec::new();
        let mut encoder = ArithEncoder::new();
        for step in 0..500 {
            let probs = next_probs();
            let table = CumulativeTable::from_probabilities(&probs);
            let symbol = step * 7 % probs.len();
            encoder.encode(symbol, &table);
            enc_probs.push(probs);
            symbols.push(symbol);
        }
        let payload = encoder.finish();

        let mut decoder = ArithDecoder::new(&payload);
        for (probs, &expected) in enc_probs.iter().zip(&symbols) {
            let table = CumulativeTable::from_probabilities(probs);
            assert_eq!(decoder.decode(&table), expected);
        }
    }

    #[test]
    fn test_large_alphabet_roundtrip() {
        let v = 50_000usize;
        let probs: Vec<f32> = (0..v).map(|i| ((i % 251) as f32 + 1.0)).collect();
        let sum: f32 = probs.iter().sum();
        let probs: Vec<f32> = probs.into_iter().map(|p| p / sum).collect();
        let table = CumulativeTable::from_probabilities(&probs);

        let symbols = [0usize, 49_999, 25_000, 1, 40_271, 13];
        let mut encoder = ArithEncoder::new();
        for &s in &symbols {
            encoder.encode(s, &table);
        }
        let payload = encoder.finish();

        let mut decoder = ArithDecoder::new(&payload);
        for &expected in &symbols {
            assert_eq!(decoder.decode(&table), expected);
        }
    }

    #[test]
    fn test_output_length_approaches_entropy() {
        // Stationary source with H = 1.75 bits/symbol.
        let probs = [0.5f32, 0.25, 0.25 / 2.0, 0.25 / 2.0];
        let entropy = 1.75f64;
        let table = CumulativeTable::from_probabilities(&probs);

        let n = 4000usize;
        let mut state = 0xDEADBEEFu64;
        let mut symbols = Vec::with_capacity(n);
        for _ in 0..n {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let u = (state >> 40) as f64 / (1u64 << 24) as f64;
            let symbol = if u < 0.5 {
                0
            } else if u < 0.75 {
                1
            } else if u < 0.875 {
                2
            } else {
                3
            };
            symbols.push(symbol);
        }

        let mut encoder = ArithEncoder::new();
        for &s in &symbols {
            encoder.encode(s, &table);
        }
        let payload = encoder.finish();

        let bits_per_symbol = payload.len() as f64 * 8.0 / n as f64;
        assert!(
            bits_per_symbol < entropy * 1.1,
            "bits/symbol {bits_per_symbol:.4} exceeds 1.1x entropy {entropy}"
        );

        let mut decoder = ArithDecoder::new(&payload);
        for &expected in &symbols {
            assert_eq!(decoder.decode(&table), expected);
        }
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_symbol_panics() {
        let table = uniform_table(4);
        let mut encoder = ArithEncoder::new();
        encoder.encode(4, &table);
    }
}
