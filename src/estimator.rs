//! Histogram entropy estimator.
//!
//! Scores candidate residual blocks during filter design. The cost of a
//! block is an integer approximation of `-sum(log2 P(sym))` under the
//! *current* histogram (the block itself is not folded in), with Laplace
//! smoothing so unseen symbols stay finite. All arithmetic is fixed-point
//! (1/256 bit units) so comparisons are deterministic across platforms; the
//! returned value is whole bits.

const NUM_SLOTS: usize = 256;
const LOG2_SHIFT: u32 = 8;

/// Fractional lookup for `log2(1 + m/256) * 256`, built at compile time by
/// the repeated-squaring method in 16.16 fixed point.
const LOG2_FRAC: [u16; 256] = build_log2_frac();

const fn build_log2_frac() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut m = 0usize;
    while m < 256 {
        // Mantissa in 16.16 fixed point, range [1, 2).
        let mut x: u64 = ((256 + m as u64) << 16) >> 8;
        let mut frac: u16 = 0;
        let mut i = 0;
        while i < 8 {
            x = (x * x) >> 16;
            frac <<= 1;
            if x >= 2 << 16 {
                frac |= 1;
                x >>= 1;
            }
            i += 1;
        }
        table[m] = frac;
        m += 1;
    }
    table
}

/// `log2(v) * 256` for `v >= 1`, exact in the exponent and interpolated to
/// 8 fractional bits in the mantissa.
#[inline]
fn log2_fixed(v: u32) -> u32 {
    debug_assert!(v >= 1);
    let e = 31 - v.leading_zeros();
    let mantissa = if e > 8 {
        (v >> (e - 8)) & 0xFF
    } else {
        (v << (8 - e)) & 0xFF
    };
    (e << LOG2_SHIFT) + LOG2_FRAC[mantissa as usize] as u32
}

pub struct EntropyEstimator {
    hist: [u32; NUM_SLOTS],
    total: u32,
}

impl EntropyEstimator {
    pub fn new() -> Self {
        EntropyEstimator {
            hist: [0; NUM_SLOTS],
            total: 0,
        }
    }

    pub fn reset(&mut self) {
        self.hist = [0; NUM_SLOTS];
        self.total = 0;
    }

    pub fn add(&mut self, block: &[u8]) {
        for &sym in block {
            self.hist[sym as usize] += 1;
        }
        self.total += block.len() as u32;
    }

    pub fn add_single(&mut self, sym: u8) {
        self.hist[sym as usize] += 1;
        self.total += 1;
    }

    /// Inverse of `add`. The block must have been added before.
    pub fn subtract(&mut self, block: &[u8]) {
        for &sym in block {
            debug_assert!(self.hist[sym as usize] > 0);
            self.hist[sym as usize] -= 1;
        }
        debug_assert!(self.total >= block.len() as u32);
        self.total -= block.len() as u32;
    }

    /// Estimated bits to code `block` under the current distribution.
    pub fn entropy(&self, block: &[u8]) -> u32 {
        let denom = log2_fixed(self.total + NUM_SLOTS as u32) as u64;
        let mut acc: u64 = 0;
        for &sym in block {
            acc += denom - log2_fixed(self.hist[sym as usize] + 1) as u64;
        }
        (acc >> LOG2_SHIFT) as u32
    }

    /// Estimated bits to code everything accumulated so far.
    pub fn entropy_overall(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        let denom = log2_fixed(self.total) as u64;
        let mut acc: u64 = 0;
        for &count in self.hist.iter() {
            if count > 0 {
                acc += count as u64 * (denom - log2_fixed(count) as u64);
            }
        }
        (acc >> LOG2_SHIFT) as u32
    }
}

impl Default for EntropyEstimator {
    fn default() -> Self {
        Self::new()
    }
}
