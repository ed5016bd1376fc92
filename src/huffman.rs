//! Canonical Huffman entropy coder.
//!
//! The coder primitive behind each chaos bin and the row-filter stream:
//! histogram in, length-limited canonical code out. Tables travel as
//! `num_syms` 4-bit code lengths (0 = symbol absent); both sides derive the
//! same codebook by assigning canonical codes in (length, symbol) order, so
//! nothing else needs to be transmitted.
//!
//! Contract (shared with any replacement coder): `add` during histogram
//! building, `finalize` once, then any number of `simulate`/`write` calls
//! interleaved with `reset` per output pass. `simulate` returns exactly the
//! bits `write` would emit.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::io;

use crate::bitio::{BitSink, BitSource};

pub const MAX_CODE_LEN: u32 = 15;
const LENGTH_FIELD_BITS: u32 = 4;

#[derive(Debug)]
pub struct SymbolEncoder {
    num_syms: usize,
    hist: Vec<u32>,
    lengths: Vec<u8>,
    codes: Vec<u32>,
}

impl SymbolEncoder {
    pub fn new(num_syms: usize) -> Self {
        debug_assert!((1..=256).contains(&num_syms));
        SymbolEncoder {
            num_syms,
            hist: vec![0; num_syms],
            lengths: vec![0; num_syms],
            codes: vec![0; num_syms],
        }
    }

    pub fn num_syms(&self) -> usize {
        self.num_syms
    }

    pub fn add(&mut self, sym: u8) {
        self.hist[sym as usize] += 1;
    }

    /// Build the length-limited canonical code from the histogram.
    pub fn finalize(&mut self) {
        let mut lengths = assign_code_lengths(&self.hist);
        limit_code_lengths(&mut lengths);
        self.codes = canonical_codes(&lengths);
        self.lengths = lengths;
    }

    /// Bits `write` would emit for `sym`.
    pub fn simulate(&self, sym: u8) -> u32 {
        let len = self.lengths[sym as usize] as u32;
        debug_assert!(len > 0, "symbol {} was never added", sym);
        len
    }

    /// Emit the code-length table. Returns bits written.
    pub fn write_tables<S: BitSink>(&self, sink: &mut S) -> io::Result<u32> {
        for &len in &self.lengths {
            sink.write_bits(len as u32, LENGTH_FIELD_BITS)?;
        }
        Ok(LENGTH_FIELD_BITS * self.num_syms as u32)
    }

    /// Emit one symbol. Returns bits written.
    pub fn write<S: BitSink>(&self, sym: u8, sink: &mut S) -> io::Result<u32> {
        let len = self.lengths[sym as usize] as u32;
        debug_assert!(len > 0, "symbol {} was never added", sym);
        sink.write_bits(self.codes[sym as usize], len)?;
        Ok(len)
    }

    /// Start a fresh output pass. Canonical Huffman carries no inter-symbol
    /// stream state, so this only exists to satisfy the coder contract.
    pub fn reset(&mut self) {}
}

/// Huffman tree depths from a histogram. Zero-count symbols get length 0;
/// a lone symbol gets length 1.
fn assign_code_lengths(hist: &[u32]) -> Vec<u8> {
    let mut lengths = vec![0u8; hist.len()];
    let present: Vec<usize> = (0..hist.len()).filter(|&s| hist[s] > 0).collect();

    match present.len() {
        0 => return lengths,
        1 => {
            lengths[present[0]] = 1;
            return lengths;
        }
        _ => {}
    }

    let mut node_freq: Vec<u64> = Vec::with_capacity(2 * present.len());
    let mut children: Vec<Option<(usize, usize)>> = Vec::with_capacity(2 * present.len());

    for &sym in &present {
        node_freq.push(hist[sym] as u64);
        children.push(None);
    }

    // Tie-break on node id keeps tree construction deterministic: leaves are
    // numbered in symbol order, internal nodes in creation order.
    let mut heap: BinaryHeap<(Reverse<u64>, Reverse<usize>)> = (0..present.len())
        .map(|id| (Reverse(node_freq[id]), Reverse(id)))
        .collect();

    while heap.len() > 1 {
        let (Reverse(f1), Reverse(id1)) = heap.pop().expect("heap len checked");
        let (Reverse(f2), Reverse(id2)) = heap.pop().expect("heap len checked");
        let parent = node_freq.len();
        node_freq.push(f1 + f2);
        children.push(Some((id1, id2)));
        heap.push((Reverse(f1 + f2), Reverse(parent)));
    }

    let root = heap.pop().expect("non-empty tree").1 .0;
    let mut stack: Vec<(usize, u8)> = vec![(root, 0)];
    while let Some((node, depth)) = stack.pop() {
        match children[node] {
            Some((l, r)) => {
                stack.push((l, depth + 1));
                stack.push((r, depth + 1));
            }
            None => lengths[present[node]] = depth.max(1),
        }
    }
    lengths
}

/// Clamp lengths to `MAX_CODE_LEN` and repair the Kraft sum by lengthening
/// the shortest codes (smallest length, then smallest symbol) until the code
/// is a valid prefix code again.
fn limit_code_lengths(lengths: &mut [u8]) {
    let cap = MAX_CODE_LEN as u8;
    for len in lengths.iter_mut() {
        if *len > cap {
            *len = cap;
        }
    }

    let kraft = |lengths: &[u8]| -> u64 {
        lengths
            .iter()
            .filter(|&&l| l > 0)
            .map(|&l| 1u64 << (cap - l))
            .sum()
    };

    let mut excess = kraft(lengths);
    let budget = 1u64 << cap;
    while excess > budget {
        // Lengthening the shortest code sheds the most Kraft mass per step.
        let mut pick: Option<(u8, usize)> = None;
        for (sym, &len) in lengths.iter().enumerate() {
            if len > 0 && len < cap && pick.map_or(true, |p| (len, sym) < p) {
                pick = Some((len, sym));
            }
        }
        let (len, sym) = pick.expect("kraft excess implies a lengthenable code");
        lengths[sym] = len + 1;
        excess -= 1u64 << (cap - len - 1);
    }
}

/// Canonical code assignment in (length, symbol) order.
fn canonical_codes(lengths: &[u8]) -> Vec<u32> {
    let mut order: Vec<usize> = (0..lengths.len()).filter(|&s| lengths[s] > 0).collect();
    order.sort_by_key(|&s| (lengths[s], s));

    let mut codes = vec![0u32; lengths.len()];
    let mut code = 0u32;
    let mut prev_len = 0u8;
    for sym in order {
        let len = lengths[sym];
        if prev_len > 0 {
            code = (code + 1) << (len - prev_len);
        }
        codes[sym] = code;
        prev_len = len;
    }
    codes
}

pub struct SymbolDecoder {
    dtable: HashMap<(u32, u32), u8>,
    max_len: u32,
}

impl SymbolDecoder {
    /// Parse a code-length table and rebuild the canonical codebook.
    pub fn read_tables<R: BitSource>(num_syms: usize, src: &mut R) -> io::Result<Self> {
        let mut lengths = vec![0u8; num_syms];
        for len in lengths.iter_mut() {
            *len = src.read_bits(LENGTH_FIELD_BITS)? as u8;
        }
        let codes = canonical_codes(&lengths);
        let mut dtable = HashMap::new();
        let mut max_len = 0u32;
        for sym in 0..num_syms {
            let len = lengths[sym] as u32;
            if len > 0 {
                dtable.insert((codes[sym], len), sym as u8);
                max_len = max_len.max(len);
            }
        }
        Ok(SymbolDecoder { dtable, max_len })
    }

    /// Read one symbol, walking the stream bit by bit.
    pub fn read<R: BitSource>(&self, src: &mut R) -> io::Result<u8> {
        let mut code = 0u32;
        for len in 1..=self.max_len {
            code = (code << 1) | src.read_bit()? as u32;
            if let Some(&sym) = self.dtable.get(&(code, len)) {
                return Ok(sym);
            }
        }
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no symbol within {} code bits", self.max_len),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitio::{CountingSink, SliceSource, VecSink};

    fn roundtrip(stream: &[u8], num_syms: usize) {
        let mut enc = SymbolEncoder::new(num_syms);
        for &sym in stream {
            enc.add(sym);
        }
        enc.finalize();

        let mut sink = VecSink::new();
        enc.write_tables(&mut sink).unwrap();
        let mut emitted = 0;
        for &sym in stream {
            assert_eq!(enc.simulate(sym), enc.write(sym, &mut sink).unwrap());
            emitted += enc.simulate(sym) as u64;
        }
        assert_eq!(
            sink.bit_count(),
            LENGTH_FIELD_BITS as u64 * num_syms as u64 + emitted
        );
        let bytes = sink.into_bytes().unwrap();

        let mut src = SliceSource::new(&bytes);
        let dec = SymbolDecoder::read_tables(num_syms, &mut src).unwrap();
        for &sym in stream {
            assert_eq!(dec.read(&mut src).unwrap(), sym);
        }
    }

    #[test]
    fn roundtrip_mixed_stream() {
        let stream: Vec<u8> = (0..4000u32)
            .map(|i| (i.wrapping_mul(2654435761) >> 24) as u8 % 37)
            .collect();
        roundtrip(&stream, 64);
    }

    #[test]
    fn roundtrip_single_symbol() {
        roundtrip(&[9u8; 50], 16);
    }

    #[test]
    fn roundtrip_two_symbols() {
        let stream: Vec<u8> = (0..100).map(|i| (i % 2) as u8).collect();
        roundtrip(&stream, 4);
    }

    #[test]
    fn skewed_histogram_respects_length_cap() {
        // Fibonacci-ish counts push the unconstrained tree past 15 levels.
        let mut enc = SymbolEncoder::new(32);
        let mut a = 1u32;
        let mut b = 1u32;
        for sym in 0..24u8 {
            for _ in 0..a {
                enc.add(sym);
            }
            let next = a.saturating_add(b);
            a = b;
            b = next;
        }
        enc.finalize();
        for sym in 0..24u8 {
            assert!(enc.simulate(sym) <= MAX_CODE_LEN);
        }
        // Still a decodable prefix code.
        let stream: Vec<u8> = (0..24u8).collect();
        let mut sink = VecSink::new();
        enc.write_tables(&mut sink).unwrap();
        for &sym in &stream {
            enc.write(sym, &mut sink).unwrap();
        }
        let bytes = sink.into_bytes().unwrap();
        let mut src = SliceSource::new(&bytes);
        let dec = SymbolDecoder::read_tables(32, &mut src).unwrap();
        for &sym in &stream {
            assert_eq!(dec.read(&mut src).unwrap(), sym);
        }
    }

    #[test]
    fn empty_histogram_writes_empty_table() {
        let mut enc = SymbolEncoder::new(8);
        enc.finalize();
        let mut sink = CountingSink::new();
        assert_eq!(enc.write_tables(&mut sink).unwrap(), 32);
        assert_eq!(sink.bit_count(), 32);
    }

    #[test]
    fn identical_histograms_build_identical_codes() {
        let stream: Vec<u8> = (0..500).map(|i| (i % 11) as u8).collect();
        let build = || {
            let mut enc = SymbolEncoder::new(16);
            for &sym in &stream {
                enc.add(sym);
            }
            enc.finalize();
            let mut sink = VecSink::new();
            enc.write_tables(&mut sink).unwrap();
            for &sym in &stream {
                enc.write(sym, &mut sink).unwrap();
            }
            sink.into_bytes().unwrap()
        };
        assert_eq!(build(), build());
    }
}
