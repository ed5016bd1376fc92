//! Plane reader: parses the wire format in lock-step with the writer and
//! reconstructs the matrix.
//!
//! The reader derives everything the writer derived from its inputs — tile
//! geometry, which tiles are fully masked, chaos bin sequence — from the
//! same parameters and mask predicate, so only filter choices, coder tables
//! and residuals travel on the wire. Masked cells decode to 0 and are
//! unconstrained; predictions read the reconstructed matrix, which matches
//! the writer's normalized input at every position a predictor can touch.

use std::io;

use crate::bitio::{check_desync_cell, check_desync_table, BitSource};
use crate::chaos::ChaosModel;
use crate::error::MonoError;
use crate::format::{
    CHAOS_COUNT_BITS, FILTER_INDEX_BITS, MASK_TILE, MAX_CHAOS_LEVELS, MAX_FILTERS, MAX_PALETTE,
    NORMAL_COUNT_BITS, RF_PREV, SF_COUNT, SF_FIXED, SYMPAL_COUNT_BITS, SYMPAL_VALUE_BITS,
    TODO_TILE,
};
use crate::huffman::SymbolDecoder;
use crate::params::Parameters;
use crate::predictors::MONO_FILTERS;

/// `(residual + prediction) mod num_syms`, both operands already in range.
#[inline]
fn unresidual(residual: u8, prediction: u8, num_syms: usize) -> u8 {
    let mut v = residual as usize + prediction as usize;
    if v >= num_syms {
        v -= num_syms;
    }
    v as u8
}

fn bad_stream(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, what.to_string())
}

/// How tile filter ids arrive: from a whole recursive coder over the tile
/// map, or from per-row filters at this depth.
enum FilterChannel {
    Pending,
    Recursive(Box<MonoReader>),
    RowFilters(SymbolDecoder),
}

pub struct MonoReader {
    params: Parameters,
    mask: Vec<bool>,
    data: Vec<u8>,
    tile_bits: u32,
    tile_size: usize,
    tiles_x: usize,
    tiles_y: usize,
    tile_mask: Vec<bool>,
    tiles: Vec<u8>,
    sympal: Vec<u8>,
    filter_ids: Vec<u8>,
    normal_filter_count: usize,
    filter_count: usize,
    chaos: ChaosModel,
    decoders: Vec<SymbolDecoder>,
    filter_channel: FilterChannel,
    row_filter_cur: u8,
    prev_filter: u8,
    tile_seen: Vec<bool>,
    // State-machine tracking; only consulted by debug assertions.
    tables_read: bool,
    cur_row: Option<usize>,
    next_x: usize,
}

impl MonoReader {
    pub fn new<F>(params: &Parameters, mask: F) -> Result<Self, MonoError>
    where
        F: Fn(usize, usize) -> bool,
    {
        let mut mask_vec: Vec<bool> = Vec::with_capacity(params.size_x * params.size_y);
        for y in 0..params.size_y {
            for x in 0..params.size_x {
                mask_vec.push(mask(x, y));
            }
        }
        Self::from_parts(params.clone(), mask_vec)
    }

    fn from_parts(params: Parameters, mask: Vec<bool>) -> Result<Self, MonoError> {
        params.validate(params.size_x * params.size_y)?;
        let cells = params.size_x * params.size_y;
        let chaos = ChaosModel::new(1, params.size_x);
        Ok(MonoReader {
            params,
            mask,
            data: vec![0; cells],
            tile_bits: 0,
            tile_size: 1,
            tiles_x: 0,
            tiles_y: 0,
            tile_mask: Vec::new(),
            tiles: Vec::new(),
            sympal: Vec::new(),
            filter_ids: Vec::new(),
            normal_filter_count: 0,
            filter_count: 0,
            chaos,
            decoders: Vec::new(),
            filter_channel: FilterChannel::Pending,
            row_filter_cur: 0,
            prev_filter: 0,
            tile_seen: Vec::new(),
            tables_read: false,
            cur_row: None,
            next_x: 0,
        })
    }

    /// The reconstructed matrix; masked cells are 0.
    pub fn matrix(&self) -> &[u8] {
        &self.data
    }

    pub fn into_matrix(self) -> Vec<u8> {
        self.data
    }

    pub fn read_tables<R: BitSource>(&mut self, src: &mut R) -> io::Result<()> {
        let field = self.params.tile_bits_field_width();
        self.tile_bits = self.params.min_bits
            + if field > 0 {
                src.read_bits(field)?
            } else {
                0
            };
        if self.tile_bits > self.params.max_bits {
            return Err(bad_stream("tile bits above configured maximum"));
        }
        self.tile_size = 1usize << self.tile_bits;
        self.tiles_x = (self.params.size_x + self.tile_size - 1) >> self.tile_bits;
        self.tiles_y = (self.params.size_y + self.tile_size - 1) >> self.tile_bits;
        self.derive_tile_mask();
        check_desync_table(src)?;

        let sympal_count = src.read_bits(SYMPAL_COUNT_BITS)? as usize;
        if sympal_count > MAX_PALETTE {
            return Err(bad_stream("sympal count above palette bound"));
        }
        self.sympal.clear();
        for _ in 0..sympal_count {
            let value = src.read_bits(SYMPAL_VALUE_BITS)? as u8;
            if value as usize >= self.params.num_syms {
                return Err(bad_stream("sympal value outside alphabet"));
            }
            self.sympal.push(value);
        }
        check_desync_table(src)?;

        self.normal_filter_count = SF_FIXED + src.read_bits(NORMAL_COUNT_BITS)? as usize;
        if self.normal_filter_count > SF_COUNT {
            return Err(bad_stream("normal filter count above catalog size"));
        }
        self.filter_count = self.normal_filter_count + sympal_count;
        if self.filter_count > MAX_FILTERS {
            return Err(bad_stream("filter count above bound"));
        }
        self.filter_ids = (0..SF_FIXED as u8).collect();
        for _ in SF_FIXED..self.normal_filter_count {
            let id = src.read_bits(FILTER_INDEX_BITS)? as u8;
            if id as usize >= SF_COUNT {
                return Err(bad_stream("predictor id outside catalog"));
            }
            self.filter_ids.push(id);
        }
        check_desync_table(src)?;

        let chaos_bins = src.read_bits(CHAOS_COUNT_BITS)? as usize + 1;
        if chaos_bins > MAX_CHAOS_LEVELS {
            return Err(bad_stream("chaos bin count above bound"));
        }
        check_desync_table(src)?;

        self.decoders.clear();
        for _ in 0..chaos_bins {
            self.decoders
                .push(SymbolDecoder::read_tables(self.params.num_syms, src)?);
        }
        check_desync_table(src)?;

        self.filter_channel = if src.read_bit()? == 1 {
            let mut inner_params = self.params.clone();
            inner_params.size_x = self.tiles_x;
            inner_params.size_y = self.tiles_y;
            inner_params.num_syms = self.filter_count;
            let mut inner = MonoReader::from_parts(inner_params, self.tile_mask.clone())
                .map_err(|e| bad_stream(&format!("recursive header: {}", e)))?;
            inner.read_tables(src)?;
            FilterChannel::Recursive(Box::new(inner))
        } else {
            FilterChannel::RowFilters(SymbolDecoder::read_tables(self.filter_count, src)?)
        };
        check_desync_table(src)?;

        self.chaos = ChaosModel::new(chaos_bins, self.params.size_x);
        self.chaos.start();
        self.tile_seen = vec![false; self.tiles_x];
        self.prev_filter = 0;
        self.tables_read = true;
        self.cur_row = None;
        self.next_x = 0;
        Ok(())
    }

    /// Which tiles hold no unmasked cell; their ids never travel.
    fn derive_tile_mask(&mut self) {
        let w = self.params.size_x;
        self.tile_mask = vec![false; self.tiles_x * self.tiles_y];
        self.tiles = vec![TODO_TILE; self.tiles_x * self.tiles_y];
        for ty in 0..self.tiles_y {
            for tx in 0..self.tiles_x {
                let x0 = tx << self.tile_bits;
                let y0 = ty << self.tile_bits;
                let x1 = (x0 + self.tile_size).min(self.params.size_x);
                let y1 = (y0 + self.tile_size).min(self.params.size_y);
                let live = (y0..y1).any(|y| (x0..x1).any(|x| !self.mask[y * w + x]));
                if !live {
                    self.tile_mask[ty * self.tiles_x + tx] = true;
                    self.tiles[ty * self.tiles_x + tx] = MASK_TILE;
                }
            }
        }
    }

    pub fn read_row_header<R: BitSource>(&mut self, y: usize, src: &mut R) -> io::Result<()> {
        debug_assert!(self.tables_read, "read_tables must precede rows");
        debug_assert_eq!(y, self.cur_row.map_or(0, |r| r + 1), "rows out of order");
        self.cur_row = Some(y);
        self.next_x = 0;

        self.chaos.start_row();
        if y & (self.tile_size - 1) == 0 {
            self.tile_seen.fill(false);
            let ty = y >> self.tile_bits;
            match &mut self.filter_channel {
                FilterChannel::Recursive(inner) => inner.read_row_header(ty, src)?,
                FilterChannel::RowFilters(_) => {
                    self.row_filter_cur = src.read_bit()?;
                    self.prev_filter = 0;
                }
                FilterChannel::Pending => {
                    debug_assert!(false, "row header before tables");
                }
            }
        }
        check_desync_cell(0, y, src)
    }

    /// Decode cell `(x, y)`. Masked cells consume no payload and return 0.
    pub fn read<R: BitSource>(&mut self, x: usize, y: usize, src: &mut R) -> io::Result<u8> {
        debug_assert_eq!(self.cur_row, Some(y), "row header must precede cells");
        debug_assert!(x >= self.next_x, "cells out of order within row");
        self.next_x = x + 1;

        let w = self.params.size_x;
        let num_syms = self.params.num_syms;
        let tx = x >> self.tile_bits;
        let ty = y >> self.tile_bits;

        if !self.tile_seen[tx] {
            self.tile_seen[tx] = true;
            let ti = ty * self.tiles_x + tx;
            match &mut self.filter_channel {
                FilterChannel::Recursive(inner) => {
                    let f = inner.read(tx, ty, src)?;
                    if !self.tile_mask[ti] {
                        self.tiles[ti] = f;
                    }
                }
                FilterChannel::RowFilters(decoder) => {
                    if !self.tile_mask[ti] {
                        let rf = decoder.read(src)?;
                        let f = if self.row_filter_cur == RF_PREV {
                            let f = unresidual(rf, self.prev_filter, self.filter_count);
                            self.prev_filter = f;
                            f
                        } else {
                            rf
                        };
                        self.tiles[ti] = f;
                    }
                }
                FilterChannel::Pending => {
                    debug_assert!(false, "cell read before tables");
                }
            }
            check_desync_cell(x, y, src)?;
        }

        if self.mask[y * w + x] {
            self.chaos.zero(x);
            return Ok(0);
        }

        let f = self.tiles[ty * self.tiles_x + tx] as usize;
        debug_assert!(f != MASK_TILE as usize, "unmasked cell in a mask tile");
        if f >= self.normal_filter_count {
            let value = self.sympal[f - self.normal_filter_count];
            self.data[y * w + x] = value;
            self.chaos.zero(x);
            return Ok(value);
        }

        let bin = self.chaos.get(x);
        let residual = self.decoders[bin].read(src)?;
        self.chaos.store(x, residual, num_syms);
        let filter = &MONO_FILTERS[self.filter_ids[f] as usize];
        let prediction = (filter.safe)(&self.data, w, x, y, (num_syms - 1) as u8);
        let value = unresidual(residual, prediction, num_syms);
        self.data[y * w + x] = value;
        check_desync_cell(x, y, src)?;
        Ok(value)
    }
}
