//! Plane writer: tile planning, chaos design and bit emission.
//!
//! The pipeline per tile size: mark fully-masked tiles, design palette
//! filters from uniform tiles, design the spatial filter set from per-tile
//! award votes, assign a filter to every tile (with a revisit pass), execute
//! the tiles into a residual matrix, plan row filters for the tile map,
//! decide whether to recurse a whole inner coder onto the tile map instead,
//! sweep chaos-bin counts, and build one Huffman coder per bin. The outer
//! search tries ascending tile sizes and keeps the cheapest complete
//! pipeline as a value, so table emission always reflects the winner.
//!
//! `simulate()` is a real emission pass against a counting sink; the bit
//! count it returns is exactly what the byte-producing pass emits.

use std::io;

use tracing::{debug, trace};

use crate::bitio::{desync_cell, desync_table, BitSink, CountingSink};
use crate::chaos::{residual_score, ChaosModel};
use crate::error::MonoError;
use crate::estimator::EntropyEstimator;
use crate::format::{
    CHAOS_COUNT_BITS, FILTER_INDEX_BITS, MASK_TILE, MAX_CHAOS_LEVELS, MAX_FILTERS, MAX_PALETTE,
    MAX_PASSES, MAX_ROW_PASSES, NORMAL_COUNT_BITS, RECURSE_THRESH_COUNT, RF_NOOP, RF_PREV,
    SF_COUNT, SF_FIXED, SYMPAL_COUNT_BITS, SYMPAL_VALUE_BITS, TODO_TILE, UNUSED_SYMPAL,
};
use crate::huffman::SymbolEncoder;
use crate::params::Parameters;
use crate::predictors::MONO_FILTERS;
use crate::scorer::FilterScorer;

/// `(value - prediction) mod num_syms`, both operands already in range.
#[inline]
pub(crate) fn residual(value: u8, prediction: u8, num_syms: usize) -> u8 {
    let mut r = value as usize + num_syms - prediction as usize;
    if r >= num_syms {
        r -= num_syms;
    }
    r as u8
}

/// Immutable per-plane inputs: parameters plus the normalized matrix (masked
/// cells read as 0 so both sides predict from identical neighborhoods).
#[derive(Debug)]
struct Context {
    params: Parameters,
    data: Vec<u8>,
    mask: Vec<bool>,
}

/// Complete pipeline state for one tile size. Built, simulated, and either
/// kept as the winner or dropped.
#[derive(Debug)]
struct Plan {
    tile_bits: u32,
    tile_size: usize,
    tiles_x: usize,
    tiles_y: usize,
    tiles_count: usize,
    tiles: Vec<u8>,
    sympal: Vec<u8>,
    filter_indices: Vec<u8>,
    normal_filter_count: usize,
    filter_count: usize,
    residuals: Vec<u8>,
    row_filters: Vec<u8>,
    row_filter_entropy: u32,
    filter_encoder: Option<Box<MonoWriter>>,
    chaos: ChaosModel,
    encoders: Vec<SymbolEncoder>,
    row_filter_encoder: SymbolEncoder,
    // Emission-pass state.
    tile_seen: Vec<bool>,
    prev_filter: u8,
    // State-machine tracking; only consulted by debug assertions.
    tables_written: bool,
    cur_row: Option<usize>,
    next_x: usize,
}

#[derive(Debug)]
pub struct MonoWriter {
    ctx: Context,
    plan: Plan,
    cost: u64,
}

impl MonoWriter {
    /// Validate parameters, then run the whole pipeline including the tile
    /// size search. The returned writer is ready to emit.
    pub fn new<F>(data: &[u8], params: &Parameters, mask: F) -> Result<Self, MonoError>
    where
        F: Fn(usize, usize) -> bool,
    {
        params.validate(data.len())?;
        let mut mask_vec: Vec<bool> = Vec::with_capacity(params.size_x * params.size_y);
        for y in 0..params.size_y {
            for x in 0..params.size_x {
                mask_vec.push(mask(x, y));
            }
        }
        Self::from_parts(data.to_vec(), mask_vec, params.clone())
    }

    fn from_parts(
        mut data: Vec<u8>,
        mask: Vec<bool>,
        params: Parameters,
    ) -> Result<Self, MonoError> {
        params.validate(data.len())?;
        for (value, &masked) in data.iter_mut().zip(mask.iter()) {
            if masked {
                *value = 0;
            } else if *value as usize >= params.num_syms {
                return Err(MonoError::SymbolOutOfRange {
                    value: *value,
                    num_syms: params.num_syms,
                });
            }
        }

        let ctx = Context { params, data, mask };
        debug!(
            size_x = ctx.params.size_x,
            size_y = ctx.params.size_y,
            num_syms = ctx.params.num_syms,
            "monochrome plane processing started"
        );

        let mut best: Option<(Plan, u64)> = None;
        for bits in ctx.params.min_bits..=ctx.params.max_bits {
            let mut plan = Plan::build(&ctx, bits)?;
            let cost = plan.simulate(&ctx)?;
            debug!(bits, cost, "tile size trial");
            match &best {
                // Costs are unimodal in practice; stop at the first
                // non-improving size.
                Some((_, best_cost)) if cost >= *best_cost => break,
                _ => best = Some((plan, cost)),
            }
        }
        let (plan, cost) = best.expect("the first tile size always improves on nothing");
        debug!(
            tile_bits = plan.tile_bits,
            cost,
            filters = plan.filter_count,
            chaos_bins = plan.chaos.bin_count(),
            recursive = plan.filter_encoder.is_some(),
            "tile size chosen"
        );
        Ok(MonoWriter { ctx, plan, cost })
    }

    /// Exact bit cost of the winning configuration: tables plus every row
    /// header and cell payload.
    pub fn cost(&self) -> u64 {
        self.cost
    }

    pub fn tile_bits(&self) -> u32 {
        self.plan.tile_bits
    }

    pub fn normal_filter_count(&self) -> usize {
        self.plan.normal_filter_count
    }

    pub fn sympal_filter_count(&self) -> usize {
        self.plan.sympal.len()
    }

    pub fn chaos_bin_count(&self) -> usize {
        self.plan.chaos.bin_count()
    }

    /// True when the tile-filter map is coded by a recursive inner coder
    /// rather than per-row filters.
    pub fn recursion_chosen(&self) -> bool {
        self.plan.filter_encoder.is_some()
    }

    pub fn write_tables<S: BitSink>(&mut self, sink: &mut S) -> io::Result<()> {
        self.plan.write_tables(&self.ctx, sink)
    }

    pub fn write_row_header<S: BitSink>(&mut self, y: usize, sink: &mut S) -> io::Result<()> {
        self.plan.write_row_header(y, sink)
    }

    pub fn write<S: BitSink>(&mut self, x: usize, y: usize, sink: &mut S) -> io::Result<()> {
        self.plan.write_cell(&self.ctx, x, y, sink)
    }
}

impl Plan {
    fn build(ctx: &Context, bits: u32) -> Result<Plan, MonoError> {
        let tile_size = 1usize << bits;
        let tiles_x = (ctx.params.size_x + tile_size - 1) >> bits;
        let tiles_y = (ctx.params.size_y + tile_size - 1) >> bits;
        let tiles_count = tiles_x * tiles_y;
        debug!(
            tile_size,
            tiles_x, tiles_y, "trying tile size for input matrix"
        );

        let mut plan = Plan {
            tile_bits: bits,
            tile_size,
            tiles_x,
            tiles_y,
            tiles_count,
            tiles: vec![TODO_TILE; tiles_count],
            sympal: Vec::new(),
            filter_indices: Vec::new(),
            normal_filter_count: SF_FIXED,
            filter_count: SF_FIXED,
            residuals: vec![0; ctx.params.size_x * ctx.params.size_y],
            row_filters: vec![RF_NOOP; tiles_y],
            row_filter_entropy: 0,
            filter_encoder: None,
            chaos: ChaosModel::new(1, ctx.params.size_x),
            encoders: Vec::new(),
            row_filter_encoder: SymbolEncoder::new(SF_FIXED),
            tile_seen: vec![false; tiles_x],
            prev_filter: 0,
            tables_written: false,
            cur_row: None,
            next_x: 0,
        };

        plan.mask_tiles(ctx);
        let candidates = plan.design_palette_filters(ctx);
        let sympal_map = plan.design_filters(ctx, &candidates);
        plan.design_palette_tiles(&sympal_map);
        plan.design_tiles(ctx);
        plan.compute_residuals(ctx);
        plan.design_row_filters();
        plan.recurse_compress(ctx)?;
        plan.design_chaos(ctx);
        plan.initialize_encoders(ctx);
        Ok(plan)
    }

    /// Clipped pixel bounds of tile `(tx, ty)`.
    #[inline]
    fn tile_bounds(&self, ctx: &Context, tx: usize, ty: usize) -> (usize, usize, usize, usize) {
        let x0 = tx << self.tile_bits;
        let y0 = ty << self.tile_bits;
        let x1 = (x0 + self.tile_size).min(ctx.params.size_x);
        let y1 = (y0 + self.tile_size).min(ctx.params.size_y);
        (x0, y0, x1, y1)
    }

    #[inline]
    fn tile_of(&self, x: usize, y: usize) -> u8 {
        self.tiles[(y >> self.tile_bits) * self.tiles_x + (x >> self.tile_bits)]
    }

    // ── Stage 1: mask ────────────────────────────────────────────────────────

    fn mask_tiles(&mut self, ctx: &Context) {
        let w = ctx.params.size_x;
        for ty in 0..self.tiles_y {
            for tx in 0..self.tiles_x {
                let (x0, y0, x1, y1) = self.tile_bounds(ctx, tx, ty);
                let live = (y0..y1).any(|y| (x0..x1).any(|x| !ctx.mask[y * w + x]));
                self.tiles[ty * self.tiles_x + tx] = if live { TODO_TILE } else { MASK_TILE };
            }
        }
    }

    // ── Stage 2: palette filter candidates ───────────────────────────────────

    /// Histogram the uniform tiles; values covering more than
    /// `sympal_thresh` of the tiles become palette candidates.
    fn design_palette_filters(&mut self, ctx: &Context) -> Vec<u8> {
        let w = ctx.params.size_x;
        let mut hist = [0u32; 256];

        for ty in 0..self.tiles_y {
            for tx in 0..self.tiles_x {
                if self.tiles[ty * self.tiles_x + tx] == MASK_TILE {
                    continue;
                }
                let (x0, y0, x1, y1) = self.tile_bounds(ctx, tx, ty);
                let mut uniform = true;
                let mut value = None;
                'tile: for y in y0..y1 {
                    for x in x0..x1 {
                        if ctx.mask[y * w + x] {
                            continue;
                        }
                        let cell = ctx.data[y * w + x];
                        match value {
                            None => value = Some(cell),
                            Some(v) if v != cell => {
                                uniform = false;
                                break 'tile;
                            }
                            Some(_) => {}
                        }
                    }
                }
                if uniform {
                    if let Some(v) = value {
                        hist[v as usize] += 1;
                    }
                }
            }
        }

        let thresh = (ctx.params.sympal_thresh as f64 * self.tiles_count as f64) as u32;
        let mut candidates = Vec::new();
        for sym in 0..ctx.params.num_syms {
            if hist[sym] > thresh {
                trace!(sym, coverage = hist[sym], "palette filter candidate");
                candidates.push(sym as u8);
                if candidates.len() >= MAX_PALETTE {
                    break;
                }
            }
        }
        candidates
    }

    // ── Stage 3: filter set design ───────────────────────────────────────────

    /// Score every spatial predictor on every tile, hand out award points to
    /// each tile's ranked favorites, then pick filters by descending award
    /// until coverage or capacity is reached. Returns the map from palette
    /// candidate to chosen sympal slot.
    fn design_filters(&mut self, ctx: &Context, candidates: &[u8]) -> Vec<u8> {
        let w = ctx.params.size_x;
        let num_syms = ctx.params.num_syms;
        let max = (num_syms - 1) as u8;
        let award_count = ctx.params.awards.len().min(SF_COUNT);

        let mut scores = FilterScorer::new(SF_COUNT);
        let mut awards = FilterScorer::new(SF_COUNT + candidates.len());

        for ty in 0..self.tiles_y {
            for tx in 0..self.tiles_x {
                let ti = ty * self.tiles_x + tx;
                if self.tiles[ti] == MASK_TILE {
                    continue;
                }
                scores.reset();

                let (x0, y0, x1, y1) = self.tile_bounds(ctx, tx, ty);
                let mut uniform = true;
                let mut uniform_value = None;
                for y in y0..y1 {
                    for x in x0..x1 {
                        if ctx.mask[y * w + x] {
                            continue;
                        }
                        let value = ctx.data[y * w + x];
                        match uniform_value {
                            None => uniform_value = Some(value),
                            Some(v) if v != value => uniform = false,
                            Some(_) => {}
                        }
                        for (f, filter) in MONO_FILTERS.iter().enumerate() {
                            let prediction = (filter.safe)(&ctx.data, w, x, y, max);
                            let r = residual(value, prediction, num_syms);
                            scores.add(f, residual_score(r, num_syms) as i64);
                        }
                    }
                }

                // A uniform tile votes its palette candidate into first
                // place and remembers the preference in the tile map.
                let mut offset = 0;
                if uniform {
                    if let Some(s) = uniform_value.and_then(|v| {
                        candidates.iter().position(|&c| c == v)
                    }) {
                        awards.add(SF_COUNT + s, ctx.params.awards[0] as i64);
                        offset = 1;
                        self.tiles[ti] = (SF_COUNT + s) as u8;
                    }
                }

                let ranked = scores.get_low(award_count);
                for i in offset..award_count {
                    awards.add(ranked[i - offset].index, ctx.params.awards[i] as i64);
                }
            }
        }

        // The fixed prefix is always present.
        let mut filter_indices: Vec<u8> = (0..SF_FIXED as u8).collect();
        let examine = (ctx.params.max_filters + SF_FIXED).min(SF_COUNT);
        let coverage_thresh = (ctx.params.filter_thresh as f64 * self.tiles_count as f64) as i64;
        let award_unit = ctx.params.awards[0] as i64;

        let mut sympal_map = vec![UNUSED_SYMPAL; candidates.len()];
        let mut chosen_sympal = Vec::new();
        let mut filters_set = SF_FIXED;
        let mut coverage = 0i64;

        for entry in awards.get_top(examine) {
            if entry.score <= 0 {
                // Nothing voted for the rest.
                break;
            }
            coverage += entry.score / award_unit;

            if entry.index >= SF_FIXED {
                if entry.index >= SF_COUNT {
                    let s = entry.index - SF_COUNT;
                    sympal_map[s] = chosen_sympal.len() as u8;
                    chosen_sympal.push(candidates[s]);
                    trace!(value = candidates[s], "chose palette filter");
                } else {
                    filter_indices.push(entry.index as u8);
                    trace!(index = entry.index, "chose spatial filter");
                }
                filters_set += 1;
                if filters_set >= MAX_FILTERS {
                    break;
                }
            }
            if coverage >= coverage_thresh {
                break;
            }
        }

        self.normal_filter_count = filter_indices.len();
        self.filter_indices = filter_indices;
        self.sympal = chosen_sympal;
        self.filter_count = self.normal_filter_count + self.sympal.len();
        debug!(
            normal = self.normal_filter_count,
            sympal = self.sympal.len(),
            "filter set chosen"
        );
        sympal_map
    }

    // ── Stage 4: palette tile rewrite ────────────────────────────────────────

    /// Resolve the palette preferences recorded during filter design: tiles
    /// whose candidate survived become sympal tiles, the rest reopen.
    fn design_palette_tiles(&mut self, sympal_map: &[u8]) {
        for tile in self.tiles.iter_mut() {
            let t = *tile;
            if t == MASK_TILE || (t as usize) < SF_COUNT {
                continue;
            }
            let slot = sympal_map[t as usize - SF_COUNT];
            *tile = if slot == UNUSED_SYMPAL {
                TODO_TILE
            } else {
                (self.normal_filter_count + slot as usize) as u8
            };
        }
    }

    // ── Stage 5: tile assignment ─────────────────────────────────────────────

    /// Assign each remaining tile the filter whose residuals are cheapest
    /// under the running histogram, with a bonus for agreeing with already
    /// assigned neighbors or producing all-zero residuals. The second pass
    /// revisits assignments until the revisit budget runs out.
    fn design_tiles(&mut self, ctx: &Context) {
        let w = ctx.params.size_x;
        let num_syms = ctx.params.num_syms;
        let max = (num_syms - 1) as u8;
        let normal_count = self.normal_filter_count;
        let stride = self.tile_size * self.tile_size;

        let mut ee = EntropyEstimator::new();
        let mut codes = vec![0u8; stride * normal_count];
        let mut revisit_remaining = ctx.params.revisit_count;

        for pass in 0..MAX_PASSES {
            for ty in 0..self.tiles_y {
                for tx in 0..self.tiles_x {
                    let ti = ty * self.tiles_x + tx;
                    let current = self.tiles[ti];
                    if current as usize >= normal_count {
                        // Masked and sympal tiles are settled.
                        continue;
                    }
                    if pass > 0 {
                        if revisit_remaining == 0 {
                            debug!(pass, "revisit budget exhausted");
                            return;
                        }
                        revisit_remaining -= 1;
                    }

                    // One residual column per candidate filter.
                    let (x0, y0, x1, y1) = self.tile_bounds(ctx, tx, ty);
                    let mut count = 0;
                    for y in y0..y1 {
                        for x in x0..x1 {
                            if ctx.mask[y * w + x] {
                                continue;
                            }
                            let value = ctx.data[y * w + x];
                            for f in 0..normal_count {
                                let filter = &MONO_FILTERS[self.filter_indices[f] as usize];
                                let prediction = (filter.safe)(&ctx.data, w, x, y, max);
                                codes[f * stride + count] = residual(value, prediction, num_syms);
                            }
                            count += 1;
                        }
                    }
                    debug_assert!(count > 0, "non-mask tile must hold an unmasked cell");

                    if pass > 0 {
                        let old = current as usize;
                        ee.subtract(&codes[old * stride..old * stride + count]);
                    }

                    let left = if tx > 0 { self.tiles[ti - 1] } else { MASK_TILE };
                    let up = if ty > 0 {
                        self.tiles[ti - self.tiles_x]
                    } else {
                        MASK_TILE
                    };
                    let up_left = if tx > 0 && ty > 0 {
                        self.tiles[ti - self.tiles_x - 1]
                    } else {
                        MASK_TILE
                    };
                    let up_right = if ty > 0 && tx + 1 < self.tiles_x {
                        self.tiles[ti - self.tiles_x + 1]
                    } else {
                        MASK_TILE
                    };

                    let mut best_filter = 0;
                    let mut best_score = i64::MAX;
                    for f in 0..normal_count {
                        let column = &codes[f * stride..f * stride + count];
                        let mut score = ee.entropy(column) as i64;
                        if column.iter().all(|&r| r == 0) {
                            score -= 1;
                        }
                        for neighbor in [left, up, up_left, up_right] {
                            if neighbor as usize == f {
                                score -= 1;
                            }
                        }
                        if score < best_score {
                            best_score = score;
                            best_filter = f;
                        }
                    }

                    self.tiles[ti] = best_filter as u8;
                    ee.add(&codes[best_filter * stride..best_filter * stride + count]);
                }
            }
            trace!(pass, revisit_remaining, "tile assignment pass complete");
        }
    }

    // ── Stage 6: residual execution ──────────────────────────────────────────

    fn compute_residuals(&mut self, ctx: &Context) {
        let w = ctx.params.size_x;
        let num_syms = ctx.params.num_syms;
        let max = (num_syms - 1) as u8;

        for ty in 0..self.tiles_y {
            for tx in 0..self.tiles_x {
                let f = self.tiles[ty * self.tiles_x + tx] as usize;
                if f >= self.normal_filter_count {
                    continue;
                }
                let filter = &MONO_FILTERS[self.filter_indices[f] as usize];
                let (x0, y0, x1, y1) = self.tile_bounds(ctx, tx, ty);
                for y in y0..y1 {
                    for x in x0..x1 {
                        if ctx.mask[y * w + x] {
                            continue;
                        }
                        let prediction = (filter.safe)(&ctx.data, w, x, y, max);
                        self.residuals[y * w + x] =
                            residual(ctx.data[y * w + x], prediction, num_syms);
                    }
                }
            }
        }
    }

    // ── Stage 7: row filters for the tile map ────────────────────────────────

    /// Choose verbatim or difference-from-previous transmission per tile
    /// row, scoring both against a shared histogram over two passes.
    fn design_row_filters(&mut self) {
        let f_count = self.filter_count;
        let mut ee = EntropyEstimator::new();
        let mut noop = vec![0u8; self.tiles_x];
        let mut diff = vec![0u8; self.tiles_x];
        let mut total = 0u32;

        for pass in 0..MAX_ROW_PASSES {
            total = 0;
            for ty in 0..self.tiles_y {
                let mut prev = 0u8;
                let mut count = 0;
                for tx in 0..self.tiles_x {
                    let f = self.tiles[ty * self.tiles_x + tx];
                    if f == MASK_TILE {
                        continue;
                    }
                    noop[count] = f;
                    diff[count] = residual(f, prev, f_count);
                    prev = f;
                    count += 1;
                }

                if pass > 0 {
                    let old = if self.row_filters[ty] == RF_NOOP {
                        &noop[..count]
                    } else {
                        &diff[..count]
                    };
                    ee.subtract(old);
                }

                let e_noop = ee.entropy(&noop[..count]);
                let e_diff = ee.entropy(&diff[..count]);
                let (best_e, best_rf) = if e_diff < e_noop {
                    (e_diff, RF_PREV)
                } else {
                    (e_noop, RF_NOOP)
                };
                self.row_filters[ty] = best_rf;
                // One selector bit per row plus its payload estimate.
                total += 1 + best_e;
                ee.add(if best_rf == RF_NOOP {
                    &noop[..count]
                } else {
                    &diff[..count]
                });
            }
        }
        self.row_filter_entropy = total;
        trace!(bits = total, "row filter plan");
    }

    // ── Stage 8: recursion decision ──────────────────────────────────────────

    /// Compress the tile map with a whole inner coder; keep it only when it
    /// beats the row-filter estimate.
    fn recurse_compress(&mut self, ctx: &Context) -> Result<(), MonoError> {
        if self.tiles_count < RECURSE_THRESH_COUNT {
            trace!(tiles = self.tiles_count, "below recursion threshold");
            return Ok(());
        }

        let mut inner_params = ctx.params.clone();
        inner_params.size_x = self.tiles_x;
        inner_params.size_y = self.tiles_y;
        inner_params.num_syms = self.filter_count;
        let inner_mask: Vec<bool> = self.tiles.iter().map(|&t| t == MASK_TILE).collect();

        let inner = MonoWriter::from_parts(self.tiles.clone(), inner_mask, inner_params)?;
        let recurse_cost = inner.cost();
        if recurse_cost <= self.row_filter_entropy as u64 {
            debug!(
                recurse_cost,
                row_bits = self.row_filter_entropy,
                "recursive filter coder wins"
            );
            self.filter_encoder = Some(Box::new(inner));
        } else {
            debug!(
                recurse_cost,
                row_bits = self.row_filter_entropy,
                "row filters win over recursion"
            );
        }
        Ok(())
    }

    // ── Stage 9: chaos design ────────────────────────────────────────────────

    /// Sweep bin counts; each candidate pays an amortized table penalty on
    /// top of the per-bin histogram entropy.
    fn design_chaos(&mut self, ctx: &Context) {
        let w = ctx.params.size_x;
        let num_syms = ctx.params.num_syms;
        let mut best_cost = u64::MAX;
        let mut best_levels = 1;

        for levels in 1..MAX_CHAOS_LEVELS {
            let mut chaos = ChaosModel::new(levels, w);
            let mut bins: Vec<EntropyEstimator> =
                (0..levels).map(|_| EntropyEstimator::new()).collect();

            chaos.start();
            for y in 0..ctx.params.size_y {
                chaos.start_row();
                for x in 0..w {
                    let f = self.tile_of(x, y) as usize;
                    if ctx.mask[y * w + x] || f >= self.normal_filter_count {
                        chaos.zero(x);
                    } else {
                        let r = self.residuals[y * w + x];
                        let bin = chaos.get(x);
                        chaos.store(x, r, num_syms);
                        bins[bin].add_single(r);
                    }
                }
            }

            let mut cost = levels as u64 * 5 * num_syms as u64;
            for bin in &bins {
                cost += bin.entropy_overall() as u64;
            }
            if cost < best_cost {
                best_cost = cost;
                best_levels = levels;
            }
        }

        trace!(levels = best_levels, "chaos level sweep done");
        self.chaos = ChaosModel::new(best_levels, ctx.params.size_x);
    }

    // ── Stage 10: coder initialization ───────────────────────────────────────

    /// Replay the emission sweep to histogram every symbol into the coder
    /// that will carry it, then freeze the codes.
    fn initialize_encoders(&mut self, ctx: &Context) {
        let w = ctx.params.size_x;
        let num_syms = ctx.params.num_syms;

        self.encoders = (0..self.chaos.bin_count())
            .map(|_| SymbolEncoder::new(num_syms))
            .collect();
        self.chaos.start();
        for y in 0..ctx.params.size_y {
            self.chaos.start_row();
            for x in 0..w {
                let f = self.tile_of(x, y) as usize;
                if ctx.mask[y * w + x] || f >= self.normal_filter_count {
                    self.chaos.zero(x);
                } else {
                    let r = self.residuals[y * w + x];
                    let bin = self.chaos.get(x);
                    self.chaos.store(x, r, num_syms);
                    self.encoders[bin].add(r);
                }
            }
        }
        for encoder in self.encoders.iter_mut() {
            encoder.finalize();
        }

        self.row_filter_encoder = SymbolEncoder::new(self.filter_count);
        if self.filter_encoder.is_none() {
            for ty in 0..self.tiles_y {
                let rf_mode = self.row_filters[ty];
                let mut prev = 0u8;
                for tx in 0..self.tiles_x {
                    let f = self.tiles[ty * self.tiles_x + tx];
                    if f == MASK_TILE {
                        continue;
                    }
                    let rf = if rf_mode == RF_PREV {
                        let r = residual(f, prev, self.filter_count);
                        prev = f;
                        r
                    } else {
                        f
                    };
                    self.row_filter_encoder.add(rf);
                }
            }
            self.row_filter_encoder.finalize();
        }
    }

    // ── Emission ─────────────────────────────────────────────────────────────

    /// Reset every per-pass bit of state, recursively.
    fn initialize_writer(&mut self) {
        self.chaos.start();
        self.tile_seen.fill(false);
        self.prev_filter = 0;
        self.row_filter_encoder.reset();
        for encoder in self.encoders.iter_mut() {
            encoder.reset();
        }
        if let Some(inner) = self.filter_encoder.as_mut() {
            inner.plan.initialize_writer();
        }
        self.tables_written = true;
        self.cur_row = None;
        self.next_x = 0;
    }

    fn write_tables<S: BitSink>(&mut self, ctx: &Context, sink: &mut S) -> io::Result<()> {
        let field = ctx.params.tile_bits_field_width();
        if field > 0 {
            sink.write_bits(self.tile_bits - ctx.params.min_bits, field)?;
        }
        desync_table(sink)?;

        sink.write_bits(self.sympal.len() as u32, SYMPAL_COUNT_BITS)?;
        for &value in &self.sympal {
            sink.write_bits(value as u32, SYMPAL_VALUE_BITS)?;
        }
        desync_table(sink)?;

        sink.write_bits(
            (self.normal_filter_count - SF_FIXED) as u32,
            NORMAL_COUNT_BITS,
        )?;
        for f in SF_FIXED..self.normal_filter_count {
            sink.write_bits(self.filter_indices[f] as u32, FILTER_INDEX_BITS)?;
        }
        desync_table(sink)?;

        sink.write_bits((self.chaos.bin_count() - 1) as u32, CHAOS_COUNT_BITS)?;
        desync_table(sink)?;

        for encoder in &self.encoders {
            encoder.write_tables(sink)?;
        }
        desync_table(sink)?;

        match self.filter_encoder.as_mut() {
            Some(inner) => {
                sink.write_bit(1)?;
                inner.plan.write_tables(&inner.ctx, sink)?;
            }
            None => {
                sink.write_bit(0)?;
                self.row_filter_encoder.write_tables(sink)?;
            }
        }
        desync_table(sink)?;

        self.initialize_writer();
        Ok(())
    }

    fn write_row_header<S: BitSink>(&mut self, y: usize, sink: &mut S) -> io::Result<()> {
        debug_assert!(self.tables_written, "write_tables must precede rows");
        debug_assert_eq!(y, self.cur_row.map_or(0, |r| r + 1), "rows out of order");
        self.cur_row = Some(y);
        self.next_x = 0;

        self.chaos.start_row();
        if y & (self.tile_size - 1) == 0 {
            self.tile_seen.fill(false);
            let ty = y >> self.tile_bits;
            match self.filter_encoder.as_mut() {
                Some(inner) => inner.plan.write_row_header(ty, sink)?,
                None => {
                    sink.write_bit(self.row_filters[ty])?;
                    self.prev_filter = 0;
                }
            }
        }
        desync_cell(0, y, sink)
    }

    fn write_cell<S: BitSink>(
        &mut self,
        ctx: &Context,
        x: usize,
        y: usize,
        sink: &mut S,
    ) -> io::Result<()> {
        debug_assert_eq!(self.cur_row, Some(y), "row header must precede cells");
        debug_assert!(x >= self.next_x, "cells out of order within row");
        self.next_x = x + 1;

        let w = ctx.params.size_x;
        let tx = x >> self.tile_bits;
        let ty = y >> self.tile_bits;

        // The filter channel advances at the first visit of every tile
        // column, masked or not, so the inner coder sees its matrix in
        // raster order.
        if !self.tile_seen[tx] {
            self.tile_seen[tx] = true;
            let f = self.tiles[ty * self.tiles_x + tx];
            match self.filter_encoder.as_mut() {
                Some(inner) => inner.plan.write_cell(&inner.ctx, tx, ty, sink)?,
                None => {
                    if f != MASK_TILE {
                        let rf = if self.row_filters[ty] == RF_PREV {
                            let r = residual(f, self.prev_filter, self.filter_count);
                            self.prev_filter = f;
                            r
                        } else {
                            f
                        };
                        self.row_filter_encoder.write(rf, sink)?;
                    }
                }
            }
            desync_cell(x, y, sink)?;
        }

        if ctx.mask[y * w + x] {
            self.chaos.zero(x);
            return Ok(());
        }

        let f = self.tiles[ty * self.tiles_x + tx] as usize;
        debug_assert!(f != MASK_TILE as usize, "unmasked cell in a mask tile");
        if f >= self.normal_filter_count {
            // Sympal tile: the constant carries the cell.
            self.chaos.zero(x);
            return Ok(());
        }

        let r = self.residuals[y * w + x];
        let bin = self.chaos.get(x);
        self.chaos.store(x, r, ctx.params.num_syms);
        self.encoders[bin].write(r, sink)?;
        desync_cell(x, y, sink)
    }

    /// Run the complete emission pass against a counting sink. Exact by
    /// construction: the same code paths run for the byte-producing pass.
    fn simulate(&mut self, ctx: &Context) -> io::Result<u64> {
        let mut sink = CountingSink::new();
        self.write_tables(ctx, &mut sink)?;
        for y in 0..ctx.params.size_y {
            self.write_row_header(y, &mut sink)?;
            for x in 0..ctx.params.size_x {
                self.write_cell(ctx, x, y, &mut sink)?;
            }
        }
        self.initialize_writer();
        Ok(sink.bit_count())
    }
}
