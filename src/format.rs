//! Fixed wire vocabulary — known to both writer and reader.
//! Never transmitted. Single source of truth for all sentinels, bounds
//! and header field widths.

/// Always-present spatial predictors (catalog ids `0..SF_FIXED`).
pub const SF_FIXED: usize = 4;

/// Total size of the spatial predictor catalog.
pub const SF_COUNT: usize = 30;

/// Upper bound on chosen filters, normal + sympal.
pub const MAX_FILTERS: usize = 32;

/// Upper bound on symbol-palette (constant value) filters. Kept at 15 so
/// the raw count fits the 4-bit header field.
pub const MAX_PALETTE: usize = 15;

/// Upper bound on chaos bins; the planner sweeps `1..MAX_CHAOS_LEVELS`.
pub const MAX_CHAOS_LEVELS: usize = 8;

/// Tile-map sentinel: every cell in the tile is masked.
pub const MASK_TILE: u8 = 255;

/// Tile-map placeholder: tile still needs a filter assignment.
pub const TODO_TILE: u8 = 0;

/// Sympal slot that did not survive filter selection.
pub const UNUSED_SYMPAL: u8 = 255;

/// Tile-assignment passes (pass 0 assigns, pass 1 revisits).
pub const MAX_PASSES: usize = 2;

/// Row-filter refinement passes.
pub const MAX_ROW_PASSES: usize = 2;

/// Minimum tile count before the tile map is worth recursing on.
pub const RECURSE_THRESH_COUNT: usize = 256;

/// Row filter: tile filter ids transmitted verbatim.
pub const RF_NOOP: u8 = 0;
/// Row filter: tile filter ids transmitted as differences mod `F` from the
/// previous non-mask tile in the row.
pub const RF_PREV: u8 = 1;

// ── Header field widths (bits) ────────────────────────────────────────────────
pub const SYMPAL_COUNT_BITS: u32 = 4;
pub const NORMAL_COUNT_BITS: u32 = 5;
pub const FILTER_INDEX_BITS: u32 = 7;
pub const CHAOS_COUNT_BITS: u32 = 4;
pub const SYMPAL_VALUE_BITS: u32 = 8;

// ── Desync checkwords (feature `desync-check` only) ──────────────────────────
pub const DESYNC_TABLE_WORD: u32 = 1_234_567;
pub const DESYNC_X_SALT: u32 = 12_345;
pub const DESYNC_Y_SALT: u32 = 54_321;

const _: () = assert!(MAX_FILTERS <= 32);
const _: () = assert!(MAX_PALETTE < 16);
const _: () = assert!(MAX_CHAOS_LEVELS <= 16);
const _: () = assert!(SF_COUNT + MAX_PALETTE <= 128);
