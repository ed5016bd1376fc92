//! Configuration errors.
//!
//! Stream-level failures (sink I/O, malformed input on decode) travel as
//! `std::io::Error` through the write/read paths; this enum only covers
//! parameter validation, which is reported once by the constructors and
//! never retried.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonoError {
    #[error("symbol alphabet must be 2..=256, got {0}")]
    BadAlphabet(usize),

    #[error("matrix must be non-empty, got {0}x{1}")]
    EmptyMatrix(usize, usize),

    #[error("data length {len} does not match {size_x}x{size_y}")]
    GeometryMismatch {
        len: usize,
        size_x: usize,
        size_y: usize,
    },

    #[error("tile bits range {min}..={max} is invalid (need 1 <= min <= max <= 8)")]
    BadTileBits { min: u32, max: u32 },

    #[error("cell value {value} outside alphabet of {num_syms}")]
    SymbolOutOfRange { value: u8, num_syms: usize },

    #[error("threshold {0} out of [0, 1]")]
    BadThreshold(f32),

    #[error("award table must be non-empty and descending")]
    BadAwards,

    #[error("max_filters must be 1..={}", crate::format::MAX_FILTERS)]
    BadMaxFilters(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
