// src/lib.rs — tile-filtered residual coder for monochrome 8-bit planes
//! Lossless coder for rectangular matrices of 8-bit symbols (alpha planes,
//! palette indices, filter maps from an outer image pipeline).
//!
//! The plane is cut into square tiles; each tile gets a spatial predictor
//! (or a constant "sympal" predictor for uniform regions), residuals are
//! bucketed by a neighborhood chaos metric, and one Huffman coder per
//! chaos bin carries the payload. The tile-filter map itself is either
//! row-filtered or handed to a whole recursive instance of the same coder,
//! whichever simulates cheaper. An outer search sweeps tile sizes and keeps
//! the best complete pipeline.
//!
//! Wire layout, in emission order:
//!   Header:
//!     [tile_bits - min_bits]           (only when max_bits > min_bits)
//!     4b  sympal count, then 8b per constant value
//!     5b  normal filter count - 4, then 7b per chosen predictor id
//!     4b  chaos bin count - 1
//!     per bin: num_syms x 4b Huffman code lengths
//!     1b  recurse flag, then inner header or row-filter code lengths
//!   Per row: at tile-row boundaries, 1b row filter (or the inner coder's
//!     row header); then, interleaved with cells, each tile's filter id the
//!     first time its column is visited, and per unmasked normal-tile cell
//!     the Huffman-coded residual for its chaos bin.
//!
//! Masked cells are never predicted from, never coded, and decode to 0.

pub mod bitio;
pub mod chaos;
pub mod error;
pub mod estimator;
pub mod format;
pub mod huffman;
pub mod params;
pub mod predictors;
pub mod reader;
pub mod scorer;
pub mod writer;

pub use bitio::{BitSink, BitSource, CountingSink, SliceSource, VecSink};
pub use error::MonoError;
pub use params::Parameters;
pub use reader::MonoReader;
pub use writer::MonoWriter;

/// Compress a plane in one call: run the search, emit tables and every row.
pub fn encode<F>(data: &[u8], params: &Parameters, mask: F) -> Result<Vec<u8>, MonoError>
where
    F: Fn(usize, usize) -> bool,
{
    let mut writer = MonoWriter::new(data, params, mask)?;
    let mut sink = VecSink::new();
    writer.write_tables(&mut sink)?;
    for y in 0..params.size_y {
        writer.write_row_header(y, &mut sink)?;
        for x in 0..params.size_x {
            writer.write(x, y, &mut sink)?;
        }
    }
    Ok(sink.into_bytes()?)
}

/// Decompress a plane produced by [`encode`] with the same parameters and
/// mask. Masked positions come back as 0.
pub fn decode<F>(bytes: &[u8], params: &Parameters, mask: F) -> Result<Vec<u8>, MonoError>
where
    F: Fn(usize, usize) -> bool,
{
    let mut reader = MonoReader::new(params, mask)?;
    let mut src = SliceSource::new(bytes);
    reader.read_tables(&mut src)?;
    for y in 0..params.size_y {
        reader.read_row_header(y, &mut src)?;
        for x in 0..params.size_x {
            reader.read(x, y, &mut src)?;
        }
    }
    Ok(reader.into_matrix())
}
