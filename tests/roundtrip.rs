//! End-to-end encode/decode scenarios.

use monoplane::{decode, encode, MonoWriter, Parameters};

fn lcg(seed: u64) -> impl FnMut() -> u32 {
    let mut state = seed;
    move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 33) as u32
    }
}

fn assert_roundtrip<F>(data: &[u8], params: &Parameters, mask: F)
where
    F: Fn(usize, usize) -> bool + Copy,
{
    let bytes = encode(data, params, mask).expect("encode");
    let decoded = decode(&bytes, params, mask).expect("decode");
    for y in 0..params.size_y {
        for x in 0..params.size_x {
            if !mask(x, y) {
                assert_eq!(
                    decoded[y * params.size_x + x],
                    data[y * params.size_x + x],
                    "mismatch at ({}, {})",
                    x,
                    y
                );
            }
        }
    }
}

#[test]
fn all_masked_plane_costs_only_headers() {
    let params = Parameters::new(16, 16, 8);
    let data = vec![0u8; 256];
    let bytes = encode(&data, &params, |_, _| true).expect("encode");
    // Tables, the recurse/row decision and per-row selector bits; nothing
    // per cell.
    assert!(bytes.len() <= 16, "all-masked stream is {} bytes", bytes.len());
    let decoded = decode(&bytes, &params, |_, _| true).expect("decode");
    assert_eq!(decoded.len(), 256);
}

#[test]
fn uniform_plane_roundtrips_through_sympal() {
    let params = Parameters::new(32, 32, 8);
    let data = vec![7u8; 32 * 32];
    let writer = MonoWriter::new(&data, &params, |_, _| false).expect("writer");
    assert_eq!(writer.sympal_filter_count(), 1);
    assert_eq!(writer.chaos_bin_count(), 1);
    assert_roundtrip(&data, &params, |_, _| false);
}

#[test]
fn vertical_gradient_is_nearly_free() {
    let mut params = Parameters::new(8, 8, 8);
    params.min_bits = 2;
    params.max_bits = 3;
    let data: Vec<u8> = (0..64).map(|i| (i / 8) as u8).collect();
    assert_roundtrip(&data, &params, |_, _| false);

    // The "up" predictor zeroes every residual, so the stream is tables
    // plus a handful of header bits.
    let writer = MonoWriter::new(&data, &params, |_, _| false).expect("writer");
    assert!(writer.cost() < 200, "gradient cost {} bits", writer.cost());
}

#[test]
fn random_wide_alphabet_roundtrips() {
    let params = Parameters::new(64, 64, 256);
    let mut rng = lcg(0x5EED);
    let data: Vec<u8> = (0..64 * 64).map(|_| rng() as u8).collect();
    assert_roundtrip(&data, &params, |_, _| false);
}

#[test]
fn quarter_masked_plane_roundtrips() {
    let params = Parameters::new(48, 48, 32);
    let mut rng = lcg(0xA11CE);
    let data: Vec<u8> = (0..48 * 48).map(|_| (rng() % 32) as u8).collect();
    let mask = |x: usize, y: usize| (x * 31 + y * 17) % 4 == 0;
    assert_roundtrip(&data, &params, mask);
}

#[test]
fn masked_values_do_not_reach_the_stream() {
    // Two planes differing only at masked positions produce identical
    // bytes.
    let params = Parameters::new(24, 24, 16);
    let mask = |x: usize, _y: usize| x % 3 == 0;
    let mut rng = lcg(77);
    let base: Vec<u8> = (0..24 * 24).map(|_| (rng() % 16) as u8).collect();
    let mut scribbled = base.clone();
    for y in 0..24 {
        for x in 0..24 {
            if mask(x, y) {
                scribbled[y * 24 + x] = 15;
            }
        }
    }
    let a = encode(&base, &params, mask).expect("encode");
    let b = encode(&scribbled, &params, mask).expect("encode");
    assert_eq!(a, b);
}

/// Parameters that pin the tile-filter map to the plane's per-tile
/// constants: 128x128 at fixed 4x4 tiles (1024 tiles, above the recursion
/// threshold), every tile uniform, and every tile value pushed into the
/// palette — a low sympal threshold admits all three values as candidates,
/// the single award slot keeps spatial filters out of the vote, and the
/// full coverage threshold holds selection open until the last palette
/// entry lands. Tile (tx, ty) then carries exactly the sympal id of its
/// constant value, so each test seeds the map the recursion codes.
fn pinned_tile_map_params() -> Parameters {
    let mut params = Parameters::new(128, 128, 3);
    params.min_bits = 2;
    params.max_bits = 2;
    params.sympal_thresh = 0.1;
    params.filter_thresh = 1.0;
    params.awards = vec![5];
    params
}

/// Column-keyed tile values: constant down every column, aperiodic across
/// columns, no run longer than two. Rows stay high-entropy however a row
/// filter codes them, while a vertical predictor flattens everything below
/// the first tile row.
const COLS: [u8; 32] = [
    0, 2, 1, 0, 2, 0, 1, 2, 1, 0, 2, 2, 0, 1, 2, 1, //
    0, 1, 2, 0, 1, 1, 2, 0, 2, 1, 0, 2, 0, 1, 0, 1,
];

fn column_keyed_plane() -> Vec<u8> {
    (0..128 * 128).map(|i| COLS[(i % 128) / 4]).collect()
}

#[test]
fn structured_tile_map_recurses() {
    let params = pinned_tile_map_params();
    let structured = column_keyed_plane();

    let writer = MonoWriter::new(&structured, &params, |_, _| false).expect("writer");
    assert!(
        writer.recursion_chosen(),
        "column-keyed tile map must be coded by the recursive coder"
    );
    assert_roundtrip(&structured, &params, |_, _| false);
}

#[test]
fn random_tile_map_falls_back_to_row_filters() {
    // Independent per-tile values: neither axis predicts them, so the
    // inner coder pays the same payload as the row path plus its own
    // header and tables.
    let params = pinned_tile_map_params();
    let mut rng = lcg(0xF00D);
    let tile_values: Vec<u8> = (0..32 * 32).map(|_| (rng() % 3) as u8).collect();
    let random: Vec<u8> = (0..128 * 128)
        .map(|i| {
            let (x, y) = (i % 128, i / 128);
            tile_values[(y / 4) * 32 + x / 4]
        })
        .collect();

    let writer = MonoWriter::new(&random, &params, |_, _| false).expect("writer");
    assert!(
        !writer.recursion_chosen(),
        "random tile map must fall back to row filters"
    );
    assert_roundtrip(&random, &params, |_, _| false);

    // The structured map of the sibling test codes far below this one.
    let structured = column_keyed_plane();
    let w_structured = MonoWriter::new(&structured, &params, |_, _| false).expect("writer");
    assert!(w_structured.cost() < writer.cost());
}

#[test]
fn tiny_alphabet_roundtrips() {
    let mut params = Parameters::new(10, 6, 2);
    params.min_bits = 1;
    params.max_bits = 2;
    let data: Vec<u8> = (0..60).map(|i| ((i / 7) % 2) as u8).collect();
    assert_roundtrip(&data, &params, |_, _| false);
}

#[test]
fn single_cell_plane_roundtrips() {
    let mut params = Parameters::new(1, 1, 8);
    params.min_bits = 1;
    params.max_bits = 1;
    assert_roundtrip(&[5], &params, |_, _| false);
}
