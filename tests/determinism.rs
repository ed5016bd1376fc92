//! Determinism, exact bit accounting, and search invariants.

use monoplane::format::{MAX_CHAOS_LEVELS, MAX_FILTERS, MAX_PALETTE, SF_FIXED};
use monoplane::{encode, BitSink, MonoWriter, Parameters, VecSink};

fn lcg(seed: u64) -> impl FnMut() -> u32 {
    let mut state = seed;
    move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 33) as u32
    }
}

fn test_plane(w: usize, h: usize, num_syms: usize, seed: u64) -> Vec<u8> {
    let mut rng = lcg(seed);
    (0..w * h)
        .map(|i| {
            let (x, y) = (i % w, i / w);
            // Mix of smooth texture and noise so the planner has choices.
            let smooth = ((x / 4 + y / 4) % num_syms) as u32;
            let noisy = rng() % num_syms as u32;
            if (x + y) % 5 == 0 {
                noisy as u8
            } else {
                smooth as u8
            }
        })
        .collect()
}

#[test]
fn identical_inputs_emit_identical_bytes() {
    let params = Parameters::new(40, 40, 24);
    let data = test_plane(40, 40, 24, 99);
    let mask = |x: usize, y: usize| (x + 2 * y) % 7 == 0;
    let a = encode(&data, &params, mask).expect("encode");
    let b = encode(&data, &params, mask).expect("encode");
    assert_eq!(a, b);
}

#[test]
fn simulated_cost_equals_emitted_bits() {
    for (w, h, syms, seed) in [(16, 16, 8, 1u64), (40, 24, 32, 2), (33, 17, 256, 3)] {
        let params = Parameters::new(w, h, syms);
        let data = test_plane(w, h, syms, seed);
        let mut writer = MonoWriter::new(&data, &params, |_, _| false).expect("writer");
        let mut sink = VecSink::new();
        writer.write_tables(&mut sink).expect("tables");
        for y in 0..h {
            writer.write_row_header(y, &mut sink).expect("row header");
            for x in 0..w {
                writer.write(x, y, &mut sink).expect("cell");
            }
        }
        assert_eq!(
            sink.bit_count(),
            writer.cost(),
            "bit-length law broke for {}x{}",
            w,
            h
        );
    }
}

#[test]
fn simulated_cost_equals_emitted_bits_with_recursion_sized_map() {
    let mut params = Parameters::new(96, 96, 8);
    params.min_bits = 2;
    params.max_bits = 2;
    let data: Vec<u8> = (0..96 * 96).map(|i| ((i / 96) % 8) as u8).collect();
    let mut writer = MonoWriter::new(&data, &params, |_, _| false).expect("writer");
    let mut sink = VecSink::new();
    writer.write_tables(&mut sink).expect("tables");
    for y in 0..96 {
        writer.write_row_header(y, &mut sink).expect("row header");
        for x in 0..96 {
            writer.write(x, y, &mut sink).expect("cell");
        }
    }
    assert_eq!(sink.bit_count(), writer.cost());
}

#[test]
fn filter_counts_stay_in_bounds() {
    for seed in [5u64, 6, 7] {
        let params = Parameters::new(32, 32, 64);
        let data = test_plane(32, 32, 64, seed);
        let writer = MonoWriter::new(&data, &params, |_, _| false).expect("writer");
        assert!(writer.normal_filter_count() >= SF_FIXED);
        assert!(writer.sympal_filter_count() <= MAX_PALETTE);
        assert!(writer.normal_filter_count() + writer.sympal_filter_count() <= MAX_FILTERS);
        assert!(writer.chaos_bin_count() >= 1);
        assert!(writer.chaos_bin_count() < MAX_CHAOS_LEVELS);
        assert!((params.min_bits..=params.max_bits).contains(&writer.tile_bits()));
    }
}

#[test]
fn chosen_tile_size_beats_every_smaller_one() {
    // Pin each candidate size in turn; the early-stopped winner must not be
    // beaten by any size below it.
    let params = Parameters::new(48, 48, 16);
    let data = test_plane(48, 48, 16, 11);
    let searched = MonoWriter::new(&data, &params, |_, _| false).expect("writer");
    let chosen = searched.tile_bits();

    let pinned_cost = |bits: u32| {
        let mut pinned = params.clone();
        pinned.min_bits = bits;
        pinned.max_bits = bits;
        MonoWriter::new(&data, &pinned, |_, _| false)
            .expect("writer")
            .cost()
    };
    let chosen_cost = pinned_cost(chosen);
    for bits in params.min_bits..chosen {
        assert!(
            pinned_cost(bits) > chosen_cost,
            "tile bits {} beat the chosen {}",
            bits,
            chosen
        );
    }
}

#[test]
fn counting_and_byte_sinks_agree_through_a_full_pass() {
    let params = Parameters::new(20, 20, 16);
    let data = test_plane(20, 20, 16, 21);
    let mask = |x: usize, y: usize| x == y;

    let mut writer = MonoWriter::new(&data, &params, mask).expect("writer");
    let mut counting = monoplane::CountingSink::new();
    writer.write_tables(&mut counting).expect("tables");
    for y in 0..20 {
        writer.write_row_header(y, &mut counting).expect("row header");
        for x in 0..20 {
            writer.write(x, y, &mut counting).expect("cell");
        }
    }

    let mut writer = MonoWriter::new(&data, &params, mask).expect("writer");
    let mut bytes = VecSink::new();
    writer.write_tables(&mut bytes).expect("tables");
    for y in 0..20 {
        writer.write_row_header(y, &mut bytes).expect("row header");
        for x in 0..20 {
            writer.write(x, y, &mut bytes).expect("cell");
        }
    }

    assert_eq!(counting.bit_count(), bytes.bit_count());
}
