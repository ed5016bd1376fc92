//! Spatial predictor catalog.
//!
//! Each predictor is a pure function of the causal neighborhood, identified
//! by its catalog index on both sides of the wire. Out-of-bounds neighbors
//! read as 0; extrapolating predictors clamp into `[0, max]` where `max` is
//! `num_syms - 1`. The first `SF_FIXED` entries are always part of the
//! chosen filter set.
//!
//! Neighborhood naming, relative to the predicted cell:
//! `a` left, `b` up, `c` up-left, `d` up-right, `aa` two left, `bb` two up.

use crate::format::{SF_COUNT, SF_FIXED};

pub type PredictFn = fn(&[u8], usize, usize, usize, u8) -> u8;

#[derive(Clone, Copy)]
pub struct MonoFilter {
    pub name: &'static str,
    pub safe: PredictFn,
}

#[inline]
fn a(data: &[u8], w: usize, x: usize, y: usize) -> i32 {
    if x > 0 {
        data[y * w + x - 1] as i32
    } else {
        0
    }
}

#[inline]
fn b(data: &[u8], w: usize, x: usize, y: usize) -> i32 {
    if y > 0 {
        data[(y - 1) * w + x] as i32
    } else {
        0
    }
}

#[inline]
fn c(data: &[u8], w: usize, x: usize, y: usize) -> i32 {
    if x > 0 && y > 0 {
        data[(y - 1) * w + x - 1] as i32
    } else {
        0
    }
}

#[inline]
fn d(data: &[u8], w: usize, x: usize, y: usize) -> i32 {
    if y > 0 && x + 1 < w {
        data[(y - 1) * w + x + 1] as i32
    } else {
        0
    }
}

#[inline]
fn aa(data: &[u8], w: usize, x: usize, y: usize) -> i32 {
    if x > 1 {
        data[y * w + x - 2] as i32
    } else {
        0
    }
}

#[inline]
fn bb(data: &[u8], w: usize, x: usize, y: usize) -> i32 {
    if y > 1 {
        data[(y - 2) * w + x] as i32
    } else {
        0
    }
}

#[inline]
fn clamped(v: i32, max: u8) -> u8 {
    v.clamp(0, max as i32) as u8
}

fn p_left(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    a(m, w, x, y) as u8
}

fn p_up(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    b(m, w, x, y) as u8
}

fn p_up_left(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    c(m, w, x, y) as u8
}

fn p_up_right(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    d(m, w, x, y) as u8
}

fn p_zero(_m: &[u8], _w: usize, _x: usize, _y: usize, _max: u8) -> u8 {
    0
}

fn p_avg_ab(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    ((a(m, w, x, y) + b(m, w, x, y)) / 2) as u8
}

fn p_avg_ac(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    ((a(m, w, x, y) + c(m, w, x, y)) / 2) as u8
}

fn p_avg_ad(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    ((a(m, w, x, y) + d(m, w, x, y)) / 2) as u8
}

fn p_avg_bc(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    ((b(m, w, x, y) + c(m, w, x, y)) / 2) as u8
}

fn p_avg_bd(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    ((b(m, w, x, y) + d(m, w, x, y)) / 2) as u8
}

fn p_avg_cd(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    ((c(m, w, x, y) + d(m, w, x, y)) / 2) as u8
}

fn p_avg_quad(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    ((a(m, w, x, y) + b(m, w, x, y) + c(m, w, x, y) + d(m, w, x, y)) / 4) as u8
}

fn p_paeth(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    let (pa, pb, pc) = (a(m, w, x, y), b(m, w, x, y), c(m, w, x, y));
    let p = pa + pb - pc;
    let (da, db, dc) = ((p - pa).abs(), (p - pb).abs(), (p - pc).abs());
    if da <= db && da <= dc {
        pa as u8
    } else if db <= dc {
        pb as u8
    } else {
        pc as u8
    }
}

fn p_clamp_grad(m: &[u8], w: usize, x: usize, y: usize, max: u8) -> u8 {
    clamped(a(m, w, x, y) + b(m, w, x, y) - c(m, w, x, y), max)
}

fn p_select(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    let (pa, pb, pc) = (a(m, w, x, y), b(m, w, x, y), c(m, w, x, y));
    if (pb - pc).abs() <= (pa - pc).abs() {
        pa as u8
    } else {
        pb as u8
    }
}

fn p_avg_ab_c(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    (((a(m, w, x, y) + b(m, w, x, y)) / 2 + c(m, w, x, y)) / 2) as u8
}

fn p_avg_ab_d(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    (((a(m, w, x, y) + b(m, w, x, y)) / 2 + d(m, w, x, y)) / 2) as u8
}

fn p_taps_3a_b(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    ((3 * a(m, w, x, y) + b(m, w, x, y)) / 4) as u8
}

fn p_taps_a_3b(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    ((a(m, w, x, y) + 3 * b(m, w, x, y)) / 4) as u8
}

fn p_taps_3b_d(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    ((3 * b(m, w, x, y) + d(m, w, x, y)) / 4) as u8
}

fn p_taps_b_3d(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    ((b(m, w, x, y) + 3 * d(m, w, x, y)) / 4) as u8
}

fn p_grad_row(m: &[u8], w: usize, x: usize, y: usize, max: u8) -> u8 {
    clamped(2 * a(m, w, x, y) - c(m, w, x, y), max)
}

fn p_grad_col(m: &[u8], w: usize, x: usize, y: usize, max: u8) -> u8 {
    clamped(2 * b(m, w, x, y) - c(m, w, x, y), max)
}

fn p_grad_ad_b(m: &[u8], w: usize, x: usize, y: usize, max: u8) -> u8 {
    clamped(a(m, w, x, y) + d(m, w, x, y) - b(m, w, x, y), max)
}

fn p_grad_bd_c(m: &[u8], w: usize, x: usize, y: usize, max: u8) -> u8 {
    clamped(b(m, w, x, y) + d(m, w, x, y) - c(m, w, x, y), max)
}

fn p_left2(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    aa(m, w, x, y) as u8
}

fn p_up2(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    bb(m, w, x, y) as u8
}

fn p_extrap_row(m: &[u8], w: usize, x: usize, y: usize, max: u8) -> u8 {
    clamped(2 * a(m, w, x, y) - aa(m, w, x, y), max)
}

fn p_extrap_col(m: &[u8], w: usize, x: usize, y: usize, max: u8) -> u8 {
    clamped(2 * b(m, w, x, y) - bb(m, w, x, y), max)
}

fn p_avg_ab_up(m: &[u8], w: usize, x: usize, y: usize, _max: u8) -> u8 {
    ((a(m, w, x, y) + b(m, w, x, y) + 1) / 2) as u8
}

/// The shared catalog. Indices are wire-visible: entry `i` here is global
/// predictor id `i` in the header.
pub const MONO_FILTERS: [MonoFilter; SF_COUNT] = [
    MonoFilter { name: "left", safe: p_left },
    MonoFilter { name: "up", safe: p_up },
    MonoFilter { name: "up-left", safe: p_up_left },
    MonoFilter { name: "up-right", safe: p_up_right },
    MonoFilter { name: "zero", safe: p_zero },
    MonoFilter { name: "avg-ab", safe: p_avg_ab },
    MonoFilter { name: "avg-ac", safe: p_avg_ac },
    MonoFilter { name: "avg-ad", safe: p_avg_ad },
    MonoFilter { name: "avg-bc", safe: p_avg_bc },
    MonoFilter { name: "avg-bd", safe: p_avg_bd },
    MonoFilter { name: "avg-cd", safe: p_avg_cd },
    MonoFilter { name: "avg-abcd", safe: p_avg_quad },
    MonoFilter { name: "paeth", safe: p_paeth },
    MonoFilter { name: "clamp-grad", safe: p_clamp_grad },
    MonoFilter { name: "select", safe: p_select },
    MonoFilter { name: "avg-ab-c", safe: p_avg_ab_c },
    MonoFilter { name: "avg-ab-d", safe: p_avg_ab_d },
    MonoFilter { name: "taps-3a-b", safe: p_taps_3a_b },
    MonoFilter { name: "taps-a-3b", safe: p_taps_a_3b },
    MonoFilter { name: "taps-3b-d", safe: p_taps_3b_d },
    MonoFilter { name: "taps-b-3d", safe: p_taps_b_3d },
    MonoFilter { name: "grad-row", safe: p_grad_row },
    MonoFilter { name: "grad-col", safe: p_grad_col },
    MonoFilter { name: "grad-ad-b", safe: p_grad_ad_b },
    MonoFilter { name: "grad-bd-c", safe: p_grad_bd_c },
    MonoFilter { name: "left2", safe: p_left2 },
    MonoFilter { name: "up2", safe: p_up2 },
    MonoFilter { name: "extrap-row", safe: p_extrap_row },
    MonoFilter { name: "extrap-col", safe: p_extrap_col },
    MonoFilter { name: "avg-ab-up", safe: p_avg_ab_up },
];

const _: () = assert!(SF_FIXED <= SF_COUNT);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_left_corner_reads_zero() {
        let data = [200u8; 16];
        for filter in MONO_FILTERS.iter() {
            // Every neighbor is out of bounds at the origin.
            assert_eq!((filter.safe)(&data, 4, 0, 0, 255), 0, "{}", filter.name);
        }
    }

    #[test]
    fn up_predictor_zeroes_a_vertical_gradient() {
        // M(x, y) = y is perfectly predicted by "up" except on row 0.
        let w = 8usize;
        let data: Vec<u8> = (0..w * w).map(|i| (i / w) as u8).collect();
        let up = &MONO_FILTERS[1];
        for y in 1..w {
            for x in 0..w {
                assert_eq!((up.safe)(&data, w, x, y, 7), data[y * w + x] - 1);
            }
        }
    }

    #[test]
    fn predictions_stay_in_range() {
        let w = 7usize;
        let max = 9u8;
        let data: Vec<u8> = (0..w * w)
            .map(|i| (i as u8).wrapping_mul(31) % 10)
            .collect();
        for filter in MONO_FILTERS.iter() {
            for y in 0..w {
                for x in 0..w {
                    let p = (filter.safe)(&data, w, x, y, max);
                    assert!(p <= max, "{} out of range at ({}, {})", filter.name, x, y);
                }
            }
        }
    }

    #[test]
    fn fixed_prefix_is_the_axis_set() {
        assert_eq!(MONO_FILTERS[0].name, "left");
        assert_eq!(MONO_FILTERS[1].name, "up");
        assert_eq!(MONO_FILTERS[2].name, "up-left");
        assert_eq!(MONO_FILTERS[3].name, "up-right");
    }
}
