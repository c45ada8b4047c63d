//! Serial reference stages.
//!
//! These are the definitions every device has to reproduce exactly. The
//! cumulative histogram is an inclusive scan whose merge function is plain
//! `u32` addition; since addition is associative and commutative, any scan
//! order (left-to-right, tree, or atomic fan-out) yields the same slots.

use crate::types::{Bins, INTENSITY_LEVELS};

/// Merge function of the cumulative scan.
#[inline]
pub fn merge(a: u32, b: u32) -> u32 {
    a + b
}

pub fn histogram(pixels: &[u8]) -> Bins {
    let mut bins = [0u32; INTENSITY_LEVELS];
    for &p in pixels {
        bins[p as usize] += 1;
    }
    bins
}

pub fn inclusive_prefix_sum(histogram: &Bins) -> Bins {
    let mut cumulative = [0u32; INTENSITY_LEVELS];
    let mut running = 0u32;
    for (slot, &count) in cumulative.iter_mut().zip(histogram.iter()) {
        running = merge(running, count);
        *slot = running;
    }
    cumulative
}

/// `round(cumulative * 255 / total)` with round-half-up, clamped to 255.
/// A zero total maps every level to 0.
#[inline]
pub fn normalize_level(cumulative: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let scaled = (cumulative as u64 * 255 + (total as u64 >> 1)) / total as u64;
    scaled.min(255) as u32
}

pub fn lut(cumulative: &Bins) -> Bins {
    let total = cumulative[INTENSITY_LEVELS - 1];
    let mut lut = [0u32; INTENSITY_LEVELS];
    for (entry, &c) in lut.iter_mut().zip(cumulative.iter()) {
        *entry = normalize_level(c, total);
    }
    lut
}

pub fn re_project(pixels: &[u8], lut: &Bins) -> Vec<u8> {
    pixels.iter().map(|&p| lut[p as usize] as u8).collect()
}

pub fn is_non_decreasing(bins: &Bins) -> bool {
    bins.windows(2).all(|w| w[0] <= w[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_pixel_example() {
        let pixels = [0u8, 0, 255, 255];
        let h = histogram(&pixels);
        assert_eq!(h[0], 2);
        assert_eq!(h[255], 2);
        assert_eq!(h.iter().sum::<u32>(), 4);

        let ch = inclusive_prefix_sum(&h);
        assert!(ch[..255].iter().all(|&c| c == 2));
        assert_eq!(ch[255], 4);

        let l = lut(&ch);
        assert_eq!(l[0], 128);
        assert_eq!(l[255], 255);
        assert_eq!(re_project(&pixels, &l), vec![128, 128, 255, 255]);
    }

    #[test]
    fn zero_total_maps_to_zero() {
        let l = lut(&[0; INTENSITY_LEVELS]);
        assert!(l.iter().all(|&v| v == 0));
    }

    #[test]
    fn normalization_rounds_half_up_and_clamps() {
        assert_eq!(normalize_level(1, 2), 128); // 127.5
        assert_eq!(normalize_level(1, 3), 85); // 85.0
        assert_eq!(normalize_level(2, 3), 170);
        assert_eq!(normalize_level(7, 7), 255);
        assert_eq!(normalize_level(u32::MAX, u32::MAX), 255);
        assert_eq!(normalize_level(0, 10), 0);
    }

    #[test]
    fn uniform_image_maps_to_white() {
        let pixels = vec![77u8; 1000];
        let l = lut(&inclusive_prefix_sum(&histogram(&pixels)));
        assert_eq!(l[77], 255);
        assert!(l[..77].iter().all(|&v| v == 0));
        assert!(re_project(&pixels, &l).iter().all(|&v| v == 255));
    }

    #[test]
    fn lut_is_monotonic_for_random_input() {
        let mut state = 0x2545_f491u32;
        let pixels: Vec<u8> = (0..10_000)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state >> 24) as u8
            })
            .collect();
        let ch = inclusive_prefix_sum(&histogram(&pixels));
        assert!(is_non_decreasing(&ch));
        let l = lut(&ch);
        assert!(is_non_decreasing(&l));
        assert!(l.iter().all(|&v| v <= 255));
    }
}
