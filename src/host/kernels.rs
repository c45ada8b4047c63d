//! Host renditions of the four kernels.
//!
//! Each one reduces into shared `AtomicU32` buffers from the calling rayon
//! pool, so the partial-result merge order is left to the scheduler the same
//! way it is left to the GPU. Every merge is a `u32` addition.

use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;

use crate::scan;
use crate::types::{Bins, INTENSITY_LEVELS};

/// Pixels tallied per task before merging into the shared bins.
pub const CHUNK_SIZE: usize = 64 * 1024;

pub type AtomicBins = [AtomicU32; INTENSITY_LEVELS];

pub fn zeroed_bins() -> AtomicBins {
    std::array::from_fn(|_| AtomicU32::new(0))
}

pub fn clear(bins: &AtomicBins) {
    for bin in bins {
        bin.store(0, Ordering::Relaxed);
    }
}

pub fn snapshot(bins: &AtomicBins) -> Bins {
    std::array::from_fn(|i| bins[i].load(Ordering::Acquire))
}

/// Chunk-private tallies merged with `fetch_add`.
pub fn histogram(pixels: &[u8], out: &AtomicBins) {
    pixels.par_chunks(CHUNK_SIZE).for_each(|chunk| {
        let mut local = [0u32; INTENSITY_LEVELS];
        for &p in chunk {
            local[p as usize] += 1;
        }
        for (bin, count) in out.iter().zip(local) {
            if count != 0 {
                bin.fetch_add(count, Ordering::Relaxed);
            }
        }
    });
}

/// Every level adds its count to all levels at or above it.
pub fn cumulative(histogram: &AtomicBins, out: &AtomicBins) {
    (0..INTENSITY_LEVELS).into_par_iter().for_each(|level| {
        let count = histogram[level].load(Ordering::Relaxed);
        if count == 0 {
            return;
        }
        for bin in &out[level..] {
            bin.fetch_add(count, Ordering::Relaxed);
        }
    });
}

pub fn lut(cumulative: &AtomicBins, out: &mut Bins) {
    let total = cumulative[INTENSITY_LEVELS - 1].load(Ordering::Acquire);
    out.par_iter_mut().enumerate().for_each(|(level, value)| {
        *value = scan::normalize_level(cumulative[level].load(Ordering::Relaxed), total);
    });
}

pub fn re_project(pixels: &[u8], lut: &Bins, out: &mut [u8]) {
    out.par_chunks_mut(CHUNK_SIZE)
        .zip(pixels.par_chunks(CHUNK_SIZE))
        .for_each(|(dst, src)| {
            for (d, &s) in dst.iter_mut().zip(src) {
                *d = lut[s as usize] as u8;
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pseudo_random_pixels(len: usize, seed: u32) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 24) as u8
            })
            .collect()
    }

    #[test]
    fn stages_agree_with_serial_reference() {
        let pixels = pseudo_random_pixels(3 * CHUNK_SIZE + 17, 7);

        let hist = zeroed_bins();
        histogram(&pixels, &hist);
        assert_eq!(snapshot(&hist), scan::histogram(&pixels));

        let cum = zeroed_bins();
        cumulative(&hist, &cum);
        let expected_cum = scan::inclusive_prefix_sum(&scan::histogram(&pixels));
        assert_eq!(snapshot(&cum), expected_cum);

        let mut table = [0u32; INTENSITY_LEVELS];
        lut(&cum, &mut table);
        assert_eq!(table, scan::lut(&expected_cum));

        let mut out = vec![0u8; pixels.len()];
        re_project(&pixels, &table, &mut out);
        assert_eq!(out, scan::re_project(&pixels, &table));
    }

    #[test]
    fn clear_resets_every_bin() {
        let bins = zeroed_bins();
        histogram(&[1, 1, 200], &bins);
        clear(&bins);
        assert!(snapshot(&bins).iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_input_leaves_bins_zero() {
        let hist = zeroed_bins();
        histogram(&[], &hist);
        let cum = zeroed_bins();
        cumulative(&hist, &cum);
        let mut table = [7u32; INTENSITY_LEVELS];
        lut(&cum, &mut table);
        assert!(table.iter().all(|&v| v == 0));
    }
}
