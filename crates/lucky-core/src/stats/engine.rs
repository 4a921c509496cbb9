use rayon::prelude::*;

use crate::error::{LuckyError, Result};

use super::histogram::Histogram;
use super::Statistics;

/// Per-partition accumulators of one pass over the pixel buffer.
///
/// All fields are integers, so merging partials in any grouping yields the
/// same totals as a single sequential pass.
#[derive(Clone, Debug)]
pub(crate) struct Partial {
    pub sum: u64,
    pub sum_sq: u64,
    pub histogram: Histogram,
    pub object_count: u64,
    pub object_sum_x: u64,
    pub object_sum_y: u64,
}

impl Partial {
    fn empty() -> Self {
        Self {
            sum: 0,
            sum_sq: 0,
            histogram: Histogram::new(),
            object_count: 0,
            object_sum_x: 0,
            object_sum_y: 0,
        }
    }

    fn merge(mut self, other: Partial) -> Partial {
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        self.histogram.merge(&other.histogram);
        self.object_count += other.object_count;
        self.object_sum_x += other.object_sum_x;
        self.object_sum_y += other.object_sum_y;
        self
    }
}

/// Single-threaded statistics with running extrema tracking.
pub fn compute_exact(pixels: &[u16], bit_depth: u32) -> Result<Statistics> {
    if pixels.is_empty() {
        return Err(LuckyError::EmptyFrame);
    }

    let mut sum = 0u64;
    let mut sum_sq = 0u64;
    let mut histogram = Histogram::new();
    let mut min = u16::MAX;
    let mut max = 0u16;
    let mut min_occurrences = 0u64;
    let mut max_occurrences = 0u64;

    for &v in pixels {
        sum += v as u64;
        sum_sq += v as u64 * v as u64;
        histogram.add(v);

        if v < min {
            min = v;
            min_occurrences = 0;
        }
        if v == min {
            min_occurrences += 1;
        }
        if v > max {
            max = v;
            max_occurrences = 0;
        }
        if v == max {
            max_occurrences += 1;
        }
    }

    let mut stats = derive(pixels.len() as u64, sum, sum_sq, &histogram, bit_depth);
    stats.min = min;
    stats.min_occurrences = min_occurrences;
    stats.max = max;
    stats.max_occurrences = max_occurrences;
    Ok(stats)
}

/// Statistics computed over `workers` contiguous partitions in parallel.
///
/// Produces exactly the same result as [`compute_exact`] for the same input.
pub fn compute_parallel(pixels: &[u16], bit_depth: u32, workers: usize) -> Result<Statistics> {
    if pixels.is_empty() {
        return Err(LuckyError::EmptyFrame);
    }
    let partial = accumulate_parallel(pixels, 1, None, workers);
    Ok(finish(pixels.len() as u64, &partial, bit_depth))
}

/// Parallel pass that optionally also gathers the index sums of pixels above
/// `threshold`. `width` converts flat indices into (x, y).
pub(crate) fn accumulate_parallel(
    pixels: &[u16],
    width: usize,
    threshold: Option<u16>,
    workers: usize,
) -> Partial {
    let workers = effective_workers(workers);
    let range = pixels.len().div_ceil(workers).max(1);
    let width = width.max(1);

    pixels
        .par_chunks(range)
        .enumerate()
        .map(|(chunk_idx, chunk)| {
            let start = chunk_idx * range;
            let mut partial = Partial::empty();
            for (offset, &v) in chunk.iter().enumerate() {
                partial.sum += v as u64;
                partial.sum_sq += v as u64 * v as u64;
                partial.histogram.add(v);

                if let Some(t) = threshold {
                    if v > t {
                        let i = start + offset;
                        partial.object_sum_x += (i % width) as u64;
                        partial.object_sum_y += (i / width) as u64;
                        partial.object_count += 1;
                    }
                }
            }
            partial
        })
        .reduce(Partial::empty, Partial::merge)
}

/// Derive the full statistics record from merged accumulators.
pub(crate) fn finish(count: u64, partial: &Partial, bit_depth: u32) -> Statistics {
    let mut stats = derive(
        count,
        partial.sum,
        partial.sum_sq,
        &partial.histogram,
        bit_depth,
    );
    let (min, min_occurrences) = partial.histogram.min().unwrap_or((0, 0));
    let (max, max_occurrences) = partial.histogram.max().unwrap_or((0, 0));
    stats.min = min;
    stats.min_occurrences = min_occurrences;
    stats.max = max;
    stats.max_occurrences = max_occurrences;
    stats
}

fn derive(count: u64, sum: u64, sum_sq: u64, histogram: &Histogram, bit_depth: u32) -> Statistics {
    let n = count as f64;
    let mean = sum as f64 / n;
    let variance = ((sum_sq as f64 - n * mean * mean) / n).max(0.0);

    let (median_lo, median_hi) = histogram.median_pair();
    let median = (median_lo + median_hi) as f64 / 2.0;
    let mad = histogram.median_absolute_deviation(median_lo);

    Statistics {
        bit_depth,
        mean,
        stdev: variance.sqrt(),
        median,
        mad,
        min: 0,
        min_occurrences: 0,
        max: 0,
        max_occurrences: 0,
        histogram: None,
        centroid: None,
    }
}

/// Worker count to use; 0 selects the rayon pool size.
pub fn effective_workers(workers: usize) -> usize {
    if workers == 0 {
        rayon::current_num_threads().max(1)
    } else {
        workers
    }
}
