use crate::consts::HISTOGRAM_BUCKETS;

/// Occurrence histogram over the full 16-bit sample range.
///
/// Bucket `v` holds the number of pixels with value `v`. Medians are derived
/// by scanning buckets in value order, which makes them independent of the
/// order in which pixels were counted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Histogram {
    counts: Vec<u32>,
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            counts: vec![0; HISTOGRAM_BUCKETS],
        }
    }

    pub fn from_pixels(pixels: &[u16]) -> Self {
        let mut hist = Self::new();
        for &v in pixels {
            hist.add(v);
        }
        hist
    }

    #[inline]
    pub fn add(&mut self, value: u16) {
        self.counts[value as usize] += 1;
    }

    /// Element-wise addition of another histogram.
    pub fn merge(&mut self, other: &Histogram) {
        for (dst, &src) in self.counts.iter_mut().zip(other.counts.iter()) {
            *dst += src;
        }
    }

    pub fn count(&self, value: u16) -> u32 {
        self.counts[value as usize]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Lowest populated value and its occurrence count.
    pub fn min(&self) -> Option<(u16, u64)> {
        self.counts
            .iter()
            .position(|&c| c > 0)
            .map(|i| (i as u16, self.counts[i] as u64))
    }

    /// Highest populated value and its occurrence count.
    pub fn max(&self) -> Option<(u16, u64)> {
        self.counts
            .iter()
            .rposition(|&c| c > 0)
            .map(|i| (i as u16, self.counts[i] as u64))
    }

    /// Populated buckets as `(value, count)` pairs in value order.
    pub fn populated(&self) -> Vec<(u16, u32)> {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(|(i, &c)| (i as u16, c))
            .collect()
    }

    /// Median bucket pair of the distribution. Equal entries mean the median
    /// falls inside one bucket; different entries mean the cumulative count hit
    /// exactly half and the median is their average.
    pub fn median_pair(&self) -> (usize, usize) {
        median_pair_of(&self.counts, self.total())
    }

    pub fn median(&self) -> f64 {
        let (lo, hi) = self.median_pair();
        (lo + hi) as f64 / 2.0
    }

    /// Median absolute deviation around the lower median bucket.
    ///
    /// Builds a distance histogram `|v - median_lo|` from the occurrence counts
    /// and applies the same accumulate-until-half rule to it.
    pub fn median_absolute_deviation(&self, median_lo: usize) -> f64 {
        let mut distances = vec![0u32; HISTOGRAM_BUCKETS];
        for (value, &count) in self.counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            distances[value.abs_diff(median_lo)] += count;
        }
        let (lo, hi) = median_pair_of(&distances, self.total());
        (lo + hi) as f64 / 2.0
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan `counts` in order until the running total passes half of `total`.
///
/// When the running total lands exactly on half, the pair spans the current
/// bucket and the next populated one.
fn median_pair_of(counts: &[u32], total: u64) -> (usize, usize) {
    let mut cumulative = 0u64;
    for (i, &c) in counts.iter().enumerate() {
        cumulative += c as u64;
        if cumulative * 2 > total {
            return (i, i);
        }
        if cumulative * 2 == total && c > 0 {
            let next = counts[i + 1..]
                .iter()
                .position(|&n| n > 0)
                .map(|offset| i + 1 + offset)
                .unwrap_or(i);
            return (i, next);
        }
    }
    (0, 0)
}
