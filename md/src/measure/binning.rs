//! Partition of a mode range into contiguous bins.

use crate::error::{MdError, MdResult};
use std::ops::Range;

/// Frequency binning may not produce more than this many bins per mode.
const MAX_BINS_PER_MODE: usize = 100;

/// Bin `b` covers modes `offsets[b]..offsets[b] + counts[b]`; the segments tile the
/// mode range in order without gaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeBinning {
    counts: Vec<usize>,
    offsets: Vec<usize>,
}

impl ModeBinning {
    fn from_counts(counts: Vec<usize>) -> Self {
        let offsets = counts
            .iter()
            .scan(0, |acc, &c| {
                let start = *acc;
                *acc += c;
                Some(start)
            })
            .collect();
        ModeBinning { counts, offsets }
    }

    /// Fixed-size bins of `bin_size` consecutive modes.
    pub fn by_index(num_modes: usize, bin_size: usize) -> MdResult<Self> {
        if bin_size == 0 || num_modes % bin_size != 0 {
            return Err(MdError::Config(format!(
                "{} modes cannot be split into bins of {}",
                num_modes, bin_size
            )));
        }
        Ok(Self::from_counts(vec![bin_size; num_modes / bin_size]))
    }

    /// Fixed-width bins in `|ν|` (THz). Frequencies must be ordered by magnitude.
    ///
    /// The lowest bin starts at the largest multiple of `width` not above the first
    /// magnitude; empty bins inside the range are kept.
    pub fn by_frequency(frequencies: &[f64], width: f64) -> MdResult<Self> {
        if width.is_nan() || width <= 0.0 {
            return Err(MdError::Config(
                "frequency bin width must be positive".to_string(),
            ));
        }
        let Some(first) = frequencies.first() else {
            return Ok(Self::from_counts(Vec::new()));
        };
        if frequencies.windows(2).any(|w| w[1].abs() < w[0].abs()) {
            return Err(MdError::ModeMismatch(
                "mode frequencies are not in ascending order of magnitude".to_string(),
            ));
        }

        let f_min = (first.abs() / width).floor() * width;
        let bin_of = |nu: f64| ((nu.abs() - f_min) / width).floor() as usize;
        let last = frequencies[frequencies.len() - 1];
        let span = ((last.abs() - f_min) / width).floor();
        let max_bins = MAX_BINS_PER_MODE * frequencies.len();
        if !span.is_finite() || span >= max_bins as f64 {
            return Err(MdError::Config(format!(
                "frequency bin width {} THz gives more than {} bins for {} modes",
                width,
                max_bins,
                frequencies.len()
            )));
        }
        let mut counts = vec![0; bin_of(last) + 1];
        for &nu in frequencies {
            counts[bin_of(nu)] += 1;
        }
        Ok(Self::from_counts(counts))
    }

    pub fn num_bins(&self) -> usize {
        self.counts.len()
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn num_modes(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn segment(&self, bin: usize) -> Range<usize> {
        self.offsets[bin]..self.offsets[bin] + self.counts[bin]
    }

    pub fn bin_of(&self, mode: usize) -> Option<usize> {
        (0..self.num_bins()).find(|&b| self.segment(b).contains(&mode))
    }
}
