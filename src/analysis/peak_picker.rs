// PeakPicker - dual-threshold local maximum detection on the smoothed envelope
//
// Algorithm (per incoming block, once the history is warm):
// 1. Scan the block-sized region starting SCAN_START_BLOCK blocks into the history
// 2. Skip values below the fixed threshold t1
// 3. Skip values that are not strictly greater than both neighbours
// 4. Adaptive threshold: t2 = mean of the preceding `trailing_window` values
// 5. Accept if value >= t1 + lambda * t2
// 6. Convert the history index to a global offset in hops

use serde::{Deserialize, Serialize};

use super::envelope::EnvelopeHistory;
use super::{ANALYSIS_START_BLOCK, SCAN_START_BLOCK, WINDOW_BLOCKS};
use crate::config::{AnalyzerConfig, ScanPolicy};

/// Highest value on the 0-10 sensitivity scale
pub const MAX_SENSITIVITY: u8 = 10;

/// An accepted envelope peak
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Global position in hops, corrected for pipeline latency
    pub offset: i64,
    /// Smoothed envelope value at the peak
    pub value: f32,
}

/// Map a 0-10 sensitivity setting to the fixed threshold t1
///
/// Higher sensitivity means a lower threshold: 10 -> 0.01, 0 -> 0.11.
/// Values above 10 are treated as 10.
pub fn threshold_from_sensitivity(sensitivity: u8) -> f32 {
    let sensitivity = sensitivity.min(MAX_SENSITIVITY);
    (MAX_SENSITIVITY - sensitivity + 1) as f32 / 100.0
}

/// Delay, in hops, between a sound entering the stream and its envelope
/// value reaching the scanned history region
///
/// Sums the buffering ahead of the scan region: the sample look-back before
/// the analysis frames, the one block the scan lags behind the newest
/// envelope values, the history blocks before the scan region, one analysis
/// frame and half of the smoothing filter. 112 for the default geometry.
///
/// The sum differs from the true input-to-report delay by a constant, so
/// `Peak::offset` is only meaningful as a distance from another peak and is
/// not an absolute stream position.
pub fn latency_offset(config: &AnalyzerConfig) -> i64 {
    let hops = config.hops_per_block();
    let sample_look_back = (WINDOW_BLOCKS - ANALYSIS_START_BLOCK) * hops;
    let scan_lag = hops;
    let history_look_back = SCAN_START_BLOCK * hops;
    let frame = config.envelope.fft_size / config.envelope.hop_size;
    let filter = config.envelope.filter_taps / 2;

    (sample_look_back + scan_lag + history_look_back + frame + filter) as i64
}

pub struct PeakPicker {
    threshold: f32,
    lambda: f32,
    trailing_window: usize,
    scan_policy: ScanPolicy,
    hops_per_block: usize,
    latency_offset: i64,
    // Running total of accepted peaks since construction
    peak_count: u64,
}

impl PeakPicker {
    pub fn new(config: &AnalyzerConfig) -> Self {
        let peaks = &config.peak_picking;
        Self {
            threshold: peaks.threshold,
            lambda: peaks.lambda,
            trailing_window: peaks.trailing_window,
            scan_policy: peaks.scan_policy,
            hops_per_block: config.hops_per_block(),
            latency_offset: latency_offset(config),
            peak_count: 0,
        }
    }

    /// Scan the newest complete block of the history for peaks
    ///
    /// # Arguments
    /// * `history` - Smoothed envelope history
    /// * `iteration` - Number of blocks fed so far, including the current one
    ///
    /// # Returns
    /// Accepted peaks in history order
    pub fn pick(&mut self, history: &EnvelopeHistory, iteration: u64) -> Vec<Peak> {
        let mut peaks = Vec::new();
        let start = SCAN_START_BLOCK * self.hops_per_block;
        let end = start + self.hops_per_block;

        for index in start..end {
            if !self.accepts(history, index) {
                continue;
            }

            let offset =
                index as i64 + iteration as i64 * self.hops_per_block as i64 - self.latency_offset;
            self.peak_count += 1;
            peaks.push(Peak {
                offset,
                value: history.get(index),
            });

            if self.scan_policy == ScanPolicy::FirstPeak {
                break;
            }
        }

        peaks
    }

    fn accepts(&self, history: &EnvelopeHistory, index: usize) -> bool {
        let value = history.get(index);
        if value < self.threshold {
            return false;
        }

        let is_local_max = value > history.get(index - 1) && value > history.get(index + 1);
        if !is_local_max {
            return false;
        }

        let t2 = history.trailing_mean(index, self.trailing_window);
        value >= self.threshold + self.lambda * t2
    }

    /// Total peaks accepted since construction
    pub fn peak_count(&self) -> u64 {
        self.peak_count
    }

    pub fn latency_offset(&self) -> i64 {
        self.latency_offset
    }
}
