// Envelope - low-frequency energy envelope of the incoming audio
//
// Turns the sample look-back buffer into one scalar per hop that tracks
// percussive low-end energy, then smooths it for peak picking.
//
// Module organization:
// - fft: Hamming window + planned forward FFT, reduced to a band magnitude sum
// - smoother: windowed-sinc FIR low-pass with persistent delay line
// - history: rolling buffer of smoothed values used by the peak picker
// - mod.rs: SpectralEnvelopeExtractor (frame placement + normalization)

mod fft;
mod history;
mod smoother;

pub use fft::hamming_window;
pub use history::EnvelopeHistory;
pub use smoother::{design_low_pass, EnvelopeSmoother};

use fft::FftProcessor;

use super::sample_window::SampleWindow;
use super::ANALYSIS_START_BLOCK;
use crate::config::AnalyzerConfig;

/// Computes one envelope value per hop from the newest analysis region
///
/// Frame `n` of a block starts at `ANALYSIS_START_BLOCK * block_size +
/// n * hop_size` in the window, so the frames straddle the block before the
/// newest one and run into the newest block.
pub struct SpectralEnvelopeExtractor {
    fft: FftProcessor,
    hop_size: usize,
    hops_per_block: usize,
    band_bins: usize,
    analysis_start: usize,
}

impl SpectralEnvelopeExtractor {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            fft: FftProcessor::new(config.envelope.fft_size),
            hop_size: config.envelope.hop_size,
            hops_per_block: config.hops_per_block(),
            band_bins: config.envelope.band_bins,
            analysis_start: ANALYSIS_START_BLOCK * config.stream.block_size,
        }
    }

    pub fn hops_per_block(&self) -> usize {
        self.hops_per_block
    }

    /// Fill `envelope` with one value per hop, in hop order
    ///
    /// Each value is the magnitude sum over the low band of the windowed
    /// frame, normalized by the FFT size.
    pub fn extract_into(&mut self, window: &SampleWindow, envelope: &mut [f32]) {
        debug_assert_eq!(envelope.len(), self.hops_per_block);

        let fft_size = self.fft.fft_size();
        for (hop, value) in envelope.iter_mut().enumerate() {
            let start = self.analysis_start + hop * self.hop_size;
            let band = self
                .fft
                .band_magnitude_sum(window.segment(start, fft_size), self.band_bins);
            *value = band / fft_size as f32;
        }
    }
}
