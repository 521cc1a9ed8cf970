// FFT module - windowed forward transform for envelope extraction
//
// The transform is planned once; the frame buffer and scratch space are
// reused so per-hop processing does not allocate.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::Arc;

/// Periodic Hamming window: `0.54 - 0.46 cos(2πn / len)`
pub fn hamming_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| (0.54 - 0.46 * (2.0 * PI * n as f64 / len as f64).cos()) as f32)
        .collect()
}

/// FFT processor that reduces a windowed frame to low-band magnitude sums
pub struct FftProcessor {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    /// Hamming window (pre-computed)
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl FftProcessor {
    pub fn new(fft_size: usize) -> Self {
        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Self {
            fft,
            fft_size,
            window: hamming_window(fft_size),
            buffer: Vec::with_capacity(fft_size),
            scratch,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Window `frame`, transform it and sum the magnitudes of bins `0..bins`
    ///
    /// Frames shorter than `fft_size` are zero-padded; extra samples are ignored.
    pub fn band_magnitude_sum<I>(&mut self, frame: I, bins: usize) -> f32
    where
        I: IntoIterator<Item = f32>,
    {
        self.buffer.clear();
        self.buffer.extend(
            frame
                .into_iter()
                .zip(self.window.iter())
                .map(|(sample, window_val)| Complex::new(sample * window_val, 0.0)),
        );
        self.buffer.resize(self.fft_size, Complex::new(0.0, 0.0));

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        self.buffer[..bins.min(self.fft_size)]
            .iter()
            .map(|c| c.norm())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hamming_window_shape() {
        let window = hamming_window(8);
        assert!((window[0] - 0.08).abs() < 1e-6);
        // Periodic window peaks at len / 2
        assert!((window[4] - 1.0).abs() < 1e-6);
        assert!((window[2] - window[6]).abs() < 1e-6);
    }

    #[test]
    fn test_silence_has_no_energy() {
        let mut fft = FftProcessor::new(256);
        let sum = fft.band_magnitude_sum(std::iter::repeat(0.0).take(256), 10);
        assert_eq!(sum, 0.0);
    }

    #[test]
    fn test_dc_energy_lands_in_bin_zero() {
        let mut fft = FftProcessor::new(256);
        // Windowed DC: bin 0 = sum(window) = 0.54 * 256
        let dc_only = fft.band_magnitude_sum(std::iter::repeat(1.0).take(256), 1);
        assert!((dc_only - 0.54 * 256.0).abs() < 1e-2, "got {}", dc_only);
    }

    #[test]
    fn test_band_excludes_high_frequencies() {
        let size = 512;
        let mut fft = FftProcessor::new(size);
        // Tone centered on bin 100, far outside a 20-bin band
        let tone: Vec<f32> = (0..size)
            .map(|n| (2.0 * PI * 100.0 * n as f64 / size as f64).sin() as f32)
            .collect();

        let low_band = fft.band_magnitude_sum(tone.iter().copied(), 20);
        let full_band = fft.band_magnitude_sum(tone.iter().copied(), size / 2 + 1);
        assert!(low_band < 0.05, "low band leaked {}", low_band);
        assert!(full_band > 100.0, "tone energy missing: {}", full_band);
    }

    #[test]
    fn test_short_frames_are_zero_padded() {
        let mut fft = FftProcessor::new(64);
        let short = fft.band_magnitude_sum(std::iter::repeat(0.5).take(16), 33);
        assert!(short > 0.0);
        assert!(short.is_finite());
    }
}
