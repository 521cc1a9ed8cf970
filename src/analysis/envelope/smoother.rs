// EnvelopeSmoother - causal FIR low-pass over the envelope sequence
//
// Coefficients come from a Hamming-windowed sinc designed at the hop rate.
// The delay line lives as long as the smoother: it carries across blocks
// and is only ever zeroed at construction.

use std::f64::consts::PI;

use super::fft::hamming_window;

/// Windowed-sinc low-pass FIR coefficients
///
/// `h[n] = sin(wc (n - N/2)) / (π (n - N/2)) · w[n]`, with the center tap
/// replaced by its limit `wc / π`.
///
/// # Arguments
/// * `cutoff_hz` - Cutoff frequency in Hz
/// * `sample_rate` - Rate of the filtered sequence in Hz (the hop rate here)
/// * `taps` - Number of coefficients
pub fn design_low_pass(cutoff_hz: f64, sample_rate: f64, taps: usize) -> Vec<f32> {
    let window = hamming_window(taps);
    let wc = 2.0 * PI * cutoff_hz / sample_rate;
    let center = (taps / 2) as f64;

    (0..taps)
        .map(|n| {
            let m = n as f64 - center;
            if n == taps / 2 {
                (wc / PI) as f32
            } else {
                ((wc * m).sin() / (PI * m) * window[n] as f64) as f32
            }
        })
        .collect()
}

pub struct EnvelopeSmoother {
    coefficients: Vec<f32>,
    // delay_line[0] is the newest input
    delay_line: Vec<f32>,
}

impl EnvelopeSmoother {
    pub fn new(cutoff_hz: f64, sample_rate: f64, taps: usize) -> Self {
        let coefficients = design_low_pass(cutoff_hz, sample_rate, taps);
        Self {
            delay_line: vec![0.0; coefficients.len()],
            coefficients,
        }
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.coefficients
    }

    /// Push one envelope value and return the filtered output
    pub fn process(&mut self, value: f32) -> f32 {
        let taps = self.delay_line.len();
        self.delay_line.copy_within(..taps - 1, 1);
        self.delay_line[0] = value;

        self.coefficients
            .iter()
            .zip(self.delay_line.iter())
            .map(|(h, x)| h * x)
            .sum()
    }

    /// Filter a block of values in place, in hop order
    pub fn process_block(&mut self, values: &mut [f32]) {
        for value in values.iter_mut() {
            *value = self.process(*value);
        }
    }
}
