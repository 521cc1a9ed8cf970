//! Configuration management for the beat analysis pipeline
//!
//! This module provides runtime configuration loading from JSON files so the
//! stream geometry, envelope smoothing and peak picking parameters can be
//! tuned without recompilation. Defaults reproduce the reference setup:
//! 44.1 kHz audio in 4096-sample blocks, a 2048-point FFT every 256 samples,
//! a 16-tap 5 Hz smoothing filter and a 90 BPM two-bar grid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::analysis::{ANALYSIS_START_BLOCK, SCAN_START_BLOCK, WINDOW_BLOCKS};
use crate::error::PipelineError;

/// Complete analyzer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub stream: StreamConfig,
    pub envelope: EnvelopeConfig,
    pub peak_picking: PeakPickingConfig,
    pub grid: GridConfig,
}

/// Shape of the incoming audio stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Samples per incoming block
    pub block_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            block_size: 4096,
        }
    }
}

/// Spectral envelope extraction and smoothing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// FFT frame length in samples
    pub fft_size: usize,
    /// Stride between analysis frames in samples
    pub hop_size: usize,
    /// Number of low-frequency bins summed into the envelope, starting at DC
    pub band_bins: usize,
    /// Low-pass cutoff in Hz, relative to the hop rate
    pub cutoff_hz: f32,
    /// Number of FIR taps
    pub filter_taps: usize,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            hop_size: 256,
            // Bins 0..=49: roughly 0-1076 Hz at 44.1 kHz
            band_bins: 50,
            cutoff_hz: 5.0,
            filter_taps: 16,
        }
    }
}

/// Which peaks inside one scanned block are accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPolicy {
    /// Accept every qualifying local maximum in the block
    AllPeaks,
    /// Stop scanning after the first accepted peak of the block
    FirstPeak,
}

/// Peak picking parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakPickingConfig {
    /// Fixed threshold `t1` on the smoothed envelope
    pub threshold: f32,
    /// Weight of the trailing mean in the adaptive threshold
    pub lambda: f32,
    /// Number of preceding envelope values averaged into the adaptive threshold
    pub trailing_window: usize,
    pub scan_policy: ScanPolicy,
}

impl Default for PeakPickingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            lambda: 0.4,
            trailing_window: 40,
            scan_policy: ScanPolicy::AllPeaks,
        }
    }
}

/// How accepted peaks are recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridMode {
    /// Fixed 32-slot grid, re-anchored every two bars
    TwoBar,
    /// Growing list of quantized beats, anchored once
    BeatLog,
}

/// Tempo grid parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Tempo in quarter-note beats per minute
    pub bpm: f64,
    pub mode: GridMode,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            bpm: 90.0,
            mode: GridMode::TwoBar,
        }
    }
}

impl AnalyzerConfig {
    /// Default configuration with the given tempo and fixed threshold
    pub fn with_tempo(bpm: f64, threshold: f32) -> Self {
        let mut config = Self::default();
        config.grid.bpm = bpm;
        config.peak_picking.threshold = threshold;
        config
    }

    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or the defaults if the file doesn't exist
    /// or the JSON is invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Envelope values produced per incoming block
    pub fn hops_per_block(&self) -> usize {
        self.stream.block_size / self.envelope.hop_size
    }

    /// Rate at which envelope values are produced, in Hz
    pub fn hop_rate_hz(&self) -> f64 {
        self.stream.sample_rate as f64 / self.envelope.hop_size as f64
    }

    /// Length of one sixteenth-note grid step, in hops
    pub fn grid_step_hops(&self) -> f64 {
        60.0 / self.grid.bpm / 4.0 * self.hop_rate_hz()
    }

    /// Check that the configuration describes a pipeline that can run
    pub fn validate(&self) -> Result<(), PipelineError> {
        let bpm = self.grid.bpm;
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(PipelineError::BpmInvalid { bpm });
        }

        let stream = &self.stream;
        let envelope = &self.envelope;
        let peaks = &self.peak_picking;

        if stream.sample_rate == 0 {
            return Err(PipelineError::invalid_config("sample rate must be > 0"));
        }
        if stream.block_size == 0 || envelope.hop_size == 0 || envelope.fft_size == 0 {
            return Err(PipelineError::invalid_config(
                "block size, hop size and FFT size must be > 0",
            ));
        }
        if stream.block_size % envelope.hop_size != 0 {
            return Err(PipelineError::invalid_config(format!(
                "block size {} is not a multiple of hop size {}",
                stream.block_size, envelope.hop_size
            )));
        }

        // Every analysis frame must fit between the analysis start and the window end
        let hops = self.hops_per_block();
        let frame_reach = (hops - 1) * envelope.hop_size + envelope.fft_size;
        let available = (WINDOW_BLOCKS - ANALYSIS_START_BLOCK) * stream.block_size;
        if frame_reach > available {
            return Err(PipelineError::invalid_config(format!(
                "analysis frames span {} samples but only {} are buffered",
                frame_reach, available
            )));
        }

        if envelope.band_bins == 0 || envelope.band_bins > envelope.fft_size / 2 + 1 {
            return Err(PipelineError::invalid_config(format!(
                "band bins must be within 1..={} (got {})",
                envelope.fft_size / 2 + 1,
                envelope.band_bins
            )));
        }
        if envelope.filter_taps == 0 {
            return Err(PipelineError::invalid_config("filter needs at least one tap"));
        }
        let nyquist = self.hop_rate_hz() / 2.0;
        let cutoff = envelope.cutoff_hz as f64;
        if !cutoff.is_finite() || cutoff <= 0.0 || cutoff >= nyquist {
            return Err(PipelineError::invalid_config(format!(
                "cutoff {} Hz must lie in (0, {:.2}) Hz",
                cutoff, nyquist
            )));
        }

        // A grid step shorter than one hop cannot be resolved by the envelope
        let step_hops = self.grid_step_hops();
        if step_hops < 1.0 {
            return Err(PipelineError::invalid_config(format!(
                "{} BPM gives a grid step of {:.4} hops; at least one hop is required",
                bpm, step_hops
            )));
        }

        if !peaks.threshold.is_finite() || peaks.threshold < 0.0 {
            return Err(PipelineError::invalid_config(
                "threshold must be finite and non-negative",
            ));
        }
        if !peaks.lambda.is_finite() || peaks.lambda < 0.0 {
            return Err(PipelineError::invalid_config(
                "lambda must be finite and non-negative",
            ));
        }
        let look_back = SCAN_START_BLOCK * hops;
        if peaks.trailing_window == 0 || peaks.trailing_window > look_back {
            return Err(PipelineError::invalid_config(format!(
                "trailing window must be within 1..={} (got {})",
                look_back, peaks.trailing_window
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.stream.sample_rate, 44_100);
        assert_eq!(config.stream.block_size, 4096);
        assert_eq!(config.envelope.fft_size, 2048);
        assert_eq!(config.hops_per_block(), 16);
        assert_eq!(config.peak_picking.trailing_window, 40);
        assert_eq!(config.peak_picking.scan_policy, ScanPolicy::AllPeaks);
        assert_eq!(config.grid.mode, GridMode::TwoBar);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_grid_step_at_90_bpm() {
        let config = AnalyzerConfig::with_tempo(90.0, 0.02);
        // 60 / 90 / 4 s per sixteenth at 44100 / 256 hops per second
        let expected = 60.0 / 90.0 / 4.0 * 44_100.0 / 256.0;
        assert!((config.grid_step_hops() - expected).abs() < 1e-9);
        assert!((config.grid_step_hops() - 28.7109375).abs() < 1e-9);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = AnalyzerConfig::default();
        config.peak_picking.scan_policy = ScanPolicy::FirstPeak;
        config.grid.mode = GridMode::BeatLog;
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AnalyzerConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, config);
        assert!(json.contains("\"first_peak\""));
        assert!(json.contains("\"beat_log\""));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed: AnalyzerConfig =
            serde_json::from_str(r#"{ "grid": { "bpm": 120.0 } }"#).unwrap();
        assert_eq!(parsed.grid.bpm, 120.0);
        assert_eq!(parsed.grid.mode, GridMode::TwoBar);
        assert_eq!(parsed.stream, StreamConfig::default());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AnalyzerConfig::load_from_file("/nonexistent/analyzer_config.json");
        assert_eq!(config, AnalyzerConfig::default());
    }

    #[test]
    fn test_rejects_invalid_bpm() {
        for bpm in [0.0, -90.0, f64::NAN, f64::INFINITY] {
            let config = AnalyzerConfig::with_tempo(bpm, 0.02);
            match config.validate() {
                Err(PipelineError::BpmInvalid { .. }) => {}
                other => panic!("Expected BpmInvalid for {}, got {:?}", bpm, other),
            }
        }
    }

    #[test]
    fn test_rejects_tempo_faster_than_one_hop_per_step() {
        for bpm in [3000.0, 1e300, f64::MAX] {
            let config = AnalyzerConfig::with_tempo(bpm, 0.02);
            assert!(
                matches!(config.validate(), Err(PipelineError::InvalidConfig { .. })),
                "{} BPM should be rejected",
                bpm
            );
        }

        // 2583.98 BPM is exactly one hop per sixteenth at the defaults
        assert!(AnalyzerConfig::with_tempo(2500.0, 0.02).validate().is_ok());
    }

    #[test]
    fn test_rejects_misaligned_hop() {
        let mut config = AnalyzerConfig::default();
        config.envelope.hop_size = 300;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_rejects_frames_past_window() {
        let mut config = AnalyzerConfig::default();
        config.envelope.fft_size = 8192;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_rejects_oversized_trailing_window() {
        let mut config = AnalyzerConfig::default();
        // Scan region starts 3 blocks * 16 hops into the history
        config.peak_picking.trailing_window = 49;
        assert!(config.validate().is_err());
        config.peak_picking.trailing_window = 48;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_cutoff_above_hop_nyquist() {
        let mut config = AnalyzerConfig::default();
        config.envelope.cutoff_hz = 100.0;
        assert!(config.validate().is_err());
    }
}
