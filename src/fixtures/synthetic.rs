//! Deterministic synthetic drum patterns.
//!
//! Renders decaying low sine bursts on sixteenth-note steps so the analyzer
//! can be exercised end to end without recorded audio. Noise, when enabled,
//! comes from a seeded `StdRng` and is identical on every run.

use std::f64::consts::PI;
use std::path::Path;

use anyhow::{Context, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::StreamConfig;

/// Fundamental of the synthetic kick
pub const HIT_FREQUENCY_HZ: f64 = 60.0;
/// Exponential decay time constant in seconds
pub const HIT_DECAY_S: f64 = 0.05;
/// Peak amplitude relative to full scale
pub const HIT_AMPLITUDE: f64 = 0.9;
/// Rendered length of one hit in seconds
pub const HIT_DURATION_S: f64 = 0.25;

/// Silent blocks appended after the last hit so its peak gets reported
const TAIL_BLOCKS: usize = 3;

/// One decaying sine burst at `sample_rate`
pub fn drum_hit(sample_rate: u32) -> Vec<f64> {
    let len = (sample_rate as f64 * HIT_DURATION_S) as usize;
    (0..len)
        .map(|n| {
            let t = n as f64 / sample_rate as f64;
            HIT_AMPLITUDE * (-t / HIT_DECAY_S).exp() * (2.0 * PI * HIT_FREQUENCY_HZ * t).sin()
        })
        .collect()
}

/// Samples per sixteenth-note step at `bpm`
pub fn step_samples(bpm: f64, sample_rate: u32) -> f64 {
    60.0 / bpm / 4.0 * sample_rate as f64
}

/// Hits placed on sixteenth-note steps after a silent lead-in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticPattern {
    pub bpm: f64,
    /// Hit positions in sixteenth-note steps; fractional steps render off-grid hits
    pub steps: Vec<f64>,
    /// Silent blocks before step 0
    #[serde(default = "default_lead_in_blocks")]
    pub lead_in_blocks: usize,
    /// Total rendered length; derived from the last hit when absent
    #[serde(default)]
    pub total_blocks: Option<usize>,
    /// Uniform noise amplitude relative to full scale (0 disables)
    #[serde(default)]
    pub noise: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_lead_in_blocks() -> usize {
    5
}

fn default_seed() -> u64 {
    0x5A5A_FFF0
}

impl SyntheticPattern {
    pub fn new(bpm: f64, steps: Vec<f64>) -> Self {
        Self {
            bpm,
            steps,
            lead_in_blocks: default_lead_in_blocks(),
            total_blocks: None,
            noise: 0.0,
            seed: default_seed(),
        }
    }

    pub fn with_lead_in_blocks(mut self, blocks: usize) -> Self {
        self.lead_in_blocks = blocks;
        self
    }

    pub fn with_total_blocks(mut self, blocks: usize) -> Self {
        self.total_blocks = Some(blocks);
        self
    }

    pub fn with_noise(mut self, amplitude: f64, seed: u64) -> Self {
        self.noise = amplitude;
        self.seed = seed;
        self
    }

    fn hit_start(&self, step: f64, stream: &StreamConfig) -> usize {
        let offset = (step * step_samples(self.bpm, stream.sample_rate)).round();
        self.lead_in_blocks * stream.block_size + offset.max(0.0) as usize
    }

    /// Rendered length in blocks
    pub fn block_count(&self, stream: &StreamConfig) -> usize {
        if let Some(blocks) = self.total_blocks {
            return blocks;
        }

        let hit_len = drum_hit(stream.sample_rate).len();
        let end = self
            .steps
            .iter()
            .map(|&step| self.hit_start(step, stream) + hit_len)
            .max()
            .unwrap_or(self.lead_in_blocks * stream.block_size);
        end.div_ceil(stream.block_size) + TAIL_BLOCKS
    }

    /// Render the pattern as 16-bit PCM, a whole number of blocks long
    pub fn render(&self, stream: &StreamConfig) -> Vec<i16> {
        let total = self.block_count(stream) * stream.block_size;
        let hit = drum_hit(stream.sample_rate);
        let mut mix = vec![0.0f64; total];

        for &step in &self.steps {
            let start = self.hit_start(step, stream);
            for (sample, value) in mix.iter_mut().skip(start).zip(&hit) {
                *sample += value;
            }
        }

        if self.noise > 0.0 {
            let mut rng = StdRng::seed_from_u64(self.seed);
            for sample in mix.iter_mut() {
                *sample += rng.gen_range(-self.noise..self.noise);
            }
        }

        mix.into_iter()
            .map(|value| {
                (value * i16::MAX as f64)
                    .round()
                    .clamp(i16::MIN as f64, i16::MAX as f64) as i16
            })
            .collect()
    }
}

/// Write mono 16-bit PCM to `path`
pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    writer
        .finalize()
        .with_context(|| format!("finalizing {}", path.display()))?;
    Ok(())
}
