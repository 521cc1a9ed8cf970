// Analysis module - streaming DSP pipeline for beat detection and grid placement
//
// This module owns the complete per-block pipeline, turning fixed-size blocks
// of raw PCM into peak events placed on a tempo grid.
//
// Architecture:
// - BeatAnalyzer: owns every buffer; `feed` consumes one block synchronously
// - Pipeline: SampleWindow → SpectralEnvelopeExtractor → EnvelopeSmoother →
//   EnvelopeHistory → PeakPicker → BeatGridMapper (or BeatLogMapper)
// - Output: PeakEvent per accepted peak, plus grid/log accessors

pub mod beat_log;
pub mod envelope;
pub mod peak_picker;
pub mod quantizer;
pub mod sample_window;

use serde::{Deserialize, Serialize};

use crate::config::{AnalyzerConfig, GridMode};
use crate::error::{log_pipeline_error, PipelineError};

use beat_log::{BeatLogMapper, LoggedBeat};
use envelope::{EnvelopeHistory, EnvelopeSmoother, SpectralEnvelopeExtractor};
use peak_picker::{Peak, PeakPicker};
use quantizer::{BeatGrid, BeatGridMapper, GRID_SLOTS};
use sample_window::SampleWindow;

/// Blocks of audio held in the sample look-back window
pub const WINDOW_BLOCKS: usize = 4;
/// Block index (into the window) where the first analysis frame starts
pub const ANALYSIS_START_BLOCK: usize = 2;
/// Blocks of smoothed envelope held for peak picking
pub const HISTORY_BLOCKS: usize = 5;
/// Block index (into the history) where the scanned region starts
pub const SCAN_START_BLOCK: usize = 3;

/// One accepted peak and where it landed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakEvent {
    /// Block (1-based) whose `feed` call reported this peak
    pub block: u64,
    /// Global position in hops, corrected for pipeline latency
    pub offset: i64,
    /// Smoothed envelope value at the peak
    pub value: f32,
    /// Grid slot in two-bar mode, beat index from the first peak in beat-log mode
    pub slot: i64,
    /// Signed deviation from `slot`, in grid steps
    pub error: f64,
    /// The two-bar grid was cleared and re-anchored on this peak
    pub reanchored: bool,
}

enum BeatMapping {
    Grid(BeatGridMapper),
    Log(BeatLogMapper),
}

impl BeatMapping {
    fn place(&mut self, block: u64, peak: &Peak) -> PeakEvent {
        match self {
            BeatMapping::Grid(mapper) => {
                let update = mapper.update(peak);
                PeakEvent {
                    block,
                    offset: peak.offset,
                    value: peak.value,
                    slot: update.slot as i64,
                    error: update.error,
                    reanchored: update.reanchored,
                }
            }
            BeatMapping::Log(mapper) => {
                let beat = mapper.update(peak);
                PeakEvent {
                    block,
                    offset: peak.offset,
                    value: peak.value,
                    slot: beat.beat_index,
                    error: beat.error,
                    reanchored: false,
                }
            }
        }
    }
}

/// Streaming beat analyzer
///
/// Blocks 1-3 only fill the sample window. Block 4 produces the first
/// envelope values, and peaks can be reported from block 5 onwards.
pub struct BeatAnalyzer {
    config: AnalyzerConfig,
    window: SampleWindow,
    extractor: SpectralEnvelopeExtractor,
    smoother: EnvelopeSmoother,
    history: EnvelopeHistory,
    picker: PeakPicker,
    mapping: BeatMapping,
    // Reused per block
    envelope: Vec<f32>,
    iteration: u64,
}

impl BeatAnalyzer {
    /// Analyzer with default geometry at `bpm`, using fixed threshold `threshold`
    pub fn new(bpm: f64, threshold: f32) -> Result<Self, PipelineError> {
        Self::with_config(AnalyzerConfig::with_tempo(bpm, threshold))
    }

    pub fn with_config(config: AnalyzerConfig) -> Result<Self, PipelineError> {
        if let Err(err) = config.validate() {
            log_pipeline_error(&err, "BeatAnalyzer::with_config");
            return Err(err);
        }

        let hops_per_block = config.hops_per_block();
        let step_hops = config.grid_step_hops();
        let mapping = match config.grid.mode {
            GridMode::TwoBar => BeatMapping::Grid(BeatGridMapper::new(step_hops)),
            GridMode::BeatLog => BeatMapping::Log(BeatLogMapper::new(step_hops)),
        };
        let picker = PeakPicker::new(&config);

        tracing::info!(
            "[BeatAnalyzer] {} BPM, {} Hz, block {}, fft {}, hop {}, t1 {:.3}, step {:.3} hops, latency {} hops, {:?}",
            config.grid.bpm,
            config.stream.sample_rate,
            config.stream.block_size,
            config.envelope.fft_size,
            config.envelope.hop_size,
            config.peak_picking.threshold,
            step_hops,
            picker.latency_offset(),
            config.grid.mode
        );

        Ok(Self {
            window: SampleWindow::new(config.stream.block_size, WINDOW_BLOCKS),
            extractor: SpectralEnvelopeExtractor::new(&config),
            smoother: EnvelopeSmoother::new(
                config.envelope.cutoff_hz as f64,
                config.hop_rate_hz(),
                config.envelope.filter_taps,
            ),
            history: EnvelopeHistory::new(hops_per_block, HISTORY_BLOCKS),
            picker,
            mapping,
            envelope: vec![0.0; hops_per_block],
            iteration: 0,
            config,
        })
    }

    /// Consume one block of samples and return the peaks it revealed
    ///
    /// # Errors
    /// `BlockLengthMismatch` if `block` is not exactly one block long; the
    /// analyzer is left untouched in that case.
    pub fn feed(&mut self, block: &[i16]) -> Result<Vec<PeakEvent>, PipelineError> {
        let expected = self.config.stream.block_size;
        if block.len() != expected {
            let err = PipelineError::BlockLengthMismatch {
                expected,
                actual: block.len(),
            };
            log_pipeline_error(&err, "BeatAnalyzer::feed");
            return Err(err);
        }

        self.iteration += 1;
        self.window.append(block);

        if self.iteration < WINDOW_BLOCKS as u64 {
            tracing::trace!(
                "[BeatAnalyzer] Warm-up block {}/{}",
                self.iteration,
                WINDOW_BLOCKS
            );
            return Ok(Vec::new());
        }

        self.extractor.extract_into(&self.window, &mut self.envelope);
        self.smoother.process_block(&mut self.envelope);
        self.history.append(&self.envelope);

        if self.iteration == WINDOW_BLOCKS as u64 {
            tracing::trace!("[BeatAnalyzer] First envelope block buffered");
            return Ok(Vec::new());
        }

        let peaks = self.picker.pick(&self.history, self.iteration);
        let mut events = Vec::with_capacity(peaks.len());
        for peak in &peaks {
            let event = self.mapping.place(self.iteration, peak);
            tracing::debug!(
                "[BeatAnalyzer] Peak at offset {} (value {:.4}) -> slot {}, error {:+.3}",
                event.offset,
                event.value,
                event.slot,
                event.error
            );
            events.push(event);
        }

        Ok(events)
    }

    /// Current two-bar grid; `None` in beat-log mode
    pub fn grid(&self) -> Option<&BeatGrid> {
        match &self.mapping {
            BeatMapping::Grid(mapper) => Some(mapper.grid()),
            BeatMapping::Log(_) => None,
        }
    }

    /// Slot occupancy of the two-bar grid; `None` in beat-log mode
    pub fn occupancy(&self) -> Option<&[bool; GRID_SLOTS]> {
        self.grid().map(BeatGrid::occupancy)
    }

    /// Slot timing errors, parallel to `occupancy`
    pub fn errors(&self) -> Option<&[f64; GRID_SLOTS]> {
        self.grid().map(BeatGrid::errors)
    }

    /// Every logged beat; `None` in two-bar mode
    pub fn beat_log(&self) -> Option<&[LoggedBeat]> {
        match &self.mapping {
            BeatMapping::Log(mapper) => Some(mapper.beats()),
            BeatMapping::Grid(_) => None,
        }
    }

    /// Blocks consumed so far
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Peaks accepted since construction
    pub fn peak_count(&self) -> u64 {
        self.picker.peak_count()
    }

    pub fn latency_offset(&self) -> i64 {
        self.picker.latency_offset()
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }
}
