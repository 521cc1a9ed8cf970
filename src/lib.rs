// Drum Beat Analyzer - streaming onset detection on a tempo grid
// Block-synchronous DSP pipeline: spectral envelope, smoothing, peak picking, beat grid

// Module declarations
pub mod analysis;
pub mod config;
pub mod error;
pub mod fixtures;

// Re-exports for convenience
pub use analysis::beat_log::LoggedBeat;
pub use analysis::peak_picker::{threshold_from_sensitivity, Peak};
pub use analysis::quantizer::{BeatGrid, Difficulty, TimingClassification, GRID_SLOTS};
pub use analysis::{BeatAnalyzer, PeakEvent};
pub use config::{AnalyzerConfig, GridMode, ScanPolicy};
pub use error::{ErrorCode, PipelineError};
