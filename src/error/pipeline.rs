// Pipeline error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Pipeline error code constants
///
/// Error code range: 1001-1003
pub struct PipelineErrorCodes {}

impl PipelineErrorCodes {
    /// BPM value is invalid (must be finite and > 0)
    pub const BPM_INVALID: i32 = 1001;

    /// Audio block length differs from the configured block size
    pub const BLOCK_LENGTH_MISMATCH: i32 = 1002;

    /// Analyzer configuration cannot produce a working pipeline
    pub const INVALID_CONFIG: i32 = 1003;
}

/// Log a pipeline error with structured context
///
/// Fields logged:
/// - error_code: Numeric error code for programmatic handling
/// - message: Human-readable error message
/// - context: Caller-supplied location of the failure
pub fn log_pipeline_error(err: &PipelineError, context: &str) {
    error!(
        "Pipeline error in {}: code={}, component=BeatAnalyzer, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors reported by the beat analysis pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// BPM value is invalid (must be finite and > 0)
    BpmInvalid { bpm: f64 },

    /// Block handed to `feed` does not match the configured block size.
    /// No pipeline state is touched when this is returned.
    BlockLengthMismatch { expected: usize, actual: usize },

    /// Configuration rejected during validation
    InvalidConfig { reason: String },
}

impl PipelineError {
    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        PipelineError::InvalidConfig {
            reason: reason.into(),
        }
    }
}

impl ErrorCode for PipelineError {
    fn code(&self) -> i32 {
        match self {
            PipelineError::BpmInvalid { .. } => PipelineErrorCodes::BPM_INVALID,
            PipelineError::BlockLengthMismatch { .. } => {
                PipelineErrorCodes::BLOCK_LENGTH_MISMATCH
            }
            PipelineError::InvalidConfig { .. } => PipelineErrorCodes::INVALID_CONFIG,
        }
    }

    fn message(&self) -> String {
        match self {
            PipelineError::BpmInvalid { bpm } => {
                format!("BPM must be a finite value greater than 0 (got {})", bpm)
            }
            PipelineError::BlockLengthMismatch { expected, actual } => {
                format!(
                    "Audio block must contain exactly {} samples (got {})",
                    expected, actual
                )
            }
            PipelineError::InvalidConfig { reason } => {
                format!("Invalid analyzer configuration: {}", reason)
            }
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PipelineError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for PipelineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            PipelineError::BpmInvalid { bpm: 0.0 },
            PipelineError::BlockLengthMismatch {
                expected: 4096,
                actual: 10,
            },
            PipelineError::invalid_config("hop size is zero"),
        ];

        let codes: Vec<i32> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes, vec![1001, 1002, 1003]);
    }

    #[test]
    fn test_block_length_message_mentions_sizes() {
        let err = PipelineError::BlockLengthMismatch {
            expected: 4096,
            actual: 512,
        };
        let message = err.message();
        assert!(message.contains("4096"));
        assert!(message.contains("512"));
        assert!(err.to_string().contains("code 1002"));
    }
}
