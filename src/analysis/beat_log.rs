// BeatLogMapper - unbounded beat log alternative to the two-bar grid
//
// Anchored once on the first accepted peak and never re-anchored. Each later
// peak is logged with its nearest sixteenth-note index counted from that
// anchor, so the log grows without wrapping.

use serde::{Deserialize, Serialize};

use super::peak_picker::Peak;
use super::quantizer::quantize_steps;

/// One entry in the beat log
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoggedBeat {
    /// Global offset of the peak, in hops
    pub offset: i64,
    /// Sixteenth-note index relative to the anchor peak
    pub beat_index: i64,
    /// Signed deviation from that index, in grid steps
    pub error: f64,
}

pub struct BeatLogMapper {
    step_hops: f64,
    anchor: Option<i64>,
    beats: Vec<LoggedBeat>,
}

impl BeatLogMapper {
    pub fn new(step_hops: f64) -> Self {
        Self {
            step_hops,
            anchor: None,
            beats: Vec::new(),
        }
    }

    /// Log `peak` and return its entry
    pub fn update(&mut self, peak: &Peak) -> LoggedBeat {
        let anchor = *self.anchor.get_or_insert_with(|| {
            tracing::debug!("[BeatLogMapper] Anchored log at offset {}", peak.offset);
            peak.offset
        });

        let steps = (peak.offset - anchor) as f64 / self.step_hops;
        let (beat_index, error) = quantize_steps(steps);
        let beat = LoggedBeat {
            offset: peak.offset,
            beat_index,
            error,
        };
        self.beats.push(beat);
        beat
    }

    pub fn beats(&self) -> &[LoggedBeat] {
        &self.beats
    }

    pub fn anchor(&self) -> Option<i64> {
        self.anchor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(offset: i64) -> Peak {
        Peak { offset, value: 0.3 }
    }

    #[test]
    fn test_first_peak_is_beat_zero() {
        let mut log = BeatLogMapper::new(28.7109375);
        let beat = log.update(&peak(70));
        assert_eq!(beat.beat_index, 0);
        assert_eq!(beat.error, 0.0);
        assert_eq!(log.anchor(), Some(70));
    }

    #[test]
    fn test_log_grows_past_two_bars_without_wrapping() {
        let mut log = BeatLogMapper::new(10.0);
        for k in 0..40i64 {
            log.update(&peak(k * 10));
        }

        assert_eq!(log.beats().len(), 40);
        assert_eq!(log.beats()[39].beat_index, 39);
        assert_eq!(log.anchor(), Some(0));
    }

    #[test]
    fn test_error_is_kept_per_entry() {
        let mut log = BeatLogMapper::new(10.0);
        log.update(&peak(5));
        let late = log.update(&peak(38));
        let early = log.update(&peak(402));

        assert_eq!(late.beat_index, 3);
        assert!((late.error - 0.3).abs() < 1e-9);
        assert_eq!(early.beat_index, 40);
        assert!((early.error + 0.3).abs() < 1e-9);
    }
}
