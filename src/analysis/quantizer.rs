//! Quantizer - beat-grid placement and timing feedback
//!
//! This module maps accepted envelope peaks onto a two-bar grid of sixteenth
//! notes. Key features:
//! - The first peak anchors the grid at slot 0
//! - Later peaks are placed by their distance from the anchor, measured in
//!   grid steps, with the signed fractional remainder kept as timing error
//! - When a peak lands past the last slot the grid is cleared and re-anchored
//!   on that peak, keeping its phase within the new two-bar cycle
//! - ON_TIME/EARLY/LATE classification of the stored errors per difficulty

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::peak_picker::Peak;

/// Two bars of sixteenth notes
pub const GRID_SLOTS: usize = 32;

/// Timing classification for onset accuracy relative to the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimingClassification {
    /// Onset is within tolerance of its grid step
    OnTime,
    /// Onset arrived at least one tolerance ahead of its grid step
    Early,
    /// Onset arrived at least one tolerance after its grid step
    Late,
}

/// Scoring strictness; tolerances are fractions of one grid step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Expert,
    Normal,
    Easy,
}

impl Difficulty {
    pub fn tolerance(self) -> f64 {
        match self {
            Difficulty::Expert => 0.10,
            Difficulty::Normal => 0.15,
            Difficulty::Easy => 0.20,
        }
    }

    /// Classify a signed timing error (in grid steps)
    pub fn classify(self, error: f64) -> TimingClassification {
        let tolerance = self.tolerance();
        if error <= -tolerance {
            TimingClassification::Early
        } else if error >= tolerance {
            TimingClassification::Late
        } else {
            TimingClassification::OnTime
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "expert" => Ok(Difficulty::Expert),
            "normal" => Ok(Difficulty::Normal),
            "easy" => Ok(Difficulty::Easy),
            other => Err(format!(
                "unknown difficulty '{}' (expected expert, normal or easy)",
                other
            )),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Difficulty::Expert => "expert",
            Difficulty::Normal => "normal",
            Difficulty::Easy => "easy",
        };
        f.write_str(name)
    }
}

/// Fixed two-bar grid of occupancy flags and timing errors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatGrid {
    occupied: [bool; GRID_SLOTS],
    /// Signed fractional deviation from the slot, in grid steps
    errors: [f64; GRID_SLOTS],
}

impl Default for BeatGrid {
    fn default() -> Self {
        Self {
            occupied: [false; GRID_SLOTS],
            errors: [0.0; GRID_SLOTS],
        }
    }
}

impl BeatGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty every slot
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Mark `slot` occupied, overwriting any previous error
    pub fn mark(&mut self, slot: usize, error: f64) {
        self.occupied[slot] = true;
        self.errors[slot] = error;
    }

    pub fn is_occupied(&self, slot: usize) -> bool {
        self.occupied[slot]
    }

    pub fn error(&self, slot: usize) -> f64 {
        self.errors[slot]
    }

    pub fn occupancy(&self) -> &[bool; GRID_SLOTS] {
        &self.occupied
    }

    pub fn errors(&self) -> &[f64; GRID_SLOTS] {
        &self.errors
    }

    pub fn occupied_slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..GRID_SLOTS).filter(move |&slot| self.occupied[slot])
    }

    /// Timing classification per slot; `None` for empty slots
    pub fn classify(&self, difficulty: Difficulty) -> [Option<TimingClassification>; GRID_SLOTS] {
        let mut verdicts = [None; GRID_SLOTS];
        for slot in self.occupied_slots() {
            verdicts[slot] = Some(difficulty.classify(self.errors[slot]));
        }
        verdicts
    }
}

/// Grid origin for the current two-bar cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    /// Global offset (hops) of the peak that defines slot `slot_offset`
    pub reference: i64,
    /// Slot the reference peak occupies in the current cycle
    pub slot_offset: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperState {
    Unanchored,
    Anchored(Anchor),
}

/// Placement of one peak on the grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridUpdate {
    pub slot: usize,
    pub error: f64,
    /// The grid was cleared and re-anchored on this peak
    pub reanchored: bool,
}

/// Nearest step and signed remainder for a distance in grid steps
pub(crate) fn quantize_steps(steps: f64) -> (i64, f64) {
    let nearest = steps.round();
    (nearest as i64, steps - nearest)
}

/// Places accepted peaks on the two-bar grid
pub struct BeatGridMapper {
    /// Length of one sixteenth-note step, in hops
    step_hops: f64,
    state: MapperState,
    grid: BeatGrid,
}

impl BeatGridMapper {
    /// # Arguments
    /// * `step_hops` - Sixteenth-note duration in hops: `60 / bpm / 4 * sample_rate / hop_size`
    pub fn new(step_hops: f64) -> Self {
        Self {
            step_hops,
            state: MapperState::Unanchored,
            grid: BeatGrid::new(),
        }
    }

    /// Place `peak` on the grid
    pub fn update(&mut self, peak: &Peak) -> GridUpdate {
        let anchor = match self.state {
            MapperState::Unanchored => {
                let anchor = Anchor {
                    reference: peak.offset,
                    slot_offset: 0,
                };
                self.state = MapperState::Anchored(anchor);
                self.grid.mark(0, 0.0);
                tracing::debug!("[BeatGridMapper] Anchored grid at offset {}", peak.offset);
                return GridUpdate {
                    slot: 0,
                    error: 0.0,
                    reanchored: false,
                };
            }
            MapperState::Anchored(anchor) => anchor,
        };

        let steps = (peak.offset - anchor.reference) as f64 / self.step_hops;
        let (nearest, error) = quantize_steps(steps);
        // Widened so a saturated step count cannot overflow
        let slot = nearest as i128 + anchor.slot_offset as i128;
        let mut reanchored = false;

        let slot = if (0..GRID_SLOTS as i128).contains(&slot) {
            slot as i64
        } else {
            let wrapped = slot.rem_euclid(GRID_SLOTS as i128) as i64;
            tracing::info!(
                "[BeatGridMapper] Slot {} past two bars; re-anchoring at offset {} (slot {})",
                slot,
                peak.offset,
                wrapped
            );
            self.grid.clear();
            self.state = MapperState::Anchored(Anchor {
                reference: peak.offset,
                slot_offset: wrapped,
            });
            reanchored = true;
            wrapped
        };

        let slot = slot as usize;
        self.grid.mark(slot, error);

        GridUpdate {
            slot,
            error,
            reanchored,
        }
    }

    pub fn grid(&self) -> &BeatGrid {
        &self.grid
    }

    pub fn state(&self) -> MapperState {
        self.state
    }

    pub fn anchor(&self) -> Option<Anchor> {
        match self.state {
            MapperState::Anchored(anchor) => Some(anchor),
            MapperState::Unanchored => None,
        }
    }
}
