//! Damping schedule for committed step counts.
//!
//! The solver output is deliberately under-commanded. The first move trusts
//! the model for the full distance; every later move is scaled down to leave
//! margin for model error and hysteresis; a sign reversal against the
//! previous round means the last move overshot, so the step is cut harder
//! still. Committed magnitudes are clamped to a per-round cap so no single
//! move can run the stage far past the target.

use serde::{Deserialize, Serialize};

/// Integer step counts committed to the actuator for one round.
///
/// Zero on an axis means the axis is not commanded this round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCommand {
    /// X stage steps
    pub x: i64,
    /// Y stage steps
    pub y: i64,
}

impl StepCommand {
    /// True when neither axis is commanded.
    pub fn is_zero(&self) -> bool {
        self.x == 0 && self.y == 0
    }
}

/// Scale factors applied to solved step counts before they are committed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainSchedule {
    /// Scale for round 0: move the full modelled distance.
    pub first: f64,
    /// Scale for later rounds, leaving margin for model error.
    pub steady: f64,
    /// Scale applied to the unscaled solve after a sign reversal.
    pub reversal: f64,
    /// Per-round cap on committed step magnitude.
    pub clip: i64,
}

impl Default for GainSchedule {
    fn default() -> Self {
        Self {
            first: 1.0,
            steady: 0.8,
            reversal: 0.4,
            clip: 1000,
        }
    }
}

impl GainSchedule {
    /// Commit a solved step pair for this round.
    ///
    /// Both axes are recomputed from scratch every round; a damped value
    /// that truncates to zero commands nothing. Only the previous round's
    /// committed command feeds back, and only for reversal detection.
    pub fn commit(
        &self,
        steps_x: f64,
        steps_y: f64,
        round: u32,
        previous: StepCommand,
    ) -> StepCommand {
        let scale = if round == 0 { self.first } else { self.steady };
        StepCommand {
            x: self.commit_axis(steps_x, scale, previous.x),
            y: self.commit_axis(steps_y, scale, previous.y),
        }
    }

    fn commit_axis(&self, solved: f64, scale: f64, previous: i64) -> i64 {
        let mut committed = (solved * scale) as i64;
        // A sign flip against the previous committed move means the stage
        // overshot; restart from the fresh solve with the heavier damping.
        if previous != 0 && committed != 0 && (previous < 0) != (committed < 0) {
            committed = (solved * self.reversal) as i64;
        }
        committed.clamp(-self.clip, self.clip)
    }
}
