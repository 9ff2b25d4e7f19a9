//! The convergence loop: read, solve, damp, command, settle, re-read.
//!
//! One `run` drives the stage from wherever it is onto the configured
//! target. The loop owns all round-to-round state; nothing persists across
//! runs. Strictly sequential: the only suspension point is the settling
//! pause after a commanded move, during which the stage must come to rest
//! before the next measurement means anything.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AlignmentError;
use crate::interface::{AngleSensor, Axis, StageActuator};
use crate::schedule::{GainSchedule, StepCommand};
use crate::solver::{self, Solution};

/// Angular position reported by the autocollimator, in arcseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// Euclidean distance to `other` in arcseconds.
    pub fn distance_to(&self, other: Position) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// Fixed parameters for one alignment run.
///
/// Set at start, never reloaded mid-run.
#[derive(Debug, Clone)]
pub struct AlignmentConfig {
    /// Target position in arcseconds.
    pub target: Position,
    /// Convergence tolerance on the Euclidean error, arcseconds.
    pub goal_dist: f64,
    /// Rounds allowed before the run is declared overshooting.
    pub max_rounds: u32,
    /// Damping schedule for committed step counts.
    pub schedule: GainSchedule,
    /// Piezo step-size parameter forwarded to the stage controller.
    pub relative_step_size: u32,
    /// Minimum settling time after any commanded move, seconds.
    pub settle_floor_s: f64,
    /// Extra settling time: one second per this many solved steps.
    pub settle_divisor: f64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            target: Position { x: 937.0, y: 653.0 },
            goal_dist: 0.2,
            max_rounds: 15,
            schedule: GainSchedule::default(),
            relative_step_size: 50,
            settle_floor_s: 1.0,
            settle_divisor: 500.0,
        }
    }
}

/// What a converged run did, round by round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Committed command per round, in order.
    pub history: Vec<StepCommand>,
    /// Euclidean error at termination, arcseconds.
    pub final_distance: f64,
}

impl RunReport {
    /// Rounds commanded before convergence.
    pub fn rounds(&self) -> usize {
        self.history.len()
    }
}

/// Loop-carried state, created at entry and discarded on termination.
#[derive(Debug, Default)]
struct RoundState {
    round: u32,
    previous: StepCommand,
    history: Vec<StepCommand>,
}

/// Closed-loop alignment driver.
pub struct AlignmentLoop {
    config: AlignmentConfig,
}

impl AlignmentLoop {
    pub fn new(config: AlignmentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlignmentConfig {
        &self.config
    }

    /// Drive the stage until the measured position converges on the target.
    ///
    /// Returns the run report on convergence. Every error is fatal: the
    /// sensor contract was violated, the actuator failed, or the loop ran
    /// out of rounds ([`AlignmentError::OvershootBudget`]).
    pub fn run<S, A>(&self, sensor: &mut S, actuator: &mut A) -> Result<RunReport, AlignmentError>
    where
        S: AngleSensor,
        A: StageActuator,
    {
        let cfg = &self.config;
        let mut state = RoundState::default();

        let mut current = self.read_position(sensor)?;
        let mut dist = current.distance_to(cfg.target);
        info!(
            "starting position ({:.2}, {:.2}), {:.2} arcsec from target",
            current.x, current.y, dist
        );

        while dist > cfg.goal_dist {
            let delta_x = cfg.target.x - current.x;
            let delta_y = cfg.target.y - current.y;
            debug!(
                "round {}: desired change ({:.2}, {:.2}) arcsec",
                state.round, delta_x, delta_y
            );

            let solution = solver::resolve_and_solve(delta_x, delta_y)?;
            let command =
                cfg.schedule
                    .commit(solution.steps_x, solution.steps_y, state.round, state.previous);

            if state.round > cfg.max_rounds {
                return Err(AlignmentError::OvershootBudget {
                    rounds: state.round,
                });
            }

            if command.x != 0 {
                info!("moving X: {} steps", command.x);
                actuator
                    .move_axis(Axis::X, command.x, cfg.relative_step_size)
                    .map_err(AlignmentError::Actuator)?;
            }
            if command.y != 0 {
                info!("moving Y: {} steps", command.y);
                actuator
                    .move_axis(Axis::Y, command.y, cfg.relative_step_size)
                    .map_err(AlignmentError::Actuator)?;
            }

            state.previous = command;
            state.round += 1;
            state.history.push(command);

            let pause = self.settle_time(&solution);
            debug!("settling for {:.2} s", pause.as_secs_f64());
            thread::sleep(pause);

            current = self.read_position(sensor)?;
            dist = current.distance_to(cfg.target);
            info!(
                "round {} done: position ({:.2}, {:.2}), {:.2} arcsec from target",
                state.round - 1,
                current.x,
                current.y,
                dist
            );
        }

        info!(
            "converged {:.3} arcsec from target after {} rounds",
            dist, state.round
        );
        Ok(RunReport {
            history: state.history,
            final_distance: dist,
        })
    }

    /// Read and validate one position.
    ///
    /// The device must be in absolute mode, and a coordinate of exactly
    /// zero is its saturation sentinel; either condition kills the run.
    fn read_position<S: AngleSensor>(&self, sensor: &mut S) -> Result<Position, AlignmentError> {
        let sample = sensor.sample().map_err(AlignmentError::SensorUnavailable)?;
        if !sample.absolute {
            return Err(AlignmentError::CalibrationMode);
        }
        if sample.x == 0.0 || sample.y == 0.0 {
            return Err(AlignmentError::OutOfRange {
                x: sample.x,
                y: sample.y,
            });
        }
        Ok(Position {
            x: sample.x,
            y: sample.y,
        })
    }

    /// Settling pause for a commanded round.
    ///
    /// Proportional to the solved (pre-damping) magnitudes so larger moves
    /// settle longer, with the configured floor as a minimum.
    fn settle_time(&self, solution: &Solution) -> Duration {
        let cfg = &self.config;
        let x = cfg.settle_floor_s + solution.steps_x.abs() / cfg.settle_divisor;
        let y = cfg.settle_floor_s + solution.steps_y.abs() / cfg.settle_divisor;
        Duration::from_secs_f64(x.max(y))
    }
}
