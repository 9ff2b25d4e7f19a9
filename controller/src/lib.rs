//! Closed-loop alignment controller for the grating stage.
//!
//! The stage is tilted in two coupled axes by a cryogenic stepper actuator
//! while an autocollimator reports the resulting angular position in
//! arcseconds. This crate implements the control loop that drives the stage
//! onto a target position:
//!
//! 1. read the current position from the autocollimator,
//! 2. invert the linearized two-axis motion model to get actuator step
//!    counts ([`solver`]),
//! 3. damp the solved counts to avoid overshoot from model error and
//!    hysteresis ([`schedule`]),
//! 4. command the stage, wait for it to mechanically settle, re-measure,
//! 5. repeat until the Euclidean error is within tolerance ([`run`]).
//!
//! The actuator response is asymmetric between positive and negative travel,
//! so the model coefficients are selected per intended direction ([`gains`]).
//!
//! Hardware is reached through the [`interface`] traits; the drivers live in
//! the `hardware` crate and anything implementing the traits (mocks, a
//! simulated stage) can stand in for them.

pub mod error;
pub mod gains;
pub mod interface;
pub mod run;
pub mod schedule;
pub mod solver;

pub use error::AlignmentError;
pub use gains::{Direction, GainSet};
pub use interface::{AngleSensor, Axis, DeviceError, SensorSample, StageActuator};
pub use run::{AlignmentConfig, AlignmentLoop, Position, RunReport};
pub use schedule::{GainSchedule, StepCommand};
pub use solver::{resolve_and_solve, solve_steps, Solution};
