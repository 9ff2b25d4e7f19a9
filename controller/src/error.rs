//! Fatal conditions that abort an alignment run.
//!
//! Every variant is terminal. The measurement channel cannot be trusted
//! after a sensor fault, and a loop that exhausts its round budget is
//! diverging; in either case the run stops and must be restarted by an
//! operator, possibly with adjusted gains. Nothing is retried.

use thiserror::Error;

use crate::interface::DeviceError;

/// Terminal failure of an alignment run.
#[derive(Debug, Error)]
pub enum AlignmentError {
    /// The autocollimator read failed outright.
    #[error("failed to read position: {0}")]
    SensorUnavailable(#[source] DeviceError),

    /// The autocollimator is in relative mode and cannot serve as an
    /// absolute reference.
    #[error("autocollimator is in relative measurement mode")]
    CalibrationMode,

    /// A coordinate of exactly zero is the device's out-of-range sentinel.
    #[error("autocollimator outside range (x = {x}, y = {y})")]
    OutOfRange { x: f64, y: f64 },

    /// The gain model produced a system that cannot be inverted.
    ///
    /// The fixed gain table is never singular; this indicates a programming
    /// or model error.
    #[error("motion model is singular")]
    SingularModel,

    /// The loop exhausted its round budget without converging.
    #[error("no convergence after {rounds} rounds; aborting before the stage oscillates further")]
    OvershootBudget { rounds: u32 },

    /// The stage controller rejected or failed a move command.
    #[error("actuator command failed: {0}")]
    Actuator(#[source] DeviceError),
}
