//! Device interfaces the control loop drives.
//!
//! Abstracts the autocollimator and the stage actuator so the loop can be
//! exercised against mocks and simulated stages as well as real hardware.
//! The drivers in the `hardware` crate implement these traits.

use std::fmt;

/// Boxed driver error carried across the trait seam.
pub type DeviceError = Box<dyn std::error::Error + Send + Sync>;

/// Stage axis selector.
///
/// The stage controller addresses its two tilt stages as channels 1 and 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// Controller channel the axis maps to.
    pub fn channel(self) -> u8 {
        match self {
            Axis::X => 1,
            Axis::Y => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "X"),
            Axis::Y => write!(f, "Y"),
        }
    }
}

/// One raw autocollimator measurement.
///
/// Validation (absolute mode, range sentinel) is the loop's job; the sensor
/// reports what the device said.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// False when the device measures relative to an arbitrary reference
    /// instead of its absolute scale.
    pub absolute: bool,
    /// X-axis reading in arcseconds
    pub x: f64,
    /// Y-axis reading in arcseconds
    pub y: f64,
}

/// Two-axis angular position sensor.
pub trait AngleSensor {
    /// Take one measurement.
    fn sample(&mut self) -> Result<SensorSample, DeviceError>;
}

/// Stepper actuator moving the stage.
pub trait StageActuator {
    /// Command a relative move of `steps` actuator steps on one axis.
    ///
    /// `relative_step_size` is forwarded to the stage controller as its
    /// piezo step-size parameter. The call is synchronous from the loop's
    /// point of view; mechanical settling is handled by the caller's pause.
    fn move_axis(
        &mut self,
        axis: Axis,
        steps: i64,
        relative_step_size: u32,
    ) -> Result<(), DeviceError>;
}
