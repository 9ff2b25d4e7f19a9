//! Modelled stage for exercising the loop without hardware.
//!
//! The plant applies the same gain table the solver inverts, scaled by a
//! configurable error factor to stand in for model mismatch. One shared
//! stage backs both device traits, split into a sensor half and an
//! actuator half.

use std::cell::RefCell;
use std::rc::Rc;

use controller::{
    AngleSensor, Axis, DeviceError, Direction, GainSet, SensorSample, StageActuator,
};

/// Simulated stage plant.
#[derive(Debug)]
pub struct SimStage {
    x: f64,
    y: f64,
    /// Multiplier on the true gains; 1.0 is a perfect model match.
    gain_error: f64,
}

impl SimStage {
    pub fn new(x: f64, y: f64, gain_error: f64) -> Self {
        Self { x, y, gain_error }
    }

    fn apply(&mut self, axis: Axis, steps: i64) {
        let steps = steps as f64;
        match axis {
            Axis::X => {
                let gains =
                    GainSet::for_directions(Direction::from_steps(steps), Direction::Positive);
                self.x += gains.g_xx * steps * self.gain_error;
                self.y += gains.g_xy * steps * self.gain_error;
            }
            Axis::Y => {
                let gains =
                    GainSet::for_directions(Direction::Positive, Direction::from_steps(steps));
                self.y += gains.g_yy * steps * self.gain_error;
                self.x += gains.g_yx * steps * self.gain_error;
            }
        }
    }
}

/// Sensor half of a shared simulated stage.
pub struct SimSensor(Rc<RefCell<SimStage>>);

/// Actuator half of a shared simulated stage.
pub struct SimActuator(Rc<RefCell<SimStage>>);

/// Split a stage into the two device halves the loop needs.
pub fn split(stage: SimStage) -> (SimSensor, SimActuator) {
    let shared = Rc::new(RefCell::new(stage));
    (SimSensor(Rc::clone(&shared)), SimActuator(shared))
}

impl AngleSensor for SimSensor {
    fn sample(&mut self) -> Result<SensorSample, DeviceError> {
        let stage = self.0.borrow();
        Ok(SensorSample {
            absolute: true,
            x: stage.x,
            y: stage.y,
        })
    }
}

impl StageActuator for SimActuator {
    fn move_axis(
        &mut self,
        axis: Axis,
        steps: i64,
        _relative_step_size: u32,
    ) -> Result<(), DeviceError> {
        self.0.borrow_mut().apply(axis, steps);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controller::{AlignmentConfig, AlignmentLoop};

    fn sim_config() -> AlignmentConfig {
        AlignmentConfig {
            settle_floor_s: 0.0,
            settle_divisor: f64::INFINITY,
            ..AlignmentConfig::default()
        }
    }

    #[test]
    fn test_perfect_model_converges_immediately() {
        let (mut sensor, mut actuator) = split(SimStage::new(900.0, 600.0, 1.0));
        let report = AlignmentLoop::new(sim_config())
            .run(&mut sensor, &mut actuator)
            .unwrap();

        // With an exact plant the first full-gain move lands inside
        // tolerance up to integer truncation.
        assert_eq!(report.rounds(), 1);
        assert!(report.final_distance <= 0.2);
    }

    #[test]
    fn test_sluggish_stage_still_converges() {
        let (mut sensor, mut actuator) = split(SimStage::new(900.0, 600.0, 0.7));
        let report = AlignmentLoop::new(sim_config())
            .run(&mut sensor, &mut actuator)
            .unwrap();

        assert!(report.rounds() < 16);
        assert!(report.final_distance <= 0.2);
    }

    #[test]
    fn test_overresponsive_stage_is_damped_into_convergence() {
        // 20% hotter than the model: the first move overshoots, the
        // reversal damping brings it back.
        let (mut sensor, mut actuator) = split(SimStage::new(900.0, 600.0, 1.2));
        let report = AlignmentLoop::new(sim_config())
            .run(&mut sensor, &mut actuator)
            .unwrap();

        assert!(report.rounds() < 16);
        assert!(report.final_distance <= 0.2);
    }

    #[test]
    fn test_negative_travel_converges() {
        // Start beyond the target so both axes need negative moves.
        let (mut sensor, mut actuator) = split(SimStage::new(980.0, 700.0, 1.0));
        let report = AlignmentLoop::new(sim_config())
            .run(&mut sensor, &mut actuator)
            .unwrap();

        assert!(report.rounds() < 16);
        assert!(report.history[0].x < 0);
        assert!(report.history[0].y < 0);
    }
}
