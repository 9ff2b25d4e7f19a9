//! Full-loop scenarios driven through scripted mock devices.

use std::collections::VecDeque;

use controller::{
    AlignmentConfig, AlignmentError, AlignmentLoop, AngleSensor, Axis, DeviceError, SensorSample,
    StageActuator,
};

/// Sensor that replays a fixed sequence of readings.
struct ScriptedSensor {
    samples: VecDeque<SensorSample>,
}

impl ScriptedSensor {
    fn new(samples: impl IntoIterator<Item = (bool, f64, f64)>) -> Self {
        Self {
            samples: samples
                .into_iter()
                .map(|(absolute, x, y)| SensorSample { absolute, x, y })
                .collect(),
        }
    }
}

impl AngleSensor for ScriptedSensor {
    fn sample(&mut self) -> Result<SensorSample, DeviceError> {
        self.samples
            .pop_front()
            .ok_or_else(|| "sensor script exhausted".into())
    }
}

/// Sensor that returns the same reading forever.
struct StuckSensor {
    x: f64,
    y: f64,
}

impl AngleSensor for StuckSensor {
    fn sample(&mut self) -> Result<SensorSample, DeviceError> {
        Ok(SensorSample {
            absolute: true,
            x: self.x,
            y: self.y,
        })
    }
}

/// Actuator that records every commanded move.
#[derive(Default)]
struct RecordingActuator {
    moves: Vec<(Axis, i64, u32)>,
}

impl StageActuator for RecordingActuator {
    fn move_axis(
        &mut self,
        axis: Axis,
        steps: i64,
        relative_step_size: u32,
    ) -> Result<(), DeviceError> {
        self.moves.push((axis, steps, relative_step_size));
        Ok(())
    }
}

fn fast_config() -> AlignmentConfig {
    AlignmentConfig {
        settle_floor_s: 0.0,
        settle_divisor: f64::INFINITY,
        ..AlignmentConfig::default()
    }
}

#[test]
fn converges_on_monotonically_improving_readings() {
    // Each re-read lands closer to (937, 653); the last is inside 0.2 arcsec.
    let mut sensor = ScriptedSensor::new([
        (true, 900.0, 600.0),
        (true, 930.0, 645.0),
        (true, 935.5, 651.5),
        (true, 936.95, 652.95),
    ]);
    let mut actuator = RecordingActuator::default();

    let report = AlignmentLoop::new(fast_config())
        .run(&mut sensor, &mut actuator)
        .unwrap();

    assert_eq!(report.rounds(), 3);
    assert!(report.rounds() < 16);
    assert!(report.final_distance <= 0.2);
    assert!(!actuator.moves.is_empty());
}

#[test]
fn aborts_after_sixteen_commanded_rounds() {
    let mut sensor = StuckSensor { x: 900.0, y: 600.0 };
    let mut actuator = RecordingActuator::default();

    let err = AlignmentLoop::new(fast_config())
        .run(&mut sensor, &mut actuator)
        .expect_err("a stuck stage must exhaust the budget");

    assert!(matches!(err, AlignmentError::OvershootBudget { rounds: 16 }));
    // Both axes were commanded every round: 16 rounds, 32 move calls.
    assert_eq!(actuator.moves.len(), 32);
}

#[test]
fn first_move_solves_the_full_error() {
    let mut sensor = ScriptedSensor::new([(true, 900.0, 600.0), (true, 936.95, 652.97)]);
    let mut actuator = RecordingActuator::default();

    let report = AlignmentLoop::new(fast_config())
        .run(&mut sensor, &mut actuator)
        .unwrap();

    assert_eq!(report.rounds(), 1);
    // Round 0 commits the full modelled distance, truncated to integers.
    assert_eq!(actuator.moves[0], (Axis::X, 486, 50));
    assert_eq!(actuator.moves[1], (Axis::Y, 606, 50));
}

#[test]
fn relative_mode_aborts_before_any_step_computation() {
    let mut sensor = ScriptedSensor::new([(false, 900.0, 600.0)]);
    let mut actuator = RecordingActuator::default();

    let err = AlignmentLoop::new(fast_config())
        .run(&mut sensor, &mut actuator)
        .expect_err("relative mode must abort");

    assert!(matches!(err, AlignmentError::CalibrationMode));
    assert!(actuator.moves.is_empty());
}

#[test]
fn zero_reading_aborts_mid_loop() {
    // First reading is fine; the re-read after the move reports the
    // saturation sentinel on y.
    let mut sensor = ScriptedSensor::new([(true, 900.0, 600.0), (true, 930.0, 0.0)]);
    let mut actuator = RecordingActuator::default();

    let err = AlignmentLoop::new(fast_config())
        .run(&mut sensor, &mut actuator)
        .expect_err("sentinel reading must abort");

    assert!(matches!(err, AlignmentError::OutOfRange { y, .. } if y == 0.0));
    assert_eq!(actuator.moves.len(), 2);
}

#[test]
fn sensor_failure_mid_loop_is_fatal() {
    // The script runs dry after the first reading, standing in for an I/O
    // failure on the re-read.
    let mut sensor = ScriptedSensor::new([(true, 900.0, 600.0)]);
    let mut actuator = RecordingActuator::default();

    let err = AlignmentLoop::new(fast_config())
        .run(&mut sensor, &mut actuator)
        .expect_err("sensor failure must abort");

    assert!(matches!(err, AlignmentError::SensorUnavailable(_)));
}

#[test]
fn actuator_failure_is_fatal() {
    struct FailingActuator;

    impl StageActuator for FailingActuator {
        fn move_axis(&mut self, _: Axis, _: i64, _: u32) -> Result<(), DeviceError> {
            Err("stage controller offline".into())
        }
    }

    let mut sensor = StuckSensor { x: 900.0, y: 600.0 };
    let err = AlignmentLoop::new(fast_config())
        .run(&mut sensor, &mut FailingActuator)
        .expect_err("actuator failure must abort");

    assert!(matches!(err, AlignmentError::Actuator(_)));
}
