//! Closed-loop alignment tool for the grating stage.
//!
//! Drives the stage onto the autocollimator target with the `controller`
//! loop and the bench drivers:
//!
//! - `run`: full closed-loop alignment against the real hardware
//! - `check`: one raw autocollimator reading
//! - `plan`: read once and print the solved step counts without moving
//! - `simulate`: run the loop against a modelled stage, no hardware

mod sim;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use controller::{
    AlignmentConfig, AlignmentError, AlignmentLoop, GainSchedule, Position, RunReport,
};
use hardware::{Cryopos, Elcomat};

/// Default serial device for the autocollimator.
const DEFAULT_SENSOR_PORT: &str = "/dev/ttyUSB0";

/// Default serial device for the stage controller.
const DEFAULT_ACTUATOR_PORT: &str = "/dev/ttyUSB1";

/// Grating stage alignment tool
#[derive(Parser, Debug)]
#[command(name = "align_tool")]
#[command(about = "Closed-loop alignment of the grating stage")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Align the stage to the target position
    Run {
        /// Autocollimator serial device
        #[arg(long, default_value = DEFAULT_SENSOR_PORT)]
        sensor_port: String,

        /// Stage controller serial device
        #[arg(long, default_value = DEFAULT_ACTUATOR_PORT)]
        actuator_port: String,

        #[command(flatten)]
        target: TargetArgs,

        /// Write per-round step history as CSV
        #[arg(long)]
        history_csv: Option<PathBuf>,

        /// Write the full run report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Read the autocollimator once and print the measurement
    Check {
        /// Autocollimator serial device
        #[arg(long, default_value = DEFAULT_SENSOR_PORT)]
        sensor_port: String,
    },

    /// Read the autocollimator once and print the solved steps without moving
    Plan {
        /// Autocollimator serial device
        #[arg(long, default_value = DEFAULT_SENSOR_PORT)]
        sensor_port: String,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Run the loop against a simulated stage
    Simulate {
        #[command(flatten)]
        target: TargetArgs,

        /// Starting X position of the simulated stage, arcseconds
        #[arg(long, default_value = "900.0")]
        start_x: f64,

        /// Starting Y position of the simulated stage, arcseconds
        #[arg(long, default_value = "600.0")]
        start_y: f64,

        /// Multiply the simulated plant gains by this factor (model error)
        #[arg(long, default_value = "1.0")]
        gain_error: f64,

        /// Write per-round step history as CSV
        #[arg(long)]
        history_csv: Option<PathBuf>,
    },
}

/// Target and loop parameters shared by the aligning subcommands.
#[derive(clap::Args, Debug)]
struct TargetArgs {
    /// Target X position in arcseconds
    #[arg(long, default_value = "937.0")]
    target_x: f64,

    /// Target Y position in arcseconds
    #[arg(long, default_value = "653.0")]
    target_y: f64,

    /// Convergence tolerance on the Euclidean error, arcseconds
    #[arg(long, default_value = "0.2")]
    goal_dist: f64,

    /// Rounds allowed before the run is declared overshooting
    #[arg(long, default_value = "15")]
    max_rounds: u32,

    /// Per-round cap on commanded step magnitude
    #[arg(long, default_value = "1000")]
    clip: i64,

    /// Piezo step-size parameter forwarded to the stage controller
    #[arg(long, default_value = "50")]
    step_size: u32,
}

impl TargetArgs {
    fn to_config(&self) -> AlignmentConfig {
        AlignmentConfig {
            target: Position {
                x: self.target_x,
                y: self.target_y,
            },
            goal_dist: self.goal_dist,
            max_rounds: self.max_rounds,
            schedule: GainSchedule {
                clip: self.clip,
                ..GainSchedule::default()
            },
            relative_step_size: self.step_size,
            ..AlignmentConfig::default()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    match args.command {
        Command::Run {
            sensor_port,
            actuator_port,
            target,
            history_csv,
            report,
        } => cmd_run(&sensor_port, &actuator_port, &target, history_csv, report),
        Command::Check { sensor_port } => cmd_check(&sensor_port),
        Command::Plan {
            sensor_port,
            target,
        } => cmd_plan(&sensor_port, &target),
        Command::Simulate {
            target,
            start_x,
            start_y,
            gain_error,
            history_csv,
        } => cmd_simulate(&target, start_x, start_y, gain_error, history_csv),
    }
}

// ==================== Run Command ====================

fn cmd_run(
    sensor_port: &str,
    actuator_port: &str,
    target: &TargetArgs,
    history_csv: Option<PathBuf>,
    report_path: Option<PathBuf>,
) -> Result<()> {
    let mut sensor = Elcomat::open(sensor_port)
        .with_context(|| format!("opening autocollimator on {sensor_port}"))?;
    let mut actuator = Cryopos::open(actuator_port)
        .with_context(|| format!("opening stage controller on {actuator_port}"))?;
    info!(
        "stage controller firmware: {}",
        actuator.firmware_version()?
    );

    let config = target.to_config();
    info!(
        "aligning to ({:.1}, {:.1}) arcsec, tolerance {:.2}",
        config.target.x, config.target.y, config.goal_dist
    );

    let started = Instant::now();
    match AlignmentLoop::new(config).run(&mut sensor, &mut actuator) {
        Ok(report) => {
            info!(
                "aligned in {} rounds, {:.3} arcsec from target ({:.1} s elapsed)",
                report.rounds(),
                report.final_distance,
                started.elapsed().as_secs_f64()
            );
            export_report(&report, history_csv.as_deref(), report_path.as_deref())
        }
        Err(e) => abort(e),
    }
}

/// Map each fatal condition to its own process exit code.
fn abort(error: AlignmentError) -> ! {
    let code = match error {
        AlignmentError::SensorUnavailable(_) => 2,
        AlignmentError::CalibrationMode => 3,
        AlignmentError::OutOfRange { .. } => 4,
        AlignmentError::SingularModel => 5,
        AlignmentError::OvershootBudget { .. } => 6,
        AlignmentError::Actuator(_) => 7,
    };
    error!("alignment aborted: {error}");
    std::process::exit(code)
}

fn export_report(
    report: &RunReport,
    history_csv: Option<&Path>,
    report_path: Option<&Path>,
) -> Result<()> {
    if let Some(path) = history_csv {
        write_history_csv(path, report)
            .with_context(|| format!("writing history to {}", path.display()))?;
        info!("step history written to {}", path.display());
    }
    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing report to {}", path.display()))?;
        info!("run report written to {}", path.display());
    }
    Ok(())
}

fn write_history_csv(path: &Path, report: &RunReport) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "round,steps_x,steps_y")?;
    for (round, command) in report.history.iter().enumerate() {
        writeln!(file, "{},{},{}", round, command.x, command.y)?;
    }
    Ok(())
}

// ==================== Check Command ====================

fn cmd_check(sensor_port: &str) -> Result<()> {
    let mut sensor = Elcomat::open(sensor_port)
        .with_context(|| format!("opening autocollimator on {sensor_port}"))?;
    let sample = sensor.read_measurement()?;

    let mode = if sample.absolute {
        "absolute"
    } else {
        "relative"
    };
    println!("mode: {mode}");
    println!("x: {:.2} arcsec", sample.x);
    println!("y: {:.2} arcsec", sample.y);
    Ok(())
}

// ==================== Plan Command ====================

fn cmd_plan(sensor_port: &str, target: &TargetArgs) -> Result<()> {
    let mut sensor = Elcomat::open(sensor_port)
        .with_context(|| format!("opening autocollimator on {sensor_port}"))?;
    let sample = sensor.read_measurement()?;

    if !sample.absolute {
        bail!("autocollimator is in relative mode; switch to absolute before planning");
    }

    let config = target.to_config();
    let delta_x = config.target.x - sample.x;
    let delta_y = config.target.y - sample.y;
    let current = Position {
        x: sample.x,
        y: sample.y,
    };
    println!(
        "position: ({:.2}, {:.2}) arcsec, {:.2} from target",
        sample.x,
        sample.y,
        current.distance_to(config.target)
    );
    println!("desired change: ({delta_x:.2}, {delta_y:.2}) arcsec");

    let solution = controller::resolve_and_solve(delta_x, delta_y)?;
    println!(
        "solved steps: X {:.1} ({:?}), Y {:.1} ({:?})",
        solution.steps_x, solution.dir_x, solution.steps_y, solution.dir_y
    );

    let first_move = config.schedule.commit(
        solution.steps_x,
        solution.steps_y,
        0,
        controller::StepCommand::default(),
    );
    println!("first-round command: X {} steps, Y {} steps", first_move.x, first_move.y);
    Ok(())
}

// ==================== Simulate Command ====================

fn cmd_simulate(
    target: &TargetArgs,
    start_x: f64,
    start_y: f64,
    gain_error: f64,
    history_csv: Option<PathBuf>,
) -> Result<()> {
    // No physical settling to wait for.
    let config = AlignmentConfig {
        settle_floor_s: 0.0,
        settle_divisor: f64::INFINITY,
        ..target.to_config()
    };

    info!(
        "simulating from ({start_x:.1}, {start_y:.1}) with gain error factor {gain_error:.2}"
    );
    let (mut sensor, mut actuator) = sim::split(sim::SimStage::new(start_x, start_y, gain_error));

    match AlignmentLoop::new(config).run(&mut sensor, &mut actuator) {
        Ok(report) => {
            println!(
                "converged in {} rounds, {:.3} arcsec from target",
                report.rounds(),
                report.final_distance
            );
            for (round, command) in report.history.iter().enumerate() {
                println!("  round {round}: X {} steps, Y {} steps", command.x, command.y);
            }
            export_report(&report, history_csv.as_deref(), None)
        }
        Err(e) => abort(e),
    }
}
