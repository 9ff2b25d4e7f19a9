//! ELCOMAT autocollimator serial driver.
//!
//! The autocollimator answers each measurement request with one ASCII frame
//! over RS-232 (9600 8N1), LF-terminated:
//!
//! ```text
//! <mode> <x> <y>\r\n
//! ```
//!
//! where `mode` is `A` for absolute measurements or `R` when the device has
//! been switched to relative mode, and the readings are arcseconds. A
//! reading of exactly zero on either axis means the reticle image has left
//! the measurement range; the driver reports it verbatim and the control
//! loop treats it as the saturation sentinel.

use std::io::{Read, Write};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace};

use controller::{AngleSensor, DeviceError, SensorSample};

/// Serial settings for the ELCOMAT (9600 8N1).
pub const DEFAULT_BAUD: u32 = 9600;

/// Measurement request command.
const MEASURE_REQUEST: &[u8] = b"A\r\n";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors from the autocollimator driver.
#[derive(Debug, Error)]
pub enum ElcomatError {
    /// Serial port could not be opened or configured.
    #[error("serial port error: {0}")]
    Port(#[from] serialport::Error),

    /// Read or write on the open port failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No complete frame arrived within the timeout.
    #[error("timeout waiting for measurement frame")]
    Timeout,

    /// Frame did not match `<mode> <x> <y>`.
    #[error("malformed frame: {0:?}")]
    MalformedFrame(String),
}

/// ELCOMAT autocollimator on a serial port.
pub struct Elcomat {
    port: Box<dyn serialport::SerialPort>,
}

impl Elcomat {
    /// Open the autocollimator on the given serial device.
    pub fn open(path: &str) -> Result<Self, ElcomatError> {
        let port = serialport::new(path, DEFAULT_BAUD)
            .timeout(DEFAULT_TIMEOUT)
            .open()?;
        debug!("opened autocollimator on {path}");
        Ok(Self { port })
    }

    /// Request and parse one measurement frame.
    pub fn read_measurement(&mut self) -> Result<SensorSample, ElcomatError> {
        self.port.write_all(MEASURE_REQUEST)?;
        self.port.flush()?;
        let line = self.read_line()?;
        trace!("elcomat frame: {:?}", line);
        parse_frame(&line)
    }

    /// Read bytes until LF.
    fn read_line(&mut self) -> Result<String, ElcomatError> {
        let mut buf = [0u8; 1];
        let mut bytes = Vec::new();

        loop {
            match self.port.read(&mut buf) {
                Ok(0) => return Err(ElcomatError::Timeout),
                Ok(_) => {
                    if buf[0] == b'\n' {
                        break;
                    }
                    bytes.push(buf[0]);
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(ElcomatError::Timeout);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl AngleSensor for Elcomat {
    fn sample(&mut self) -> Result<SensorSample, DeviceError> {
        self.read_measurement().map_err(Into::into)
    }
}

/// Parse one `<mode> <x> <y>` measurement frame.
pub fn parse_frame(line: &str) -> Result<SensorSample, ElcomatError> {
    let malformed = || ElcomatError::MalformedFrame(line.to_string());

    let mut fields = line.split_whitespace();
    let absolute = match fields.next().ok_or_else(malformed)? {
        "A" => true,
        "R" => false,
        _ => return Err(malformed()),
    };
    let x: f64 = fields
        .next()
        .ok_or_else(malformed)?
        .parse()
        .map_err(|_| malformed())?;
    let y: f64 = fields
        .next()
        .ok_or_else(malformed)?
        .parse()
        .map_err(|_| malformed())?;
    if fields.next().is_some() {
        return Err(malformed());
    }

    Ok(SensorSample { absolute, x, y })
}
