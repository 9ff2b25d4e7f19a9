//! JPE cryo positioning controller driver.
//!
//! The controller speaks a line-oriented text protocol over serial
//! (115200 8N1). Commands are single LF-terminated lines; every command is
//! acknowledged with either `OK` or an error line:
//!
//! ```text
//! ERR <code> <message>
//! ```
//!
//! Commands used here:
//!
//! - `MOV <channel> <steps> <rss>` - relative move of a signed step count
//!   on one stage channel, with the relative step size as a percentage of
//!   full piezo stroke
//! - `STP <channel>` - stop motion on a channel
//! - `VER` - firmware version query (answered with the version string)

use std::io::{Read, Write};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace};

use controller::{Axis, DeviceError, StageActuator};

/// Serial settings for the stage controller (115200 8N1).
pub const DEFAULT_BAUD: u32 = 115_200;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from the stage controller driver.
#[derive(Debug, Error)]
pub enum CryoposError {
    /// Serial port could not be opened or configured.
    #[error("serial port error: {0}")]
    Port(#[from] serialport::Error),

    /// Read or write on the open port failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No acknowledgement arrived within the timeout.
    #[error("timeout waiting for controller reply")]
    Timeout,

    /// Controller answered a command with an error line.
    #[error("controller error {code}: {message}")]
    Controller { code: i32, message: String },

    /// Reply was neither `OK` nor a well-formed error line.
    #[error("unexpected reply: {0:?}")]
    UnexpectedReply(String),
}

/// JPE cryo positioning controller on a serial port.
pub struct Cryopos {
    port: Box<dyn serialport::SerialPort>,
}

impl Cryopos {
    /// Open the stage controller on the given serial device.
    pub fn open(path: &str) -> Result<Self, CryoposError> {
        let port = serialport::new(path, DEFAULT_BAUD)
            .timeout(DEFAULT_TIMEOUT)
            .open()?;
        debug!("opened stage controller on {path}");
        Ok(Self { port })
    }

    /// Query the controller firmware version.
    pub fn firmware_version(&mut self) -> Result<String, CryoposError> {
        self.send("VER")?;
        let reply = self.read_line()?;
        Ok(reply.trim().to_string())
    }

    /// Command a relative move on one stage channel.
    ///
    /// `steps` is signed; `relative_step_size` is the piezo step size as a
    /// percentage of full stroke. The command returns once the controller
    /// acknowledges it, not once motion completes; callers must allow for
    /// mechanical settling before trusting a measurement.
    pub fn move_stage(
        &mut self,
        channel: u8,
        steps: i64,
        relative_step_size: u32,
    ) -> Result<(), CryoposError> {
        self.command(&format!("MOV {channel} {steps} {relative_step_size}"))
    }

    /// Stop motion on one stage channel.
    pub fn stop(&mut self, channel: u8) -> Result<(), CryoposError> {
        self.command(&format!("STP {channel}"))
    }

    /// Send a command line and check the acknowledgement.
    fn command(&mut self, command: &str) -> Result<(), CryoposError> {
        self.send(command)?;
        let reply = self.read_line()?;
        parse_ack(&reply)
    }

    fn send(&mut self, command: &str) -> Result<(), CryoposError> {
        debug!("cryopos send: {:?}", command);
        self.port.write_all(command.as_bytes())?;
        self.port.write_all(b"\n")?;
        self.port.flush()?;
        Ok(())
    }

    /// Read bytes until LF.
    fn read_line(&mut self) -> Result<String, CryoposError> {
        let mut buf = [0u8; 1];
        let mut bytes = Vec::new();

        loop {
            match self.port.read(&mut buf) {
                Ok(0) => return Err(CryoposError::Timeout),
                Ok(_) => {
                    if buf[0] == b'\n' {
                        break;
                    }
                    bytes.push(buf[0]);
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(CryoposError::Timeout);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let reply = String::from_utf8_lossy(&bytes).into_owned();
        trace!("cryopos recv: {:?}", reply);
        Ok(reply)
    }
}

impl StageActuator for Cryopos {
    fn move_axis(
        &mut self,
        axis: Axis,
        steps: i64,
        relative_step_size: u32,
    ) -> Result<(), DeviceError> {
        self.move_stage(axis.channel(), steps, relative_step_size)
            .map_err(Into::into)
    }
}

/// Parse a controller acknowledgement line.
fn parse_ack(line: &str) -> Result<(), CryoposError> {
    let trimmed = line.trim();
    if trimmed == "OK" {
        return Ok(());
    }

    if let Some(rest) = trimmed.strip_prefix("ERR ") {
        let (code, message) = rest.split_once(' ').unwrap_or((rest, ""));
        if let Ok(code) = code.parse() {
            return Err(CryoposError::Controller {
                code,
                message: message.to_string(),
            });
        }
    }

    Err(CryoposError::UnexpectedReply(line.to_string()))
}
