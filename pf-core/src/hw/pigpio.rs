//! pigpiod client
//!
//! Talks to the pigpio daemon over its TCP command socket. One connection
//! is opened at startup and kept for the lifetime of the control loop.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info};

use pf_protocol::{decode_response, percent_to_duty, Command, FRAME_SIZE, HW_PWM_RANGE};

use crate::constants::duty;
use crate::hw::actuator::DutyActuator;
use pf_error::{PifanError, Result};

/// Hardware PWM through pigpiod
pub struct PigpioActuator {
    stream: TcpStream,
    address: String,
    hardware_revision: u32,
    released: bool,
}

impl PigpioActuator {
    /// Connect to pigpiod at `host:port` and verify it answers
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let address = format!("{}:{}", host, port);
        let backend = format!("pigpiod at {}", address);
        info!("Connecting to pigpiod at {}", address);

        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| PifanError::connection(&backend, format!("Failed to resolve: {}", e)))?;

        let mut last_error = String::from("no addresses resolved");
        let mut stream = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_error = e.to_string();
                }
            }
        }
        let stream = stream.ok_or_else(|| PifanError::connection(&backend, last_error))?;

        stream
            .set_read_timeout(Some(timeout))
            .map_err(|e| PifanError::connection(&backend, format!("Failed to set read timeout: {}", e)))?;
        stream
            .set_write_timeout(Some(timeout))
            .map_err(|e| PifanError::connection(&backend, format!("Failed to set write timeout: {}", e)))?;
        // Frames are tiny; don't let Nagle hold them back
        let _ = stream.set_nodelay(true);

        let mut actuator = Self {
            stream,
            address,
            hardware_revision: 0,
            released: false,
        };

        actuator.hardware_revision = actuator
            .transact(&Command::hardware_revision())
            .map_err(|e| PifanError::connection(&backend, format!("Handshake failed: {}", e)))?;

        info!(
            "Connected to pigpiod at {} (hardware revision {:#x})",
            actuator.address, actuator.hardware_revision
        );
        Ok(actuator)
    }

    pub fn hardware_revision(&self) -> u32 {
        self.hardware_revision
    }

    /// Send one command and wait for its reply
    fn transact(&mut self, command: &Command) -> std::result::Result<u32, String> {
        if self.released {
            return Err("connection already released".to_string());
        }

        self.stream
            .write_all(&command.encode())
            .map_err(|e| format!("Failed to send command {}: {}", command.cmd, e))?;

        let mut reply = [0u8; FRAME_SIZE];
        self.stream
            .read_exact(&mut reply)
            .map_err(|e| format!("Failed to read reply to command {}: {}", command.cmd, e))?;

        decode_response(command, &reply).map_err(|e| e.to_string())
    }
}

impl DutyActuator for PigpioActuator {
    fn set_duty(&mut self, pin: u32, frequency_hz: u32, percent: f64) -> Result<()> {
        let percent = duty::clamp_percent(percent);
        let duty_value = percent_to_duty(percent);

        self.transact(&Command::hardware_pwm(pin, frequency_hz, duty_value))
            .map_err(|e| PifanError::actuation(pin, percent, e))?;

        debug!(
            "Set fan speed to {:.1}% (duty={}/{})",
            percent, duty_value, HW_PWM_RANGE
        );
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        format!("pigpiod at {}", self.address)
    }
}
