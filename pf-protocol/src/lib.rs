//! pigpiod socket protocol
//!
//! pigpiod listens on a TCP port (8888 by default). Every request is four
//! little-endian `u32` words `cmd p1 p2 p3`, optionally followed by `p3`
//! bytes of extension data. Every reply is four little-endian words; the
//! daemon echoes `cmd p1 p2` and puts a signed result in the last word.
//! Negative results are pigpio error codes.

/// Size of a request header and of every response
pub const FRAME_SIZE: usize = 16;

/// Full-scale duty for hardware PWM (`hardware_PWM` duty is 0..=1_000_000)
pub const HW_PWM_RANGE: u32 = 1_000_000;

/// Highest hardware PWM frequency accepted by pigpiod on BCM2711
pub const MAX_HW_PWM_FREQUENCY: u32 = 187_500_000;

/// Highest Broadcom GPIO number addressable by pigpiod
pub const MAX_GPIO: u32 = 53;

/// GPIOs wired to one of the two hardware PWM channels
pub const HW_PWM_GPIOS: &[u32] = &[12, 13, 18, 19, 40, 41, 45, 52, 53];

/// Command numbers used by pifan
pub mod cmd {
    /// Hardware revision, used as a connection handshake
    pub const HWVER: u32 = 17;
    /// Hardware PWM: p1 = gpio, p2 = frequency, ext = duty (u32)
    pub const HP: u32 = 86;
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("response too short: {0} bytes (expected {FRAME_SIZE})")]
    ShortResponse(usize),

    #[error("response for command {got} does not match request {expected}")]
    CommandMismatch { expected: u32, got: u32 },

    #[error("pigpiod returned {code} ({})", status_of(.code))]
    Daemon { code: i32 },
}

/// A single pigpiod request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub cmd: u32,
    pub p1: u32,
    pub p2: u32,
    pub ext: Vec<u8>,
}

impl Command {
    /// Query the board hardware revision
    pub fn hardware_revision() -> Self {
        Self {
            cmd: cmd::HWVER,
            p1: 0,
            p2: 0,
            ext: Vec::new(),
        }
    }

    /// Start hardware PWM on `gpio` at `frequency` Hz with `duty` out of [`HW_PWM_RANGE`]
    pub fn hardware_pwm(gpio: u32, frequency: u32, duty: u32) -> Self {
        Self {
            cmd: cmd::HP,
            p1: gpio,
            p2: frequency,
            ext: duty.to_le_bytes().to_vec(),
        }
    }

    /// Serialize to the wire format
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FRAME_SIZE + self.ext.len());
        buf.extend_from_slice(&self.cmd.to_le_bytes());
        buf.extend_from_slice(&self.p1.to_le_bytes());
        buf.extend_from_slice(&self.p2.to_le_bytes());
        buf.extend_from_slice(&(self.ext.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.ext);
        buf
    }
}

/// Decode a response to `request`, returning the non-negative result
pub fn decode_response(request: &Command, bytes: &[u8]) -> Result<u32, ProtocolError> {
    if bytes.len() < FRAME_SIZE {
        return Err(ProtocolError::ShortResponse(bytes.len()));
    }

    let word = |i: usize| {
        let mut w = [0u8; 4];
        w.copy_from_slice(&bytes[i * 4..i * 4 + 4]);
        w
    };

    let cmd = u32::from_le_bytes(word(0));
    if cmd != request.cmd {
        return Err(ProtocolError::CommandMismatch {
            expected: request.cmd,
            got: cmd,
        });
    }

    let result = i32::from_le_bytes(word(3));
    if result < 0 {
        return Err(ProtocolError::Daemon { code: result });
    }

    Ok(result as u32)
}

/// Convert a percentage into a hardware PWM duty value
///
/// Truncates toward zero, so 33.3333% becomes 333_333.
pub fn percent_to_duty(percent: f64) -> u32 {
    let percent = if percent.is_finite() { percent.clamp(0.0, 100.0) } else { 0.0 };
    (percent / 100.0 * HW_PWM_RANGE as f64) as u32
}

fn status_of(code: &i32) -> &'static str {
    status_name(*code)
}

/// Symbolic name of a pigpio status code
pub fn status_name(code: i32) -> &'static str {
    match code {
        -1 => "PI_INIT_FAILED",
        -3 => "PI_BAD_GPIO",
        -41 => "PI_NOT_PERMITTED",
        -95 => "PI_NOT_HPWM_GPIO",
        -96 => "PI_BAD_HPWM_FREQ",
        -97 => "PI_BAD_HPWM_DUTY",
        c if c >= 0 => "PI_OK",
        _ => "PI_UNKNOWN_ERROR",
    }
}

pub fn validate_gpio(gpio: u32) -> Result<(), String> {
    if gpio > MAX_GPIO {
        return Err(format!("GPIO {} out of range (0-{})", gpio, MAX_GPIO));
    }
    if !HW_PWM_GPIOS.contains(&gpio) {
        return Err(format!(
            "GPIO {} has no hardware PWM channel (use one of {:?})",
            gpio, HW_PWM_GPIOS
        ));
    }
    Ok(())
}

pub fn validate_frequency(frequency: u32) -> Result<(), &'static str> {
    if frequency == 0 {
        return Err("PWM frequency must be at least 1 Hz");
    }
    if frequency > MAX_HW_PWM_FREQUENCY {
        return Err("PWM frequency exceeds the hardware PWM maximum");
    }
    Ok(())
}
