//! Duty cycle actuators
//!
//! An actuator owns a handle to some PWM backend. Callers clamp the
//! percentage before calling `set_duty`; implementations clamp again.

use pf_error::Result;

/// Drives a percentage duty cycle to a PWM output
#[cfg_attr(test, mockall::automock)]
pub trait DutyActuator {
    /// Program hardware PWM on `pin` at `frequency_hz` with `percent` (0-100)
    fn set_duty(&mut self, pin: u32, frequency_hz: u32, percent: f64) -> Result<()>;

    /// Release the backend handle; the actuator must not be used afterwards
    fn release(&mut self) -> Result<()>;

    /// Human-readable backend description for logs
    fn describe(&self) -> String;
}

impl<T: DutyActuator + ?Sized> DutyActuator for Box<T> {
    fn set_duty(&mut self, pin: u32, frequency_hz: u32, percent: f64) -> Result<()> {
        (**self).set_duty(pin, frequency_hz, percent)
    }

    fn release(&mut self) -> Result<()> {
        (**self).release()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
