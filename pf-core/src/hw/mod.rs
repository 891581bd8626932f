//! Hardware interaction modules
//!
//! - `sensor` - temperature sources
//! - `actuator` - the duty cycle actuator abstraction
//! - `pigpio` - pigpiod socket backend
//! - `sysfs_pwm` - kernel PWM class backend

pub mod actuator;
pub mod pigpio;
pub mod sensor;
pub mod sysfs_pwm;

pub use actuator::DutyActuator;
pub use pigpio::PigpioActuator;
pub use sensor::{SysfsThermalSensor, TemperatureSource};
pub use sysfs_pwm::SysfsPwmActuator;

use crate::config::{Backend, DaemonConfig};
use crate::constants::timing;
use pf_error::Result;

/// Establish the actuation backend selected in the configuration
pub fn connect_backend(config: &DaemonConfig) -> Result<Box<dyn DutyActuator + Send>> {
    match config.backend {
        Backend::Pigpio => Ok(Box::new(PigpioActuator::connect(
            &config.pigpio_host,
            config.pigpio_port,
            timing::PIGPIO_TIMEOUT,
        )?)),
        Backend::Sysfs => Ok(Box::new(SysfsPwmActuator::connect(
            &config.pwm_chip,
            config.control.gpio_pin,
        )?)),
    }
}

/// Open the temperature sensor named in the configuration
pub fn open_sensor(config: &DaemonConfig) -> SysfsThermalSensor {
    SysfsThermalSensor::new(&config.thermal_path)
}
