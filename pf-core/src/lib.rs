//! pifan Core Library
//!
//! Temperature-driven PWM fan control for single-board computers.
//!
//! # Module Structure
//!
//! - `config` - options file, resolved [`Configuration`], validation
//! - `engine/` - control law (linear and PI) and the fail-safe actuator guard
//! - `hw/` - temperature sources and duty actuators (pigpiod, sysfs PWM)
//! - `event` - structured sample and lifecycle events
//!
//! # Example
//!
//! ```
//! use pf_core::{Configuration, ControlLaw, ControllerState};
//!
//! let law = ControlLaw::new(&Configuration::default());
//! let mut state = ControllerState::default();
//! let output = law.compute(60.0, &mut state);
//! assert!((30.0..=100.0).contains(&output.duty_percent));
//! ```

pub mod config;
pub mod constants;
pub mod engine;
pub mod event;
pub mod hw;

pub use config::{
    load_config, resolve_config_path, Backend, ConfigSource, Configuration, ControlMode,
    DaemonConfig, SensorEscalation,
};
pub use engine::{linear_duty, ControlLaw, ControlOutput, ControllerState, FailSafe};
pub use event::{EventSink, LifecycleEvent, SampleEvent, StopReason, TracingSink};
pub use hw::{
    connect_backend, open_sensor, DutyActuator, PigpioActuator, SysfsPwmActuator,
    SysfsThermalSensor, TemperatureSource,
};

pub use pf_error::{ErrorKind, PifanError, Result};
