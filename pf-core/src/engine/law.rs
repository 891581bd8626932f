//! Control law: temperature to fan duty
//!
//! Two policies, selected by [`ControlMode`]:
//!
//! 1. **Linear**: stateless interpolation between `min_temp` (at
//!    `min_duty`) and `max_temp` (at 100%). Off strictly below `min_temp`,
//!    full strictly above `max_temp`.
//!
//! 2. **PI**: `kp * error + ki * integral`, with `error = temp - target` and
//!    the integral accumulating `error * dt` every sample. Off (and integral
//!    cleared) strictly below `min_temp`; full at or above `max_temp`, where
//!    the integral keeps its value. Inside the band the output is clamped to
//!    `[min_duty, 100]` because most fans stall below a minimum duty.

use crate::config::{Configuration, ControlMode};
use crate::constants::duty;

/// Mutable controller memory, owned by the control loop
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControllerState {
    /// Accumulated `error * dt` (PI mode only)
    pub integral_sum: f64,
    /// Last duty successfully applied to the fan
    pub last_duty_percent: f64,
}

/// Result of one control step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlOutput {
    /// Duty to command, always within 0-100
    pub duty_percent: f64,
    /// Pre-clamp PI output, for diagnostics
    pub raw_output: Option<f64>,
}

/// Parameters of the active policy, copied out of the configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlLaw {
    mode: ControlMode,
    target_temp_c: f64,
    min_temp_c: f64,
    max_temp_c: f64,
    min_duty_percent: f64,
    proportional_gain: f64,
    integral_gain: f64,
    dt_seconds: f64,
}

impl ControlLaw {
    /// Build from a validated configuration
    pub fn new(config: &Configuration) -> Self {
        Self {
            mode: config.control_mode,
            target_temp_c: config.target_temp_c,
            min_temp_c: config.min_temp_c,
            max_temp_c: config.max_temp_c,
            min_duty_percent: config.min_duty_percent,
            proportional_gain: config.proportional_gain,
            integral_gain: config.integral_gain,
            dt_seconds: config.update_interval_seconds,
        }
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    /// Compute the duty for `temp_c`, updating `state` in PI mode
    pub fn compute(&self, temp_c: f64, state: &mut ControllerState) -> ControlOutput {
        match self.mode {
            ControlMode::Linear => ControlOutput {
                duty_percent: linear_duty(
                    temp_c,
                    self.min_temp_c,
                    self.max_temp_c,
                    self.min_duty_percent,
                ),
                raw_output: None,
            },
            ControlMode::Pi => self.pi_step(temp_c, state),
        }
    }

    fn pi_step(&self, temp_c: f64, state: &mut ControllerState) -> ControlOutput {
        let error = temp_c - self.target_temp_c;
        state.integral_sum += error * self.dt_seconds;
        let raw = self.proportional_gain * error + self.integral_gain * state.integral_sum;

        let duty_percent = if temp_c < self.min_temp_c {
            state.integral_sum = 0.0;
            duty::OFF_PERCENT
        } else if temp_c >= self.max_temp_c {
            duty::FULL_PERCENT
        } else if raw.is_finite() {
            raw.clamp(self.min_duty_percent, duty::FULL_PERCENT)
        } else {
            duty::FULL_PERCENT
        };

        ControlOutput {
            duty_percent,
            raw_output: Some(raw),
        }
    }
}

/// Piecewise-linear mapping used by linear mode
///
/// Callers guarantee `min_temp < max_temp`; see [`Configuration::validate`].
pub fn linear_duty(temp_c: f64, min_temp_c: f64, max_temp_c: f64, min_duty_percent: f64) -> f64 {
    if temp_c < min_temp_c {
        duty::OFF_PERCENT
    } else if temp_c > max_temp_c {
        duty::FULL_PERCENT
    } else {
        min_duty_percent
            + (temp_c - min_temp_c) / (max_temp_c - min_temp_c)
                * (duty::FULL_PERCENT - min_duty_percent)
    }
}
