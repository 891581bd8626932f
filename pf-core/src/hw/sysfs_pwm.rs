//! Kernel PWM class backend
//!
//! Drives `/sys/class/pwm/pwmchipN/pwmM` directly, for boards where the
//! `pwm-2chan` overlay is loaded instead of running pigpiod. Times are in
//! nanoseconds:
//!
//! - `period` - PWM period
//! - `duty_cycle` - active time per period (must not exceed `period`)
//! - `enable` - 1 to drive the output, 0 to stop it

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::constants::{duty, timing};
use crate::hw::actuator::DutyActuator;
use pf_error::{PifanError, Result};

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// PWM channel wired to a Broadcom GPIO by the `pwm-2chan` overlay
pub fn channel_for_gpio(gpio: u32) -> std::result::Result<u32, String> {
    match gpio {
        12 | 18 => Ok(0),
        13 | 19 => Ok(1),
        other => Err(format!(
            "GPIO {} has no sysfs PWM channel (use 12/18 for channel 0, 13/19 for channel 1)",
            other
        )),
    }
}

/// PWM period in nanoseconds for a frequency in Hz
pub fn period_ns(frequency_hz: u32) -> u64 {
    NANOS_PER_SECOND / u64::from(frequency_hz.max(1))
}

/// Active time in nanoseconds for a percentage of `period`
pub fn duty_ns(period: u64, percent: f64) -> u64 {
    (period as f64 * duty::clamp_percent(percent) / duty::FULL_PERCENT) as u64
}

/// Hardware PWM through the kernel PWM class
#[derive(Debug)]
pub struct SysfsPwmActuator {
    chip: PathBuf,
    channel: u32,
    channel_dir: PathBuf,
    exported_by_us: bool,
    period: Option<u64>,
    duty: u64,
    enabled: bool,
    released: bool,
}

impl SysfsPwmActuator {
    /// Open (exporting if needed) the channel behind `gpio` on `chip`
    pub fn connect(chip: &Path, gpio: u32) -> Result<Self> {
        let backend = format!("sysfs PWM {}", chip.display());

        let channel = channel_for_gpio(gpio).map_err(|e| PifanError::connection(&backend, e))?;

        if !chip.is_dir() {
            return Err(PifanError::connection(
                &backend,
                "PWM chip not found (is the pwm-2chan overlay loaded?)",
            ));
        }

        let channel_dir = chip.join(format!("pwm{}", channel));
        let mut exported_by_us = false;
        if !channel_dir.is_dir() {
            fs::write(chip.join("export"), channel.to_string()).map_err(|e| {
                PifanError::connection(&backend, format!("Failed to export channel {}: {}", channel, e))
            })?;
            std::thread::sleep(timing::PWM_EXPORT_SETTLE);
            if !channel_dir.is_dir() {
                return Err(PifanError::connection(
                    &backend,
                    format!("channel {} did not appear after export", channel),
                ));
            }
            exported_by_us = true;
        }

        // Pick up whatever state a previous run left behind
        let period = read_u64(&channel_dir.join("period")).filter(|p| *p > 0);
        let duty = read_u64(&channel_dir.join("duty_cycle")).unwrap_or(0);
        let enabled = read_u64(&channel_dir.join("enable")) == Some(1);

        info!(
            "Opened sysfs PWM channel {} on {:?} (GPIO {})",
            channel, chip, gpio
        );

        Ok(Self {
            chip: chip.to_path_buf(),
            channel,
            channel_dir,
            exported_by_us,
            period,
            duty,
            enabled,
            released: false,
        })
    }

    fn write_attr(&self, name: &str, value: u64) -> std::result::Result<(), String> {
        let path = self.channel_dir.join(name);
        fs::write(&path, value.to_string())
            .map_err(|e| format!("Failed to write {} to {:?}: {}", value, path, e))
    }
}

fn read_u64(path: &Path) -> Option<u64> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

impl DutyActuator for SysfsPwmActuator {
    fn set_duty(&mut self, pin: u32, frequency_hz: u32, percent: f64) -> Result<()> {
        let percent = duty::clamp_percent(percent);
        if self.released {
            return Err(PifanError::actuation(pin, percent, "channel already released"));
        }

        let period = period_ns(frequency_hz);
        let active = duty_ns(period, percent);

        if self.period != Some(period) {
            // The kernel rejects a period shorter than the current duty
            if self.duty > period {
                self.write_attr("duty_cycle", 0)
                    .map_err(|e| PifanError::actuation(pin, percent, e))?;
                self.duty = 0;
            }
            self.write_attr("period", period)
                .map_err(|e| PifanError::actuation(pin, percent, e))?;
            self.period = Some(period);
        }

        self.write_attr("duty_cycle", active)
            .map_err(|e| PifanError::actuation(pin, percent, e))?;
        self.duty = active;

        if !self.enabled {
            self.write_attr("enable", 1)
                .map_err(|e| PifanError::actuation(pin, percent, e))?;
            self.enabled = true;
        }

        debug!("Set fan speed to {:.1}% (duty={}/{}ns)", percent, active, period);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        if self.enabled {
            if let Err(e) = self.write_attr("enable", 0) {
                warn!("Failed to disable PWM channel {}: {}", self.channel, e);
            }
            self.enabled = false;
        }

        if self.exported_by_us {
            fs::write(self.chip.join("unexport"), self.channel.to_string())?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sysfs PWM {}/pwm{}", self.chip.display(), self.channel)
    }
}
