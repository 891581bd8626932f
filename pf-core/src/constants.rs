//! Constants and configuration defaults for pifan
//!
//! Centralizes magic numbers, paths, and defaults. Add new ones here first.

use std::time::Duration;

/// System paths
pub mod paths {
    /// SoC thermal zone exposed by the kernel (millidegrees Celsius)
    pub const THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

    /// Options file injected by the Home Assistant supervisor
    pub const OPTIONS_FILE: &str = "/data/options.json";

    /// Raspberry Pi hardware PWM controller
    pub const PWM_CHIP: &str = "/sys/class/pwm/pwmchip0";

    /// Present when systemd-journald is accepting native log records
    pub const JOURNALD_SOCKET: &str = "/run/systemd/journal/socket";
}

/// Environment variables consulted at startup
pub mod env {
    /// Overrides the options file path
    pub const CONFIG_PATH: &str = "PIFAN_CONFIG";

    /// Log filter (trace, debug, info, warn, error)
    pub const LOG_LEVEL: &str = "PIFAN_LOG";
}

/// Defaults applied when an option is absent
pub mod defaults {
    pub const GPIO_PIN: u32 = 18;
    /// 25 kHz is above audible range for 4-pin fans; MOSFET boards prefer 50 Hz
    pub const PWM_FREQUENCY_HZ: u32 = 25_000;
    pub const TARGET_TEMP_C: f64 = 55.0;
    pub const MIN_TEMP_C: f64 = 50.0;
    pub const MAX_TEMP_C: f64 = 75.0;
    pub const MIN_DUTY_PERCENT: f64 = 30.0;
    pub const UPDATE_INTERVAL_SECONDS: f64 = 10.0;
    pub const PROPORTIONAL_GAIN: f64 = 10.0;
    pub const INTEGRAL_GAIN: f64 = 0.4;

    pub const PIGPIO_HOST: &str = "localhost";
    pub const PIGPIO_PORT: u16 = 8888;

    pub const LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;
    pub const LOG_LEVEL: &str = "info";
}

/// Temperature conversions and sentinels
pub mod temperature {
    /// Sensor readings are in millidegrees, divide by this to get Celsius
    pub const MILLIDEGREE_DIVISOR: f64 = 1000.0;

    /// Substituted when the sensor cannot be read (treated as "cold")
    pub const READ_FAILURE_SENTINEL_C: f64 = 0.0;
}

/// Duty cycle bounds
pub mod duty {
    pub const OFF_PERCENT: f64 = 0.0;
    pub const FULL_PERCENT: f64 = 100.0;

    /// Clamp a percentage to 0-100, mapping non-finite values to off
    #[inline]
    pub fn clamp_percent(percent: f64) -> f64 {
        if percent.is_finite() {
            percent.clamp(OFF_PERCENT, FULL_PERCENT)
        } else {
            OFF_PERCENT
        }
    }
}

/// Resource limits
pub mod limits {
    /// Maximum options file size (64KB)
    pub const MAX_CONFIG_SIZE: u64 = 64 * 1024;

    /// Longest accepted update interval (one hour)
    pub const MAX_UPDATE_INTERVAL_SECONDS: f64 = 3600.0;
}

/// Timing
pub mod timing {
    use super::*;

    /// Connect, read and write timeout for the pigpiod socket
    pub const PIGPIO_TIMEOUT: Duration = Duration::from_secs(5);

    /// Time for udev to create the channel directory after a sysfs PWM export
    pub const PWM_EXPORT_SETTLE: Duration = Duration::from_millis(100);
}
