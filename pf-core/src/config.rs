//! Daemon configuration
//!
//! The options file is a flat JSON object using the Home Assistant add-on
//! option names (`gpio_pin`, `pwm_freq`, `target_temp`, ...). Every key is
//! optional. The control parameters are split out into [`Configuration`],
//! which is validated once at startup and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::constants::{defaults, env, limits, paths};
use pf_error::{PifanError, Result};

/// Control policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    /// Stateless piecewise-linear temperature to duty mapping
    Linear,
    /// Proportional-integral controller around `target_temp_c`
    #[default]
    #[serde(alias = "PI")]
    Pi,
}

impl std::fmt::Display for ControlMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlMode::Linear => f.write_str("linear"),
            ControlMode::Pi => f.write_str("pi"),
        }
    }
}

/// Resolved control parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub gpio_pin: u32,
    #[serde(rename = "pwm_freq")]
    pub pwm_frequency_hz: u32,
    #[serde(rename = "target_temp")]
    pub target_temp_c: f64,
    #[serde(rename = "min_temp")]
    pub min_temp_c: f64,
    #[serde(rename = "max_temp")]
    pub max_temp_c: f64,
    #[serde(rename = "min_pwm")]
    pub min_duty_percent: f64,
    #[serde(rename = "update_interval")]
    pub update_interval_seconds: f64,
    #[serde(rename = "p_gain")]
    pub proportional_gain: f64,
    #[serde(rename = "i_gain")]
    pub integral_gain: f64,
    pub control_mode: ControlMode,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            gpio_pin: defaults::GPIO_PIN,
            pwm_frequency_hz: defaults::PWM_FREQUENCY_HZ,
            target_temp_c: defaults::TARGET_TEMP_C,
            min_temp_c: defaults::MIN_TEMP_C,
            max_temp_c: defaults::MAX_TEMP_C,
            min_duty_percent: defaults::MIN_DUTY_PERCENT,
            update_interval_seconds: defaults::UPDATE_INTERVAL_SECONDS,
            proportional_gain: defaults::PROPORTIONAL_GAIN,
            integral_gain: defaults::INTEGRAL_GAIN,
            control_mode: ControlMode::default(),
        }
    }
}

impl Configuration {
    /// Check the invariants the control law relies on
    ///
    /// `min_temp_c == max_temp_c` is rejected here so the linear mapping can
    /// never divide by zero at control time.
    pub fn validate(&self) -> Result<()> {
        pf_protocol::validate_gpio(self.gpio_pin)
            .map_err(|e| PifanError::invalid_config("gpio_pin", e))?;
        pf_protocol::validate_frequency(self.pwm_frequency_hz)
            .map_err(|e| PifanError::invalid_config("pwm_freq", e))?;

        for (field, value) in [
            ("target_temp", self.target_temp_c),
            ("min_temp", self.min_temp_c),
            ("max_temp", self.max_temp_c),
            ("p_gain", self.proportional_gain),
            ("i_gain", self.integral_gain),
        ] {
            if !value.is_finite() {
                return Err(PifanError::invalid_config(field, "must be a finite number"));
            }
        }

        if self.min_temp_c >= self.max_temp_c {
            return Err(PifanError::invalid_config(
                "max_temp",
                format!(
                    "must be greater than min_temp ({} >= {})",
                    self.min_temp_c, self.max_temp_c
                ),
            ));
        }

        if !(0.0..=100.0).contains(&self.min_duty_percent) {
            return Err(PifanError::invalid_config(
                "min_pwm",
                format!("{} is outside 0-100", self.min_duty_percent),
            ));
        }

        if !(self.update_interval_seconds > 0.0
            && self.update_interval_seconds <= limits::MAX_UPDATE_INTERVAL_SECONDS)
        {
            return Err(PifanError::invalid_config(
                "update_interval",
                format!(
                    "must be greater than 0 and at most {} seconds",
                    limits::MAX_UPDATE_INTERVAL_SECONDS
                ),
            ));
        }

        Ok(())
    }

    /// Suspicious but accepted settings
    ///
    /// `validate` does not log these; the caller reports them once.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.control_mode == ControlMode::Pi
            && !(self.min_temp_c < self.target_temp_c && self.target_temp_c < self.max_temp_c)
        {
            warnings.push(format!(
                "target_temp {}°C is not between min_temp {}°C and max_temp {}°C",
                self.target_temp_c, self.min_temp_c, self.max_temp_c
            ));
        }
        if self.proportional_gain < 0.0 || self.integral_gain < 0.0 {
            warnings.push("negative gains drive the fan down as temperature rises".to_string());
        }
        warnings
    }

    /// Time between samples
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.update_interval_seconds)
    }
}

/// How duty cycles reach the fan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// pigpiod socket (local or remote)
    #[default]
    Pigpio,
    /// Kernel PWM class under /sys/class/pwm
    Sysfs,
}

/// Switch to a fixed duty after repeated sensor failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorEscalation {
    pub after_failures: u32,
    pub duty_percent: f64,
}

/// Everything read from the options file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    #[serde(flatten)]
    pub control: Configuration,
    pub backend: Backend,
    #[serde(rename = "pigpio_addr")]
    pub pigpio_host: String,
    pub pigpio_port: u16,
    pub pwm_chip: PathBuf,
    pub thermal_path: PathBuf,
    pub log_file: Option<PathBuf>,
    pub log_max_bytes: u64,
    pub sensor_failure_limit: Option<u32>,
    pub sensor_failure_duty: Option<f64>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            control: Configuration::default(),
            backend: Backend::default(),
            pigpio_host: defaults::PIGPIO_HOST.to_string(),
            pigpio_port: defaults::PIGPIO_PORT,
            pwm_chip: PathBuf::from(paths::PWM_CHIP),
            thermal_path: PathBuf::from(paths::THERMAL_ZONE),
            log_file: None,
            log_max_bytes: defaults::LOG_MAX_BYTES,
            sensor_failure_limit: None,
            sensor_failure_duty: None,
        }
    }
}

impl DaemonConfig {
    /// Parse an options document
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load an options file, enforcing the size limit before parsing
    pub fn load(path: &Path) -> Result<Self> {
        let meta = fs::metadata(path).map_err(|source| PifanError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        if meta.len() > limits::MAX_CONFIG_SIZE {
            return Err(PifanError::FileTooLarge {
                path: path.to_path_buf(),
                size: meta.len(),
                max_size: limits::MAX_CONFIG_SIZE,
            });
        }

        let content = fs::read_to_string(path).map_err(|source| PifanError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Read {} bytes of options from {:?}", content.len(), path);
        Self::from_json_str(&content)
    }

    /// Validate control parameters and backend options
    pub fn validate(&self) -> Result<()> {
        self.control.validate()?;

        match self.backend {
            Backend::Pigpio => {
                if self.pigpio_host.trim().is_empty() {
                    return Err(PifanError::invalid_config("pigpio_addr", "cannot be empty"));
                }
                if self.pigpio_port == 0 {
                    return Err(PifanError::invalid_config("pigpio_port", "cannot be 0"));
                }
            }
            Backend::Sysfs => {
                if !self.pwm_chip.is_absolute() {
                    return Err(PifanError::invalid_config("pwm_chip", "must be an absolute path"));
                }
                crate::hw::sysfs_pwm::channel_for_gpio(self.control.gpio_pin)
                    .map_err(|e| PifanError::invalid_config("gpio_pin", e))?;
            }
        }

        if !self.thermal_path.is_absolute() {
            return Err(PifanError::invalid_config("thermal_path", "must be an absolute path"));
        }

        if self.log_max_bytes == 0 {
            return Err(PifanError::invalid_config("log_max_bytes", "must be greater than 0"));
        }

        match (self.sensor_failure_limit, self.sensor_failure_duty) {
            (None, None) => {}
            (Some(limit), Some(duty)) => {
                if limit == 0 {
                    return Err(PifanError::invalid_config(
                        "sensor_failure_limit",
                        "must be at least 1",
                    ));
                }
                if !(0.0..=100.0).contains(&duty) {
                    return Err(PifanError::invalid_config(
                        "sensor_failure_duty",
                        format!("{} is outside 0-100", duty),
                    ));
                }
            }
            _ => {
                return Err(PifanError::config(
                    "sensor_failure_limit and sensor_failure_duty must be set together",
                ));
            }
        }

        Ok(())
    }

    /// Sensor failure escalation policy, if configured
    pub fn sensor_escalation(&self) -> Option<SensorEscalation> {
        match (self.sensor_failure_limit, self.sensor_failure_duty) {
            (Some(after_failures), Some(duty_percent)) => Some(SensorEscalation {
                after_failures,
                duty_percent,
            }),
            _ => None,
        }
    }
}

/// Where the options came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub path: PathBuf,
    /// Requested via CLI or environment rather than the built-in default
    pub explicit: bool,
}

impl ConfigSource {
    /// The default options file is absent, so built-in defaults apply
    pub fn falls_back_to_defaults(&self) -> bool {
        !self.explicit && !self.path.exists()
    }
}

/// Resolve the options path: CLI flag, then `PIFAN_CONFIG`, then the default
pub fn resolve_config_path(cli_path: Option<&Path>) -> ConfigSource {
    if let Some(path) = cli_path {
        return ConfigSource {
            path: path.to_path_buf(),
            explicit: true,
        };
    }

    match std::env::var(env::CONFIG_PATH) {
        Ok(path) if !path.trim().is_empty() => ConfigSource {
            path: PathBuf::from(path),
            explicit: true,
        },
        _ => ConfigSource {
            path: PathBuf::from(paths::OPTIONS_FILE),
            explicit: false,
        },
    }
}

/// Load and validate the daemon configuration
///
/// A missing file is only tolerated when nobody asked for it explicitly; in
/// that case the built-in defaults apply.
pub fn load_config(source: &ConfigSource) -> Result<DaemonConfig> {
    let config = if source.falls_back_to_defaults() {
        debug!("CONFIG: {:?} not found", source.path);
        DaemonConfig::default()
    } else {
        DaemonConfig::load(&source.path)?
    };

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = DaemonConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.control.gpio_pin, 18);
        assert_eq!(config.control.control_mode, ControlMode::Pi);
        assert!(config.control.warnings().is_empty());
    }

    #[test]
    fn test_add_on_option_names() {
        let json = r#"{
            "pigpio_addr": "10.0.0.2",
            "pigpio_port": 8889,
            "gpio_pin": 12,
            "pwm_freq": 50,
            "target_temp": 52.5,
            "min_temp": 40,
            "max_temp": 70,
            "min_pwm": 25,
            "update_interval": 5
        }"#;
        let config = DaemonConfig::from_json_str(json).unwrap();
        assert_eq!(config.pigpio_host, "10.0.0.2");
        assert_eq!(config.pigpio_port, 8889);
        assert_eq!(config.control.gpio_pin, 12);
        assert_eq!(config.control.pwm_frequency_hz, 50);
        assert_eq!(config.control.target_temp_c, 52.5);
        assert_eq!(config.control.min_temp_c, 40.0);
        assert_eq!(config.control.max_temp_c, 70.0);
        assert_eq!(config.control.min_duty_percent, 25.0);
        assert_eq!(config.control.update_interval_seconds, 5.0);
        // Untouched keys keep their defaults
        assert_eq!(config.control.proportional_gain, 10.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_control_mode_spellings() {
        let linear = DaemonConfig::from_json_str(r#"{"control_mode": "linear"}"#).unwrap();
        assert_eq!(linear.control.control_mode, ControlMode::Linear);
        let pi = DaemonConfig::from_json_str(r#"{"control_mode": "PI"}"#).unwrap();
        assert_eq!(pi.control.control_mode, ControlMode::Pi);
        assert!(DaemonConfig::from_json_str(r#"{"control_mode": "pid"}"#).is_err());
    }

    #[test]
    fn test_unparsable_value_is_configuration_error() {
        let err = DaemonConfig::from_json_str(r#"{"min_temp": "warm"}"#).unwrap_err();
        assert_eq!(err.kind(), pf_error::ErrorKind::Configuration);
    }

    #[test]
    fn test_rejects_equal_bounds() {
        let config = Configuration {
            min_temp_c: 60.0,
            max_temp_c: 60.0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PifanError::InvalidConfig { ref field, .. } if field == "max_temp"));
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let config = Configuration {
            min_temp_c: 80.0,
            max_temp_c: 60.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_duty_out_of_range() {
        for duty in [-1.0, 100.5, f64::NAN] {
            let config = Configuration {
                min_duty_percent: duty,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "duty {} accepted", duty);
        }
        let edge = Configuration {
            min_duty_percent: 100.0,
            ..Default::default()
        };
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive_interval() {
        for interval in [0.0, -10.0, f64::NAN, 7200.0] {
            let config = Configuration {
                update_interval_seconds: interval,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "interval {} accepted", interval);
        }
    }

    #[test]
    fn test_rejects_non_pwm_gpio() {
        let config = Configuration {
            gpio_pin: 17,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_target_outside_band_only_warns() {
        let config = Configuration {
            target_temp_c: 80.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.warnings().len(), 1);
        assert!(config.warnings()[0].contains("target_temp 80"));

        let linear = Configuration {
            control_mode: ControlMode::Linear,
            ..config
        };
        assert!(linear.warnings().is_empty());
    }

    #[test]
    fn test_escalation_requires_both_fields() {
        let mut config = DaemonConfig {
            sensor_failure_limit: Some(3),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.sensor_failure_duty = Some(100.0);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.sensor_escalation(),
            Some(SensorEscalation {
                after_failures: 3,
                duty_percent: 100.0
            })
        );

        config.sensor_failure_limit = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sysfs_backend_needs_channel_gpio() {
        let mut config = DaemonConfig {
            backend: Backend::Sysfs,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        config.control.gpio_pin = 40;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"control_mode": "linear", "pwm_freq": 50}}"#).unwrap();

        let source = ConfigSource {
            path: file.path().to_path_buf(),
            explicit: true,
        };
        let config = load_config(&source).unwrap();
        assert_eq!(config.control.control_mode, ControlMode::Linear);
        assert_eq!(config.control.pwm_frequency_hz, 50);
    }

    #[test]
    fn test_load_rejects_oversized_file() {
        let mut file = NamedTempFile::new().unwrap();
        let padding = " ".repeat(limits::MAX_CONFIG_SIZE as usize + 1);
        write!(file, "{{}}{}", padding).unwrap();
        let err = DaemonConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, PifanError::FileTooLarge { .. }));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = ConfigSource {
            path: dir.path().join("nope.json"),
            explicit: true,
        };
        let err = load_config(&source).unwrap_err();
        assert_eq!(err.kind(), pf_error::ErrorKind::Configuration);
    }

    #[test]
    fn test_missing_default_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let source = ConfigSource {
            path: dir.path().join("options.json"),
            explicit: false,
        };
        assert!(source.falls_back_to_defaults());
        assert_eq!(load_config(&source).unwrap(), DaemonConfig::default());

        let explicit = ConfigSource {
            explicit: true,
            ..source
        };
        assert!(!explicit.falls_back_to_defaults());
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"min_temp": 75, "max_temp": 50}}"#).unwrap();
        let source = ConfigSource {
            path: file.path().to_path_buf(),
            explicit: true,
        };
        assert!(load_config(&source).is_err());
    }

    #[test]
    #[serial]
    fn test_resolve_prefers_cli_then_env() {
        std::env::set_var(env::CONFIG_PATH, "/tmp/from-env.json");
        let cli = resolve_config_path(Some(Path::new("/tmp/from-cli.json")));
        assert_eq!(cli.path, PathBuf::from("/tmp/from-cli.json"));
        assert!(cli.explicit);

        let from_env = resolve_config_path(None);
        assert_eq!(from_env.path, PathBuf::from("/tmp/from-env.json"));
        assert!(from_env.explicit);
        std::env::remove_var(env::CONFIG_PATH);
    }

    #[test]
    #[serial]
    fn test_resolve_falls_back_to_default() {
        std::env::remove_var(env::CONFIG_PATH);
        let source = resolve_config_path(None);
        assert_eq!(source.path, PathBuf::from(paths::OPTIONS_FILE));
        assert!(!source.explicit);
    }
}
