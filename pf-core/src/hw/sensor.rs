//! Temperature sources
//!
//! The kernel thermal class reports a single integer in millidegrees
//! Celsius (e.g. `48312` = 48.312°C).

use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::temperature;
use pf_error::{PifanError, Result};

/// Anything that can report the current temperature in °C
#[cfg_attr(test, mockall::automock)]
pub trait TemperatureSource {
    /// Read the current temperature, or a `TemperatureRead` error
    fn read(&mut self) -> Result<f64>;
}

impl<T: TemperatureSource + ?Sized> TemperatureSource for Box<T> {
    fn read(&mut self) -> Result<f64> {
        (**self).read()
    }
}

/// Reads a sysfs thermal zone (or any file holding millidegrees)
#[derive(Debug, Clone)]
pub struct SysfsThermalSensor {
    path: PathBuf,
}

impl SysfsThermalSensor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TemperatureSource for SysfsThermalSensor {
    fn read(&mut self) -> Result<f64> {
        read_millidegrees(&self.path)
    }
}

/// Read a millidegree file and convert to degrees Celsius
pub fn read_millidegrees(path: &Path) -> Result<f64> {
    let content = fs::read_to_string(path)
        .map_err(|e| PifanError::temperature_read(path, format!("Failed to read: {}", e)))?;

    let millidegrees = content.trim().parse::<i64>().map_err(|e| {
        PifanError::temperature_read(
            path,
            format!("Failed to parse '{}': {}", content.trim(), e),
        )
    })?;

    Ok(millidegrees as f64 / temperature::MILLIDEGREE_DIVISOR)
}
