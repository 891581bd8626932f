//! Structured control events
//!
//! The control loop reports what it does through an [`EventSink`]. The
//! daemon uses [`TracingSink`], which turns events into `tracing` records;
//! persistence is up to whichever subscriber is installed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::ControlMode;

/// One control iteration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleEvent {
    pub timestamp: DateTime<Utc>,
    pub temperature_c: f64,
    pub duty_percent: f64,
    /// Pre-clamp PI output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_output_raw: Option<f64>,
}

impl SampleEvent {
    pub fn now(temperature_c: f64, duty_percent: f64, controller_output_raw: Option<f64>) -> Self {
        Self {
            timestamp: Utc::now(),
            temperature_c,
            duty_percent,
            controller_output_raw,
        }
    }
}

/// Why the loop left `Running`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// SIGINT/SIGTERM or an equivalent stop request
    Signal,
    /// The requested number of iterations completed
    IterationLimit,
    /// The commanded duty could not be applied
    ActuationFailed,
}

/// Lifecycle records
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Started {
        backend: String,
        mode: ControlMode,
        interval_seconds: f64,
    },
    Stopped {
        reason: StopReason,
    },
    ConnectionFailed {
        reason: String,
    },
    SensorReadFailed {
        reason: String,
        consecutive_failures: u32,
        substituted_c: f64,
    },
    SensorEscalated {
        consecutive_failures: u32,
        duty_percent: f64,
    },
    SensorRecovered {
        after_failures: u32,
    },
    ActuationFailed {
        reason: String,
    },
}

/// Receives control events
pub trait EventSink {
    fn sample(&mut self, event: &SampleEvent);
    fn lifecycle(&mut self, event: &LifecycleEvent);
}

impl<T: EventSink + ?Sized> EventSink for &mut T {
    fn sample(&mut self, event: &SampleEvent) {
        (**self).sample(event)
    }

    fn lifecycle(&mut self, event: &LifecycleEvent) {
        (**self).lifecycle(event)
    }
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn sample(&mut self, event: &SampleEvent) {
        info!(
            timestamp = %event.timestamp.to_rfc3339(),
            temperature_c = event.temperature_c,
            duty_percent = event.duty_percent,
            raw_output = ?event.controller_output_raw,
            "Temperature: {:.1}°C → Fan: {:.1}%",
            event.temperature_c,
            event.duty_percent
        );
    }

    fn lifecycle(&mut self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::Started {
                backend,
                mode,
                interval_seconds,
            } => info!(
                backend = %backend,
                mode = %mode,
                interval_seconds = *interval_seconds,
                "Fan daemon started"
            ),
            LifecycleEvent::Stopped { reason } => {
                info!(reason = ?reason, "Fan daemon stopped")
            }
            LifecycleEvent::ConnectionFailed { reason } => {
                error!(reason = %reason, "Connection to PWM backend failed")
            }
            LifecycleEvent::SensorReadFailed {
                reason,
                consecutive_failures,
                substituted_c,
            } => warn!(
                reason = %reason,
                consecutive_failures = *consecutive_failures,
                substituted_c = *substituted_c,
                "Sensor read failed - treating temperature as {:.1}°C; a real overheat would be masked",
                substituted_c
            ),
            LifecycleEvent::SensorEscalated {
                consecutive_failures,
                duty_percent,
            } => error!(
                consecutive_failures = *consecutive_failures,
                duty_percent = *duty_percent,
                "Sensor unreadable for {} samples - forcing fan to {:.1}%",
                consecutive_failures,
                duty_percent
            ),
            LifecycleEvent::SensorRecovered { after_failures } => {
                info!(after_failures = *after_failures, "Sensor readings recovered")
            }
            LifecycleEvent::ActuationFailed { reason } => {
                error!(reason = %reason, "Failed to apply fan duty")
            }
        }
    }
}
