//! Fan control loop
//!
//! Starting -> Running -> Stopping -> Terminated. The loop owns the sensor,
//! the fail-safe actuator guard and the controller state; nothing else
//! touches them while it runs. A stop request interrupts the inter-sample
//! sleep, and every path out of `Running` goes through the fan-off in
//! `Stopping`.

use tokio::sync::watch;
use tracing::{debug, error, info};

use pf_core::constants::{duty, temperature};
use pf_core::{
    Configuration, ControlLaw, ControllerState, DutyActuator, EventSink, FailSafe,
    LifecycleEvent, SampleEvent, SensorEscalation, StopReason, TemperatureSource,
};
use pf_error::{PifanError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Starting,
    Running,
    Stopping,
    Terminated,
}

pub struct ControlLoop<S, A, E>
where
    S: TemperatureSource,
    A: DutyActuator,
    E: EventSink,
{
    config: Configuration,
    law: ControlLaw,
    state: ControllerState,
    sensor: S,
    actuator: FailSafe<A>,
    events: E,
    escalation: Option<SensorEscalation>,
    consecutive_sensor_failures: u32,
    max_iterations: Option<u64>,
    phase: LoopPhase,
}

impl<S, A, E> ControlLoop<S, A, E>
where
    S: TemperatureSource,
    A: DutyActuator,
    E: EventSink,
{
    /// Starting phase: validate the configuration, then connect
    ///
    /// A connection failure is reported as a lifecycle event and returned;
    /// no fan-off is attempted because nothing was ever commanded.
    pub fn start<F>(config: Configuration, sensor: S, mut events: E, connect: F) -> Result<Self>
    where
        F: FnOnce(&Configuration) -> Result<A>,
    {
        config.validate()?;

        let actuator = match connect(&config) {
            Ok(actuator) => actuator,
            Err(e) => {
                events.lifecycle(&LifecycleEvent::ConnectionFailed {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };
        info!("STARTUP: Connected to {}", actuator.describe());

        let guard = FailSafe::new(actuator, config.gpio_pin, config.pwm_frequency_hz);
        Ok(Self {
            law: ControlLaw::new(&config),
            state: ControllerState::default(),
            config,
            sensor,
            actuator: guard,
            events,
            escalation: None,
            consecutive_sensor_failures: 0,
            max_iterations: None,
            phase: LoopPhase::Starting,
        })
    }

    pub fn with_escalation(mut self, escalation: Option<SensorEscalation>) -> Self {
        self.escalation = escalation;
        self
    }

    /// Stop on its own after `iterations` samples
    pub fn with_iteration_limit(mut self, iterations: u64) -> Self {
        self.max_iterations = Some(iterations);
        self
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Run until stopped, then turn the fan off
    ///
    /// Returns why the loop stopped, or the actuation error that ended it.
    /// The loop is `Terminated` afterwards and cannot be run again.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<StopReason> {
        if self.phase != LoopPhase::Starting {
            return Err(PifanError::config("control loop already ran"));
        }

        self.transition(LoopPhase::Running);
        self.events.lifecycle(&LifecycleEvent::Started {
            backend: self.actuator.describe(),
            mode: self.law.mode(),
            interval_seconds: self.config.update_interval_seconds,
        });

        let outcome = self.run_iterations(&mut shutdown).await;

        self.transition(LoopPhase::Stopping);
        let reason = match &outcome {
            Ok(reason) => *reason,
            Err(_) => StopReason::ActuationFailed,
        };

        if let Err(e) = self.actuator.shutdown() {
            error!("SHUTDOWN: Fan-off incomplete: {}", e);
        }
        self.events.lifecycle(&LifecycleEvent::Stopped { reason });
        self.transition(LoopPhase::Terminated);

        outcome
    }

    async fn run_iterations(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<StopReason> {
        let interval = self.config.interval();
        let mut iterations: u64 = 0;

        loop {
            if *shutdown.borrow() {
                info!("CONTROL: Stop requested");
                return Ok(StopReason::Signal);
            }

            self.iterate()?;
            iterations += 1;

            if self.max_iterations.is_some_and(|max| iterations >= max) {
                debug!("CONTROL: Iteration limit {} reached", iterations);
                return Ok(StopReason::IterationLimit);
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    // Nobody left to send a stop: treat as one
                    if changed.is_err() {
                        debug!("CONTROL: Shutdown channel closed");
                        return Ok(StopReason::Signal);
                    }
                }
            }
        }
    }

    /// One sample: read, compute, actuate, report
    pub fn iterate(&mut self) -> Result<SampleEvent> {
        let temperature_c = match self.sensor.read() {
            Ok(value) if value.is_finite() => {
                if self.consecutive_sensor_failures > 0 {
                    self.events.lifecycle(&LifecycleEvent::SensorRecovered {
                        after_failures: self.consecutive_sensor_failures,
                    });
                    self.consecutive_sensor_failures = 0;
                }
                value
            }
            Ok(value) => self.sensor_failed(format!("non-finite reading {}", value)),
            Err(e) => self.sensor_failed(e.to_string()),
        };

        let output = self.law.compute(temperature_c, &mut self.state);
        let mut duty_percent = output.duty_percent;

        if let Some(escalation) = self.escalation {
            if self.consecutive_sensor_failures >= escalation.after_failures {
                duty_percent = escalation.duty_percent;
                self.events.lifecycle(&LifecycleEvent::SensorEscalated {
                    consecutive_failures: self.consecutive_sensor_failures,
                    duty_percent,
                });
            }
        }
        let duty_percent = duty::clamp_percent(duty_percent);

        if let Err(e) = self.actuator.set_duty(duty_percent) {
            self.events.lifecycle(&LifecycleEvent::ActuationFailed {
                reason: e.to_string(),
            });
            return Err(e);
        }
        self.state.last_duty_percent = duty_percent;

        let sample = SampleEvent::now(temperature_c, duty_percent, output.raw_output);
        self.events.sample(&sample);
        Ok(sample)
    }

    fn sensor_failed(&mut self, reason: String) -> f64 {
        self.consecutive_sensor_failures = self.consecutive_sensor_failures.saturating_add(1);
        self.events.lifecycle(&LifecycleEvent::SensorReadFailed {
            reason,
            consecutive_failures: self.consecutive_sensor_failures,
            substituted_c: temperature::READ_FAILURE_SENTINEL_C,
        });
        temperature::READ_FAILURE_SENTINEL_C
    }

    fn transition(&mut self, next: LoopPhase) {
        info!("STATE: {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }
}
