//! Fail-safe actuator guard
//!
//! Owns the actuator between startup and shutdown. [`FailSafe::shutdown`]
//! turns the fan off and releases the backend; if the guard is dropped
//! without that (early return, panic unwinding through the loop) `Drop`
//! does the same, so the fan is never left at a stale speed.

use tracing::{error, info, warn};

use crate::constants::duty;
use crate::hw::actuator::DutyActuator;
use pf_error::Result;

pub struct FailSafe<A: DutyActuator> {
    actuator: Option<A>,
    pin: u32,
    frequency_hz: u32,
}

impl<A: DutyActuator> FailSafe<A> {
    pub fn new(actuator: A, pin: u32, frequency_hz: u32) -> Self {
        Self {
            actuator: Some(actuator),
            pin,
            frequency_hz,
        }
    }

    /// Command a duty on the guarded output
    pub fn set_duty(&mut self, percent: f64) -> Result<()> {
        let percent = duty::clamp_percent(percent);
        match self.actuator.as_mut() {
            Some(actuator) => actuator.set_duty(self.pin, self.frequency_hz, percent),
            None => Err(pf_error::PifanError::actuation(
                self.pin,
                percent,
                "actuator already released",
            )),
        }
    }

    pub fn describe(&self) -> String {
        self.actuator
            .as_ref()
            .map(|a| a.describe())
            .unwrap_or_else(|| "released actuator".to_string())
    }

    /// Turn the fan off and release the backend
    ///
    /// Release happens even when the fan-off command fails; the fan-off
    /// error is returned. Later calls are no-ops, and so is `Drop`.
    pub fn shutdown(&mut self) -> Result<()> {
        self.fan_off()
    }

    fn fan_off(&mut self) -> Result<()> {
        let Some(mut actuator) = self.actuator.take() else {
            return Ok(());
        };

        let result = actuator.set_duty(self.pin, self.frequency_hz, duty::OFF_PERCENT);
        match &result {
            Ok(()) => info!("FAILSAFE: Fan set to 0% on GPIO {}", self.pin),
            Err(e) => error!("FAILSAFE: Failed to turn fan off on GPIO {}: {}", self.pin, e),
        }

        if let Err(e) = actuator.release() {
            warn!("FAILSAFE: Failed to release {}: {}", actuator.describe(), e);
        }

        result
    }
}

impl<A: DutyActuator> Drop for FailSafe<A> {
    fn drop(&mut self) {
        if self.actuator.is_some() {
            warn!("FAILSAFE: Control loop exited without shutdown - turning fan off");
            let _ = self.fan_off();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::actuator::MockDutyActuator;
    use mockall::predicate::eq;
    use mockall::Sequence;

    #[test]
    fn test_shutdown_turns_fan_off_then_releases() {
        let mut seq = Sequence::new();
        let mut mock = MockDutyActuator::new();
        mock.expect_set_duty()
            .with(eq(18), eq(25_000), eq(70.0))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        mock.expect_set_duty()
            .with(eq(18), eq(25_000), eq(0.0))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        mock.expect_release().times(1).in_sequence(&mut seq).returning(|| Ok(()));

        let mut guard = FailSafe::new(mock, 18, 25_000);
        guard.set_duty(70.0).unwrap();
        guard.shutdown().unwrap();
    }

    #[test]
    fn test_release_runs_even_if_fan_off_fails() {
        let mut mock = MockDutyActuator::new();
        mock.expect_set_duty()
            .returning(|pin, _, percent| Err(pf_error::PifanError::actuation(pin, percent, "gone")));
        mock.expect_release().times(1).returning(|| Ok(()));
        mock.expect_describe().returning(|| "mock".to_string());

        let mut guard = FailSafe::new(mock, 18, 50);
        assert!(guard.shutdown().is_err());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut mock = MockDutyActuator::new();
        mock.expect_set_duty()
            .with(eq(18), eq(50), eq(0.0))
            .times(1)
            .returning(|_, _, _| Ok(()));
        mock.expect_release().times(1).returning(|| Ok(()));

        let mut guard = FailSafe::new(mock, 18, 50);
        guard.shutdown().unwrap();
        guard.shutdown().unwrap();
        assert!(guard.set_duty(50.0).is_err());
        drop(guard);
    }

    #[test]
    fn test_drop_without_shutdown_turns_fan_off() {
        let mut mock = MockDutyActuator::new();
        mock.expect_set_duty()
            .with(eq(18), eq(50), eq(0.0))
            .times(1)
            .returning(|_, _, _| Ok(()));
        mock.expect_release().times(1).returning(|| Ok(()));

        let guard = FailSafe::new(mock, 18, 50);
        drop(guard);
    }

    #[test]
    fn test_set_duty_clamps() {
        let mut mock = MockDutyActuator::new();
        mock.expect_set_duty()
            .with(eq(18), eq(50), eq(100.0))
            .times(1)
            .returning(|_, _, _| Ok(()));
        mock.expect_set_duty()
            .with(eq(18), eq(50), eq(0.0))
            .times(1)
            .returning(|_, _, _| Ok(()));
        mock.expect_release().returning(|| Ok(()));

        let mut guard = FailSafe::new(mock, 18, 50);
        guard.set_duty(140.0).unwrap();
        guard.shutdown().unwrap();
    }
}
