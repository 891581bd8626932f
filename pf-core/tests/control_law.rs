/*
 * Control law scenarios
 *
 * End-to-end sequences through the public pf_core API, using the
 * documented default tuning.
 */

use pf_core::{ControlLaw, ControlMode, ControllerState, Configuration, DaemonConfig};

fn pi_config() -> Configuration {
    Configuration {
        control_mode: ControlMode::Pi,
        target_temp_c: 55.0,
        min_temp_c: 50.0,
        max_temp_c: 75.0,
        min_duty_percent: 30.0,
        proportional_gain: 10.0,
        integral_gain: 0.4,
        update_interval_seconds: 10.0,
        ..Default::default()
    }
}

fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-9, "{:?} != {:?}", actual, expected);
    }
}

#[test]
fn test_sustained_overtemp_winds_up_to_full() {
    let law = ControlLaw::new(&pi_config());
    let mut state = ControllerState::default();

    let mut integrals = Vec::new();
    let mut raws = Vec::new();
    let mut duties = Vec::new();
    for temp in [60.0, 60.0, 60.0] {
        let output = law.compute(temp, &mut state);
        integrals.push(state.integral_sum);
        raws.push(output.raw_output.unwrap());
        duties.push(output.duty_percent);
    }

    assert_close(&integrals, &[50.0, 100.0, 150.0]);
    assert_close(&raws, &[70.0, 90.0, 110.0]);
    assert_close(&duties, &[70.0, 90.0, 100.0]);
}

#[test]
fn test_cooldown_clears_windup() {
    let law = ControlLaw::new(&pi_config());
    let mut state = ControllerState::default();

    for _ in 0..10 {
        law.compute(70.0, &mut state);
    }
    assert!(state.integral_sum > 0.0);

    let off = law.compute(45.0, &mut state);
    assert_eq!(off.duty_percent, 0.0);
    assert_eq!(state.integral_sum, 0.0);

    // Back in the band the controller starts from scratch
    let output = law.compute(56.0, &mut state);
    assert!((state.integral_sum - 10.0).abs() < 1e-9);
    assert!((output.raw_output.unwrap() - 14.0).abs() < 1e-9);
    assert_eq!(output.duty_percent, 30.0);
}

#[test]
fn test_output_range_over_a_sweep() {
    for mode in [ControlMode::Linear, ControlMode::Pi] {
        let config = Configuration {
            control_mode: mode,
            ..pi_config()
        };
        let law = ControlLaw::new(&config);
        let mut state = ControllerState::default();
        let mut temp = 20.0;
        while temp < 100.0 {
            let duty = law.compute(temp, &mut state).duty_percent;
            if temp < config.min_temp_c {
                assert_eq!(duty, 0.0, "{:?} at {}", mode, temp);
            } else if temp > config.max_temp_c {
                assert_eq!(duty, 100.0, "{:?} at {}", mode, temp);
            } else {
                assert!(
                    (config.min_duty_percent..=100.0).contains(&duty),
                    "{:?} at {} gave {}",
                    mode,
                    temp,
                    duty
                );
            }
            temp += 0.5;
        }
    }
}

#[test]
fn test_modes_differ_exactly_at_max() {
    let linear = ControlLaw::new(&Configuration {
        control_mode: ControlMode::Linear,
        ..pi_config()
    });
    let pi = ControlLaw::new(&pi_config());
    let mut state = ControllerState::default();

    // Linear reaches 100 by interpolation, PI by the inclusive branch
    assert_eq!(linear.compute(75.0, &mut state).duty_percent, 100.0);
    let output = pi.compute(75.0, &mut state);
    assert_eq!(output.duty_percent, 100.0);
    assert!(state.integral_sum > 0.0);
}

#[test]
fn test_linear_variant_from_options_file() {
    let config = DaemonConfig::from_json_str(
        r#"{"control_mode": "linear", "min_temp": 40, "max_temp": 70, "min_pwm": 30, "pwm_freq": 50}"#,
    )
    .unwrap();
    config.validate().unwrap();

    let law = ControlLaw::new(&config.control);
    let mut state = ControllerState::default();
    assert_eq!(law.compute(39.9, &mut state).duty_percent, 0.0);
    assert_eq!(law.compute(40.0, &mut state).duty_percent, 30.0);
    assert!((law.compute(55.0, &mut state).duty_percent - 65.0).abs() < 1e-9);
    assert_eq!(law.compute(70.1, &mut state).duty_percent, 100.0);
}
