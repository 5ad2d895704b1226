mod support;

use modem_core::capability::{FailureReason, ModemIdentity, SleepMethod, WakeMethod};
use modem_core::error::{ConfigIssue, ModemError, TimeoutKind};
use modem_core::lifecycle::LifecycleState;
use modem_core::lines::{LineId, LineLevel};
use modem_core::power::PowerState;

use support::{Clock, ScriptedModule, build, profile, run_to_state, run_until, timing_ms, wiring};

#[test]
fn wake_line_only_module_is_ready_after_one_pulse() {
    let clock = Clock::default();
    let mut module = ScriptedModule::new(
        profile(
            timing_ms(0, 7_000, 0, 5_000, 15_000, 1_100),
            WakeMethod::Pulse,
            SleepMethod::AtPowerDown,
        ),
        clock.clone(),
    );
    module.responds_from = Some(1_200);
    let mut modem = build(module, wiring(-1, -1, 2));

    let now = clock.set(0);
    modem.set_up(now);
    modem.power_up(now).expect("power up");
    modem.wake(now).expect("wake");

    let ready_at = run_to_state(&mut modem, &clock, LifecycleState::Ready, 10_000, 10);
    assert_eq!(ready_at, Some(1_200));
    assert_eq!(modem.power_state(), PowerState::Awake);
    assert_eq!(modem.attempt(), 1);
    assert_eq!(modem.identity().map(ModemIdentity::as_str), Some("scripted"));

    let wake = modem.lines_mut().transitions(LineId::WakeRequest);
    let asserts: Vec<_> = wake
        .iter()
        .filter(|(_, level)| *level == LineLevel::Low)
        .collect();
    assert_eq!(asserts.len(), 1, "exactly one wake pulse: {wake:?}");
    assert_eq!(wake.last(), Some(&(1_100, LineLevel::High)));
    assert_eq!(*asserts[0], (0, LineLevel::Low));
    assert!(modem.lines_mut().transitions(LineId::Power).is_empty());

    let flags = modem.status_flags();
    assert!(flags.power_succeeded && flags.wake_succeeded && flags.setup_succeeded);
    assert!(!flags.failure);
}

#[test]
fn wake_pulse_never_starts_before_status_time() {
    let clock = Clock::default();
    let module = ScriptedModule::new(
        profile(
            timing_ms(500, 7_000, 0, 5_000, 15_000, 1_100),
            WakeMethod::Pulse,
            SleepMethod::AtPowerDown,
        ),
        clock.clone(),
    );
    let mut modem = build(module, wiring(1, -1, 2));

    let now = clock.set(0);
    modem.power_up(now).expect("power up");
    modem.wake(now).expect("wake");
    run_until(&mut modem, &clock, 490, 10);

    let asserted_early = modem
        .lines_mut()
        .transitions(LineId::WakeRequest)
        .iter()
        .any(|(_, level)| *level == LineLevel::Low);
    assert!(!asserted_early);
    assert_eq!(
        modem.lines_mut().transitions(LineId::Power),
        vec![(0, LineLevel::High)]
    );

    run_until(&mut modem, &clock, 500, 10);
    assert_eq!(
        modem.lines_mut().transitions(LineId::WakeRequest).last(),
        Some(&(500, LineLevel::Low))
    );
}

#[test]
fn silent_module_fails_after_three_attempts() {
    let clock = Clock::default();
    let mut module = ScriptedModule::new(
        profile(
            timing_ms(0, 7_000, 0, 5_000, 15_000, 1_100),
            WakeMethod::Pulse,
            SleepMethod::AtPowerDown,
        ),
        clock.clone(),
    );
    module.responds_from = None;
    let mut modem = build(module, wiring(1, -1, 2));

    let now = clock.set(0);
    modem.begin_cycle();
    modem.power_up(now).expect("power up");
    modem.wake(now).expect("wake");

    let failed = LifecycleState::Failed(ModemError::Timeout(TimeoutKind::AtHandshake));
    assert_eq!(
        run_to_state(&mut modem, &clock, failed, 60_000, 10),
        Some(18_300)
    );
    assert_eq!(modem.attempt(), 3);

    let pulses = modem
        .lines_mut()
        .transitions(LineId::WakeRequest)
        .into_iter()
        .filter(|(_, level)| *level == LineLevel::Low)
        .map(|(at, _)| at)
        .collect::<Vec<_>>();
    assert_eq!(pulses, vec![0, 6_100, 12_200]);

    let flags = modem.status_flags();
    assert!(flags.power_succeeded);
    assert!(!flags.setup_succeeded);
    assert!(flags.failure);
    assert_eq!(flags.to_bits(), 0b1001_1110);

    run_until(&mut modem, &clock, 40_000, 100);
    assert_eq!(modem.state(), failed);
}

#[test]
fn failed_setup_is_not_retried_within_the_power_cycle() {
    let clock = Clock::default();
    let mut module = ScriptedModule::new(
        profile(
            timing_ms(0, 7_000, 0, 5_000, 15_000, 1_100),
            WakeMethod::Pulse,
            SleepMethod::AtPowerDown,
        ),
        clock.clone(),
    );
    module.setup_fails = Some(FailureReason::Rejected);
    let mut modem = build(module, wiring(1, -1, 2));

    let now = clock.set(0);
    modem.begin_cycle();
    modem.power_up(now).expect("power up");
    modem.wake(now).expect("wake");

    let failed = LifecycleState::Failed(ModemError::FatalSetup(FailureReason::Rejected));
    assert_eq!(
        run_to_state(&mut modem, &clock, failed, 10_000, 10),
        Some(1_100)
    );

    run_until(&mut modem, &clock, 30_000, 100);
    assert_eq!(modem.state(), failed);
    assert_eq!(modem.attempt(), 1);
    assert_eq!(modem.driver_mut().setup_calls, 1);
    assert_eq!(modem.driver_mut().at_probes, 1);
    assert!(modem.identity().is_none());

    let flags = modem.status_flags();
    assert!(flags.setup_failed && flags.failure);
    assert!(flags.wake_succeeded);
    assert!(!flags.setup_succeeded);
    assert_eq!(flags.to_bits(), 0b1001_1110);
    assert!(ModemError::FatalSetup(FailureReason::Rejected).is_retryable());
}

#[test]
fn power_up_after_failure_with_power_held_wakes_again() {
    let clock = Clock::default();
    let mut module = ScriptedModule::new(
        profile(
            timing_ms(0, 7_000, 0, 5_000, 15_000, 1_100),
            WakeMethod::Pulse,
            SleepMethod::AtPowerDown,
        ),
        clock.clone(),
    );
    module.responds_from = None;
    let mut modem = build(module, wiring(-1, -1, 2));

    let now = clock.set(0);
    modem.begin_cycle();
    modem.power_up(now).expect("power up");
    modem.wake(now).expect("wake");
    let failed = LifecycleState::Failed(ModemError::Timeout(TimeoutKind::AtHandshake));
    assert!(run_to_state(&mut modem, &clock, failed, 60_000, 10).is_some());

    // No power line, so the module cannot be switched off between cycles.
    assert_eq!(
        modem.sleep(clock.set(19_000)),
        Err(ModemError::ConfigurationMismatch(ConfigIssue::NoPowerLine))
    );
    assert_eq!(modem.power_state(), PowerState::Awake);

    modem.driver_mut().responds_from = Some(0);
    let probes_before = modem.driver_mut().at_probes;
    let now = clock.set(20_000);
    modem.begin_cycle();
    modem.power_up(now).expect("power up");
    modem.wake(now).expect("wake");
    assert_eq!(modem.state(), LifecycleState::PoweringUp);

    assert_eq!(
        run_to_state(&mut modem, &clock, LifecycleState::Ready, 60_000, 10),
        Some(21_100)
    );
    assert_eq!(modem.attempt(), 1);
    assert_eq!(modem.driver_mut().at_probes, probes_before + 1);
    assert_eq!(
        modem.lines_mut().transitions(LineId::WakeRequest).last(),
        Some(&(21_100, LineLevel::High))
    );
    assert!(modem.status_flags().wake_succeeded);
}

#[test]
fn status_pin_confirms_wake_after_pulse() {
    let clock = Clock::default();
    let module = ScriptedModule::new(
        profile(
            timing_ms(0, 15_000, 0, 4_000, 10_000, 200),
            WakeMethod::PulseThenStatus,
            SleepMethod::AtPowerDown,
        ),
        clock.clone(),
    );
    let mut modem = build(module, wiring(1, 3, 2));

    let now = clock.set(0);
    modem.power_up(now).expect("power up");
    modem.wake(now).expect("wake");
    run_until(&mut modem, &clock, 990, 10);
    assert_eq!(modem.state(), LifecycleState::PoweringUp);
    assert_eq!(
        modem.lines_mut().transitions(LineId::WakeRequest).last(),
        Some(&(200, LineLevel::High))
    );

    modem.lines_mut().status = LineLevel::High;
    run_until(&mut modem, &clock, 1_000, 10);
    assert_eq!(modem.state(), LifecycleState::Ready);
    assert_eq!(modem.woke_at().map(support::MockInstant::as_ms), Some(1_000));
}

#[test]
fn status_pin_timeout_counts_as_a_failed_attempt() {
    let clock = Clock::default();
    let module = ScriptedModule::new(
        profile(
            timing_ms(0, 15_000, 0, 4_000, 10_000, 200),
            WakeMethod::StatusPin,
            SleepMethod::CutPower,
        ),
        clock.clone(),
    );
    let mut modem = build(module, wiring(1, 3, -1));

    let now = clock.set(0);
    modem.power_up(now).expect("power up");
    modem.wake(now).expect("wake");
    run_until(&mut modem, &clock, 4_000, 10);

    assert_eq!(modem.state(), LifecycleState::PoweringUp);
    assert_eq!(modem.attempt(), 2);
}

#[test]
fn warm_up_delays_the_first_probe() {
    let clock = Clock::default();
    let module = ScriptedModule::new(
        profile(
            timing_ms(0, 5_000, 1_000, 5_000, 5_000, 0),
            WakeMethod::AlwaysOn,
            SleepMethod::CutPower,
        ),
        clock.clone(),
    );
    let mut modem = build(module, wiring(1, -1, -1));

    let now = clock.set(0);
    modem.power_up(now).expect("power up");
    modem.wake(now).expect("wake");
    assert_eq!(modem.state(), LifecycleState::WaitingForResponse);
    assert_eq!(modem.driver_mut().at_probes, 0);

    assert_eq!(
        run_to_state(&mut modem, &clock, LifecycleState::Ready, 10_000, 10),
        Some(1_000)
    );
    assert_eq!(modem.driver_mut().at_probes, 1);
}

#[test]
fn wake_requires_power() {
    let clock = Clock::default();
    let module = ScriptedModule::new(
        profile(
            timing_ms(0, 5_000, 0, 5_000, 5_000, 0),
            WakeMethod::AlwaysOn,
            SleepMethod::CutPower,
        ),
        clock.clone(),
    );
    let mut modem = build(module, wiring(1, -1, -1));
    assert!(matches!(
        modem.wake(clock.set(0)),
        Err(ModemError::InvalidState(_))
    ));
}
