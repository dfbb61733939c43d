mod common;

use embedded_hal::digital::PinState;
use smartpakit::{
    execute_register_sequence, execute_reset_sequence, ConfigError, Direction,
    Error, NoDiagnostics, OpKind, RegCache, RegOp, RegisterMap, RegisterSequence,
    Report, ResetDescriptor, ResetSequence, ResetStep, TransportError, PinId,
};

use common::{chip, fleet_of, DelayCall, Event, Harness, MockDelay, MockPins, BUS_FAILURE};

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

#[test]
fn cells_compile_to_ops() {
    let seq = RegisterSequence::from_cells(&[
        0x10, 0x01, 1, //
        0x20, 3, 0, //
        0, 5, 2,
    ])
    .unwrap();
    assert_eq!(
        seq.ops(),
        &[RegOp::write(0x10, 0x01), RegOp::read(0x20, 3), RegOp::delay(5)]
    );
    assert_eq!(seq.ops()[1].kind, OpKind::Read { count: 3 });
}

#[test]
fn unknown_ctl_type_is_rejected() {
    assert_eq!(
        RegisterSequence::from_cells(&[0x10, 0x01, 7]),
        Err(ConfigError::UnknownOpKind(7))
    );
}

#[test]
fn malformed_cells_are_rejected() {
    assert_eq!(
        RegisterSequence::from_cells(&[0x10, 0x01]),
        Err(ConfigError::MalformedCells { len: 2, stride: 3 })
    );
    assert_eq!(
        ResetSequence::from_cells(&[1, 5, 0]),
        Err(ConfigError::MalformedCells { len: 3, stride: 2 })
    );
}

#[test]
fn empty_sequences_cannot_be_built() {
    assert_eq!(RegisterSequence::new(vec![]), Err(ConfigError::EmptySequence));
    assert_eq!(RegisterSequence::from_cells(&[]), Err(ConfigError::EmptySequence));
    assert_eq!(ResetSequence::new(vec![]), Err(ConfigError::EmptySequence));
}

// ---------------------------------------------------------------------------
// Register sequences
// ---------------------------------------------------------------------------

#[futures_test::test]
async fn transport_calls_match_ops() {
    let h = Harness::new(fleet_of(vec![chip(0)]));
    let chip = h.fleet.chip(0).unwrap();
    let mut bus = h.bus.clone();
    let mut cache = RegCache::new(&chip.config().regmap);
    let mut delay = h.delay.clone();
    let seq = RegisterSequence::new(vec![
        RegOp::write(0x10, 0xaa),
        RegOp::read(0x20, 3),
        RegOp::delay(5),
        RegOp::write(0x11, 0xbb),
    ])
    .unwrap();

    let outcome = execute_register_sequence(
        &mut RegisterMap::new(&mut bus, chip, &mut cache),
        Some(&seq),
        &mut delay,
        &NoDiagnostics,
        None,
    )
    .await;

    assert!(outcome.is_ok());
    assert_eq!(
        h.bus_events(),
        vec![
            Event::Write { chip: 0, address: 0x10, value: 0xaa },
            Event::Read { chip: 0, address: 0x20 },
            Event::Read { chip: 0, address: 0x21 },
            Event::Read { chip: 0, address: 0x22 },
            Event::Write { chip: 0, address: 0x11, value: 0xbb },
        ]
    );
    // The delay is not last, so it busy-waits.
    assert_eq!(h.delay.calls(), vec![DelayCall::Blocking(5)]);
}

#[futures_test::test]
async fn missing_sequence_is_a_no_op() {
    let h = Harness::new(fleet_of(vec![chip(0)]));
    let chip = h.fleet.chip(0).unwrap();
    let mut bus = h.bus.clone();
    let mut cache = RegCache::new(&chip.config().regmap);
    let mut delay = h.delay.clone();

    let outcome = execute_register_sequence(
        &mut RegisterMap::new(&mut bus, chip, &mut cache),
        None,
        &mut delay,
        &NoDiagnostics,
        None,
    )
    .await;

    assert_eq!(outcome.errors, 0);
    assert_eq!(outcome.last_error, None);
    assert!(h.events().is_empty());
    assert!(h.delay.calls().is_empty());
}

#[futures_test::test]
async fn failures_are_counted_and_do_not_abort() {
    let h = Harness::new(fleet_of(vec![chip(0)]));
    h.bus.fail_write(0, 0x10);
    h.bus.fail_read(0, 0x21);
    let chip = h.fleet.chip(0).unwrap();
    let mut bus = h.bus.clone();
    let mut cache = RegCache::new(&chip.config().regmap);
    let mut delay = h.delay.clone();
    let seq = RegisterSequence::new(vec![
        RegOp::write(0x10, 0x01),
        RegOp::read(0x20, 2),
        RegOp::write(0x11, 0x02),
    ])
    .unwrap();

    let outcome = execute_register_sequence(
        &mut RegisterMap::new(&mut bus, chip, &mut cache),
        Some(&seq),
        &mut delay,
        &h.diag,
        None,
    )
    .await;

    assert_eq!(outcome.errors, 2);
    assert_eq!(
        outcome.last_error,
        Some(Error::Transport(TransportError::new(BUS_FAILURE)))
    );
    assert_eq!(h.bus_events().len(), 4);
    assert_eq!(
        h.diag.transfers(),
        vec![
            (0, Direction::Write, BUS_FAILURE),
            (0, Direction::Read, BUS_FAILURE),
        ]
    );
}

#[futures_test::test]
async fn reads_append_to_report() {
    let h = Harness::new(fleet_of(vec![chip(0)]));
    h.bus.set_reg(0, 0x20, 0x0a);
    h.bus.set_reg(0, 0x21, 0x0b);
    h.bus.fail_read(0, 0x22);
    let chip = h.fleet.chip(0).unwrap();
    let mut bus = h.bus.clone();
    let mut cache = RegCache::new(&chip.config().regmap);
    let mut delay = h.delay.clone();
    let seq = RegisterSequence::new(vec![RegOp::read(0x20, 3)]).unwrap();
    let mut report = Report::new();

    execute_register_sequence(
        &mut RegisterMap::new(&mut bus, chip, &mut cache),
        Some(&seq),
        &mut delay,
        &NoDiagnostics,
        Some(&mut report),
    )
    .await;

    assert_eq!(report.as_str(), "reg[0x20]=0xa,reg[0x21]=0xb,");
}

#[futures_test::test]
async fn trailing_delay_yields() {
    let h = Harness::new(fleet_of(vec![chip(0)]));
    let chip = h.fleet.chip(0).unwrap();
    let mut bus = h.bus.clone();
    let mut cache = RegCache::new(&chip.config().regmap);
    let mut delay = h.delay.clone();
    let seq = RegisterSequence::new(vec![
        RegOp::delay(2),
        RegOp::write(0x01, 0x01),
        RegOp::delay(0),
        RegOp::delay(20),
    ])
    .unwrap();

    execute_register_sequence(
        &mut RegisterMap::new(&mut bus, chip, &mut cache),
        Some(&seq),
        &mut delay,
        &NoDiagnostics,
        None,
    )
    .await;

    assert_eq!(
        h.delay.calls(),
        vec![
            DelayCall::Blocking(2),
            DelayCall::Blocking(0),
            DelayCall::Yielding(20),
        ]
    );
}

// ---------------------------------------------------------------------------
// Reset sequences
// ---------------------------------------------------------------------------

#[futures_test::test]
async fn reset_steps_use_busy_wait_until_last() {
    let log = common::Log::default();
    let mut pins = MockPins::new(log.clone());
    let mut delay = MockDelay::default();
    let reset = ResetDescriptor {
        pin: PinId(7),
        sequence: ResetSequence::new(vec![
            ResetStep { level: PinState::High, delay_ms: 5 },
            ResetStep { level: PinState::Low, delay_ms: 10 },
            ResetStep { level: PinState::High, delay_ms: 0 },
        ])
        .unwrap(),
    };

    execute_reset_sequence(&mut pins, &reset, &mut delay).await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            Event::Set { pin: PinId(7), level: PinState::High },
            Event::Set { pin: PinId(7), level: PinState::Low },
            Event::Set { pin: PinId(7), level: PinState::High },
        ]
    );
    assert_eq!(
        delay.calls(),
        vec![
            DelayCall::Blocking(5),
            DelayCall::Blocking(10),
            DelayCall::Yielding(0),
        ]
    );
}

#[test]
fn reset_cells_compile_to_steps() {
    let seq = ResetSequence::from_cells(&[1, 5, 0, 10, 1, 0]).unwrap();
    assert_eq!(
        seq.steps(),
        &[
            ResetStep { level: PinState::High, delay_ms: 5 },
            ResetStep { level: PinState::Low, delay_ms: 10 },
            ResetStep { level: PinState::High, delay_ms: 0 },
        ]
    );
}
