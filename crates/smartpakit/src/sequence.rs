//! Register and reset sequences and their single-chip executors.

use alloc::vec::Vec;

use embedded_hal::digital::PinState;

use crate::chip::ResetDescriptor;
use crate::delay::{sequenced_delay, SequenceDelay};
use crate::diag::{self, Diagnostics, Direction, Report};
use crate::error::{ConfigError, Error};
use crate::pins::PinControl;
use crate::regmap::RegisterMap;
use crate::transport::RegisterBus;

/// Register control type codes of the flat cell encoding.
const CTL_TYPE_READ: u32 = 0;
const CTL_TYPE_WRITE: u32 = 1;
const CTL_TYPE_DELAY: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpKind {
    Write,
    /// Read `count` consecutive registers starting at the op's address.
    Read { count: u32 },
    /// Pause for `ms` milliseconds; issues no bus transfer.
    Delay { ms: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegOp {
    pub address: u32,
    pub value: u32,
    pub kind: OpKind,
}

impl RegOp {
    /// Cells per op in the flat encoding: `(address, value, ctl_type)`.
    pub const CELLS: usize = 3;

    pub const fn write(address: u32, value: u32) -> Self {
        Self { address, value, kind: OpKind::Write }
    }

    pub const fn read(address: u32, count: u32) -> Self {
        Self { address, value: count, kind: OpKind::Read { count } }
    }

    pub const fn delay(ms: u32) -> Self {
        Self { address: 0, value: ms, kind: OpKind::Delay { ms } }
    }

    /// Decode one `(address, value, ctl_type)` record.
    ///
    /// For reads `value` is the repeat count, for delays the milliseconds.
    pub fn from_cells(cells: [u32; 3]) -> Result<Self, ConfigError> {
        let [address, value, ctl_type] = cells;
        let kind = match ctl_type {
            CTL_TYPE_READ => OpKind::Read { count: value },
            CTL_TYPE_WRITE => OpKind::Write,
            CTL_TYPE_DELAY => OpKind::Delay { ms: value },
            other => return Err(ConfigError::UnknownOpKind(other)),
        };
        Ok(Self { address, value, kind })
    }
}

/// Non-empty, immutable list of register operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSequence {
    ops: Vec<RegOp>,
}

impl RegisterSequence {
    pub fn new(ops: Vec<RegOp>) -> Result<Self, ConfigError> {
        if ops.is_empty() {
            return Err(ConfigError::EmptySequence);
        }
        Ok(Self { ops })
    }

    /// Compile a flat `(address, value, ctl_type)` property array.
    pub fn from_cells(cells: &[u32]) -> Result<Self, ConfigError> {
        if cells.len() % RegOp::CELLS != 0 {
            return Err(ConfigError::MalformedCells {
                len: cells.len(),
                stride: RegOp::CELLS,
            });
        }
        let ops = cells
            .chunks_exact(RegOp::CELLS)
            .map(|c| RegOp::from_cells([c[0], c[1], c[2]]))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(ops)
    }

    pub fn ops(&self) -> &[RegOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetStep {
    pub level: PinState,
    pub delay_ms: u32,
}

/// Non-empty list of level/delay steps for one reset line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetSequence {
    steps: Vec<ResetStep>,
}

impl ResetSequence {
    pub fn new(steps: Vec<ResetStep>) -> Result<Self, ConfigError> {
        if steps.is_empty() {
            return Err(ConfigError::EmptySequence);
        }
        Ok(Self { steps })
    }

    /// Compile a flat `(level, delay_ms)` property array.
    pub fn from_cells(cells: &[u32]) -> Result<Self, ConfigError> {
        if cells.len() % 2 != 0 {
            return Err(ConfigError::MalformedCells { len: cells.len(), stride: 2 });
        }
        let steps = cells
            .chunks_exact(2)
            .map(|c| ResetStep {
                level: PinState::from(c[0] != 0),
                delay_ms: c[1],
            })
            .collect();
        Self::new(steps)
    }

    pub fn steps(&self) -> &[ResetStep] {
        &self.steps
    }
}

/// Error accounting of a sequence run.
///
/// Failures never abort a sequence; every failed op bumps `errors` and
/// replaces `last_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SequenceOutcome {
    pub errors: u32,
    pub last_error: Option<Error>,
}

impl SequenceOutcome {
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }

    pub(crate) fn record(&mut self, error: Error) {
        self.errors += 1;
        self.last_error = Some(error);
    }

    pub(crate) fn merge(&mut self, other: SequenceOutcome) {
        self.errors += other.errors;
        if other.last_error.is_some() {
            self.last_error = other.last_error;
        }
    }
}

/// Run `sequence` against the chip behind `map`.
///
/// A missing sequence is a no-op. Every failed transfer is reported to `diag`
/// and counted, and the remaining ops still run. When `report` is given each
/// successful read is appended to it.
pub async fn execute_register_sequence<B, D, G>(
    map: &mut RegisterMap<'_, B>,
    sequence: Option<&RegisterSequence>,
    delay: &mut D,
    diag: &G,
    mut report: Option<&mut Report>,
) -> SequenceOutcome
where
    B: RegisterBus,
    D: SequenceDelay,
    G: Diagnostics,
{
    let mut outcome = SequenceOutcome::default();
    let Some(sequence) = sequence else {
        return outcome;
    };
    let chip_id = map.chip().id();
    let last = sequence.len() - 1;

    for (i, op) in sequence.ops().iter().enumerate() {
        match op.kind {
            OpKind::Write => {
                match map.write(op.address, op.value).await {
                    Ok(()) => debug!(
                        "pa[{}], w reg[{:#x}] = {:#x}",
                        chip_id, op.address, op.value
                    ),
                    Err(e) => {
                        diag::transfer_failed(diag, chip_id, Direction::Write, &e);
                        outcome.record(e);
                    }
                }
            }
            OpKind::Read { count } => {
                for address in (0..count).map(|n| op.address.wrapping_add(n)) {
                    match map.read(address).await {
                        Ok(value) => {
                            debug!(
                                "pa[{}], r reg[{:#x}] = {:#x}",
                                chip_id, address, value
                            );
                            if let Some(report) = report.as_deref_mut() {
                                report.push_read(address, value);
                            }
                        }
                        Err(e) => {
                            diag::transfer_failed(diag, chip_id, Direction::Read, &e);
                            outcome.record(e);
                        }
                    }
                }
            }
            OpKind::Delay { ms } => sequenced_delay(delay, i == last, ms).await,
        }
    }

    outcome
}

/// Drive the reset line of `reset` through its level/delay steps.
///
/// Stops at the first line that cannot be driven.
pub async fn execute_reset_sequence<P, D>(
    pins: &mut P,
    reset: &ResetDescriptor,
    delay: &mut D,
) -> Result<(), Error>
where
    P: PinControl,
    D: SequenceDelay,
{
    let steps = reset.sequence.steps();
    let last = steps.len() - 1;
    for (i, step) in steps.iter().enumerate() {
        debug!(
            "hw_reset{}={},{}",
            reset.pin.0,
            step.level == PinState::High,
            step.delay_ms
        );
        pins.set_level(reset.pin, step.level)?;
        sequenced_delay(delay, i == last, step.delay_ms).await;
    }
    Ok(())
}
