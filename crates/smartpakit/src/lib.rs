#![no_std]
//! Register control sequence engine for a fleet of smart power amplifiers.
//!
//! The crate drives declarative register sequences (writes, read bursts and
//! timed delays), multi-chip reset choreography and interrupt-driven recovery
//! across every amplifier sharing a control bus. Hardware access goes through
//! three collaborator traits the platform implements: [`RegisterBus`] for
//! register transactions, [`PinControl`] for digital lines and
//! [`Diagnostics`] for error telemetry.
//!
//! A typical integration builds a [`Fleet`] from a [`FleetConfig`], calls
//! [`Fleet::provision`] once, wires every [`IrqBinding`] of the returned
//! report to [`Fleet::on_interrupt`] and spawns a task running
//! [`Fleet::run`].
extern crate alloc;

// This must go first so the logging macros are visible to every module.
mod fmt;

mod chip;
mod debounce;
mod delay;
mod diag;
mod error;
mod fleet;
mod pins;
mod policy;
mod provision;
mod recovery;
mod regmap;
mod registry;
mod request;
mod sequence;
mod transport;

pub use chip::{
    Chip, ChipConfig, FleetConfig, InterruptDescriptor, ResetDescriptor,
    SwitchConfig, ValueWidth,
};
pub use debounce::DebounceGate;
pub use delay::{sequenced_delay, SequenceDelay};
pub use diag::{Diagnostics, Direction, NoDiagnostics, Report};
pub use error::{ConfigError, Error, ResourceError, TransportError};
pub use fleet::Fleet;
pub use pins::{IrqId, PinControl, PinId, TriggerFlags};
pub use policy::{AccessPolicy, Category, Policy};
pub use provision::{IrqBinding, ProvisionFailure, ProvisionReport};
pub use recovery::InterruptDisposition;
pub use regmap::{CacheType, RegCache, RegDefault, RegisterMap, RegmapConfig};
pub use registry::{ChipInfo, FleetRegistry, NoRegistry};
pub use request::{PaCtlRequest, ParamNode, Partition, Targets};
pub use sequence::{
    execute_register_sequence, execute_reset_sequence, OpKind, RegOp,
    RegisterSequence, ResetSequence, ResetStep, SequenceOutcome,
};
pub use transport::{ChipHandle, RegisterBus};

/// Upper bound on amplifiers in one fleet; chip ids live in `0..PA_ID_MAX`.
pub const PA_ID_MAX: usize = 8;

/// Upper bound (exclusive) on chip vendor ids.
pub const CHIP_VENDOR_MAX: u8 = 16;

/// Capacity in bytes of an aggregated diagnostic report.
pub const REPORT_CAPACITY: usize = 1024;

/// Capacity in bytes of pin labels handed to [`PinControl::request`].
pub const NAME_MAX: usize = 32;
