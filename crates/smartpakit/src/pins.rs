use bitflags::bitflags;
use embedded_hal::digital::PinState;

use crate::error::ResourceError;

/// Platform-wide identifier of a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinId(pub u32);

/// Interrupt source a line has been mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IrqId(pub u32);

bitflags! {
    /// Edge/level conditions an interrupt line fires on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TriggerFlags: u32 {
        const RISING  = 0b0000_0001;
        const FALLING = 0b0000_0010;
        const HIGH    = 0b0000_0100;
        const LOW     = 0b0000_1000;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TriggerFlags {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "TriggerFlags({=u32:#x})", self.bits())
    }
}

/// Raw digital line control provided by the platform.
///
/// Lines are addressed by [`PinId`]; ownership is claimed with
/// [`request`](Self::request) before the fleet drives a line and handed back
/// with [`release`](Self::release) on teardown.
pub trait PinControl {
    /// Drive `pin` to `level`.
    fn set_level(
        &mut self,
        pin: PinId,
        level: PinState,
    ) -> Result<(), ResourceError>;

    /// Claim exclusive ownership of `pin` under the label `name`.
    fn request(&mut self, pin: PinId, name: &str) -> Result<(), ResourceError>;

    /// Give up ownership of a previously requested `pin`.
    fn release(&mut self, pin: PinId);

    /// Configure `pin` as an input and return the interrupt it raises.
    fn map_to_interrupt(&mut self, pin: PinId) -> Result<IrqId, ResourceError>;
}
