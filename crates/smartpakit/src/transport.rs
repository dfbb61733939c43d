use crate::chip::ValueWidth;
use crate::error::TransportError;

/// What the transport needs to address one chip on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipHandle {
    pub id: u8,
    pub bus_address: u16,
    /// Width of a register address on the wire.
    pub reg_bits: u8,
    pub value_width: ValueWidth,
}

/// Register transactions over the shared control bus.
///
/// Implemented by the platform on top of its I2C (or other) peripheral. The
/// fleet holds the transport behind its write lock, so implementations get
/// exclusive `&mut` access for every call.
#[allow(async_fn_in_trait)]
pub trait RegisterBus {
    async fn write(
        &mut self,
        chip: &ChipHandle,
        address: u32,
        value: u32,
    ) -> Result<(), TransportError>;

    async fn read(
        &mut self,
        chip: &ChipHandle,
        address: u32,
    ) -> Result<u32, TransportError>;

    /// Read-modify-write of the bits selected by `mask`.
    async fn masked_update(
        &mut self,
        chip: &ChipHandle,
        address: u32,
        mask: u32,
        value: u32,
    ) -> Result<(), TransportError>;
}
