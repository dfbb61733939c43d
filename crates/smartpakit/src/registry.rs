/// Identity of a provisioned chip as seen by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipInfo {
    pub index: u8,
    pub id: u8,
    pub vendor: u8,
}

/// Side-channel through which a higher-level coordinator tracks the live
/// fleet. Not used by the sequence engine itself.
pub trait FleetRegistry {
    fn register(&mut self, chip: ChipInfo);
    fn deregister(&mut self, chip: ChipInfo);
}

/// Registry that tracks nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRegistry;

impl FleetRegistry for NoRegistry {
    fn register(&mut self, _chip: ChipInfo) {}
    fn deregister(&mut self, _chip: ChipInfo) {}
}
