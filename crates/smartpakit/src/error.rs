use core::fmt;

use crate::pins::PinId;

/// Errno-style codes handed to the diagnostics bridge.
pub(crate) const EINVAL: i32 = -22;
pub(crate) const EFAULT: i32 = -14;
pub(crate) const EBUSY: i32 = -16;

/// Failure reported by the bus transport, carrying its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransportError {
    pub code: i32,
}

impl TransportError {
    pub const fn new(code: i32) -> Self {
        Self { code }
    }
}

/// Failure to request, map or drive a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResourceError {
    pub pin: PinId,
    pub code: i32,
}

impl ResourceError {
    pub const fn new(pin: PinId, code: i32) -> Self {
        Self { pin, code }
    }
}

/// Malformed or inconsistent configuration data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A descriptor required by the operation is not configured.
    MissingDescriptor,
    /// A sequence was built from zero operations.
    EmptySequence,
    /// A flat property array is not a whole number of `stride`-sized records.
    MalformedCells { len: usize, stride: usize },
    /// Register control type outside read/write/delay.
    UnknownOpKind(u32),
    /// A bulk request resolved to zero target chips.
    NoTargets,
    /// Flat entry count is not a multiple of the target chip count.
    Indivisible { entries: usize, chips: usize },
    /// A bulk request names a chip index the fleet does not have.
    TargetOutOfRange(u8),
    /// A switch entry names a switch index the fleet does not have.
    SwitchOutOfRange(u32),
    DuplicateChipId(u8),
    ChipIdOutOfRange(u8),
    VendorOutOfRange(u8),
    TooManyChips(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingDescriptor => {
                write!(f, "required descriptor not configured")
            }
            ConfigError::EmptySequence => write!(f, "sequence has no entries"),
            ConfigError::MalformedCells { len, stride } => {
                write!(f, "{} cells is not a multiple of {}", len, stride)
            }
            ConfigError::UnknownOpKind(kind) => {
                write!(f, "unknown register control type {}", kind)
            }
            ConfigError::NoTargets => write!(f, "request targets no chip"),
            ConfigError::Indivisible { entries, chips } => {
                write!(f, "{} entries cannot be split across {} chips", entries, chips)
            }
            ConfigError::TargetOutOfRange(index) => {
                write!(f, "target chip index {} out of range", index)
            }
            ConfigError::SwitchOutOfRange(index) => {
                write!(f, "switch index {} out of range", index)
            }
            ConfigError::DuplicateChipId(id) => {
                write!(f, "chip id {} configured twice", id)
            }
            ConfigError::ChipIdOutOfRange(id) => {
                write!(f, "chip id {} out of range", id)
            }
            ConfigError::VendorOutOfRange(vendor) => {
                write!(f, "chip vendor {} out of range", vendor)
            }
            ConfigError::TooManyChips(count) => {
                write!(f, "{} chips exceed the fleet capacity", count)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Malformed input, out-of-range index or an access the register policy
    /// forbids.
    InvalidArgument(&'static str),
    Transport(TransportError),
    Configuration(ConfigError),
    Resource(ResourceError),
    /// The register cache is in cache-only mode and cannot serve the access.
    Busy,
}

impl Error {
    /// Negative errno-style code used when reporting this error.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) | Error::Configuration(_) => EINVAL,
            Error::Transport(e) => e.code,
            Error::Resource(_) => EFAULT,
            Error::Busy => EBUSY,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(what) => write!(f, "invalid argument: {}", what),
            Error::Transport(e) => write!(f, "bus transfer failed ({})", e.code),
            Error::Configuration(e) => write!(f, "configuration error: {}", e),
            Error::Resource(e) => {
                write!(f, "pin {} unavailable ({})", e.pin.0, e.code)
            }
            Error::Busy => write!(f, "register cache is cache-only"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Configuration(e)
    }
}

impl From<ResourceError> for Error {
    fn from(e: ResourceError) -> Self {
        Error::Resource(e)
    }
}
