use alloc::string::String;
use alloc::vec::Vec;

use embassy_time::Duration;
use portable_atomic::{AtomicBool, Ordering};

use crate::debounce::DebounceGate;
use crate::pins::{PinId, TriggerFlags};
use crate::policy::Category;
use crate::regmap::RegmapConfig;
use crate::request::PaCtlRequest;
use crate::sequence::{RegisterSequence, ResetSequence};
use crate::transport::ChipHandle;

/// Register value width; selects the mask that marks a plain write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValueWidth {
    #[default]
    Bits8,
    Bits16,
    Bits24,
    Bits32,
}

impl ValueWidth {
    /// Any width other than 16, 24 or 32 is treated as 8 bits.
    pub fn from_bits(bits: u32) -> Self {
        match bits {
            16 => ValueWidth::Bits16,
            24 => ValueWidth::Bits24,
            32 => ValueWidth::Bits32,
            _ => ValueWidth::Bits8,
        }
    }

    pub const fn bits(self) -> u32 {
        match self {
            ValueWidth::Bits8 => 8,
            ValueWidth::Bits16 => 16,
            ValueWidth::Bits24 => 24,
            ValueWidth::Bits32 => 32,
        }
    }

    pub const fn mask(self) -> u32 {
        match self {
            ValueWidth::Bits8 => 0xff,
            ValueWidth::Bits16 => 0xffff,
            ValueWidth::Bits24 => 0xff_ffff,
            ValueWidth::Bits32 => 0xffff_ffff,
        }
    }
}

/// Dedicated reset line and the level/delay steps that reset the chip.
#[derive(Debug, Clone, PartialEq)]
pub struct ResetDescriptor {
    pub pin: PinId,
    pub sequence: ResetSequence,
}

/// Interrupt line of a chip and what recovery does when it fires.
#[derive(Debug, Clone, PartialEq)]
pub struct InterruptDescriptor {
    pub pin: PinId,
    pub trigger: TriggerFlags,
    /// Dump, reset and resume the whole fleet after the rw pass.
    pub need_reset: bool,
    /// Run against every chip of the fleet when the interrupt fires.
    pub rw_sequence: Option<RegisterSequence>,
}

/// Everything the configuration loader knows about one amplifier.
#[derive(Debug, Clone)]
pub struct ChipConfig {
    pub vendor: u8,
    /// Unique within the fleet, below [`PA_ID_MAX`](crate::PA_ID_MAX).
    pub id: u8,
    pub model: String,
    pub bus_address: u16,
    pub regmap: RegmapConfig,
    pub reset: Option<ResetDescriptor>,
    pub interrupt: Option<InterruptDescriptor>,
    /// Read at provisioning; any failure marks the vendor unsupported.
    pub version_check: Option<RegisterSequence>,
    pub dump: Option<RegisterSequence>,
    /// Interrupts are ignored for this long after every reset.
    pub reset_debounce_ms: u32,
}

/// Auxiliary line outside any register map, driven by switch entries of a
/// bulk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchConfig {
    pub pin: PinId,
}

/// Topology handed over by the configuration loader.
#[derive(Debug, Clone, Default)]
pub struct FleetConfig {
    pub chips: Vec<ChipConfig>,
    pub switches: Vec<SwitchConfig>,
    /// Replayed after a power-resume transition and after recovery resets.
    pub resume: Option<PaCtlRequest>,
}

/// One amplifier owned by the fleet.
pub struct Chip {
    index: u8,
    config: ChipConfig,
    ready: AtomicBool,
    pub(crate) debounce: DebounceGate,
    pub(crate) recovery_pending: AtomicBool,
}

impl Chip {
    pub(crate) fn new(index: u8, config: ChipConfig) -> Self {
        Self {
            index,
            config,
            ready: AtomicBool::new(false),
            debounce: DebounceGate::new(),
            recovery_pending: AtomicBool::new(false),
        }
    }

    /// Position in the fleet; stable for the fleet's lifetime.
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn id(&self) -> u8 {
        self.config.id
    }

    pub fn vendor(&self) -> u8 {
        self.config.vendor
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn config(&self) -> &ChipConfig {
        &self.config
    }

    pub fn value_mask(&self) -> u32 {
        self.config.regmap.value_width.mask()
    }

    pub fn handle(&self) -> ChipHandle {
        ChipHandle {
            id: self.config.id,
            bus_address: self.config.bus_address,
            reg_bits: self.config.regmap.reg_bits,
            value_width: self.config.regmap.value_width,
        }
    }

    pub fn reset(&self) -> Option<&ResetDescriptor> {
        self.config.reset.as_ref()
    }

    pub fn interrupt(&self) -> Option<&InterruptDescriptor> {
        self.config.interrupt.as_ref()
    }

    /// Whether the access policy lets `address` be used as `category`.
    pub fn is_permitted(&self, address: u32, category: Category) -> bool {
        self.config.regmap.access.is_permitted(address, category)
    }

    /// Set only once provisioning completed successfully.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    pub(crate) fn debounce_window(&self) -> Duration {
        Duration::from_millis(u64::from(self.config.reset_debounce_ms))
    }

    pub fn debounce(&self) -> &DebounceGate {
        &self.debounce
    }
}
