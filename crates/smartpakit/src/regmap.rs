//! Policy-gated register access with an optional value cache.
//!
//! Every register transfer the engine issues goes through a [`RegisterMap`],
//! which checks the chip's [`AccessPolicy`] and `max_register` before the
//! transport is touched, and keeps non-volatile registers cached so they can
//! be restored after a power transition.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use crate::chip::{Chip, ValueWidth};
use crate::error::Error;
use crate::policy::{AccessPolicy, Category};
use crate::transport::RegisterBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CacheType {
    #[default]
    None,
    RbTree,
    Compressed,
    Flat,
}

/// Power-on value of a register, used to seed the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegDefault {
    pub address: u32,
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegmapConfig {
    pub reg_bits: u8,
    pub value_width: ValueWidth,
    pub max_register: u32,
    pub cache: CacheType,
    pub defaults: Vec<RegDefault>,
    pub access: AccessPolicy,
}

/// Cached register values of one chip.
#[derive(Debug, Default)]
pub struct RegCache {
    enabled: bool,
    cache_only: bool,
    values: BTreeMap<u32, u32>,
    dirty: BTreeSet<u32>,
}

impl RegCache {
    pub fn new(config: &RegmapConfig) -> Self {
        let enabled = config.cache != CacheType::None;
        let values = if enabled {
            config.defaults.iter().map(|d| (d.address, d.value)).collect()
        } else {
            BTreeMap::new()
        };
        Self { enabled, cache_only: false, values, dirty: BTreeSet::new() }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_cache_only(&self) -> bool {
        self.cache_only
    }

    pub fn cached(&self, address: u32) -> Option<u32> {
        self.values.get(&address).copied()
    }

    /// Stop forwarding accesses to the bus until [`RegisterMap::sync`].
    pub fn set_cache_only(&mut self, cache_only: bool) {
        self.cache_only = cache_only && self.enabled;
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }
}

/// Register access to one chip through the shared transport.
pub struct RegisterMap<'a, B> {
    bus: &'a mut B,
    chip: &'a Chip,
    cache: &'a mut RegCache,
}

impl<'a, B: RegisterBus> RegisterMap<'a, B> {
    pub fn new(bus: &'a mut B, chip: &'a Chip, cache: &'a mut RegCache) -> Self {
        Self { bus, chip, cache }
    }

    pub fn chip(&self) -> &Chip {
        self.chip
    }

    fn check(&self, address: u32, category: Category) -> Result<(), Error> {
        if address > self.chip.config().regmap.max_register {
            return Err(Error::InvalidArgument("register beyond max_register"));
        }
        if !self.chip.is_permitted(address, category) {
            return Err(Error::InvalidArgument(match category {
                Category::Readable => "register not readable",
                _ => "register not writeable",
            }));
        }
        Ok(())
    }

    fn cacheable(&self, address: u32) -> bool {
        self.cache.enabled && !self.chip.is_permitted(address, Category::Volatile)
    }

    pub async fn read(&mut self, address: u32) -> Result<u32, Error> {
        self.check(address, Category::Readable)?;
        let cacheable = self.cacheable(address);
        if cacheable {
            if let Some(value) = self.cache.cached(address) {
                return Ok(value);
            }
        }
        if self.cache.cache_only {
            return Err(Error::Busy);
        }

        let value = self.bus.read(&self.chip.handle(), address).await?;
        if cacheable {
            self.cache.values.insert(address, value);
        }
        Ok(value)
    }

    pub async fn write(&mut self, address: u32, value: u32) -> Result<(), Error> {
        self.check(address, Category::Writeable)?;
        let cacheable = self.cacheable(address);
        if self.cache.cache_only {
            if !cacheable {
                return Err(Error::Busy);
            }
            self.cache.values.insert(address, value);
            self.cache.dirty.insert(address);
            return Ok(());
        }

        self.bus.write(&self.chip.handle(), address, value).await?;
        if cacheable {
            self.cache.values.insert(address, value);
        }
        Ok(())
    }

    /// Update the bits of `address` selected by `mask` to those of `value`.
    pub async fn update_bits(
        &mut self,
        address: u32,
        mask: u32,
        value: u32,
    ) -> Result<(), Error> {
        self.check(address, Category::Writeable)?;
        let cacheable = self.cacheable(address);
        if self.cache.cache_only {
            let Some(old) = self.cache.cached(address).filter(|_| cacheable)
            else {
                return Err(Error::Busy);
            };
            self.cache.values.insert(address, (old & !mask) | (value & mask));
            self.cache.dirty.insert(address);
            return Ok(());
        }

        self.bus
            .masked_update(&self.chip.handle(), address, mask, value)
            .await?;
        if cacheable {
            if let Some(old) = self.cache.values.get_mut(&address) {
                *old = (*old & !mask) | (value & mask);
            }
        }
        Ok(())
    }

    /// Write every register changed in cache-only mode back to the bus.
    ///
    /// Registers that fail stay dirty. Returns the last failure, if any.
    pub async fn sync(&mut self) -> Result<(), Error> {
        let pending: Vec<u32> = self.cache.dirty.iter().copied().collect();
        let mut result = Ok(());
        for address in pending {
            let Some(value) = self.cache.cached(address) else {
                self.cache.dirty.remove(&address);
                continue;
            };
            match self.bus.write(&self.chip.handle(), address, value).await {
                Ok(()) => {
                    self.cache.dirty.remove(&address);
                }
                Err(e) => result = Err(Error::from(e)),
            }
        }
        result
    }
}
