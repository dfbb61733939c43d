//! Fleet coordinator: owns the chips and serializes fleet-wide operations.

use alloc::vec::Vec;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::Instant;
use embedded_hal::digital::PinState;
use portable_atomic::{AtomicU32, Ordering};

use crate::chip::{Chip, FleetConfig, ResetDescriptor, SwitchConfig};
use crate::delay::{sequenced_delay, SequenceDelay};
use crate::diag::{self, Diagnostics, Direction};
use crate::error::{ConfigError, Error, ResourceError};
use crate::pins::{PinControl, PinId};
use crate::regmap::{RegCache, RegisterMap};
use crate::request::{self, PaCtlRequest, ParamNode, Partition};
use crate::sequence::{execute_register_sequence, execute_reset_sequence, SequenceOutcome};
use crate::transport::RegisterBus;
use crate::{CHIP_VENDOR_MAX, PA_ID_MAX};

/// Everything guarded by the write lock: the bus and the per-chip caches.
pub(crate) struct FleetIo<B> {
    pub(crate) bus: B,
    pub(crate) caches: Vec<RegCache>,
}

impl<B: RegisterBus> FleetIo<B> {
    pub(crate) fn map<'a>(&'a mut self, chip: &'a Chip) -> RegisterMap<'a, B> {
        RegisterMap::new(&mut self.bus, chip, &mut self.caches[usize::from(chip.index())])
    }
}

fn vendor_bit(vendor: u8) -> Option<u32> {
    (vendor < CHIP_VENDOR_MAX).then(|| 1 << vendor)
}

/// Pin controller plus the lines this fleet has requested from it.
pub(crate) struct PinBank<P> {
    pub(crate) pins: P,
    owned: Vec<PinId>,
}

impl<P: PinControl> PinBank<P> {
    fn new(pins: P) -> Self {
        Self { pins, owned: Vec::new() }
    }

    pub(crate) fn is_owned(&self, pin: PinId) -> bool {
        self.owned.contains(&pin)
    }

    /// Request `pin` unless this fleet already owns it.
    pub(crate) fn request(&mut self, pin: PinId, name: &str) -> Result<(), ResourceError> {
        if self.is_owned(pin) {
            return Ok(());
        }
        self.pins.request(pin, name)?;
        self.owned.push(pin);
        Ok(())
    }

    pub(crate) fn release(&mut self, pin: PinId) {
        if let Some(pos) = self.owned.iter().position(|&p| p == pin) {
            self.owned.swap_remove(pos);
            self.pins.release(pin);
        }
    }

    pub(crate) fn release_all(&mut self) {
        for pin in self.owned.drain(..) {
            self.pins.release(pin);
        }
    }
}

/// A fleet of amplifiers sharing one control bus.
///
/// Three named locks serialize fleet-wide work:
/// - the write lock (`io`) owns the bus and register caches, so holding it is
///   the only way to issue a register transfer;
/// - the reset lock guards [`Fleet::reset_all`];
/// - the recovery lock serializes interrupt recovery.
///
/// Locks are always taken in the order recovery, write, reset, pins.
pub struct Fleet<M: RawMutex, B, P, D, G> {
    pub(crate) chips: heapless::Vec<Chip, PA_ID_MAX>,
    pub(crate) switches: Vec<SwitchConfig>,
    pub(crate) resume: Option<PaCtlRequest>,
    pub(crate) io: Mutex<M, FleetIo<B>>,
    pub(crate) pins: Mutex<M, PinBank<P>>,
    pub(crate) reset_lock: Mutex<M, ()>,
    pub(crate) recovery_lock: Mutex<M, ()>,
    pub(crate) recovery_wake: Signal<M, ()>,
    /// Bit `n` set: vendor `n` failed its version check.
    pub(crate) unsupported_vendors: AtomicU32,
    pub(crate) delay: D,
    pub(crate) diag: G,
}

impl<M, B, P, D, G> Fleet<M, B, P, D, G>
where
    M: RawMutex,
    B: RegisterBus,
    P: PinControl,
    D: SequenceDelay + Clone,
    G: Diagnostics,
{
    /// Validate `config` and build every chip in the not-ready state.
    pub fn new(config: FleetConfig, bus: B, pins: P, delay: D, diag: G) -> Result<Self, Error> {
        let FleetConfig { chips: chip_configs, switches, resume } = config;
        if chip_configs.len() > PA_ID_MAX {
            return Err(ConfigError::TooManyChips(chip_configs.len()).into());
        }

        let mut chips: heapless::Vec<Chip, PA_ID_MAX> = heapless::Vec::new();
        let mut caches = Vec::with_capacity(chip_configs.len());
        let mut seen_ids = 0u32;
        for (index, chip_config) in chip_configs.into_iter().enumerate() {
            if usize::from(chip_config.id) >= PA_ID_MAX {
                return Err(ConfigError::ChipIdOutOfRange(chip_config.id).into());
            }
            if seen_ids & (1 << chip_config.id) != 0 {
                return Err(ConfigError::DuplicateChipId(chip_config.id).into());
            }
            if chip_config.vendor >= CHIP_VENDOR_MAX {
                return Err(ConfigError::VendorOutOfRange(chip_config.vendor).into());
            }
            seen_ids |= 1 << chip_config.id;
            caches.push(RegCache::new(&chip_config.regmap));
            let chip = Chip::new(index as u8, chip_config);
            if chips.push(chip).is_err() {
                return Err(ConfigError::TooManyChips(index + 1).into());
            }
        }

        if let Some(resume) = &resume {
            resume.partition(chips.len(), switches.len())?;
        }

        info!("fleet built, pa_num={}, switch_num={}", chips.len(), switches.len());

        Ok(Self {
            chips,
            switches,
            resume,
            io: Mutex::new(FleetIo { bus, caches }),
            pins: Mutex::new(PinBank::new(pins)),
            reset_lock: Mutex::new(()),
            recovery_lock: Mutex::new(()),
            recovery_wake: Signal::new(),
            unsupported_vendors: AtomicU32::new(0),
            delay,
            diag,
        })
    }

    pub fn chip_count(&self) -> usize {
        self.chips.len()
    }

    pub fn chip(&self, index: usize) -> Option<&Chip> {
        self.chips.get(index)
    }

    pub fn chips(&self) -> impl Iterator<Item = &Chip> {
        self.chips.iter()
    }

    pub fn switch_count(&self) -> usize {
        self.switches.len()
    }

    /// Whether an earlier version check failed for `vendor`.
    ///
    /// Vendors outside `0..CHIP_VENDOR_MAX` are never flagged.
    pub fn is_vendor_unsupported(&self, vendor: u8) -> bool {
        vendor_bit(vendor)
            .is_some_and(|bit| self.unsupported_vendors.load(Ordering::Acquire) & bit != 0)
    }

    pub(crate) fn mark_vendor_unsupported(&self, vendor: u8) {
        if let Some(bit) = vendor_bit(vendor) {
            self.unsupported_vendors.fetch_or(bit, Ordering::AcqRel);
        }
    }

    fn ready_chip(&self, index: usize) -> Result<&Chip, Error> {
        let chip = self
            .chips
            .get(index)
            .ok_or(Error::InvalidArgument("chip index out of range"))?;
        if !chip.is_ready() {
            return Err(Error::InvalidArgument("chip not provisioned"));
        }
        Ok(chip)
    }

    /// Reset every ready chip that owns a reset line, in index order.
    ///
    /// All chips are attempted; each failure goes to diagnostics and the
    /// first one is returned.
    pub async fn reset_all(&self) -> Result<(), Error> {
        let _reset = self.reset_lock.lock().await;
        let mut first_error = None;
        for chip in self.chips.iter().filter(|c| c.is_ready()) {
            let Some(reset) = chip.reset() else {
                continue;
            };
            if let Err(e) = self.reset_chip(chip, reset).await {
                error!("pa[{}], reset failed: {:?}", chip.id(), e);
                diag::transfer_failed(&self.diag, chip.id(), Direction::Write, &e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Arm the debounce window of `chip` and drive its reset line.
    ///
    /// Caller holds the reset lock.
    pub(crate) async fn reset_chip(&self, chip: &Chip, reset: &ResetDescriptor) -> Result<(), Error> {
        if chip.config().reset_debounce_ms > 0 {
            chip.debounce.arm(Instant::now(), chip.debounce_window());
        }
        let mut pins = self.pins.lock().await;
        let mut delay = self.delay.clone();
        execute_reset_sequence(&mut pins.pins, reset, &mut delay).await
    }

    /// Spread `request` over its target chips.
    ///
    /// A malformed request is rejected before the write lock is taken.
    /// Transfer failures are counted across all chips.
    pub async fn bulk_write(&self, request: &PaCtlRequest) -> Result<SequenceOutcome, Error> {
        let partition = self.partition(request)?;
        let mut io = self.io.lock().await;
        Ok(self.apply_partition_locked(&mut io, &partition).await)
    }

    fn partition<'r>(&self, request: &'r PaCtlRequest) -> Result<Partition<'r>, Error> {
        request
            .partition(self.chips.len(), self.switches.len())
            .inspect_err(|e| error!("bulk write rejected: {:?}", e))
    }

    pub(crate) async fn apply_partition_locked(
        &self,
        io: &mut FleetIo<B>,
        partition: &Partition<'_>,
    ) -> SequenceOutcome {
        debug!(
            "bulk write, pa_num={}, reg_num={}",
            partition.targets().len(),
            partition.stride()
        );
        let mut outcome = SequenceOutcome::default();
        for (index, params) in partition.chunks() {
            let chip = &self.chips[usize::from(index)];
            if !chip.is_ready() {
                warn!("pa[{}] not provisioned, skip its entries", chip.id());
                let e = Error::InvalidArgument("chip not provisioned");
                diag::transfer_failed(&self.diag, chip.id(), Direction::Write, &e);
                outcome.record(e);
                continue;
            }
            outcome.merge(self.write_params_locked(io, chip, params).await);
        }
        outcome
    }

    /// Apply one chip's chunk of a bulk request.
    pub(crate) async fn write_params_locked(
        &self,
        io: &mut FleetIo<B>,
        chip: &Chip,
        params: &[ParamNode],
    ) -> SequenceOutcome {
        let mut outcome = SequenceOutcome::default();
        let mut delay = self.delay.clone();
        let last = params.len().saturating_sub(1);

        for (i, param) in params.iter().enumerate() {
            let result = if param.is_switch {
                self.drive_switch(param.index, param.value).await
            } else {
                let mut map = io.map(chip);
                if param.mask == chip.value_mask() {
                    map.write(param.index, param.value).await
                } else {
                    map.update_bits(param.index, param.mask, param.value).await
                }
            };
            if let Err(e) = result {
                diag::transfer_failed(&self.diag, chip.id(), Direction::Write, &e);
                outcome.record(e);
            }
            if param.delay_ms > 0 {
                sequenced_delay(&mut delay, i == last, param.delay_ms).await;
            }
        }
        outcome
    }

    async fn drive_switch(&self, index: u32, level: u32) -> Result<(), Error> {
        let switch = self
            .switches
            .get(index as usize)
            .ok_or(ConfigError::SwitchOutOfRange(index))?;
        debug!("switch[{}] = {}", index, level);
        let mut pins = self.pins.lock().await;
        pins.pins.set_level(switch.pin, PinState::from(level != 0))?;
        Ok(())
    }

    /// Apply `params` to the single chip at `index`.
    pub async fn write_registers(
        &self,
        index: usize,
        params: &[ParamNode],
    ) -> Result<SequenceOutcome, Error> {
        let chip = self.ready_chip(index)?;
        if params.is_empty() {
            return Err(ConfigError::EmptySequence.into());
        }
        request::check_switches(params, self.switches.len())?;
        let mut io = self.io.lock().await;
        Ok(self.write_params_locked(&mut io, chip, params).await)
    }

    pub async fn read_register(&self, index: usize, address: u32) -> Result<u32, Error> {
        let chip = self.ready_chip(index)?;
        let mut io = self.io.lock().await;
        io.map(chip).read(address).await.inspect_err(|e| {
            diag::transfer_failed(&self.diag, chip.id(), Direction::Read, e);
        })
    }

    /// Run the dump sequence of every ready chip.
    pub async fn dump_registers(&self) -> SequenceOutcome {
        let mut io = self.io.lock().await;
        self.dump_locked(&mut io).await
    }

    pub(crate) async fn dump_locked(&self, io: &mut FleetIo<B>) -> SequenceOutcome {
        let mut outcome = SequenceOutcome::default();
        let mut delay = self.delay.clone();
        for chip in self.chips.iter().filter(|c| c.is_ready()) {
            let Some(dump) = chip.config().dump.as_ref() else {
                continue;
            };
            info!("pa[{}], dump regs", chip.id());
            outcome.merge(
                execute_register_sequence(&mut io.map(chip), Some(dump), &mut delay, &self.diag, None)
                    .await,
            );
        }
        outcome
    }

    /// Replay the configured resume request.
    ///
    /// Without one this is a no-op.
    pub async fn resume(&self) -> Result<SequenceOutcome, Error> {
        let mut io = self.io.lock().await;
        self.resume_locked(&mut io).await
    }

    pub(crate) async fn resume_locked(&self, io: &mut FleetIo<B>) -> Result<SequenceOutcome, Error> {
        let Some(resume) = self.resume.as_ref() else {
            info!("no resume sequence, skip");
            return Ok(SequenceOutcome::default());
        };
        let partition = self.partition(resume)?;
        Ok(self.apply_partition_locked(io, &partition).await)
    }

    /// Stop bus traffic for cache-backed chips; writes land in their caches.
    pub async fn pm_suspend(&self) {
        let mut io = self.io.lock().await;
        for chip in self.chips.iter().filter(|c| c.is_ready()) {
            let cache = &mut io.caches[usize::from(chip.index())];
            if cache.is_enabled() {
                debug!("pa[{}], cache only", chip.id());
                cache.set_cache_only(true);
            }
        }
    }

    /// Leave cache-only mode and write back what changed while suspended.
    pub async fn pm_resume(&self) -> SequenceOutcome {
        let mut io = self.io.lock().await;
        let mut outcome = SequenceOutcome::default();
        for chip in self.chips.iter().filter(|c| c.is_ready()) {
            let cache = &mut io.caches[usize::from(chip.index())];
            if !cache.is_enabled() {
                continue;
            }
            cache.set_cache_only(false);
            if let Err(e) = io.map(chip).sync().await {
                diag::transfer_failed(&self.diag, chip.id(), Direction::Write, &e);
                outcome.record(e);
            }
        }
        outcome
    }
}
