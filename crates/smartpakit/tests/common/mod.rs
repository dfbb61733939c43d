#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embedded_hal::digital::PinState;
use smartpakit::{
    ChipConfig, ChipHandle, ChipInfo, Diagnostics, Direction, Fleet, FleetConfig,
    FleetRegistry, IrqId, PinControl, PinId, RegisterBus, ResetDescriptor,
    ResetSequence, ResetStep, ResourceError, TransportError,
};

// ---------------------------------------------------------------------------
// Shared event log
// ---------------------------------------------------------------------------

/// Bus and pin activity in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Write { chip: u8, address: u32, value: u32 },
    Read { chip: u8, address: u32 },
    Masked { chip: u8, address: u32, mask: u32, value: u32 },
    Set { pin: PinId, level: PinState },
    Request { pin: PinId, name: String },
    Release { pin: PinId },
}

impl Event {
    pub fn is_bus(&self) -> bool {
        matches!(
            self,
            Event::Write { .. } | Event::Read { .. } | Event::Masked { .. }
        )
    }
}

pub type Log = Arc<Mutex<Vec<Event>>>;

// ---------------------------------------------------------------------------
// Mock bus
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct BusState {
    pub regs: HashMap<(u8, u32), u32>,
    pub fail_reads: HashSet<(u8, u32)>,
    pub fail_writes: HashSet<(u8, u32)>,
    /// Yield to the executor after every transfer.
    pub yield_on_io: bool,
}

#[derive(Clone)]
pub struct MockBus {
    pub log: Log,
    pub state: Arc<Mutex<BusState>>,
}

pub const BUS_FAILURE: i32 = -5;

impl MockBus {
    pub fn new(log: Log) -> Self {
        Self { log, state: Arc::new(Mutex::new(BusState::default())) }
    }

    pub fn set_reg(&self, chip: u8, address: u32, value: u32) {
        self.state.lock().unwrap().regs.insert((chip, address), value);
    }

    pub fn reg(&self, chip: u8, address: u32) -> Option<u32> {
        self.state.lock().unwrap().regs.get(&(chip, address)).copied()
    }

    pub fn fail_read(&self, chip: u8, address: u32) {
        self.state.lock().unwrap().fail_reads.insert((chip, address));
    }

    pub fn fail_write(&self, chip: u8, address: u32) {
        self.state.lock().unwrap().fail_writes.insert((chip, address));
    }

    pub fn yield_on_io(&self) {
        self.state.lock().unwrap().yield_on_io = true;
    }

    async fn settle(&self) {
        let should_yield = self.state.lock().unwrap().yield_on_io;
        if should_yield {
            embassy_futures::yield_now().await;
        }
    }
}

impl RegisterBus for MockBus {
    async fn write(
        &mut self,
        chip: &ChipHandle,
        address: u32,
        value: u32,
    ) -> Result<(), TransportError> {
        self.log.lock().unwrap().push(Event::Write { chip: chip.id, address, value });
        let result = {
            let mut state = self.state.lock().unwrap();
            if state.fail_writes.contains(&(chip.id, address)) {
                Err(TransportError::new(BUS_FAILURE))
            } else {
                state.regs.insert((chip.id, address), value);
                Ok(())
            }
        };
        self.settle().await;
        result
    }

    async fn read(
        &mut self,
        chip: &ChipHandle,
        address: u32,
    ) -> Result<u32, TransportError> {
        self.log.lock().unwrap().push(Event::Read { chip: chip.id, address });
        let result = {
            let state = self.state.lock().unwrap();
            if state.fail_reads.contains(&(chip.id, address)) {
                Err(TransportError::new(BUS_FAILURE))
            } else {
                Ok(state.regs.get(&(chip.id, address)).copied().unwrap_or(0))
            }
        };
        self.settle().await;
        result
    }

    async fn masked_update(
        &mut self,
        chip: &ChipHandle,
        address: u32,
        mask: u32,
        value: u32,
    ) -> Result<(), TransportError> {
        self.log
            .lock()
            .unwrap()
            .push(Event::Masked { chip: chip.id, address, mask, value });
        let result = {
            let mut state = self.state.lock().unwrap();
            if state.fail_writes.contains(&(chip.id, address)) {
                Err(TransportError::new(BUS_FAILURE))
            } else {
                let reg = state.regs.entry((chip.id, address)).or_insert(0);
                *reg = (*reg & !mask) | (value & mask);
                Ok(())
            }
        };
        self.settle().await;
        result
    }
}

// ---------------------------------------------------------------------------
// Mock pins
// ---------------------------------------------------------------------------

pub const PIN_FAILURE: i32 = -16;
pub const IRQ_BASE: u32 = 100;

#[derive(Clone)]
pub struct MockPins {
    pub log: Log,
    pub fail_requests: Arc<Mutex<HashSet<PinId>>>,
    pub fail_mapping: Arc<Mutex<HashSet<PinId>>>,
    pub fail_sets: Arc<Mutex<HashSet<PinId>>>,
}

impl MockPins {
    pub fn new(log: Log) -> Self {
        Self {
            log,
            fail_requests: Arc::new(Mutex::new(HashSet::new())),
            fail_mapping: Arc::new(Mutex::new(HashSet::new())),
            fail_sets: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn fail_request(&self, pin: PinId) {
        self.fail_requests.lock().unwrap().insert(pin);
    }

    pub fn fail_mapping(&self, pin: PinId) {
        self.fail_mapping.lock().unwrap().insert(pin);
    }

    pub fn fail_set(&self, pin: PinId) {
        self.fail_sets.lock().unwrap().insert(pin);
    }
}

impl PinControl for MockPins {
    fn set_level(&mut self, pin: PinId, level: PinState) -> Result<(), ResourceError> {
        if self.fail_sets.lock().unwrap().contains(&pin) {
            return Err(ResourceError::new(pin, PIN_FAILURE));
        }
        self.log.lock().unwrap().push(Event::Set { pin, level });
        Ok(())
    }

    fn request(&mut self, pin: PinId, name: &str) -> Result<(), ResourceError> {
        if self.fail_requests.lock().unwrap().contains(&pin) {
            return Err(ResourceError::new(pin, PIN_FAILURE));
        }
        self.log
            .lock()
            .unwrap()
            .push(Event::Request { pin, name: name.to_string() });
        Ok(())
    }

    fn release(&mut self, pin: PinId) {
        self.log.lock().unwrap().push(Event::Release { pin });
    }

    fn map_to_interrupt(&mut self, pin: PinId) -> Result<IrqId, ResourceError> {
        if self.fail_mapping.lock().unwrap().contains(&pin) {
            return Err(ResourceError::new(pin, PIN_FAILURE));
        }
        Ok(IrqId(IRQ_BASE + pin.0))
    }
}

// ---------------------------------------------------------------------------
// Mock delay
// ---------------------------------------------------------------------------

/// Which delay path was taken, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayCall {
    Blocking(u32),
    Yielding(u32),
}

#[derive(Clone, Default)]
pub struct MockDelay {
    pub calls: Arc<Mutex<Vec<DelayCall>>>,
}

impl MockDelay {
    pub fn calls(&self) -> Vec<DelayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl embedded_hal::delay::DelayNs for MockDelay {
    fn delay_ns(&mut self, _ns: u32) {}

    fn delay_ms(&mut self, ms: u32) {
        self.calls.lock().unwrap().push(DelayCall::Blocking(ms));
    }
}

impl embedded_hal_async::delay::DelayNs for MockDelay {
    async fn delay_ns(&mut self, _ns: u32) {}

    async fn delay_ms(&mut self, ms: u32) {
        self.calls.lock().unwrap().push(DelayCall::Yielding(ms));
    }
}

// ---------------------------------------------------------------------------
// Mock diagnostics and registry
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MockDiag {
    pub transfers: Arc<Mutex<Vec<(u8, Direction, i32)>>>,
    pub texts: Arc<Mutex<Vec<String>>>,
}

impl MockDiag {
    pub fn transfers(&self) -> Vec<(u8, Direction, i32)> {
        self.transfers.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

impl Diagnostics for MockDiag {
    fn report(&self, chip_id: u8, direction: Direction, error_code: i32) {
        self.transfers.lock().unwrap().push((chip_id, direction, error_code));
    }

    fn report_text(&self, summary: &str) {
        self.texts.lock().unwrap().push(summary.to_string());
    }
}

#[derive(Default)]
pub struct MockRegistry {
    pub registered: Vec<ChipInfo>,
    pub deregistered: Vec<ChipInfo>,
}

impl FleetRegistry for MockRegistry {
    fn register(&mut self, chip: ChipInfo) {
        self.registered.push(chip);
    }

    fn deregister(&mut self, chip: ChipInfo) {
        self.deregistered.push(chip);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub type TestFleet = Fleet<NoopRawMutex, MockBus, MockPins, MockDelay, MockDiag>;

pub struct Harness {
    pub fleet: TestFleet,
    pub log: Log,
    pub bus: MockBus,
    pub pins: MockPins,
    pub delay: MockDelay,
    pub diag: MockDiag,
}

impl Harness {
    pub fn new(config: FleetConfig) -> Self {
        let log = Log::default();
        let bus = MockBus::new(log.clone());
        let pins = MockPins::new(log.clone());
        let delay = MockDelay::default();
        let diag = MockDiag::default();
        let fleet = Fleet::new(config, bus.clone(), pins.clone(), delay.clone(), diag.clone())
            .unwrap();
        Self { fleet, log, bus, pins, delay, diag }
    }

    /// Build and provision, asserting every chip came up.
    pub async fn ready(config: FleetConfig) -> Self {
        let harness = Self::new(config);
        let report = harness.fleet.provision(&mut MockRegistry::default()).await;
        assert!(report.is_complete(), "{:?}", report);
        harness.clear();
        harness
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.lock().unwrap().clone()
    }

    pub fn bus_events(&self) -> Vec<Event> {
        self.events().into_iter().filter(Event::is_bus).collect()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
        self.delay.clear();
    }
}

/// An 8-bit chip with no reset or interrupt line and default-permit policy.
pub fn chip(id: u8) -> ChipConfig {
    ChipConfig {
        vendor: 1,
        id,
        model: "tfa9874".to_string(),
        bus_address: 0x34 + u16::from(id),
        regmap: smartpakit::RegmapConfig {
            reg_bits: 8,
            max_register: 0xff,
            ..Default::default()
        },
        reset: None,
        interrupt: None,
        version_check: None,
        dump: None,
        reset_debounce_ms: 0,
    }
}

pub fn fleet_of(chips: Vec<ChipConfig>) -> FleetConfig {
    FleetConfig { chips, ..Default::default() }
}

/// `high, low(delay), high` reset pulse on `pin`.
pub fn reset_pulse(pin: u32, width_ms: u32) -> ResetDescriptor {
    ResetDescriptor {
        pin: PinId(pin),
        sequence: ResetSequence::new(vec![
            ResetStep { level: PinState::Low, delay_ms: width_ms },
            ResetStep { level: PinState::High, delay_ms: 1 },
        ])
        .unwrap(),
    }
}
