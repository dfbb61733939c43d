use core::fmt::Write;

use heapless::String;

use crate::error::Error;
use crate::REPORT_CAPACITY;

/// Direction of a failed register transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Read,
    Write,
}

/// Telemetry sink for transfer errors and recovery reports.
///
/// Both calls are fire-and-forget: the sink has no way to fail back into the
/// engine.
pub trait Diagnostics {
    /// A single register transfer on chip `chip_id` failed with `error_code`.
    fn report(&self, chip_id: u8, direction: Direction, error_code: i32);

    /// An aggregated recovery report.
    fn report_text(&self, summary: &str);
}

impl<T: Diagnostics + ?Sized> Diagnostics for &T {
    fn report(&self, chip_id: u8, direction: Direction, error_code: i32) {
        (**self).report(chip_id, direction, error_code)
    }

    fn report_text(&self, summary: &str) {
        (**self).report_text(summary)
    }
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiagnostics;

impl Diagnostics for NoDiagnostics {
    fn report(&self, _chip_id: u8, _direction: Direction, _error_code: i32) {}

    fn report_text(&self, _summary: &str) {}
}

/// Human-readable register report built up across chips.
///
/// Bounded to [`REPORT_CAPACITY`] bytes; anything past that is dropped.
#[derive(Debug, Clone, Default)]
pub struct Report {
    text: String<REPORT_CAPACITY>,
}

impl Report {
    pub fn new() -> Self {
        Self { text: String::new() }
    }

    pub fn as_str(&self) -> &str {
        self.text.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Start the section of chip `chip_id`.
    pub fn push_chip(&mut self, chip_id: u8) {
        let _ = write!(self.text, "pa[{}]:", chip_id);
    }

    /// Record a successful register read.
    pub fn push_read(&mut self, address: u32, value: u32) {
        let _ = write!(self.text, "reg[0x{:x}]=0x{:x},", address, value);
    }
}

/// Forward a failed transfer to the sink.
pub(crate) fn transfer_failed<G: Diagnostics>(
    diag: &G,
    chip_id: u8,
    direction: Direction,
    error: &Error,
) {
    warn!(
        "pa[{}] {:?} transfer failed: {:?}",
        chip_id, direction, error
    );
    diag.report(chip_id, direction, error.code());
}

/// Forward an aggregated recovery report to the sink.
pub(crate) fn forward_report<G: Diagnostics>(diag: &G, report: &Report) {
    let mut summary: String<{ REPORT_CAPACITY + 16 }> = String::new();
    let _ = write!(summary, "smartpakit,{}", report.as_str());
    info!("dsm report, {}", summary.as_str());
    diag.report_text(summary.as_str());
}
