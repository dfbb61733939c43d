//! Interrupt-driven recovery.
//!
//! [`Fleet::on_interrupt`] runs in interrupt context: it only checks the
//! debounce gate and ready flag, marks the chip pending and wakes the worker.
//! The worker ([`Fleet::run`] or [`Fleet::process_pending`]) performs the
//! recovery itself with the recovery and write locks held throughout.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::MutexGuard;
use embassy_time::Instant;
use portable_atomic::Ordering;

use crate::chip::{Chip, InterruptDescriptor};
use crate::delay::SequenceDelay;
use crate::diag::{self, Diagnostics, Report};
use crate::fleet::{Fleet, FleetIo};
use crate::pins::PinControl;
use crate::sequence::{execute_register_sequence, RegisterSequence};
use crate::transport::RegisterBus;

/// What [`Fleet::on_interrupt`] did with a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterruptDisposition {
    /// A recovery was queued for the chip.
    Scheduled,
    /// Dropped: the chip was reset inside its debounce window.
    Debounced,
    /// Dropped: the chip is not provisioned.
    NotReady,
    /// Dropped: a recovery for the chip is already pending or running.
    Coalesced,
    /// Dropped: no such chip, or the chip has no interrupt line.
    Unhandled,
}

/// Both locks recovery holds for its whole run.
struct RecoveryGuard<'a, M: RawMutex, B> {
    _recovery: MutexGuard<'a, M, ()>,
    io: MutexGuard<'a, M, FleetIo<B>>,
}

impl<M, B, P, D, G> Fleet<M, B, P, D, G>
where
    M: RawMutex,
    B: RegisterBus,
    P: PinControl,
    D: SequenceDelay + Clone,
    G: Diagnostics,
{
    /// Handle an interrupt of the chip at `index`.
    ///
    /// Never blocks and never touches the bus.
    pub fn on_interrupt(&self, index: usize) -> InterruptDisposition {
        let Some(chip) = self.chips.get(index) else {
            return InterruptDisposition::Unhandled;
        };
        if chip.interrupt().is_none() {
            return InterruptDisposition::Unhandled;
        }
        if chip.debounce.has_deadline() && chip.debounce.is_armed(Instant::now()) {
            info!("pa[{}], debounce wait, skip this irq", chip.id());
            return InterruptDisposition::Debounced;
        }
        if !chip.is_ready() {
            error!("pa[{}], not provisioned, skip this irq", chip.id());
            return InterruptDisposition::NotReady;
        }
        if chip.recovery_pending.swap(true, Ordering::AcqRel) {
            info!("pa[{}], recovery busy, skip this irq", chip.id());
            return InterruptDisposition::Coalesced;
        }
        self.recovery_wake.signal(());
        InterruptDisposition::Scheduled
    }

    /// Run one recovery for every chip with a pending trigger.
    ///
    /// Returns the number of recoveries executed.
    pub async fn process_pending(&self) -> usize {
        let mut handled = 0;
        for chip in self.chips.iter() {
            if !chip.recovery_pending.load(Ordering::Acquire) {
                continue;
            }
            if let Some(irq) = chip.interrupt() {
                self.recover(chip, irq).await;
                handled += 1;
            }
            // Cleared last so triggers during the run coalesce into it.
            chip.recovery_pending.store(false, Ordering::Release);
        }
        handled
    }

    /// Recovery worker loop.
    pub async fn run(&self) -> ! {
        loop {
            self.recovery_wake.wait().await;
            self.process_pending().await;
        }
    }

    async fn lock_for_recovery(&self) -> RecoveryGuard<'_, M, B> {
        let recovery = self.recovery_lock.lock().await;
        let io = self.io.lock().await;
        RecoveryGuard { _recovery: recovery, io }
    }

    async fn recover(&self, trigger: &Chip, irq: &InterruptDescriptor) {
        info!("pa[{}], irq recovery start", trigger.id());
        let mut guard = self.lock_for_recovery().await;

        let report = match irq.rw_sequence.as_ref() {
            Some(sequence) => Some(self.rw_pass(&mut guard.io, sequence).await),
            None => {
                debug!("pa[{}], no rw sequence, skip", trigger.id());
                None
            }
        };

        if irq.need_reset {
            let dumped = self.dump_locked(&mut guard.io).await;
            if !dumped.is_ok() {
                warn!("dump before reset failed {} times", dumped.errors);
            }
            if let Err(e) = self.reset_all().await {
                error!("recovery reset failed: {:?}", e);
            }
            match self.resume_locked(&mut guard.io).await {
                Ok(outcome) if !outcome.is_ok() => {
                    warn!("resume after reset failed {} times", outcome.errors)
                }
                Ok(_) => {}
                Err(e) => error!("resume after reset rejected: {:?}", e),
            }
        }

        if let Some(report) = report.filter(|r| !r.is_empty()) {
            diag::forward_report(&self.diag, &report);
        }
        info!("pa[{}], irq recovery done", trigger.id());
    }

    /// Run `sequence` against every ready chip, collecting reads into a
    /// report. Stops at the first chip that reports a failure.
    async fn rw_pass(&self, io: &mut FleetIo<B>, sequence: &RegisterSequence) -> Report {
        let mut report = Report::new();
        let mut delay = self.delay.clone();
        for chip in self.chips.iter().filter(|c| c.is_ready()) {
            report.push_chip(chip.id());
            let outcome = execute_register_sequence(
                &mut io.map(chip),
                Some(sequence),
                &mut delay,
                &self.diag,
                Some(&mut report),
            )
            .await;
            if let Some(e) = outcome.last_error {
                error!("pa[{}], rw sequence failed: {:?}, abort pass", chip.id(), e);
                break;
            }
        }
        report
    }
}
