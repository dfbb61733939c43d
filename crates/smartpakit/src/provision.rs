//! Bring-up and teardown of the fleet's chips.

use alloc::vec::Vec;
use core::fmt::Write;

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::chip::Chip;
use crate::delay::SequenceDelay;
use crate::diag::Diagnostics;
use crate::error::{Error, ResourceError};
use crate::fleet::Fleet;
use crate::pins::{IrqId, PinControl, PinId, TriggerFlags};
use crate::registry::{ChipInfo, FleetRegistry};
use crate::sequence::execute_register_sequence;
use crate::transport::RegisterBus;
use crate::NAME_MAX;

/// Interrupt line the platform must route to [`Fleet::on_interrupt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IrqBinding {
    pub chip_index: u8,
    pub irq: IrqId,
    pub trigger: TriggerFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProvisionFailure {
    pub chip_index: u8,
    pub error: Error,
}

/// Result of [`Fleet::provision`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Indices of chips that became ready in this call.
    pub ready: Vec<u8>,
    pub failures: Vec<ProvisionFailure>,
    pub irq_bindings: Vec<IrqBinding>,
    pub switch_failures: Vec<ResourceError>,
}

impl ProvisionReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.switch_failures.is_empty()
    }
}

type Label = heapless::String<NAME_MAX>;

fn pin_label(model: &str, kind: &str, id: u8) -> Label {
    let mut label = Label::new();
    // Overlong labels are truncated.
    let _ = write!(label, "{}_{}_{}", model, kind, id);
    label
}

impl<M, B, P, D, G> Fleet<M, B, P, D, G>
where
    M: RawMutex,
    B: RegisterBus,
    P: PinControl,
    D: SequenceDelay + Clone,
    G: Diagnostics,
{
    /// Bring every not-yet-ready chip up, in index order.
    ///
    /// A chip that fails stays in the fleet, not ready, and is skipped by
    /// every fleet operation. Calling this again retries only those chips.
    pub async fn provision<R: FleetRegistry>(&self, registry: &mut R) -> ProvisionReport {
        let mut report = ProvisionReport::default();
        self.request_switches(&mut report).await;

        for chip in self.chips.iter().filter(|c| !c.is_ready()) {
            match self.provision_chip(chip).await {
                Ok(binding) => {
                    registry.register(ChipInfo {
                        index: chip.index(),
                        id: chip.id(),
                        vendor: chip.vendor(),
                    });
                    chip.set_ready(true);
                    info!("pa[{}] {} ready", chip.id(), chip.model());
                    report.ready.push(chip.index());
                    report.irq_bindings.extend(binding);
                }
                Err(e) => {
                    error!("pa[{}] provisioning failed: {:?}", chip.id(), e);
                    report.failures.push(ProvisionFailure { chip_index: chip.index(), error: e });
                }
            }
        }
        report
    }

    async fn request_switches(&self, report: &mut ProvisionReport) {
        let mut pins = self.pins.lock().await;
        for (n, switch) in self.switches.iter().enumerate() {
            let mut label = Label::new();
            let _ = write!(label, "switch_ctl_{}", n);
            if let Err(e) = pins.request(switch.pin, &label) {
                error!("switch[{}] request failed: {:?}", n, e);
                report.switch_failures.push(e);
            }
        }
    }

    async fn provision_chip(&self, chip: &Chip) -> Result<Option<IrqBinding>, Error> {
        if self.is_vendor_unsupported(chip.vendor()) {
            info!("pa[{}] vendor {} unsupported, skip", chip.id(), chip.vendor());
            return Err(Error::InvalidArgument("vendor failed version check"));
        }

        let mut claimed = Vec::new();
        let result = self.bring_up(chip, &mut claimed).await;
        if result.is_err() {
            let mut pins = self.pins.lock().await;
            for pin in claimed {
                pins.release(pin);
            }
        }
        result
    }

    async fn bring_up(&self, chip: &Chip, claimed: &mut Vec<PinId>) -> Result<Option<IrqBinding>, Error> {
        if let Some(reset) = chip.reset() {
            self.claim(reset.pin, &pin_label(chip.model(), "gpio_reset", chip.id()), claimed)
                .await?;
            let _reset = self.reset_lock.lock().await;
            self.reset_chip(chip, reset).await?;
        }

        let binding = match chip.interrupt() {
            Some(irq) => {
                self.claim(irq.pin, &pin_label(chip.model(), "gpio_irq", chip.id()), claimed)
                    .await?;
                let id = self.pins.lock().await.pins.map_to_interrupt(irq.pin)?;
                debug!("pa[{}] irq line {} -> {}", chip.id(), irq.pin.0, id.0);
                Some(IrqBinding { chip_index: chip.index(), irq: id, trigger: irq.trigger })
            }
            None => None,
        };

        if let Some(version) = chip.config().version_check.as_ref() {
            let mut io = self.io.lock().await;
            let mut delay = self.delay.clone();
            let outcome =
                execute_register_sequence(&mut io.map(chip), Some(version), &mut delay, &self.diag, None)
                    .await;
            if let Some(e) = outcome.last_error {
                warn!("pa[{}] version check failed, vendor {} skipped from now on", chip.id(), chip.vendor());
                self.mark_vendor_unsupported(chip.vendor());
                return Err(e);
            }
        }

        Ok(binding)
    }

    /// Request `pin` for this chip, remembering it for rollback.
    async fn claim(&self, pin: PinId, label: &str, claimed: &mut Vec<PinId>) -> Result<(), Error> {
        let mut pins = self.pins.lock().await;
        if pins.is_owned(pin) {
            return Ok(());
        }
        pins.request(pin, label)?;
        claimed.push(pin);
        Ok(())
    }

    /// Deregister ready chips, release every requested line and hand the
    /// collaborators back.
    pub fn release<R: FleetRegistry>(self, registry: &mut R) -> (B, P) {
        for chip in self.chips.iter().filter(|c| c.is_ready()) {
            registry.deregister(ChipInfo { index: chip.index(), id: chip.id(), vendor: chip.vendor() });
            chip.set_ready(false);
        }
        let mut bank = self.pins.into_inner();
        bank.release_all();
        info!("fleet released");
        (self.io.into_inner().bus, bank.pins)
    }
}
