use alloc::vec::Vec;

use crate::error::{ConfigError, Error};

/// One entry of a bulk write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParamNode {
    /// Register address, or switch table index when `is_switch` is set.
    pub index: u32,
    pub value: u32,
    pub mask: u32,
    pub delay_ms: u32,
    pub is_switch: bool,
}

impl ParamNode {
    /// Cells per entry: `(index, value, mask, delay_ms, is_switch)`.
    pub const CELLS: usize = 5;

    pub const fn write(address: u32, value: u32, mask: u32) -> Self {
        Self { index: address, value, mask, delay_ms: 0, is_switch: false }
    }

    pub const fn switch(index: u32, level: u32) -> Self {
        Self { index, value: level, mask: 0, delay_ms: 0, is_switch: true }
    }

    pub const fn with_delay(mut self, delay_ms: u32) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn from_cells(cells: [u32; 5]) -> Self {
        let [index, value, mask, delay_ms, reserved] = cells;
        Self { index, value, mask, delay_ms, is_switch: reserved > 0 }
    }
}

/// Chips a bulk request applies to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Targets {
    /// Every chip of the fleet in index order.
    #[default]
    All,
    /// The listed chip indices in the listed order. An empty list means all.
    Explicit(Vec<u8>),
}

/// Bulk write spread over several chips.
///
/// The flat `params` list is split into one equal, contiguous chunk per
/// target chip.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PaCtlRequest {
    pub targets: Targets,
    pub params: Vec<ParamNode>,
}

impl PaCtlRequest {
    pub fn new(targets: Targets, params: Vec<ParamNode>) -> Self {
        Self { targets, params }
    }

    /// Compile a flat `(index, value, mask, delay_ms, is_switch)` array.
    pub fn from_cells(targets: Targets, cells: &[u32]) -> Result<Self, ConfigError> {
        if cells.len() % ParamNode::CELLS != 0 {
            return Err(ConfigError::MalformedCells {
                len: cells.len(),
                stride: ParamNode::CELLS,
            });
        }
        let params = cells
            .chunks_exact(ParamNode::CELLS)
            .map(|c| ParamNode::from_cells([c[0], c[1], c[2], c[3], c[4]]))
            .collect();
        Ok(Self { targets, params })
    }

    /// Validate the request against a fleet of `chip_count` chips and
    /// `switch_count` switch lines and split it into per-chip chunks.
    ///
    /// Nothing is touched when this fails.
    pub fn partition(
        &self,
        chip_count: usize,
        switch_count: usize,
    ) -> Result<Partition<'_>, Error> {
        let targets: Vec<u8> = match &self.targets {
            Targets::Explicit(list) if !list.is_empty() => list.clone(),
            _ => (0..chip_count).map(|i| i as u8).collect(),
        };
        if targets.is_empty() {
            return Err(ConfigError::NoTargets.into());
        }
        if targets.len() > chip_count {
            return Err(Error::InvalidArgument("more targets than chips"));
        }
        if let Some(&index) = targets.iter().find(|&&i| usize::from(i) >= chip_count) {
            return Err(ConfigError::TargetOutOfRange(index).into());
        }
        if self.params.len() % targets.len() != 0 {
            return Err(ConfigError::Indivisible {
                entries: self.params.len(),
                chips: targets.len(),
            }
            .into());
        }
        let stride = self.params.len() / targets.len();
        if stride == 0 {
            return Err(ConfigError::EmptySequence.into());
        }
        check_switches(&self.params, switch_count)?;

        Ok(Partition { targets, stride, params: &self.params })
    }
}

pub(crate) fn check_switches(
    params: &[ParamNode],
    switch_count: usize,
) -> Result<(), ConfigError> {
    match params
        .iter()
        .find(|p| p.is_switch && p.index as usize >= switch_count)
    {
        Some(p) => Err(ConfigError::SwitchOutOfRange(p.index)),
        None => Ok(()),
    }
}

/// A validated bulk request: one chunk of `stride` entries per target.
#[derive(Debug)]
pub struct Partition<'a> {
    targets: Vec<u8>,
    stride: usize,
    params: &'a [ParamNode],
}

impl<'a> Partition<'a> {
    pub fn targets(&self) -> &[u8] {
        &self.targets
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// `(chip_index, entries)` pairs in request order.
    pub fn chunks(&self) -> impl Iterator<Item = (u8, &'a [ParamNode])> + '_ {
        self.targets
            .iter()
            .copied()
            .zip(self.params.chunks_exact(self.stride))
    }
}
