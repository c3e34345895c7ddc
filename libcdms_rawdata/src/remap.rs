use std::collections::BTreeMap;

use super::detector_config::{ChannelParameters, DetectorConfigData};
use super::error::RemapError;
use super::event::{insert_sorted, ZipPulseMap};
use super::pulse::PulseRecord;

/// Code value meaning "drop this channel"
pub const DELETED_CODE: u32 = 0;

/// A compiled channel rewrite: old code to new code, plus parameter overrides keyed by the
/// new code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemapTable {
    pub codes: BTreeMap<u32, u32>,
    pub overrides: BTreeMap<u32, ChannelParameters>,
    /// Exchange adjacent samples of every rewritten pulse. Only applied to native streams
    pub swap_sample_pairs: bool,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty() && self.overrides.is_empty()
    }

    /// The new code of `code`, None if the table does not touch it
    pub fn target(&self, code: u32) -> Option<u32> {
        self.codes.get(&code).copied()
    }

    /// Fold another table into this one. Entries of `other` win on conflict
    pub fn merge(&mut self, other: RemapTable) {
        self.codes.extend(other.codes);
        for (code, params) in other.overrides {
            self.overrides.entry(code).or_default().extend(params);
        }
        self.swap_sample_pairs |= other.swap_sample_pairs;
    }
}

/// Rewrite the configuration map once.
///
/// Channels listed in the table are rekeyed (or erased for a zero target), then overrides
/// are written into the surviving channels. Does nothing when no configuration was read.
pub fn remap_detector_config(
    config: &mut DetectorConfigData,
    table: &RemapTable,
) -> Result<(), RemapError> {
    if !config.is_filled() {
        return Ok(());
    }
    if config.is_modified() {
        return Err(RemapError::AlreadyModified);
    }

    let mut untouched = BTreeMap::new();
    let mut moved = BTreeMap::new();
    for (code, params) in config.channels() {
        match table.target(*code) {
            Some(DELETED_CODE) => (),
            Some(new_code) => {
                moved.insert(new_code, params.clone());
            }
            None => {
                untouched.insert(*code, params.clone());
            }
        }
    }
    untouched.extend(moved);

    for (code, overrides) in table.overrides.iter() {
        match untouched.get_mut(code) {
            Some(params) => params.extend(overrides.iter().map(|(k, v)| (k.clone(), *v))),
            None => spdlog::debug!("No configuration for channel {} to override", code),
        }
    }

    config.replace_modified(untouched);
    spdlog::warn!(
        "Detector configuration was remapped, {} channels remain",
        config.len()
    );
    Ok(())
}

/// Rewrite the pulse map of one event.
///
/// Every list stays sorted by code. Pulses whose detector number changed are moved to the
/// list of their new detector, which is created if needed. Empty lists are erased.
/// `swap_samples` enables the table's sample pair exchange.
pub fn remap_zip_pulses(
    pulses: &mut ZipPulseMap,
    table: &RemapTable,
    swap_samples: bool,
) -> Result<(), RemapError> {
    let swap = swap_samples && table.swap_sample_pairs;
    let mut relocated: Vec<PulseRecord> = Vec::new();

    for (det_num, list) in pulses.iter_mut() {
        let mut rewritten = Vec::with_capacity(list.len());
        for pulse in list.drain(..) {
            let pulse = match table.target(pulse.code()) {
                Some(DELETED_CODE) => continue,
                Some(new_code) => {
                    let remapped = pulse.with_remapped_code(new_code)?;
                    if swap {
                        remapped.with_swapped_sample_pairs()
                    } else {
                        remapped
                    }
                }
                None => pulse,
            };
            if pulse.detector_num() == *det_num {
                insert_sorted(&mut rewritten, pulse);
            } else {
                relocated.push(pulse);
            }
        }
        *list = rewritten;
    }

    for pulse in relocated {
        let list = pulses.entry(pulse.detector_num()).or_default();
        insert_sorted(list, pulse);
    }

    pulses.retain(|_, list| !list.is_empty());
    Ok(())
}
