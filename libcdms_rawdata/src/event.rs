use std::collections::BTreeMap;

use super::admin::AdminRecord;
use super::gps::GpsRecord;
use super::history::HistoryRecord;
use super::pulse::PulseRecord;
use super::trigger::TriggerRecord;

/// Category/type value of an event whose header has not been read
pub const UNSET_EVENT_FIELD: u32 = 0xffff;

/// Pulses of each detector, keyed by detector number. Every list is sorted by code
pub type ZipPulseMap = BTreeMap<u32, Vec<PulseRecord>>;

/// Insert a pulse keeping the list sorted by channel code.
///
/// Pulses usually arrive in order, so the insertion point is searched from the tail. A
/// pulse is placed before any existing pulse with an equal code.
pub fn insert_sorted(list: &mut Vec<PulseRecord>, pulse: PulseRecord) {
    let mut idx = list.len();
    while idx > 0 && list[idx - 1].code() >= pulse.code() {
        idx -= 1;
    }
    list.insert(idx, pulse);
}

/// Everything decoded for the current event.
///
/// The record objects are allocated once and reset in place between events.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub admin: AdminRecord,
    pub history: HistoryRecord,
    pub trigger: TriggerRecord,
    pub gps: GpsRecord,
    zip_pulses: ZipPulseMap,
    veto_pulses: Vec<PulseRecord>,
    noise_monitor_pulses: Vec<PulseRecord>,
    other_pulses: Vec<PulseRecord>,
    category: u32,
    event_type: u32,
    zip_pulses_remapped: bool,
}

impl RawEvent {
    pub fn new(n_towers: usize) -> Self {
        Self {
            admin: AdminRecord::new(),
            history: HistoryRecord::new(n_towers),
            trigger: TriggerRecord::new(n_towers),
            gps: GpsRecord::new(),
            zip_pulses: ZipPulseMap::new(),
            veto_pulses: Vec::new(),
            noise_monitor_pulses: Vec::new(),
            other_pulses: Vec::new(),
            category: UNSET_EVENT_FIELD,
            event_type: UNSET_EVENT_FIELD,
            zip_pulses_remapped: false,
        }
    }

    /// Reset every per-event object
    pub fn clear(&mut self) {
        self.admin.reset();
        self.history.reset();
        self.trigger.reset();
        self.gps.reset();
        self.zip_pulses.clear();
        self.veto_pulses.clear();
        self.noise_monitor_pulses.clear();
        self.other_pulses.clear();
        self.category = UNSET_EVENT_FIELD;
        self.event_type = UNSET_EVENT_FIELD;
        self.zip_pulses_remapped = false;
    }

    /// File a pulse by its class
    pub fn store_pulse(&mut self, pulse: PulseRecord) {
        if pulse.is_zip() {
            let list = self.zip_pulses.entry(pulse.detector_num()).or_default();
            insert_sorted(list, pulse);
        } else if pulse.is_veto() {
            insert_sorted(&mut self.veto_pulses, pulse);
        } else if pulse.is_noise_monitor() {
            self.noise_monitor_pulses.push(pulse);
        } else {
            self.other_pulses.push(pulse);
        }
    }

    pub fn set_header(&mut self, category: u32, event_type: u32) {
        self.category = category;
        self.event_type = event_type;
    }

    pub fn category(&self) -> u32 {
        self.category
    }

    pub fn event_type(&self) -> u32 {
        self.event_type
    }

    pub fn zip_pulses(&self) -> &ZipPulseMap {
        &self.zip_pulses
    }

    /// Pulses of one detector, sorted by code
    pub fn detector_pulses(&self, det_num: u32) -> Option<&[PulseRecord]> {
        self.zip_pulses.get(&det_num).map(|list| list.as_slice())
    }

    pub fn veto_pulses(&self) -> &[PulseRecord] {
        &self.veto_pulses
    }

    pub fn noise_monitor_pulses(&self) -> &[PulseRecord] {
        &self.noise_monitor_pulses
    }

    /// Pulses from detector types with no channel table
    pub fn other_pulses(&self) -> &[PulseRecord] {
        &self.other_pulses
    }

    pub fn n_zip_pulses(&self) -> usize {
        self.zip_pulses.values().map(|list| list.len()).sum()
    }

    pub fn is_zip_pulses_remapped(&self) -> bool {
        self.zip_pulses_remapped
    }

    pub(crate) fn zip_pulses_mut(&mut self) -> &mut ZipPulseMap {
        &mut self.zip_pulses
    }

    pub(crate) fn mark_zip_pulses_remapped(&mut self) {
        self.zip_pulses_remapped = true;
    }
}
