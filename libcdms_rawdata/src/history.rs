//! The Soudan history buffer: the veto and trigger activity recorded around each event.
//!
//! Final trigger mask layout (after pair compression), per tower:
//!
//! - bits 5n..5n+4: Qhigh, Qlow, Phigh, Plow and Wisper of zip n+1 (n = 0..5)
//! - bit 32 ST_TE, bit 33 ISR, bit 34 Global, bit 35 Random
//!
//! Final veto mask layout (after word assembly):
//!
//! - bit 0 global trigger, bit 1 OR of panels 1-20, bits 2-21 panels 1-20
//! - bit 22 global trigger, bit 23 OR of all panels, bits 24-43 panels 21-40
//! - bit 44 second OR of panels 1-20
//!
//! Times are in microseconds relative to the global trigger.
use fxhash::FxHashMap;

use super::constants::{
    BITS_PER_DIB, EMPTY_VALUE_F64, SOUDAN_ZIPS_PER_TOWER, VETO_BUFFER_OVERFLOW,
};
use super::endian::WordBuffer;
use super::error::RecordError;
use super::trigger::{compress_tower_words, mask_bit, GLOBAL_BIT, ISR_BIT, RANDOM_BIT};

const RECORD: &str = "SoudanHistory";

/// Veto bit 23 of the second board, used by the noise monitor
pub const NOISE_MONITOR_BIT: usize = 55;
const NOISE_MONITOR_MASK: u64 = 1 << NOISE_MONITOR_BIT;
// Panel bits 2-21 of both boards
const VETO_PANEL_MASK: u64 = 0x003F_FFFC_003F_FFFC;

const VETO_WORD_KEEP: u64 = 0x3F_FFFF;
const VETO_HIGH_WORD_SCALE: u64 = 0x40_0000;
const VETO_SECOND_OR_SOURCE_BIT: usize = 28;
const VETO_SECOND_OR_BIT: u64 = 1 << 44;

/// Veto masks holding only the global trigger carry no panel information
const BARE_GLOBAL_VETO_MASKS: [u64; 3] = [0x1, 0x40_0001, 0x40_0000];

// Window (microseconds) used when counting zip triggers near the event
const N_TRIG_MIN_TIME: f64 = -100.0;
const N_TRIG_MAX_TIME: f64 = 1000.0;

const NEXT_TIME_MISSING: f64 = 999_999.0;

// Bit offsets of the low thresholds within a DIB
const Q_LOW_OFFSET: usize = 1;
const P_LOW_OFFSET: usize = 3;
const ZIP_BITS_MASK: u64 = 0x3FFF_FFFF;

// Slot numbering of the named fields: slot 20 is the event
const EVENT_SLOT: i64 = 20;
const VETO_FIRST_SLOT: i64 = 14;
const VETO_LAST_SLOT: i64 = 23;
const TRIGGER_FIRST_SLOT: i64 = 16;
const TRIGGER_LAST_SLOT: i64 = 25;

/// Named time windows over which trigger masks are OR'ed
pub const TRIGGER_WINDOWS: [(&str, f64, f64); 9] = [
    ("256to10", -256.0, 10.0),
    ("50to50", -50.0, 50.0),
    ("100to200", -100.0, 200.0),
    ("minus300to200", -300.0, -200.0),
    ("minus200to100", -200.0, -100.0),
    ("minus100to0", -100.0, 0.0),
    ("plus0to100", 0.0, 100.0),
    ("plus100to200", 100.0, 200.0),
    ("plus200to300", 200.0, 300.0),
];

/// One entry of the history buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedMask {
    pub time: f64,
    pub mask: u64,
}

impl TimedMask {
    pub fn new(time: f64, mask: u64) -> Self {
        Self { time, mask }
    }
}

/// Assemble the two 32-bit veto board words into one wide mask
pub fn assemble_veto_mask(words: &[u32]) -> Result<u64, RecordError> {
    if words.len() != 2 {
        return Err(RecordError::BadVetoMaskWidth(words.len()));
    }
    let mut mask = (words[0] as u64 & VETO_WORD_KEEP)
        + (words[1] as u64 & VETO_WORD_KEEP) * VETO_HIGH_WORD_SCALE;
    if (words[1] >> VETO_SECOND_OR_SOURCE_BIT) & 1 == 1 {
        mask |= VETO_SECOND_OR_BIT;
    }
    Ok(mask)
}

/// Merge history entries which are adjacent in time (within 1 tick).
///
/// A run of consecutive entries is OR'ed pairwise: entries 1+2, 3+4, ... of the run are
/// combined, and an odd trailing entry is folded into the previous pair. Isolated entries
/// pass through untouched.
pub fn compress_in_time(entries: &[TimedMask]) -> Vec<TimedMask> {
    let mut compressed: Vec<TimedMask> = Vec::with_capacity(entries.len());
    if entries.is_empty() {
        return compressed;
    }

    let mut run_lengths: Vec<i64> = Vec::with_capacity(entries.len() + 1);
    let mut consecutive: i64 = 0;
    run_lengths.push(consecutive);
    for idx in 0..entries.len() - 1 {
        if entries[idx + 1].time - entries[idx].time <= 1.0 {
            consecutive += 1;
        } else {
            consecutive = 0;
        }
        run_lengths.push(consecutive);
        let step = run_lengths[idx + 1] - run_lengths[idx];

        if consecutive != 0 {
            if consecutive % 2 != 0 {
                compressed.push(TimedMask::new(
                    entries[idx].time,
                    entries[idx].mask | entries[idx + 1].mask,
                ));
            }
        } else if step >= 0 {
            compressed.push(entries[idx]);
        } else if step % 2 == 0 {
            if let Some(last) = compressed.last_mut() {
                last.mask |= entries[idx].mask;
            }
        }
    }

    let last_idx = entries.len() - 1;
    let step = -run_lengths[last_idx];
    if step >= 0 {
        compressed.push(entries[last_idx]);
    } else if step % 2 == 0 {
        if let Some(last) = compressed.last_mut() {
            last.mask |= entries[last_idx].mask;
        }
    }
    compressed
}

/// Split a detector number (counted from 1) into a tower index (from 0) and zip number
/// (from 1)
fn locate_zip(det_num: usize) -> (Option<usize>, usize) {
    let tower = det_num.div_ceil(SOUDAN_ZIPS_PER_TOWER);
    let zip = match det_num % SOUDAN_ZIPS_PER_TOWER {
        0 => SOUDAN_ZIPS_PER_TOWER,
        z => z,
    };
    (tower.checked_sub(1), zip)
}

/// Index of the last word of a block of `n_times` rows of `n_words` words following `pos`.
/// Fails when the block or a single row does not fit inside the record
fn block_end(
    buffer: &WordBuffer,
    pos: usize,
    n_words: usize,
    n_times: usize,
) -> Result<usize, RecordError> {
    let len = buffer.len();
    let end = n_words
        .checked_mul(n_times)
        .and_then(|n| n.checked_add(pos))
        .ok_or(RecordError::ShortRecord(RECORD, usize::MAX, len))?;
    if end >= len || n_words >= len {
        return Err(RecordError::ShortRecord(RECORD, end.max(n_words), len));
    }
    Ok(end)
}

/// The decoded history buffer of one event
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    n_towers: usize,
    veto_before: Vec<TimedMask>,
    veto_after: Vec<TimedMask>,
    veto_buffer_overflow: bool,
    noise_monitor: Vec<TimedMask>,
    trigger_before: Vec<Vec<TimedMask>>,
    trigger_after: Vec<Vec<TimedMask>>,
    event_time: f64,
    event_masks: Vec<u64>,
    fields: FxHashMap<String, f64>,
}

impl HistoryRecord {
    /// Create a new record. The named fields are built once for `n_towers` towers
    pub fn new(n_towers: usize) -> Self {
        let mut fields = FxHashMap::default();
        for slot in VETO_FIRST_SLOT..=VETO_LAST_SLOT {
            fields.insert(format!("VTTime{slot}"), EMPTY_VALUE_F64);
            fields.insert(format!("VTMask{slot}"), EMPTY_VALUE_F64);
        }
        fields.insert(format!("NM{NOISE_MONITOR_BIT}PreTime"), EMPTY_VALUE_F64);
        fields.insert(format!("NM{NOISE_MONITOR_BIT}PostTime"), EMPTY_VALUE_F64);
        for tower in 1..=n_towers {
            for slot in TRIGGER_FIRST_SLOT..=TRIGGER_LAST_SLOT {
                fields.insert(format!("T{tower}TGTime{slot}"), EMPTY_VALUE_F64);
                fields.insert(format!("T{tower}TGMask{slot}"), EMPTY_VALUE_F64);
            }
            fields.insert(format!("T{tower}NTrigP"), EMPTY_VALUE_F64);
            fields.insert(format!("T{tower}NTrigQ"), EMPTY_VALUE_F64);
            for (window, _, _) in TRIGGER_WINDOWS {
                fields.insert(format!("T{tower}TGMask{window}"), EMPTY_VALUE_F64);
            }
        }
        fields.insert(String::from("ErrorMask"), EMPTY_VALUE_F64);

        Self {
            n_towers,
            veto_before: Vec::new(),
            veto_after: Vec::new(),
            veto_buffer_overflow: false,
            noise_monitor: Vec::new(),
            trigger_before: Vec::new(),
            trigger_after: Vec::new(),
            event_time: EMPTY_VALUE_F64,
            event_masks: Vec::new(),
            fields,
        }
    }

    /// Clear the event. The named fields are kept, set back to the empty value
    pub fn reset(&mut self) {
        self.veto_before.clear();
        self.veto_after.clear();
        self.veto_buffer_overflow = false;
        self.noise_monitor.clear();
        self.trigger_before.clear();
        self.trigger_after.clear();
        self.event_time = EMPTY_VALUE_F64;
        self.event_masks.clear();
        for value in self.fields.values_mut() {
            *value = EMPTY_VALUE_F64;
        }
    }

    pub fn decode(&mut self, buffer: &WordBuffer) -> Result<(), RecordError> {
        let n_veto_times = buffer.signed(0, RECORD)?;
        if n_veto_times == VETO_BUFFER_OVERFLOW {
            self.veto_buffer_overflow = true;
        }
        let n_veto_times = n_veto_times.max(0) as usize;
        let n_veto_words_pos = n_veto_times + 1;
        let n_veto_words = buffer.signed(n_veto_words_pos, RECORD)?.max(0) as usize;
        let n_trig_times_pos =
            block_end(buffer, n_veto_words_pos, n_veto_words, n_veto_times)? + 1;
        let n_trig_times = buffer.signed(n_trig_times_pos, RECORD)?.max(0) as usize;
        let n_trig_words_pos = n_trig_times_pos + n_trig_times + 1;
        let n_trig_words = buffer.signed(n_trig_words_pos, RECORD)?.max(0) as usize;
        block_end(buffer, n_trig_words_pos, n_trig_words, n_trig_times)?;

        self.decode_veto(buffer, n_veto_times, n_veto_words_pos, n_veto_words)?;
        self.decode_trigger(buffer, n_trig_times, n_trig_times_pos, n_trig_words, n_trig_words_pos)?;
        self.fill_fields();
        Ok(())
    }

    fn decode_veto(
        &mut self,
        buffer: &WordBuffer,
        n_times: usize,
        words_pos: usize,
        n_words: usize,
    ) -> Result<(), RecordError> {
        let mut entries = Vec::with_capacity(n_times);
        for time_idx in 0..n_times {
            let time = buffer.signed(time_idx + 1, RECORD)? as f64;
            let mut words = Vec::with_capacity(n_words);
            for word_idx in 1..=n_words {
                words.push(buffer.word(words_pos + n_words * time_idx + word_idx, RECORD)?);
            }
            if words.len() != 2 {
                return Err(RecordError::BadVetoMaskWidth(words.len()));
            }

            let wide = words[0] as u64 + ((words[1] as u64) << 32);
            if wide & NOISE_MONITOR_MASK != 0 {
                self.noise_monitor
                    .push(TimedMask::new(time, wide & NOISE_MONITOR_MASK));
                if wide & VETO_PANEL_MASK == 0 {
                    continue;
                }
                words[0] &= !(NOISE_MONITOR_MASK as u32);
                words[1] &= !((NOISE_MONITOR_MASK >> 32) as u32);
            }
            entries.push(TimedMask::new(time, assemble_veto_mask(&words)?));
        }

        for entry in compress_in_time(&entries) {
            if BARE_GLOBAL_VETO_MASKS.contains(&entry.mask) {
                continue;
            }
            if entry.time <= 0.0 {
                self.veto_before.push(entry);
            } else {
                self.veto_after.push(entry);
            }
        }
        Ok(())
    }

    fn decode_trigger(
        &mut self,
        buffer: &WordBuffer,
        n_times: usize,
        times_pos: usize,
        n_words: usize,
        words_pos: usize,
    ) -> Result<(), RecordError> {
        let mut per_tower: Vec<Vec<TimedMask>> = vec![Vec::new(); n_words];
        for time_idx in 0..n_times {
            let time = buffer.signed(times_pos + time_idx + 1, RECORD)? as f64;
            let mut words = Vec::with_capacity(n_words);
            for word_idx in 1..=n_words {
                words.push(buffer.word(words_pos + n_words * time_idx + word_idx, RECORD)?);
            }
            for (tower, mask) in compress_tower_words(&words).into_iter().enumerate() {
                per_tower[tower].push(TimedMask::new(time, mask));
            }
        }

        self.trigger_before = vec![Vec::new(); n_words];
        self.trigger_after = vec![Vec::new(); n_words];
        for (tower, entries) in per_tower.iter().enumerate() {
            let compressed = compress_in_time(entries);
            for (idx, entry) in compressed.iter().enumerate() {
                let next_time = compressed
                    .get(idx + 1)
                    .map(|e| e.time)
                    .unwrap_or(NEXT_TIME_MISSING);
                if entry.time < 0.0 && entry.mask != 0 {
                    if next_time <= 0.0 {
                        self.trigger_before[tower].push(*entry);
                    } else {
                        // Last entry before the trigger stands in for the event
                        self.event_time = entry.time;
                        self.event_masks.push(entry.mask);
                    }
                }
                if entry.time == 0.0 {
                    self.event_time = entry.time;
                    self.event_masks.push(entry.mask);
                }
                if entry.time > 0.0 && entry.mask != 0 {
                    self.trigger_after[tower].push(*entry);
                }
            }
        }
        Ok(())
    }

    fn set_field(&mut self, name: String, value: f64) {
        self.fields.insert(name, value);
    }

    fn fill_fields(&mut self) {
        let pre_time = self
            .noise_monitor
            .iter()
            .filter(|e| e.time <= 0.0)
            .map(|e| e.time)
            .reduce(f64::max)
            .unwrap_or(EMPTY_VALUE_F64);
        let post_time = self
            .noise_monitor
            .iter()
            .filter(|e| e.time > 0.0)
            .map(|e| e.time)
            .reduce(f64::min)
            .unwrap_or(EMPTY_VALUE_F64);
        self.set_field(format!("NM{NOISE_MONITOR_BIT}PreTime"), pre_time);
        self.set_field(format!("NM{NOISE_MONITOR_BIT}PostTime"), post_time);

        let before: Vec<TimedMask> = self.veto_before.iter().rev().copied().collect();
        for (nth, entry) in before.iter().enumerate() {
            let slot = EVENT_SLOT - nth as i64;
            if slot < VETO_FIRST_SLOT {
                break;
            }
            self.set_field(format!("VTTime{slot}"), entry.time);
            self.set_field(format!("VTMask{slot}"), entry.mask as f64);
        }
        let after = self.veto_after.clone();
        for (nth, entry) in after.iter().enumerate() {
            let slot = EVENT_SLOT + 1 + nth as i64;
            if slot > VETO_LAST_SLOT {
                break;
            }
            self.set_field(format!("VTTime{slot}"), entry.time);
            self.set_field(format!("VTMask{slot}"), entry.mask as f64);
        }

        let n_filled = self.n_towers.min(self.trigger_before.len());
        for tower_idx in 0..n_filled {
            let tower = tower_idx + 1;
            let before: Vec<TimedMask> =
                self.trigger_before[tower_idx].iter().rev().copied().collect();
            for (nth, entry) in before.iter().enumerate() {
                let slot = EVENT_SLOT - 1 - nth as i64;
                if slot < TRIGGER_FIRST_SLOT {
                    break;
                }
                self.set_field(format!("T{tower}TGTime{slot}"), entry.time);
                self.set_field(format!("T{tower}TGMask{slot}"), entry.mask as f64);
            }
            let after = self.trigger_after[tower_idx].clone();
            for (nth, entry) in after.iter().enumerate() {
                let slot = EVENT_SLOT + 1 + nth as i64;
                if slot > TRIGGER_LAST_SLOT {
                    break;
                }
                self.set_field(format!("T{tower}TGTime{slot}"), entry.time);
                self.set_field(format!("T{tower}TGMask{slot}"), entry.mask as f64);
            }

            self.set_field(format!("T{tower}TGTime{EVENT_SLOT}"), self.event_time);
            if let Some(mask) = self.event_masks.get(tower_idx) {
                self.set_field(format!("T{tower}TGMask{EVENT_SLOT}"), *mask as f64);
            }

            let mut n_trig_p = 0.0;
            let mut n_trig_q = 0.0;
            for zip in 1..=SOUDAN_ZIPS_PER_TOWER {
                let det_num = zip + tower_idx * SOUDAN_ZIPS_PER_TOWER;
                if self.count_zip_triggers(det_num, P_LOW_OFFSET) > 0 {
                    n_trig_p += 1.0;
                }
                if self.count_zip_triggers(det_num, Q_LOW_OFFSET) > 0 {
                    n_trig_q += 1.0;
                }
            }
            self.set_field(format!("T{tower}NTrigP"), n_trig_p);
            self.set_field(format!("T{tower}NTrigQ"), n_trig_q);

            for (window, min_time, max_time) in TRIGGER_WINDOWS {
                let mask = self.or_tower_masks(min_time, max_time, tower_idx);
                self.set_field(format!("T{tower}TGMask{window}"), mask as f64);
            }
        }

        let error_mask = self.error_mask();
        self.set_field(String::from("ErrorMask"), error_mask as f64);
    }

    // Queries

    fn require_event(&self, what: &'static str) -> Result<(), RecordError> {
        if self.event_masks.is_empty() {
            Err(RecordError::NotRead(what))
        } else {
            Ok(())
        }
    }

    fn tower_index(&self, tower: usize) -> Result<usize, RecordError> {
        if tower == 0 || tower > self.trigger_before.len() {
            return Err(RecordError::TowerOutOfRange(tower, self.trigger_before.len()));
        }
        Ok(tower - 1)
    }

    fn zip_tower_index(&self, det_num: usize) -> Result<(usize, usize), RecordError> {
        let (tower, zip) = locate_zip(det_num);
        match tower {
            Some(t) if t < self.trigger_before.len() => Ok((t, zip)),
            _ => Err(RecordError::TowerOutOfRange(
                det_num.div_ceil(SOUDAN_ZIPS_PER_TOWER),
                self.trigger_before.len(),
            )),
        }
    }

    /// Every entry of a tower, the event entry last
    fn tower_entries(&self, tower_idx: usize) -> impl Iterator<Item = TimedMask> + '_ {
        let event = self
            .event_masks
            .get(tower_idx)
            .map(|mask| TimedMask::new(self.event_time, *mask));
        self.trigger_before[tower_idx]
            .iter()
            .chain(self.trigger_after[tower_idx].iter())
            .copied()
            .chain(event)
    }

    fn count_zip_triggers(&self, det_num: usize, bit_offset: usize) -> usize {
        let (tower_idx, zip) = match self.zip_tower_index(det_num) {
            Ok(located) => located,
            Err(_) => return 0,
        };
        let bit = bit_offset + BITS_PER_DIB * (zip - 1);
        self.tower_entries(tower_idx)
            .filter(|e| e.time >= N_TRIG_MIN_TIME && e.time <= N_TRIG_MAX_TIME)
            .filter(|e| mask_bit(e.mask, bit))
            .count()
    }

    fn or_tower_masks(&self, min_time: f64, max_time: f64, tower_idx: usize) -> u64 {
        self.tower_entries(tower_idx)
            .filter(|e| e.time >= min_time && e.time <= max_time)
            .fold(0, |acc, e| acc | e.mask)
    }

    /// Event mask of a tower, counted from 1
    pub fn event_tower_mask(&self, tower: usize) -> Result<u64, RecordError> {
        self.require_event("History event tower mask")?;
        self.event_masks
            .get(tower.wrapping_sub(1))
            .copied()
            .ok_or(RecordError::TowerOutOfRange(tower, self.event_masks.len()))
    }

    pub fn event_time(&self) -> f64 {
        self.event_time
    }

    /// Number of Plow triggers of a zip within [-100, 1000] us. Detectors are numbered
    /// from 1 with six per tower
    pub fn n_trig_p(&self, det_num: usize) -> Result<usize, RecordError> {
        self.require_event("History NTrigP")?;
        self.zip_tower_index(det_num)?;
        Ok(self.count_zip_triggers(det_num, P_LOW_OFFSET))
    }

    /// Number of Qlow triggers of a zip within [-100, 1000] us
    pub fn n_trig_q(&self, det_num: usize) -> Result<usize, RecordError> {
        self.require_event("History NTrigQ")?;
        self.zip_tower_index(det_num)?;
        Ok(self.count_zip_triggers(det_num, Q_LOW_OFFSET))
    }

    /// OR of every trigger mask of a tower (from 1) within [min_time, max_time]
    pub fn or_masks_from(
        &self,
        min_time: f64,
        max_time: f64,
        tower: usize,
    ) -> Result<u64, RecordError> {
        self.require_event("History OR'd masks")?;
        let tower_idx = self.tower_index(tower)?;
        Ok(self.or_tower_masks(min_time, max_time, tower_idx))
    }

    fn any_dib_bits(&self, det_num: usize, window: f64, shift: usize) -> Result<bool, RecordError> {
        self.require_event("History zip trigger bits")?;
        let (tower_idx, zip) = self.zip_tower_index(det_num)?;
        let shift = (zip - 1) * BITS_PER_DIB + shift;
        let in_window = self.trigger_before[tower_idx]
            .iter()
            .chain(self.trigger_after[tower_idx].iter())
            .filter(|e| e.time.abs() <= window)
            .any(|e| (e.mask >> shift) & 0x3 != 0);
        let event = self
            .event_masks
            .get(tower_idx)
            .map(|mask| (mask >> shift) & 0x3 != 0)
            .unwrap_or(false);
        Ok(in_window || event)
    }

    /// Whether a zip saw a Qlow or Qhigh trigger within +/- window us of the event
    pub fn is_event_q_low_or_high(&self, det_num: usize, window: f64) -> Result<bool, RecordError> {
        self.any_dib_bits(det_num, window, 0)
    }

    /// Whether a zip saw a Plow or Phigh trigger within +/- window us of the event
    pub fn is_event_p_low_or_high(&self, det_num: usize, window: f64) -> Result<bool, RecordError> {
        self.any_dib_bits(det_num, window, 2)
    }

    /// Data quality bits of the history buffer:
    ///
    /// - 1: every event trigger mask is empty
    /// - 2: no event trigger mask carries the global bit
    /// - 4: no zip, random or veto multiplicity trigger in the event masks
    /// - 8: the veto mask at t=0 lacks a global trigger bit
    /// - 16: the veto mask at t=0 lacks the all-panel OR
    /// - 32: the two ORs of panels 1-20 disagree in the last veto mask
    /// - 64: the veto buffer overflowed
    pub fn error_mask(&self) -> u32 {
        let mut error_mask = 0;
        let n_masks = self.n_towers.min(self.event_masks.len());
        let masks = &self.event_masks[..n_masks];

        if masks.iter().fold(0u64, |acc, m| acc.wrapping_add(*m)) == 0 {
            error_mask += 1;
        }
        if !masks.iter().any(|m| mask_bit(*m, GLOBAL_BIT)) {
            error_mask += 2;
        }
        let zip_bits = masks
            .iter()
            .fold(0u64, |acc, m| acc.wrapping_add(m & ZIP_BITS_MASK));
        let random = masks.iter().any(|m| mask_bit(*m, RANDOM_BIT));
        let multiplicity = masks.iter().any(|m| mask_bit(*m, ISR_BIT));
        if zip_bits == 0 && !random && !multiplicity {
            error_mask += 4;
        }

        if let Some(last) = self.veto_before.last() {
            let at_trigger = last.time == 0.0;
            if (!mask_bit(last.mask, 0) || !mask_bit(last.mask, 22)) && at_trigger {
                error_mask += 8;
            }
            if !mask_bit(last.mask, 23) && at_trigger {
                error_mask += 16;
            }
            if mask_bit(last.mask, 1) != mask_bit(last.mask, 44) {
                error_mask += 32;
            }
        }

        if self.veto_buffer_overflow {
            error_mask += 64;
        }
        error_mask
    }

    pub fn veto_buffer_overflow(&self) -> bool {
        self.veto_buffer_overflow
    }

    /// First veto time after the trigger, in seconds
    pub fn vt_post_time(&self) -> f64 {
        self.veto_after
            .first()
            .map(|e| e.time * 1e-6)
            .unwrap_or(EMPTY_VALUE_F64)
    }

    /// Last veto time at or before the trigger, in seconds
    pub fn vt_pre_time(&self) -> f64 {
        self.veto_before
            .last()
            .map(|e| e.time * 1e-6)
            .unwrap_or(EMPTY_VALUE_F64)
    }

    /// Second to last veto time at or before the trigger, in seconds
    pub fn vt2_pre_time(&self) -> f64 {
        self.veto_before
            .len()
            .checked_sub(2)
            .map(|idx| self.veto_before[idx].time * 1e-6)
            .unwrap_or(EMPTY_VALUE_F64)
    }

    /// Panels hit just before the trigger: the last veto mask OR'ed with those less than
    /// 2 us before it, with the global and OR bits removed
    pub fn vt_pre_mask(&self) -> u64 {
        let Some(last) = self.veto_before.last() else {
            return 0;
        };
        let mut mask = last.mask;
        // The first entry is never merged
        for idx in (1..self.veto_before.len() - 1).rev() {
            let entry = self.veto_before[idx];
            if last.time - entry.time < 2.0 {
                mask |= entry.mask;
            } else {
                break;
            }
        }
        mask & !((1 << 0) | (1 << 22) | (1 << 44))
    }

    pub fn veto_before(&self) -> &[TimedMask] {
        &self.veto_before
    }

    pub fn veto_after(&self) -> &[TimedMask] {
        &self.veto_after
    }

    pub fn noise_monitor(&self) -> &[TimedMask] {
        &self.noise_monitor
    }

    /// Trigger entries of a tower (from 1) before the event
    pub fn trigger_before(&self, tower: usize) -> Result<&[TimedMask], RecordError> {
        Ok(&self.trigger_before[self.tower_index(tower)?])
    }

    /// Trigger entries of a tower (from 1) after the event
    pub fn trigger_after(&self, tower: usize) -> Result<&[TimedMask], RecordError> {
        Ok(&self.trigger_after[self.tower_index(tower)?])
    }

    pub fn field(&self, name: &str) -> Result<f64, RecordError> {
        self.fields
            .get(name)
            .copied()
            .ok_or_else(|| RecordError::UnknownField(name.to_string()))
    }

    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endian::WordOrder;

    fn entries(list: &[(f64, u64)]) -> Vec<TimedMask> {
        list.iter().map(|(t, m)| TimedMask::new(*t, *m)).collect()
    }

    /// Lay out a history buffer from veto (time, [w0, w1]) and trigger (time, words)
    fn history_words(veto: &[(i32, [u32; 2])], trigger: &[(i32, Vec<u32>)]) -> Vec<u32> {
        let mut words = vec![veto.len() as u32];
        words.extend(veto.iter().map(|(t, _)| *t as u32));
        words.push(2);
        for (_, pair) in veto {
            words.extend_from_slice(pair);
        }
        words.push(trigger.len() as u32);
        words.extend(trigger.iter().map(|(t, _)| *t as u32));
        let n_words = trigger.first().map(|(_, w)| w.len()).unwrap_or(0);
        words.push(n_words as u32);
        for (_, tower_words) in trigger {
            words.extend_from_slice(tower_words);
        }
        words
    }

    #[test]
    fn test_oversized_counts_rejected() {
        // Four words declaring a huge trigger row width
        let buffer = WordBuffer::from_words(vec![0, 0, 0, 0x0fff_ffff], WordOrder::Unswapped);
        let mut record = HistoryRecord::new(1);
        assert!(matches!(
            record.decode(&buffer),
            Err(RecordError::ShortRecord(RECORD, 0x0fff_ffff, 4))
        ));

        // Veto rows extending past the record end
        let buffer =
            WordBuffer::from_words(vec![1, 0, 0x7fff_ffff, 0, 0], WordOrder::Unswapped);
        assert!(matches!(
            record.decode(&buffer),
            Err(RecordError::ShortRecord(RECORD, _, 5))
        ));

        // An empty history still decodes
        let buffer = WordBuffer::from_words(history_words(&[], &[]), WordOrder::Unswapped);
        assert!(record.decode(&buffer).is_ok());
    }

    #[test]
    fn test_time_compression() {
        // Isolated entries pass through
        let isolated = entries(&[(-10.0, 1), (0.0, 2), (10.0, 4)]);
        assert_eq!(compress_in_time(&isolated), isolated);

        // A pair within one tick is merged
        let pair = entries(&[(-10.0, 1), (-9.0, 2), (5.0, 4)]);
        assert_eq!(
            compress_in_time(&pair),
            entries(&[(-10.0, 3), (5.0, 4)])
        );

        // A run of three folds the trailing entry into the pair
        let triple = entries(&[(0.0, 1), (1.0, 2), (2.0, 4)]);
        assert_eq!(compress_in_time(&triple), entries(&[(0.0, 7)]));

        // A run of four makes two pairs
        let quad = entries(&[(0.0, 1), (1.0, 2), (2.0, 4), (3.0, 8)]);
        assert_eq!(
            compress_in_time(&quad),
            entries(&[(0.0, 3), (2.0, 12)])
        );

        assert!(compress_in_time(&[]).is_empty());
    }

    #[test]
    fn test_veto_assembly() {
        assert_eq!(assemble_veto_mask(&[0x3, 0x1]).unwrap(), 0x3 | 0x40_0000);
        assert_eq!(
            assemble_veto_mask(&[0x0, 1 << 28]).unwrap(),
            VETO_SECOND_OR_BIT
        );
        assert!(matches!(
            assemble_veto_mask(&[0x0]),
            Err(RecordError::BadVetoMaskWidth(1))
        ));
    }

    #[test]
    fn test_decode_history() {
        let global = 1u32 << 30; // even word bit 30 becomes Global
        let plow_zip1 = 1u32 << 3;
        let qlow_zip2 = 1u32 << 6;
        let words = history_words(
            &[
                (-50, [0x4, 0x2]),
                (-5, [0x1, 0x0]),
                (0, [0x3, 0x3 | (1 << 28)]),
                (30, [0x8, 0x0]),
            ],
            &[
                (-40, vec![qlow_zip2, 0]),
                (0, vec![plow_zip1, global]),
                (120, vec![plow_zip1, 0]),
            ],
        );
        let buffer = WordBuffer::from_words(words, WordOrder::Unswapped);
        let mut history = HistoryRecord::new(2);
        history.decode(&buffer).unwrap();

        // The bare global veto mask at -5 is dropped
        assert_eq!(history.veto_before().len(), 2);
        assert_eq!(history.veto_after().len(), 1);
        assert_eq!(history.vt_pre_time(), 0.0);
        assert!((history.vt2_pre_time() + 50e-6).abs() < 1e-12);
        assert!((history.vt_post_time() - 30e-6).abs() < 1e-12);

        assert_eq!(history.event_time(), 0.0);
        assert_eq!(
            history.event_tower_mask(1).unwrap(),
            plow_zip1 as u64 | (1 << GLOBAL_BIT)
        );
        assert_eq!(history.event_tower_mask(2).unwrap(), 1 << GLOBAL_BIT);
        assert_eq!(history.trigger_before(1).unwrap().len(), 1);
        assert_eq!(history.trigger_after(1).unwrap().len(), 1);

        assert_eq!(history.n_trig_p(1).unwrap(), 2);
        assert_eq!(history.n_trig_q(2).unwrap(), 1);
        assert_eq!(history.n_trig_p(2).unwrap(), 0);
        assert!(history.is_event_q_low_or_high(2, 50.0).unwrap());
        assert!(!history.is_event_q_low_or_high(2, 10.0).unwrap());
        assert!(history.is_event_p_low_or_high(1, 0.0).unwrap());
        assert_eq!(
            history.or_masks_from(-50.0, 50.0, 1).unwrap(),
            qlow_zip2 as u64 | plow_zip1 as u64 | (1 << GLOBAL_BIT)
        );
        assert!(history.n_trig_p(13).is_err());

        assert_eq!(history.field("T1TGTime20").unwrap(), 0.0);
        assert_eq!(history.field("T1TGTime19").unwrap(), -40.0);
        assert_eq!(history.field("T1TGTime21").unwrap(), 120.0);
        assert_eq!(history.field("T1TGTime18").unwrap(), EMPTY_VALUE_F64);
        assert_eq!(history.field("T1NTrigP").unwrap(), 1.0);
        assert_eq!(history.field("T1NTrigQ").unwrap(), 1.0);
        assert_eq!(history.field("VTTime20").unwrap(), 0.0);
        assert_eq!(history.field("VTTime19").unwrap(), -50.0);
        assert_eq!(history.field("VTTime21").unwrap(), 30.0);
        assert!(history.field("T3NTrigP").is_err());

        // Veto at t=0 carries both global bits, the all-panel OR and both ORs of panels 1-20
        assert_eq!(history.error_mask(), 0);
        assert_eq!(history.field("ErrorMask").unwrap(), 0.0);

        history.reset();
        assert_eq!(history.field("T1TGTime20").unwrap(), EMPTY_VALUE_F64);
        assert!(matches!(
            history.n_trig_p(1),
            Err(RecordError::NotRead(_))
        ));
    }

    #[test]
    fn test_noise_monitor_split() {
        let nm_high_word = 1u32 << (NOISE_MONITOR_BIT - 32);
        let words = history_words(
            &[(-20, [0x0, nm_high_word]), (-8, [0x4, nm_high_word]), (40, [0x0, nm_high_word])],
            &[(0, vec![0x1, 1 << 30])],
        );
        let buffer = WordBuffer::from_words(words, WordOrder::Unswapped);
        let mut history = HistoryRecord::new(1);
        history.decode(&buffer).unwrap();
        assert_eq!(history.noise_monitor().len(), 3);
        // Only the entry with a panel bit survives as a veto entry, without bit 55
        assert_eq!(history.veto_before(), &[TimedMask::new(-8.0, 0x4)]);
        assert_eq!(history.field("NM55PreTime").unwrap(), -8.0);
        assert_eq!(history.field("NM55PostTime").unwrap(), 40.0);
    }

    #[test]
    fn test_error_mask_bits() {
        let words = history_words(&[(0, [0x1, 0x0]), (0, [0x3, 0x0])], &[(0, vec![0, 0])]);
        let buffer = WordBuffer::from_words(words, WordOrder::Unswapped);
        let mut history = HistoryRecord::new(2);
        history.decode(&buffer).unwrap();
        // Empty event masks (1 + 2 + 4), veto at t=0 lacks bit 22 (8) and bit 23 (16),
        // bit 1 set without bit 44 (32)
        assert_eq!(history.error_mask(), 1 + 2 + 4 + 8 + 16 + 32);
    }

    #[test]
    fn test_vt_pre_mask() {
        let mut history = HistoryRecord::new(1);
        history.veto_before = entries(&[
            (-9.9, 0x100),
            (-12.0, 0x80),
            (-9.5, 0x10),
            (-9.0, 0x20 | 0x1),
            (-8.0, 0x40 | (1 << 22)),
        ]);
        // Merging stops at -12 and never reaches the first entry
        assert_eq!(history.vt_pre_mask(), 0x40 | 0x20 | 0x10);
        history.veto_before.clear();
        assert_eq!(history.vt_pre_mask(), 0);
    }

    #[test]
    fn test_zip_location() {
        assert_eq!(locate_zip(1), (Some(0), 1));
        assert_eq!(locate_zip(6), (Some(0), 6));
        assert_eq!(locate_zip(7), (Some(1), 1));
        assert_eq!(locate_zip(0), (None, 6));
    }
}
