use bitvec::prelude::*;
use std::fmt::Write;

use super::constants::{BITS_PER_DIB, DIBS_PER_TOWER};
use super::endian::WordBuffer;
use super::error::RecordError;

const RECORD: &str = "Trigger";

// Per-DIB trigger bits, relative to the DIB's first bit
pub const Q_HIGH_BIT: usize = 0;
pub const Q_LOW_BIT: usize = 1;
pub const P_HIGH_BIT: usize = 2;
pub const P_LOW_BIT: usize = 3;
pub const WISPER_BIT: usize = 4;

// Tower-wide trigger bits, after compression
pub const ST_TE_BIT: usize = 32;
pub const ISR_BIT: usize = 33;
pub const GLOBAL_BIT: usize = 34;
pub const RANDOM_BIT: usize = 35;

const TOWER_WORD_KEEP: u64 = 0x3fff_ffff;

/// Test a single bit of a compressed mask
pub fn mask_bit(mask: u64, bit: usize) -> bool {
    mask.view_bits::<Lsb0>()[bit]
}

/// Move the shared top bits of an odd/even tower word pair to their own positions.
///
/// Bits 30 and 31 of a raw tower word are not per-tower: the odd word carries ST_TE and
/// ISR, the even word carries Global and Random. Both compressed masks receive all four.
pub fn compress_tower_pair(odd: u32, even: u32) -> (u64, u64) {
    let odd_bits = odd.view_bits::<Lsb0>();
    let even_bits = even.view_bits::<Lsb0>();

    let mut shared: u64 = 0;
    let shared_bits = shared.view_bits_mut::<Lsb0>();
    shared_bits.set(ST_TE_BIT, odd_bits[30]);
    shared_bits.set(ISR_BIT, odd_bits[31]);
    shared_bits.set(GLOBAL_BIT, even_bits[30]);
    shared_bits.set(RANDOM_BIT, even_bits[31]);

    (
        (odd as u64 & TOWER_WORD_KEEP) | shared,
        (even as u64 & TOWER_WORD_KEEP) | shared,
    )
}

/// Compress a list of raw tower words into one mask per tower. An unpaired final word
/// is dropped.
pub fn compress_tower_words(words: &[u32]) -> Vec<u64> {
    let mut masks = Vec::with_capacity(words.len());
    for pair in words.chunks_exact(2) {
        let (odd, even) = compress_tower_pair(pair[0], pair[1]);
        masks.push(odd);
        masks.push(even);
    }
    masks
}

/// The trigger record: one mask per tower describing which channels fired
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerRecord {
    trigger_time: i32,
    masks: Vec<u64>,
    n_towers: usize,
}

impl TriggerRecord {
    pub fn new(n_towers: usize) -> Self {
        Self {
            n_towers,
            ..Default::default()
        }
    }

    pub fn reset(&mut self) {
        self.trigger_time = 0;
        self.masks.clear();
    }

    pub fn decode(&mut self, buffer: &WordBuffer) -> Result<(), RecordError> {
        self.trigger_time = buffer.signed(0, RECORD)?;
        let mut words = Vec::with_capacity(buffer.len().saturating_sub(1));
        for idx in 1..buffer.len() {
            words.push(buffer.word(idx, RECORD)?);
        }
        self.masks = compress_tower_words(&words);
        Ok(())
    }

    pub fn trigger_time(&self) -> i32 {
        self.trigger_time
    }

    pub fn masks(&self) -> &[u64] {
        &self.masks
    }

    /// Mask of a tower, counted from 1
    pub fn tower_mask(&self, tower: usize) -> Result<u64, RecordError> {
        if self.masks.is_empty() {
            return Err(RecordError::NotRead("Trigger tower mask"));
        }
        if tower == 0 || tower > self.masks.len() {
            return Err(RecordError::TowerOutOfRange(tower, self.masks.len()));
        }
        Ok(self.masks[tower - 1])
    }

    /// Whether a DIB trigger bit fired. `dib` is counted from 0
    pub fn dib_bit(&self, tower: usize, dib: usize, bit: usize) -> Result<bool, RecordError> {
        let mask = self.tower_mask(tower)?;
        Ok(mask_bit(mask, dib * BITS_PER_DIB + bit))
    }

    /// Named fields are TrigInfo1..TrigInfoN for the configured towers
    pub fn field(&self, name: &str) -> Result<f64, RecordError> {
        let tower = name
            .strip_prefix("TrigInfo")
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n >= 1 && *n <= self.n_towers)
            .ok_or_else(|| RecordError::UnknownField(name.to_string()))?;
        match self.masks.get(tower - 1) {
            Some(mask) => Ok(*mask as f64),
            None => Ok(super::constants::EMPTY_VALUE_F64),
        }
    }

    pub fn field_names(&self) -> Vec<String> {
        (1..=self.n_towers).map(|t| format!("TrigInfo{t}")).collect()
    }

    /// Human readable summary of which triggers fired in every tower
    pub fn trigger_table(&self) -> String {
        let mut table = String::new();
        let _ = writeln!(
            table,
            "Triggers: (Random,Global,ISR,ST_TE) or (Wisper,Plow,Phigh,Qlow,Qhigh)"
        );
        let _ = write!(table, "Tower  | ");
        for tower in 0..self.masks.len() {
            let _ = write!(table, "{:>5} | ", tower + 1);
        }
        let _ = write!(table, "\n       |  ");
        for mask in self.masks.iter() {
            let _ = write!(
                table,
                "{}{}{}{} |  ",
                flag(*mask, RANDOM_BIT, 'R'),
                flag(*mask, GLOBAL_BIT, 'G'),
                flag(*mask, ISR_BIT, 'I'),
                flag(*mask, ST_TE_BIT, 'S')
            );
        }
        let width = 9 + 8 * self.masks.len();
        let _ = writeln!(table, "\n{}", "-".repeat(width));
        for dib in 0..DIBS_PER_TOWER {
            let _ = write!(table, "DIB{:<4}| ", dib + 1);
            for mask in self.masks.iter() {
                let base = dib * BITS_PER_DIB;
                let _ = write!(
                    table,
                    "{}{}{}{}{} | ",
                    flag(*mask, base + WISPER_BIT, 'W'),
                    flag(*mask, base + P_LOW_BIT, 'p'),
                    flag(*mask, base + P_HIGH_BIT, 'P'),
                    flag(*mask, base + Q_LOW_BIT, 'q'),
                    flag(*mask, base + Q_HIGH_BIT, 'Q')
                );
            }
            table.push('\n');
        }
        table
    }
}

fn flag(mask: u64, bit: usize, symbol: char) -> char {
    if mask_bit(mask, bit) {
        symbol
    } else {
        '-'
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endian::WordOrder;

    #[test]
    fn test_pair_compression() {
        let odd = 0x4000_0001; // ST_TE + bit 0
        let even = 0x8000_0002; // Random + bit 1
        let (odd_mask, even_mask) = compress_tower_pair(odd, even);
        assert_eq!(odd_mask, 0x1 | (1 << 32) | (1 << 35));
        assert_eq!(even_mask, 0x2 | (1 << 32) | (1 << 35));

        let (odd_mask, even_mask) = compress_tower_pair(0x8000_0000, 0x4000_0000);
        assert_eq!(odd_mask, (1 << 33) | (1 << 34));
        assert_eq!(even_mask, odd_mask);
    }

    #[test]
    fn test_decode_and_query() {
        let buffer = WordBuffer::from_words(
            vec![0, 0b10100, 0x4000_0000, 0x1, 0x0, 0xffff],
            WordOrder::Unswapped,
        );
        let mut trigger = TriggerRecord::new(2);
        assert!(matches!(
            trigger.tower_mask(1),
            Err(RecordError::NotRead(_))
        ));
        trigger.decode(&buffer).unwrap();
        // Final unpaired word is dropped
        assert_eq!(trigger.masks().len(), 4);
        assert_eq!(trigger.tower_mask(1).unwrap(), 0b10100 | (1 << 34));
        assert!(trigger.dib_bit(1, 0, P_HIGH_BIT).unwrap());
        assert!(trigger.dib_bit(1, 0, WISPER_BIT).unwrap());
        assert!(!trigger.dib_bit(1, 0, Q_HIGH_BIT).unwrap());
        assert!(mask_bit(trigger.tower_mask(2).unwrap(), GLOBAL_BIT));
        assert!(matches!(
            trigger.tower_mask(5),
            Err(RecordError::TowerOutOfRange(5, 4))
        ));
        assert_eq!(trigger.field("TrigInfo2").unwrap(), ((1u64 << 34) | 0) as f64);
        assert!(trigger.field("TrigInfo3").is_err());
        assert_eq!(trigger.field_names(), vec!["TrigInfo1", "TrigInfo2"]);
    }

    #[test]
    fn test_table_layout() {
        let buffer = WordBuffer::from_words(vec![0, 0x1, 0x8000_0000], WordOrder::Unswapped);
        let mut trigger = TriggerRecord::new(2);
        trigger.decode(&buffer).unwrap();
        let table = trigger.trigger_table();
        assert!(table.contains("R---"));
        assert!(table.contains("DIB1   | ----Q | "));
        assert_eq!(table.lines().count(), 4 + DIBS_PER_TOWER);
    }
}
