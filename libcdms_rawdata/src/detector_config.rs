use std::collections::BTreeMap;

use super::constants::{
    RecordKind, CHARGE_CONFIG_RECORD_WORDS, PHONON_CONFIG_RECORD_WORDS, WORD_SIZE,
};
use super::endian::WordBuffer;
use super::error::RecordError;

const RECORD: &str = "DetectorConfig";

// (parameter name, scale applied to the raw word)
const PHONON_PARAMETERS: [(&str, f64); 10] = [
    ("Tower", 1.0),
    ("driverGain", 1.0 / 100.0),
    ("qetBias", 1e-6 / 100.0),
    ("squidBias", 1e-6 / 100.0),
    ("squidLockPoint", 1e-6 / 100.0),
    ("phononOffset", 1e-6),
    ("variableGain", 1.0),
    ("timePerBin", 1.0 / 1e9),
    ("triggerTime", 1.0 / 1e9),
    ("binsPerTrace", 1.0),
];

const CHARGE_PARAMETERS: [(&str, f64); 7] = [
    ("Tower", 1.0),
    ("driverGain", 1.0 / 100.0),
    ("chargeBias", 1e-6),
    ("chargeOffset", 1e-6),
    ("timePerBin", 1.0 / 1e9),
    ("triggerTime", 1.0 / 1e9),
    ("binsPerTrace", 1.0),
];

/// Parameters of one channel, keyed by parameter name
pub type ChannelParameters = BTreeMap<String, f64>;

/// Detector settings read from the file header, keyed by channel code.
///
/// Filled at most once per file. The remap engine may rewrite it exactly once, after
/// which it is flagged as modified.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectorConfigData {
    channels: BTreeMap<u32, ChannelParameters>,
    is_filled: bool,
    is_modified: bool,
}

impl DetectorConfigData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Decode the sub-records of a configuration record until the buffer is exhausted
    pub fn decode(&mut self, buffer: &WordBuffer) -> Result<(), RecordError> {
        let mut pos = 0;
        while pos < buffer.len() {
            let sub_id = buffer.word(pos, RECORD)?;
            let sub_bytes = buffer.word(pos + 1, RECORD)?;
            if sub_bytes as u64 % WORD_SIZE != 0 {
                return Err(RecordError::MisalignedLength(sub_bytes as u64));
            }
            let sub_words = sub_bytes / WORD_SIZE as u32;
            let body = pos + 2;

            match RecordKind::from_id(sub_id) {
                Some(RecordKind::PhononConfig) => {
                    if sub_words != PHONON_CONFIG_RECORD_WORDS {
                        spdlog::warn!(
                            "Phonon configuration declared {} words, expected {}",
                            sub_words,
                            PHONON_CONFIG_RECORD_WORDS
                        );
                    }
                    self.decode_channel(buffer, body, &PHONON_PARAMETERS)?;
                }
                Some(RecordKind::ChargeConfig) => {
                    if sub_words != CHARGE_CONFIG_RECORD_WORDS {
                        return Err(RecordError::BadSubRecordSize(
                            sub_id,
                            sub_words,
                            CHARGE_CONFIG_RECORD_WORDS,
                        ));
                    }
                    self.decode_channel(buffer, body, &CHARGE_PARAMETERS)?;
                }
                _ => {
                    spdlog::warn!(
                        "Skipping unknown detector configuration sub-record {:#x} of {} bytes",
                        sub_id,
                        sub_bytes
                    );
                }
            }
            pos = body + sub_words as usize;
        }
        self.is_filled = true;
        self.is_modified = false;
        spdlog::info!(
            "Read detector configuration for {} channels",
            self.channels.len()
        );
        Ok(())
    }

    fn decode_channel(
        &mut self,
        buffer: &WordBuffer,
        body: usize,
        parameters: &[(&str, f64)],
    ) -> Result<(), RecordError> {
        let code = buffer.word(body, RECORD)?;
        let entry = self.channels.entry(code).or_default();
        for (offset, (name, scale)) in parameters.iter().enumerate() {
            let raw = buffer.signed(body + 1 + offset, RECORD)?;
            entry.insert(name.to_string(), raw as f64 * scale);
        }
        Ok(())
    }

    pub fn is_filled(&self) -> bool {
        self.is_filled
    }

    pub fn is_modified(&self) -> bool {
        self.is_modified
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel(&self, code: u32) -> Option<&ChannelParameters> {
        self.channels.get(&code)
    }

    /// A single parameter of a channel
    pub fn value(&self, code: u32, parameter: &str) -> Option<f64> {
        self.channels
            .get(&code)
            .and_then(|params| params.get(parameter))
            .copied()
    }

    pub fn channels(&self) -> &BTreeMap<u32, ChannelParameters> {
        &self.channels
    }

    /// Replace the channel map wholesale and flag it as modified
    pub(crate) fn replace_modified(&mut self, channels: BTreeMap<u32, ChannelParameters>) {
        self.channels = channels;
        self.is_modified = true;
    }

    #[cfg(test)]
    pub(crate) fn insert_channel(&mut self, code: u32, parameters: ChannelParameters) {
        self.channels.insert(code, parameters);
        self.is_filled = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endian::WordOrder;

    fn phonon_words(code: u32) -> Vec<u32> {
        vec![
            0x10001, 44, code, 1, 250, 400_000, 1_000_000, 50, (-2_000_000i32) as u32, 3, 800,
            819_200, 4096,
        ]
    }

    fn charge_words(code: u32) -> Vec<u32> {
        vec![0x10002, 32, code, 1, 100, 3_000_000, 25, 800, 819_200, 2048]
    }

    #[test]
    fn test_decode_channels() {
        let mut words = phonon_words(4_001_002);
        words.extend(charge_words(4_001_000));
        let buffer = WordBuffer::from_words(words, WordOrder::Unswapped);
        let mut config = DetectorConfigData::new();
        config.decode(&buffer).unwrap();

        assert!(config.is_filled());
        assert!(!config.is_modified());
        assert_eq!(config.len(), 2);
        assert_eq!(config.value(4_001_002, "Tower"), Some(1.0));
        assert!((config.value(4_001_002, "driverGain").unwrap() - 2.5).abs() < 1e-12);
        assert!((config.value(4_001_002, "qetBias").unwrap() - 4e-3).abs() < 1e-12);
        assert!((config.value(4_001_002, "phononOffset").unwrap() + 2.0).abs() < 1e-12);
        assert!((config.value(4_001_002, "timePerBin").unwrap() - 800e-9).abs() < 1e-15);
        assert_eq!(config.value(4_001_002, "binsPerTrace"), Some(4096.0));
        assert!((config.value(4_001_000, "chargeBias").unwrap() - 3.0).abs() < 1e-12);
        assert_eq!(config.value(4_001_000, "binsPerTrace"), Some(2048.0));
        assert_eq!(config.value(4_001_000, "qetBias"), None);
    }

    #[test]
    fn test_unknown_sub_record_skipped() {
        let mut words = vec![0x10007, 8, 0xdead, 0xbeef];
        words.extend(charge_words(4_002_001));
        let buffer = WordBuffer::from_words(words, WordOrder::Unswapped);
        let mut config = DetectorConfigData::new();
        config.decode(&buffer).unwrap();
        assert_eq!(config.len(), 1);
        assert!(config.channel(4_002_001).is_some());
    }

    #[test]
    fn test_bad_charge_size() {
        let mut words = charge_words(4_002_001);
        words[1] = 28;
        let buffer = WordBuffer::from_words(words, WordOrder::Unswapped);
        let mut config = DetectorConfigData::new();
        assert!(matches!(
            config.decode(&buffer),
            Err(RecordError::BadSubRecordSize(0x10002, 7, 8))
        ));
    }
}
