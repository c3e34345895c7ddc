use super::channel_map::{channel_name, has_channel_table, is_physical_channel};
use super::constants::RecordKind;
use super::detector_code::{is_noise_monitor_type, is_veto_type, DetectorCode};
use super::endian::WordBuffer;
use super::error::{ChannelMapError, RecordError};

const RECORD: &str = "Pulse";

// Word offsets within a pulse record
const CODE_WORD: usize = 4;
const T0_WORD: usize = 7;
const DT_WORD: usize = 8;
const N_SAMPLES_WORD: usize = 11;
const FIRST_SAMPLE_WORD: usize = 12;

/// What kind of channel a pulse was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseClass {
    Phonon,
    Charge,
    Veto,
    NoiseMonitor,
    Other,
}

/// Name and class of a channel. `stream_noise_name` selects the naming used for noise
/// monitor pulses read from the native stream
fn classify(
    fields: &DetectorCode,
    stream_noise_name: bool,
) -> Result<(String, PulseClass), RecordError> {
    if is_veto_type(fields.det_type) {
        Ok((String::from("V"), PulseClass::Veto))
    } else if is_noise_monitor_type(fields.det_type) {
        let name = if stream_noise_name {
            format!("NM{}Ch{}", fields.det_num, fields.channel + 1)
        } else {
            channel_name(fields.det_type, fields.channel)?
        };
        Ok((name, PulseClass::NoiseMonitor))
    } else if has_channel_table(fields.det_type) {
        let name = channel_name(fields.det_type, fields.channel)?;
        let class = match name.as_bytes().first() {
            Some(b'P') => PulseClass::Phonon,
            Some(b'Q') => PulseClass::Charge,
            _ => PulseClass::Other,
        };
        Ok((name, class))
    } else {
        Err(ChannelMapError::UnknownDetectorType(fields.det_type).into())
    }
}

/// One digitized trace and the channel it came from.
///
/// Records are immutable once built; remapping produces a new record.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseRecord {
    code: u32,
    fields: DetectorCode,
    name: String,
    class: PulseClass,
    n_samples: u32,
    sample_dt: u32,
    trigger_t0: i32,
    samples: Vec<u16>,
}

impl PulseRecord {
    /// Decode a native pulse record. The record kind selects the channel code scheme
    pub fn from_buffer(buffer: &WordBuffer, kind: RecordKind) -> Result<Self, RecordError> {
        let raw_code = buffer.word(CODE_WORD, RECORD)?;
        let fields = match kind {
            RecordKind::Pulse => DetectorCode::decode_legacy(raw_code),
            RecordKind::PulseExpandedCode => DetectorCode::decode(raw_code),
            _ => return Err(RecordError::UnexpectedKind(RECORD, kind.id())),
        };
        let trigger_t0 = buffer.signed(T0_WORD, RECORD)?;
        let sample_dt = buffer.word(DT_WORD, RECORD)?;
        let n_samples = buffer.word(N_SAMPLES_WORD, RECORD)?;

        let n_pairs = (n_samples / 2) as usize;
        let last_word = FIRST_SAMPLE_WORD.saturating_add(n_pairs);
        if n_pairs > 0 && last_word > buffer.len() {
            return Err(RecordError::ShortRecord(RECORD, last_word - 1, buffer.len()));
        }
        let mut samples = Vec::with_capacity(n_pairs * 2);
        for pair in 0..n_pairs {
            let twin = buffer.word(FIRST_SAMPLE_WORD + pair, RECORD)?;
            samples.push((twin & 0xffff) as u16);
            samples.push((twin >> 16) as u16);
        }

        let code = fields
            .try_code()
            .ok_or_else(|| RecordError::UnencodableCode(raw_code, fields.to_string()))?;
        let (name, class) = classify(&fields, true)?;
        Ok(Self {
            code,
            fields,
            name,
            class,
            n_samples,
            sample_dt,
            trigger_t0,
            samples,
        })
    }

    /// Build a record from a trace obtained elsewhere (e.g. the bank format)
    pub fn from_raw(
        code: u32,
        samples: Vec<u16>,
        sample_dt: u32,
        trigger_t0: i32,
    ) -> Result<Self, RecordError> {
        let fields = DetectorCode::decode(code);
        let (name, class) = classify(&fields, false)?;
        Ok(Self {
            code,
            fields,
            name,
            class,
            n_samples: samples.len() as u32,
            sample_dt,
            trigger_t0,
            samples,
        })
    }

    /// A copy of this record under a new channel code, re-classified
    pub fn with_remapped_code(&self, code: u32) -> Result<Self, RecordError> {
        let fields = DetectorCode::decode(code);
        let (name, class) = classify(&fields, false)?;
        Ok(Self {
            code,
            fields,
            name,
            class,
            samples: self.samples.clone(),
            ..*self
        })
    }

    /// A copy with every adjacent pair of samples exchanged. A final unpaired sample stays
    /// in place
    pub fn with_swapped_sample_pairs(&self) -> Self {
        let mut samples = self.samples.clone();
        for pair in samples.chunks_exact_mut(2) {
            pair.swap(0, 1);
        }
        Self {
            samples,
            name: self.name.clone(),
            ..*self
        }
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn detector_type(&self) -> u32 {
        self.fields.det_type
    }

    pub fn detector_num(&self) -> u32 {
        self.fields.det_num
    }

    pub fn channel(&self) -> u32 {
        self.fields.channel
    }

    pub fn channel_name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> PulseClass {
        self.class
    }

    pub fn is_phonon(&self) -> bool {
        self.class == PulseClass::Phonon
    }

    pub fn is_charge(&self) -> bool {
        self.class == PulseClass::Charge
    }

    /// Detector channels proper, filed per detector
    pub fn is_zip(&self) -> bool {
        matches!(self.class, PulseClass::Phonon | PulseClass::Charge)
    }

    pub fn is_veto(&self) -> bool {
        self.class == PulseClass::Veto
    }

    pub fn is_noise_monitor(&self) -> bool {
        self.class == PulseClass::NoiseMonitor
    }

    pub fn is_other(&self) -> bool {
        self.class == PulseClass::Other
    }

    /// A zip channel which is a sum or cross-talk trace rather than a readout channel
    pub fn is_aggregate(&self) -> bool {
        self.is_zip() && !is_physical_channel(&self.name)
    }

    /// Sample count declared by the record
    pub fn n_samples(&self) -> u32 {
        self.n_samples
    }

    /// Sample period in ns
    pub fn sample_dt(&self) -> u32 {
        self.sample_dt
    }

    pub fn trigger_t0(&self) -> i32 {
        self.trigger_t0
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
