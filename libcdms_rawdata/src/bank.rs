use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::Read;

use super::constants::{
    BANK_32BIT_FLAG, BANK_BEGIN_RUN_ID, BANK_END_RUN_ID, BANK_EVENT_HEADER_SIZE,
    BANK_MAX_DATA_SIZE, WAVEFORM_BANK_NAME,
};
use super::detector_code::try_encode_code;
use super::error::BankError;
use super::pulse::PulseRecord;
use super::stream::RawStream;

// Waveform payload revisions, from the top nibble of the first word
const REV_C_NIBBLE: u32 = 0xc;
const REV_D_NIBBLE: u32 = 0x9;

// RevC readout is fixed to one detector type with six channels per DCRC
const REV_C_DETECTOR_TYPE: u32 = 4;
const REV_C_CHANNELS: u32 = 6;
const REV_C_DCRCS_PER_TOWER: u32 = 6;
const REV_C_FAST_CHANNELS: u32 = 2;
const FAST_SAMPLE_DT: u32 = 400;
const SAMPLE_DT: u32 = 800;

// RevD trigger header is 13 words long
const REV_D_TRIGGER_HEADER_WORDS: usize = 13;

/// Composite code of a bank channel, or an error if the fields do not fit
fn checked_code(det_type: u32, det_num: u32, channel: u32) -> Result<u32, BankError> {
    try_encode_code(det_type, det_num, channel)
        .ok_or(BankError::BadChannelCode(det_type, det_num, channel))
}

/// The fixed header in front of every bank envelope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub event_id: u16,
    pub trigger_mask: u16,
    pub serial_number: u32,
    pub timestamp: u32,
    pub data_size: u32,
}

impl EnvelopeHeader {
    /// Read an envelope header. Returns None if the stream is exhausted.
    pub fn read(stream: &mut RawStream) -> Result<Option<Self>, BankError> {
        if stream.remaining() == 0 {
            return Ok(None);
        }
        Ok(Some(Self {
            event_id: stream.read_u16::<LittleEndian>()?,
            trigger_mask: stream.read_u16::<LittleEndian>()?,
            serial_number: stream.read_u32::<LittleEndian>()?,
            timestamp: stream.read_u32::<LittleEndian>()?,
            data_size: stream.read_u32::<LittleEndian>()?,
        }))
    }

    pub fn is_begin_run(&self) -> bool {
        self.event_id == BANK_BEGIN_RUN_ID
    }

    pub fn is_end_run(&self) -> bool {
        self.event_id == BANK_END_RUN_ID
    }

    pub fn validate(&self) -> Result<(), BankError> {
        if self.data_size == 0 || self.data_size > BANK_MAX_DATA_SIZE {
            Err(BankError::BadDataSize(self.data_size))
        } else {
            Ok(())
        }
    }
}

/// Locate a named bank in an envelope body and return its data
pub fn find_bank<'a>(data: &'a [u8], name: &[u8; 4]) -> Result<Option<&'a [u8]>, BankError> {
    let total_words = data.len() / 4;
    let field = |pos: usize, width: usize| -> Result<u32, BankError> {
        let bytes = data
            .get(pos..pos + width)
            .ok_or(BankError::Truncated(pos / 4, total_words))?;
        Ok(match width {
            2 => LittleEndian::read_u16(bytes) as u32,
            _ => LittleEndian::read_u32(bytes),
        })
    };

    let body_size = field(0, 4)? as usize;
    let is_32bit = field(4, 4)? & BANK_32BIT_FLAG != 0;
    let (header_size, width) = if is_32bit { (12, 4) } else { (8, 2) };
    let end = (body_size + 8).min(data.len());

    let mut pos = 8;
    while pos < end {
        let bank_name = data
            .get(pos..pos + 4)
            .ok_or(BankError::Truncated(pos / 4, total_words))?;
        let size = field(pos + 4 + width, width)? as usize;
        let start = pos + header_size;
        if start + size > data.len() {
            return Err(BankError::Truncated((start + size) / 4, total_words));
        }
        if bank_name == name {
            return Ok(Some(&data[start..start + size]));
        }
        pos = start + ((size + 7) & !7);
    }
    Ok(None)
}

/// One logical trigger of an envelope and the pulses it read out
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BankTrigger {
    pub category: u32,
    pub pulses: Vec<PulseRecord>,
}

impl BankTrigger {
    /// A stale trigger carries no samples at all
    pub fn is_stale(&self) -> bool {
        self.pulses.iter().all(|pulse| pulse.is_empty())
    }
}

/// Word view of a waveform bank payload
struct Payload {
    words: Vec<u32>,
}

impl Payload {
    fn new(data: &[u8]) -> Self {
        Self {
            words: data.chunks_exact(4).map(LittleEndian::read_u32).collect(),
        }
    }

    fn at(&self, idx: usize) -> Result<u32, BankError> {
        self.words
            .get(idx)
            .copied()
            .ok_or(BankError::Truncated(idx, self.words.len()))
    }

    fn expect_marker(
        &self,
        idx: usize,
        mask: u32,
        value: u32,
        what: &'static str,
    ) -> Result<u32, BankError> {
        let word = self.at(idx)?;
        if word & mask != value {
            return Err(BankError::BadMarker(what, idx, word));
        }
        Ok(word)
    }

    /// Unpack `n_samples` 16-bit samples starting at `idx`, low half first
    fn samples(&self, idx: usize, n_samples: usize) -> Result<Vec<u16>, BankError> {
        let n_words = n_samples.div_ceil(2);
        let end = idx.saturating_add(n_words);
        if end > self.words.len() {
            return Err(BankError::Truncated(end, self.words.len()));
        }
        let mut samples = Vec::with_capacity(n_samples + 1);
        for offset in 0..n_samples.div_ceil(2) {
            let word = self.at(idx + offset)?;
            samples.push((word & 0xffff) as u16);
            samples.push((word >> 16) as u16);
        }
        samples.truncate(n_samples);
        Ok(samples)
    }
}

/// Decode the waveform bank of an envelope into its triggers
pub fn parse_waveform_bank(data: &[u8]) -> Result<Vec<BankTrigger>, BankError> {
    let payload = Payload::new(data);
    let first = payload.at(0)?;
    match first >> 28 {
        REV_C_NIBBLE => parse_rev_c(&payload),
        REV_D_NIBBLE => parse_rev_d(&payload),
        _ => Err(BankError::UnknownRevision(first)),
    }
}

fn parse_rev_c(payload: &Payload) -> Result<Vec<BankTrigger>, BankError> {
    let n_records = payload.at(0)? & 0x0fff_ffff;
    // Records of the same trigger share (tower, dcrc, trigger word)
    let mut keys: Vec<(u32, u32, u32)> = Vec::new();
    let mut triggers: Vec<BankTrigger> = Vec::new();

    let mut idx = 1;
    for _ in 0..n_records {
        payload.expect_marker(idx, 0xc000_0000, 0x4000_0000, "trigger")?;
        let source = payload.at(idx + 1)?;
        let key = (
            (source & 0xffff) / 8,
            (source & 0xffff) % 8,
            payload.at(idx + 2)?,
        );
        let category = (source >> 20) & 0x1;
        let trigger_idx = match keys.iter().position(|k| *k == key) {
            Some(existing) => existing,
            None => {
                keys.push(key);
                triggers.push(BankTrigger {
                    category,
                    pulses: Vec::new(),
                });
                triggers.len() - 1
            }
        };
        idx += 3;

        let location = payload.expect_marker(idx, 0xe000_0000, 0x2000_0000, "detector")?;
        let tower = (location & 0xffff) / 8;
        let dcrc = (location & 0xffff) % 8;
        let det_num = (dcrc + REV_C_DCRCS_PER_TOWER * tower).saturating_sub(REV_C_DCRCS_PER_TOWER);
        idx += 1;

        let mut is_stale = false;
        let mut pulses = Vec::with_capacity(REV_C_CHANNELS as usize);
        for channel in 0..REV_C_CHANNELS {
            let channel_word = payload.at(idx)?;
            if channel_word & 0xc000_0000 != 0 || (channel_word >> 16) & 0x7 != channel {
                spdlog::warn!(
                    "RevC channel word {:#010x} at {} does not match channel {}",
                    channel_word,
                    idx,
                    channel
                );
            }
            let n_words = (channel_word & 0xffff) as usize;
            if n_words == 0 {
                is_stale = true;
            }
            let samples = payload.samples(idx + 1, n_words * 2)?;
            idx += 1 + n_words;

            let dt = if channel < REV_C_FAST_CHANNELS {
                FAST_SAMPLE_DT
            } else {
                SAMPLE_DT
            };
            let code = checked_code(REV_C_DETECTOR_TYPE, det_num, channel)?;
            pulses.push(PulseRecord::from_raw(code, samples, dt, 0)?);
        }

        let trigger = &mut triggers[trigger_idx];
        if is_stale {
            trigger.pulses.clear();
        } else {
            trigger.pulses.extend(pulses);
        }
    }
    Ok(triggers)
}

fn parse_rev_d(payload: &Payload) -> Result<Vec<BankTrigger>, BankError> {
    let n_triggers = payload.at(0)? & 0xfff;
    let mut triggers = Vec::with_capacity(n_triggers as usize);

    let mut idx = 1;
    for _ in 0..n_triggers {
        payload.expect_marker(idx, 0xf000_0000, 0x5000_0000, "trigger")?;
        let trigger_type = payload.at(idx + 2)?;
        let category = match trigger_type {
            2..=5 => 1,
            other => other,
        };
        idx += REV_D_TRIGGER_HEADER_WORDS;

        let n_detectors = payload.expect_marker(idx, 0xf000_0000, 0x3000_0000, "detector count")?
            & 0x0fff_ffff;
        idx += 1;

        let mut pulses = Vec::new();
        for _ in 0..n_detectors {
            let det_word = payload.expect_marker(idx, 0xe000_0000, 0x2000_0000, "detector")?;
            let det_num = (det_word & 0x3fc) >> 2;
            let det_type = (det_word & 0x03ff_fc00) >> 10;
            idx += 1;

            let dcrc_version = payload.at(idx)? & 0xff;
            let n_charge = match dcrc_version {
                30..=39 => 2,
                40..=49 => 4,
                _ => 0,
            };
            idx += 3;
            let n_channels = payload.at(idx)? & 0x0fff_ffff;
            idx += 1;

            for _ in 0..n_channels {
                let channel_word = payload.at(idx)?;
                if channel_word & 0xf000_0000 != 0x1000_0000 {
                    spdlog::warn!(
                        "RevD channel word {:#010x} at {} is missing its marker",
                        channel_word,
                        idx
                    );
                }
                let channel_type = channel_word & 0x3;
                let channel_number = (channel_word & 0x3c) >> 2;
                let (pre, on, post) = (payload.at(idx + 1)?, payload.at(idx + 2)?, payload.at(idx + 3)?);
                let n_samples = pre
                    .checked_add(on)
                    .and_then(|n| n.checked_add(post))
                    .ok_or(BankError::SampleCountOverflow(idx))? as usize;
                let samples = payload.samples(idx + 5, n_samples)?;
                idx += 5 + n_samples.div_ceil(2);

                let channel = if channel_type == 0 {
                    channel_number
                } else {
                    n_charge + channel_number
                };
                let code = checked_code(det_type, det_num, channel)?;
                pulses.push(PulseRecord::from_raw(code, samples, SAMPLE_DT, 0)?);
            }
        }
        triggers.push(BankTrigger { category, pulses });
    }
    Ok(triggers)
}

/// A fully read envelope
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    pub header: EnvelopeHeader,
    pub triggers: Vec<BankTrigger>,
}

/// The trigger handed to the reader for one event
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    pub category: u32,
    pub timestamp: u32,
    pub pulses: Vec<PulseRecord>,
}

/// Position and trigger bookkeeping for the bank format.
///
/// Each envelope may hold several triggers and every trigger is one event. Triggers are
/// counted from 1 within the current envelope; 0 means no trigger has been taken yet.
#[derive(Debug, Clone, Default)]
pub struct BankNavigator {
    envelope: Envelope,
    current_trigger: usize,
    run_serial: u32,
    current_event_position: u64,
    next_event_position: u64,
    event_length: u64,
}

impl BankNavigator {
    /// Read the begin-of-run envelope at the start of the stream.
    ///
    /// Returns None if the stream does not start with one, so the caller can report the
    /// file as unrecognized.
    pub fn open(stream: &mut RawStream) -> Result<Option<Self>, BankError> {
        if stream.remaining() < BANK_EVENT_HEADER_SIZE {
            return Ok(None);
        }
        let header = match EnvelopeHeader::read(stream)? {
            Some(header) if header.is_begin_run() => header,
            _ => return Ok(None),
        };
        header.validate()?;
        let mut nav = Self {
            run_serial: header.serial_number,
            ..Default::default()
        };
        nav.track(stream, &header);
        stream.seek_to(nav.next_event_position);
        spdlog::info!(
            "Found begin-of-run bank envelope for run {}",
            header.serial_number
        );
        Ok(Some(nav))
    }

    fn track(&mut self, stream: &RawStream, header: &EnvelopeHeader) {
        self.current_event_position = stream.tell();
        self.event_length = header.data_size as u64;
        self.next_event_position = self.current_event_position + self.event_length;
    }

    /// Read the next envelope. Returns None at the end-of-run envelope or the stream end.
    pub fn read_envelope(&mut self, stream: &mut RawStream) -> Result<Option<Envelope>, BankError> {
        let header = match EnvelopeHeader::read(stream)? {
            Some(header) => header,
            None => return Ok(None),
        };
        header.validate()?;
        self.track(stream, &header);

        let mut body = vec![0u8; header.data_size as usize];
        stream.read_exact(&mut body)?;

        if header.is_end_run() {
            spdlog::info!("Reached end-of-run bank envelope for run {}", header.serial_number);
            return Ok(None);
        }
        if header.is_begin_run() {
            return Ok(Some(Envelope {
                header,
                triggers: Vec::new(),
            }));
        }

        let triggers = match find_bank(&body, WAVEFORM_BANK_NAME)? {
            Some(data) => parse_waveform_bank(data)?,
            None => {
                spdlog::debug!("Envelope {} has no waveform bank", header.serial_number);
                Vec::new()
            }
        };
        Ok(Some(Envelope { header, triggers }))
    }

    /// Load envelopes until one carries triggers. Returns false at the end of the stream.
    fn load_envelope(&mut self, stream: &mut RawStream) -> Result<bool, BankError> {
        loop {
            match self.read_envelope(stream)? {
                None => return Ok(false),
                Some(envelope) if envelope.triggers.is_empty() => continue,
                Some(envelope) => {
                    self.envelope = envelope;
                    self.current_trigger = 1;
                    return Ok(true);
                }
            }
        }
    }

    fn n_triggers(&self) -> usize {
        self.envelope.triggers.len()
    }

    /// Move to the next trigger, reading envelopes as needed
    fn advance(&mut self, stream: &mut RawStream) -> Result<bool, BankError> {
        self.current_trigger += 1;
        if self.current_trigger == 1 || self.current_trigger > self.n_triggers() {
            return self.load_envelope(stream);
        }
        Ok(true)
    }

    /// Take the next non-stale trigger.
    ///
    /// If every remaining trigger of the envelope is stale the last one is returned with
    /// no pulses. Returns None at the end of the stream.
    pub fn next_trigger(&mut self, stream: &mut RawStream) -> Result<Option<TriggerEvent>, BankError> {
        if !self.advance(stream)? {
            return Ok(None);
        }
        while self.envelope.triggers[self.current_trigger - 1].is_stale() {
            spdlog::warn!(
                "Skipping stale trigger {} of envelope {}",
                self.current_trigger,
                self.envelope.header.serial_number
            );
            if self.current_trigger >= self.n_triggers() {
                let trigger = &self.envelope.triggers[self.current_trigger - 1];
                return Ok(Some(TriggerEvent {
                    category: trigger.category,
                    timestamp: self.envelope.header.timestamp,
                    pulses: Vec::new(),
                }));
            }
            self.current_trigger += 1;
        }
        let trigger = &mut self.envelope.triggers[self.current_trigger - 1];
        Ok(Some(TriggerEvent {
            category: trigger.category,
            timestamp: self.envelope.header.timestamp,
            pulses: std::mem::take(&mut trigger.pulses),
        }))
    }

    /// Pass over up to `n` events, stepping past stale triggers as `next_trigger` does.
    /// Returns how many were passed, which is less than `n` only if the stream ended.
    pub fn skip_events(&mut self, stream: &mut RawStream, n: usize) -> Result<usize, BankError> {
        for skipped in 0..n {
            if self.next_trigger(stream)?.is_none() {
                return Ok(skipped);
            }
        }
        Ok(n)
    }

    /// Serial number of the begin-of-run envelope
    pub fn run_serial(&self) -> u32 {
        self.run_serial
    }

    pub fn current_trigger(&self) -> usize {
        self.current_trigger
    }

    pub fn current_event_position(&self) -> u64 {
        self.current_event_position
    }

    pub fn next_event_position(&self) -> u64 {
        self.next_event_position
    }

    pub fn event_length(&self) -> u64 {
        self.event_length
    }
}
