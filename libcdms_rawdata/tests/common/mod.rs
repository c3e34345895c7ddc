// Builders for synthetic raw data streams
#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};
use libcdms_rawdata::endian::swap_word;

pub const SERIES_HIGH: u32 = 110101;
pub const SERIES_LOW: u32 = 1;
pub const EVENT_TIME: u32 = 1_400_000_000;

/// A native stream, kept as words so it can be written in either byte order
pub struct NativeBuilder {
    words: Vec<u32>,
}

impl NativeBuilder {
    pub fn new() -> Self {
        Self {
            words: vec![0x0102_0304, 0],
        }
    }

    /// A file written before the byte order sentinel existed
    pub fn legacy() -> Self {
        Self {
            words: vec![0, 0, 0],
        }
    }

    pub fn config(mut self, sub_records: &[Vec<u32>]) -> Self {
        let body: Vec<u32> = sub_records.concat();
        self.words.push(0x10000);
        self.words.push((body.len() * 4) as u32);
        self.words.extend(body);
        self
    }

    pub fn event(mut self, category: u32, event_type: u32, records: &[(u32, Vec<u32>)]) -> Self {
        let length: usize = records.iter().map(|(_, body)| 8 + 4 * body.len()).sum();
        self.words
            .push(0xa980_0000 | (category << 8) | event_type);
        self.words.push(length as u32);
        for (id, body) in records {
            self.words.push(*id);
            self.words.push((body.len() * 4) as u32);
            self.words.extend(body);
        }
        self
    }

    pub fn bytes(&self, swapped: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.words.len() * 4);
        for word in &self.words {
            let word = if swapped { swap_word(*word) } else { *word };
            out.write_u32::<LittleEndian>(word).unwrap();
        }
        out
    }
}

pub fn charge_config(code: u32) -> Vec<u32> {
    vec![0x10002, 32, code, 1, 100, 3_000_000, 25, 800, 819_200, 2048]
}

pub fn admin_record(event: u32) -> (u32, Vec<u32>) {
    (
        0x02,
        vec![SERIES_HIGH, SERIES_LOW, event, EVENT_TIME, 5, 4],
    )
}

pub fn pulse_record(code: u32, samples: &[u16]) -> (u32, Vec<u32>) {
    let mut words = vec![0, 0, 0, 0, code, 0, 0, (-100i32) as u32, 800, 0, 0];
    words.push(samples.len() as u32);
    for pair in samples.chunks(2) {
        let high = pair.get(1).copied().unwrap_or(0) as u32;
        words.push(pair[0] as u32 | (high << 16));
    }
    (0x11, words)
}

/// One bank envelope: 16 byte header then the body
pub fn envelope(event_id: u16, serial: u32, timestamp: u32, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u16::<LittleEndian>(event_id).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap();
    out.write_u32::<LittleEndian>(serial).unwrap();
    out.write_u32::<LittleEndian>(timestamp).unwrap();
    out.write_u32::<LittleEndian>(body.len() as u32).unwrap();
    out.extend_from_slice(body);
    out
}

/// An envelope body holding a single 16-bit bank
pub fn bank_body(name: &[u8; 4], payload: &[u32]) -> Vec<u8> {
    let mut data = Vec::new();
    for word in payload {
        data.write_u32::<LittleEndian>(*word).unwrap();
    }
    let padded = (data.len() + 7) & !7;

    let mut body = Vec::new();
    body.write_u32::<LittleEndian>((8 + padded) as u32).unwrap();
    body.write_u32::<LittleEndian>(0).unwrap();
    body.extend_from_slice(name);
    body.write_u16::<LittleEndian>(6).unwrap();
    body.write_u16::<LittleEndian>(data.len() as u16).unwrap();
    body.extend_from_slice(&data);
    body.resize(body.len() + padded - data.len(), 0);
    body
}

/// A channel of a RevD trigger: (channel type, channel number, samples)
pub type RevDChannel = (u32, u32, Vec<u16>);

pub fn rev_d_trigger(trigger_type: u32, det_type: u32, det_num: u32, channels: &[RevDChannel]) -> Vec<u32> {
    let mut words = vec![0x5000_0000, 1, trigger_type];
    words.extend([0; 10]);
    words.push(0x3000_0001);
    words.push(0x2000_0000 | (det_type << 10) | (det_num << 2));
    words.extend([35, 0, 0]);
    words.push(channels.len() as u32);
    for (channel_type, number, samples) in channels {
        words.push(0x1000_0000 | (number << 2) | channel_type);
        words.extend([0, samples.len() as u32, 0, 0]);
        for pair in samples.chunks(2) {
            let high = pair.get(1).copied().unwrap_or(0) as u32;
            words.push(pair[0] as u32 | (high << 16));
        }
    }
    words
}

pub fn rev_d_payload(triggers: &[Vec<u32>]) -> Vec<u32> {
    let mut words = vec![0x9000_0000 | triggers.len() as u32];
    for trigger in triggers {
        words.extend(trigger);
    }
    words
}

/// Begin-of-run, one data envelope holding `payload`, end-of-run
pub fn bank_stream(run: u32, payload: &[u32]) -> Vec<u8> {
    let mut out = envelope(0x8000, run, EVENT_TIME, &[0; 8]);
    out.extend(envelope(1, 7, EVENT_TIME + 1, &bank_body(b"SCD0", payload)));
    out.extend(envelope(0x8001, run, EVENT_TIME + 2, &[0; 8]));
    out
}
