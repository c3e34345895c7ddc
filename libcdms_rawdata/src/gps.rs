use super::constants::EMPTY_VALUE;
use super::endian::WordBuffer;
use super::error::RecordError;

const RECORD: &str = "External";

pub const GPS_FIELDS: [&str; 7] = [
    "GPS_y",
    "GPS_d",
    "GPS_h",
    "GPS_m",
    "GPS_s",
    "GPS_ticks",
    "GPS_status",
];

/// Decode `n_digits` binary coded decimal digits, least significant nibble first
fn decode_bcd(value: u32, n_digits: u32) -> i64 {
    let mut result: i64 = 0;
    let mut scale: i64 = 1;
    for digit in 0..n_digits {
        result += ((value >> (4 * digit)) & 0xf) as i64 * scale;
        scale *= 10;
    }
    result
}

/// GPS time stamp of an event from the external timing record
#[derive(Debug, Clone, PartialEq)]
pub struct GpsRecord {
    pub year: i64,
    pub day: i64,
    pub hour: i64,
    pub minute: i64,
    pub second: i64,
    pub ticks: i64,
    pub status: i64,
}

impl Default for GpsRecord {
    fn default() -> Self {
        Self {
            year: EMPTY_VALUE,
            day: EMPTY_VALUE,
            hour: EMPTY_VALUE,
            minute: EMPTY_VALUE,
            second: EMPTY_VALUE,
            ticks: EMPTY_VALUE,
            status: EMPTY_VALUE,
        }
    }
}

impl GpsRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn decode(&mut self, buffer: &WordBuffer) -> Result<(), RecordError> {
        let date = buffer.word(0, RECORD)?;
        let clock = buffer.word(1, RECORD)?;
        let ticks = buffer.word(2, RECORD)?;

        self.year = decode_bcd(date >> 16, 4);
        self.day = decode_bcd(date & 0xffff, 4);
        self.status = ((clock & 0xf000_0000) >> 28) as i64;
        self.hour = decode_bcd((clock >> 16) & 0xff, 2);
        self.minute = decode_bcd((clock >> 8) & 0xff, 2);
        self.second = decode_bcd(clock & 0xff, 2);
        self.ticks = decode_bcd(ticks, 8);
        Ok(())
    }

    pub fn field(&self, name: &str) -> Result<f64, RecordError> {
        let value = match name {
            "GPS_y" => self.year,
            "GPS_d" => self.day,
            "GPS_h" => self.hour,
            "GPS_m" => self.minute,
            "GPS_s" => self.second,
            "GPS_ticks" => self.ticks,
            "GPS_status" => self.status,
            _ => return Err(RecordError::UnknownField(name.to_string())),
        };
        Ok(value as f64)
    }
}
