use time::OffsetDateTime;

use super::constants::RecordKind;
use super::endian::WordBuffer;
use super::error::RecordError;

const RECORD: &str = "Admin";

// The wide layout splits the series number across two words
const SERIES_SPLICE_SCALE: u64 = 10_000;

pub const ADMIN_FIELDS: [&str; 5] = [
    "EventNumber",
    "SeriesNumber",
    "TimeBetween",
    "LiveTime",
    "EventTime",
];

/// Per-event administrative information: which series and event this is, and when it
/// happened.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdminRecord {
    series_number: u64,
    event_number: u32,
    event_time: u32,
    time_between: u32,
    live_time: u32,
    is_set: bool,
}

impl AdminRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Decode either admin layout. The layout is selected by the record kind alone.
    pub fn decode(&mut self, buffer: &WordBuffer, kind: RecordKind) -> Result<(), RecordError> {
        let first_field = match kind {
            RecordKind::Admin => {
                self.series_number = buffer.word(0, RECORD)? as u64;
                1
            }
            RecordKind::Admin64 => {
                self.series_number = buffer.word(0, RECORD)? as u64 * SERIES_SPLICE_SCALE
                    + buffer.word(1, RECORD)? as u64;
                2
            }
            _ => return Err(RecordError::UnexpectedKind(RECORD, kind.id())),
        };
        self.event_number = buffer.word(first_field, RECORD)?;
        self.event_time = buffer.word(first_field + 1, RECORD)?;
        self.time_between = buffer.word(first_field + 2, RECORD)?;
        self.live_time = buffer.word(first_field + 3, RECORD)?;
        self.is_set = true;
        Ok(())
    }

    /// Fill the record by hand, used when the wire format carries no admin record.
    ///
    /// Fails if the record was already decoded or set for this event.
    pub fn set_record(
        &mut self,
        series_number: u64,
        event_number: u32,
        time_between: u32,
        live_time: u32,
        event_time: u32,
    ) -> Result<(), RecordError> {
        if self.is_set {
            return Err(RecordError::AlreadySet(RECORD));
        }
        self.series_number = series_number;
        self.event_number = event_number;
        self.time_between = time_between;
        self.live_time = live_time;
        self.event_time = event_time;
        self.is_set = true;
        Ok(())
    }

    pub fn is_set(&self) -> bool {
        self.is_set
    }

    pub fn series_number(&self) -> u64 {
        self.series_number
    }

    pub fn event_number(&self) -> u32 {
        self.event_number
    }

    /// Unix time of the event, in seconds
    pub fn event_time(&self) -> u32 {
        self.event_time
    }

    pub fn time_between(&self) -> u32 {
        self.time_between
    }

    pub fn live_time(&self) -> u32 {
        self.live_time
    }

    /// Wall-clock time of the event. None if the stored time is not representable
    pub fn event_datetime(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(self.event_time as i64).ok()
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Result<f64, RecordError> {
        match name {
            "EventNumber" => Ok(self.event_number as f64),
            "SeriesNumber" => Ok(self.series_number as f64),
            "TimeBetween" => Ok(self.time_between as f64),
            "LiveTime" => Ok(self.live_time as f64),
            "EventTime" => Ok(self.event_time as f64),
            _ => Err(RecordError::UnknownField(name.to_string())),
        }
    }
}
