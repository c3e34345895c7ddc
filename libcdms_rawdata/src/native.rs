use byteorder::{LittleEndian, ReadBytesExt};

use super::constants::{RecordKind, FILE_SENTINEL, FILE_SENTINEL_SWAPPED, LEGACY_FILE_MARKER};
use super::detector_config::DetectorConfigData;
use super::endian::{WordBuffer, WordOrder};
use super::error::RawDataReaderError;
use super::stream::RawStream;

const HEADER_BYTES: u64 = 8;

/// Read a two word header at the current position.
///
/// Returns None when the stream is exhausted. A partial header is an error.
pub fn read_header_words(
    stream: &mut RawStream,
    what: &'static str,
) -> Result<Option<[u32; 2]>, RawDataReaderError> {
    let remaining = stream.remaining();
    if remaining == 0 {
        return Ok(None);
    }
    if remaining < HEADER_BYTES {
        return Err(RawDataReaderError::TruncatedHeader(what));
    }
    let first = stream.read_u32::<LittleEndian>()?;
    let second = stream.read_u32::<LittleEndian>()?;
    Ok(Some([first, second]))
}

/// Whether the first word of a file belongs to the native format
pub fn is_native_file_word(word: u32) -> bool {
    matches!(word, FILE_SENTINEL | FILE_SENTINEL_SWAPPED | LEGACY_FILE_MARKER)
}

/// Header of a native event, with byte order already applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    pub category: u32,
    pub event_type: u32,
    pub length: u64,
}

impl EventHeader {
    /// Parse the two header words. The first word also decides the byte order.
    pub fn parse(words: [u32; 2]) -> Result<(Self, WordOrder), RawDataReaderError> {
        let order = WordOrder::from_event_word(words[0])
            .ok_or(RawDataReaderError::BadEventSentinel(words[0]))?;
        let tag = order.apply(words[0]);
        let length = order.apply(words[1]) as u64;
        if length % super::constants::WORD_SIZE != 0 {
            return Err(RawDataReaderError::BadEventLength(length));
        }
        Ok((
            Self {
                category: (tag & 0x0f00) >> 8,
                event_type: tag & 0x00ff,
                length,
            },
            order,
        ))
    }
}

/// Header of one record inside an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub id: u32,
    pub length: u64,
}

impl RecordHeader {
    pub fn kind(&self) -> Option<RecordKind> {
        RecordKind::from_id(self.id)
    }
}

/// Position bookkeeping for the native stream.
///
/// All positions are absolute byte offsets into the decoded stream. A next event position
/// of 0 means no event header has been read yet.
#[derive(Debug, Clone, Default)]
pub struct NativeNavigator {
    order: WordOrder,
    is_legacy: bool,
    current_event_position: u64,
    next_event_position: u64,
    event_length: u64,
    current_record_position: u64,
    next_record_header_position: u64,
}

impl NativeNavigator {
    /// Finish reading the file header whose first two words were already consumed.
    ///
    /// If the next record is a detector configuration it is decoded into `config` when
    /// requested and skipped otherwise. If not, the stream is rewound to the peeked words.
    pub fn read_file_header(
        stream: &mut RawStream,
        header: [u32; 2],
        config: Option<&mut DetectorConfigData>,
    ) -> Result<Self, RawDataReaderError> {
        let mut nav = Self::default();
        match WordOrder::from_file_sentinel(header[0]) {
            Some(order) => nav.order = order,
            None if header[0] == LEGACY_FILE_MARKER => {
                // Older files carry one more header word and no byte order sentinel
                let extra = stream.read_u32::<LittleEndian>()?;
                spdlog::info!("Detected legacy native file header, extra word {:#x}", extra);
                nav.is_legacy = true;
                return Ok(nav);
            }
            None => {
                return Err(RawDataReaderError::UnrecognizedFileHeader(
                    header[0], header[1],
                ))
            }
        }
        spdlog::debug!(
            "Native file header {:#x} {:#x}, word order {:?}",
            header[0],
            header[1],
            nav.order
        );

        let start = stream.tell();
        let next = match read_header_words(stream, "file")? {
            Some(words) => words,
            None => return Ok(nav),
        };
        let id = nav.order.apply(next[0]);
        if id == RecordKind::DetectorConfig.id() {
            let length = nav.order.apply(next[1]) as u64;
            match config {
                Some(config) => {
                    let buffer = WordBuffer::read_from(stream, length, nav.order)?;
                    config.decode(&buffer)?;
                }
                None => stream.seek_to(stream.tell() + length),
            }
        } else {
            stream.seek_to(start);
        }
        Ok(nav)
    }

    /// Read the next event header. Returns None at the end of the stream.
    pub fn read_event_header(
        &mut self,
        stream: &mut RawStream,
    ) -> Result<Option<EventHeader>, RawDataReaderError> {
        if self.next_event_position != 0 {
            stream.seek_to(self.next_event_position);
        }
        let words = match read_header_words(stream, "event")? {
            Some(words) => words,
            None => return Ok(None),
        };
        let (header, order) = EventHeader::parse(words)?;
        self.order = order;
        self.is_legacy = false;

        self.event_length = header.length;
        self.current_event_position = stream.tell();
        self.next_event_position = self.current_event_position + header.length;
        self.next_record_header_position = self.current_event_position;
        Ok(Some(header))
    }

    /// Whether another record header lies inside the current event
    pub fn has_next_record(&self) -> bool {
        self.next_record_header_position < self.next_event_position
    }

    /// Read the header of the next record in the current event, leaving the stream at the
    /// start of the record body
    pub fn read_record_header(
        &mut self,
        stream: &mut RawStream,
    ) -> Result<RecordHeader, RawDataReaderError> {
        stream.seek_to(self.next_record_header_position);
        let words = read_header_words(stream, "record")?
            .ok_or(RawDataReaderError::TruncatedHeader("record"))?;
        let header = RecordHeader {
            id: self.order.apply(words[0]),
            length: self.order.apply(words[1]) as u64,
        };
        self.current_record_position = stream.tell();
        self.next_record_header_position = self.current_record_position + header.length;
        if self.next_record_header_position > self.next_event_position {
            return Err(RawDataReaderError::RecordCrossesEvent(
                self.next_record_header_position,
                self.next_event_position,
            ));
        }
        Ok(header)
    }

    /// Read the body of the record whose header was just read
    pub fn read_record_body(
        &self,
        stream: &mut RawStream,
        header: &RecordHeader,
    ) -> Result<WordBuffer, RawDataReaderError> {
        stream.seek_to(self.current_record_position);
        Ok(WordBuffer::read_from(stream, header.length, self.order)?)
    }

    pub fn word_order(&self) -> WordOrder {
        self.order
    }

    /// True until the first event header of a legacy file resolved the byte order
    pub fn is_order_pending(&self) -> bool {
        self.is_legacy
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

    pub fn current_record_position(&self) -> u64 {
        self.current_record_position
    }

    pub fn next_record_header_position(&self) -> u64 {
        self.next_record_header_position
    }
}
