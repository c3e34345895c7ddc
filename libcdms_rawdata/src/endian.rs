use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;

use super::constants::{
    EVENT_SENTINEL, EVENT_SENTINEL_SWAPPED, FILE_SENTINEL, FILE_SENTINEL_SWAPPED, WORD_SIZE,
};
use super::error::RecordError;

/// Reverse the byte order of a 4-byte word. Applying it twice is the identity.
pub fn swap_word(word: u32) -> u32 {
    word.swap_bytes()
}

/// Byte order of the words in a native stream, relative to how they were read.
///
/// Resolved once per file (from the file sentinel, or the first event header for legacy
/// files) and then handed to every record decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordOrder {
    #[default]
    Unswapped,
    Swapped,
}

impl WordOrder {
    /// Resolve from the first word of a modern file header
    pub fn from_file_sentinel(word: u32) -> Option<Self> {
        match word {
            FILE_SENTINEL => Some(Self::Unswapped),
            FILE_SENTINEL_SWAPPED => Some(Self::Swapped),
            _ => None,
        }
    }

    /// Resolve from the first word of an event header
    pub fn from_event_word(word: u32) -> Option<Self> {
        if (word >> 16) == EVENT_SENTINEL {
            Some(Self::Unswapped)
        } else if (word & 0xffff) == EVENT_SENTINEL_SWAPPED {
            Some(Self::Swapped)
        } else {
            None
        }
    }

    pub fn is_swapped(&self) -> bool {
        matches!(self, Self::Swapped)
    }

    /// Bring a word read from the stream into host order
    pub fn apply(&self, word: u32) -> u32 {
        match self {
            Self::Unswapped => word,
            Self::Swapped => swap_word(word),
        }
    }
}

/// A record body read in full from the stream.
///
/// Words are kept as read; byte order is applied on access so that decoders never see a
/// raw word by accident.
#[derive(Debug, Clone, Default)]
pub struct WordBuffer {
    words: Vec<u32>,
    order: WordOrder,
}

impl WordBuffer {
    /// Read a record body of `n_bytes` bytes. A short read is an error.
    pub fn read_from<R: Read>(
        reader: &mut R,
        n_bytes: u64,
        order: WordOrder,
    ) -> Result<Self, RecordError> {
        if n_bytes % WORD_SIZE != 0 {
            return Err(RecordError::MisalignedLength(n_bytes));
        }
        let n_words = (n_bytes / WORD_SIZE) as usize;
        let mut words = vec![0u32; n_words];
        reader.read_u32_into::<LittleEndian>(&mut words)?;
        Ok(Self { words, order })
    }

    /// Build a buffer from words that are already in stream order
    pub fn from_words(words: Vec<u32>, order: WordOrder) -> Self {
        Self { words, order }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn order(&self) -> WordOrder {
        self.order
    }

    /// Word at `index` in host order
    pub fn word(&self, index: usize, record: &'static str) -> Result<u32, RecordError> {
        match self.words.get(index) {
            Some(w) => Ok(self.order.apply(*w)),
            None => Err(RecordError::ShortRecord(record, index, self.words.len())),
        }
    }

    /// Word at `index` in host order, reinterpreted as signed
    pub fn signed(&self, index: usize, record: &'static str) -> Result<i32, RecordError> {
        Ok(self.word(index, record)? as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Cursor;

    #[test]
    fn test_swap_involution() {
        for w in [0u32, 1, 0x01020304, 0xdeadbeef, u32::MAX, 0x80a9_0000] {
            assert_eq!(swap_word(swap_word(w)), w);
            assert_eq!(swap_word(swap_word(swap_word(swap_word(w)))), w);
        }
        assert_eq!(swap_word(FILE_SENTINEL), FILE_SENTINEL_SWAPPED);
    }

    #[test]
    fn test_resolve_order() {
        assert_eq!(
            WordOrder::from_file_sentinel(0x01020304),
            Some(WordOrder::Unswapped)
        );
        assert_eq!(
            WordOrder::from_file_sentinel(0x04030201),
            Some(WordOrder::Swapped)
        );
        assert_eq!(WordOrder::from_file_sentinel(0x0), None);
        assert_eq!(
            WordOrder::from_event_word(0xa980_1203),
            Some(WordOrder::Unswapped)
        );
        assert_eq!(
            WordOrder::from_event_word(swap_word(0xa980_1203)),
            Some(WordOrder::Swapped)
        );
        assert_eq!(WordOrder::from_event_word(0x1234_5678), None);
    }

    #[test]
    fn test_short_read_is_fatal() {
        let mut bytes = Vec::new();
        bytes.write_u32::<LittleEndian>(7).unwrap();
        let mut cursor = Cursor::new(bytes);
        match WordBuffer::read_from(&mut cursor, 8, WordOrder::Unswapped) {
            Err(RecordError::IOError(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof)
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_swapped_access() {
        let buffer = WordBuffer::from_words(vec![swap_word(42)], WordOrder::Swapped);
        assert_eq!(buffer.word(0, "Test").unwrap(), 42);
        assert!(matches!(
            buffer.word(1, "Test"),
            Err(RecordError::ShortRecord("Test", 1, 1))
        ));
    }
}
