// Wire-level constants of the native and bank formats. These values are a contract with
// the DAQ and must never be renumbered.

/// All native records are built from 4-byte words
pub const WORD_SIZE: u64 = 4;

/// Value every per-event field is reset to
pub const EMPTY_VALUE: i64 = -999_999;
pub const EMPTY_VALUE_F64: f64 = -999_999.0;

// File level sentinels
pub const FILE_SENTINEL: u32 = 0x01020304;
pub const FILE_SENTINEL_SWAPPED: u32 = 0x04030201;
pub const LEGACY_FILE_MARKER: u32 = 0x0;

// Event header sentinel, stored in the upper half of the first header word
pub const EVENT_SENTINEL: u32 = 0xa980;
pub const EVENT_SENTINEL_SWAPPED: u32 = 0x80a9;

// Detector configuration sub-record sizes, in words following the length word
pub const PHONON_CONFIG_RECORD_WORDS: u32 = 11;
pub const CHARGE_CONFIG_RECORD_WORDS: u32 = 8;

/// The veto history is flagged as overflowed when it reports this many entries
pub const VETO_BUFFER_OVERFLOW: i32 = 16129;

pub const SOUDAN_ZIPS_PER_TOWER: usize = 6;
pub const DIBS_PER_TOWER: usize = 6;
pub const BITS_PER_DIB: usize = 5;

// Bank format
pub const BANK_EVENT_HEADER_SIZE: u64 = 16;
pub const BANK_BEGIN_RUN_ID: u16 = 0x8000;
pub const BANK_END_RUN_ID: u16 = 0x8001;
pub const BANK_MAX_DATA_SIZE: u32 = 500 * 1024 * 1024;
pub const BANK_32BIT_FLAG: u32 = 1 << 4;
pub const WAVEFORM_BANK_NAME: &[u8; 4] = b"SCD0";

/// Unit size of each bank data type, indexed by type id
pub const BANK_TYPE_SIZE: [u32; 17] = [0, 1, 1, 1, 2, 2, 4, 4, 4, 4, 8, 1, 0, 0, 0, 0, 0];

/// Identifier of each record kind found in the native stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Admin,
    Admin64,
    Pulse,
    PulseExpandedCode,
    SufHistory,
    SoudanHistory,
    VetoAdc,
    External,
    Trigger,
    TlbTriggerMask,
    DetectorConfig,
    PhononConfig,
    ChargeConfig,
}

impl RecordKind {
    pub const ALL: [RecordKind; 13] = [
        RecordKind::Admin,
        RecordKind::Admin64,
        RecordKind::Pulse,
        RecordKind::PulseExpandedCode,
        RecordKind::SufHistory,
        RecordKind::SoudanHistory,
        RecordKind::VetoAdc,
        RecordKind::External,
        RecordKind::Trigger,
        RecordKind::TlbTriggerMask,
        RecordKind::DetectorConfig,
        RecordKind::PhononConfig,
        RecordKind::ChargeConfig,
    ];

    /// The wire identifier of the record
    pub fn id(&self) -> u32 {
        match self {
            Self::Admin => 0x01,
            Self::Admin64 => 0x02,
            Self::Pulse => 0x10,
            Self::PulseExpandedCode => 0x11,
            Self::SufHistory => 0x20,
            Self::SoudanHistory => 0x21,
            Self::VetoAdc => 0x40,
            Self::External => 0x60,
            Self::Trigger => 0x80,
            Self::TlbTriggerMask => 0x81,
            Self::DetectorConfig => 0x10000,
            Self::PhononConfig => 0x10001,
            Self::ChargeConfig => 0x10002,
        }
    }

    /// Look up a kind from its wire identifier. Returns None for unknown identifiers
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.id() == id)
    }

    /// Dense index used by the record selection bit-set
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Admin64 => "Admin64",
            Self::Pulse => "Pulse",
            Self::PulseExpandedCode => "PulseExpandedCode",
            Self::SufHistory => "SUFHistory",
            Self::SoudanHistory => "SoudanHistory",
            Self::VetoAdc => "VetoADC",
            Self::External => "External",
            Self::Trigger => "Trigger",
            Self::TlbTriggerMask => "TLBTriggerMask",
            Self::DetectorConfig => "DetectorConfig",
            Self::PhononConfig => "PhononConfig",
            Self::ChargeConfig => "ChargeConfig",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_ids_are_unique() {
        for kind in RecordKind::ALL {
            assert_eq!(RecordKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(RecordKind::from_id(0x12345), None);
        assert_eq!(RecordKind::DetectorConfig.id(), 0x10000);
    }
}
