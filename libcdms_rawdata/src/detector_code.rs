use std::fmt::Display;

const TYPE_SCALE: u32 = 1_000_000;
const NUMBER_SCALE: u32 = 1_000;

// Legacy (record 0x10) scheme: type*1000 + number*10 + channel
const LEGACY_TYPE_SCALE: u32 = 1_000;
const LEGACY_NUMBER_SCALE: u32 = 10;

/// The known detector types. Values are the type field of a composite code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectorType {
    Blip,
    Flip,
    Veto,
    Zip,
    MercedesZip,
    DualEndcap,
    Endcap,
    IZipSoudan,
    CdmsLiteSoudanI,
    CdmsLiteSoudanII,
    MonitorNoiseFast,
    MonitorNoiseSlow,
    ExternalTriggerUmn,
    IZipSnolab,
    HvSnolab,
    HvUmn,
    Umn5Q,
}

impl DetectorType {
    pub fn value(&self) -> u32 {
        match self {
            Self::Blip => 1,
            Self::Flip => 2,
            Self::Veto => 3,
            Self::Zip => 4,
            Self::MercedesZip => 5,
            Self::DualEndcap => 6,
            Self::Endcap => 7,
            Self::IZipSoudan => 11,
            Self::CdmsLiteSoudanI => 21,
            Self::CdmsLiteSoudanII => 22,
            Self::MonitorNoiseFast => 90,
            Self::MonitorNoiseSlow => 91,
            Self::ExternalTriggerUmn => 92,
            Self::IZipSnolab => 700,
            Self::HvSnolab => 710,
            Self::HvUmn => 1710,
            Self::Umn5Q => 800,
        }
    }

    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Blip),
            2 => Some(Self::Flip),
            3 => Some(Self::Veto),
            4 => Some(Self::Zip),
            5 => Some(Self::MercedesZip),
            6 => Some(Self::DualEndcap),
            7 => Some(Self::Endcap),
            11 => Some(Self::IZipSoudan),
            21 => Some(Self::CdmsLiteSoudanI),
            22 => Some(Self::CdmsLiteSoudanII),
            90 => Some(Self::MonitorNoiseFast),
            91 => Some(Self::MonitorNoiseSlow),
            92 => Some(Self::ExternalTriggerUmn),
            700 => Some(Self::IZipSnolab),
            710 => Some(Self::HvSnolab),
            1710 => Some(Self::HvUmn),
            800 => Some(Self::Umn5Q),
            _ => None,
        }
    }
}

pub const VETO_DET_TYPE: u32 = 3;
pub const MONITOR_NOISE_FAST_DET_TYPE: u32 = 90;
pub const MONITOR_NOISE_SLOW_DET_TYPE: u32 = 91;

pub fn is_veto_type(det_type: u32) -> bool {
    det_type == VETO_DET_TYPE
}

pub fn is_noise_monitor_type(det_type: u32) -> bool {
    det_type == MONITOR_NOISE_FAST_DET_TYPE || det_type == MONITOR_NOISE_SLOW_DET_TYPE
}

/// Generate the composite code for a channel.
///
/// Panics if the detector number or channel do not fit their three decimal digits; the
/// code scheme cannot represent them.
pub fn encode_code(det_type: u32, det_num: u32, channel: u32) -> u32 {
    assert!(
        det_num < NUMBER_SCALE && channel < NUMBER_SCALE,
        "detector number {det_num} and channel {channel} must be below {NUMBER_SCALE}"
    );
    det_type * TYPE_SCALE + det_num * NUMBER_SCALE + channel
}

/// Composite code for fields read off the wire. `None` when they do not fit the scheme
pub fn try_encode_code(det_type: u32, det_num: u32, channel: u32) -> Option<u32> {
    if det_num >= NUMBER_SCALE || channel >= NUMBER_SCALE {
        return None;
    }
    det_type
        .checked_mul(TYPE_SCALE)?
        .checked_add(det_num * NUMBER_SCALE + channel)
}

/// Composite code of channel 0 of a detector
pub fn code_base(det_type: u32, det_num: u32) -> u32 {
    encode_code(det_type, det_num, 0)
}

/// The three fields of a composite channel code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DetectorCode {
    pub det_type: u32,
    pub det_num: u32,
    pub channel: u32,
}

impl DetectorCode {
    pub fn new(det_type: u32, det_num: u32, channel: u32) -> Self {
        Self {
            det_type,
            det_num,
            channel,
        }
    }

    /// Split a composite code into its fields
    pub fn decode(code: u32) -> Self {
        Self {
            det_type: code / TYPE_SCALE,
            det_num: (code % TYPE_SCALE) / NUMBER_SCALE,
            channel: code % NUMBER_SCALE,
        }
    }

    /// Split a code using the narrow scheme of the 0x10 pulse record
    pub fn decode_legacy(code: u32) -> Self {
        let channel = code % LEGACY_NUMBER_SCALE;
        let det_num = ((code % LEGACY_TYPE_SCALE) - channel) / LEGACY_NUMBER_SCALE;
        let det_type = (code - LEGACY_NUMBER_SCALE * det_num - channel) / LEGACY_TYPE_SCALE;
        Self {
            det_type,
            det_num,
            channel,
        }
    }

    pub fn code(&self) -> u32 {
        encode_code(self.det_type, self.det_num, self.channel)
    }

    pub fn try_code(&self) -> Option<u32> {
        try_encode_code(self.det_type, self.det_num, self.channel)
    }

    pub fn base(&self) -> u32 {
        code_base(self.det_type, self.det_num)
    }
}

impl Display for DetectorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "type {} detector {} channel {}",
            self.det_type, self.det_num, self.channel
        )
    }
}
