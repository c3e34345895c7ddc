// Channel naming for every supported detector type. The tables are dictated by the raw
// data format: the position of a name in `all` is the channel field of the composite code.
//
// Noise monitors have no table. Their names are generated from the channel number and
// they never get the synthetic (summed) indices.
use super::detector_code::{
    is_noise_monitor_type, DetectorCode, MONITOR_NOISE_FAST_DET_TYPE, MONITOR_NOISE_SLOW_DET_TYPE,
};
use super::error::ChannelMapError;

/// Ordered channel name lists of one detector type
#[derive(Debug, PartialEq, Eq)]
pub struct ChannelTable {
    pub all: &'static [&'static str],
    pub phonon: &'static [&'static str],
    pub charge: &'static [&'static str],
    pub cross_talk: &'static [&'static str],
}

static BLIP: ChannelTable = ChannelTable {
    all: &["QI", "QO", "PS1", "PS2"],
    phonon: &["PS1", "PS2"],
    charge: &["QI", "QO"],
    cross_talk: &["QIX", "QOX"],
};

static ZIP_FLIP: ChannelTable = ChannelTable {
    all: &["QI", "QO", "PA", "PB", "PC", "PD"],
    phonon: &["PA", "PB", "PC", "PD"],
    charge: &["QI", "QO"],
    cross_talk: &["QIX", "QOX"],
};

static ENDCAP: ChannelTable = ChannelTable {
    all: &["Q", "PA", "PB"],
    phonon: &["PA", "PB"],
    charge: &["Q"],
    cross_talk: &[],
};

static IZIP_SOUDAN: ChannelTable = ChannelTable {
    all: &[
        "QIS1", "QOS1", "PAS1", "PBS1", "PCS1", "PDS1", "QIS2", "QOS2", "PAS2", "PBS2", "PCS2",
        "PDS2",
    ],
    phonon: &[
        "PAS1", "PBS1", "PCS1", "PDS1", "PAS2", "PBS2", "PCS2", "PDS2",
    ],
    charge: &["QIS1", "QOS1", "QIS2", "QOS2"],
    cross_talk: &["QIS1X", "QOS1X", "QIS2X", "QOS2X"],
};

static IZIP_SNOLAB: ChannelTable = ChannelTable {
    all: &[
        "QIS1", "QOS1", "QIS2", "QOS2", "PAS1", "PBS1", "PCS1", "PDS1", "PES1", "PFS1", "PAS2",
        "PBS2", "PCS2", "PDS2", "PES2", "PFS2",
    ],
    phonon: &[
        "PAS1", "PBS1", "PCS1", "PDS1", "PES1", "PFS1", "PAS2", "PBS2", "PCS2", "PDS2", "PES2",
        "PFS2",
    ],
    charge: &["QIS1", "QOS1", "QIS2", "QOS2"],
    cross_talk: &["QIS1X", "QOS1X", "QIS2X", "QOS2X"],
};

static HV_SNOLAB: ChannelTable = ChannelTable {
    all: &[
        "PAS1", "PBS1", "PCS1", "PDS1", "PES1", "PFS1", "PAS2", "PBS2", "PCS2", "PDS2", "PES2",
        "PFS2",
    ],
    phonon: &[
        "PAS1", "PBS1", "PCS1", "PDS1", "PES1", "PFS1", "PAS2", "PBS2", "PCS2", "PDS2", "PES2",
        "PFS2",
    ],
    charge: &[],
    cross_talk: &[],
};

static HV_UMN: ChannelTable = ChannelTable {
    all: &["PA", "PB", "PC", "PD", "PE", "PF"],
    phonon: &["PA", "PB", "PC", "PD", "PE", "PF"],
    charge: &[],
    cross_talk: &[],
};

static EXTERNAL_TRIGGER_UMN: ChannelTable = ChannelTable {
    all: &["P"],
    phonon: &["P"],
    charge: &[],
    cross_talk: &[],
};

static UMN_5Q: ChannelTable = ChannelTable {
    all: &["QA", "QB", "QC", "QD", "QE"],
    phonon: &[],
    charge: &["QA", "QB", "QC", "QD", "QE"],
    cross_talk: &["QAX", "QBX", "QCX", "QDX", "QEX"],
};

static NOISE_MONITOR: ChannelTable = ChannelTable {
    all: &[],
    phonon: &[],
    charge: &[],
    cross_talk: &[],
};

/// Get the channel table of a detector type
pub fn channel_table(det_type: u32) -> Result<&'static ChannelTable, ChannelMapError> {
    match det_type {
        1 => Ok(&BLIP),
        2 | 4 | 5 | 6 | 21 => Ok(&ZIP_FLIP),
        7 => Ok(&ENDCAP),
        11 => Ok(&IZIP_SOUDAN),
        90 | 91 => Ok(&NOISE_MONITOR),
        92 => Ok(&EXTERNAL_TRIGGER_UMN),
        700 => Ok(&IZIP_SNOLAB),
        710 => Ok(&HV_SNOLAB),
        800 => Ok(&UMN_5Q),
        1710 => Ok(&HV_UMN),
        _ => Err(ChannelMapError::UnknownDetectorType(det_type)),
    }
}

/// Whether a detector type has channel names at all
pub fn has_channel_table(det_type: u32) -> bool {
    channel_table(det_type).is_ok()
}

/// Phonon-like or charge-like, decided by the first letter of the name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Phonon,
    Charge,
}

impl ChannelKind {
    pub fn of(name: &str) -> Result<Self, ChannelMapError> {
        match name.as_bytes().first() {
            Some(b'P') => Ok(Self::Phonon),
            Some(b'Q') => Ok(Self::Charge),
            _ => Err(ChannelMapError::UnknownChannelKind(name.to_string())),
        }
    }

    /// First letter shared by all channel names of this kind
    pub fn name_base(&self) -> &'static str {
        match self {
            Self::Phonon => "P",
            Self::Charge => "Q",
        }
    }
}

/// Number of physical channels of a detector type
pub fn n_all_channels(det_type: u32) -> Result<u32, ChannelMapError> {
    Ok(channel_table(det_type)?.all.len() as u32)
}

pub fn n_phonon_channels(det_type: u32) -> Result<u32, ChannelMapError> {
    Ok(channel_table(det_type)?.phonon.len() as u32)
}

pub fn n_charge_channels(det_type: u32) -> Result<u32, ChannelMapError> {
    Ok(channel_table(det_type)?.charge.len() as u32)
}

pub fn n_cross_talk_channels(det_type: u32) -> Result<u32, ChannelMapError> {
    Ok(channel_table(det_type)?.cross_talk.len() as u32)
}

// Synthetic channels sit directly after the last physical channel

/// Index of the summed charge trace
pub fn qt_index(det_type: u32) -> Result<u32, ChannelMapError> {
    n_all_channels(det_type)
}

/// Index of the summed phonon trace
pub fn pt_index(det_type: u32) -> Result<u32, ChannelMapError> {
    Ok(n_all_channels(det_type)? + 1)
}

/// Index of the side 1 phonon sum
pub fn ps1_index(det_type: u32) -> Result<u32, ChannelMapError> {
    Ok(n_all_channels(det_type)? + 2)
}

/// Index of the side 2 phonon sum
pub fn ps2_index(det_type: u32) -> Result<u32, ChannelMapError> {
    Ok(n_all_channels(det_type)? + 3)
}

/// Name of a channel, physical or synthetic
pub fn channel_name(det_type: u32, channel: u32) -> Result<String, ChannelMapError> {
    let table = channel_table(det_type)?;
    if det_type == MONITOR_NOISE_FAST_DET_TYPE {
        return Ok(format!("NFast{}", channel + 1));
    } else if det_type == MONITOR_NOISE_SLOW_DET_TYPE {
        return Ok(format!("NSlow{}", channel + 1));
    }

    let n_all = table.all.len() as u32;
    match channel {
        c if c < n_all => Ok(table.all[c as usize].to_string()),
        c if c == n_all => Ok(String::from("QT")),
        c if c == n_all + 1 => Ok(String::from("PT")),
        c if c == n_all + 2 => Ok(String::from("PS1")),
        c if c == n_all + 3 => Ok(String::from("PS2")),
        _ => Err(ChannelMapError::ChannelOutOfRange(det_type, channel)),
    }
}

/// Name of the channel a composite code points at
pub fn channel_name_from_code(code: u32) -> Result<String, ChannelMapError> {
    let fields = DetectorCode::decode(code);
    channel_name(fields.det_type, fields.channel)
}

/// Position of a name within its phonon or charge list
pub fn channel_index_by_kind(det_type: u32, name: &str) -> Result<u32, ChannelMapError> {
    let table = channel_table(det_type)?;
    let list = match ChannelKind::of(name)? {
        ChannelKind::Phonon => table.phonon,
        ChannelKind::Charge => table.charge,
    };
    position_of(list, det_type, name)
}

/// Position of a name within the list of every physical channel
pub fn channel_overall_index(det_type: u32, name: &str) -> Result<u32, ChannelMapError> {
    position_of(channel_table(det_type)?.all, det_type, name)
}

fn position_of(list: &[&str], det_type: u32, name: &str) -> Result<u32, ChannelMapError> {
    list.iter()
        .position(|n| *n == name)
        .map(|p| p as u32)
        .ok_or_else(|| ChannelMapError::UnknownChannelName(det_type, name.to_string()))
}

/// Classify a name as physical or synthetic.
///
/// Non-physical names end in 'T' (sums) or 'X' (cross-talk), are a side sum ("?S1",
/// "?S2"), or are slow/fast noise traces.
pub fn is_physical_channel(name: &str) -> bool {
    if name.ends_with('T') || name.ends_with('X') {
        return false;
    }
    let mut chars = name.chars();
    chars.next();
    let rest = chars.as_str();
    if rest == "S1" || rest == "S2" {
        return false;
    }
    !(name.contains("slow") || name.contains("fast"))
}

/// Detector types which use the table machinery (i.e. not veto, not noise monitors)
pub fn is_table_type(det_type: u32) -> bool {
    has_channel_table(det_type) && !is_noise_monitor_type(det_type)
}
